use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::assembler::{self, Document, DocumentMetadata};
use crate::error::MobilityError;
use crate::generator::{ResearchContext, SectionGenerator};
use crate::images::{self, ImageSearch};
use crate::scheduler::{ExecutionMode, Scheduler};
use crate::sections::{self, SectionSpec};
use crate::state_machine::{AttemptLog, RetryPolicy, TaskOutcome};

/// Section that receives the image URLs.
const IMAGE_SECTION: &str = "meta";

/// Everything a caller needs to know about one finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub measure: String,
    pub document: Document,
    pub output_path: PathBuf,
    /// One log per section, in catalog order.
    pub attempts: Vec<(String, AttemptLog)>,
    pub images: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn metadata(&self) -> &DocumentMetadata {
        self.document.metadata()
    }

    pub fn is_partial(&self) -> bool {
        self.document.is_partial()
    }
}

/// Drives one research run end to end: sections and images concurrently,
/// then assembly and persistence.
pub struct ResearchOrchestrator<G, I> {
    generator: G,
    images: I,
    policy: RetryPolicy,
    specs: Vec<SectionSpec>,
    mode: ExecutionMode,
    max_concurrency: Option<usize>,
    run_timeout: Option<Duration>,
    image_count: usize,
    output_dir: PathBuf,
}

impl<G: SectionGenerator, I: ImageSearch> ResearchOrchestrator<G, I> {
    /// Orchestrator over the full section catalog, in parallel mode, with no deadline.
    pub fn new(generator: G, images: I, policy: RetryPolicy) -> Self {
        Self {
            generator,
            images,
            policy,
            specs: sections::catalog(),
            mode: ExecutionMode::Parallel,
            max_concurrency: None,
            run_timeout: None,
            image_count: 3,
            output_dir: PathBuf::from("research_output"),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_image_count(mut self, count: usize) -> Self {
        self.image_count = count;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Replace the section catalog.
    pub fn with_sections(mut self, specs: Vec<SectionSpec>) -> Self {
        self.specs = specs;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.specs
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn run(&self, ctx: &ResearchContext) -> Result<RunReport, MobilityError> {
        self.run_with(ctx, |_, _| {}).await
    }

    /// Run once, calling `on_done` as each section finishes.
    ///
    /// Only a failure to write the artifact is an error; failed sections end
    /// up in a partial document.
    pub async fn run_with<F>(&self, ctx: &ResearchContext, on_done: F) -> Result<RunReport, MobilityError>
    where
        F: FnMut(&str, &TaskOutcome),
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, measure = %ctx.measure_name);
        self.run_inner(run_id, ctx, on_done).instrument(span).await
    }

    async fn run_inner<F>(
        &self,
        run_id: Uuid,
        ctx: &ResearchContext,
        on_done: F,
    ) -> Result<RunReport, MobilityError>
    where
        F: FnMut(&str, &TaskOutcome),
    {
        let started = Instant::now();
        let deadline = self.run_timeout.and_then(|t| started.checked_add(t));
        info!(
            sections = self.specs.len(),
            mode = %self.mode,
            primary = %self.policy.primary_model,
            fallback = %self.policy.fallback_model,
            "research run started"
        );

        let scheduler = Scheduler::new(&self.policy, self.mode)
            .with_max_concurrency(self.max_concurrency)
            .with_deadline(deadline);
        let (mut outcomes, images) = tokio::join!(
            scheduler.execute_with(&self.specs, ctx, &self.generator, on_done),
            images::fetch_or_empty(&self.images, &ctx.measure_name, self.image_count),
        );

        attach_images(&mut outcomes, &images);

        let document = assembler::assemble(&outcomes, &self.specs);
        let output_path = document.persist(&self.output_dir, &ctx.measure_name)?;

        let attempts = self
            .specs
            .iter()
            .filter_map(|spec| {
                outcomes
                    .remove(&spec.key)
                    .map(|outcome| (spec.key.clone(), outcome.into_attempts()))
            })
            .collect();

        let elapsed = started.elapsed();
        info!(
            completion = document.metadata().completion_percentage,
            missing = document.metadata().missing_sections.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "research run finished"
        );

        Ok(RunReport {
            run_id,
            measure: ctx.measure_name.clone(),
            document,
            output_path,
            attempts,
            images,
            elapsed,
        })
    }
}

/// Put the URLs under `meta.images`, only if `meta` itself was generated.
fn attach_images(outcomes: &mut HashMap<String, TaskOutcome>, images: &[String]) {
    if images.is_empty() {
        return;
    }
    if let Some(Value::Object(meta)) = outcomes
        .get_mut(IMAGE_SECTION)
        .and_then(TaskOutcome::value_mut)
    {
        meta.insert(
            "images".to_string(),
            Value::Array(images.iter().cloned().map(Value::String).collect()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerationFailure, SectionValue};
    use crate::images::{ImageError, UnsplashSource};
    use crate::llm::LlmError;
    use crate::state_machine::Resolution;
    use serde_json::json;

    /// Succeeds for every section except those listed.
    struct StubGenerator {
        failing: Vec<&'static str>,
    }

    impl SectionGenerator for StubGenerator {
        async fn generate(
            &self,
            spec: &SectionSpec,
            _ctx: &ResearchContext,
            _model: &str,
        ) -> Result<SectionValue, GenerationFailure> {
            if self.failing.iter().any(|k| *k == spec.key) {
                Err(GenerationFailure::Llm(LlmError::Api {
                    status: 400,
                    message: "bad request".into(),
                    retry_after: None,
                }))
            } else {
                Ok(json!({"title": spec.key}))
            }
        }
    }

    struct NoImages;

    impl ImageSearch for NoImages {
        async fn fetch_images(&self, _query: &str, _count: usize) -> Result<Vec<String>, ImageError> {
            Err(ImageError::Malformed("down".into()))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default().without_jitter()
    }

    #[tokio::test]
    async fn complete_run_writes_full_document() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ResearchOrchestrator::new(StubGenerator { failing: vec![] }, UnsplashSource, policy())
            .with_output_dir(dir.path());

        let report = orchestrator
            .run(&ResearchContext::new("Bike Sharing", ""))
            .await
            .unwrap();

        assert!(!report.is_partial());
        assert_eq!(report.metadata().completion_percentage, 100.0);
        assert_eq!(report.attempts.len(), 19);
        assert_eq!(report.attempts[0].0, "meta");
        assert_eq!(
            report.output_path,
            dir.path().join("bike-sharing-mobility-measure.json")
        );
        assert!(report.output_path.exists());

        let meta = report.document.section("meta").unwrap();
        assert_eq!(meta["images"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn failed_sections_make_a_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ResearchOrchestrator::new(
            StubGenerator {
                failing: vec!["meta", "risks"],
            },
            UnsplashSource,
            policy(),
        )
        .with_output_dir(dir.path())
        .with_mode(ExecutionMode::Sequential);

        let report = orchestrator
            .run(&ResearchContext::new("Bike Sharing", ""))
            .await
            .unwrap();

        assert!(report.is_partial());
        assert_eq!(
            report.metadata().missing_sections,
            vec!["meta".to_string(), "risks".to_string()]
        );
        assert_eq!(report.metadata().completion_percentage, 89.5);
        assert!(report
            .output_path
            .ends_with("bike-sharing-mobility-measure-partial.json"));
        // Images are dropped when meta failed.
        assert_eq!(report.document.section("meta"), Some(&json!({})));

        let (_, risks_log) = report.attempts.iter().find(|(k, _)| k == "risks").unwrap();
        assert!(matches!(risks_log.resolution(), Resolution::Failed { .. }));
    }

    #[tokio::test]
    async fn image_failure_does_not_affect_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ResearchOrchestrator::new(StubGenerator { failing: vec![] }, NoImages, policy())
            .with_output_dir(dir.path())
            .with_sections(sections::catalog().into_iter().take(2).collect());

        let report = orchestrator
            .run(&ResearchContext::new("Car pooling", ""))
            .await
            .unwrap();

        assert!(!report.is_partial());
        assert!(report.images.is_empty());
        assert_eq!(report.document.section("meta"), Some(&json!({"title": "meta"})));
    }

    #[tokio::test]
    async fn progress_reaches_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ResearchOrchestrator::new(StubGenerator { failing: vec!["costs"] }, UnsplashSource, policy())
            .with_output_dir(dir.path());
        let mut done = 0;

        orchestrator
            .run_with(&ResearchContext::new("Car pooling", ""), |_, _| done += 1)
            .await
            .unwrap();

        assert_eq!(done, 19);
    }

    #[tokio::test]
    async fn unwritable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "x").unwrap();
        let orchestrator = ResearchOrchestrator::new(StubGenerator { failing: vec![] }, UnsplashSource, policy())
            .with_output_dir(blocker.join("out"))
            .with_sections(sections::catalog().into_iter().take(1).collect());

        let err = orchestrator
            .run(&ResearchContext::new("Car pooling", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, MobilityError::Write { .. }));
    }
}
