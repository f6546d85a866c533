//! Fan-out of task units over the section catalog and fan-in of their outcomes.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::generator::{ResearchContext, SectionGenerator};
use crate::sections::SectionSpec;
use crate::state_machine::{RetryPolicy, TaskOutcome};
use crate::task::TaskUnit;

/// How task units are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// All units at once, each after its own jitter delay.
    #[default]
    Parallel,
    /// One unit at a time in catalog order, with jitter between units.
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Runs one task unit per section spec and gathers every terminal outcome.
///
/// Units are futures polled on the caller's task; nothing is spawned. A failed
/// unit never stops its siblings, and the result has exactly one entry per spec.
#[derive(Debug, Clone)]
pub struct Scheduler<'a> {
    policy: &'a RetryPolicy,
    mode: ExecutionMode,
    max_concurrency: Option<usize>,
    deadline: Option<Instant>,
}

impl<'a> Scheduler<'a> {
    pub fn new(policy: &'a RetryPolicy, mode: ExecutionMode) -> Self {
        Self {
            policy,
            mode,
            max_concurrency: None,
            deadline: None,
        }
    }

    /// Cap on units in flight in parallel mode. `None` or `0` means all of them.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }

    /// Soft deadline passed down to every unit.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn execute<G: SectionGenerator>(
        &self,
        specs: &[SectionSpec],
        ctx: &ResearchContext,
        generator: &G,
    ) -> HashMap<String, TaskOutcome> {
        self.execute_with(specs, ctx, generator, |_, _| {}).await
    }

    /// Like [`execute`](Self::execute), calling `on_done` as each unit finishes.
    pub async fn execute_with<G, F>(
        &self,
        specs: &[SectionSpec],
        ctx: &ResearchContext,
        generator: &G,
        mut on_done: F,
    ) -> HashMap<String, TaskOutcome>
    where
        G: SectionGenerator,
        F: FnMut(&str, &TaskOutcome),
    {
        info!(sections = specs.len(), mode = %self.mode, "dispatching task units");
        let mut outcomes = HashMap::with_capacity(specs.len());

        match self.mode {
            ExecutionMode::Parallel => {
                let limit = self.max_concurrency.unwrap_or(specs.len()).max(1);
                let units = specs.iter().map(|spec| {
                    // Drawn before the future is built so the rng never crosses an await.
                    let delay = self.policy.jitter();
                    debug!(section = %spec.key, delay_ms = delay.as_millis() as u64, "unit scheduled");
                    async move { (spec.key.clone(), self.run_unit(spec, ctx, generator, delay).await) }
                });
                let mut finished = stream::iter(units).buffer_unordered(limit);
                while let Some((key, outcome)) = finished.next().await {
                    on_done(&key, &outcome);
                    outcomes.insert(key, outcome);
                }
            }
            ExecutionMode::Sequential => {
                for (index, spec) in specs.iter().enumerate() {
                    let delay = if index == 0 {
                        Duration::ZERO
                    } else {
                        self.policy.jitter()
                    };
                    let outcome = self.run_unit(spec, ctx, generator, delay).await;
                    on_done(&spec.key, &outcome);
                    outcomes.insert(spec.key.clone(), outcome);
                }
            }
        }

        let succeeded = outcomes.values().filter(|o| o.is_success()).count();
        info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "all task units finished"
        );
        outcomes
    }

    async fn run_unit<G: SectionGenerator>(
        &self,
        spec: &SectionSpec,
        ctx: &ResearchContext,
        generator: &G,
        delay: Duration,
    ) -> TaskOutcome {
        TaskUnit::new(spec, self.policy)
            .with_deadline(self.deadline)
            .run(generator, ctx, delay)
            .await
    }
}
