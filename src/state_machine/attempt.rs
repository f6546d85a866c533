use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a model stopped being tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopCause {
    /// The attempt budget for the model ran out on retryable failures.
    RetriesExhausted { last_error: String },
    /// The model failed in a way retrying would not fix.
    Fatal { error: String },
    /// The fallback model has no attempt budget.
    FallbackDisabled,
}

impl StopCause {
    pub fn message(&self) -> &str {
        match self {
            StopCause::RetriesExhausted { last_error } => last_error,
            StopCause::Fatal { error } => error,
            StopCause::FallbackDisabled => "fallback model disabled",
        }
    }
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCause::RetriesExhausted { last_error } => {
                write!(f, "retries exhausted ({last_error})")
            }
            StopCause::Fatal { error } => write!(f, "fatal error ({error})"),
            StopCause::FallbackDisabled => write!(f, "fallback model disabled"),
        }
    }
}

/// The transition a record stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Pending -> Attempting(primary), after the pacing delay.
    Dispatched,
    /// Attempting -> Success.
    Succeeded,
    /// Attempting -> WaitingBackoff on a rate-limit response.
    RateLimited { requested_wait_ms: u64 },
    /// Attempting -> WaitingBackoff on a transient error, no wait.
    Transient { error: String },
    /// WaitingBackoff -> Attempting, same model.
    Retrying,
    /// Attempting(primary) -> AttemptingFallback.
    FallbackSwitch { cause: StopCause },
    /// Attempting(fallback) -> ExhaustedFailure.
    Exhausted { cause: StopCause },
    /// Any non-terminal state -> Failed, because the run deadline passed.
    Interrupted,
}

/// One entry in a task unit's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub model_used: String,
    pub timestamp: DateTime<Utc>,
    pub outcome_kind: OutcomeKind,
    /// Time spent suspended before this transition.
    pub wait_applied_ms: Option<u64>,
}

impl AttemptRecord {
    pub fn wait_applied(&self) -> Option<Duration> {
        self.wait_applied_ms.map(Duration::from_millis)
    }

    /// Whether this record is the result of a call to the generation capability.
    pub fn is_invocation(&self) -> bool {
        match &self.outcome_kind {
            OutcomeKind::Succeeded
            | OutcomeKind::RateLimited { .. }
            | OutcomeKind::Transient { .. }
            | OutcomeKind::FallbackSwitch { .. } => true,
            OutcomeKind::Exhausted { cause } => *cause != StopCause::FallbackDisabled,
            OutcomeKind::Dispatched | OutcomeKind::Retrying | OutcomeKind::Interrupted => false,
        }
    }
}

/// How a task unit ended, reconstructed from its log alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    ProducedBy { model: String, attempts: u32 },
    Failed { cause: String },
    Unfinished,
}

/// Append-only audit trail of one task unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptLog(Vec<AttemptRecord>);

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, model: &str, kind: OutcomeKind, wait_applied: Option<Duration>) {
        self.0.push(AttemptRecord {
            model_used: model.to_string(),
            timestamp: Utc::now(),
            outcome_kind: kind,
            wait_applied_ms: wait_applied.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        });
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AttemptRecord> {
        self.0.last()
    }

    /// Number of calls made to the generation capability.
    pub fn invocations(&self) -> u32 {
        self.0.iter().filter(|r| r.is_invocation()).count() as u32
    }

    /// Number of calls made with `model`.
    pub fn attempts_against(&self, model: &str) -> u32 {
        self.0
            .iter()
            .filter(|r| r.is_invocation() && r.model_used == model)
            .count() as u32
    }

    /// Whether the unit ever switched to its fallback model.
    pub fn fell_back(&self) -> bool {
        self.0
            .iter()
            .any(|r| matches!(r.outcome_kind, OutcomeKind::FallbackSwitch { .. }))
    }

    /// Total time spent suspended (pacing plus backoff).
    pub fn total_wait(&self) -> Duration {
        self.0.iter().filter_map(AttemptRecord::wait_applied).sum()
    }

    /// Replay the log into its final result without calling anything.
    pub fn resolution(&self) -> Resolution {
        match self.0.last().map(|r| (&r.outcome_kind, r)) {
            Some((OutcomeKind::Succeeded, record)) => Resolution::ProducedBy {
                model: record.model_used.clone(),
                attempts: self.invocations(),
            },
            Some((OutcomeKind::Exhausted { cause }, _)) => Resolution::Failed {
                cause: cause.to_string(),
            },
            Some((OutcomeKind::Interrupted, _)) => Resolution::Failed {
                cause: "run deadline exceeded".to_string(),
            },
            _ => Resolution::Unfinished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_log() -> AttemptLog {
        let mut log = AttemptLog::new();
        log.push("primary", OutcomeKind::Dispatched, Some(Duration::from_millis(1500)));
        log.push("primary", OutcomeKind::RateLimited { requested_wait_ms: 5000 }, None);
        log.push("primary", OutcomeKind::Retrying, Some(Duration::from_secs(5)));
        log.push(
            "primary",
            OutcomeKind::FallbackSwitch {
                cause: StopCause::RetriesExhausted {
                    last_error: "429".into(),
                },
            },
            None,
        );
        log.push("fallback", OutcomeKind::Succeeded, None);
        log
    }

    #[test]
    fn counts_invocations_per_model() {
        let log = fallback_log();
        assert_eq!(log.len(), 5);
        assert_eq!(log.invocations(), 3);
        assert_eq!(log.attempts_against("primary"), 2);
        assert_eq!(log.attempts_against("fallback"), 1);
        assert!(log.fell_back());
        assert_eq!(log.total_wait(), Duration::from_millis(6500));
    }

    #[test]
    fn resolution_names_producing_model() {
        assert_eq!(
            fallback_log().resolution(),
            Resolution::ProducedBy {
                model: "fallback".into(),
                attempts: 3
            }
        );
    }

    #[test]
    fn resolution_survives_serialization() {
        let json = serde_json::to_string(&fallback_log()).unwrap();
        let restored: AttemptLog = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, fallback_log().clone_with_timestamps_of(&restored));
        assert_eq!(restored.resolution(), fallback_log().resolution());
    }

    #[test]
    fn serialized_kinds_are_tagged() {
        let json = serde_json::to_value(fallback_log()).unwrap();
        assert_eq!(json[1]["outcome_kind"]["kind"], "rate_limited");
        assert_eq!(json[1]["outcome_kind"]["requested_wait_ms"], 5000);
        assert_eq!(json[3]["outcome_kind"]["cause"]["type"], "retries_exhausted");
        assert_eq!(json[2]["wait_applied_ms"], 5000);
    }

    #[test]
    fn resolution_of_exhausted_log() {
        let mut log = AttemptLog::new();
        log.push(
            "fallback",
            OutcomeKind::Exhausted {
                cause: StopCause::Fatal {
                    error: "invalid JSON".into(),
                },
            },
            None,
        );
        assert_eq!(
            log.resolution(),
            Resolution::Failed {
                cause: "fatal error (invalid JSON)".into()
            }
        );
    }

    #[test]
    fn empty_log_is_unfinished() {
        assert_eq!(AttemptLog::new().resolution(), Resolution::Unfinished);
    }

    impl AttemptLog {
        /// Copy of `self` carrying `other`'s timestamps, for equality checks.
        fn clone_with_timestamps_of(&self, other: &AttemptLog) -> AttemptLog {
            let mut copy = self.clone();
            for (mine, theirs) in copy.0.iter_mut().zip(other.0.iter()) {
                mine.timestamp = theirs.timestamp;
            }
            copy
        }
    }
}
