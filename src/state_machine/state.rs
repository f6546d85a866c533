use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::attempt::{AttemptLog, OutcomeKind, StopCause};
use super::policy::{RetryPolicy, Stage};
use crate::generator::{GenerationFailure, SectionValue};
use crate::rate_limit::{Classification, RateLimitInterpreter};

/// Where a task unit is in its lifecycle.
///
/// Pending → Attempting(primary) → [WaitingBackoff → Attempting]* →
/// Attempting(fallback) → ... → Succeeded | Failed
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Attempting { stage: Stage, attempt: u32 },
    WaitingBackoff { stage: Stage, attempt: u32, wait: Duration },
    Succeeded(SectionValue),
    Failed(FailureReason),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded(_) | TaskState::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Attempting { stage, attempt } => {
                write!(f, "ATTEMPTING({stage} #{attempt})")
            }
            TaskState::WaitingBackoff { stage, attempt, wait } => {
                write!(f, "WAITING_BACKOFF({stage} #{attempt}, {wait:?})")
            }
            TaskState::Succeeded(_) => write!(f, "SUCCEEDED"),
            TaskState::Failed(reason) => write!(f, "FAILED({reason})"),
        }
    }
}

/// Why a task unit produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Both models were tried and neither produced a value.
    ExhaustedFallback { last_error: String },
    /// The run deadline passed before the unit finished.
    DeadlineExceeded,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExhaustedFallback { last_error } => {
                write!(f, "all models exhausted: {last_error}")
            }
            FailureReason::DeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

/// Terminal result of a task unit, always carrying its audit trail.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success {
        value: SectionValue,
        attempts: AttemptLog,
    },
    Failed {
        reason: FailureReason,
        attempts: AttemptLog,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }

    pub fn value(&self) -> Option<&SectionValue> {
        match self {
            TaskOutcome::Success { value, .. } => Some(value),
            TaskOutcome::Failed { .. } => None,
        }
    }

    pub fn attempts(&self) -> &AttemptLog {
        match self {
            TaskOutcome::Success { attempts, .. } | TaskOutcome::Failed { attempts, .. } => attempts,
        }
    }

    pub fn into_attempts(self) -> AttemptLog {
        match self {
            TaskOutcome::Success { attempts, .. } | TaskOutcome::Failed { attempts, .. } => attempts,
        }
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut SectionValue> {
        match self {
            TaskOutcome::Success { value, .. } => Some(value),
            TaskOutcome::Failed { .. } => None,
        }
    }
}

/// Drives one task unit's [`TaskState`] and records every transition.
///
/// The machine never sleeps or calls anything: the caller performs the
/// attempt or the wait the current state asks for and reports back.
#[derive(Debug)]
pub struct TaskMachine<'a> {
    policy: &'a RetryPolicy,
    interpreter: RateLimitInterpreter,
    state: TaskState,
    log: AttemptLog,
}

impl<'a> TaskMachine<'a> {
    pub fn new(policy: &'a RetryPolicy, interpreter: RateLimitInterpreter) -> Self {
        Self {
            policy,
            interpreter,
            state: TaskState::Pending,
            log: AttemptLog::new(),
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn log(&self) -> &AttemptLog {
        &self.log
    }

    /// Model the next attempt should use, if the unit is attempting.
    pub fn current_model(&self) -> Option<&str> {
        match &self.state {
            TaskState::Attempting { stage, .. } => Some(self.policy.model_for(*stage)),
            _ => None,
        }
    }

    /// Pending → Attempting(primary #1) after the pacing delay `waited`.
    pub fn dispatch(&mut self, waited: Duration) -> &TaskState {
        if self.state == TaskState::Pending {
            self.log.push(
                self.policy.model_for(Stage::Primary),
                OutcomeKind::Dispatched,
                Some(waited),
            );
            self.state = TaskState::Attempting {
                stage: Stage::Primary,
                attempt: 1,
            };
        }
        &self.state
    }

    /// Feed the result of the attempt the current state asked for.
    pub fn record_result(&mut self, result: Result<SectionValue, GenerationFailure>) -> &TaskState {
        let (stage, attempt) = match &self.state {
            TaskState::Attempting { stage, attempt } => (*stage, *attempt),
            _ => return &self.state,
        };
        let model = self.policy.model_for(stage).to_string();

        self.state = match result {
            Ok(value) => {
                self.log.push(&model, OutcomeKind::Succeeded, None);
                TaskState::Succeeded(value)
            }
            Err(failure) => {
                let error = failure.to_string();
                match self.interpreter.classify(&failure) {
                    Classification::Fatal => self.stop(stage, &model, StopCause::Fatal { error }),
                    _ if attempt >= self.policy.max_attempts_for(stage) => {
                        self.stop(stage, &model, StopCause::RetriesExhausted { last_error: error })
                    }
                    Classification::RetryableAfter(requested) => {
                        self.log.push(
                            &model,
                            OutcomeKind::RateLimited {
                                requested_wait_ms: u64::try_from(requested.as_millis()).unwrap_or(u64::MAX),
                            },
                            None,
                        );
                        TaskState::WaitingBackoff {
                            stage,
                            attempt,
                            wait: self.policy.clamp_wait(requested),
                        }
                    }
                    Classification::RetryableImmediate => {
                        self.log.push(&model, OutcomeKind::Transient { error }, None);
                        TaskState::WaitingBackoff {
                            stage,
                            attempt,
                            wait: Duration::ZERO,
                        }
                    }
                }
            }
        };
        &self.state
    }

    /// WaitingBackoff → Attempting(same model, next attempt) after `waited`.
    pub fn resume(&mut self, waited: Duration) -> &TaskState {
        if let TaskState::WaitingBackoff { stage, attempt, .. } = self.state {
            self.log
                .push(self.policy.model_for(stage), OutcomeKind::Retrying, Some(waited));
            self.state = TaskState::Attempting {
                stage,
                attempt: attempt + 1,
            };
        }
        &self.state
    }

    /// Any non-terminal state → Failed(DeadlineExceeded).
    pub fn interrupt(&mut self) -> &TaskState {
        if !self.state.is_terminal() {
            let stage = match &self.state {
                TaskState::Attempting { stage, .. } | TaskState::WaitingBackoff { stage, .. } => *stage,
                _ => Stage::Primary,
            };
            self.log
                .push(self.policy.model_for(stage), OutcomeKind::Interrupted, None);
            self.state = TaskState::Failed(FailureReason::DeadlineExceeded);
        }
        &self.state
    }

    /// Consume the machine. A unit that never reached a terminal state counts
    /// as interrupted.
    pub fn into_outcome(mut self) -> TaskOutcome {
        self.interrupt();
        match self.state {
            TaskState::Succeeded(value) => TaskOutcome::Success {
                value,
                attempts: self.log,
            },
            TaskState::Failed(reason) => TaskOutcome::Failed {
                reason,
                attempts: self.log,
            },
            _ => TaskOutcome::Failed {
                reason: FailureReason::DeadlineExceeded,
                attempts: self.log,
            },
        }
    }

    fn stop(&mut self, stage: Stage, model: &str, cause: StopCause) -> TaskState {
        let last_error = cause.message().to_string();
        match stage {
            Stage::Primary => {
                self.log
                    .push(model, OutcomeKind::FallbackSwitch { cause }, None);
                if self.policy.max_attempts_fallback == 0 {
                    self.log.push(
                        &self.policy.fallback_model,
                        OutcomeKind::Exhausted {
                            cause: StopCause::FallbackDisabled,
                        },
                        None,
                    );
                    TaskState::Failed(FailureReason::ExhaustedFallback { last_error })
                } else {
                    TaskState::Attempting {
                        stage: Stage::Fallback,
                        attempt: 1,
                    }
                }
            }
            Stage::Fallback => {
                self.log.push(model, OutcomeKind::Exhausted { cause }, None);
                TaskState::Failed(FailureReason::ExhaustedFallback { last_error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use serde_json::json;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            primary_model: "p".into(),
            fallback_model: "f".into(),
            max_attempts_primary: 3,
            max_attempts_fallback: 2,
            ..Default::default()
        }
    }

    fn interpreter() -> RateLimitInterpreter {
        RateLimitInterpreter::new(Duration::from_secs(10))
    }

    fn rate_limited(secs: u64) -> Result<SectionValue, GenerationFailure> {
        Err(GenerationFailure::Llm(LlmError::Api {
            status: 429,
            message: "rate_limit_exceeded".into(),
            retry_after: Some(secs.to_string()),
        }))
    }

    fn server_error() -> Result<SectionValue, GenerationFailure> {
        Err(GenerationFailure::Llm(LlmError::Api {
            status: 503,
            message: "overloaded".into(),
            retry_after: None,
        }))
    }

    fn fatal() -> Result<SectionValue, GenerationFailure> {
        Err(GenerationFailure::InvalidJson("nope".into()))
    }

    fn kinds(log: &AttemptLog) -> Vec<&OutcomeKind> {
        log.records().iter().map(|r| &r.outcome_kind).collect()
    }

    #[test]
    fn success_on_first_attempt() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        assert_eq!(m.dispatch(Duration::from_secs(2)), &TaskState::Attempting { stage: Stage::Primary, attempt: 1 });
        assert_eq!(m.current_model(), Some("p"));
        m.record_result(Ok(json!({"a": 1})));

        let outcome = m.into_outcome();
        assert_eq!(outcome.value(), Some(&json!({"a": 1})));
        assert_eq!(
            kinds(outcome.attempts()),
            vec![&OutcomeKind::Dispatched, &OutcomeKind::Succeeded]
        );
        assert_eq!(outcome.attempts().records()[0].wait_applied_ms, Some(2000));
    }

    #[test]
    fn rate_limit_backs_off_then_falls_back() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);

        assert_eq!(
            m.record_result(rate_limited(5)),
            &TaskState::WaitingBackoff { stage: Stage::Primary, attempt: 1, wait: Duration::from_secs(5) }
        );
        m.resume(Duration::from_secs(5));
        m.record_result(rate_limited(5));
        m.resume(Duration::from_secs(5));
        assert_eq!(
            m.record_result(rate_limited(5)),
            &TaskState::Attempting { stage: Stage::Fallback, attempt: 1 }
        );
        assert_eq!(m.current_model(), Some("f"));
        m.record_result(Ok(json!({})));

        let outcome = m.into_outcome();
        assert!(outcome.is_success());
        let log = outcome.attempts();
        assert_eq!(log.attempts_against("p"), 3);
        assert_eq!(log.attempts_against("f"), 1);
        let records = log.records();
        let n = records.len();
        assert!(matches!(
            records[n - 2].outcome_kind,
            OutcomeKind::FallbackSwitch { cause: StopCause::RetriesExhausted { .. } }
        ));
        assert_eq!(records[n - 1].outcome_kind, OutcomeKind::Succeeded);
        assert_eq!(records[n - 1].model_used, "f");
    }

    #[test]
    fn long_waits_are_clamped_not_dropped() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        assert_eq!(
            m.record_result(rate_limited(600)),
            &TaskState::WaitingBackoff { stage: Stage::Primary, attempt: 1, wait: Duration::from_secs(30) }
        );
        assert_eq!(
            m.log().last().map(|r| &r.outcome_kind),
            Some(&OutcomeKind::RateLimited { requested_wait_ms: 600_000 })
        );
    }

    #[test]
    fn unbounded_hint_waits_for_the_ceiling() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        let huge = Err(GenerationFailure::Llm(LlmError::Api {
            status: 429,
            message: "rate_limit_exceeded".into(),
            retry_after: Some("1e30".into()),
        }));
        assert_eq!(
            m.record_result(huge),
            &TaskState::WaitingBackoff { stage: Stage::Primary, attempt: 1, wait: Duration::from_secs(30) }
        );
        assert_eq!(
            m.log().last().map(|r| &r.outcome_kind),
            Some(&OutcomeKind::RateLimited { requested_wait_ms: u64::MAX })
        );
    }

    #[test]
    fn transient_errors_retry_without_wait_and_consume_budget() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        assert_eq!(
            m.record_result(server_error()),
            &TaskState::WaitingBackoff { stage: Stage::Primary, attempt: 1, wait: Duration::ZERO }
        );
        m.resume(Duration::ZERO);
        m.record_result(server_error());
        m.resume(Duration::ZERO);
        assert_eq!(
            m.record_result(server_error()),
            &TaskState::Attempting { stage: Stage::Fallback, attempt: 1 }
        );
    }

    #[test]
    fn fatal_on_primary_switches_immediately() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        assert_eq!(
            m.record_result(fatal()),
            &TaskState::Attempting { stage: Stage::Fallback, attempt: 1 }
        );
        assert_eq!(m.log().attempts_against("p"), 1);
    }

    #[test]
    fn fatal_on_both_models_exhausts() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        m.record_result(fatal());
        m.record_result(fatal());

        let outcome = m.into_outcome();
        let TaskOutcome::Failed { reason, attempts } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(
            reason,
            FailureReason::ExhaustedFallback { last_error: "invalid JSON: nope".into() }
        );
        assert_eq!(attempts.attempts_against("p"), 1);
        assert_eq!(attempts.attempts_against("f"), 1);
        assert!(matches!(
            attempts.last().map(|r| &r.outcome_kind),
            Some(OutcomeKind::Exhausted { cause: StopCause::Fatal { .. } })
        ));
    }

    #[test]
    fn fallback_budget_is_respected() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        m.record_result(fatal());
        m.record_result(server_error());
        m.resume(Duration::ZERO);
        assert!(matches!(m.record_result(server_error()), TaskState::Failed(_)));
        assert_eq!(m.log().attempts_against("f"), 2);
    }

    #[test]
    fn zero_fallback_attempts_fails_after_switch() {
        let policy = RetryPolicy {
            max_attempts_fallback: 0,
            ..policy()
        };
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        assert!(matches!(
            m.record_result(fatal()),
            TaskState::Failed(FailureReason::ExhaustedFallback { .. })
        ));
        assert_eq!(m.log().attempts_against("f"), 0);
        assert!(matches!(
            m.log().last().map(|r| &r.outcome_kind),
            Some(OutcomeKind::Exhausted { cause: StopCause::FallbackDisabled })
        ));
    }

    #[test]
    fn interrupt_keeps_log() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        m.record_result(rate_limited(5));
        assert_eq!(m.interrupt(), &TaskState::Failed(FailureReason::DeadlineExceeded));

        let outcome = m.into_outcome();
        assert_eq!(outcome.attempts().len(), 3);
        assert_eq!(
            outcome.attempts().last().map(|r| &r.outcome_kind),
            Some(&OutcomeKind::Interrupted)
        );
    }

    #[test]
    fn terminal_states_ignore_further_input() {
        let policy = policy();
        let mut m = TaskMachine::new(&policy, interpreter());
        m.dispatch(Duration::ZERO);
        m.record_result(Ok(json!({})));
        m.record_result(fatal());
        m.resume(Duration::ZERO);
        m.interrupt();
        assert!(matches!(m.state(), TaskState::Succeeded(_)));
        assert_eq!(m.log().len(), 2);
    }

    #[test]
    fn state_display() {
        assert_eq!(TaskState::Pending.to_string(), "PENDING");
        assert_eq!(
            TaskState::Attempting { stage: Stage::Fallback, attempt: 2 }.to_string(),
            "ATTEMPTING(fallback #2)"
        );
        assert_eq!(
            TaskState::Failed(FailureReason::DeadlineExceeded).to_string(),
            "FAILED(run deadline exceeded)"
        );
    }
}
