//! One section, one task unit: the async driver around [`TaskMachine`].

use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use crate::generator::{ResearchContext, SectionGenerator};
use crate::rate_limit::RateLimitInterpreter;
use crate::sections::SectionSpec;
use crate::state_machine::{OutcomeKind, RetryPolicy, TaskMachine, TaskOutcome, TaskState};

enum Step {
    Dispatch,
    Attempt(String),
    Wait(Duration),
    Done,
}

/// Generates one section under the shared retry policy.
///
/// The unit owns its state and its log; nothing is shared with siblings.
/// It always terminates: every attempt consumes budget, waits are bounded by
/// the policy ceiling, and the optional deadline cuts any wait short.
pub struct TaskUnit<'a> {
    spec: &'a SectionSpec,
    policy: &'a RetryPolicy,
    interpreter: RateLimitInterpreter,
    deadline: Option<Instant>,
}

impl<'a> TaskUnit<'a> {
    pub fn new(spec: &'a SectionSpec, policy: &'a RetryPolicy) -> Self {
        Self {
            spec,
            policy,
            interpreter: RateLimitInterpreter::new(policy.default_wait),
            deadline: None,
        }
    }

    /// Stop waiting and report `DeadlineExceeded` once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run to completion. `start_delay` is the pacing delay before the first attempt.
    pub async fn run<G: SectionGenerator>(
        &self,
        generator: &G,
        ctx: &ResearchContext,
        start_delay: Duration,
    ) -> TaskOutcome {
        let section = self.spec.key.as_str();
        let mut machine = TaskMachine::new(self.policy, self.interpreter);

        loop {
            let step = match machine.state() {
                TaskState::Pending => Step::Dispatch,
                TaskState::Attempting { .. } => {
                    Step::Attempt(machine.current_model().unwrap_or_default().to_string())
                }
                TaskState::WaitingBackoff { wait, .. } => Step::Wait(*wait),
                TaskState::Succeeded(_) | TaskState::Failed(_) => Step::Done,
            };

            match step {
                Step::Dispatch => match self.suspend(start_delay).await {
                    Some(waited) => {
                        machine.dispatch(waited);
                    }
                    None => {
                        machine.interrupt();
                    }
                },
                Step::Attempt(model) => {
                    if self.deadline_passed() {
                        machine.interrupt();
                        continue;
                    }
                    debug!(section, model = %model, state = %machine.state(), "calling model");
                    let result = generator.generate(self.spec, ctx, &model).await;
                    machine.record_result(result);
                    self.trace_transition(&machine);
                }
                Step::Wait(wait) => match self.suspend(wait).await {
                    Some(waited) => {
                        machine.resume(waited);
                    }
                    None => {
                        machine.interrupt();
                    }
                },
                Step::Done => break,
            }
        }

        if matches!(machine.state(), TaskState::Failed(_))
            && machine.log().last().map(|r| &r.outcome_kind) == Some(&OutcomeKind::Interrupted)
        {
            warn!(section, "run deadline reached, section abandoned");
        }
        machine.into_outcome()
    }

    /// Sleep for `duration` unless the deadline comes first.
    ///
    /// Returns the time actually waited, or `None` if the deadline cut it short.
    async fn suspend(&self, duration: Duration) -> Option<Duration> {
        // A wake time past the end of the clock is later than any deadline.
        let wake = Instant::now().checked_add(duration);
        match (self.deadline, wake) {
            (Some(deadline), None) => {
                sleep_until(deadline).await;
                None
            }
            (Some(deadline), Some(wake)) if deadline <= wake => {
                sleep_until(deadline).await;
                None
            }
            _ => {
                if !duration.is_zero() {
                    sleep(duration).await;
                }
                Some(duration)
            }
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn trace_transition(&self, machine: &TaskMachine<'_>) {
        let section = self.spec.key.as_str();
        let Some(record) = machine.log().last() else {
            return;
        };
        let model = record.model_used.as_str();
        match (&record.outcome_kind, machine.state()) {
            (OutcomeKind::Succeeded, _) => {
                info!(section, model, calls = machine.log().invocations(), "section generated");
            }
            (OutcomeKind::RateLimited { requested_wait_ms }, TaskState::WaitingBackoff { wait, attempt, .. }) => {
                warn!(
                    section,
                    model,
                    attempt,
                    requested_wait_ms,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited, backing off"
                );
            }
            (OutcomeKind::Transient { error }, _) => {
                warn!(section, model, error = %error, "transient failure, retrying");
            }
            (OutcomeKind::FallbackSwitch { cause }, _) => {
                warn!(
                    section,
                    from = model,
                    to = %self.policy.fallback_model,
                    cause = %cause,
                    "switching to fallback model"
                );
            }
            (OutcomeKind::Exhausted { cause }, _) => {
                error!(section, cause = %cause, "section generation failed on all models");
            }
            _ => {}
        }
    }
}
