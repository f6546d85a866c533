use std::time::Duration;

use rand::Rng;

/// Which model a task unit is currently working with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Primary,
    Fallback,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Primary => write!(f, "primary"),
            Stage::Fallback => write!(f, "fallback"),
        }
    }
}

/// Retry, fallback and pacing settings shared by every task unit of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub primary_model: String,
    pub fallback_model: String,
    /// Calls allowed against the primary model before switching to the fallback.
    pub max_attempts_primary: u32,
    /// Calls allowed against the fallback model before giving up.
    pub max_attempts_fallback: u32,
    /// Wait used when a rate-limit response carries no hint.
    pub default_wait: Duration,
    /// Upper bound on any single backoff wait.
    pub wait_ceiling: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            primary_model: "openai/gpt-oss-120b".to_string(),
            fallback_model: "llama-3.3-70b-versatile".to_string(),
            max_attempts_primary: 3,
            max_attempts_fallback: 2,
            default_wait: Duration::from_secs(10),
            wait_ceiling: Duration::from_secs(30),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn model_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Primary => &self.primary_model,
            Stage::Fallback => &self.fallback_model,
        }
    }

    pub fn max_attempts_for(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Primary => self.max_attempts_primary,
            Stage::Fallback => self.max_attempts_fallback,
        }
    }

    /// Bound a requested wait by the ceiling. Long hints are shortened, never dropped.
    pub fn clamp_wait(&self, wait: Duration) -> Duration {
        wait.min(self.wait_ceiling)
    }

    /// A random pacing delay within `[jitter_min, jitter_max]`.
    pub fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        rand::thread_rng().gen_range(self.jitter_min..=self.jitter_max)
    }

    /// Policy with no pacing delays.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_min = Duration::ZERO;
        self.jitter_max = Duration::ZERO;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.primary_model.trim().is_empty() {
            return Err("primary model must not be empty".into());
        }
        if self.max_attempts_fallback > 0 && self.fallback_model.trim().is_empty() {
            return Err("fallback model must not be empty".into());
        }
        if self.max_attempts_primary == 0 {
            return Err("max_attempts_primary must be at least 1".into());
        }
        if self.jitter_min > self.jitter_max {
            return Err(format!(
                "jitter_min ({:?}) must not exceed jitter_max ({:?})",
                self.jitter_min, self.jitter_max
            ));
        }
        Ok(())
    }
}
