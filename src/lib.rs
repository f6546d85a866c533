//! Mobility measure research: one LLM call per document section, with
//! per-section retry, rate-limit backoff and model fallback, assembled into a
//! single JSON document that records which sections are missing.

pub mod assembler;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod images;
pub mod json;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod rate_limit;
pub mod scheduler;
pub mod sections;
pub mod state_machine;
pub mod task;
pub mod ui;

pub use assembler::{Document, DocumentMetadata};
pub use error::MobilityError;
pub use generator::{GenerationFailure, LlmSectionGenerator, ResearchContext, SectionGenerator};
pub use orchestrator::{ResearchOrchestrator, RunReport};
pub use scheduler::{ExecutionMode, Scheduler};
pub use state_machine::{AttemptLog, RetryPolicy, TaskOutcome};
