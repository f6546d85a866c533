//! Classifies generation failures for the retry state machine.
//!
//! [`RateLimitInterpreter::classify`] is a pure function of the failure: it
//! recognizes rate-limit responses, pulls a suggested wait out of the
//! `retry-after` header or the provider's message, and otherwise decides
//! whether the failure is worth retrying at all.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::generator::GenerationFailure;
use crate::llm::LlmError;

/// How a task unit should react to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Do not retry this model.
    Fatal,
    /// Retry the same model without waiting.
    RetryableImmediate,
    /// Retry the same model after the given wait.
    RetryableAfter(Duration),
}

/// `try again in 7.66s`, `try again in 1m30.5s`, `try again in 450ms`
static TRY_AGAIN_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)try again in\s+([0-9][0-9.hms]*)").unwrap());

/// One component of a compound duration such as `1m30.5s`.
static DURATION_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").unwrap());

const TRANSIENT_STATUSES: [u16; 5] = [500, 502, 503, 504, 529];

/// Maps failures onto [`Classification`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInterpreter {
    default_wait: Duration,
}

impl RateLimitInterpreter {
    /// `default_wait` is used when a rate-limit response carries no usable hint.
    pub fn new(default_wait: Duration) -> Self {
        Self { default_wait }
    }

    pub fn default_wait(&self) -> Duration {
        self.default_wait
    }

    pub fn classify(&self, failure: &GenerationFailure) -> Classification {
        let GenerationFailure::Llm(err) = failure else {
            // Unparseable or empty output: the model answered, it just answered badly.
            return Classification::Fatal;
        };

        match err {
            LlmError::Api {
                status,
                message,
                retry_after,
            } => {
                if *status == 429 || is_rate_limit_message(message) {
                    let hint = retry_after
                        .as_deref()
                        .and_then(parse_retry_after)
                        .or_else(|| wait_hint_from_message(message));
                    Classification::RetryableAfter(hint.unwrap_or(self.default_wait))
                } else if TRANSIENT_STATUSES.contains(status) {
                    Classification::RetryableImmediate
                } else {
                    Classification::Fatal
                }
            }
            LlmError::Network(e) if e.is_timeout() || e.is_connect() => {
                Classification::RetryableImmediate
            }
            LlmError::Network(e) => match e.status() {
                Some(s) if TRANSIENT_STATUSES.contains(&s.as_u16()) => {
                    Classification::RetryableImmediate
                }
                _ => Classification::Fatal,
            },
            LlmError::MalformedResponse(_) | LlmError::Misconfiguration(_) => {
                Classification::Fatal
            }
        }
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate_limit_exceeded")
        || lower.contains("rate_limit_error")
        || lower.contains("rate limit")
}

/// Parse a `retry-after` header value given in seconds (fractional allowed).
///
/// HTTP-date values are ignored; the caller falls back to the message or the
/// default wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(saturating_secs(secs))
}

/// Find a `try again in <duration>` hint in a provider message.
pub fn wait_hint_from_message(message: &str) -> Option<Duration> {
    let caps = TRY_AGAIN_IN.captures(message)?;
    // A sentence-ending period is not part of the duration.
    parse_compound_duration(caps[1].trim_end_matches('.'))
}

/// Parse Go-style compound durations: `2h`, `1m30.5s`, `7.66s`, `450ms`.
///
/// The whole input must be made of duration parts.
pub fn parse_compound_duration(text: &str) -> Option<Duration> {
    let mut total = 0.0_f64;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(text) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let value: f64 = caps[1].parse().ok()?;
        total += match &caps[2] {
            "h" => value * 3600.0,
            "m" => value * 60.0,
            "s" => value,
            "ms" => value / 1000.0,
            _ => return None,
        };
    }
    if consumed == 0 || consumed != text.len() {
        return None;
    }
    Some(saturating_secs(total))
}

/// Seconds to a `Duration`, saturating at `Duration::MAX`; the policy ceiling
/// brings oversized hints back down.
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> RateLimitInterpreter {
        RateLimitInterpreter::new(Duration::from_secs(10))
    }

    fn api(status: u16, message: &str, retry_after: Option<&str>) -> GenerationFailure {
        GenerationFailure::Llm(LlmError::Api {
            status,
            message: message.into(),
            retry_after: retry_after.map(str::to_string),
        })
    }

    #[test]
    fn groq_message_hint_is_extracted() {
        let failure = api(
            429,
            "rate_limit_exceeded: Rate limit reached for model `openai/gpt-oss-120b` on tokens per minute (TPM). Please try again in 7.66s. Need more tokens?",
            None,
        );
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::from_millis(7660))
        );
    }

    #[test]
    fn header_takes_precedence_over_message() {
        let failure = api(429, "Please try again in 20s.", Some("3"));
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::from_secs(3))
        );
    }

    #[test]
    fn unparseable_header_falls_back_to_message() {
        let failure = api(429, "Please try again in 1m30.5s.", Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::from_secs_f64(90.5))
        );
    }

    #[test]
    fn rate_limit_without_hint_uses_default() {
        let failure = api(429, "Too many requests", None);
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::from_secs(10))
        );
    }

    #[test]
    fn rate_limit_signature_without_429_is_recognized() {
        let failure = api(400, "rate_limit_exceeded: try again in 450ms", None);
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::from_millis(450))
        );
    }

    #[test]
    fn server_errors_retry_immediately() {
        for status in [500, 502, 503, 504, 529] {
            assert_eq!(
                interpreter().classify(&api(status, "overloaded", None)),
                Classification::RetryableImmediate,
                "status {status}"
            );
        }
    }

    #[test]
    fn auth_and_bad_request_are_fatal() {
        assert_eq!(
            interpreter().classify(&api(401, "invalid_api_key: Invalid API Key", None)),
            Classification::Fatal
        );
        assert_eq!(
            interpreter().classify(&api(400, "model_decommissioned", None)),
            Classification::Fatal
        );
    }

    #[test]
    fn bad_output_is_fatal() {
        assert_eq!(
            interpreter().classify(&GenerationFailure::InvalidJson("x".into())),
            Classification::Fatal
        );
        assert_eq!(
            interpreter().classify(&GenerationFailure::EmptyResponse),
            Classification::Fatal
        );
        assert_eq!(
            interpreter().classify(&GenerationFailure::Llm(LlmError::MalformedResponse(
                "no choices".into()
            ))),
            Classification::Fatal
        );
    }

    #[test]
    fn oversized_header_saturates() {
        assert_eq!(parse_retry_after("1e30"), Some(Duration::MAX));
        assert_eq!(parse_retry_after("inf"), Some(Duration::MAX));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(
            interpreter().classify(&api(429, "rate_limit_exceeded", Some("1e30"))),
            Classification::RetryableAfter(Duration::MAX)
        );
    }

    #[test]
    fn oversized_message_hint_saturates() {
        let failure = api(
            429,
            "rate_limit_exceeded: Please try again in 99999999999999999999h.",
            None,
        );
        assert_eq!(
            interpreter().classify(&failure),
            Classification::RetryableAfter(Duration::MAX)
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let failure = api(429, "Please try again in 2s", None);
        let first = interpreter().classify(&failure);
        for _ in 0..5 {
            assert_eq!(interpreter().classify(&failure), first);
        }
    }

    #[test]
    fn compound_durations() {
        assert_eq!(parse_compound_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_compound_duration("1m5s"), Some(Duration::from_secs(65)));
        assert_eq!(parse_compound_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_compound_duration("7.5s"), Some(Duration::from_millis(7500)));
        assert_eq!(parse_compound_duration(""), None);
        assert_eq!(parse_compound_duration("soon"), None);
        assert_eq!(parse_compound_duration("5sx"), None);
    }

    #[test]
    fn retry_after_header_values() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("tomorrow"), None);
    }
}
