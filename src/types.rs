use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Run-level policy for what happens after an asset fails.
///
/// - `FailFast`: stop scheduling further assets as soon as one fails; assets
///   that never started are absent from the result.
/// - `Continue`: run every asset; failed upstream results are handed to
///   their dependents as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    FailFast,
    Continue,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::FailFast
    }
}

impl FromStr for ErrorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(ErrorStrategy::FailFast),
            "continue" => Ok(ErrorStrategy::Continue),
            other => Err(format!(
                "invalid error_strategy: {other} (expected \"fail_fast\" or \"continue\")"
            )),
        }
    }
}

/// How the delay between retry attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Retry immediately.
    Fixed,
    /// `base_delay * (attempt + 1)`.
    Linear,
    /// `base_delay * 2^attempt`.
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!(
                "invalid backoff: {other} (expected \"fixed\", \"linear\" or \"exponential\")"
            )),
        }
    }
}

/// Randomisation applied on top of a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay / 2, delay]`.
    Equal,
}

impl Default for JitterStrategy {
    fn default() -> Self {
        JitterStrategy::None
    }
}

impl FromStr for JitterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(JitterStrategy::None),
            "full" => Ok(JitterStrategy::Full),
            "equal" => Ok(JitterStrategy::Equal),
            other => Err(format!(
                "invalid jitter: {other} (expected \"none\", \"full\" or \"equal\")"
            )),
        }
    }
}

/// Which failures the retry wrapper re-attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    AnyError,
    /// Only errors carrying a [`TransientError`](crate::errors::TransientError).
    Transient,
}

impl Default for RetryOn {
    fn default() -> Self {
        RetryOn::AnyError
    }
}

impl FromStr for RetryOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "any_error" | "any" => Ok(RetryOn::AnyError),
            "transient" => Ok(RetryOn::Transient),
            other => Err(format!(
                "invalid retry_on: {other} (expected \"any_error\" or \"transient\")"
            )),
        }
    }
}

/// Backfill behaviour when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    FailFast,
    Retry,
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        OnFailure::Continue
    }
}

impl FromStr for OnFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(OnFailure::FailFast),
            "retry" => Ok(OnFailure::Retry),
            "continue" => Ok(OnFailure::Continue),
            other => Err(format!(
                "invalid on_failure: {other} (expected \"fail_fast\", \"retry\" or \"continue\")"
            )),
        }
    }
}
