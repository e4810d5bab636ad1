//! HTTP error categorisation and the bounded retry loop shared by the
//! Google clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Quota,
    Permission,
    NotFound,
    Transport,
    Api,
}

impl ApiErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorKind::Quota => "quota",
            ApiErrorKind::Permission => "permission",
            ApiErrorKind::NotFound => "not-found",
            ApiErrorKind::Transport => "transport",
            ApiErrorKind::Api => "api",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, ApiErrorKind::Quota | ApiErrorKind::Transport)
    }

    pub fn hint(self) -> &'static str {
        match self {
            ApiErrorKind::Quota => {
                "API quota exceeded: lower batch sizes or raise retry.base_delay_ms"
            }
            ApiErrorKind::Permission => {
                "permission denied: share the spreadsheet/folder with the account behind the token"
            }
            ApiErrorKind::NotFound => "not found: check sheets.spreadsheet_id / drive.folder_id",
            ApiErrorKind::Transport => "network problem: check connectivity and retry",
            ApiErrorKind::Api => "unexpected API response",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an HTTP status and response body to an error category.
pub fn classify(status: u16, body: &str) -> ApiErrorKind {
    let lower = body.to_lowercase();
    match status {
        429 => ApiErrorKind::Quota,
        403 if lower.contains("quota") || lower.contains("rate limit") => ApiErrorKind::Quota,
        401 | 403 => ApiErrorKind::Permission,
        404 => ApiErrorKind::NotFound,
        500..=599 => ApiErrorKind::Transport,
        _ if lower.contains("quota") => ApiErrorKind::Quota,
        _ => ApiErrorKind::Api,
    }
}

/// Build an [`PipelineError::Api`] from a failed response.
pub fn api_error(service: &'static str, status: u16, body: &str) -> PipelineError {
    let message: String = body.chars().take(300).collect();
    PipelineError::Api {
        service,
        kind: classify(status, body),
        status,
        message,
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    /// Values too large to represent are clamped to `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = e.api_kind().is_some_and(|k| k.is_retryable());
                    if !retryable || attempt >= attempts {
                        return Err(e);
                    }
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "{what} failed (attempt {attempt}/{attempts}): {e}; retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
