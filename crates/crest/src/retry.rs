//! Retry policies.
//!
//! A [`RetryHandler`] sees every transport failure and every error response of an
//! invocation, together with the number of attempts made so far, and decides whether the
//! executor tries again. Other errors (encoding, configuration, authorization) never reach
//! it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crest_common::ClientError;
use http::StatusCode;

use crate::request::Request;

/// What the executor does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send again, after the handler's backoff.
    Retry,
    /// Give up and surface the error.
    Fail,
    /// Refresh the method's credentials, then send again immediately.
    RefreshAndRetry,
}

/// Decides whether a failed attempt is retried.
pub trait RetryHandler: Debug + Send + Sync {
    /// `attempt` counts attempts made so far, starting at 1.
    fn decide(&self, request: &Request, attempt: u32, error: &ClientError) -> RetryDecision;

    /// Delay before attempt `attempt + 1`.
    fn backoff(&self, _attempt: u32, _error: &ClientError) -> Option<Duration> {
        None
    }
}

/// Retries anything until `max_attempts` attempts have been made, without delay.
#[derive(Debug, Clone, Copy)]
pub struct MaxAttemptsRetryHandler {
    max_attempts: u32,
}

impl MaxAttemptsRetryHandler {
    /// `max_attempts` includes the first one; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Attempts allowed, the first included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for MaxAttemptsRetryHandler {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryHandler for MaxAttemptsRetryHandler {
    fn decide(&self, _request: &Request, attempt: u32, _error: &ClientError) -> RetryDecision {
        if attempt < self.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::Fail
        }
    }
}

/// Adds exponentially growing delays to another handler's decisions.
///
/// The delay before attempt `n + 1` is `base * factor^(n - 1)`, capped at `max`. A
/// `Retry-After` header in seconds on a 429 or 503 response takes precedence, under the
/// same cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff<H> {
    inner: H,
    base: Duration,
    factor: f64,
    max: Duration,
}

impl<H: RetryHandler> ExponentialBackoff<H> {
    /// Delay `base * factor^(attempt - 1)`, capped at `max`, between attempts `inner` allows.
    pub fn new(inner: H, base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            inner,
            base,
            factor: factor.max(1.0),
            max: max.max(base),
        }
    }

    fn retry_after(error: &ClientError) -> Option<Duration> {
        let ClientError::Http(response) = error else {
            return None;
        };
        if !matches!(
            response.status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return None;
        }
        response
            .header(http::header::RETRY_AFTER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

impl<H: RetryHandler> RetryHandler for ExponentialBackoff<H> {
    fn decide(&self, request: &Request, attempt: u32, error: &ClientError) -> RetryDecision {
        self.inner.decide(request, attempt, error)
    }

    fn backoff(&self, attempt: u32, error: &ClientError) -> Option<Duration> {
        if let Some(delay) = Self::retry_after(error) {
            return Some(delay.min(self.max));
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            Some(self.max)
        } else {
            Some(Duration::from_secs_f64(secs))
        }
    }
}

/// Turns the first 401 of an invocation into a credential refresh.
///
/// Lives for one invocation only; every other decision is left to the wrapped handler.
#[derive(Debug)]
pub struct RefreshingRetryHandler<'h> {
    inner: &'h dyn RetryHandler,
    refreshed: AtomicBool,
}

impl<'h> RefreshingRetryHandler<'h> {
    /// Wrap `inner` for one invocation.
    pub fn new(inner: &'h dyn RetryHandler) -> Self {
        Self {
            inner,
            refreshed: AtomicBool::new(false),
        }
    }
}

impl RetryHandler for RefreshingRetryHandler<'_> {
    fn decide(&self, request: &Request, attempt: u32, error: &ClientError) -> RetryDecision {
        if error.status() == Some(StatusCode::UNAUTHORIZED)
            && !self.refreshed.swap(true, Ordering::AcqRel)
        {
            return RetryDecision::RefreshAndRetry;
        }
        self.inner.decide(request, attempt, error)
    }

    fn backoff(&self, attempt: u32, error: &ClientError) -> Option<Duration> {
        self.inner.backoff(attempt, error)
    }
}
