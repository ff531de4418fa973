//! Retry controller
//!
//! Drives repeated attempts of one request until it succeeds, the budget runs out, or a failure
//! that must not be retried shows up.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries); the default is 1 + 5.
//! - The first attempt starts immediately. After a retryable failure (connection error or a
//!   status of 400 and above) the policy waits `backoff.delay(attempts_made)` and tries again.
//! - Anything else (unknown protocol, payload errors after a good status, ...) ends the operation
//!   on the spot, regardless of remaining budget.
//! - When the budget is spent the last error is returned as-is.
//! - Every terminal failure is logged at `error` level before it is returned.
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - The sleeper is invoked exactly once between two consecutive attempts, never before the
//!   first and never after the last.
//!
//! ```rust
//! use std::time::Duration;
//! use insistent::{Backoff, InstantSleeper, RequestError, RetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .retries(2)
//!     .backoff(Backoff::constant(Duration::from_millis(100)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let result: Result<(), RequestError> = policy
//!     .execute(|_state| async { Err(RequestError::Status { status: 503 }) })
//!     .await;
//! assert_eq!(result.unwrap_err().status(), Some(503));
//! # });
//! ```

use crate::request::{Attempt, PreparedRequest};
use crate::{Backoff, RequestError, Sleeper, TokioSleeper};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Retries after the initial attempt when nothing else is configured.
pub const DEFAULT_RETRIES: usize = 5;

/// Where one operation stands in its retry budget. Advancing yields a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: usize,
    max_attempts: usize,
}

impl RetryState {
    /// State of the initial attempt.
    pub fn first(max_attempts: usize) -> Self {
        Self { attempt: 1, max_attempts }
    }

    /// 1-based index of the current attempt.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Attempts still available after the current one.
    pub fn retries_left(&self) -> usize {
        self.max_attempts.saturating_sub(self.attempt)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// State of the following attempt, or `None` once the budget is spent.
    pub fn next(self) -> Option<Self> {
        if self.is_exhausted() {
            None
        } else {
            Some(Self { attempt: self.attempt + 1, ..self })
        }
    }
}

/// Retry budget, backoff schedule and the sleeper that realizes it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run `operation` until it succeeds, fails fatally, or exhausts the budget.
    ///
    /// `operation` receives the state of the attempt it is about to make.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, RequestError>
    where
        T: Send,
        Fut: Future<Output = Result<T, RequestError>> + Send,
        Op: FnMut(RetryState) -> Fut + Send,
    {
        let mut state = RetryState::first(self.max_attempts);

        loop {
            let err = match operation(state).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let next = if err.is_retryable() { state.next() } else { None };
            let Some(next) = next else {
                log_failure(&err, state.attempt());
                return Err(err);
            };

            let delay = self.backoff.delay(state.attempt());
            tracing::debug!(
                attempt = state.attempt(),
                max_attempts = self.max_attempts,
                ?delay,
                error = %err,
                "attempt failed, retrying"
            );
            self.sleeper.sleep(delay).await;
            state = next;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRIES + 1,
            backoff: Backoff::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Log a terminal failure. Payload failures include the fragment received before the error.
pub(crate) fn log_failure(err: &RequestError, attempts: usize) {
    match err.partial_payload() {
        Some(partial) => tracing::error!(error = %err, attempts, partial, "response error"),
        None => tracing::error!(error = %err, attempts, "request error"),
    }
}

/// Builder for `RetryPolicy`.
#[derive(Debug)]
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(usize),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl RetryPolicyBuilder {
    /// Six attempts, constant 100ms backoff, tokio timer.
    pub fn new() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            backoff: defaults.backoff,
            sleeper: defaults.sleeper,
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the number of retries after the initial attempt.
    pub fn retries(self, retries: usize) -> Self {
        self.max_attempts(retries.saturating_add(1))
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            sleeper: self.sleeper,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tower layer that retries a per-attempt transport.
#[derive(Debug, Clone, Default)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone() }
    }
}

/// Service produced by `RetryLayer`: takes a whole request, hands the inner service one
/// `Attempt` per try.
#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryService<S> {
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<S> Service<PreparedRequest> for RetryService<S>
where
    S: Service<Attempt, Response = String, Error = RequestError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = String;
    type Error = RequestError;
    type Future = BoxFuture<'static, Result<String, RequestError>>;

    // Readiness is checked per attempt on a fresh clone of the inner service.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: PreparedRequest) -> Self::Future {
        let inner = self.inner.clone();
        let policy = self.policy.clone();
        let request = Arc::new(request);
        Box::pin(async move {
            policy
                .execute(|state| {
                    inner.clone().oneshot(Attempt::new(Arc::clone(&request), state.attempt()))
                })
                .await
        })
    }
}
