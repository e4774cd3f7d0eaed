//! Retry-read wrapper for eventually consistent backends.
//!
//! The Asserts API acknowledges writes before they are visible to reads.
//! Resources therefore poll the object they just wrote with
//! [`with_retry_read`]: a bounded loop with a fixed grace delay followed by
//! capped exponential backoff.
//!
//! | attempt | delay before attempt |
//! |---------|----------------------|
//! | 1       | 1s                   |
//! | 2       | 1s                   |
//! | 3       | 2s                   |
//! | 4       | 4s                   |
//! | 5       | 8s                   |
//! | 6+      | 16s                  |
//!
//! The operation receives `(attempt, max_attempts)` and classifies its own
//! failures as [`RetryError::Retryable`] or [`RetryError::Terminal`]. The
//! `max_attempts` value is advisory: the classification helpers
//! ([`not_found`], [`api_failure`]) use it to escalate to a terminal error,
//! but the loop itself is bounded only by [`RetryPolicy::timeout`] and
//! cancellation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RequestError;

/// Default overall deadline of a retry-read loop.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default advisory attempt budget passed to operations.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

const GRACE_DELAY: Duration = Duration::from_secs(1);
const MAX_BACKOFF_EXPONENT: u32 = 4;

/// Tuning for [`with_retry_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Overall deadline for the loop, measured from the call.
    pub timeout: Duration,
    /// Advisory attempt budget handed to the operation.
    pub max_attempts: u32,
    /// Draw each delay uniformly from `[base/2, base]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Policy with a different deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Policy with a different advisory attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Base delay slept before the given 1-based attempt.
    pub fn base_delay(attempt: u32) -> Duration {
        if attempt <= 1 {
            return GRACE_DELAY;
        }
        let exponent = (attempt - 2).min(MAX_BACKOFF_EXPONENT);
        Duration::from_secs(1u64 << exponent)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = Self::base_delay(attempt);
        if !self.jitter {
            return base;
        }
        let min = base / 2;
        let spread = base - min;
        if spread.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=spread.as_millis() as u64);
        min + Duration::from_millis(extra)
    }
}

/// Classified outcome of a failed attempt.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Try again after the next backoff delay.
    Retryable(E),
    /// Stop and return this error.
    Terminal(E),
}

/// Why [`with_retry_read`] gave up.
#[derive(Debug, Error)]
pub enum RetryReadError<E>
where
    E: std::error::Error + 'static,
{
    /// The operation returned a terminal error.
    #[error(transparent)]
    Terminal(E),

    /// The deadline elapsed. Carries the last retryable error, if any attempt ran.
    #[error("timeout after {elapsed:?} waiting for a consistent read{}", describe_last(.last))]
    Timeout {
        /// Time spent in the loop.
        elapsed: Duration,
        /// The last retryable error observed.
        last: Option<E>,
    },

    /// The host cancelled the operation.
    #[error("retry-read cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts completed before cancellation.
        attempts: u32,
    },
}

fn describe_last<E: fmt::Display>(last: &Option<E>) -> String {
    match last {
        Some(err) => format!(": {}", err),
        None => String::new(),
    }
}

impl<E> RetryReadError<E>
where
    E: std::error::Error + 'static,
{
    /// The error that ended the loop, when one was observed.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Terminal(err) => Some(err),
            Self::Timeout { last, .. } => last.as_ref(),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, the deadline elapses
/// or `cancel` fires.
///
/// Cancellation is checked before every sleep and observed during it. Each
/// attempt is also bounded by the deadline.
///
/// # Example
///
/// ```ignore
/// let rules = with_retry_read(policy, &cancel, |attempt, max| async move {
///     match client.get_prom_rules(stack_id, &name).await {
///         Ok(rules) => Ok(rules),
///         Err(err) if err.is_not_found() => {
///             Err(not_found("Prometheus rules file", &name, attempt, max))
///         },
///         Err(err) => Err(api_failure("get Prometheus rules file", attempt, max, err)),
///     }
/// })
/// .await?;
/// ```
pub async fn with_retry_read<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryReadError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut last: Option<E> = None;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryReadError::Cancelled { attempts: attempt });
        }

        attempt += 1;
        let wake_at = Instant::now() + policy.delay(attempt);
        if wake_at >= deadline {
            return Err(RetryReadError::Timeout {
                elapsed: start.elapsed(),
                last,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryReadError::Cancelled { attempts: attempt - 1 });
            }
            _ = tokio::time::sleep_until(wake_at) => {},
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryReadError::Cancelled { attempts: attempt - 1 });
            }
            outcome = tokio::time::timeout_at(
                deadline,
                operation(attempt, policy.max_attempts),
            ) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(attempt, "read became consistent");
                }
                return Ok(value);
            }
            Ok(Err(RetryError::Terminal(err))) => {
                warn!(attempt, error = %err, "read failed terminally");
                return Err(RetryReadError::Terminal(err));
            }
            Ok(Err(RetryError::Retryable(err))) => {
                debug!(attempt, max_attempts = policy.max_attempts, error = %err, "read not yet consistent");
                last = Some(err);
            }
            Err(_elapsed) => {
                return Err(RetryReadError::Timeout {
                    elapsed: start.elapsed(),
                    last,
                });
            }
        }
    }
}

/// Failure of a single read attempt against an eventually consistent API.
#[derive(Debug, Error)]
pub enum ReadFailure {
    /// The object is not visible yet.
    #[error("{resource_type} {name} not found (attempt {attempt}/{max_attempts})")]
    NotYetVisible {
        /// Human readable resource kind.
        resource_type: String,
        /// The object name.
        name: String,
        /// The attempt that observed the miss.
        attempt: u32,
        /// The advisory attempt budget.
        max_attempts: u32,
    },

    /// The object stayed invisible for the whole attempt budget.
    #[error("{resource_type} {name} not found after {attempt} retries - may indicate a permanent issue")]
    NotFound {
        /// Human readable resource kind.
        resource_type: String,
        /// The object name.
        name: String,
        /// The attempt that gave up.
        attempt: u32,
    },

    /// An API call failed; it may succeed on a later attempt.
    #[error("failed to {operation}: {source}")]
    Api {
        /// What was being attempted, e.g. `get stack status`.
        operation: String,
        /// The request failure.
        #[source]
        source: RequestError,
    },

    /// A freshly written object is not readable yet.
    #[error("{0} not yet visible")]
    NotVisible(String),

    /// An API call kept failing for the whole attempt budget.
    #[error("failed to {operation} after {attempt} retries: {source}")]
    Exhausted {
        /// What was being attempted.
        operation: String,
        /// The attempt that gave up.
        attempt: u32,
        /// The last request failure.
        #[source]
        source: RequestError,
    },
}

impl ReadFailure {
    /// Whether this failure means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotYetVisible { .. } | Self::NotFound { .. } | Self::NotVisible(_) => true,
            Self::Api { source, .. } | Self::Exhausted { source, .. } => source.is_not_found(),
        }
    }
}

impl RetryReadError<ReadFailure> {
    /// Whether the loop ended because the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.last_error().is_some_and(ReadFailure::is_not_found)
    }
}

/// Classify a missing object: retryable below the attempt budget, terminal at it.
pub fn not_found(
    resource_type: &str,
    name: &str,
    attempt: u32,
    max_attempts: u32,
) -> RetryError<ReadFailure> {
    if attempt >= max_attempts {
        RetryError::Terminal(ReadFailure::NotFound {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attempt,
        })
    } else {
        RetryError::Retryable(ReadFailure::NotYetVisible {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attempt,
            max_attempts,
        })
    }
}

/// Classify an API failure: retryable below the attempt budget, terminal at it.
///
/// A 401 is always terminal.
pub fn api_failure(
    operation: &str,
    attempt: u32,
    max_attempts: u32,
    source: RequestError,
) -> RetryError<ReadFailure> {
    if source.is_unauthorized() {
        return RetryError::Terminal(ReadFailure::Api {
            operation: operation.to_string(),
            source,
        });
    }
    if attempt >= max_attempts {
        RetryError::Terminal(ReadFailure::Exhausted {
            operation: operation.to_string(),
            attempt,
            source,
        })
    } else {
        RetryError::Retryable(ReadFailure::Api {
            operation: operation.to_string(),
            source,
        })
    }
}

/// Poll `fetch` until a freshly written object becomes readable.
///
/// A 404 is retried as "`{what}` not yet visible"; any other failure ends
/// the wait immediately.
pub async fn wait_until_visible<F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut fetch: F,
) -> Result<(), RetryReadError<ReadFailure>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RequestError>>,
{
    with_retry_read(policy, cancel, |_, _| {
        let attempt = fetch();
        async move {
            match attempt.await {
                Ok(()) => Ok(()),
                Err(err) if err.is_not_found() => {
                    Err(RetryError::Retryable(ReadFailure::NotVisible(what.to_string())))
                }
                Err(err) => Err(RetryError::Terminal(ReadFailure::Api {
                    operation: format!("check {what}"),
                    source: err,
                })),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, TransportError};
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_pending, assert_ready, task};

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Flaky(&'static str);

    #[test]
    fn test_base_delay_schedule() {
        let delays: Vec<u64> = (1..=8)
            .map(|attempt| RetryPolicy::base_delay(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 1, 2, 4, 8, 16, 16, 16]);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default().with_jitter(true);
        for attempt in 1..10 {
            let base = RetryPolicy::base_delay(attempt);
            let delay = policy.delay(attempt);
            assert!(
                delay >= base / 2 && delay <= base,
                "{delay:?} outside [{:?}, {base:?}]",
                base / 2
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_timing_until_success() {
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let recorder = seen.clone();
        let result = with_retry_read(RetryPolicy::default(), &cancel, move |attempt, max| {
            recorder.lock().unwrap().push((attempt, max, start.elapsed()));
            async move {
                if attempt < 5 {
                    Err(RetryError::Retryable(Flaky("not yet")))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 5);
        let seen = seen.lock().unwrap();
        let offsets: Vec<u64> = seen.iter().map(|(_, _, at)| at.as_secs()).collect();
        // 1s grace, then 1, 2, 4, 8
        assert_eq!(offsets, vec![1, 2, 4, 8, 16]);
        assert!(seen.iter().all(|(_, max, _)| *max == DEFAULT_MAX_ATTEMPTS));
        assert!(start.elapsed() < DEFAULT_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_stops_immediately() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = with_retry_read(RetryPolicy::default(), &cancel, move |_, _| {
            *counter.lock().unwrap() += 1;
            async { Err(RetryError::Terminal(Flaky("permission denied"))) }
        })
        .await;

        match result {
            Err(RetryReadError::Terminal(err)) => assert_eq!(err.to_string(), "permission denied"),
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_loop() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result: Result<(), _> = with_retry_read(RetryPolicy::default(), &cancel, |_, _| async {
            Err(RetryError::Retryable(Flaky("still missing")))
        })
        .await;

        match result {
            Err(RetryReadError::Timeout { last, .. }) => {
                assert_eq!(last.unwrap().to_string(), "still missing");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(start.elapsed() <= DEFAULT_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_is_not_enforced_by_the_loop() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default().with_max_attempts(2);

        let result = with_retry_read(policy, &cancel, |attempt, _| async move {
            if attempt < 4 {
                Err(RetryError::Retryable(Flaky("retry")))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = with_retry_read(RetryPolicy::default(), &cancel, |_, _| async {
            Err(RetryError::Retryable(Flaky("unreachable")))
        })
        .await;

        assert!(matches!(result, Err(RetryReadError::Cancelled { attempts: 0 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = with_retry_read(RetryPolicy::default(), &cancel, |_, _| async {
            Err(RetryError::Retryable(Flaky("missing")))
        })
        .await;

        assert!(matches!(result, Err(RetryReadError::Cancelled { attempts: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_during_backoff_until_cancelled() {
        let cancel = CancellationToken::new();
        let mut read = task::spawn(with_retry_read(RetryPolicy::default(), &cancel, |_, _| async {
            Err::<(), _>(RetryError::Retryable(Flaky("missing")))
        }));

        assert_pending!(read.poll());
        cancel.cancel();
        assert!(read.is_woken());
        let result = assert_ready!(read.poll());
        assert!(matches!(result, Err(RetryReadError::Cancelled { attempts: 0 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_attempt_in_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<(), _> =
            with_retry_read(RetryPolicy::default(), &cancel, move |attempt, _| {
                if attempt == 2 {
                    trigger.cancel();
                }
                async { Err(RetryError::Retryable(Flaky("missing"))) }
            })
            .await;

        assert!(matches!(result, Err(RetryReadError::Cancelled { attempts: 1 })));
    }

    #[test]
    fn test_not_found_classification() {
        match not_found("Prometheus rules file", "latency", 3, 15) {
            RetryError::Retryable(err) => {
                assert_eq!(
                    err.to_string(),
                    "Prometheus rules file latency not found (attempt 3/15)"
                );
                assert!(err.is_not_found());
            }
            RetryError::Terminal(_) => panic!("expected retryable"),
        }

        match not_found("Prometheus rules file", "latency", 15, 15) {
            RetryError::Terminal(err) => assert_eq!(
                err.to_string(),
                "Prometheus rules file latency not found after 15 retries - may indicate a permanent issue"
            ),
            RetryError::Retryable(_) => panic!("expected terminal"),
        }
    }

    #[test]
    fn test_api_failure_classification() {
        let err = || {
            RequestError::new("get", ApiError::Status { status: 503, body: String::new() })
        };

        match api_failure("get stack status", 1, 3, err()) {
            RetryError::Retryable(e) => {
                assert_eq!(e.to_string(), "failed to get stack status: get: status: 503");
                assert!(!e.is_not_found());
            }
            RetryError::Terminal(_) => panic!("expected retryable"),
        }

        match api_failure("get stack status", 3, 3, err()) {
            RetryError::Terminal(e) => assert_eq!(
                e.to_string(),
                "failed to get stack status after 3 retries: get: status: 503"
            ),
            RetryError::Retryable(_) => panic!("expected terminal"),
        }
    }

    #[test]
    fn test_api_failure_unauthorized_is_terminal() {
        let err = RequestError::new("get", ApiError::Unauthorized);
        match api_failure("get stack status", 1, 15, err) {
            RetryError::Terminal(e) => assert_eq!(
                e.to_string(),
                "failed to get stack status: get: request not authorized for stack"
            ),
            RetryError::Retryable(_) => panic!("expected terminal"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_not_found_is_not_found() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default().with_timeout(Duration::from_secs(10));

        let result: Result<(), _> = with_retry_read(policy, &cancel, |attempt, max| async move {
            Err(not_found("stack", "42", attempt, max))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryReadError::Timeout { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_retries_http_failures() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let what = "custom model rules \"svc\"";
        let result = wait_until_visible(RetryPolicy::default(), &cancel, what, move || {
            let n = {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                *calls
            };
            async move {
                if n < 3 {
                    Err(RequestError::new("get", ApiError::NotFound))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_times_out_with_message() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default().with_timeout(Duration::from_secs(5));

        let what = "threshold rules for scope \"request\"";
        let err = wait_until_visible(policy, &cancel, what, || async {
            Err(RequestError::new("get", ApiError::NotFound))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err.last_error().unwrap().to_string(),
            "threshold rules for scope \"request\" not yet visible"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_stops_on_unauthorized() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let err = wait_until_visible(RetryPolicy::default(), &cancel, "rules", move || {
            *counter.lock().unwrap() += 1;
            async { Err(RequestError::new("get", ApiError::Unauthorized)) }
        })
        .await
        .unwrap_err();

        match err {
            RetryReadError::Terminal(ReadFailure::Api { source, .. }) => {
                assert!(source.is_unauthorized())
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_stops_on_server_error() {
        let cancel = CancellationToken::new();

        let err = wait_until_visible(RetryPolicy::default(), &cancel, "rules", || async {
            Err(RequestError::new("get", ApiError::Status { status: 500, body: String::new() }))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryReadError::Terminal(ReadFailure::Api { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_stops_on_transport_error() {
        let cancel = CancellationToken::new();

        let err = wait_until_visible(RetryPolicy::default(), &cancel, "rules", || async {
            Err(RequestError::new(
                "get",
                ApiError::Transport(TransportError::new("connection refused")),
            ))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryReadError::Terminal(ReadFailure::Api { .. })));
    }
}
