//! Bounded polling for asynchronously provisioned objects.
//!
//! A [`StatePoller`] repeatedly calls a refresh function until the reported
//! state label lands in the target set. Any label outside the pending and
//! target sets ends the wait immediately. The wait is bounded by a timeout
//! and can be aborted through a [`CancellationToken`].

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use mx_client::ClientError;
use rand::Rng;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollSettings;
use crate::error::Error;

/// Errors a refresh function may report as worth retrying.
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for ClientError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// The snapshot whose state reached the target set.
    pub snapshot: T,
    pub state: String,
    /// Refresh calls made, including failed ones.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Why a wait ended without reaching a target state.
#[derive(Debug)]
pub enum PollError<T, E> {
    /// The window closed while the object was still pending.
    Timeout {
        last_state: Option<String>,
        elapsed: Duration,
    },
    /// A state outside both sets was observed.
    Unexpected { state: String, snapshot: T },
    Cancelled { last_state: Option<String> },
    /// The refresh function failed and the failure was not retried.
    Refresh(E),
}

impl<T> PollError<T, ClientError> {
    /// Attach the object the wait concerned.
    #[must_use]
    pub fn into_error(self, kind: &'static str, identity: &str) -> Error {
        match self {
            Self::Timeout {
                last_state,
                elapsed,
            } => Error::Timeout {
                kind,
                identity: identity.to_string(),
                last_state: last_state.unwrap_or_else(|| "unknown".to_string()),
                elapsed,
            },
            Self::Unexpected { state, .. } => Error::TerminalState {
                kind,
                identity: identity.to_string(),
                state,
            },
            Self::Cancelled { .. } => Error::Cancelled {
                kind,
                identity: identity.to_string(),
            },
            Self::Refresh(source) => Error::remote(kind, identity, "read", source),
        }
    }
}

/// Waits for a remote object to reach one of a set of target states.
#[derive(Debug, Clone)]
pub struct StatePoller {
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    settings: PollSettings,
}

impl StatePoller {
    /// Create a poller with the default data resource bounds.
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            settings: PollSettings::default(),
        }
    }

    /// Use the given bounds.
    #[must_use]
    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override transient-error retries.
    #[must_use]
    pub const fn with_retry_transient(mut self, retry: bool) -> Self {
        self.settings.retry_transient = retry;
        self
    }

    /// Poll `refresh` until its state reaches the target set.
    ///
    /// `refresh` returns a snapshot and its state label. The first call
    /// happens after the configured delay; consecutive calls are at least
    /// `min_interval` apart. The timeout is checked after every pending
    /// observation and also bounds a refresh that never returns, so the wait
    /// overshoots it by at most one interval.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Unexpected`] for a state outside both sets,
    /// [`PollError::Timeout`] when the window closes, [`PollError::Cancelled`]
    /// when `cancel` fires, or [`PollError::Refresh`] for a refresh failure
    /// that is not retried.
    pub async fn wait<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut refresh: F,
    ) -> Result<Polled<T>, PollError<T, E>>
    where
        T: Send,
        E: TransientError + std::fmt::Display + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<(T, String), E>> + Send,
    {
        let started = Instant::now();
        // `None` only when the timeout overflows the clock: no deadline.
        let deadline = started.checked_add(self.settings.timeout);
        let mut attempts: u32 = 0;
        let mut last_state: Option<String> = None;

        if !pause(cancel, self.settings.delay).await {
            return Err(PollError::Cancelled { last_state });
        }

        loop {
            attempts = attempts.saturating_add(1);
            let observed = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled { last_state }),
                observed = refresh() => observed,
                () = expire(deadline) => {
                    warn!(attempt = attempts, "Refresh still outstanding at the deadline");
                    return Err(PollError::Timeout {
                        last_state,
                        elapsed: started.elapsed(),
                    });
                }
            };
            let elapsed = started.elapsed();

            match observed {
                Ok((snapshot, state)) => {
                    debug!(
                        attempt = attempts,
                        state = %state,
                        elapsed_ms = elapsed.as_millis(),
                        "Polled state"
                    );
                    if self.target.contains(&state) {
                        return Ok(Polled {
                            snapshot,
                            state,
                            attempts,
                            elapsed,
                        });
                    }
                    if !self.pending.contains(&state) {
                        return Err(PollError::Unexpected { state, snapshot });
                    }
                    last_state = Some(state);
                }
                Err(e) if self.settings.retry_transient && e.is_transient() => {
                    warn!(attempt = attempts, error = %e, "Transient refresh failure, retrying");
                }
                Err(e) => return Err(PollError::Refresh(e)),
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(PollError::Timeout {
                    last_state,
                    elapsed: started.elapsed(),
                });
            }

            if !pause(cancel, self.next_interval()).await {
                return Err(PollError::Cancelled { last_state });
            }
        }
    }

    /// Minimum interval plus up to `jitter`; never shorter than the minimum.
    fn next_interval(&self) -> Duration {
        let jitter_ms = u64::try_from(self.settings.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.settings.min_interval;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.settings
            .min_interval
            .saturating_add(Duration::from_millis(extra))
    }
}

/// Resolves at `deadline`, or never without one.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn poller() -> StatePoller {
        StatePoller::new(["pending", "starting"], ["ready"]).with_settings(
            PollSettings::resource()
                .with_timeout(Duration::from_secs(600))
                .with_delay(Duration::from_secs(30))
                .with_min_interval(Duration::from_secs(30)),
        )
    }

    /// Refresh function reporting `pending` for `n` calls, then `ready`.
    fn pending_then_ready(
        n: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<(u32, String), ClientError>> + Send {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let state = if call > n { "ready" } else { "pending" };
            std::future::ready(Ok((call, state.to_string())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_after_pending_observations() {
        let calls = Arc::new(AtomicU32::new(0));
        let polled = poller()
            .wait(&CancellationToken::new(), pending_then_ready(3, calls.clone()))
            .await
            .unwrap();

        assert_eq!(polled.state, "ready");
        assert_eq!(polled.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Initial delay plus three intervals.
        assert!(polled.elapsed >= Duration::from_secs(120));
        assert!(polled.elapsed < Duration::from_secs(121));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state_returns_snapshot() {
        let result = poller()
            .wait(&CancellationToken::new(), || async {
                Ok::<_, ClientError>(("snapshot", "failed".to_string()))
            })
            .await;

        match result {
            Err(PollError::Unexpected { state, snapshot }) => {
                assert_eq!(state, "failed");
                assert_eq!(snapshot, "snapshot");
            }
            other => panic!("expected unexpected state, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(45)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = poller()
            .wait(&cancel, || async {
                Ok::<_, ClientError>(((), "pending".to_string()))
            })
            .await;

        assert!(matches!(result, Err(PollError::Cancelled { last_state: Some(_) })));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_refresh_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poller()
            .wait(&CancellationToken::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<((), String), _>(ClientError::unauthorized("expired")) }
            })
            .await;

        assert!(matches!(result, Err(PollError::Refresh(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_only_when_enabled() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let polled = poller()
            .wait(&CancellationToken::new(), move || {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(ClientError::transport("reset"))
                    } else {
                        Ok(((), "ready".to_string()))
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(polled.attempts, 2);

        let result = poller()
            .with_retry_transient(false)
            .wait(&CancellationToken::new(), || async {
                Err::<((), String), _>(ClientError::transport("reset"))
            })
            .await;
        assert!(matches!(result, Err(PollError::Refresh(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_times_out_at_deadline() {
        let poller = StatePoller::new(["pending"], ["ready"]).with_settings(
            PollSettings::connector()
                .with_timeout(Duration::from_secs(60))
                .with_delay(Duration::from_secs(1))
                .with_min_interval(Duration::from_secs(1)),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(3600),
            poller.wait(&CancellationToken::new(), || {
                std::future::pending::<Result<((), String), ClientError>>()
            }),
        )
        .await
        .unwrap();

        let Err(PollError::Timeout {
            last_state,
            elapsed,
        }) = &result
        else {
            panic!("expected timeout, got {result:?}");
        };
        assert!(last_state.is_none());
        assert!(*elapsed >= Duration::from_secs(60));
        assert!(*elapsed <= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_keeps_last_state_on_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let poller = StatePoller::new(["pending"], ["ready"]).with_settings(
            PollSettings::connector()
                .with_timeout(Duration::from_secs(60))
                .with_delay(Duration::from_secs(1))
                .with_min_interval(Duration::from_secs(5)),
        );

        let result = poller
            .wait(&CancellationToken::new(), move || {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call > 0 {
                        std::future::pending::<()>().await;
                    }
                    Ok::<_, ClientError>(((), "pending".to_string()))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(PollError::Timeout { last_state: Some(ref s), .. }) if s == "pending"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_jitter_never_undercuts_min_interval() {
        let poller = StatePoller::new(["a"], ["b"]).with_settings(
            PollSettings::connector()
                .with_min_interval(Duration::from_secs(5))
                .with_jitter(Duration::from_secs(2)),
        );
        for _ in 0..100 {
            let interval = poller.next_interval();
            assert!(interval >= Duration::from_secs(5));
            assert!(interval <= Duration::from_secs(7));
        }
    }

    #[test]
    fn test_timeout_maps_to_error_with_last_state() {
        let err = PollError::<(), ClientError>::Timeout {
            last_state: Some("starting".into()),
            elapsed: Duration::from_secs(630),
        }
        .into_error("resource", "9");
        let message = err.to_string();
        assert!(message.contains("starting"));
        assert!(message.contains("630s"));
    }
}
