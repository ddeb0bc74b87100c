//! Lifecycle state of one switchyard instance and the drain that ends it.
//!
//! The state lives in an `ArcSwap` so health probes read it without locking;
//! submissions hold an [`InFlightGuard`] so the drain knows when they finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

/// Lifecycle of an instance: `Starting -> Ready -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Listener bound, not yet serving.
    Starting,
    /// Accepting submissions.
    Ready,
    /// Shutdown signalled; new submissions get 503.
    Draining,
    /// Every in-flight submission has finished.
    Stopped,
}

impl HealthState {
    /// Status string reported by `GET /health`.
    #[must_use]
    pub fn as_status(self) -> &'static str {
        match self {
            Self::Ready => "UP",
            Self::Starting => "STARTING",
            Self::Draining | Self::Stopped => "DOWN",
        }
    }
}

/// Shared by the listener, the handlers and the health probes.
///
/// [`begin_drain`](Self::begin_drain) stops admission;
/// [`wait_for_drain`](Self::wait_for_drain) then waits for the submissions
/// already admitted.
#[derive(Debug)]
pub struct ShutdownController {
    in_flight: Arc<AtomicU64>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining`. Idempotent while draining; never moves a
    /// `Stopped` instance backwards.
    pub fn begin_drain(&self) {
        self.health_state.rcu(|current| match **current {
            HealthState::Stopped => Arc::clone(current),
            _ => Arc::new(HealthState::Draining),
        });
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Only `Ready` admits new submissions.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.health_state() == HealthState::Ready
    }

    /// Counts a submission until the guard drops, unwinding included.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Polls until no submission is in flight.
    ///
    /// Returns `true` and moves to `Stopped` once the count reaches zero;
    /// returns `false` and stays `Draining` if `timeout` elapses first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight_count() == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a submission handler for the lifetime of one dispatch.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
