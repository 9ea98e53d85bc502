//! Stability tracking for the constant-condition wait.
//!
//! [`StabilityTracker`] is the pure state machine: it is fed one in-band /
//! out-of-band observation per poll and reports whether the set points have
//! been held long enough. The polling loop that drives it lives in
//! [`ClimateChamber::wait_until_stable`](crate::instrument::ClimateChamber::wait_until_stable).
//!
//! ```text
//!            in band                     held >= stable_time
//! Unstable ───────────▶ Stabilizing ─────────────────────────▶ Stable
//!    ▲                      │
//!    └──── out of band ─────┘
//! ```
//!
//! The timer starts at the first in-band observation and is discarded on any
//! excursion, so `Stable` is only reported after the readings have been seen
//! in band, without interruption, for the whole `stable_time`.

use crate::instrument::status::{HumidityStatus, TemperatureStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Result of feeding one observation to a [`StabilityTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityState {
    /// At least one axis is outside its band
    Unstable,
    /// Both axes are in band; `remaining` is left before they count as stable
    Stabilizing {
        /// Time still to hold
        remaining: Duration,
    },
    /// Both axes have been in band for at least the stable time
    Stable,
}

/// Stability timer.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    stable_time: Duration,
    since: Option<Instant>,
}

impl StabilityTracker {
    /// Create a tracker requiring `stable_time` of uninterrupted in-band readings.
    pub fn new(stable_time: Duration) -> Self {
        Self {
            stable_time,
            since: None,
        }
    }

    /// Feed one observation taken at `now`.
    pub fn observe(&mut self, in_band: bool, now: Instant) -> StabilityState {
        if !in_band {
            self.since = None;
            return StabilityState::Unstable;
        }

        let since = *self.since.get_or_insert(now);
        let held = now.saturating_duration_since(since);
        if held >= self.stable_time {
            StabilityState::Stable
        } else {
            StabilityState::Stabilizing {
                remaining: self.stable_time - held,
            }
        }
    }

    /// Instant of the first reading of the current in-band run, if any.
    pub fn stable_since(&self) -> Option<Instant> {
        self.since
    }

    /// Required hold time.
    pub fn stable_time(&self) -> Duration {
        self.stable_time
    }
}

/// Creates a connected stop handle / stop signal pair.
///
/// Pass the signal to [`WaitOptions::with_stop_signal`] and keep the handle;
/// calling [`StopHandle::stop`] makes the wait return
/// [`ChamberError::Cancelled`](crate::ChamberError::Cancelled) at its next
/// check. Dropping the handle without calling `stop` does not cancel anything.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Sending side of a stop request.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request the wait to stop.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a stop request, checked by the stability wait.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// True once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when a stop is requested. Pending forever if the handle is
    /// gone without having requested one.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::never()
    }
}

/// Parameters of the stability wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Uninterrupted in-band time required before returning
    pub stable_time: Duration,
    /// Sleep between two polls
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub max_wait: Option<Duration>,
    /// Cooperative cancellation
    pub stop: StopSignal,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            stable_time: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            max_wait: None,
            stop: StopSignal::never(),
        }
    }
}

impl WaitOptions {
    /// Set the required stable time
    pub fn with_stable_time(mut self, stable_time: Duration) -> Self {
        self.stable_time = stable_time;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Bound the total wait
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Attach a stop signal
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }
}

/// Summary of a successful stability wait.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityReport {
    /// Number of status polls performed
    pub polls: u32,
    /// Time from the start of the wait until stability was declared
    pub elapsed: Duration,
    /// Last temperature status read
    pub temperature: TemperatureStatus,
    /// Last humidity status read
    pub humidity: HumidityStatus,
    /// Wall-clock time stability was declared
    pub completed_at: DateTime<Utc>,
}
