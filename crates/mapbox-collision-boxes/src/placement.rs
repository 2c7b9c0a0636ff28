//! Waiting for the renderer's placement pass to settle
//!
//! The placement pass runs asynchronously inside the host, and its result is only valid once
//! the `stale` flag has cleared. The wait is a bounded poll: a state machine advanced by a
//! timer tick, giving up when either the wall-clock budget or the retry budget runs out.
//! Both budgets are kept because each one can be fooled on its own (a clock jumping backward
//! stalls the deadline, a starved process stalls the tick count).

use crate::host::Placement;
use crate::{CollisionBoxError, Result};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// State of a placement wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Not started
    Idle,
    /// Placement was stale at the last check
    ///
    /// `stop_at` is `None` when the deadline lies beyond what the clock can represent; the
    /// retry budget alone bounds the wait then.
    Polling {
        retries_left: u64,
        stop_at: Option<Instant>,
    },
    /// Placement is stable
    Resolved,
    /// A budget ran out before the placement settled
    TimedOut,
}

impl WaitState {
    /// Whether the wait has ended, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Resolved | Self::TimedOut)
    }
}

/// Bounded-retry poll over the placement `stale` flag
///
/// Transitions: `Idle → {Resolved, Polling}` on [`start`](Self::start),
/// `Polling → {Polling, Resolved, TimedOut}` on every [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct PlacementWaiter {
    state: WaitState,
    timeout: Duration,
    poll_interval: Duration,
}

impl PlacementWaiter {
    /// Create a waiter; a zero interval is raised to one millisecond
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            state: WaitState::Idle,
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Number of ticks the wait may take
    pub fn retry_budget(&self) -> u64 {
        (self.timeout.as_nanos() / self.poll_interval.as_nanos()) as u64
    }

    /// First check, made before any tick is scheduled
    pub fn start(&mut self, stale: bool, now: Instant) -> WaitState {
        if self.state == WaitState::Idle {
            self.state = if stale {
                WaitState::Polling {
                    retries_left: self.retry_budget(),
                    stop_at: now.checked_add(self.timeout),
                }
            } else {
                WaitState::Resolved
            };
        }
        self.state
    }

    /// One poll tick
    ///
    /// A stable placement wins over a budget that runs out on the same tick.
    pub fn tick(&mut self, stale: bool, now: Instant) -> WaitState {
        if let WaitState::Polling {
            retries_left,
            stop_at,
        } = self.state
        {
            let retries_left = retries_left.saturating_sub(1);
            self.state = if !stale {
                WaitState::Resolved
            } else if stop_at.is_some_and(|stop_at| now > stop_at) || retries_left == 0 {
                WaitState::TimedOut
            } else {
                WaitState::Polling {
                    retries_left,
                    stop_at,
                }
            };
        }
        self.state
    }
}

/// Wait until `placement` is no longer stale
///
/// Returns immediately, without scheduling any timer, if the placement is already stable.
/// Otherwise the flag is checked every `poll_interval`, starting one interval from now.
/// The timer is released on every exit path; dropping the returned future cancels the wait.
///
/// # Errors
/// [`CollisionBoxError::PlacementTimeout`] once `timeout` elapses or the retry budget
/// (`timeout / poll_interval` ticks) is exhausted, whichever comes first.
pub async fn wait_for_placement<P: Placement + ?Sized>(
    placement: &P,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    #[cfg(feature = "profiling")]
    profiling::scope!("placement::wait_for_placement");

    let mut waiter = PlacementWaiter::new(timeout, poll_interval);
    if waiter.start(placement.is_stale(), Instant::now()) == WaitState::Resolved {
        return Ok(());
    }

    let period = waiter.poll_interval();
    let Some(first_tick) = Instant::now().checked_add(period) else {
        // No tick can ever be scheduled
        tracing::debug!("Poll interval {:?} is out of range", period);
        return Err(CollisionBoxError::PlacementTimeout { timeout });
    };
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let state = waiter.tick(placement.is_stale(), Instant::now());
        tracing::trace!("Placement poll: {:?}", state);
        match state {
            WaitState::Resolved => return Ok(()),
            WaitState::TimedOut => {
                tracing::debug!("Placement still stale after {:?}", timeout);
                return Err(CollisionBoxError::PlacementTimeout { timeout });
            }
            WaitState::Idle | WaitState::Polling { .. } => {}
        }
    }
}
