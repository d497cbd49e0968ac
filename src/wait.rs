//! Bounded waiting.
//!
//! Every blocking path in the multiplexer (command replies, the transmit
//! prompt, send confirmations, payload capture) polls the link through
//! [`until`], so they all share one exit condition: the step finishes, the
//! step fails, or the deadline passes.

use std::time::{Duration, Instant};

/// A point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Outcome of one polling step.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// The wait is over.
    Done(T),
    /// Something was consumed; poll again right away.
    Progress,
    /// Nothing to do yet; idle briefly before polling again.
    Idle,
}

/// Poll `step` until it reports [`Step::Done`] or `deadline` passes.
///
/// Returns `Ok(None)` on expiry. The step always runs at least once, so a
/// zero timeout still drains whatever is already buffered.
pub fn until<T, E>(
    deadline: Deadline,
    idle: Duration,
    mut step: impl FnMut() -> Result<Step<T>, E>,
) -> Result<Option<T>, E> {
    loop {
        match step()? {
            Step::Done(value) => return Ok(Some(value)),
            Step::Progress => {}
            Step::Idle => {
                if deadline.expired() {
                    return Ok(None);
                }
                std::thread::sleep(idle.min(deadline.remaining()));
            }
        }
        if deadline.expired() {
            return Ok(None);
        }
    }
}
