//! Poll-until-condition primitive
//!
//! Every blocking step of the data-mover pipeline waits on an external
//! controller through this function. There is no watch or callback channel:
//! the condition is re-evaluated every interval until it reports done,
//! returns an error, or the deadline passes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::Error;

/// Default interval between condition evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline when waiting on a mover controller
pub const DEFAULT_MOVER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default deadline when waiting on snapshot content reconciliation
pub const DEFAULT_CONTENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Outcome of one condition evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition<T> {
    /// The condition holds; polling stops and yields the value
    Done(T),
    /// Not there yet. The string describes what was observed and is
    /// reported in the timeout error if the deadline passes.
    Waiting(String),
}

impl<T> Condition<T> {
    /// Shorthand for a waiting state
    pub fn waiting(state: impl Display) -> Self {
        Self::Waiting(state.to_string())
    }
}

/// Interval and deadline for one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// Time between evaluations
    pub interval: Duration,
    /// Maximum total wait
    pub timeout: Duration,
}

impl PollSettings {
    /// Settings for waiting on a mover request
    pub fn mover() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_MOVER_TIMEOUT,
        }
    }

    /// Settings for waiting on snapshot content reconciliation
    pub fn content() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CONTENT_TIMEOUT,
        }
    }
}

/// Evaluate `condition` immediately, then once per interval, until it is done.
///
/// A resource that does not exist yet must be reported as
/// `Ok(Condition::Waiting(..))`. Any `Err` short-circuits the wait and is
/// returned as-is. When the deadline passes, `Error::Timeout` carries the
/// elapsed time and the last waiting state.
pub async fn poll_until<T, F, Fut>(
    description: &str,
    settings: PollSettings,
    mut condition: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Condition<T>, Error>>,
{
    let start = Instant::now();

    loop {
        let state = match condition().await? {
            Condition::Done(value) => return Ok(value),
            Condition::Waiting(state) => state,
        };

        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            return Err(Error::timeout(description, elapsed, state));
        }

        debug!(
            target_resource = %description,
            state = %state,
            retry_in_secs = settings.interval.as_secs(),
            "condition not met, waiting"
        );

        // Never sleep past the deadline; the final evaluation happens at it.
        let remaining = settings.timeout - elapsed;
        tokio::time::sleep(settings.interval.min(remaining)).await;
    }
}
