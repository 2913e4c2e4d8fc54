use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::Error;
use crate::ReadinessPolicy;
use crate::Result;

/// How a bounded poll ended when it was not cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The check succeeded on attempt `attempts`
    Ready { attempts: usize },
    /// Every attempt was used without a successful check
    Exhausted { attempts: usize, elapsed: Duration },
}

/// Sleep one interval, then check; repeat at most `policy.max_attempts`
/// times. Returns as soon as a check reports `true`.
///
/// A check error aborts the poll. Cancellation interrupts the sleep.
pub async fn poll_until<F, Fut>(
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut check: F,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} polling cancelled after {} attempts", what, attempt - 1);
                return Err(Error::Cancelled(format!("waiting for {}", what)));
            }
            _ = sleep(policy.interval()) => {}
        }

        if check().await? {
            debug!("{} ready after {} attempts", what, attempt);
            return Ok(PollOutcome::Ready { attempts: attempt });
        }
        trace!("{} not ready (attempt {}/{})", what, attempt, policy.max_attempts);
    }

    Ok(PollOutcome::Exhausted {
        attempts: policy.max_attempts,
        elapsed: started.elapsed(),
    })
}

/// Fixed settle delay that still honours cancellation
pub async fn settle(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled("settle delay".to_string())),
        _ = sleep(delay) => Ok(()),
    }
}
