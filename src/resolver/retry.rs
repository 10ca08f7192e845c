use std::thread;
use std::time::{Duration, Instant};

use crate::dispatch::CancelToken;
use crate::error::Result;

const SLICE: Duration = Duration::from_millis(20);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Exponential backoff: `base * 2^attempt`, capped.
pub(super) fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_BACKOFF)
}

/// Sleep for `total`, waking early with `Err(Cancelled)` when cancelled.
pub(super) fn sleep_cancellable(total: Duration, token: &CancelToken) -> Result<()> {
    let deadline = Instant::now() + total;
    loop {
        token.check()?;
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(());
        }
        thread::sleep(left.min(SLICE));
    }
}
