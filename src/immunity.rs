//! Re-check immunity.
//!
//! A stream that was probed recently is immune to further probes for
//! the configured window; the cached score is reused instead. The
//! window is measured from probe *completion*, and a failed probe
//! consumes the check slot exactly like a successful one - an explicit
//! anti-hammering decision for broken streams.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Decide whether a stream is eligible for a fresh probe.
///
/// Eligible when the dequeue carries a force flag, when the stream has
/// never been checked, or when at least `window` has elapsed since the
/// last probe completed.
pub fn is_eligible(
    last_checked_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    match last_checked_at {
        None => true,
        Some(checked) => {
            let elapsed = now.signed_duration_since(checked);
            match chrono::Duration::from_std(window) {
                Ok(window) => elapsed >= window,
                // A window too large for chrono never elapses.
                Err(_) => false,
            }
        }
    }
}
