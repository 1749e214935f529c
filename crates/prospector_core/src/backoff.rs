use std::time::Duration;

/// Delay to apply before the given attempt (1-based).
///
/// The first attempt starts immediately; attempt `n` waits
/// `2^(n-2) * base` (base, 2*base, 4*base, ...).
pub fn backoff_delay(attempt: u32, base: Duration) -> Option<Duration> {
    if attempt <= 1 {
        return None;
    }
    let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
    Some(base.saturating_mul(factor))
}
