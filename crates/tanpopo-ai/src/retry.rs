//! Backoff and `retry-after` helpers shared by every HTTP client in the workspace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

pub const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_SHIFT: usize = 6;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Exponential backoff starting at `base_ms`, capped at `base_ms * 2^6`.
pub fn backoff_ms(base_ms: u64, attempt: usize) -> u64 {
    base_ms
        .max(1)
        .saturating_mul(1_u64 << attempt.min(MAX_BACKOFF_SHIFT))
}

/// Backoff with bounded jitter in `[50%, 100%]` of the deterministic delay.
pub fn backoff_ms_with_jitter(base_ms: u64, attempt: usize, jitter_enabled: bool) -> u64 {
    let base = backoff_ms(base_ms, attempt);
    if !jitter_enabled || base <= 1 {
        return base;
    }

    let low = base / 2;
    let width = base - low;
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407;
    low + mixed % (width + 1)
}

pub fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at
        .signed_duration_since(Utc::now())
        .num_milliseconds();
    Some(u64::try_from(delay_ms).unwrap_or(0))
}

/// Delay before the next attempt; a server `retry-after` acts as a floor.
pub fn retry_delay(
    base_ms: u64,
    attempt: usize,
    jitter_enabled: bool,
    retry_after_ms: Option<u64>,
) -> Duration {
    let backoff = backoff_ms_with_jitter(base_ms, attempt, jitter_enabled);
    Duration::from_millis(retry_after_ms.map_or(backoff, |floor| backoff.max(floor)))
}

/// A zero budget means unbounded.
pub fn retry_budget_allows_delay(elapsed_ms: u64, delay_ms: u64, retry_budget_ms: u64) -> bool {
    retry_budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= retry_budget_ms
}

pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tanpopo-{millis}-{count}")
}
