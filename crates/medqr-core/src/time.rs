use std::time::Duration;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Current wall-clock time in UTC.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Latest instant `time` can represent.
fn max_instant() -> OffsetDateTime {
    PrimitiveDateTime::MAX.assume_utc()
}

/// Absolute expiry instant for a TTL starting at `from`.
///
/// TTLs larger than the representable range saturate instead of panicking.
pub fn expires_at(from: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|d| from.checked_add(d))
        .unwrap_or_else(max_instant)
}
