use chrono::{DateTime, TimeDelta, Utc};

/// A stored value with its optional absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    pub fn new(value: V, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }

    /// An entry is live up to and including its expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Remaining lifetime, clamped at zero. `None` if the entry never expires.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.expires_at
            .map(|exp| (exp - now).max(TimeDelta::zero()))
    }
}

/// Absolute expiry for a ttl relative to `now`. A zero ttl never expires;
/// a negative ttl yields an instant already in the past. A ttl reaching past
/// the representable range saturates at its end.
pub fn expiry_from_ttl(now: DateTime<Utc>, ttl: TimeDelta) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }
    let at = now.checked_add_signed(ttl).unwrap_or(if ttl > TimeDelta::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    });
    normalize_expiry(Some(at))
}

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`, the zero time
/// written by clients that have no "absent" timestamp.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Maps the zero-time sentinels (`0001-01-01T00:00:00Z` and the Unix epoch)
/// to "never expires". Every other instant is kept, including ones before
/// the epoch, which are simply expired.
///
/// Applied both before a record is written and after it is read back, so a
/// replayed entry always matches the one held in memory.
pub fn normalize_expiry(expires_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    expires_at.filter(|at| {
        let sentinel = at.timestamp_subsec_nanos() == 0
            && matches!(at.timestamp(), 0 | ZERO_TIME_SECS);
        !sentinel
    })
}
