//! A value-time key with nanosecond resolution and a total order.
//!
//! Modeled on the monotonic-id pattern in `re_log_types::component_types::MsgId`
//! (time_ns plus a tie-breaking increment): instead of a process-wide static
//! formatter or clock, [`Timestamp::now`] combines the wall-clock reading with
//! an atomic counter so that timestamps produced in program order on one
//! thread never decrease, even across two calls that land in the same
//! clock tick.

use std::sync::atomic::{AtomicI64, Ordering};

/// A value-time point, nanoseconds since the Unix epoch.
///
/// Equality is bit-identical (plain `i64` equality); ordering is total.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(i64);

static LAST_NANOS: AtomicI64 = AtomicI64::new(i64::MIN);

impl Timestamp {
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis(&self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    /// A new timestamp guaranteed to be `>=` any `Timestamp` previously
    /// produced by this function in program order on this process.
    pub fn now() -> Self {
        let wall_clock_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        // Ratchet forward: never let two successive calls produce the same
        // or a decreasing value, regardless of clock resolution or skew.
        let mut last = LAST_NANOS.load(Ordering::Relaxed);
        loop {
            let next = wall_clock_nanos.max(last.saturating_add(1));
            match LAST_NANOS.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(observed) => last = observed,
            }
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
