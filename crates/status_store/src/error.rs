//! The error kinds from spec §7, one variant per failure mode.
//!
//! Follows the shape of `re_data_store::store_write::WriteError`: a flat
//! `thiserror` enum with one arm per distinguishable failure, `#[from]`
//! conversions where a lower layer's error is the direct cause, and no
//! catch-all `Other(String)` arm (callers match on kind).

use crate::timestamp::Timestamp;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Malformed configuration; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A device client could not be constructed; the device is skipped.
    #[error("device '{device}' client unavailable: {reason}")]
    ClientUnavailable { device: String, reason: String },

    /// An attribute could not be resolved on its device; it is skipped.
    #[error("attribute '{0}' is unknown to its device")]
    AttributeUnknown(String),

    /// A transient read failure. Logged, counted, sampling continues.
    #[error("read of '{attribute}' failed: {reason}")]
    Read { attribute: String, reason: String },

    /// A value could not be parsed (numeric precision filter).
    #[error("could not decode value for '{attribute}' at {at:?}: {reason}")]
    Decode {
        attribute: String,
        at: Timestamp,
        reason: String,
    },

    /// A write to the `PersistentSink` failed.
    ///
    /// Fatal for the engine when raised from the eviction path (durability
    /// contract violated); downgraded to a logged warning when raised from
    /// `ValueStore::get_all`.
    #[error("persistence of '{name}' failed: {reason}")]
    Persist { name: String, reason: String },

    /// A `clear`/`persist` was issued while the attribute was still being
    /// written. Undefined behavior is allowed by spec, but we detect and
    /// log it rather than silently corrupting state.
    #[error("quiescence violation on '{0}': concurrent add during clear/persist")]
    QuiescenceViolation(String),
}

pub type EngineResult<T> = ::std::result::Result<T, EngineError>;
