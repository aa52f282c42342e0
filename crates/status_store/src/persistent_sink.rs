//! The persistence boundary (spec §4.5 / §6): an opaque, append-only,
//! byte-oriented sink keyed by attribute `full_name`.
//!
//! The core never inspects the backing medium; it only needs the contract
//! below. `MemorySink` is the one concrete implementation this repository
//! ships, to make the round-trip law (spec §8.7) and the tier-down tests
//! exercisable without a real database. Production deployments swap in a
//! real byte-oriented store behind the same trait — analogous to how
//! `re_data_store` treats Arrow IPC encoding as an implementation detail
//! behind its own read/write boundary (`store_arrow.rs`) rather than baking
//! a wire format into the core data structures.

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::timestamp::Timestamp;
use crate::value::{AttributeValue, DynValue, Quality};

/// One persisted row. The "header" from spec §6 ("Persisted record
/// layout") is this fixed schema: every sink implementation must round-trip
/// exactly these fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub read_ts: Timestamp,
    pub write_ts: Timestamp,
    pub value: Option<EncodedValue>,
    pub quality: Quality,
    pub source_id: u64,
}

/// `DynValue`, encoded to a shape that's trivial to serialize regardless of
/// backing medium (numbers as their canonical decimal string).
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedValue {
    Bool(bool),
    Number(String),
    Text(String),
    Array(Vec<EncodedValue>),
}

impl EncodedValue {
    fn encode(value: &DynValue) -> Self {
        match value {
            DynValue::Bool(b) => Self::Bool(*b),
            DynValue::Number(d) => Self::Number(d.to_string()),
            DynValue::Text(s) => Self::Text(s.clone()),
            DynValue::Array(items) => Self::Array(items.iter().map(Self::encode).collect()),
        }
    }

    fn decode(&self) -> EngineResult<DynValue> {
        match self {
            Self::Bool(b) => Ok(DynValue::Bool(*b)),
            Self::Number(s) => BigDecimal::from_str(s)
                .map(DynValue::Number)
                .map_err(|e| EngineError::Decode {
                    attribute: String::new(),
                    at: Timestamp::MIN,
                    reason: e.to_string(),
                }),
            Self::Text(s) => Ok(DynValue::Text(s.clone())),
            Self::Array(items) => items
                .iter()
                .map(Self::decode)
                .collect::<EngineResult<Vec<_>>>()
                .map(DynValue::Array),
        }
    }
}

impl Record {
    pub fn from_attribute_value(v: &AttributeValue<DynValue>) -> Self {
        Self {
            read_ts: v.read_ts,
            write_ts: v.write_ts,
            value: v.value.as_ref().map(EncodedValue::encode),
            quality: v.quality,
            source_id: v.source_id,
        }
    }

    pub fn into_attribute_value(self) -> EngineResult<AttributeValue<DynValue>> {
        let value = self.value.map(|v| v.decode()).transpose()?;
        Ok(AttributeValue::new(
            self.read_ts,
            self.write_ts,
            value,
            self.quality,
            self.source_id,
        ))
    }
}

/// The only thing the core requires of durable storage (spec §4.5).
pub trait PersistentSink: Send + Sync {
    /// Atomically appends `records` under `name`. On process crash, either
    /// the whole call is visible after restart or none of it is.
    fn save(&self, name: &str, records: &[Record]) -> EngineResult<()>;

    /// Reconstructs all previously saved values under `name`, in insertion
    /// order.
    fn load(&self, name: &str) -> EngineResult<Vec<Record>>;

    /// Deletes all persisted records under `name`. Only ever called at
    /// explicit restart-time purge (spec §1 Non-goals permit this single
    /// deletion path and no other).
    fn purge(&self, name: &str) -> EngineResult<()>;
}

/// An in-process sink backed by a lock-guarded map. Each `save` is one
/// `Vec::extend` under the lock, so it is trivially all-or-nothing.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentSink for MemorySink {
    fn save(&self, name: &str, records: &[Record]) -> EngineResult<()> {
        self.records
            .write()
            .entry(name.to_owned())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    fn load(&self, name: &str) -> EngineResult<Vec<Record>> {
        Ok(self.records.read().get(name).cloned().unwrap_or_default())
    }

    fn purge(&self, name: &str) -> EngineResult<()> {
        self.records.write().remove(name);
        Ok(())
    }
}
