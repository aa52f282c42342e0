//! The per-attribute tiered value store (spec §4.1): a lock-free-ish `last`
//! slot, a bounded in-memory `recent` window, and an append-only
//! `persistent` tier, with a threshold-driven tier-down policy.
//!
//! Structurally this mirrors `re_data_store::store::IndexedBucket` (an
//! `RwLock`-guarded inner structure that a single table entry owns) crossed
//! with `re_data_store::stores::field_store::MonoFieldStore` (a
//! `BTreeMap<Time, T>` with `latest`/`latest_at` queries) — here scoped to
//! exactly one attribute instead of one column of an Arrow table.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::error::EngineError;
use crate::persistent_sink::{PersistentSink, Record};
use crate::timestamp::Timestamp;
use crate::value::{AttributeValue, DynValue};

/// The two tier-down thresholds (spec §4.1). Defaults match the spec's
/// stated defaults of 1,000,000 / 500,000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TierConfig {
    pub persist_threshold: u64,
    pub update_threshold: u64,
}

impl TierConfig {
    pub const DEFAULT: Self = Self {
        persist_threshold: 1_000_000,
        update_threshold: 500_000,
    };
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A tiered, per-attribute value store.
///
/// `last` and `recent` are guarded by `parking_lot::RwLock`s, which keeps
/// reads cheap and non-blocking with respect to each other; writers are
/// serialized through `write_lock` so that the dedup check and the publish
/// are one atomic step, matching the teacher's `IndexedBucket` pattern of
/// guarding one inner structure rather than attempting a literal lock-free
/// design.
pub struct ValueStore {
    name: String,
    sink: Arc<dyn PersistentSink>,
    config: TierConfig,

    write_lock: Mutex<()>,
    last: RwLock<Option<AttributeValue<DynValue>>>,
    recent: RwLock<BTreeMap<Timestamp, AttributeValue<DynValue>>>,
    threshold_ts: RwLock<Option<Timestamp>>,
    counter: AtomicU64,

    /// Engine-level invariant violations (persist failure during eviction)
    /// are reported here rather than returned from `add`, since `add`'s
    /// signature (spec §4.1) is a plain `bool`.
    fatal_errors: Sender<EngineError>,
}

impl ValueStore {
    pub fn new(
        name: impl Into<String>,
        sink: Arc<dyn PersistentSink>,
        config: TierConfig,
        fatal_errors: Sender<EngineError>,
    ) -> Self {
        Self {
            name: name.into(),
            sink,
            config,
            write_lock: Mutex::new(()),
            last: RwLock::new(None),
            recent: RwLock::new(BTreeMap::new()),
            threshold_ts: RwLock::new(None),
            counter: AtomicU64::new(0),
            fatal_errors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of calls that passed the dedup gate since construction.
    ///
    /// Per spec §9's open question, this increments even when the
    /// `read_ts` key was already present in `recent` (i.e. it tracks
    /// "accepted by the gate", not "actually changed cardinality of the
    /// map") — callers should use distinct `read_ts` values per add.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Lock-free(-ish) read of the most recently accepted value.
    pub fn get_last(&self) -> Option<AttributeValue<DynValue>> {
        self.last.read().clone()
    }

    /// Returns `true` iff `v` was stored: the `last` slot was empty, or its
    /// value differs from `v`'s by natural equality (spec §4.1's dedup
    /// rule). Accepted values become the new `last`, are inserted into
    /// `recent`, and may trigger a tier-down.
    pub fn add(&self, v: AttributeValue<DynValue>) -> bool {
        let _guard = self.write_lock.lock();

        if let Some(last) = self.last.read().as_ref() {
            if last.value_eq(&v) {
                return false;
            }
        }

        *self.last.write() = Some(v.clone());
        self.recent.write().insert(v.read_ts, v.clone());
        let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        self.maybe_tier_down(counter, v.read_ts);

        true
    }

    fn maybe_tier_down(&self, counter: u64, read_ts: Timestamp) {
        if counter % self.config.persist_threshold == 0 {
            let cut = {
                let mut threshold_ts = self.threshold_ts.write();
                std::mem::replace(&mut *threshold_ts, Some(read_ts))
            };

            if let Some(cut) = cut {
                let head = {
                    let mut recent = self.recent.write();
                    let tail = recent.split_off(&cut);
                    std::mem::replace(&mut *recent, tail)
                };

                if !head.is_empty() {
                    let records: Vec<Record> =
                        head.values().map(Record::from_attribute_value).collect();
                    if let Err(err) = self.sink.save(&self.name, &records) {
                        status_log::error!(
                            "fatal: persisting evicted range for '{}' failed: {err}",
                            self.name
                        );
                        let _ = self.fatal_errors.send(EngineError::Persist {
                            name: self.name.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        } else if counter % self.config.update_threshold == 0 {
            *self.threshold_ts.write() = Some(read_ts);
        }
    }

    /// All `recent` entries with `read_ts >= t`. If `recent` is empty, or
    /// its greatest key is `< t`, yields `[last]` if present, else nothing.
    pub fn get_in_memory_since(&self, t: Timestamp) -> Vec<AttributeValue<DynValue>> {
        let recent = self.recent.read();
        match recent.keys().next_back() {
            Some(&max_key) if max_key >= t => recent.range(t..).map(|(_, v)| v.clone()).collect(),
            _ => self.get_last().into_iter().collect(),
        }
    }

    /// The greatest `recent` entry with `read_ts <= t`; if none exists,
    /// yields the smallest entry in `recent` (out-of-range queries anchor
    /// to the nearest edge rather than returning nothing). `None` on an
    /// empty store (the source's `firstEntry()` crash is not preserved).
    pub fn floor(&self, t: Timestamp) -> Option<AttributeValue<DynValue>> {
        let recent = self.recent.read();
        if let Some((_, v)) = recent.range(..=t).next_back() {
            return Some(v.clone());
        }
        recent.values().next().cloned()
    }

    /// The smallest `recent` entry with `read_ts >= t`; if none exists,
    /// yields `last`.
    pub fn ceiling(&self, t: Timestamp) -> Option<AttributeValue<DynValue>> {
        let recent = self.recent.read();
        if let Some((_, v)) = recent.range(t..).next() {
            return Some(v.clone());
        }
        drop(recent);
        self.get_last()
    }

    /// `persistent.load(name)` followed by `recent` ascending. On a
    /// persistent-load error, downgrades to "return recent only" with a
    /// logged warning, per spec §4.1's failure semantics.
    pub fn get_all(&self) -> Vec<AttributeValue<DynValue>> {
        let mut out = match self.sink.load(&self.name) {
            Ok(records) => records
                .into_iter()
                .filter_map(|r| match r.into_attribute_value() {
                    Ok(v) => Some(v),
                    Err(err) => {
                        status_log::warn!(
                            "dropping unreadable persisted record for '{}': {err}",
                            self.name
                        );
                        None
                    }
                })
                .collect(),
            Err(err) => {
                status_log::warn!(
                    "persistent load for '{}' failed, returning in-memory tier only: {err}",
                    self.name
                );
                Vec::new()
            }
        };
        out.extend(self.recent.read().values().cloned());
        out
    }

    /// Empties `recent` in place; `last` is preserved. Callers are expected
    /// to serialize this against `add` (spec §5); a concurrent `add` is
    /// still detected via `write_lock` and reported as a
    /// [`EngineError::QuiescenceViolation`] on `fatal_errors` rather than
    /// silently racing (spec §7's "detect and log").
    pub fn clear_recent(&self) {
        self.check_quiescent("clear_recent");
        self.recent.write().clear();
    }

    /// Flushes the current contents of `recent` to the persistent tier,
    /// without removing them from `recent`.
    pub fn persist_recent(&self) -> Result<(), EngineError> {
        self.check_quiescent("persist_recent");
        let records: Vec<Record> = self
            .recent
            .read()
            .values()
            .map(Record::from_attribute_value)
            .collect();
        if records.is_empty() {
            return Ok(());
        }
        self.sink
            .save(&self.name, &records)
            .map_err(|err| EngineError::Persist {
                name: self.name.clone(),
                reason: err.to_string(),
            })
    }

    /// Reports (but does not block on) a concurrent `add` in progress: spec
    /// §7's `QuiescenceViolation` is detect-and-log, not mutual exclusion.
    fn check_quiescent(&self, what: &str) {
        if self.write_lock.try_lock().is_none() {
            status_log::error!("quiescence violation on '{}': add in flight during {what}", self.name);
            let _ = self
                .fatal_errors
                .send(EngineError::QuiescenceViolation(self.name.clone()));
        }
    }

    /// `persist_recent` then `clear_recent`, in that order.
    pub fn persist_and_clear_recent(&self) -> Result<(), EngineError> {
        self.persist_recent()?;
        self.clear_recent();
        Ok(())
    }

    /// The number of entries currently held in the `recent` tier. Not part
    /// of the public contract proper, but useful for tests exercising the
    /// threshold law (spec §8.5).
    #[cfg(test)]
    pub(crate) fn recent_len(&self) -> usize {
        self.recent.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_sink::MemorySink;
    use crate::value::Quality;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn store() -> (ValueStore, crossbeam::channel::Receiver<EngineError>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        let sink = Arc::new(MemorySink::new());
        (
            ValueStore::new("dev/attr", sink, TierConfig::DEFAULT, tx),
            rx,
        )
    }

    fn numeric(ts_nanos: i64, n: &str) -> AttributeValue<DynValue> {
        AttributeValue::new(
            Timestamp::from_nanos(ts_nanos),
            Timestamp::from_nanos(ts_nanos),
            Some(DynValue::Number(BigDecimal::from_str(n).unwrap())),
            Quality::Valid,
            1,
        )
    }

    #[test]
    fn get_last_reflects_newest_accepted_value() {
        let (s, _rx) = store();
        assert!(s.add(numeric(1, "1.0")));
        assert!(s.add(numeric(2, "2.0")));
        assert_eq!(s.get_last().unwrap().value, Some(DynValue::Number(BigDecimal::from_str("2.0").unwrap())));
    }

    #[test]
    fn dedup_law_rejects_consecutive_equal_values() {
        let (s, _rx) = store();
        assert!(s.add(numeric(1, "1.0")));
        assert!(!s.add(numeric(2, "1.0")));
        assert_eq!(s.counter(), 1);
    }

    #[test]
    fn floor_on_empty_store_is_none() {
        let (s, _rx) = store();
        assert!(s.floor(Timestamp::from_nanos(0)).is_none());
    }

    #[test]
    fn floor_and_ceiling_bracket_queries() {
        let (s, _rx) = store();
        s.add(numeric(10, "1.0"));
        s.add(numeric(20, "2.0"));
        s.add(numeric(30, "3.0"));

        let f = s.floor(Timestamp::from_nanos(25)).unwrap();
        assert_eq!(f.read_ts, Timestamp::from_nanos(20));
        let c = s.ceiling(Timestamp::from_nanos(25)).unwrap();
        assert_eq!(c.read_ts, Timestamp::from_nanos(30));

        // out of range anchors to the nearest edge
        assert_eq!(s.floor(Timestamp::from_nanos(0)).unwrap().read_ts, Timestamp::from_nanos(10));
        assert_eq!(s.ceiling(Timestamp::from_nanos(1000)).unwrap().read_ts, Timestamp::from_nanos(30));
    }

    #[test]
    fn clear_recent_preserves_last() {
        let (s, _rx) = store();
        s.add(numeric(1, "1.0"));
        s.clear_recent();
        assert!(s.get_last().is_some());
        assert_eq!(s.recent_len(), 0);
    }

    #[test]
    fn persist_recent_round_trips_through_get_all() {
        let (s, _rx) = store();
        s.add(numeric(1, "1.0"));
        s.add(numeric(2, "2.0"));
        s.persist_and_clear_recent().unwrap();
        assert_eq!(s.recent_len(), 0);

        let all = s.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].read_ts, Timestamp::from_nanos(1));
        assert_eq!(all[1].read_ts, Timestamp::from_nanos(2));
    }

    #[test]
    fn clear_recent_during_concurrent_add_reports_quiescence_violation() {
        let (s, rx) = store();
        s.add(numeric(1, "1.0"));

        let _held = s.write_lock.lock();
        s.clear_recent();

        match rx.try_recv() {
            Ok(EngineError::QuiescenceViolation(name)) => assert_eq!(name, "dev/attr"),
            other => panic!("expected a quiescence violation, got {other:?}"),
        }
    }

    #[test]
    fn threshold_law_bounds_recent_tier_size() {
        let (tx, _rx) = crossbeam::channel::unbounded();
        let sink = Arc::new(MemorySink::new());
        let config = TierConfig {
            persist_threshold: 10,
            update_threshold: 5,
        };
        let s = ValueStore::new("dev/attr", sink, config, tx);

        for i in 1..=30i64 {
            s.add(numeric(i, &i.to_string()));
        }

        assert!(s.recent_len() <= 2 * config.update_threshold as usize);
        assert_eq!(s.get_all().len(), 30);
    }
}
