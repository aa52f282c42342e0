//! `Attribute`: identity, sampling configuration, and the acceptance filter
//! in front of a [`ValueStore`].
//!
//! Per the REDESIGN FLAG in spec §9, the generic `Attribute<T>` /
//! `NumericAttribute<T: Number>` hierarchy is replaced with one concrete
//! `Attribute` carrying an `AttributeKind` tag; dispatch happens once, in
//! [`Attribute::add`], the way `FieldStore::query_field_to_datavec` in
//! `re_data_store::stores::field_store` dispatches once on its `DataType`
//! tag instead of requiring a caller-side generic parameter.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::persistent_sink::PersistentSink;
use crate::store::{TierConfig, ValueStore};
use crate::timestamp::Timestamp;
use crate::value::{AttributeValue, DynValue};

/// How a value for this attribute reaches the engine.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CollectionMethod {
    Poll { delay_ms: u64 },
    Event { event_type: String },
}

/// Query-time resolution mode (spec §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpolation {
    Last,
    Nearest,
    Linear,
}

/// The tagged variant that replaces the generic `Attribute<T>` hierarchy.
pub enum AttributeKind {
    Numeric {
        precision: BigDecimal,
        /// Auxiliary ordered map used solely by the precision filter (spec
        /// §3): for every pair of adjacent entries, `|v_i - v_{i-1}| >
        /// precision`, except the first, which is unconditional.
        numeric_values: RwLock<BTreeMap<Timestamp, BigDecimal>>,
    },
    Boolean,
    Text,
    Array,
}

impl AttributeKind {
    pub fn numeric(precision: BigDecimal) -> Self {
        Self::Numeric {
            precision,
            numeric_values: RwLock::new(BTreeMap::new()),
        }
    }
}

pub struct Attribute {
    pub device_name: String,
    pub attribute_name: String,
    pub alias: Option<String>,
    pub interpolation: Interpolation,
    pub method: CollectionMethod,
    pub kind: AttributeKind,
    pub store: ValueStore,
}

impl Attribute {
    pub fn new(
        device_name: impl Into<String>,
        attribute_name: impl Into<String>,
        alias: Option<String>,
        interpolation: Interpolation,
        method: CollectionMethod,
        kind: AttributeKind,
        sink: Arc<dyn PersistentSink>,
        tier_config: TierConfig,
        fatal_errors: crossbeam::channel::Sender<EngineError>,
    ) -> Self {
        let device_name = device_name.into();
        let attribute_name = attribute_name.into();
        let full_name = format!("{device_name}/{attribute_name}");
        Self {
            store: ValueStore::new(full_name, sink, tier_config, fatal_errors),
            device_name,
            attribute_name,
            alias,
            interpolation,
            method,
            kind,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.device_name, self.attribute_name)
    }

    /// The name external callers see: the `alias` if one is configured,
    /// else `full_name` (spec §6's `set_use_aliases`).
    pub fn display_name(&self, use_aliases: bool) -> String {
        if use_aliases {
            if let Some(alias) = &self.alias {
                return alias.clone();
            }
        }
        self.full_name()
    }

    /// Generic `Attribute.add` (spec §4.2):
    /// 1. Reject a null reading when `last` already exists (of any value).
    /// 2. Else run the kind-specific acceptance filter; on success, hand the
    ///    value to the `ValueStore`.
    pub fn add(&self, v: AttributeValue<DynValue>) -> bool {
        if v.value.is_none() && self.store.get_last().is_some() {
            return false;
        }

        if !self.add_value_internal(&v) {
            return false;
        }

        self.store.add(v)
    }

    fn add_value_internal(&self, v: &AttributeValue<DynValue>) -> bool {
        match &self.kind {
            AttributeKind::Numeric {
                precision,
                numeric_values,
            } => self.numeric_gate(precision, numeric_values, v),
            AttributeKind::Boolean | AttributeKind::Text | AttributeKind::Array => true,
        }
    }

    /// `NumericAttribute.addValueInternal` (spec §4.2).
    fn numeric_gate(
        &self,
        precision: &BigDecimal,
        numeric_values: &RwLock<BTreeMap<Timestamp, BigDecimal>>,
        v: &AttributeValue<DynValue>,
    ) -> bool {
        let Some(value) = &v.value else {
            // Null readings pass through untouched; the generic null-dedup
            // rule above already decided whether this null is admissible.
            return true;
        };

        let decimal = match value {
            DynValue::Number(d) => d.clone(),
            // A non-numeric reading arriving on a numeric attribute: try to
            // parse its textual form before giving up, mirroring the
            // source's "prefer localized parser, then construct directly,
            // then fail" fallback chain.
            DynValue::Text(s) => match BigDecimal::from_str(s) {
                Ok(d) => d,
                Err(err) => {
                    status_log::warn!(
                        "dropping unparseable numeric reading for '{}': {err}",
                        self.full_name()
                    );
                    return false;
                }
            },
            _ => {
                status_log::warn!(
                    "dropping non-numeric reading for numeric attribute '{}'",
                    self.full_name()
                );
                return false;
            }
        };

        let mut numeric_values = numeric_values.write();

        let prev = numeric_values
            .range(..=v.read_ts)
            .next_back()
            .map(|(_, d)| d.clone());

        match prev {
            None => {
                numeric_values.entry(v.read_ts).or_insert(decimal);
                true
            }
            Some(prev_value) => {
                let diff = (&decimal - &prev_value).abs();
                if diff > *precision {
                    numeric_values.entry(v.read_ts).or_insert(decimal);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_sink::MemorySink;
    use crate::value::Quality;

    fn numeric_attribute(precision: &str) -> Attribute {
        let (tx, _rx) = crossbeam::channel::unbounded();
        Attribute::new(
            "dev",
            "attr",
            None,
            Interpolation::Last,
            CollectionMethod::Poll { delay_ms: 1000 },
            AttributeKind::numeric(BigDecimal::from_str(precision).unwrap()),
            Arc::new(MemorySink::new()),
            TierConfig::DEFAULT,
            tx,
        )
    }

    fn reading(ts: i64, value: Option<&str>) -> AttributeValue<DynValue> {
        AttributeValue::new(
            Timestamp::from_nanos(ts),
            Timestamp::from_nanos(ts),
            value.map(|v| DynValue::Number(BigDecimal::from_str(v).unwrap())),
            Quality::Valid,
            0,
        )
    }

    #[test]
    fn s1_precision_filter_scenario() {
        // precision = 0.5; readings at t={1,2,3,4,5} v={10.0,10.3,10.6,10.6,9.8}
        // expect stored at {1,3,5} with {10.0,10.6,9.8}.
        let a = numeric_attribute("0.5");
        assert!(a.add(reading(1, Some("10.0"))));
        assert!(!a.add(reading(2, Some("10.3"))));
        assert!(a.add(reading(3, Some("10.6"))));
        assert!(!a.add(reading(4, Some("10.6"))));
        assert!(a.add(reading(5, Some("9.8"))));

        let all = a.store.get_all();
        let values: Vec<_> = all
            .iter()
            .map(|v| match &v.value {
                Some(DynValue::Number(d)) => d.to_string(),
                _ => panic!("expected numeric value"),
            })
            .collect();
        assert_eq!(values, vec!["10.0", "10.6", "9.8"]);
    }

    #[test]
    fn s4_null_first_then_rejected() {
        let a = numeric_attribute("0.5");
        assert!(a.add(reading(1, None)));
        assert!(a.store.get_last().unwrap().value.is_none());
        assert!(!a.add(reading(2, None)));
    }

    #[test]
    fn null_after_real_value_is_rejected_not_just_deduped() {
        let a = numeric_attribute("0.5");
        assert!(a.add(reading(1, Some("1.0"))));
        assert!(!a.add(reading(2, None)));
        assert!(a.store.get_last().unwrap().value.is_some());
    }
}
