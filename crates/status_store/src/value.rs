//! Timestamped attribute readings and the type-erased value shape they carry.
//!
//! `DynValue` replaces the generic `Attribute<T>` / `NumericAttribute<T>`
//! pair from the distilled spec with the tagged-variant redesign called for
//! in spec §9: one closed enum of wire-level value shapes, dispatched once
//! at `Attribute::add` (see `attribute.rs`).

use bigdecimal::BigDecimal;

use crate::timestamp::Timestamp;

/// The quality annotation carried alongside every reading, following the
/// four-state convention of device-control attribute quality (valid /
/// warning / alarm / invalid) rather than a two-state good/bad flag, since
/// the source domain (polled/event device attributes) distinguishes
/// "in range but flagged" from "out of range" from "not trustworthy".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Quality {
    Valid,
    Warning,
    Alarm,
    Invalid,
}

/// A type-erased attribute value: the shapes a device reading can take.
#[derive(Clone, Debug, PartialEq)]
pub enum DynValue {
    Bool(bool),
    Number(BigDecimal),
    Text(String),
    Array(Vec<DynValue>),
}

impl DynValue {
    /// The decimal string representation used by the numeric precision
    /// filter (spec §4.2 step 2). Only meaningful for [`DynValue::Number`].
    pub fn as_decimal_str(&self) -> Option<String> {
        match self {
            Self::Number(d) => Some(d.to_string()),
            _ => None,
        }
    }
}

/// One timestamped reading of an attribute.
///
/// `value = None` encodes a null reading. Two `AttributeValue`s are equal
/// iff their `value` fields are equal by `T`'s natural equality (for
/// `DynValue::Number`, via `BigDecimal`'s arithmetic equality).
#[derive(Clone, Debug)]
pub struct AttributeValue<T> {
    pub read_ts: Timestamp,
    pub write_ts: Timestamp,
    pub value: Option<T>,
    pub quality: Quality,
    pub source_id: u64,
}

impl<T: PartialEq> AttributeValue<T> {
    pub fn new(
        read_ts: Timestamp,
        write_ts: Timestamp,
        value: Option<T>,
        quality: Quality,
        source_id: u64,
    ) -> Self {
        Self {
            read_ts,
            write_ts,
            value,
            quality,
            source_id,
        }
    }

    /// Natural equality of the `value` field only, per spec §3's definition
    /// of equality between `AttributeValue`s (used by the dedup gate).
    pub fn value_eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn numeric_equality_is_value_based() {
        let a = BigDecimal::from_str("10.0").unwrap();
        let b = BigDecimal::from_str("10.00").unwrap();
        assert_eq!(DynValue::Number(a), DynValue::Number(b));
    }

    #[test]
    fn value_eq_ignores_metadata() {
        let t0 = Timestamp::from_nanos(0);
        let t1 = Timestamp::from_nanos(1);
        let a = AttributeValue::new(t0, t0, Some(DynValue::Bool(true)), Quality::Valid, 1);
        let b = AttributeValue::new(t1, t1, Some(DynValue::Bool(true)), Quality::Alarm, 2);
        assert!(a.value_eq(&b));
    }
}
