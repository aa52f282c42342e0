//! Time-point resolution (spec §4.3): turning `floor`/`ceiling` queries on
//! a [`ValueStore`] into a single value at an arbitrary time `t`.

use bigdecimal::BigDecimal;

use crate::attribute::{Attribute, AttributeKind, Interpolation};
use crate::timestamp::Timestamp;
use crate::value::{AttributeValue, DynValue};

impl Attribute {
    /// Resolves this attribute's value at `t` according to its configured
    /// [`Interpolation`] mode.
    pub fn resolve_at(&self, t: Timestamp) -> Option<AttributeValue<DynValue>> {
        match self.interpolation {
            Interpolation::Last => self.store.floor(t),
            Interpolation::Nearest => nearest(&self.store, t),
            Interpolation::Linear => self.linear_at(t),
        }
    }

    fn linear_at(&self, t: Timestamp) -> Option<AttributeValue<DynValue>> {
        if !matches!(self.kind, AttributeKind::Numeric { .. }) {
            // LINEAR is numeric-only (spec §4.3); fall back to LAST for
            // other kinds rather than silently returning nothing.
            return self.store.floor(t);
        }

        let floor = self.store.floor(t);
        let ceiling = self.store.ceiling(t);

        match (floor, ceiling) {
            (Some(f), Some(c)) if f.read_ts == c.read_ts => Some(f),
            (Some(f), Some(c)) => linear_interpolate(&f, &c, t).or(Some(f)),
            (Some(f), None) => Some(f),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        }
    }
}

/// NEAREST: the bracketing entry closest to `t`, ties broken toward floor.
fn nearest(store: &crate::store::ValueStore, t: Timestamp) -> Option<AttributeValue<DynValue>> {
    let floor = store.floor(t);
    let ceiling = store.ceiling(t);

    match (floor, ceiling) {
        (Some(f), Some(c)) => {
            if f.read_ts == c.read_ts {
                return Some(f);
            }
            let dist_floor = t.as_nanos().saturating_sub(f.read_ts.as_nanos());
            let dist_ceiling = c.read_ts.as_nanos().saturating_sub(t.as_nanos());
            if dist_ceiling < dist_floor {
                Some(c)
            } else {
                // tie (`dist_ceiling == dist_floor`) breaks toward floor
                Some(f)
            }
        }
        (Some(f), None) => Some(f),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

/// `v = v0 + (v1 - v0) * (t - t0) / (t1 - t0)`. Returns `None` if either
/// endpoint isn't numeric (caller falls back to the floor value).
fn linear_interpolate(
    v0: &AttributeValue<DynValue>,
    v1: &AttributeValue<DynValue>,
    t: Timestamp,
) -> Option<AttributeValue<DynValue>> {
    let (Some(DynValue::Number(n0)), Some(DynValue::Number(n1))) = (&v0.value, &v1.value) else {
        return None;
    };

    let t0 = v0.read_ts.as_nanos();
    let t1 = v1.read_ts.as_nanos();
    if t1 == t0 {
        return Some(v0.clone());
    }

    let span: BigDecimal = BigDecimal::from(t1 - t0);
    let offset: BigDecimal = BigDecimal::from(t.as_nanos() - t0);
    let value = n0 + (n1 - n0) * (offset / span);

    Some(AttributeValue::new(
        t,
        t,
        Some(DynValue::Number(value)),
        v0.quality,
        v0.source_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::CollectionMethod;
    use crate::persistent_sink::MemorySink;
    use crate::store::TierConfig;
    use crate::value::Quality;
    use std::str::FromStr;
    use std::sync::Arc;

    fn attribute_with(interpolation: Interpolation) -> Attribute {
        let (tx, _rx) = crossbeam::channel::unbounded();
        let attr = Attribute::new(
            "dev",
            "attr",
            None,
            interpolation,
            CollectionMethod::Poll { delay_ms: 1000 },
            AttributeKind::numeric(BigDecimal::from_str("0").unwrap()),
            Arc::new(MemorySink::new()),
            TierConfig::DEFAULT,
            tx,
        );
        attr.store.add(AttributeValue::new(
            Timestamp::from_nanos(0),
            Timestamp::from_nanos(0),
            Some(DynValue::Number(BigDecimal::from_str("0").unwrap())),
            Quality::Valid,
            0,
        ));
        attr.store.add(AttributeValue::new(
            Timestamp::from_nanos(10),
            Timestamp::from_nanos(10),
            Some(DynValue::Number(BigDecimal::from_str("100").unwrap())),
            Quality::Valid,
            0,
        ));
        attr
    }

    #[test]
    fn s5_interpolation_scenario() {
        let linear = attribute_with(Interpolation::Linear);
        let v = linear.resolve_at(Timestamp::from_nanos(3)).unwrap();
        assert_eq!(v.value, Some(DynValue::Number(BigDecimal::from_str("30").unwrap())));

        let nearest = attribute_with(Interpolation::Nearest);
        let v = nearest.resolve_at(Timestamp::from_nanos(4)).unwrap();
        assert_eq!(v.value, Some(DynValue::Number(BigDecimal::from_str("0").unwrap())));
        // tie at t=5 breaks toward floor (t=0)
        let v = nearest.resolve_at(Timestamp::from_nanos(5)).unwrap();
        assert_eq!(v.read_ts, Timestamp::from_nanos(0));

        let last = attribute_with(Interpolation::Last);
        let v = last.resolve_at(Timestamp::from_nanos(7)).unwrap();
        assert_eq!(v.read_ts, Timestamp::from_nanos(0));
        let v = last.resolve_at(Timestamp::from_nanos(10)).unwrap();
        assert_eq!(v.read_ts, Timestamp::from_nanos(10));
    }
}
