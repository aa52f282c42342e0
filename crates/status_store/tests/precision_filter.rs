//! Precision law (spec §8.4) and the S1 scenario.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use status_store::{
    Attribute, AttributeKind, AttributeValue, CollectionMethod, DynValue, Interpolation,
    MemorySink, Quality, Timestamp, TierConfig,
};

fn numeric_attribute(precision: &str) -> Attribute {
    let (tx, _rx) = crossbeam::channel::unbounded();
    Attribute::new(
        "dev",
        "gauge",
        None,
        Interpolation::Last,
        CollectionMethod::Poll { delay_ms: 1000 },
        AttributeKind::numeric(BigDecimal::from_str(precision).unwrap()),
        Arc::new(MemorySink::new()),
        TierConfig::DEFAULT,
        tx,
    )
}

fn numeric_reading(ts: i64, value: &str) -> AttributeValue<DynValue> {
    AttributeValue::new(
        Timestamp::from_nanos(ts),
        Timestamp::from_nanos(ts),
        Some(DynValue::Number(BigDecimal::from_str(value).unwrap())),
        Quality::Valid,
        0,
    )
}

#[test]
fn s1_precision_filter_scenario() {
    let attr = numeric_attribute("0.5");
    assert!(attr.add(numeric_reading(1, "10.0")));
    assert!(!attr.add(numeric_reading(2, "10.3")));
    assert!(attr.add(numeric_reading(3, "10.6")));
    assert!(!attr.add(numeric_reading(4, "10.6")));
    assert!(attr.add(numeric_reading(5, "9.8")));

    let stored: Vec<(i64, String)> = attr
        .store
        .get_all()
        .into_iter()
        .map(|v| {
            let DynValue::Number(n) = v.value.unwrap() else { panic!("expected numeric") };
            (v.read_ts.as_nanos(), n.to_string())
        })
        .collect();

    assert_eq!(
        stored,
        vec![(1, "10.0".to_owned()), (3, "10.6".to_owned()), (5, "9.8".to_owned())]
    );
}

#[test]
fn adjacent_accepted_values_exceed_precision() {
    let attr = numeric_attribute("1.0");
    let values = ["0.0", "0.9", "1.1", "3.0", "3.05", "5.0"];
    for (i, v) in values.iter().enumerate() {
        attr.add(numeric_reading(i as i64, v));
    }

    let accepted = attr.store.get_all();
    for window in accepted.windows(2) {
        let DynValue::Number(a) = window[0].value.clone().unwrap() else { unreachable!() };
        let DynValue::Number(b) = window[1].value.clone().unwrap() else { unreachable!() };
        assert!((b - a).abs() > BigDecimal::from_str("1.0").unwrap());
    }
}

#[test]
fn precision_zero_accepts_any_change() {
    let attr = numeric_attribute("0");
    assert!(attr.add(numeric_reading(1, "1.0")));
    assert!(attr.add(numeric_reading(2, "1.000001")));
    assert!(!attr.add(numeric_reading(3, "1.000001")));
}
