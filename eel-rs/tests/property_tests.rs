use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use eel::lang::number;
use eel::{Context, Decimal, Expression, Function, Kind, SymbolsTable, Value};

fn decimal(unscaled: i64, scale: i64) -> Decimal {
    Decimal::new(unscaled, scale)
}

/// Insert `_` between digits at the positions picked by `mask`.
fn separate(digits: &str, mask: u64) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && mask & (1 << (i % 64)) != 0 {
            out.push('_');
        }
        out.push(c);
    }
    out
}

proptest! {
    /// The compiler never panics on arbitrary input; it returns Ok or Err.
    #[test]
    fn compile_does_not_panic(s in "\\PC*") {
        let _ = eel::compile(&s);
    }
}

proptest! {
    /// Every value has a Text form, whatever its kind.
    #[test]
    fn text_form_always_exists(n in any::<i64>(), scale in -6i64..12, b in any::<bool>(), s in "\\PC*") {
        for v in [Value::number(decimal(n, scale)), Value::logic(b), Value::text(s.clone()), Value::epoch()] {
            let _ = v.as_text();
            prop_assert_eq!(v.convert(Kind::Text).unwrap().kind(), Kind::Text);
        }
    }
}

proptest! {
    /// Number -> Text -> Number is the identity.
    #[test]
    fn number_text_round_trip(n in any::<i64>(), scale in -6i64..12) {
        let exact = decimal(n, scale);
        let v = Value::number(exact.clone());
        let back = Value::text(v.as_text()).as_number().unwrap().clone();
        prop_assert_eq!(back, exact);
    }
}

proptest! {
    /// Prefixed literals, with or without separators, equal their decimal value.
    #[test]
    fn prefixed_literals_match_decimal(n in 0u64..u64::MAX, mask in any::<u64>()) {
        let expected = Decimal::from(num_bigint::BigInt::from(n));
        for (prefix, digits) in [
            ("0x", format!("{n:x}")),
            ("0c", format!("{n:o}")),
            ("0b", format!("{n:b}")),
            ("", n.to_string()),
        ] {
            let text = format!("{prefix}{}", separate(&digits, mask));
            let literal = number::parse_str(&text).unwrap();
            prop_assert_eq!(&literal.value, &expected, "{}", text);
        }
    }
}

proptest! {
    /// A doubled or trailing separator fails at the first `_` not followed
    /// by a digit.
    #[test]
    fn misplaced_separator_is_located(n in 10u64..1_000_000) {
        let digits = n.to_string();
        let trailing = format!("{digits}_");
        match number::parse_str(&trailing) {
            Err(eel::Error::NumberFormat { position, .. }) => prop_assert_eq!(position, digits.len() + 1),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
        let doubled = format!("{}__{}", &digits[..1], &digits[1..]);
        match number::parse_str(&doubled) {
            Err(eel::Error::NumberFormat { position, .. }) => prop_assert_eq!(position, 2),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}

proptest! {
    /// `and`/`or` never evaluate the right side once the left decides.
    #[test]
    fn short_circuit_laws(left in any::<bool>()) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let tick = Function::new("tick", move |_: &[Value]| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Value::TRUE)
        });
        let ctx = Context::builder().function(tick).build();
        let and = Expression::compile(&format!("$({left} and tick())"), &ctx).unwrap();
        let or = Expression::compile(&format!("$({left} or tick())"), &ctx).unwrap();
        and.evaluate_empty().unwrap();
        or.evaluate_empty().unwrap();
        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

proptest! {
    /// Slicing never panics and either fits the text or reports an error.
    #[test]
    fn slices_fit_or_fail(s in "[a-z]{0,12}", start in -3i64..16, count in -3i64..16) {
        let e = eel::compile(&format!("${{v:({start}):({count})}}")).unwrap();
        let mut map = std::collections::HashMap::new();
        map.insert("v".to_string(), s.clone());
        match e.evaluate(&SymbolsTable::from_map(map)) {
            Ok(v) => {
                prop_assert!(start >= 0 && count >= 0);
                prop_assert_eq!(v.as_text().chars().count() as i64, count);
                prop_assert!(s.contains(v.as_text()));
            }
            Err(err) => prop_assert!(matches!(err, eel::Error::OutOfRange { .. }), "{:?}", err),
        }
    }
}
