//! Serde helpers that print whole numbers without a trailing `.0`.
//!
//! Consumers of the JSON output compare against bodies where `30` and `30.5`
//! are both plain JSON numbers.

use std::collections::BTreeMap;

use serde::Serializer;
use serde::ser::SerializeMap;

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serializes an `f64`, emitting an integer when the value has no fraction.
pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "value is integral and within the exact range"
        )]
        let whole = *value as i64;
        serializer.serialize_i64(whole)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Serializes a map of `f64` values with [`serialize`] semantics.
pub fn serialize_map<K, S>(map: &BTreeMap<K, f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: serde::Serialize,
    S: Serializer,
{
    struct Value(f64);

    impl serde::Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serialize(&self.0, serializer)
        }
    }

    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (key, value) in map {
        out.serialize_entry(key, &Value(*value))?;
    }
    out.end()
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Sample {
        #[serde(serialize_with = "serialize")]
        value: f64,
        #[serde(serialize_with = "serialize_map")]
        levels: BTreeMap<String, f64>,
    }

    #[test]
    fn whole_numbers_drop_fraction() {
        let sample = Sample {
            value: 30.0,
            levels: BTreeMap::from([("a".to_string(), 12.0), ("b".to_string(), 12.25)]),
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"value":30,"levels":{"a":12,"b":12.25}}"#);
    }

    #[test]
    fn fractional_and_negative_values_are_kept() {
        let sample = Sample {
            value: -5.5,
            levels: BTreeMap::new(),
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"value":-5.5,"levels":{}}"#);
    }
}
