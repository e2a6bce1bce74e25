//! Fetch option normalization and the pagination cursor types.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

/// Complete pagination/filtering intent for one cache read.
///
/// `before`/`after` of `0` mean "unbounded" in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    pub include_ordinal_data: bool,
    pub limit: i64,
    pub omit_hex: bool,
    pub omit_witness: bool,
    pub before: i64,
    pub after: i64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_ordinal_data: true,
            limit: DEFAULT_LIMIT,
            omit_hex: false,
            omit_witness: false,
            before: 0,
            after: 0,
        }
    }
}

impl FetchOptions {
    /// Build a complete record from a caller-supplied option bag.
    ///
    /// Missing, mistyped or out-of-range values fall back to their defaults.
    /// Anything that is not a JSON object yields the defaults.
    pub fn normalize(raw: &Value) -> Self {
        let defaults = Self::default();

        let Value::Object(map) = raw else {
            return defaults;
        };
        let lookup = |names: &[&str]| field(map, names);

        Self {
            include_ordinal_data: boolean(lookup(&["includeOrdinalData", "ord"]))
                .unwrap_or(defaults.include_ordinal_data),
            limit: integer(lookup(&["limit"]))
                .filter(|limit| (1..=MAX_LIMIT).contains(limit))
                .unwrap_or(defaults.limit),
            omit_hex: boolean(lookup(&["omitHex", "nohex"])).unwrap_or(defaults.omit_hex),
            omit_witness: boolean(lookup(&["omitWitness", "nowitness"])).unwrap_or(defaults.omit_witness),
            before: integer(lookup(&["before"]))
                .filter(|height| *height >= 0)
                .unwrap_or(defaults.before),
            after: integer(lookup(&["after"]))
                .filter(|height| *height >= 0)
                .unwrap_or(defaults.after),
        }
    }

    #[cfg(test)]
    pub fn with_limit(self, limit: i64) -> Self {
        Self { limit, ..self }
    }

    #[cfg(test)]
    pub fn with_before(self, before: i64) -> Self {
        Self { before, ..self }
    }

    #[cfg(test)]
    pub fn with_after(self, after: i64) -> Self {
        Self { after, ..self }
    }

    pub fn has_before(&self) -> bool {
        self.before != 0
    }

    pub fn has_after(&self) -> bool {
        self.after != 0
    }
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| map.get(*name).filter(|value| !value.is_null()))
}

fn boolean(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One direction of a returned cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Height(i64),
    /// Nothing further is stored locally in this direction.
    Exhausted,
}

impl From<Option<i64>> for Bound {
    fn from(height: Option<i64>) -> Self {
        height.map_or(Bound::Exhausted, Bound::Height)
    }
}

// Exhausted travels as `false`, which normalizes back to "unbounded" when
// a client feeds it in again.
impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Bound::Height(h) => serializer.serialize_i64(*h),
            Bound::Exhausted => serializer.serialize_bool(false),
        }
    }
}

/// Options echoed back to the caller with the next cursor filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions {
    pub include_ordinal_data: bool,
    pub limit: i64,
    pub omit_hex: bool,
    pub omit_witness: bool,
    pub before: Bound,
    pub after: Bound,
}

impl PageOptions {
    pub fn new(options: FetchOptions, before: Bound, after: Bound) -> Self {
        Self {
            include_ordinal_data: options.include_ordinal_data,
            limit: options.limit,
            omit_hex: options.omit_hex,
            omit_witness: options.omit_witness,
            before,
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_bag_gets_defaults() {
        assert_eq!(FetchOptions::normalize(&json!({})), FetchOptions::default());
        assert_eq!(FetchOptions::normalize(&Value::Null), FetchOptions::default());
        assert_eq!(FetchOptions::normalize(&json!("limit=5")), FetchOptions::default());
    }

    #[test]
    fn partial_bag_keeps_supplied_values() {
        let options = FetchOptions::normalize(&json!({ "limit": 2, "nohex": true, "before": 100 }));

        assert_eq!(options.limit, 2);
        assert!(options.omit_hex);
        assert_eq!(options.before, 100);
        assert!(options.include_ordinal_data);
        assert!(!options.omit_witness);
        assert_eq!(options.after, 0);
    }

    #[test]
    fn long_and_short_names_are_accepted() {
        let short = FetchOptions::normalize(&json!({ "ord": false, "nowitness": true }));
        let long = FetchOptions::normalize(&json!({ "includeOrdinalData": false, "omitWitness": true }));

        assert_eq!(short, long);
        assert!(!short.include_ordinal_data);
        assert!(short.omit_witness);
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let options = FetchOptions::normalize(&json!({
            "limit": "many",
            "before": -4,
            "after": 12.5,
        }));
        assert_eq!(options.limit, DEFAULT_LIMIT);
        assert_eq!(options.before, 0);
        assert_eq!(options.after, 0);

        let options = FetchOptions::normalize(&json!({ "limit": 0 }));
        assert_eq!(options.limit, DEFAULT_LIMIT);

        let options = FetchOptions::normalize(&json!({ "limit": MAX_LIMIT + 1 }));
        assert_eq!(options.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn numeric_strings_and_integral_floats_are_numbers() {
        let options = FetchOptions::normalize(&json!({ "limit": "20", "before": 800000.0 }));
        assert_eq!(options.limit, 20);
        assert_eq!(options.before, 800_000);
    }

    #[test]
    fn exhausted_sentinel_fed_back_means_unbounded() {
        let options = FetchOptions::normalize(&json!({ "before": false, "after": false }));
        assert_eq!(options.before, 0);
        assert_eq!(options.after, 0);
    }

    #[test]
    fn normalize_leaves_input_untouched() {
        let raw = json!({ "limit": "bogus" });
        let snapshot = raw.clone();
        let _ = FetchOptions::normalize(&raw);
        assert_eq!(raw, snapshot);
    }

    #[test]
    fn bound_serializes_as_height_or_false() {
        let page = PageOptions::new(FetchOptions::default(), Bound::Height(99), Bound::Exhausted);
        let value = serde_json::to_value(page).unwrap();

        assert_eq!(value["before"], json!(99));
        assert_eq!(value["after"], json!(false));
        assert_eq!(value["includeOrdinalData"], json!(true));
    }
}
