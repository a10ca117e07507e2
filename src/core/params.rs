//! Analyzer parameter bags.
//!
//! Parameters arrive as loose JSON objects (`AnalyzerSpec` defaults plus per-job
//! overrides) and are decoded into each analyzer's typed parameter struct.
//! Typed structs use `#[serde(default)]`, so unknown keys are ignored and
//! missing keys fall back to defaults; a wrong type fails the decode with
//! `InvalidParameters` before the analyzer makes any external call.

use crate::core::errors::AnalyzerError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Overlay `overrides` on `defaults`, key by key.
pub fn merge(defaults: &Map<String, Value>, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Decode a parameter bag into a typed parameter struct.
pub fn decode<T: DeserializeOwned>(analyzer: &str, params: &Map<String, Value>) -> Result<T, AnalyzerError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| {
        AnalyzerError::invalid_parameters(format!("{}: {}", analyzer, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct PollParams {
        max_tries: u32,
        poll_distance: u64,
    }

    impl Default for PollParams {
        fn default() -> Self {
            Self {
                max_tries: 10,
                poll_distance: 30,
            }
        }
    }

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn overrides_win_and_unknown_keys_are_ignored() {
        let defaults = object(json!({"max_tries": 5, "rank_strings": true}));
        let overrides = object(json!({"max_tries": 1}));
        let merged = merge(&defaults, Some(&overrides));
        let params: PollParams = decode("VT_v3_Scan", &merged).unwrap();
        assert_eq!(
            params,
            PollParams {
                max_tries: 1,
                poll_distance: 30
            }
        );
    }

    #[test]
    fn type_mismatch_fails_fast() {
        let bad = object(json!({"max_tries": "three"}));
        let err = decode::<PollParams>("Cuckoo_Scan", &bad).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(err.detail.starts_with("Cuckoo_Scan"));
    }
}
