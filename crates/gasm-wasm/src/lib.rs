//! GASM metering pass as a WASM module for JavaScript hosts.
//!
//! This crate exposes the instrumentation pipeline via `wasm-bindgen`.
//! It is built without the `parallel` feature.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { instrument, default_config } from 'gasm-wasm';
//!
//! await init();
//!
//! const config = JSON.parse(default_config());
//! config.gas_mode = "inject";
//! const result = JSON.parse(instrument(bytes, JSON.stringify(config)));
//! // { success: true, wasm: [0, 97, 115, 109, ...], report: { ... }, ... }
//! ```

use gasm_meter::{CostTable, MeterConfig};
use gasm_pipeline::InstrumentResult;
use gasm_types::{ErrorKind, ErrorReport};
use wasm_bindgen::prelude::*;

/// Meter a binary module.
///
/// `config_json` is a serialized `MeterConfig`; an empty string selects the
/// defaults. Returns a JSON string containing an `InstrumentResult`:
/// ```json
/// {
///   "success": true,
///   "wasm": [0, 97, 115, 109, ...],
///   "report": { "gas_function": 0, "functions": [ ... ] },
///   "output_sha256": "…",
///   "cost_table_sha256": "…"
/// }
/// ```
///
/// On failure, `success` is `false` and `error` holds a structured
/// `ErrorReport` with a numeric code.
#[wasm_bindgen]
pub fn instrument(wasm: &[u8], config_json: &str) -> String {
    let result = match parse_config(config_json) {
        Ok(config) => gasm_pipeline::instrument_to_result(wasm, &config),
        Err(e) => config_error(e),
    };
    serde_json::to_string(&result).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"error":{{"kind":"invalid_input","code":400,"message":"Serialization error: {}"}},"cost_table_sha256":""}}"#,
            e
        )
    })
}

/// Like [`instrument`], but takes and returns JavaScript values.
#[wasm_bindgen]
pub fn instrument_value(wasm: &[u8], config: JsValue) -> Result<JsValue, JsValue> {
    let config: MeterConfig = if config.is_undefined() || config.is_null() {
        MeterConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };
    let result = gasm_pipeline::instrument_to_result(wasm, &config);
    Ok(serde_wasm_bindgen::to_value(&result)?)
}

/// The default `MeterConfig`, as JSON.
#[wasm_bindgen]
pub fn default_config() -> String {
    MeterConfig::default().to_json()
}

/// Hex SHA-256 fingerprint of a JSON cost table, or `undefined` if the
/// table does not parse.
#[wasm_bindgen]
pub fn cost_table_fingerprint(table_json: &str) -> Option<String> {
    CostTable::from_json(table_json.as_bytes()).map(|t| gasm_pipeline::cost_table_fingerprint(&t))
}

/// Return the metering pass version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn parse_config(json: &str) -> Result<MeterConfig, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(MeterConfig::default());
    }
    MeterConfig::from_json(json)
}

fn config_error(e: serde_json::Error) -> InstrumentResult {
    InstrumentResult {
        success: false,
        wasm: None,
        report: None,
        error: Some(ErrorReport::new(
            ErrorKind::InvalidInput,
            format!("invalid config: {e}"),
            None,
        )),
        output_sha256: None,
        cost_table_sha256: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"(module
        (import "env" "gas" (func (param i32)))
        (func (export "f") (result i32)
            i32.const 1))"#;

    fn parse(json: &str) -> serde_json::Value {
        serde_json::from_str(json).expect("not JSON")
    }

    #[test]
    fn instrument_with_default_config() {
        let bytes = wat::parse_str(MODULE).unwrap();
        let result = parse(&instrument(&bytes, ""));
        assert_eq!(result["success"], true);
        assert!(result["wasm"].is_array());
        assert_eq!(result["report"]["functions"][0]["charges"], 1);
    }

    #[test]
    fn config_round_trips_through_json() {
        let bytes = wat::parse_str(MODULE).unwrap();
        let result = parse(&instrument(&bytes, &default_config()));
        assert_eq!(result["success"], true);
    }

    #[test]
    fn bad_config_is_reported() {
        let bytes = wat::parse_str(MODULE).unwrap();
        let result = parse(&instrument(&bytes, "{ not json"));
        assert_eq!(result["success"], false);
        assert_eq!(result["error"]["kind"], "invalid_input");
    }

    #[test]
    fn fingerprint_of_table_json() {
        let table = String::from_utf8(CostTable::default().to_json()).unwrap();
        let fp = cost_table_fingerprint(&table).unwrap();
        assert_eq!(fp, gasm_pipeline::cost_table_fingerprint(&CostTable::default()));
        assert!(cost_table_fingerprint("not json").is_none());
    }

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
