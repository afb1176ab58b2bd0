//! GASM pipeline: bytes in, metered bytes out.
//!
//! ```text
//! .wasm ─▶ validate ─▶ decode ─▶ meter ─▶ encode ─▶ validate ─▶ .wasm
//! ```
//!
//! Decoding and encoding are thin adapters over `wasmparser` and
//! `wasm-encoder`; all metering decisions live in [`gasm_meter`].
//!
//! # Example
//!
//! ```no_run
//! use gasm_meter::{CostTable, MeterConfig};
//!
//! let input = std::fs::read("contract.wasm").unwrap();
//! let config = MeterConfig::new(CostTable::default());
//! let metered = gasm_pipeline::instrument(&input, &config).unwrap();
//! ```

pub mod decode;
pub mod encode;
pub mod error;

use gasm_meter::{meter, CostTable, MeterConfig, MeterReport};
use gasm_types::ErrorReport;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use decode::decode_module;
pub use encode::encode_module;
pub use error::{PipelineError, PipelineResult};

/// A metered binary plus the metering report.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub wasm: Vec<u8>,
    pub report: MeterReport,
}

/// Meter a binary module.
pub fn instrument(bytes: &[u8], config: &MeterConfig) -> PipelineResult<Vec<u8>> {
    instrument_with_report(bytes, config).map(|out| out.wasm)
}

/// Meter a binary module and keep the metering report.
pub fn instrument_with_report(bytes: &[u8], config: &MeterConfig) -> PipelineResult<Instrumented> {
    wasmparser::validate(bytes).map_err(|e| PipelineError::InputValidation(format!("{e}")))?;

    let module = decode_module(bytes)?;
    let metered = meter(&module, config)?;
    let wasm = encode_module(&metered.module);

    wasmparser::validate(&wasm).map_err(|e| PipelineError::OutputValidation(format!("{e}")))?;

    info!(
        "instrumented module: {} -> {} bytes, {} charges",
        bytes.len(),
        wasm.len(),
        metered.report.total_charges()
    );
    Ok(Instrumented {
        wasm,
        report: metered.report,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Serializable result
// ══════════════════════════════════════════════════════════════════════════════

/// Outcome of an instrumentation request, serializable to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wasm: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<MeterReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Hex SHA-256 of the output binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_sha256: Option<String>,
    /// Hex SHA-256 of the cost table the request was metered with.
    pub cost_table_sha256: String,
}

/// Meter a binary module, folding any failure into the result.
pub fn instrument_to_result(bytes: &[u8], config: &MeterConfig) -> InstrumentResult {
    let cost_table_sha256 = cost_table_fingerprint(&config.cost_table);
    match instrument_with_report(bytes, config) {
        Ok(out) => InstrumentResult {
            success: true,
            output_sha256: Some(sha256_hex(&out.wasm)),
            wasm: Some(out.wasm),
            report: Some(out.report),
            error: None,
            cost_table_sha256,
        },
        Err(e) => {
            debug!("instrumentation failed: {e}");
            InstrumentResult {
                success: false,
                wasm: None,
                report: None,
                error: Some(e.to_report()),
                output_sha256: None,
                cost_table_sha256,
            }
        }
    }
}

/// Hex SHA-256 of the canonical JSON form of `table`.
///
/// Producers and consumers compare fingerprints to make sure they meter
/// with the same table.
pub fn cost_table_fingerprint(table: &CostTable) -> String {
    sha256_hex(&table.to_json())
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
