//! Metering report: per-function block and charge statistics.
//!
//! The report lets a host audit what the pass did without re-parsing the
//! output, e.g. to show the static cost of every export.

use serde::{Deserialize, Serialize};

use crate::bootstrap::RelocationGlobals;

/// Summary of one metered module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReport {
    /// Absolute index of the gas import in the output.
    pub gas_function: u32,
    /// Whether the gas import was added by the pass.
    pub gas_import_injected: bool,
    pub functions: Vec<FunctionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapReport>,
    /// Index of the synthesized memory-grow charger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grow_function: Option<u32>,
}

/// Statistics of one metered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    /// Absolute function index in the output.
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    pub kind: FunctionKind,
    pub blocks: usize,
    pub charges: usize,
    /// Sum of every static charge in the body.
    pub static_cost: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// A function of the input module.
    Original,
    PostInstantiate,
    RuntimeInit,
}

/// Where the bootstrap landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub post_instantiate: u32,
    pub runtime_init: u32,
    pub globals: RelocationGlobals,
}

impl MeterReport {
    pub fn new(gas_function: u32, gas_import_injected: bool) -> Self {
        Self {
            gas_function,
            gas_import_injected,
            ..Self::default()
        }
    }

    pub fn find_by_func_index(&self, index: u32) -> Option<&FunctionReport> {
        self.functions.iter().find(|f| f.index == index)
    }

    pub fn find_by_export(&self, name: &str) -> Option<&FunctionReport> {
        self.functions
            .iter()
            .find(|f| f.export.as_deref() == Some(name))
    }

    /// Charge pairs injected across the module.
    pub fn total_charges(&self) -> usize {
        self.functions.iter().map(|f| f.charges).sum()
    }

    pub fn total_static_cost(&self) -> u64 {
        self.functions.iter().map(|f| f.static_cost).sum()
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}
