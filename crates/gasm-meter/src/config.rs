//! Metering configuration.
//!
//! Everything the pass needs is passed in explicitly through
//! [`MeterConfig`]; there is no global state. Every field has a default so
//! hosts can send partial JSON.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::cost::CostTable;

/// Full configuration of one metering request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub cost_table: CostTable,
    pub gas_import: GasImport,
    pub gas_mode: GasImportMode,
    /// Synthesize the relocation bootstrap; `None` leaves the module
    /// without one.
    pub bootstrap: Option<BootstrapConfig>,
    pub limits: IndexLimits,
    /// Meter functions on the rayon pool (needs the `parallel` feature).
    pub parallel: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            cost_table: CostTable::default(),
            gas_import: GasImport::default(),
            gas_mode: GasImportMode::Require,
            bootstrap: None,
            limits: IndexLimits::default(),
            parallel: true,
        }
    }
}

impl MeterConfig {
    pub fn new(cost_table: CostTable) -> Self {
        Self {
            cost_table,
            ..Self::default()
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn with_gas_mode(mut self, mode: GasImportMode) -> Self {
        self.gas_mode = mode;
        self
    }

    pub fn with_limits(mut self, limits: IndexLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ── Gas import ───────────────────────────────────────────────────────────────

/// Module and field name of the gas-accounting function `(i32) -> ()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasImport {
    pub module: String,
    pub name: String,
}

impl Default for GasImport {
    fn default() -> Self {
        Self {
            module: GAS_MODULE.to_string(),
            name: GAS_FIELD.to_string(),
        }
    }
}

/// How the gas import is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasImportMode {
    /// The input already imports the gas function; no index moves.
    #[default]
    Require,
    /// Append the import and shift every defined-function index by one.
    Inject,
}

// ── Bootstrap ────────────────────────────────────────────────────────────────

/// Base a fixup is relocated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixupTarget {
    /// The imported memory base.
    Memory,
    /// The relocated table base.
    Table,
}

/// One relocation applied by the runtime-init routine:
/// `mem[memoryBase + address] = base(target) + addend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixup {
    pub address: u32,
    pub addend: i32,
    pub target: FixupTarget,
}

impl Fixup {
    pub fn memory(address: u32, addend: i32) -> Self {
        Self {
            address,
            addend,
            target: FixupTarget::Memory,
        }
    }

    pub fn table(address: u32, addend: i32) -> Self {
        Self {
            address,
            addend,
            target: FixupTarget::Table,
        }
    }
}

/// Parameters of the synthesized relocation bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Module of the imported base globals.
    pub base_module: String,
    pub table_base: String,
    pub memory_base: String,
    /// Size in bytes of the statically linked data.
    pub static_data_size: u32,
    pub fixups: Vec<Fixup>,
    pub post_instantiate_export: String,
    pub runtime_init_export: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            base_module: GAS_MODULE.to_string(),
            table_base: TABLE_BASE_FIELD.to_string(),
            memory_base: MEMORY_BASE_FIELD.to_string(),
            static_data_size: 0,
            fixups: Vec::new(),
            post_instantiate_export: POST_INSTANTIATE_EXPORT.to_string(),
            runtime_init_export: RUNTIME_INIT_EXPORT.to_string(),
        }
    }
}

impl BootstrapConfig {
    pub fn new(static_data_size: u32) -> Self {
        Self {
            static_data_size,
            ..Self::default()
        }
    }

    pub fn with_fixup(mut self, fixup: Fixup) -> Self {
        self.fixups.push(fixup);
        self
    }

    /// Whether the runtime-init routine needs the imported memory base.
    pub fn needs_memory_base(&self) -> bool {
        !self.fixups.is_empty()
    }
}

// ── Index limits ─────────────────────────────────────────────────────────────

/// Upper bounds on the index spaces the pass may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexLimits {
    pub types: u32,
    pub functions: u32,
    pub globals: u32,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self {
            types: MAX_TYPES,
            functions: MAX_FUNCTIONS,
            globals: MAX_GLOBALS,
        }
    }
}
