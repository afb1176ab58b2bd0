//! Names and limits shared by the metering stages.

// ── Gas import ───────────────────────────────────────────────────────────────

/// Default module of the gas-accounting import.
pub const GAS_MODULE: &str = "env";
/// Default field name of the gas-accounting import: `(i32) -> ()`.
pub const GAS_FIELD: &str = "gas";

// ── Bootstrap ────────────────────────────────────────────────────────────────

/// Imported global holding the runtime table base.
pub const TABLE_BASE_FIELD: &str = "tableBase";
/// Imported global holding the runtime memory base.
pub const MEMORY_BASE_FIELD: &str = "memoryBase";

/// Export name of the relocation routine.
pub const POST_INSTANTIATE_EXPORT: &str = "__post_instantiate";
/// Export name of the runtime-init routine.
pub const RUNTIME_INIT_EXPORT: &str = "runPostSets";

/// Export names of the three relocation globals.
pub const RELOCATION_BASE_EXPORT: &str = "__relocation_base";
pub const RELOCATION_OFFSET_EXPORT: &str = "__relocation_offset";
pub const STATIC_DATA_SIZE_EXPORT: &str = "__static_data_size";

// ── Custom sections ──────────────────────────────────────────────────────────

/// JSON description of the synthesized bootstrap, for loaders.
pub const BOOTSTRAP_SECTION_NAME: &str = "gasm.bootstrap";
/// Standard name section; its indices go stale when functions shift.
pub const NAME_SECTION_NAME: &str = "name";

/// Metering pass version embedded in the bootstrap section.
pub const METER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Index-space limits ───────────────────────────────────────────────────────
// The implementation limits shared by the major engines.

pub const MAX_TYPES: u32 = 1_000_000;
pub const MAX_FUNCTIONS: u32 = 1_000_000;
pub const MAX_GLOBALS: u32 = 1_000_000;
