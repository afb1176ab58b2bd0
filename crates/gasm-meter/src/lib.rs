//! GASM metering pass: injects static gas charges into a WebAssembly module.
//!
//! # Architecture
//!
//! The pass takes a decoded [`gasm_types::Module`] and produces a new,
//! metered module. Per function:
//!
//! 1. [`blocks`] splits the body into basic blocks at every control-flow
//!    boundary (region openers, `else`/`end`, branches, returns, calls).
//! 2. [`gas`] sums each block's instruction costs from the [`CostTable`].
//! 3. [`inject`] places `i32.const <charge>; call $gas` at the start of
//!    every block with a non-zero charge.
//!
//! Then, per module, [`bootstrap`] synthesizes the relocation routines and
//! [`assemble`] merges everything, preserving every index the input
//! already used.
//!
//! ## Imports required by the output
//! - `env.gas(i32)`: charged before each block executes
//! - `env.tableBase: i32`, `env.memoryBase: i32`: only with a bootstrap
//!
//! ## Exports added with a bootstrap
//! - `__post_instantiate()`: call once after linking
//! - `runPostSets()`: applies the static-data fixups
//! - `__relocation_base`, `__relocation_offset`, `__static_data_size`

pub mod assemble;
pub mod blocks;
pub mod bootstrap;
pub mod config;
pub mod consts;
pub mod cost;
pub mod error;
pub mod gas;
pub mod grow;
pub mod inject;
pub mod report;
pub mod validate;

pub use assemble::{meter, Metered};
pub use blocks::{extract_blocks, BasicBlock};
pub use bootstrap::{BootstrapManifest, RelocationGlobals};
pub use config::{BootstrapConfig, Fixup, FixupTarget, GasImport, GasImportMode, IndexLimits, MeterConfig};
pub use cost::CostTable;
pub use error::{MeterError, MeterResult};
pub use inject::{Injector, MeteredFunction};
pub use report::{FunctionKind, FunctionReport, MeterReport};
