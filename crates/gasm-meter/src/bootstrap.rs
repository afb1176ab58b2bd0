//! Bootstrap synthesis.
//!
//! Builds the two instantiation-time routines and the relocation globals:
//!
//! ```text
//! __post_instantiate:            runPostSets:
//!   global.get $initialized        ;; per fixup
//!   if                             global.get $memoryBase
//!     return                       global.get $memoryBase | $base
//!   end                            i32.const addend
//!   i32.const 1                    i32.add
//!   global.set $initialized        i32.store offset=address
//!   global.get $tableBase
//!   global.set $base
//!   global.get $base
//!   global.get $static_size
//!   i32.add
//!   global.set $offset
//!   call $runPostSets
//! ```
//!
//! `$base` and `$offset` start at zero and are written only by
//! `__post_instantiate`. The private `$initialized` flag makes every call
//! after the first a no-op, so relocation and fixups happen exactly once. Loaders find the entry point through the
//! `gasm.bootstrap` custom section, since the binary format has no
//! "run before anything else" marker.

use gasm_types::{
    BlockType, ConstExpr, CustomSection, Export, ExportKind, Function, Global, GlobalType, Instruction,
    MemArg, Module, NumericOp, StoreOp, ValType,
};
use serde::{Deserialize, Serialize};

use crate::config::{BootstrapConfig, FixupTarget};
use crate::consts::*;
use crate::error::{MeterError, MeterResult};

/// Absolute indices of the exported relocation globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationGlobals {
    /// Relocated table base (A), mutable.
    pub base: u32,
    /// End of the relocated static data (B = A + size), mutable.
    pub offset: u32,
    /// Compile-time static data size, immutable.
    pub static_data_size: u32,
}

/// Where the synthesized items land in the output index spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapLayout {
    /// Type index of `() -> ()`.
    pub void_type: u32,
    /// Global index of the first synthesized global.
    pub first_global: u32,
    pub post_instantiate_index: u32,
    pub runtime_init_index: u32,
}

/// The synthesized routines and globals, not yet metered.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    pub globals: Vec<Global>,
    pub relocation: RelocationGlobals,
    /// Index of the unexported run-once flag.
    pub initialized: u32,
    pub post_instantiate: Function,
    pub runtime_init: Function,
    layout: BootstrapLayout,
    manifest: BootstrapManifest,
}

/// Contents of the `gasm.bootstrap` custom section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapManifest {
    pub version: String,
    /// Export to call once after linking, before any other export. Later
    /// calls return without touching memory or globals.
    pub entry: String,
    pub entry_index: u32,
    pub runtime_init: String,
    pub runtime_init_index: u32,
    pub globals: RelocationGlobals,
    pub static_data_size: u32,
    pub fixups: usize,
    /// Global that records whether `entry` has already run.
    pub initialized_global: u32,
}

impl BootstrapManifest {
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }

    /// Read the manifest out of a module's custom sections.
    pub fn find(module: &Module) -> Option<Self> {
        module
            .customs
            .iter()
            .find(|c| c.name == BOOTSTRAP_SECTION_NAME)
            .and_then(|c| Self::from_json(&c.data))
    }
}

/// Build the bootstrap for `module` under `layout`.
pub fn synthesize(
    module: &Module,
    config: &BootstrapConfig,
    layout: BootstrapLayout,
) -> MeterResult<Bootstrap> {
    let table_base = base_global(module, config, &config.table_base)?;
    let relocation = RelocationGlobals {
        base: layout.first_global,
        offset: layout.first_global + 1,
        static_data_size: layout.first_global + 2,
    };
    let initialized = layout.first_global + 3;

    let mutable_zero = Global {
        ty: GlobalType {
            value_type: ValType::I32,
            mutable: true,
        },
        init: ConstExpr::I32(0),
    };
    let size = Global {
        ty: GlobalType {
            value_type: ValType::I32,
            mutable: false,
        },
        init: ConstExpr::I32(config.static_data_size as i32),
    };
    let globals = vec![mutable_zero.clone(), mutable_zero.clone(), size, mutable_zero];

    let post_instantiate = Function::new(
        layout.void_type,
        vec![],
        vec![
            Instruction::GlobalGet(initialized),
            Instruction::If(BlockType::Empty),
            Instruction::Return,
            Instruction::End,
            Instruction::I32Const(1),
            Instruction::GlobalSet(initialized),
            Instruction::GlobalGet(table_base),
            Instruction::GlobalSet(relocation.base),
            Instruction::GlobalGet(relocation.base),
            Instruction::GlobalGet(relocation.static_data_size),
            Instruction::Numeric(NumericOp::I32Add),
            Instruction::GlobalSet(relocation.offset),
            Instruction::Call(layout.runtime_init_index),
        ],
    );

    let mut init_body = Vec::with_capacity(config.fixups.len() * 5);
    if !config.fixups.is_empty() {
        let memory_base = base_global(module, config, &config.memory_base)?;
        for fixup in &config.fixups {
            let base = match fixup.target {
                FixupTarget::Memory => memory_base,
                FixupTarget::Table => relocation.base,
            };
            init_body.extend([
                Instruction::GlobalGet(memory_base),
                Instruction::GlobalGet(base),
                Instruction::I32Const(fixup.addend),
                Instruction::Numeric(NumericOp::I32Add),
                Instruction::Store(StoreOp::I32Store, MemArg::new(u64::from(fixup.address), 2)),
            ]);
        }
    }
    let runtime_init = Function::new(layout.void_type, vec![], init_body);

    let manifest = BootstrapManifest {
        version: METER_VERSION.to_string(),
        entry: config.post_instantiate_export.clone(),
        entry_index: layout.post_instantiate_index,
        runtime_init: config.runtime_init_export.clone(),
        runtime_init_index: layout.runtime_init_index,
        globals: relocation,
        static_data_size: config.static_data_size,
        fixups: config.fixups.len(),
        initialized_global: initialized,
    };

    Ok(Bootstrap {
        globals,
        relocation,
        initialized,
        post_instantiate,
        runtime_init,
        layout,
        manifest,
    })
}

impl Bootstrap {
    /// Exports for both routines and the three relocation globals.
    pub fn exports(&self) -> Vec<Export> {
        vec![
            Export::new(
                &self.manifest.entry,
                ExportKind::Function,
                self.layout.post_instantiate_index,
            ),
            Export::new(
                &self.manifest.runtime_init,
                ExportKind::Function,
                self.layout.runtime_init_index,
            ),
            Export::new(RELOCATION_BASE_EXPORT, ExportKind::Global, self.relocation.base),
            Export::new(
                RELOCATION_OFFSET_EXPORT,
                ExportKind::Global,
                self.relocation.offset,
            ),
            Export::new(
                STATIC_DATA_SIZE_EXPORT,
                ExportKind::Global,
                self.relocation.static_data_size,
            ),
        ]
    }

    pub fn manifest(&self) -> &BootstrapManifest {
        &self.manifest
    }

    pub fn custom_section(&self) -> CustomSection {
        CustomSection {
            name: BOOTSTRAP_SECTION_NAME.to_string(),
            data: self.manifest.to_json(),
        }
    }
}

fn base_global(module: &Module, config: &BootstrapConfig, name: &str) -> MeterResult<u32> {
    module
        .find_global_import(&config.base_module, name)
        .ok_or_else(|| {
            MeterError::invalid(format!(
                "bootstrap needs the imported global `{}.{name}`",
                config.base_module
            ))
        })
}
