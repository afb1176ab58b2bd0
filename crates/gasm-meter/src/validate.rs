//! Structural validation of the input module.
//!
//! Runs before any rewriting so a bad module fails with `InvalidInput`
//! instead of producing a broken output. Checks cover every index the
//! pass reads or shifts; full type checking of the operand stack is left
//! to the binary validator downstream.

use std::collections::HashSet;

use gasm_types::{
    BlockType, ConstExpr, ExportKind, FuncType, ImportKind, Instruction, Location, Module, ValType,
};

use crate::config::{BootstrapConfig, GasImportMode, MeterConfig};
use crate::consts::*;
use crate::error::{MeterError, MeterResult};

/// Validate `module` against `config`.
///
/// Returns the index of the existing gas import, if the module has one.
pub fn validate_input(module: &Module, config: &MeterConfig) -> MeterResult<Option<u32>> {
    let gas = check_gas_import(module, config)?;
    check_signatures(module)?;
    check_globals(module)?;

    let imported = module.imported_function_count();
    for i in 0..module.functions.len() {
        check_body(module, imported + i as u32, gas)?;
    }

    check_exports(module)?;
    check_segments(module)?;

    if let Some(bootstrap) = &config.bootstrap {
        check_bootstrap(module, bootstrap)?;
    }
    Ok(gas)
}

// ── Gas import ───────────────────────────────────────────────────────────────

fn check_gas_import(module: &Module, config: &MeterConfig) -> MeterResult<Option<u32>> {
    let import = &config.gas_import;
    let Some(index) = module.find_function_import(&import.module, &import.name) else {
        return match config.gas_mode {
            GasImportMode::Require => Err(MeterError::invalid(format!(
                "module does not import the gas function `{}.{}`",
                import.module, import.name
            ))),
            GasImportMode::Inject => Ok(None),
        };
    };

    let expected = FuncType::new(vec![ValType::I32], vec![]);
    match module.function_type(index) {
        Some(ty) if *ty == expected => Ok(Some(index)),
        _ => Err(MeterError::invalid(format!(
            "gas import `{}.{}` must have type (i32) -> ()",
            import.module, import.name
        ))),
    }
}

// ── Types and globals ────────────────────────────────────────────────────────

fn check_signatures(module: &Module) -> MeterResult<()> {
    let types = module.types.len();
    for import in &module.imports {
        if let ImportKind::Function(ty) = import.kind {
            if ty as usize >= types {
                return Err(MeterError::invalid(format!(
                    "import `{}.{}` uses missing type {ty}",
                    import.module, import.name
                )));
            }
        }
    }
    let imported = module.imported_function_count();
    for (i, function) in module.functions.iter().enumerate() {
        if function.type_index as usize >= types {
            return Err(MeterError::invalid(format!(
                "function {} uses missing type {}",
                imported + i as u32,
                function.type_index
            )));
        }
    }
    Ok(())
}

fn check_globals(module: &Module) -> MeterResult<()> {
    let imported = module.imported_global_count();
    for (i, global) in module.globals.iter().enumerate() {
        if let ConstExpr::GlobalGet(g) = global.init {
            if g >= imported {
                return Err(MeterError::invalid(format!(
                    "global {} is initialized from non-imported global {g}",
                    imported + i as u32
                )));
            }
        }
    }
    Ok(())
}

// ── Function bodies ──────────────────────────────────────────────────────────

fn check_body(module: &Module, index: u32, gas: Option<u32>) -> MeterResult<()> {
    let imported = module.imported_function_count();
    let function = &module.functions[(index - imported) as usize];
    let params = module
        .function_type(index)
        .map(|ty| ty.params.len() as u64)
        .unwrap_or(0);
    let locals = params + function.local_count();
    let functions = module.function_space();
    let globals = module.global_space();
    let tables = module.table_space();
    let memories = module.memory_space();
    let types = module.types.len() as u64;

    for (offset, instr) in function.body.iter().enumerate() {
        let at = Location::new(index, offset);
        let bad = |what: String| Err(MeterError::invalid_at(at, what));

        match instr {
            Instruction::Call(f) => {
                if u64::from(*f) >= functions {
                    return bad(format!("call to missing function {f}"));
                }
                if Some(*f) == gas {
                    return bad("module already calls the gas function".to_string());
                }
            }
            Instruction::CallIndirect {
                type_index,
                table_index,
            } => {
                if u64::from(*type_index) >= types {
                    return bad(format!("call_indirect uses missing type {type_index}"));
                }
                if u64::from(*table_index) >= tables {
                    return bad(format!("call_indirect uses missing table {table_index}"));
                }
            }
            Instruction::Block(BlockType::Func(ty))
            | Instruction::Loop(BlockType::Func(ty))
            | Instruction::If(BlockType::Func(ty)) => {
                if u64::from(*ty) >= types {
                    return bad(format!("block uses missing type {ty}"));
                }
            }
            Instruction::LocalGet(l) | Instruction::LocalSet(l) | Instruction::LocalTee(l) => {
                if u64::from(*l) >= locals {
                    return bad(format!("local {l} out of range ({locals} locals)"));
                }
            }
            Instruction::GlobalGet(g) => {
                if u64::from(*g) >= globals {
                    return bad(format!("global {g} does not exist"));
                }
            }
            Instruction::GlobalSet(g) => match module.global_type(*g) {
                Some(ty) if ty.mutable => {}
                Some(_) => return bad(format!("global.set on immutable global {g}")),
                None => return bad(format!("global {g} does not exist")),
            },
            Instruction::Load(..) | Instruction::Store(..) => {
                if memories == 0 {
                    return bad(format!("`{}` without a memory", instr.mnemonic()));
                }
            }
            Instruction::MemorySize(m) | Instruction::MemoryGrow(m) => {
                if u64::from(*m) >= memories {
                    return bad(format!("`{}` uses missing memory {m}", instr.mnemonic()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Exports and segments ─────────────────────────────────────────────────────

fn check_exports(module: &Module) -> MeterResult<()> {
    let mut names = HashSet::new();
    for export in &module.exports {
        if !names.insert(export.name.as_str()) {
            return Err(MeterError::invalid(format!(
                "duplicate export `{}`",
                export.name
            )));
        }
        let space = match export.kind {
            ExportKind::Function => module.function_space(),
            ExportKind::Table => module.table_space(),
            ExportKind::Memory => module.memory_space(),
            ExportKind::Global => module.global_space(),
        };
        if u64::from(export.index) >= space {
            return Err(MeterError::invalid(format!(
                "export `{}` refers to missing index {}",
                export.name, export.index
            )));
        }
    }
    if let Some(start) = module.start {
        if u64::from(start) >= module.function_space() {
            return Err(MeterError::invalid(format!(
                "start refers to missing function {start}"
            )));
        }
    }
    Ok(())
}

fn check_segments(module: &Module) -> MeterResult<()> {
    for (i, segment) in module.elements.iter().enumerate() {
        if u64::from(segment.table_index) >= module.table_space() {
            return Err(MeterError::invalid(format!(
                "element segment {i} targets missing table {}",
                segment.table_index
            )));
        }
        if let Some(f) = segment
            .functions
            .iter()
            .find(|f| u64::from(**f) >= module.function_space())
        {
            return Err(MeterError::invalid(format!(
                "element segment {i} refers to missing function {f}"
            )));
        }
    }
    for (i, segment) in module.data.iter().enumerate() {
        if u64::from(segment.memory_index) >= module.memory_space() {
            return Err(MeterError::invalid(format!(
                "data segment {i} targets missing memory {}",
                segment.memory_index
            )));
        }
    }
    Ok(())
}

// ── Bootstrap ────────────────────────────────────────────────────────────────

fn check_bootstrap(module: &Module, bootstrap: &BootstrapConfig) -> MeterResult<()> {
    require_i32_global(module, &bootstrap.base_module, &bootstrap.table_base)?;
    if bootstrap.needs_memory_base() {
        require_i32_global(module, &bootstrap.base_module, &bootstrap.memory_base)?;
        if module.memory_space() == 0 {
            return Err(MeterError::invalid(
                "bootstrap fixups need a linear memory",
            ));
        }
    }
    if bootstrap.static_data_size > i32::MAX as u32 {
        return Err(MeterError::invalid(format!(
            "static data size {} does not fit in an i32",
            bootstrap.static_data_size
        )));
    }

    let reserved = [
        bootstrap.post_instantiate_export.as_str(),
        bootstrap.runtime_init_export.as_str(),
        RELOCATION_BASE_EXPORT,
        RELOCATION_OFFSET_EXPORT,
        STATIC_DATA_SIZE_EXPORT,
    ];
    if let Some(name) = reserved.iter().find(|n| module.find_export(n).is_some()) {
        return Err(MeterError::invalid(format!(
            "module already exports `{name}`"
        )));
    }
    if bootstrap.post_instantiate_export == bootstrap.runtime_init_export {
        return Err(MeterError::invalid(
            "bootstrap routines need distinct export names",
        ));
    }
    Ok(())
}

fn require_i32_global(module: &Module, base_module: &str, name: &str) -> MeterResult<()> {
    let index = module
        .find_global_import(base_module, name)
        .ok_or_else(|| {
            MeterError::invalid(format!(
                "bootstrap needs the imported global `{base_module}.{name}`"
            ))
        })?;
    match module.global_type(index) {
        Some(ty) if ty.value_type == ValType::I32 => Ok(()),
        _ => Err(MeterError::invalid(format!(
            "imported global `{base_module}.{name}` must be an i32"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fixup;
    use gasm_types::{
        ErrorKind, Export, Function, Global, GlobalType, Import, LoadOp, MemArg, MemoryType,
    };

    fn i32_global() -> ImportKind {
        ImportKind::Global(GlobalType {
            value_type: ValType::I32,
            mutable: false,
        })
    }

    fn base_module(body: Vec<Instruction>) -> Module {
        let mut m = Module::new();
        m.types.push(FuncType::new(vec![ValType::I32], vec![]));
        m.types.push(FuncType::new(vec![ValType::I32], vec![ValType::I32]));
        m.imports.push(Import::new("env", "gas", ImportKind::Function(0)));
        m.imports.push(Import::new("env", "tableBase", i32_global()));
        m.functions.push(Function::new(1, vec![], body));
        m.exports.push(Export::new("main", ExportKind::Function, 1));
        m
    }

    fn invalid_at(module: &Module, config: &MeterConfig) -> Option<Location> {
        let err = validate_input(module, config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{err}");
        err.location()
    }

    #[test]
    fn accepts_well_formed_module() {
        let m = base_module(vec![Instruction::LocalGet(0)]);
        assert_eq!(validate_input(&m, &MeterConfig::default()).unwrap(), Some(0));
    }

    #[test]
    fn missing_gas_import_depends_on_mode() {
        let mut m = base_module(vec![Instruction::LocalGet(0)]);
        m.imports.remove(0);
        m.exports[0].index = 0;
        assert_eq!(invalid_at(&m, &MeterConfig::default()), None);

        let inject = MeterConfig::default().with_gas_mode(GasImportMode::Inject);
        assert_eq!(validate_input(&m, &inject).unwrap(), None);
    }

    #[test]
    fn gas_import_with_wrong_signature() {
        let mut m = base_module(vec![Instruction::LocalGet(0)]);
        m.imports[0].kind = ImportKind::Function(1);
        invalid_at(&m, &MeterConfig::default());
    }

    #[test]
    fn already_metered_input_is_rejected() {
        let m = base_module(vec![
            Instruction::I32Const(1),
            Instruction::Call(0),
            Instruction::LocalGet(0),
        ]);
        assert_eq!(
            invalid_at(&m, &MeterConfig::default()),
            Some(Location::new(1, 1))
        );
    }

    #[test]
    fn out_of_range_indices() {
        let m = base_module(vec![Instruction::LocalGet(1)]);
        assert_eq!(invalid_at(&m, &MeterConfig::default()), Some(Location::new(1, 0)));

        let m = base_module(vec![Instruction::Call(9)]);
        assert_eq!(invalid_at(&m, &MeterConfig::default()), Some(Location::new(1, 0)));

        let m = base_module(vec![Instruction::GlobalSet(0)]);
        assert_eq!(invalid_at(&m, &MeterConfig::default()), Some(Location::new(1, 0)));

        let m = base_module(vec![Instruction::Load(LoadOp::I32Load, MemArg::new(0, 2))]);
        assert_eq!(invalid_at(&m, &MeterConfig::default()), Some(Location::new(1, 0)));

        let mut m = base_module(vec![]);
        m.exports.push(Export::new("g", ExportKind::Global, 3));
        assert_eq!(invalid_at(&m, &MeterConfig::default()), None);

        let mut m = base_module(vec![]);
        m.globals.push(Global {
            ty: GlobalType {
                value_type: ValType::I32,
                mutable: false,
            },
            init: ConstExpr::GlobalGet(1),
        });
        invalid_at(&m, &MeterConfig::default());
    }

    #[test]
    fn duplicate_exports() {
        let mut m = base_module(vec![]);
        m.exports.push(Export::new("main", ExportKind::Function, 1));
        invalid_at(&m, &MeterConfig::default());
    }

    #[test]
    fn bootstrap_requirements() {
        let config = MeterConfig::default().with_bootstrap(BootstrapConfig::new(16));
        let m = base_module(vec![]);
        assert!(validate_input(&m, &config).is_ok());

        let mut no_base = base_module(vec![]);
        no_base.imports.remove(1);
        invalid_at(&no_base, &config);

        // memory fixups need memoryBase and a memory
        let fixups = MeterConfig::default()
            .with_bootstrap(BootstrapConfig::new(16).with_fixup(Fixup::memory(0, 4)));
        invalid_at(&m, &fixups);

        let mut full = base_module(vec![]);
        full.imports.push(Import::new("env", "memoryBase", i32_global()));
        full.imports.push(Import::new(
            "env",
            "memory",
            ImportKind::Memory(MemoryType {
                initial: 1,
                maximum: None,
            }),
        ));
        assert!(validate_input(&full, &fixups).is_ok());

        let mut clash = base_module(vec![]);
        clash
            .exports
            .push(Export::new("__post_instantiate", ExportKind::Function, 1));
        invalid_at(&clash, &config);
    }
}
