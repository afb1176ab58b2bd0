//! Module IR.
//!
//! A decoded module, sections in binary order. Index spaces follow the
//! WebAssembly rules: imported entities come first, then module-defined
//! ones, in declaration order.

use crate::{Instruction, ValType};

// ══════════════════════════════════════════════════════════════════════════════
// Types and imports
// ══════════════════════════════════════════════════════════════════════════════

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self { params, results }
    }
}

/// A `funcref` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub initial: u64,
    pub maximum: Option<u64>,
}

/// A 32-bit linear memory, sizes in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub initial: u64,
    pub maximum: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Type index of the imported function.
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

impl Import {
    pub fn new(module: impl Into<String>, name: impl Into<String>, kind: ImportKind) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            kind,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Definitions
// ══════════════════════════════════════════════════════════════════════════════

/// A module-defined function.
///
/// `body` excludes the implicit `end` that terminates every function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    pub type_index: u32,
    /// Local declarations as `(count, type)` runs, parameters excluded.
    pub locals: Vec<(u32, ValType)>,
    pub body: Vec<Instruction>,
}

impl Function {
    pub fn new(type_index: u32, locals: Vec<(u32, ValType)>, body: Vec<Instruction>) -> Self {
        Self {
            type_index,
            locals,
            body,
        }
    }

    /// Number of declared locals, parameters excluded.
    pub fn local_count(&self) -> u64 {
        self.locals.iter().map(|(n, _)| u64::from(*n)).sum()
    }
}

/// A constant initializer expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    /// Raw IEEE-754 bits.
    F32(u32),
    /// Raw IEEE-754 bits.
    F64(u64),
    GlobalGet(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

impl Export {
    pub fn new(name: impl Into<String>, kind: ExportKind, index: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            index,
        }
    }
}

/// An active `funcref` element segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub table_index: u32,
    pub offset: ConstExpr,
    pub functions: Vec<u32>,
}

/// An active data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub memory_index: u32,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub customs: Vec<CustomSection>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Index spaces ─────────────────────────────────────────────────────

    pub fn imported_function_count(&self) -> u32 {
        self.count_imports(|k| matches!(k, ImportKind::Function(_)))
    }

    pub fn imported_global_count(&self) -> u32 {
        self.count_imports(|k| matches!(k, ImportKind::Global(_)))
    }

    pub fn imported_table_count(&self) -> u32 {
        self.count_imports(|k| matches!(k, ImportKind::Table(_)))
    }

    pub fn imported_memory_count(&self) -> u32 {
        self.count_imports(|k| matches!(k, ImportKind::Memory(_)))
    }

    fn count_imports(&self, pred: impl Fn(&ImportKind) -> bool) -> u32 {
        self.imports.iter().filter(|i| pred(&i.kind)).count() as u32
    }

    /// Size of the function index space (imports + definitions).
    pub fn function_space(&self) -> u64 {
        u64::from(self.imported_function_count()) + self.functions.len() as u64
    }

    pub fn global_space(&self) -> u64 {
        u64::from(self.imported_global_count()) + self.globals.len() as u64
    }

    pub fn table_space(&self) -> u64 {
        u64::from(self.imported_table_count()) + self.tables.len() as u64
    }

    pub fn memory_space(&self) -> u64 {
        u64::from(self.imported_memory_count()) + self.memories.len() as u64
    }

    /// Type index of the function at absolute index `func_index`.
    pub fn function_type_index(&self, func_index: u32) -> Option<u32> {
        let imported = self.imported_function_count();
        if func_index < imported {
            self.imports
                .iter()
                .filter_map(|i| match i.kind {
                    ImportKind::Function(ty) => Some(ty),
                    _ => None,
                })
                .nth(func_index as usize)
        } else {
            self.functions
                .get((func_index - imported) as usize)
                .map(|f| f.type_index)
        }
    }

    /// Signature of the function at absolute index `func_index`.
    pub fn function_type(&self, func_index: u32) -> Option<&FuncType> {
        self.function_type_index(func_index)
            .and_then(|ty| self.types.get(ty as usize))
    }

    /// Type of the global at absolute index `global_index`.
    pub fn global_type(&self, global_index: u32) -> Option<GlobalType> {
        let imported = self.imported_global_count();
        if global_index < imported {
            self.imports
                .iter()
                .filter_map(|i| match i.kind {
                    ImportKind::Global(ty) => Some(ty),
                    _ => None,
                })
                .nth(global_index as usize)
        } else {
            self.globals
                .get((global_index - imported) as usize)
                .map(|g| g.ty)
        }
    }

    /// Absolute function index of the imported function `module.name`.
    pub fn find_function_import(&self, module: &str, name: &str) -> Option<u32> {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Function(_)))
            .position(|i| i.module == module && i.name == name)
            .map(|p| p as u32)
    }

    /// Absolute global index of the imported global `module.name`.
    pub fn find_global_import(&self, module: &str, name: &str) -> Option<u32> {
        self.imports
            .iter()
            .filter(|i| matches!(i.kind, ImportKind::Global(_)))
            .position(|i| i.module == module && i.name == name)
            .map(|p| p as u32)
    }

    pub fn find_export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// Index of an existing type equal to `ty`, if any.
    pub fn find_type(&self, ty: &FuncType) -> Option<u32> {
        self.types.iter().position(|t| t == ty).map(|p| p as u32)
    }

    /// Name a function is exported under, if any.
    pub fn export_name_of_function(&self, func_index: u32) -> Option<&str> {
        self.exports
            .iter()
            .find(|e| e.kind == ExportKind::Function && e.index == func_index)
            .map(|e| e.name.as_str())
    }
}
