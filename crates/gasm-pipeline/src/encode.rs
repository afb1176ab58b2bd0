//! Binary encoding: module IR → WebAssembly bytes, via `wasm-encoder`.
//!
//! Sections are emitted in the standard order; custom sections go last.

use std::borrow::Cow;

use gasm_types::{
    BlockType, ConstExpr, DataSegment, ElementSegment, ExportKind, Function, GlobalType,
    ImportKind, Instruction, LoadOp, MemArg, MemoryType, Module, NumericOp, StoreOp, TableType,
    ValType,
};
use wasm_encoder::{
    CodeSection, CustomSection, DataSection, ElementSection, Elements, EntityType, ExportSection,
    FunctionSection, GlobalSection, ImportSection, MemorySection, RefType, StartSection,
    TableSection, TypeSection,
};

/// Encode the IR into a binary module.
pub fn encode_module(module: &Module) -> Vec<u8> {
    let mut out = wasm_encoder::Module::new();

    if !module.types.is_empty() {
        let mut types = TypeSection::new();
        for ty in &module.types {
            types.ty().function(
                ty.params.iter().map(|t| val_type(*t)),
                ty.results.iter().map(|t| val_type(*t)),
            );
        }
        out.section(&types);
    }

    if !module.imports.is_empty() {
        let mut imports = ImportSection::new();
        for import in &module.imports {
            let ty = match &import.kind {
                ImportKind::Function(ty) => EntityType::Function(*ty),
                ImportKind::Table(ty) => EntityType::Table(table_type(ty)),
                ImportKind::Memory(ty) => EntityType::Memory(memory_type(ty)),
                ImportKind::Global(ty) => EntityType::Global(global_type(ty)),
            };
            imports.import(&import.module, &import.name, ty);
        }
        out.section(&imports);
    }

    if !module.functions.is_empty() {
        let mut functions = FunctionSection::new();
        for f in &module.functions {
            functions.function(f.type_index);
        }
        out.section(&functions);
    }

    if !module.tables.is_empty() {
        let mut tables = TableSection::new();
        for table in &module.tables {
            tables.table(table_type(table));
        }
        out.section(&tables);
    }

    if !module.memories.is_empty() {
        let mut memories = MemorySection::new();
        for memory in &module.memories {
            memories.memory(memory_type(memory));
        }
        out.section(&memories);
    }

    if !module.globals.is_empty() {
        let mut globals = GlobalSection::new();
        for global in &module.globals {
            globals.global(global_type(&global.ty), &const_expr(&global.init));
        }
        out.section(&globals);
    }

    if !module.exports.is_empty() {
        let mut exports = ExportSection::new();
        for export in &module.exports {
            exports.export(&export.name, export_kind(export.kind), export.index);
        }
        out.section(&exports);
    }

    if let Some(function_index) = module.start {
        out.section(&StartSection { function_index });
    }

    if !module.elements.is_empty() {
        out.section(&element_section(&module.elements));
    }

    if !module.functions.is_empty() {
        let mut code = CodeSection::new();
        for f in &module.functions {
            code.function(&function(f));
        }
        out.section(&code);
    }

    if !module.data.is_empty() {
        out.section(&data_section(&module.data));
    }

    for custom in &module.customs {
        out.section(&CustomSection {
            name: Cow::Borrowed(custom.name.as_str()),
            data: Cow::Borrowed(custom.data.as_slice()),
        });
    }

    out.finish()
}

// ── Sections ─────────────────────────────────────────────────────────────────

fn element_section(segments: &[ElementSegment]) -> ElementSection {
    let mut elements = ElementSection::new();
    for seg in segments {
        // Table 0 uses the MVP encoding, without an explicit table index.
        let table = (seg.table_index != 0).then_some(seg.table_index);
        elements.active(
            table,
            &const_expr(&seg.offset),
            Elements::Functions(Cow::Borrowed(seg.functions.as_slice())),
        );
    }
    elements
}

fn data_section(segments: &[DataSegment]) -> DataSection {
    let mut data = DataSection::new();
    for seg in segments {
        data.active(
            seg.memory_index,
            &const_expr(&seg.offset),
            seg.bytes.iter().copied(),
        );
    }
    data
}

// ── Types ────────────────────────────────────────────────────────────────────

fn val_type(ty: ValType) -> wasm_encoder::ValType {
    match ty {
        ValType::I32 => wasm_encoder::ValType::I32,
        ValType::I64 => wasm_encoder::ValType::I64,
        ValType::F32 => wasm_encoder::ValType::F32,
        ValType::F64 => wasm_encoder::ValType::F64,
    }
}

fn table_type(ty: &TableType) -> wasm_encoder::TableType {
    wasm_encoder::TableType {
        element_type: RefType::FUNCREF,
        table64: false,
        minimum: ty.initial,
        maximum: ty.maximum,
        shared: false,
    }
}

fn memory_type(ty: &MemoryType) -> wasm_encoder::MemoryType {
    wasm_encoder::MemoryType {
        minimum: ty.initial,
        maximum: ty.maximum,
        memory64: false,
        shared: false,
        page_size_log2: None,
    }
}

fn global_type(ty: &GlobalType) -> wasm_encoder::GlobalType {
    wasm_encoder::GlobalType {
        val_type: val_type(ty.value_type),
        mutable: ty.mutable,
        shared: false,
    }
}

fn export_kind(kind: ExportKind) -> wasm_encoder::ExportKind {
    match kind {
        ExportKind::Function => wasm_encoder::ExportKind::Func,
        ExportKind::Table => wasm_encoder::ExportKind::Table,
        ExportKind::Memory => wasm_encoder::ExportKind::Memory,
        ExportKind::Global => wasm_encoder::ExportKind::Global,
    }
}

fn const_expr(expr: &ConstExpr) -> wasm_encoder::ConstExpr {
    match *expr {
        ConstExpr::I32(v) => wasm_encoder::ConstExpr::i32_const(v),
        ConstExpr::I64(v) => wasm_encoder::ConstExpr::i64_const(v),
        ConstExpr::F32(bits) => wasm_encoder::ConstExpr::f32_const(f32::from_bits(bits)),
        ConstExpr::F64(bits) => wasm_encoder::ConstExpr::f64_const(f64::from_bits(bits)),
        ConstExpr::GlobalGet(idx) => wasm_encoder::ConstExpr::global_get(idx),
    }
}

// ── Function bodies ──────────────────────────────────────────────────────────

fn function(f: &Function) -> wasm_encoder::Function {
    let mut out =
        wasm_encoder::Function::new(f.locals.iter().map(|(count, ty)| (*count, val_type(*ty))));
    for instr in &f.body {
        out.instruction(&instruction(instr));
    }
    out.instruction(&wasm_encoder::Instruction::End);
    out
}

fn block_type(ty: BlockType) -> wasm_encoder::BlockType {
    match ty {
        BlockType::Empty => wasm_encoder::BlockType::Empty,
        BlockType::Value(t) => wasm_encoder::BlockType::Result(val_type(t)),
        BlockType::Func(idx) => wasm_encoder::BlockType::FunctionType(idx),
    }
}

fn mem_arg(arg: &MemArg) -> wasm_encoder::MemArg {
    wasm_encoder::MemArg {
        offset: arg.offset,
        align: arg.align,
        memory_index: 0,
    }
}

macro_rules! encode_numeric {
    ($($op:ident => $name:literal, $class:ident;)*) => {
        fn numeric(op: NumericOp) -> wasm_encoder::Instruction<'static> {
            match op {
                $(NumericOp::$op => wasm_encoder::Instruction::$op,)*
            }
        }
    };
}

gasm_types::for_each_numeric_op!(encode_numeric);

fn load(op: LoadOp, arg: &MemArg) -> wasm_encoder::Instruction<'static> {
    use wasm_encoder::Instruction as I;
    let m = mem_arg(arg);
    match op {
        LoadOp::I32Load => I::I32Load(m),
        LoadOp::I64Load => I::I64Load(m),
        LoadOp::F32Load => I::F32Load(m),
        LoadOp::F64Load => I::F64Load(m),
        LoadOp::I32Load8S => I::I32Load8S(m),
        LoadOp::I32Load8U => I::I32Load8U(m),
        LoadOp::I32Load16S => I::I32Load16S(m),
        LoadOp::I32Load16U => I::I32Load16U(m),
        LoadOp::I64Load8S => I::I64Load8S(m),
        LoadOp::I64Load8U => I::I64Load8U(m),
        LoadOp::I64Load16S => I::I64Load16S(m),
        LoadOp::I64Load16U => I::I64Load16U(m),
        LoadOp::I64Load32S => I::I64Load32S(m),
        LoadOp::I64Load32U => I::I64Load32U(m),
    }
}

fn store(op: StoreOp, arg: &MemArg) -> wasm_encoder::Instruction<'static> {
    use wasm_encoder::Instruction as I;
    let m = mem_arg(arg);
    match op {
        StoreOp::I32Store => I::I32Store(m),
        StoreOp::I64Store => I::I64Store(m),
        StoreOp::F32Store => I::F32Store(m),
        StoreOp::F64Store => I::F64Store(m),
        StoreOp::I32Store8 => I::I32Store8(m),
        StoreOp::I32Store16 => I::I32Store16(m),
        StoreOp::I64Store8 => I::I64Store8(m),
        StoreOp::I64Store16 => I::I64Store16(m),
        StoreOp::I64Store32 => I::I64Store32(m),
    }
}

fn instruction(instr: &Instruction) -> wasm_encoder::Instruction<'_> {
    use wasm_encoder::Instruction as I;
    match instr {
        Instruction::Unreachable => I::Unreachable,
        Instruction::Nop => I::Nop,
        Instruction::Block(ty) => I::Block(block_type(*ty)),
        Instruction::Loop(ty) => I::Loop(block_type(*ty)),
        Instruction::If(ty) => I::If(block_type(*ty)),
        Instruction::Else => I::Else,
        Instruction::End => I::End,
        Instruction::Br(depth) => I::Br(*depth),
        Instruction::BrIf(depth) => I::BrIf(*depth),
        Instruction::BrTable { targets, default } => {
            I::BrTable(Cow::Borrowed(targets.as_slice()), *default)
        }
        Instruction::Return => I::Return,
        Instruction::Call(idx) => I::Call(*idx),
        Instruction::CallIndirect {
            type_index,
            table_index,
        } => I::CallIndirect {
            type_index: *type_index,
            table_index: *table_index,
        },
        Instruction::Drop => I::Drop,
        Instruction::Select => I::Select,
        Instruction::LocalGet(idx) => I::LocalGet(*idx),
        Instruction::LocalSet(idx) => I::LocalSet(*idx),
        Instruction::LocalTee(idx) => I::LocalTee(*idx),
        Instruction::GlobalGet(idx) => I::GlobalGet(*idx),
        Instruction::GlobalSet(idx) => I::GlobalSet(*idx),
        Instruction::Load(op, arg) => load(*op, arg),
        Instruction::Store(op, arg) => store(*op, arg),
        Instruction::MemorySize(mem) => I::MemorySize(*mem),
        Instruction::MemoryGrow(mem) => I::MemoryGrow(*mem),
        Instruction::I32Const(v) => I::I32Const(*v),
        Instruction::I64Const(v) => I::I64Const(*v),
        // `from_bits` is a bit-exact reinterpretation, NaN payloads included.
        Instruction::F32Const(bits) => I::F32Const(f32::from_bits(*bits)),
        Instruction::F64Const(bits) => I::F64Const(f64::from_bits(*bits)),
        Instruction::Numeric(op) => numeric(*op),
    }
}
