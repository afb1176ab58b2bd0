//! Binary decoding: WebAssembly bytes → module IR.
//!
//! A thin adapter over `wasmparser`. Only WebAssembly 1.0 plus the
//! sign-extension operators is accepted; anything the IR cannot represent
//! is reported instead of silently dropped, so re-encoding never loses a
//! section.

use gasm_types::{
    BlockType, ConstExpr, CustomSection, DataSegment, ElementSegment, Export, ExportKind,
    FuncType, Function, Global, GlobalType, Import, ImportKind, Instruction, LoadOp, Location,
    MemArg, MemoryType, Module, NumericOp, StoreOp, TableType, ValType,
};
use log::debug;
use wasmparser::{
    DataKind, ElementItems, ElementKind, Encoding, ExternalKind, FunctionBody, Operator, Parser,
    Payload, RefType, TableInit, TypeRef,
};

use crate::error::{PipelineError, PipelineResult};

/// Decode a binary module into the IR.
pub fn decode_module(bytes: &[u8]) -> PipelineResult<Module> {
    let mut module = Module::new();
    let mut declared: Vec<u32> = Vec::new();
    let mut next_body = 0usize;

    for payload in Parser::new(0).parse_all(bytes) {
        match payload? {
            Payload::Version { encoding, .. } => {
                if encoding != Encoding::Module {
                    return Err(unsupported("component binaries"));
                }
            }
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    let ty = ty?;
                    module.types.push(FuncType::new(
                        val_types(ty.params())?,
                        val_types(ty.results())?,
                    ));
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    let kind = match import.ty {
                        TypeRef::Func(ty) => ImportKind::Function(ty),
                        TypeRef::Table(ty) => ImportKind::Table(table_type(&ty)?),
                        TypeRef::Memory(ty) => ImportKind::Memory(memory_type(&ty)?),
                        TypeRef::Global(ty) => ImportKind::Global(global_type(&ty)?),
                        _ => return Err(unsupported("tag imports")),
                    };
                    module.imports.push(Import::new(import.module, import.name, kind));
                }
            }
            Payload::FunctionSection(reader) => {
                for ty in reader {
                    declared.push(ty?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    let table = table?;
                    if !matches!(table.init, TableInit::RefNull) {
                        return Err(unsupported("table initializer expressions"));
                    }
                    module.tables.push(table_type(&table.ty)?);
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    module.memories.push(memory_type(&memory?)?);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    module.globals.push(Global {
                        ty: global_type(&global.ty)?,
                        init: const_expr(&global.init_expr)?,
                    });
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExportKind::Function,
                        ExternalKind::Table => ExportKind::Table,
                        ExternalKind::Memory => ExportKind::Memory,
                        ExternalKind::Global => ExportKind::Global,
                        _ => return Err(unsupported("tag exports")),
                    };
                    module.exports.push(Export::new(export.name, kind, export.index));
                }
            }
            Payload::StartSection { func, .. } => module.start = Some(func),
            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element?;
                    let (table_index, offset) = match element.kind {
                        ElementKind::Active {
                            table_index,
                            offset_expr,
                        } => (table_index.unwrap_or(0), const_expr(&offset_expr)?),
                        _ => return Err(unsupported("passive or declared element segments")),
                    };
                    let functions = match element.items {
                        ElementItems::Functions(items) => {
                            items.into_iter().collect::<Result<Vec<u32>, _>>()?
                        }
                        ElementItems::Expressions(..) => {
                            return Err(unsupported("element expressions"))
                        }
                    };
                    module.elements.push(ElementSegment {
                        table_index,
                        offset,
                        functions,
                    });
                }
            }
            Payload::DataCountSection { .. } => {}
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data?;
                    let (memory_index, offset) = match data.kind {
                        DataKind::Active {
                            memory_index,
                            offset_expr,
                        } => (memory_index, const_expr(&offset_expr)?),
                        DataKind::Passive => return Err(unsupported("passive data segments")),
                    };
                    module.data.push(DataSegment {
                        memory_index,
                        offset,
                        bytes: data.data.to_vec(),
                    });
                }
            }
            Payload::CodeSectionStart { .. } => {}
            Payload::CodeSectionEntry(body) => {
                let type_index = declared.get(next_body).copied().ok_or_else(|| {
                    PipelineError::InputValidation(
                        "code section has more bodies than declared functions".into(),
                    )
                })?;
                let index = module.imported_function_count() + next_body as u32;
                module.functions.push(function(index, type_index, &body)?);
                next_body += 1;
            }
            Payload::CustomSection(reader) => {
                module.customs.push(CustomSection {
                    name: reader.name().to_string(),
                    data: reader.data().to_vec(),
                });
            }
            Payload::End(_) => {}
            _ => return Err(unsupported("sections outside WebAssembly 1.0")),
        }
    }

    if next_body != declared.len() {
        return Err(PipelineError::InputValidation(format!(
            "{} functions declared but {next_body} bodies present",
            declared.len()
        )));
    }

    debug!(
        "decoded module: {} types, {} imports, {} functions",
        module.types.len(),
        module.imports.len(),
        module.functions.len()
    );
    Ok(module)
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

fn unsupported(what: &str) -> PipelineError {
    PipelineError::UnsupportedFeature(what.to_string())
}

fn val_type(ty: wasmparser::ValType) -> PipelineResult<ValType> {
    match ty {
        wasmparser::ValType::I32 => Ok(ValType::I32),
        wasmparser::ValType::I64 => Ok(ValType::I64),
        wasmparser::ValType::F32 => Ok(ValType::F32),
        wasmparser::ValType::F64 => Ok(ValType::F64),
        wasmparser::ValType::V128 => Err(unsupported("v128 values")),
        wasmparser::ValType::Ref(_) => Err(unsupported("reference-typed values")),
    }
}

fn val_types(types: &[wasmparser::ValType]) -> PipelineResult<Vec<ValType>> {
    types.iter().map(|t| val_type(*t)).collect()
}

fn table_type(ty: &wasmparser::TableType) -> PipelineResult<TableType> {
    if ty.element_type != RefType::FUNCREF || ty.table64 || ty.shared {
        return Err(unsupported("tables other than 32-bit funcref"));
    }
    Ok(TableType {
        initial: ty.initial,
        maximum: ty.maximum,
    })
}

fn memory_type(ty: &wasmparser::MemoryType) -> PipelineResult<MemoryType> {
    if ty.memory64 || ty.shared || ty.page_size_log2.is_some() {
        return Err(unsupported("memories other than unshared 32-bit"));
    }
    Ok(MemoryType {
        initial: ty.initial,
        maximum: ty.maximum,
    })
}

fn global_type(ty: &wasmparser::GlobalType) -> PipelineResult<GlobalType> {
    if ty.shared {
        return Err(unsupported("shared globals"));
    }
    Ok(GlobalType {
        value_type: val_type(ty.content_type)?,
        mutable: ty.mutable,
    })
}

fn const_expr(expr: &wasmparser::ConstExpr<'_>) -> PipelineResult<ConstExpr> {
    let mut reader = expr.get_operators_reader();
    let value = match reader.read()? {
        Operator::I32Const { value } => ConstExpr::I32(value),
        Operator::I64Const { value } => ConstExpr::I64(value),
        Operator::F32Const { value } => ConstExpr::F32(value.bits()),
        Operator::F64Const { value } => ConstExpr::F64(value.bits()),
        Operator::GlobalGet { global_index } => ConstExpr::GlobalGet(global_index),
        _ => return Err(unsupported("extended constant expressions")),
    };
    match reader.read()? {
        Operator::End => Ok(value),
        _ => Err(unsupported("extended constant expressions")),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Function bodies
// ══════════════════════════════════════════════════════════════════════════════

fn function(index: u32, type_index: u32, body: &FunctionBody<'_>) -> PipelineResult<Function> {
    let mut locals = Vec::new();
    for local in body.get_locals_reader()? {
        let (count, ty) = local?;
        locals.push((count, val_type(ty)?));
    }

    let mut reader = body.get_operators_reader()?;
    let mut instructions = Vec::new();
    while !reader.eof() {
        let op = reader.read()?;
        let location = Location::new(index, instructions.len());
        instructions.push(instruction(location, &op)?);
    }

    // The final `end` closes the function itself and is not part of the body.
    if instructions.pop() != Some(Instruction::End) {
        return Err(PipelineError::InputValidation(format!(
            "function {index} does not end with `end`"
        )));
    }
    Ok(Function::new(type_index, locals, instructions))
}

fn block_type(ty: wasmparser::BlockType) -> PipelineResult<BlockType> {
    Ok(match ty {
        wasmparser::BlockType::Empty => BlockType::Empty,
        wasmparser::BlockType::Type(t) => BlockType::Value(val_type(t)?),
        wasmparser::BlockType::FuncType(idx) => BlockType::Func(idx),
    })
}

fn mem_arg(arg: &wasmparser::MemArg) -> PipelineResult<MemArg> {
    if arg.memory != 0 {
        return Err(unsupported("multiple memories"));
    }
    Ok(MemArg::new(arg.offset, u32::from(arg.align)))
}

fn memory_index(mem: u32) -> PipelineResult<u32> {
    if mem != 0 {
        return Err(unsupported("multiple memories"));
    }
    Ok(mem)
}

macro_rules! decode_numeric {
    ($($op:ident => $name:literal, $class:ident;)*) => {
        fn numeric(op: &Operator<'_>) -> Option<NumericOp> {
            match op {
                $(Operator::$op => Some(NumericOp::$op),)*
                _ => None,
            }
        }
    };
}

gasm_types::for_each_numeric_op!(decode_numeric);

fn load(op: LoadOp, arg: &wasmparser::MemArg) -> PipelineResult<Instruction> {
    Ok(Instruction::Load(op, mem_arg(arg)?))
}

fn store(op: StoreOp, arg: &wasmparser::MemArg) -> PipelineResult<Instruction> {
    Ok(Instruction::Store(op, mem_arg(arg)?))
}

fn instruction(location: Location, op: &Operator<'_>) -> PipelineResult<Instruction> {
    if let Some(op) = numeric(op) {
        return Ok(Instruction::Numeric(op));
    }
    Ok(match op {
        Operator::Unreachable => Instruction::Unreachable,
        Operator::Nop => Instruction::Nop,
        Operator::Block { blockty } => Instruction::Block(block_type(*blockty)?),
        Operator::Loop { blockty } => Instruction::Loop(block_type(*blockty)?),
        Operator::If { blockty } => Instruction::If(block_type(*blockty)?),
        Operator::Else => Instruction::Else,
        Operator::End => Instruction::End,
        Operator::Br { relative_depth } => Instruction::Br(*relative_depth),
        Operator::BrIf { relative_depth } => Instruction::BrIf(*relative_depth),
        Operator::BrTable { targets } => Instruction::BrTable {
            targets: targets.targets().collect::<Result<Vec<u32>, _>>()?,
            default: targets.default(),
        },
        Operator::Return => Instruction::Return,
        Operator::Call { function_index } => Instruction::Call(*function_index),
        Operator::CallIndirect {
            type_index,
            table_index,
        } => Instruction::CallIndirect {
            type_index: *type_index,
            table_index: *table_index,
        },

        Operator::Drop => Instruction::Drop,
        Operator::Select => Instruction::Select,

        Operator::LocalGet { local_index } => Instruction::LocalGet(*local_index),
        Operator::LocalSet { local_index } => Instruction::LocalSet(*local_index),
        Operator::LocalTee { local_index } => Instruction::LocalTee(*local_index),
        Operator::GlobalGet { global_index } => Instruction::GlobalGet(*global_index),
        Operator::GlobalSet { global_index } => Instruction::GlobalSet(*global_index),

        Operator::I32Load { memarg } => load(LoadOp::I32Load, memarg)?,
        Operator::I64Load { memarg } => load(LoadOp::I64Load, memarg)?,
        Operator::F32Load { memarg } => load(LoadOp::F32Load, memarg)?,
        Operator::F64Load { memarg } => load(LoadOp::F64Load, memarg)?,
        Operator::I32Load8S { memarg } => load(LoadOp::I32Load8S, memarg)?,
        Operator::I32Load8U { memarg } => load(LoadOp::I32Load8U, memarg)?,
        Operator::I32Load16S { memarg } => load(LoadOp::I32Load16S, memarg)?,
        Operator::I32Load16U { memarg } => load(LoadOp::I32Load16U, memarg)?,
        Operator::I64Load8S { memarg } => load(LoadOp::I64Load8S, memarg)?,
        Operator::I64Load8U { memarg } => load(LoadOp::I64Load8U, memarg)?,
        Operator::I64Load16S { memarg } => load(LoadOp::I64Load16S, memarg)?,
        Operator::I64Load16U { memarg } => load(LoadOp::I64Load16U, memarg)?,
        Operator::I64Load32S { memarg } => load(LoadOp::I64Load32S, memarg)?,
        Operator::I64Load32U { memarg } => load(LoadOp::I64Load32U, memarg)?,

        Operator::I32Store { memarg } => store(StoreOp::I32Store, memarg)?,
        Operator::I64Store { memarg } => store(StoreOp::I64Store, memarg)?,
        Operator::F32Store { memarg } => store(StoreOp::F32Store, memarg)?,
        Operator::F64Store { memarg } => store(StoreOp::F64Store, memarg)?,
        Operator::I32Store8 { memarg } => store(StoreOp::I32Store8, memarg)?,
        Operator::I32Store16 { memarg } => store(StoreOp::I32Store16, memarg)?,
        Operator::I64Store8 { memarg } => store(StoreOp::I64Store8, memarg)?,
        Operator::I64Store16 { memarg } => store(StoreOp::I64Store16, memarg)?,
        Operator::I64Store32 { memarg } => store(StoreOp::I64Store32, memarg)?,

        Operator::MemorySize { mem } => Instruction::MemorySize(memory_index(*mem)?),
        Operator::MemoryGrow { mem } => Instruction::MemoryGrow(memory_index(*mem)?),

        Operator::I32Const { value } => Instruction::I32Const(*value),
        Operator::I64Const { value } => Instruction::I64Const(*value),
        Operator::F32Const { value } => Instruction::F32Const(value.bits()),
        Operator::F64Const { value } => Instruction::F64Const(value.bits()),

        other => {
            return Err(PipelineError::UnsupportedOperator {
                location,
                operator: operator_name(other),
            })
        }
    })
}

/// Variant name of an operator, e.g. `MemoryCopy`.
fn operator_name(op: &Operator<'_>) -> String {
    let debug = format!("{op:?}");
    debug
        .split(|c: char| c == ' ' || c == '{' || c == '(')
        .next()
        .unwrap_or_default()
        .to_string()
}
