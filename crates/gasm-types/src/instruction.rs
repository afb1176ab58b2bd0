//! The closed instruction set understood by the metering pass.
//!
//! Covers the WebAssembly 1.0 instruction set plus the sign-extension
//! operators. Numeric operators are listed exactly once, in
//! [`for_each_numeric_op!`], so the IR enum and every binary adapter are
//! generated from the same table and stay exhaustive.

use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Value and block types
// ══════════════════════════════════════════════════════════════════════════════

/// A number type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// Signature of a `block`, `loop` or `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    /// Index into the type section (multi-value blocks).
    Func(u32),
}

/// Immediate of a load or store. `align` is the log2 exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub offset: u64,
    pub align: u32,
}

impl MemArg {
    pub fn new(offset: u64, align: u32) -> Self {
        Self { offset, align }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Instruction classes (cost-table keys)
// ══════════════════════════════════════════════════════════════════════════════

/// Coarse opcode class used as the primary key of a cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionClass {
    Bit,
    Add,
    Mul,
    Div,
    Load,
    Store,
    Const,
    Local,
    Global,
    ControlFlow,
    Call,
    IntegerComparison,
    FloatComparison,
    Float,
    Conversion,
    Reinterpretation,
    Unreachable,
    Nop,
    CurrentMemory,
    GrowMemory,
    Parametric,
}

impl InstructionClass {
    /// Every class, in declaration order.
    pub const ALL: [InstructionClass; 21] = [
        InstructionClass::Bit,
        InstructionClass::Add,
        InstructionClass::Mul,
        InstructionClass::Div,
        InstructionClass::Load,
        InstructionClass::Store,
        InstructionClass::Const,
        InstructionClass::Local,
        InstructionClass::Global,
        InstructionClass::ControlFlow,
        InstructionClass::Call,
        InstructionClass::IntegerComparison,
        InstructionClass::FloatComparison,
        InstructionClass::Float,
        InstructionClass::Conversion,
        InstructionClass::Reinterpretation,
        InstructionClass::Unreachable,
        InstructionClass::Nop,
        InstructionClass::CurrentMemory,
        InstructionClass::GrowMemory,
        InstructionClass::Parametric,
    ];
}

// ══════════════════════════════════════════════════════════════════════════════
// Numeric operators
// ══════════════════════════════════════════════════════════════════════════════

/// Invoke `$m!` with the full numeric operator table.
///
/// Each entry reads `Variant => "mnemonic", Class;`. Variant names match the
/// operator names used by `wasmparser` and `wasm-encoder`.
#[macro_export]
macro_rules! for_each_numeric_op {
    ($m:ident) => {
        $m! {
            I32Eqz => "i32.eqz", IntegerComparison;
            I32Eq => "i32.eq", IntegerComparison;
            I32Ne => "i32.ne", IntegerComparison;
            I32LtS => "i32.lt_s", IntegerComparison;
            I32LtU => "i32.lt_u", IntegerComparison;
            I32GtS => "i32.gt_s", IntegerComparison;
            I32GtU => "i32.gt_u", IntegerComparison;
            I32LeS => "i32.le_s", IntegerComparison;
            I32LeU => "i32.le_u", IntegerComparison;
            I32GeS => "i32.ge_s", IntegerComparison;
            I32GeU => "i32.ge_u", IntegerComparison;

            I64Eqz => "i64.eqz", IntegerComparison;
            I64Eq => "i64.eq", IntegerComparison;
            I64Ne => "i64.ne", IntegerComparison;
            I64LtS => "i64.lt_s", IntegerComparison;
            I64LtU => "i64.lt_u", IntegerComparison;
            I64GtS => "i64.gt_s", IntegerComparison;
            I64GtU => "i64.gt_u", IntegerComparison;
            I64LeS => "i64.le_s", IntegerComparison;
            I64LeU => "i64.le_u", IntegerComparison;
            I64GeS => "i64.ge_s", IntegerComparison;
            I64GeU => "i64.ge_u", IntegerComparison;

            F32Eq => "f32.eq", FloatComparison;
            F32Ne => "f32.ne", FloatComparison;
            F32Lt => "f32.lt", FloatComparison;
            F32Gt => "f32.gt", FloatComparison;
            F32Le => "f32.le", FloatComparison;
            F32Ge => "f32.ge", FloatComparison;

            F64Eq => "f64.eq", FloatComparison;
            F64Ne => "f64.ne", FloatComparison;
            F64Lt => "f64.lt", FloatComparison;
            F64Gt => "f64.gt", FloatComparison;
            F64Le => "f64.le", FloatComparison;
            F64Ge => "f64.ge", FloatComparison;

            I32Clz => "i32.clz", Bit;
            I32Ctz => "i32.ctz", Bit;
            I32Popcnt => "i32.popcnt", Bit;
            I32Add => "i32.add", Add;
            I32Sub => "i32.sub", Add;
            I32Mul => "i32.mul", Mul;
            I32DivS => "i32.div_s", Div;
            I32DivU => "i32.div_u", Div;
            I32RemS => "i32.rem_s", Div;
            I32RemU => "i32.rem_u", Div;
            I32And => "i32.and", Bit;
            I32Or => "i32.or", Bit;
            I32Xor => "i32.xor", Bit;
            I32Shl => "i32.shl", Bit;
            I32ShrS => "i32.shr_s", Bit;
            I32ShrU => "i32.shr_u", Bit;
            I32Rotl => "i32.rotl", Bit;
            I32Rotr => "i32.rotr", Bit;

            I64Clz => "i64.clz", Bit;
            I64Ctz => "i64.ctz", Bit;
            I64Popcnt => "i64.popcnt", Bit;
            I64Add => "i64.add", Add;
            I64Sub => "i64.sub", Add;
            I64Mul => "i64.mul", Mul;
            I64DivS => "i64.div_s", Div;
            I64DivU => "i64.div_u", Div;
            I64RemS => "i64.rem_s", Div;
            I64RemU => "i64.rem_u", Div;
            I64And => "i64.and", Bit;
            I64Or => "i64.or", Bit;
            I64Xor => "i64.xor", Bit;
            I64Shl => "i64.shl", Bit;
            I64ShrS => "i64.shr_s", Bit;
            I64ShrU => "i64.shr_u", Bit;
            I64Rotl => "i64.rotl", Bit;
            I64Rotr => "i64.rotr", Bit;

            F32Abs => "f32.abs", Float;
            F32Neg => "f32.neg", Float;
            F32Ceil => "f32.ceil", Float;
            F32Floor => "f32.floor", Float;
            F32Trunc => "f32.trunc", Float;
            F32Nearest => "f32.nearest", Float;
            F32Sqrt => "f32.sqrt", Float;
            F32Add => "f32.add", Float;
            F32Sub => "f32.sub", Float;
            F32Mul => "f32.mul", Float;
            F32Div => "f32.div", Float;
            F32Min => "f32.min", Float;
            F32Max => "f32.max", Float;
            F32Copysign => "f32.copysign", Float;

            F64Abs => "f64.abs", Float;
            F64Neg => "f64.neg", Float;
            F64Ceil => "f64.ceil", Float;
            F64Floor => "f64.floor", Float;
            F64Trunc => "f64.trunc", Float;
            F64Nearest => "f64.nearest", Float;
            F64Sqrt => "f64.sqrt", Float;
            F64Add => "f64.add", Float;
            F64Sub => "f64.sub", Float;
            F64Mul => "f64.mul", Float;
            F64Div => "f64.div", Float;
            F64Min => "f64.min", Float;
            F64Max => "f64.max", Float;
            F64Copysign => "f64.copysign", Float;

            I32WrapI64 => "i32.wrap_i64", Conversion;
            I32TruncF32S => "i32.trunc_f32_s", Conversion;
            I32TruncF32U => "i32.trunc_f32_u", Conversion;
            I32TruncF64S => "i32.trunc_f64_s", Conversion;
            I32TruncF64U => "i32.trunc_f64_u", Conversion;
            I64ExtendI32S => "i64.extend_i32_s", Conversion;
            I64ExtendI32U => "i64.extend_i32_u", Conversion;
            I64TruncF32S => "i64.trunc_f32_s", Conversion;
            I64TruncF32U => "i64.trunc_f32_u", Conversion;
            I64TruncF64S => "i64.trunc_f64_s", Conversion;
            I64TruncF64U => "i64.trunc_f64_u", Conversion;
            F32ConvertI32S => "f32.convert_i32_s", Conversion;
            F32ConvertI32U => "f32.convert_i32_u", Conversion;
            F32ConvertI64S => "f32.convert_i64_s", Conversion;
            F32ConvertI64U => "f32.convert_i64_u", Conversion;
            F32DemoteF64 => "f32.demote_f64", Conversion;
            F64ConvertI32S => "f64.convert_i32_s", Conversion;
            F64ConvertI32U => "f64.convert_i32_u", Conversion;
            F64ConvertI64S => "f64.convert_i64_s", Conversion;
            F64ConvertI64U => "f64.convert_i64_u", Conversion;
            F64PromoteF32 => "f64.promote_f32", Conversion;

            I32ReinterpretF32 => "i32.reinterpret_f32", Reinterpretation;
            I64ReinterpretF64 => "i64.reinterpret_f64", Reinterpretation;
            F32ReinterpretI32 => "f32.reinterpret_i32", Reinterpretation;
            F64ReinterpretI64 => "f64.reinterpret_i64", Reinterpretation;

            I32Extend8S => "i32.extend8_s", Conversion;
            I32Extend16S => "i32.extend16_s", Conversion;
            I64Extend8S => "i64.extend8_s", Conversion;
            I64Extend16S => "i64.extend16_s", Conversion;
            I64Extend32S => "i64.extend32_s", Conversion;
        }
    };
}

macro_rules! define_numeric_ops {
    ($($op:ident => $name:literal, $class:ident;)*) => {
        /// A numeric (arithmetic, comparison or conversion) operator.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NumericOp {
            $($op,)*
        }

        impl NumericOp {
            /// Text-format name, e.g. `i32.add`.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(NumericOp::$op => $name,)*
                }
            }

            pub fn class(self) -> InstructionClass {
                match self {
                    $(NumericOp::$op => InstructionClass::$class,)*
                }
            }
        }
    };
}

for_each_numeric_op!(define_numeric_ops);

impl NumericOp {
    /// Whether the operator consumes or produces a float.
    pub fn touches_floats(self) -> bool {
        let name = self.mnemonic();
        name.starts_with('f') || name.contains("_f")
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Memory operators
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

impl LoadOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            LoadOp::I32Load => "i32.load",
            LoadOp::I64Load => "i64.load",
            LoadOp::F32Load => "f32.load",
            LoadOp::F64Load => "f64.load",
            LoadOp::I32Load8S => "i32.load8_s",
            LoadOp::I32Load8U => "i32.load8_u",
            LoadOp::I32Load16S => "i32.load16_s",
            LoadOp::I32Load16U => "i32.load16_u",
            LoadOp::I64Load8S => "i64.load8_s",
            LoadOp::I64Load8U => "i64.load8_u",
            LoadOp::I64Load16S => "i64.load16_s",
            LoadOp::I64Load16U => "i64.load16_u",
            LoadOp::I64Load32S => "i64.load32_s",
            LoadOp::I64Load32U => "i64.load32_u",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

impl StoreOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            StoreOp::I32Store => "i32.store",
            StoreOp::I64Store => "i64.store",
            StoreOp::F32Store => "f32.store",
            StoreOp::F64Store => "f64.store",
            StoreOp::I32Store8 => "i32.store8",
            StoreOp::I32Store16 => "i32.store16",
            StoreOp::I64Store8 => "i64.store8",
            StoreOp::I64Store16 => "i64.store16",
            StoreOp::I64Store32 => "i64.store32",
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Instruction
// ══════════════════════════════════════════════════════════════════════════════

/// A single instruction of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // ── Control ──────────────────────────────────────────────────────────
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_index: u32, table_index: u32 },

    // ── Parametric ───────────────────────────────────────────────────────
    Drop,
    Select,

    // ── Variables ────────────────────────────────────────────────────────
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // ── Memory ───────────────────────────────────────────────────────────
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize(u32),
    MemoryGrow(u32),

    // ── Constants (float constants carry raw IEEE-754 bits) ──────────────
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),

    // ── Numeric ──────────────────────────────────────────────────────────
    Numeric(NumericOp),
}

impl Instruction {
    /// Text-format name of the opcode, e.g. `br_if` or `i64.load8_u`.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Unreachable => "unreachable",
            Instruction::Nop => "nop",
            Instruction::Block(_) => "block",
            Instruction::Loop(_) => "loop",
            Instruction::If(_) => "if",
            Instruction::Else => "else",
            Instruction::End => "end",
            Instruction::Br(_) => "br",
            Instruction::BrIf(_) => "br_if",
            Instruction::BrTable { .. } => "br_table",
            Instruction::Return => "return",
            Instruction::Call(_) => "call",
            Instruction::CallIndirect { .. } => "call_indirect",
            Instruction::Drop => "drop",
            Instruction::Select => "select",
            Instruction::LocalGet(_) => "local.get",
            Instruction::LocalSet(_) => "local.set",
            Instruction::LocalTee(_) => "local.tee",
            Instruction::GlobalGet(_) => "global.get",
            Instruction::GlobalSet(_) => "global.set",
            Instruction::Load(op, _) => op.mnemonic(),
            Instruction::Store(op, _) => op.mnemonic(),
            Instruction::MemorySize(_) => "memory.size",
            Instruction::MemoryGrow(_) => "memory.grow",
            Instruction::I32Const(_) => "i32.const",
            Instruction::I64Const(_) => "i64.const",
            Instruction::F32Const(_) => "f32.const",
            Instruction::F64Const(_) => "f64.const",
            Instruction::Numeric(op) => op.mnemonic(),
        }
    }

    /// The cost-table class of this instruction.
    pub fn class(&self) -> InstructionClass {
        match self {
            Instruction::Unreachable => InstructionClass::Unreachable,
            Instruction::Nop => InstructionClass::Nop,
            Instruction::Block(_)
            | Instruction::Loop(_)
            | Instruction::If(_)
            | Instruction::Else
            | Instruction::End
            | Instruction::Br(_)
            | Instruction::BrIf(_)
            | Instruction::BrTable { .. }
            | Instruction::Return => InstructionClass::ControlFlow,
            Instruction::Call(_) | Instruction::CallIndirect { .. } => InstructionClass::Call,
            Instruction::Drop | Instruction::Select => InstructionClass::Parametric,
            Instruction::LocalGet(_) | Instruction::LocalSet(_) | Instruction::LocalTee(_) => {
                InstructionClass::Local
            }
            Instruction::GlobalGet(_) | Instruction::GlobalSet(_) => InstructionClass::Global,
            Instruction::Load(..) => InstructionClass::Load,
            Instruction::Store(..) => InstructionClass::Store,
            Instruction::MemorySize(_) => InstructionClass::CurrentMemory,
            Instruction::MemoryGrow(_) => InstructionClass::GrowMemory,
            Instruction::I32Const(_)
            | Instruction::I64Const(_)
            | Instruction::F32Const(_)
            | Instruction::F64Const(_) => InstructionClass::Const,
            Instruction::Numeric(op) => op.class(),
        }
    }

    /// Whether the instruction consumes or produces a float value.
    pub fn touches_floats(&self) -> bool {
        match self {
            Instruction::F32Const(_) | Instruction::F64Const(_) => true,
            Instruction::Load(op, _) => matches!(op, LoadOp::F32Load | LoadOp::F64Load),
            Instruction::Store(op, _) => matches!(op, StoreOp::F32Store | StoreOp::F64Store),
            Instruction::Numeric(op) => op.touches_floats(),
            _ => false,
        }
    }

    /// `block`, `loop` and `if` open a nested region.
    pub fn opens_region(&self) -> bool {
        matches!(
            self,
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_)
        )
    }

    /// `else` and `end` are structural markers with no runtime effect.
    pub fn is_structural_marker(&self) -> bool {
        matches!(self, Instruction::Else | Instruction::End)
    }

    /// Instructions after which control does not simply fall through to
    /// the next instruction in the same region.
    pub fn transfers_control(&self) -> bool {
        matches!(
            self,
            Instruction::Br(_)
                | Instruction::BrIf(_)
                | Instruction::BrTable { .. }
                | Instruction::Return
                | Instruction::Unreachable
                | Instruction::Call(_)
                | Instruction::CallIndirect { .. }
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match self {
            Instruction::Br(d) | Instruction::BrIf(d) => write!(f, "{name} {d}"),
            Instruction::BrTable { targets, default } => {
                write!(f, "{name}")?;
                for t in targets {
                    write!(f, " {t}")?;
                }
                write!(f, " {default}")
            }
            Instruction::Call(i)
            | Instruction::LocalGet(i)
            | Instruction::LocalSet(i)
            | Instruction::LocalTee(i)
            | Instruction::GlobalGet(i)
            | Instruction::GlobalSet(i) => write!(f, "{name} {i}"),
            Instruction::CallIndirect { type_index, .. } => {
                write!(f, "{name} (type {type_index})")
            }
            Instruction::Load(_, m) | Instruction::Store(_, m) if m.offset != 0 => {
                write!(f, "{name} offset={}", m.offset)
            }
            Instruction::I32Const(v) => write!(f, "{name} {v}"),
            Instruction::I64Const(v) => write!(f, "{name} {v}"),
            Instruction::F32Const(bits) => write!(f, "{name} {}", f32::from_bits(*bits)),
            Instruction::F64Const(bits) => write!(f, "{name} {}", f64::from_bits(*bits)),
            _ => write!(f, "{name}"),
        }
    }
}
