//! Memory-grow metering.
//!
//! `memory.grow` has a run-time operand, so its cost cannot be folded into
//! a static block charge. Each call site is redirected to a synthesized
//! `(i32) -> i32` helper that charges `pages * per_page` and then grows.
//! The product is taken in i64 so it cannot wrap; a charge that does not
//! fit in an i32 traps before any memory is granted:
//!
//! ```text
//! local.get 0
//! i64.extend_i32_u
//! i64.const per_page
//! i64.mul
//! local.tee 1
//! i64.const 0x7fff_ffff
//! i64.gt_u
//! if
//!   unreachable
//! end
//! local.get 1
//! i32.wrap_i64
//! call $gas
//! local.get 0
//! memory.grow 0
//! ```
//!
//! The helper itself is not metered; callers already paid the static
//! `memory.grow` price.

use gasm_types::{BlockType, Function, Instruction, Module, NumericOp, ValType};

use crate::error::{MeterError, MeterResult};
use crate::gas::MAX_CHARGE;

/// Whether any defined function grows memory.
pub fn uses_memory_grow(module: &Module) -> bool {
    module
        .functions
        .iter()
        .any(|f| f.body.iter().any(|i| matches!(i, Instruction::MemoryGrow(_))))
}

/// The grow charger, typed `(i32) -> i32` through `type_index`.
pub fn grow_counter(type_index: u32, per_page: u32, gas_function: u32) -> MeterResult<Function> {
    if per_page > MAX_CHARGE {
        return Err(MeterError::invalid(format!(
            "memory grow cost {per_page} per page does not fit in an i32"
        )));
    }
    // Local 1 holds the i64 charge.
    Ok(Function::new(
        type_index,
        vec![(1, ValType::I64)],
        vec![
            Instruction::LocalGet(0),
            Instruction::Numeric(NumericOp::I64ExtendI32U),
            Instruction::I64Const(i64::from(per_page)),
            Instruction::Numeric(NumericOp::I64Mul),
            Instruction::LocalTee(1),
            Instruction::I64Const(i64::from(MAX_CHARGE)),
            Instruction::Numeric(NumericOp::I64GtU),
            Instruction::If(BlockType::Empty),
            Instruction::Unreachable,
            Instruction::End,
            Instruction::LocalGet(1),
            Instruction::Numeric(NumericOp::I32WrapI64),
            Instruction::Call(gas_function),
            Instruction::LocalGet(0),
            Instruction::MemoryGrow(0),
        ],
    ))
}
