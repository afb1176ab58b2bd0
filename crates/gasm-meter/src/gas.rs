//! Gas accumulation.
//!
//! Sums cost-table prices over each basic block into one static charge,
//! and builds the two-instruction charge sequence:
//! ```text
//! i32.const <charge>
//! call $gas
//! ```

use gasm_types::{Instruction, Location};

use crate::blocks::BasicBlock;
use crate::cost::CostTable;
use crate::error::{MeterError, MeterResult};

/// Largest charge the `i32` operand of the gas import can carry.
pub const MAX_CHARGE: u32 = i32::MAX as u32;

/// Static charge of one block: the sum of the costs of all of its
/// instructions, terminator included.
pub fn block_charge(
    function: u32,
    body: &[Instruction],
    block: &BasicBlock,
    table: &CostTable,
) -> MeterResult<u32> {
    let mut total: u64 = 0;
    for (offset, instr) in body.iter().enumerate().take(block.end).skip(block.start) {
        let cost = table
            .cost(instr)
            .ok_or_else(|| MeterError::UnsupportedOpcode {
                location: Location::new(function, offset),
                opcode: instr.mnemonic().to_string(),
            })?;
        total += u64::from(cost);
    }

    if total > u64::from(MAX_CHARGE) {
        return Err(MeterError::invalid_at(
            Location::new(function, block.start),
            format!("block charge {total} does not fit in an i32 gas operand"),
        ));
    }
    Ok(total as u32)
}

/// Charges for every block, in block order.
pub fn accumulate(
    function: u32,
    body: &[Instruction],
    blocks: &[BasicBlock],
    table: &CostTable,
) -> MeterResult<Vec<u32>> {
    blocks
        .iter()
        .map(|block| block_charge(function, body, block, table))
        .collect()
}

/// The charge pair placed in front of a block.
pub fn charge_instructions(charge: u32, gas_function: u32) -> [Instruction; 2] {
    [
        Instruction::I32Const(charge as i32),
        Instruction::Call(gas_function),
    ]
}
