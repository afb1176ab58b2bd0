//! Control-flow block extraction.
//!
//! Partitions a function body into basic blocks with one linear scan over
//! an explicit control stack, so nesting depth never turns into native
//! recursion.
//!
//! A block closes, inclusively, at every instruction after which control
//! may leave the straight line: the region openers `block`/`loop`/`if`
//! (charged to the enclosing region), the markers `else`/`end`, branches,
//! `return`, `unreachable` and both call forms. A control transfer that is
//! directly followed by `else` or `end` takes that marker into the same
//! block, so no charge is ever placed in dead code.

use gasm_types::{Instruction, Location};

use crate::error::{MeterError, MeterResult};

/// A contiguous, non-empty run of instructions entered only at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlock {
    /// Offset of the first instruction.
    pub start: usize,
    /// Offset one past the last instruction.
    pub end: usize,
    /// Nesting depth at `start`; 0 is the function body itself.
    pub depth: u32,
}

impl BasicBlock {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn instructions<'a>(&self, body: &'a [Instruction]) -> &'a [Instruction] {
        &body[self.start..self.end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Function,
    Block,
    Loop,
    If,
    Else,
}

/// Split `body` into basic blocks covering it exactly once, in order.
///
/// `function` is the absolute function index, used for error locations.
pub fn extract_blocks(function: u32, body: &[Instruction]) -> MeterResult<Vec<BasicBlock>> {
    let mut stack = vec![Frame::Function];
    let mut blocks = Vec::new();
    let mut start = 0usize;
    let mut start_depth = 0u32;

    for (offset, instr) in body.iter().enumerate() {
        let at = Location::new(function, offset);
        check_branch_targets(at, instr, stack.len())?;

        match instr {
            Instruction::Block(_) => stack.push(Frame::Block),
            Instruction::Loop(_) => stack.push(Frame::Loop),
            Instruction::If(_) => stack.push(Frame::If),
            Instruction::Else => match stack.last_mut() {
                Some(top) if *top == Frame::If => *top = Frame::Else,
                _ => return Err(MeterError::malformed(at, "`else` without a matching `if`")),
            },
            Instruction::End => {
                if stack.len() <= 1 {
                    return Err(MeterError::malformed(
                        at,
                        "`end` without an open block; nesting depth went negative",
                    ));
                }
                stack.pop();
            }
            _ => {}
        }

        if closes_block(instr, body.get(offset + 1)) {
            blocks.push(BasicBlock {
                start,
                end: offset + 1,
                depth: start_depth,
            });
            start = offset + 1;
            start_depth = depth_of(&stack);
        }
    }

    if start < body.len() {
        blocks.push(BasicBlock {
            start,
            end: body.len(),
            depth: start_depth,
        });
    }

    if stack.len() > 1 {
        let open = match stack.last() {
            Some(Frame::Loop) => "loop",
            Some(Frame::If) | Some(Frame::Else) => "if",
            _ => "block",
        };
        return Err(MeterError::malformed(
            Location::new(function, body.len()),
            format!("{} unterminated `{open}` at end of body", stack.len() - 1),
        ));
    }

    Ok(blocks)
}

fn depth_of(stack: &[Frame]) -> u32 {
    (stack.len() - 1) as u32
}

fn closes_block(instr: &Instruction, next: Option<&Instruction>) -> bool {
    if instr.opens_region() || instr.is_structural_marker() {
        return true;
    }
    if instr.transfers_control() {
        return !next.is_some_and(Instruction::is_structural_marker);
    }
    false
}

/// Every branch depth must name a label on the control stack. `labels`
/// counts the function label.
fn check_branch_targets(at: Location, instr: &Instruction, labels: usize) -> MeterResult<()> {
    let check = |depth: u32| {
        if (depth as usize) < labels {
            Ok(())
        } else {
            Err(MeterError::malformed(
                at,
                format!("branch depth {depth} exceeds the {labels} enclosing labels"),
            ))
        }
    };
    match instr {
        Instruction::Br(d) | Instruction::BrIf(d) => check(*d),
        Instruction::BrTable { targets, default } => {
            targets.iter().try_for_each(|d| check(*d))?;
            check(*default)
        }
        _ => Ok(()),
    }
}
