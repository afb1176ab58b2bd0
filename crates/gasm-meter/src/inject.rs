//! Instruction injection.
//!
//! Rewrites one function body so every basic block with a non-zero charge
//! starts with its charge pair. The pair is placed strictly inside the
//! block it pays for, so branch depths and the operand stack are
//! untouched. When memory-grow metering is on, `memory.grow` is redirected
//! to the synthesized grow charger.

use gasm_types::{Function, Instruction};
use log::trace;

use crate::blocks::extract_blocks;
use crate::cost::CostTable;
use crate::error::MeterResult;
use crate::gas::{accumulate, charge_instructions};

/// Per-function outcome of the injector.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteredFunction {
    pub function: Function,
    /// Basic blocks found in the original body.
    pub blocks: usize,
    /// Charge pairs actually injected (zero-charge blocks get none).
    pub charges: usize,
    /// Sum of all static charges.
    pub static_cost: u64,
}

/// Rewrites bodies against one cost table and gas function.
#[derive(Debug, Clone, Copy)]
pub struct Injector<'a> {
    table: &'a CostTable,
    gas_function: u32,
    grow_function: Option<u32>,
}

impl<'a> Injector<'a> {
    pub fn new(table: &'a CostTable, gas_function: u32) -> Self {
        Self {
            table,
            gas_function,
            grow_function: None,
        }
    }

    /// Redirect `memory.grow` to `grow_function`.
    pub fn with_grow_function(mut self, grow_function: u32) -> Self {
        self.grow_function = Some(grow_function);
        self
    }

    pub fn gas_function(&self) -> u32 {
        self.gas_function
    }

    /// Meter one function. `index` is the function's index for error
    /// locations and logs.
    pub fn meter_function(&self, index: u32, function: &Function) -> MeterResult<MeteredFunction> {
        let body = &function.body;
        let blocks = extract_blocks(index, body)?;
        let charges = accumulate(index, body, &blocks, self.table)?;

        let injected = charges.iter().filter(|c| **c > 0).count();
        let mut out = Vec::with_capacity(body.len() + injected * 2);
        let mut static_cost = 0u64;

        for (block, charge) in blocks.iter().zip(&charges) {
            if *charge > 0 {
                trace!(
                    "func[{index}]@{}: charge {charge} (depth {})",
                    block.start,
                    block.depth
                );
                out.extend(charge_instructions(*charge, self.gas_function));
            }
            static_cost += u64::from(*charge);
            out.extend(block.instructions(body).iter().map(|i| self.rewrite(i)));
        }

        Ok(MeteredFunction {
            function: Function::new(function.type_index, function.locals.clone(), out),
            blocks: blocks.len(),
            charges: injected,
            static_cost,
        })
    }

    fn rewrite(&self, instr: &Instruction) -> Instruction {
        match (instr, self.grow_function) {
            (Instruction::MemoryGrow(0), Some(grow)) => Instruction::Call(grow),
            _ => instr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasm_types::{BlockType, ErrorKind, LoadOp, MemArg, NumericOp, StoreOp, ValType};

    use Instruction::*;

    #[test]
    fn straight_line_gets_one_leading_charge() {
        let table = CostTable::empty()
            .with_override("local.get", 1)
            .with_override("i32.load", 2)
            .with_override("global.get", 1)
            .with_override("i32.add", 1)
            .with_override("i32.store", 2);
        let body = vec![
            LocalGet(0),
            Load(LoadOp::I32Load, MemArg::new(4, 2)),
            GlobalGet(0),
            Numeric(NumericOp::I32Add),
            Store(StoreOp::I32Store, MemArg::new(0, 2)),
        ];
        let f = Function::new(0, vec![], body.clone());
        let metered = Injector::new(&table, 0).meter_function(1, &f).unwrap();

        let mut expected = vec![I32Const(7), Call(0)];
        expected.extend(body);
        assert_eq!(metered.function.body, expected);
        assert_eq!(metered.blocks, 1);
        assert_eq!(metered.charges, 1);
        assert_eq!(metered.static_cost, 7);
    }

    #[test]
    fn each_region_is_charged_inside_itself() {
        let table = CostTable::default();
        let body = vec![
            LocalGet(0),
            If(BlockType::Empty),
            Call(2),
            End,
            Block(BlockType::Empty),
            End,
        ];
        let f = Function::new(1, vec![(1, ValType::I64)], body);
        let metered = Injector::new(&table, 0).meter_function(2, &f).unwrap();
        assert_eq!(
            metered.function.body,
            vec![
                I32Const(2),
                Call(0),
                LocalGet(0),
                If(BlockType::Empty),
                I32Const(1),
                Call(0),
                Call(2),
                End,
                I32Const(1),
                Call(0),
                Block(BlockType::Empty),
                End,
            ]
        );
        // the lone `end` of the empty block costs nothing and gets no pair
        assert_eq!(metered.blocks, 4);
        assert_eq!(metered.charges, 3);
        assert_eq!(metered.static_cost, 4);
        assert_eq!(metered.function.locals, vec![(1, ValType::I64)]);
        assert_eq!(metered.function.type_index, 1);
    }

    #[test]
    fn empty_body_stays_empty() {
        let f = Function::new(0, vec![], vec![]);
        let metered = Injector::new(&CostTable::default(), 0)
            .meter_function(1, &f)
            .unwrap();
        assert!(metered.function.body.is_empty());
        assert_eq!(metered.charges, 0);
    }

    #[test]
    fn memory_grow_is_redirected() {
        let table = CostTable::default().with_grow_cost(10);
        let body = vec![LocalGet(0), MemoryGrow(0)];
        let f = Function::new(0, vec![], body);
        let metered = Injector::new(&table, 0)
            .with_grow_function(7)
            .meter_function(3, &f)
            .unwrap();
        assert_eq!(
            metered.function.body,
            vec![I32Const(2), Call(0), LocalGet(0), Call(7)]
        );
    }

    #[test]
    fn failures_propagate() {
        let table = CostTable::default();
        let f = Function::new(0, vec![], vec![Block(BlockType::Empty)]);
        let err = Injector::new(&table, 0).meter_function(0, &f).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedControlFlow);

        let empty = CostTable::empty();
        let f = Function::new(0, vec![], vec![Nop]);
        let err = Injector::new(&empty, 0).meter_function(0, &f).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOpcode);
    }
}
