//! Instruction cost table.
//!
//! A pure lookup from instruction to a non-negative cost. Lookups go
//! per-mnemonic override first, then the instruction's class. An
//! instruction that matches neither is unsupported: the pass rejects the
//! module instead of charging it nothing.
//!
//! `end` and `else` are structural pseudo-instructions and always cost 0.

use std::collections::BTreeMap;

use gasm_types::{Instruction, InstructionClass};
use serde::{Deserialize, Serialize};

const FLOAT_CLASSES: [InstructionClass; 2] =
    [InstructionClass::Float, InstructionClass::FloatComparison];

/// The static price list shared by the instrumenter and any consumer that
/// relies on declared gas limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Cost per instruction class.
    pub classes: BTreeMap<InstructionClass, u32>,
    /// Cost per text-format mnemonic (e.g. `"i32.div_u"`), taking
    /// precedence over `classes`.
    pub overrides: BTreeMap<String, u32>,
    /// Reject every instruction that consumes or produces a float.
    pub forbid_floats: bool,
    /// Dynamic charge per page requested by `memory.grow`; 0 disables
    /// memory-grow metering.
    pub memory_grow_per_page: u32,
}

impl Default for CostTable {
    /// Every class costs 1; memory growth is not metered.
    fn default() -> Self {
        Self::uniform(1)
    }
}

impl CostTable {
    /// A table that prices every class at `cost`.
    pub fn uniform(cost: u32) -> Self {
        Self {
            classes: InstructionClass::ALL.iter().map(|c| (*c, cost)).collect(),
            overrides: BTreeMap::new(),
            forbid_floats: false,
            memory_grow_per_page: 0,
        }
    }

    /// A table with no entries: every instruction is unsupported until
    /// priced.
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
            overrides: BTreeMap::new(),
            forbid_floats: false,
            memory_grow_per_page: 0,
        }
    }

    pub fn with_class_cost(mut self, class: InstructionClass, cost: u32) -> Self {
        self.classes.insert(class, cost);
        self
    }

    pub fn with_override(mut self, mnemonic: impl Into<String>, cost: u32) -> Self {
        self.overrides.insert(mnemonic.into(), cost);
        self
    }

    /// Remove a class, making its instructions unsupported.
    pub fn without_class(mut self, class: InstructionClass) -> Self {
        self.classes.remove(&class);
        self
    }

    /// Reject float arithmetic, comparisons, constants, loads, stores and
    /// conversions.
    pub fn with_forbidden_floats(mut self) -> Self {
        for class in FLOAT_CLASSES {
            self.classes.remove(&class);
        }
        self.forbid_floats = true;
        self
    }

    pub fn with_grow_cost(mut self, per_page: u32) -> Self {
        self.memory_grow_per_page = per_page;
        self
    }

    /// Cost of `instr`, or `None` if the table does not support it.
    pub fn cost(&self, instr: &Instruction) -> Option<u32> {
        if instr.is_structural_marker() {
            return Some(0);
        }
        if self.forbid_floats && instr.touches_floats() {
            return None;
        }
        self.overrides
            .get(instr.mnemonic())
            .or_else(|| self.classes.get(&instr.class()))
            .copied()
    }

    /// Whether `memory.grow` must be redirected through the grow charger.
    pub fn meters_memory_grow(&self) -> bool {
        self.memory_grow_per_page > 0
    }

    /// Canonical JSON encoding; maps are ordered so equal tables encode
    /// to equal bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}
