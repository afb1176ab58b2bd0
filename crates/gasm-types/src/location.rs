use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an instruction inside a module.
///
/// `function` is the absolute function index (imports included);
/// `instruction` is the zero-based offset inside that function's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub function: u32,
    pub instruction: usize,
}

impl Location {
    pub fn new(function: u32, instruction: usize) -> Self {
        Self {
            function,
            instruction,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func[{}]@{}", self.function, self.instruction)
    }
}
