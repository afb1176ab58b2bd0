//! Shared types for the GASM metering pass.
//!
//! This crate defines the module IR consumed and produced by the metering
//! pass, the closed instruction set, instruction locations, and the
//! serializable error codes shared by every stage.

mod error;
mod instruction;
mod location;
pub mod module;

pub use error::{ErrorCode, ErrorKind, ErrorReport};
pub use instruction::{
    BlockType, Instruction, InstructionClass, LoadOp, MemArg, NumericOp, StoreOp, ValType,
};
pub use location::Location;
pub use module::{
    ConstExpr, CustomSection, DataSegment, ElementSegment, Export, ExportKind, FuncType,
    Function, Global, GlobalType, Import, ImportKind, MemoryType, Module, TableType,
};
