//! Thompson NFA construction and simulation.

pub mod bytecode;
pub mod compiler;
pub mod input;
pub mod pike_vm;

pub use bytecode::{EmptyFlags, Inst, InstOp, LiteralPrefix, Prog};
pub use compiler::compile;
pub use input::{MachineInput, Step, Utf8Input, Utf16Input};
pub use pike_vm::Machine;
