//! A small embeddable decimal stack machine: compile DSMAL source into a
//! [`prelude::Program`], derive one or more [`prelude::Machine`]s from it,
//! and run them to evaluate user-supplied arbitrary-precision formulas.

pub mod arena;
pub mod compiler;
pub mod consts;
pub mod error;
pub mod host;
pub mod interned;
mod interpreter;
pub mod machine;
pub mod opcode;
pub mod program;
pub mod random;
pub mod value;

pub mod prelude {
    pub use crate::compiler::compile;
    pub use crate::error::{DsmError, DsmResult, InstructionContext};
    pub use crate::host::HostValue;
    pub use crate::machine::Machine;
    pub use crate::program::{Instruction, Program};
    pub use crate::random::RandomIterator;
    pub use crate::value::DsmValue;
}
