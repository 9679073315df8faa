//! Runtime and compile-time error taxonomy.

use std::fmt;
use thiserror::Error;

/// Program counter and mnemonic of the instruction that raised an
/// interpreter-level error, attached for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionContext {
    /// Program counter at the time of the fault.
    pub pc: usize,
    /// Two-letter mnemonic of the offending instruction.
    pub mnemonic: &'static str,
}

impl fmt::Display for InstructionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at pc={} ({})", self.pc, self.mnemonic)
    }
}

/// Error variants produced by the compiler, the value layer, or the
/// interpreter. Every variant is distinct, as required by the error
/// taxonomy: no two failure kinds share a variant.
#[derive(Debug, Error)]
pub enum DsmError {
    /// Malformed DSMAL source: wrong section count, bad mnemonic, bad
    /// parameter, out-of-range slot reference, duplicate variable name, or a
    /// parameter/slot count overflowing its limit.
    #[error("invalid program: {0}")]
    InvalidProgram(String),

    /// A host value could not be converted into a decimal value (parse
    /// failure, overflow, or underflow), optionally annotated with a
    /// human-readable description of where the value came from.
    #[error("invalid value{}: {message}", source.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    InvalidValue {
        /// Description of the failure.
        message: String,
        /// Optional description of the value's origin, e.g. `"constant 3"`.
        source: Option<String>,
    },

    /// `assign_variable`/`read_variable` referenced a name absent from the
    /// program's variable map.
    #[error("unknown variable: {0:?}")]
    UnknownVariable(String),

    /// Fetch encountered a program counter at or past the end of the
    /// instruction array.
    #[error("program counter out of bounds {0}")]
    OutOfBoundsPc(InstructionContext),

    /// An opcode required more operands than were present on the stack.
    #[error("stack underflow {0}")]
    StackUnderflow(InstructionContext),

    /// A push was attempted against a full operand stack.
    #[error("stack overflow {0}")]
    StackOverflow(InstructionContext),

    /// The value arena was full even after a collection.
    #[error("arena out of space {0}")]
    OutOfSpace(InstructionContext),

    /// `Dv` was executed with a zero denominator.
    #[error("division by zero {0}")]
    DivisionByZero(InstructionContext),

    /// An operation is mathematically undefined, e.g. zero raised to a
    /// negative power, or the decimal library reported an invalid operation.
    #[error("illegal operation {0}")]
    IllegalOperation(InstructionContext),

    /// An arithmetic result exceeded the representable range of the decimal
    /// context.
    #[error("arithmetic overflow {0}")]
    Overflow(InstructionContext),

    /// An arithmetic result underflowed the representable range of the
    /// decimal context.
    #[error("arithmetic underflow {0}")]
    Underflow(InstructionContext),

    /// Promoting a valid 32-bit integer fast value into decimal form failed
    /// unexpectedly.
    #[error("internal conversion failure {0}")]
    InternalConversion(InstructionContext),

    /// The machine executed `instruction_limit` instructions without
    /// reaching `Xx`.
    #[error("instruction limit exceeded {0}")]
    InstructionLimitExceeded(InstructionContext),

    /// `Lr` was executed but the configured random iterator had no more
    /// values to yield.
    #[error("random iterator exhausted {0}")]
    RandomExhausted(InstructionContext),
}

impl DsmError {
    /// Replace the instruction context of an interpreter-raised error.
    ///
    /// Value-layer helpers (e.g. `round_to_context`) don't know the current
    /// `pc`, so they raise with a placeholder context; the interpreter
    /// reattaches the real one before surfacing the error to the caller.
    pub fn with_context(self, ctx: InstructionContext) -> Self {
        match self {
            Self::OutOfBoundsPc(_) => Self::OutOfBoundsPc(ctx),
            Self::StackUnderflow(_) => Self::StackUnderflow(ctx),
            Self::StackOverflow(_) => Self::StackOverflow(ctx),
            Self::OutOfSpace(_) => Self::OutOfSpace(ctx),
            Self::DivisionByZero(_) => Self::DivisionByZero(ctx),
            Self::IllegalOperation(_) => Self::IllegalOperation(ctx),
            Self::Overflow(_) => Self::Overflow(ctx),
            Self::Underflow(_) => Self::Underflow(ctx),
            Self::InternalConversion(_) => Self::InternalConversion(ctx),
            Self::InstructionLimitExceeded(_) => Self::InstructionLimitExceeded(ctx),
            Self::RandomExhausted(_) => Self::RandomExhausted(ctx),
            other => other,
        }
    }

    /// The instruction context attached to this error, if it originated in
    /// the interpreter rather than the compiler or value layer.
    pub const fn instruction_context(&self) -> Option<InstructionContext> {
        match self {
            Self::OutOfBoundsPc(c)
            | Self::StackUnderflow(c)
            | Self::StackOverflow(c)
            | Self::OutOfSpace(c)
            | Self::DivisionByZero(c)
            | Self::IllegalOperation(c)
            | Self::Overflow(c)
            | Self::Underflow(c)
            | Self::InternalConversion(c)
            | Self::InstructionLimitExceeded(c)
            | Self::RandomExhausted(c) => Some(*c),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type DsmResult<T> = Result<T, DsmError>;
