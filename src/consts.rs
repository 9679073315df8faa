//! VM parameters
//!
//! Mirrors the layout of a dedicated constants module the way a register VM
//! keeps its register/memory parameters in one place, rather than scattering
//! magic numbers through the interpreter.

/// Fixed capacity of a machine's value arena.
pub const ARENA_CAPACITY: usize = 256;

/// Fixed capacity of a machine's operand stack.
pub const STACK_CAPACITY: usize = 32;

/// Default number of instructions a machine may execute before aborting.
pub const DEFAULT_INSTRUCTION_LIMIT: u32 = 10_000;

/// Smallest interned digit (inclusive).
pub const INTERNED_MIN: i32 = -9;

/// Largest interned digit (inclusive).
pub const INTERNED_MAX: i32 = 9;

/// Number of interned digit singletons (`INTERNED_MIN..=INTERNED_MAX`).
pub const INTERNED_COUNT: usize = (INTERNED_MAX - INTERNED_MIN + 1) as usize;

/// Maximum number of variables or constants a compiled program may declare.
pub const MAX_SLOTS: usize = u16::MAX as usize;

/// Significant-digit precision of the decimal arithmetic context.
///
/// The original implementation used `mpdecimal`'s `mpd_defaultcontext()`,
/// which fixes precision at 28 significant digits with half-even rounding.
/// `bigdecimal` has no notion of a shared context object, so this crate
/// applies the same precision explicitly after every arithmetic operation
/// (see [`crate::value::round_to_context`]).
pub const CONTEXT_PRECISION: u64 = 28;

/// Largest adjusted exponent a value may carry before `round_to_context`
/// reports [`crate::error::DsmError::Overflow`].
///
/// Chosen to match the IEEE decimal128 exponent range, the closest
/// standardized shape to `mpdecimal`'s default context.
pub const CONTEXT_EMAX: i64 = 6144;

/// Smallest adjusted exponent a value may carry before `round_to_context`
/// reports [`crate::error::DsmError::Underflow`].
pub const CONTEXT_EMIN: i64 = -6143;
