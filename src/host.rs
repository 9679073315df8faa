//! The boundary type used to hand values across the embedding surface:
//! variable assignment and the values produced by a random iterator.
//!
//! Keeping the Boolean/integer/text dispatch on a small enum (rather than on
//! a host-language dynamic object, which is out of scope per §1) is what
//! lets an embedder pass any domain type whose textual form is meaningful —
//! the "anything else, stringify it" fallback is deliberate.

use crate::error::DsmError;
use crate::value::DsmValue;

/// A value handed in from outside the machine.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// Maps to the interned zero/one.
    Bool(bool),
    /// Converted with the fast integer path when it fits in 32 bits, or the
    /// decimal form otherwise.
    Int(i64),
    /// Converted via its textual form and [`DsmValue::set_from_string`].
    Text(String),
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Convert a host value into a [`DsmValue`], per the recognized-conversions
/// table in §6: booleans map to 0/1, integers use the fast path when they
/// fit in 32 bits, everything else round-trips through its string form.
pub fn convert(value: &HostValue, source: Option<&str>) -> Result<DsmValue, DsmError> {
    match value {
        HostValue::Bool(false) => Ok(DsmValue::from_i32(0)),
        HostValue::Bool(true) => Ok(DsmValue::from_i32(1)),
        HostValue::Int(n) => Ok(DsmValue::set_from_integer(*n)),
        HostValue::Text(s) => DsmValue::set_from_string(s, source),
    }
}
