//! Decimal value representation: the small-integer fast path and the
//! arbitrary-precision decimal form, plus the simplification rules that keep
//! the two in sync.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use crate::consts::{CONTEXT_EMAX, CONTEXT_EMIN, CONTEXT_PRECISION};
use crate::error::DsmError;

/// A decimal value. At least one of `int_fast` / `decimal` is valid at any
/// time the value is reachable from the stack or a variable slot. Carries no
/// interior mutability, so it (and anything that holds it — the interned
/// table, `Program`'s constant table) is `Sync` and shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct DsmValue {
    int_fast: Option<i32>,
    decimal: Option<BigDecimal>,
}

impl DsmValue {
    /// Construct a value directly from a fast-path integer.
    pub fn from_i32(n: i32) -> Self {
        Self {
            int_fast: Some(n),
            decimal: None,
        }
    }

    /// Parse a decimal literal. Populates the decimal form, and also the
    /// integer fast form if the number is integral and fits in 32 bits.
    pub fn set_from_string(s: &str, source: Option<&str>) -> Result<Self, DsmError> {
        if s.is_empty() {
            return Err(DsmError::InvalidValue {
                message: "empty decimal literal".to_string(),
                source: source.map(str::to_string),
            });
        }
        let parsed = BigDecimal::from_str(s).map_err(|e| DsmError::InvalidValue {
            message: format!("malformed decimal literal {s:?}: {e}"),
            source: source.map(str::to_string),
        })?;
        let decimal = round_to_context(parsed)?;
        let int_fast = exact_i32(&decimal);
        Ok(Self {
            int_fast,
            decimal: Some(decimal),
        })
    }

    /// Construct a value directly from an already-rounded decimal. Derives
    /// the integer fast path if it happens to be exact and in range.
    pub fn from_decimal(d: BigDecimal) -> Self {
        let int_fast = exact_i32(&d);
        Self { int_fast, decimal: Some(d) }
    }

    /// Populate from a host integer. Values fitting in 32 bits populate only
    /// the fast path; wider values populate the decimal form.
    pub fn set_from_integer(n: i64) -> Self {
        if let Ok(n32) = i32::try_from(n) {
            Self::from_i32(n32)
        } else {
            Self {
                int_fast: None,
                decimal: Some(BigDecimal::from(n)),
            }
        }
    }

    /// Normalize after arithmetic: strip trailing fractional zeros (bounded
    /// by the context's exponent clamp), then demote to the integer fast
    /// path (or an interned digit, handled by the caller) when possible.
    pub fn simplify(mut self) -> Self {
        if let Some(d) = self.decimal.take() {
            let normalized = d.normalized();
            self.int_fast = exact_i32(&normalized);
            self.decimal = Some(normalized);
        } else if let Some(n) = self.int_fast {
            // Fast-path-only value: nothing to simplify, but keep it
            // consistent with itself.
            self.int_fast = Some(n);
        }
        self
    }

    /// Materialize the decimal form from the integer form if it is missing.
    pub fn ensure_decimal_valid(&mut self) -> Result<(), DsmError> {
        if self.decimal.is_none() {
            let n = self.int_fast.ok_or_else(|| {
                DsmError::InternalConversion(crate::error::InstructionContext {
                    pc: 0,
                    mnemonic: "ensure_decimal_valid",
                })
            })?;
            self.decimal = Some(BigDecimal::from(n));
        }
        Ok(())
    }

    /// The integer fast-path value, if valid.
    pub const fn int_fast(&self) -> Option<i32> {
        self.int_fast
    }

    /// The decimal form, if valid.
    pub fn decimal(&self) -> Option<&BigDecimal> {
        self.decimal.as_ref()
    }

    /// True when the value is numerically zero in whichever representation
    /// is valid.
    pub fn is_zero(&self) -> bool {
        if let Some(n) = self.int_fast {
            n == 0
        } else {
            self.decimal.as_ref().is_some_and(Zero::is_zero)
        }
    }

    /// True when the value is numerically negative.
    pub fn is_negative(&self) -> bool {
        if let Some(n) = self.int_fast {
            n < 0
        } else {
            self.decimal.as_ref().is_some_and(|d| d.sign() == bigdecimal::num_bigint::Sign::Minus)
        }
    }

    /// Cheap, exact check for the value `1`: no scanning, demands a
    /// single-digit coefficient with scale 0 when using the decimal form.
    pub fn is_obviously_one(&self) -> bool {
        if let Some(n) = self.int_fast {
            return n == 1;
        }
        self.decimal
            .as_ref()
            .map(|d| {
                let (digits, scale) = d.as_bigint_and_exponent();
                scale == 0 && digits == bigdecimal::num_bigint::BigInt::from(1)
            })
            .unwrap_or(false)
    }

    /// Cheap, exact check for the value `2`.
    pub fn is_obviously_two(&self) -> bool {
        if let Some(n) = self.int_fast {
            return n == 2;
        }
        self.decimal
            .as_ref()
            .map(|d| {
                let (digits, scale) = d.as_bigint_and_exponent();
                scale == 0 && digits == bigdecimal::num_bigint::BigInt::from(2)
            })
            .unwrap_or(false)
    }

    /// Cheap equality that relies on the fast integer form when both operands
    /// have one, or on exact (reduced-form) equality of the decimal
    /// coefficient/scale pair otherwise. Does not perform numeric comparison
    /// across representations of different precision.
    pub fn are_obviously_equal(a: &Self, b: &Self) -> bool {
        match (a.int_fast, b.int_fast) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.decimal.as_ref(), b.decimal.as_ref()) {
                (Some(x), Some(y)) => x.as_bigint_and_exponent() == y.as_bigint_and_exponent(),
                _ => false,
            },
        }
    }

    /// Canonical textual form.
    pub fn as_display_string(&self) -> String {
        if self.is_zero() {
            "0".to_string()
        } else if let Some(n) = self.int_fast {
            n.to_string()
        } else if let Some(d) = &self.decimal {
            d.normalized().to_string()
        } else {
            // Invariant violation: a reachable value always has a valid form.
            "0".to_string()
        }
    }

    /// Numeric comparison used by `Eq`/`Gt`/`Ge`, falling back to the decimal
    /// library's comparison when the fast path is unavailable for either
    /// operand.
    pub fn compare(a: &Self, b: &Self) -> Result<std::cmp::Ordering, DsmError> {
        if let (Some(x), Some(y)) = (a.int_fast, b.int_fast) {
            return Ok(x.cmp(&y));
        }
        let da = a.decimal.as_ref().ok_or_else(|| {
            DsmError::InternalConversion(crate::error::InstructionContext { pc: 0, mnemonic: "compare" })
        })?;
        let db = b.decimal.as_ref().ok_or_else(|| {
            DsmError::InternalConversion(crate::error::InstructionContext { pc: 0, mnemonic: "compare" })
        })?;
        Ok(da.cmp(db))
    }
}

/// Round a decimal to the fixed context precision (significant digits,
/// half-even rounding, the `bigdecimal` crate's default rounding mode), and
/// reject results outside the context's exponent clamp.
///
/// `InstructionContext.mnemonic` is `&'static str`, so this placeholder
/// context can only ever carry a fixed literal, never a caller-supplied
/// description; the interpreter overwrites it with the real `pc`/mnemonic via
/// `with_context` once the error reaches a dispatched instruction.
///
/// See `SPEC_FULL.md` for why 28-digit precision with an IEEE
/// decimal128-shaped exponent range was chosen as the nearest equivalent of
/// the reference implementation's `mpdecimal` context.
pub fn round_to_context(value: BigDecimal) -> Result<BigDecimal, DsmError> {
    let rounded = if digit_count(&value) > CONTEXT_PRECISION {
        value.with_prec(CONTEXT_PRECISION)
    } else {
        value
    };
    let (digits, scale) = rounded.as_bigint_and_exponent();
    if digits.is_zero() {
        return Ok(rounded);
    }
    let adjusted_exponent = digit_count_of(&digits) as i64 - 1 - scale;
    if adjusted_exponent > CONTEXT_EMAX {
        return Err(DsmError::Overflow(crate::error::InstructionContext { pc: 0, mnemonic: "decimal" }));
    }
    if adjusted_exponent < CONTEXT_EMIN {
        return Err(DsmError::Underflow(crate::error::InstructionContext { pc: 0, mnemonic: "decimal" }));
    }
    Ok(rounded)
}

fn digit_count(d: &BigDecimal) -> u64 {
    let (digits, _) = d.as_bigint_and_exponent();
    digit_count_of(&digits)
}

fn digit_count_of(n: &bigdecimal::num_bigint::BigInt) -> u64 {
    if n.is_zero() {
        1
    } else {
        n.to_string().trim_start_matches('-').len() as u64
    }
}

/// Attempt an exact (lossless) conversion of a normalized decimal to a
/// 32-bit integer: must be integral (scale <= 0 after normalization) and in
/// range.
fn exact_i32(d: &BigDecimal) -> Option<i32> {
    if !d.is_integer() {
        return None;
    }
    d.to_i32()
}
