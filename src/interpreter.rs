//! The dispatch loop: fetch, pre-dispatch checks, execute.
//!
//! Arithmetic here always tries the 32-bit fast path first (§4.G): if both
//! operands have a valid `int_fast` and the result fits back in 32 bits, the
//! decimal library is never touched. Everything else — including every
//! algebraic short-circuit that can return an operand unchanged without
//! allocating — is handled before falling through to the decimal path.

use std::cmp::Ordering;

use bigdecimal::{BigDecimal, ToPrimitive};
use num_bigint::{BigInt, Sign};
use tracing::trace;

use crate::arena::ValueRef;
use crate::consts::STACK_CAPACITY;
use crate::error::{DsmError, InstructionContext};
use crate::host;
use crate::machine::{Machine, RandomResolution};
use crate::opcode::Opcode;
use crate::value::{round_to_context, DsmValue};

/// Run `machine` from a freshly cleared stack until `Xx` or an error.
/// `coverage`, if given, is set for instruction `pc` immediately before that
/// instruction dispatches.
pub(crate) fn run(machine: &mut Machine, mut coverage: Option<&mut Vec<bool>>) -> Result<u32, DsmError> {
    machine.stack.clear();
    let program = machine.program_arc();
    let instructions = program.instructions();
    let instruction_count = instructions.len();
    let limit = machine.instruction_limit;

    let mut pc: usize = 0;
    let mut executed: u32 = 0;

    loop {
        if pc >= instruction_count {
            return Err(DsmError::OutOfBoundsPc(InstructionContext { pc, mnemonic: "<pc>" }));
        }
        let instr = instructions[pc];
        let opcode = instr.opcode;
        let mnemonic = opcode.mnemonic();
        let ctx = InstructionContext { pc, mnemonic };

        if executed >= limit {
            return Err(DsmError::InstructionLimitExceeded(ctx));
        }
        if machine.stack.len() < opcode.operand_count() {
            return Err(DsmError::StackUnderflow(ctx));
        }

        executed += 1;
        if let Some(cov) = coverage.as_deref_mut() {
            cov[pc] = true;
        }
        trace!(pc, mnemonic, "dispatch");

        match opcode {
            Opcode::Exit => return Ok(executed),

            Opcode::JumpUnconditional => {
                pc = instr.param as usize;
                continue;
            }
            Opcode::JumpIfNonZero => {
                let a = pop(machine);
                pc = if !machine.resolve(a).is_zero() { instr.param as usize } else { pc + 1 };
                continue;
            }
            Opcode::JumpIfZero => {
                let a = pop(machine);
                pc = if machine.resolve(a).is_zero() { instr.param as usize } else { pc + 1 };
                continue;
            }

            Opcode::LoadConstant => push(machine, ValueRef::Constant(instr.param), ctx)?,
            Opcode::LoadVariable => {
                let value = machine.variables[instr.param as usize];
                push(machine, value, ctx)?;
            }
            Opcode::LoadRandom => {
                let value = next_random(machine, ctx)?;
                push(machine, value, ctx)?;
            }
            Opcode::LoadZero => push(machine, ValueRef::zero(), ctx)?,
            Opcode::LoadOne => push(machine, ValueRef::one(), ctx)?,

            Opcode::Store => {
                let a = pop(machine);
                machine.variables[instr.param as usize] = a;
            }
            Opcode::Copy => {
                let top = *machine.stack.last().expect("operand count already checked");
                push(machine, top, ctx)?;
            }
            Opcode::Pop => {
                pop(machine);
            }

            Opcode::Not => {
                let a = pop(machine);
                let result = if machine.resolve(a).is_zero() { ValueRef::one() } else { ValueRef::zero() };
                push(machine, result, ctx)?;
            }
            Opcode::Negate => {
                let a = pop(machine);
                let result = negate(machine, a, ctx)?;
                push(machine, result, ctx)?;
            }
            Opcode::Abs => {
                let a = pop(machine);
                let result = if machine.resolve(a).is_negative() { negate(machine, a, ctx)? } else { a };
                push(machine, result, ctx)?;
            }
            Opcode::Ceiling | Opcode::Floor | Opcode::Round => {
                let a = pop(machine);
                let result = round_like(machine, opcode, a, ctx)?;
                push(machine, result, ctx)?;
            }

            Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan | Opcode::GreaterOrEqual => {
                let b = pop(machine);
                let a = pop(machine);
                let result = compare(machine, opcode, a, b, ctx)?;
                push(machine, result, ctx)?;
            }

            Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Divide | Opcode::Power | Opcode::Min | Opcode::Max => {
                let b = pop(machine);
                let a = pop(machine);
                let result = arithmetic(machine, opcode, a, b, ctx)?;
                push(machine, result, ctx)?;
            }
        }

        pc += 1;
    }
}

fn pop(machine: &mut Machine) -> ValueRef {
    machine.stack.pop().expect("operand count already checked by the caller")
}

fn push(machine: &mut Machine, value: ValueRef, ctx: InstructionContext) -> Result<(), DsmError> {
    if machine.stack.len() >= STACK_CAPACITY {
        return Err(DsmError::StackOverflow(ctx));
    }
    machine.stack.push(value);
    Ok(())
}

/// Store a freshly computed value, reattaching the real instruction context
/// to whatever the value layer or the arena raised.
fn store(machine: &mut Machine, value: DsmValue, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    machine.store(value).map_err(|e| e.with_context(ctx))
}

fn next_random(machine: &mut Machine, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.random_resolution.is_none() {
        let resolution = if machine.random.is_some() {
            RandomResolution::Own
        } else if crate::random::has_default() {
            RandomResolution::ProcessDefault
        } else {
            RandomResolution::None
        };
        machine.random_resolution = Some(resolution);
    }

    let next_value = match machine.random_resolution.expect("just resolved above") {
        RandomResolution::None => return Ok(ValueRef::zero()),
        RandomResolution::Own => machine.random.as_mut().and_then(|it| it.next_value()),
        RandomResolution::ProcessDefault => crate::random::next_from_default(),
    };

    match next_value {
        Some(host_value) => {
            let converted = host::convert(&host_value, Some("random value")).map_err(|e| e.with_context(ctx))?;
            store(machine, converted, ctx)
        }
        None => Err(DsmError::RandomExhausted(ctx)),
    }
}

fn negate(machine: &mut Machine, a: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if let Some(n) = machine.resolve(a).int_fast() {
        if let Some(negated) = n.checked_neg() {
            return store(machine, DsmValue::from_i32(negated), ctx);
        }
    }
    let mut value = machine.resolve(a).clone();
    value.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    let negated = -value.decimal().expect("just ensured").clone();
    let rounded = round_to_context(negated).map_err(|e| e.with_context(ctx))?;
    store(machine, DsmValue::from_decimal(rounded), ctx)
}

fn round_like(machine: &mut Machine, op: Opcode, a: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(a).int_fast().is_some() {
        // Already integral: Cl/Fl/Rd are no-ops on the fast path.
        return Ok(a);
    }
    let mut value = machine.resolve(a).clone();
    value.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    let d = value.decimal().expect("just ensured");
    let rounded = match op {
        Opcode::Ceiling => ceil_decimal(d),
        Opcode::Floor => floor_decimal(d),
        Opcode::Round => round_half_even(d),
        _ => unreachable!("round_like only dispatched for Cl/Fl/Rd"),
    };
    let rounded = round_to_context(rounded).map_err(|e| e.with_context(ctx))?;
    store(machine, DsmValue::from_decimal(rounded), ctx)
}

fn floor_decimal(d: &BigDecimal) -> BigDecimal {
    let (digits, scale) = d.as_bigint_and_exponent();
    if scale <= 0 {
        return d.clone();
    }
    let factor = BigInt::from(10u32).pow(scale as u32);
    let quotient = &digits / &factor;
    let remainder = &digits - &quotient * &factor;
    let quotient = if remainder != BigInt::from(0u32) && digits.sign() == Sign::Minus {
        quotient - 1
    } else {
        quotient
    };
    BigDecimal::new(quotient, 0)
}

fn ceil_decimal(d: &BigDecimal) -> BigDecimal {
    let (digits, scale) = d.as_bigint_and_exponent();
    if scale <= 0 {
        return d.clone();
    }
    let factor = BigInt::from(10u32).pow(scale as u32);
    let quotient = &digits / &factor;
    let remainder = &digits - &quotient * &factor;
    let quotient = if remainder != BigInt::from(0u32) && digits.sign() != Sign::Minus {
        quotient + 1
    } else {
        quotient
    };
    BigDecimal::new(quotient, 0)
}

/// Round to the nearest integer, ties to even, matching the context's
/// rounding mode.
fn round_half_even(d: &BigDecimal) -> BigDecimal {
    let (digits, scale) = d.as_bigint_and_exponent();
    if scale <= 0 {
        return d.clone();
    }
    let factor = BigInt::from(10u32).pow(scale as u32);
    let quotient = &digits / &factor;
    let remainder = &digits - &quotient * &factor;
    let twice_remainder_abs = if remainder.sign() == Sign::Minus { -(&remainder * 2) } else { &remainder * 2 };
    let round_away_from_zero = twice_remainder_abs > factor || (twice_remainder_abs == factor && &quotient % 2 != BigInt::from(0u32));
    let quotient = if round_away_from_zero {
        if digits.sign() == Sign::Minus {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    };
    BigDecimal::new(quotient, 0)
}

fn compare(machine: &mut Machine, op: Opcode, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    let ordering = DsmValue::compare(machine.resolve(a), machine.resolve(b)).map_err(|e| e.with_context(ctx))?;
    let truth = match op {
        Opcode::Equal => ordering == Ordering::Equal,
        Opcode::NotEqual => ordering != Ordering::Equal,
        Opcode::GreaterThan => ordering == Ordering::Greater,
        Opcode::GreaterOrEqual => ordering != Ordering::Less,
        _ => unreachable!("compare only dispatched for Eq/Ne/Gt/Ge"),
    };
    Ok(if truth { ValueRef::one() } else { ValueRef::zero() })
}

fn arithmetic(machine: &mut Machine, op: Opcode, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    match op {
        Opcode::Add => add(machine, a, b, ctx),
        Opcode::Subtract => subtract(machine, a, b, ctx),
        Opcode::Multiply => multiply(machine, a, b, ctx),
        Opcode::Divide => divide(machine, a, b, ctx),
        Opcode::Power => power(machine, a, b, ctx),
        Opcode::Min => min_max(machine, a, b, ctx, true),
        Opcode::Max => min_max(machine, a, b, ctx, false),
        _ => unreachable!("arithmetic only dispatched for Ad/Sb/Ml/Dv/Pw/Mn/Mx"),
    }
}

/// Shared fast-path / decimal-path dispatch for `Ad`/`Sb`/`Ml`: try a 64-bit
/// integer op first, falling through to the decimal library only when a
/// fast form is missing or the result doesn't fit back in 32 bits.
fn binary_numeric(
    machine: &mut Machine,
    a: ValueRef,
    b: ValueRef,
    ctx: InstructionContext,
    int_op: impl Fn(i64, i64) -> i64,
    dec_op: impl Fn(&BigDecimal, &BigDecimal) -> BigDecimal,
) -> Result<ValueRef, DsmError> {
    let ia = machine.resolve(a).int_fast();
    let ib = machine.resolve(b).int_fast();
    if let (Some(x), Some(y)) = (ia, ib) {
        let result = int_op(x as i64, y as i64);
        if let Ok(r32) = i32::try_from(result) {
            return store(machine, DsmValue::from_i32(r32), ctx);
        }
    }
    let mut va = machine.resolve(a).clone();
    let mut vb = machine.resolve(b).clone();
    va.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    vb.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    let result = dec_op(va.decimal().expect("just ensured"), vb.decimal().expect("just ensured"));
    let rounded = round_to_context(result).map_err(|e| e.with_context(ctx))?;
    store(machine, DsmValue::from_decimal(rounded), ctx)
}

fn add(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(a).is_zero() {
        return Ok(b);
    }
    if machine.resolve(b).is_zero() {
        return Ok(a);
    }
    binary_numeric(machine, a, b, ctx, |x, y| x + y, |x, y| x + y)
}

fn subtract(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(b).is_zero() {
        return Ok(a);
    }
    if machine.resolve(a).is_zero() {
        return negate(machine, b, ctx);
    }
    if DsmValue::are_obviously_equal(machine.resolve(a), machine.resolve(b)) {
        return Ok(ValueRef::zero());
    }
    binary_numeric(machine, a, b, ctx, |x, y| x - y, |x, y| x - y)
}

fn multiply(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(a).is_zero() || machine.resolve(b).is_zero() {
        return Ok(ValueRef::zero());
    }
    if machine.resolve(a).is_obviously_one() {
        return Ok(b);
    }
    if machine.resolve(b).is_obviously_one() {
        return Ok(a);
    }
    binary_numeric(machine, a, b, ctx, |x, y| x * y, |x, y| x * y)
}

fn divide(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(b).is_zero() {
        return Err(DsmError::DivisionByZero(ctx));
    }
    if machine.resolve(b).is_obviously_one() {
        return Ok(a);
    }
    if machine.resolve(a).is_zero() {
        return Ok(ValueRef::zero());
    }
    if DsmValue::are_obviously_equal(machine.resolve(a), machine.resolve(b)) {
        return Ok(ValueRef::one());
    }
    // Division never takes the 32-bit fast path: integer division would
    // silently truncate, which this VM's decimal semantics never do.
    let mut va = machine.resolve(a).clone();
    let mut vb = machine.resolve(b).clone();
    va.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    vb.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    let result = va.decimal().expect("just ensured") / vb.decimal().expect("just ensured");
    let rounded = round_to_context(result).map_err(|e| e.with_context(ctx))?;
    store(machine, DsmValue::from_decimal(rounded), ctx)
}

fn power(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext) -> Result<ValueRef, DsmError> {
    if machine.resolve(b).is_obviously_one() {
        return Ok(a);
    }
    if machine.resolve(b).is_obviously_two() {
        return multiply(machine, a, a, ctx);
    }
    if machine.resolve(b).is_zero() {
        return if machine.resolve(a).is_zero() { Ok(ValueRef::zero()) } else { Ok(ValueRef::one()) };
    }
    if machine.resolve(a).is_obviously_one() {
        return Ok(ValueRef::one());
    }
    if machine.resolve(a).is_zero() && machine.resolve(b).is_negative() {
        return Err(DsmError::IllegalOperation(ctx));
    }

    let mut va = machine.resolve(a).clone();
    let mut vb = machine.resolve(b).clone();
    va.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    vb.ensure_decimal_valid().map_err(|e| e.with_context(ctx))?;
    let exponent = vb
        .decimal()
        .expect("just ensured")
        .to_i64()
        .ok_or(DsmError::IllegalOperation(ctx))?;
    let result = decimal_pow(va.decimal().expect("just ensured"), exponent);
    let rounded = round_to_context(result).map_err(|e| e.with_context(ctx))?;
    store(machine, DsmValue::from_decimal(rounded), ctx)
}

fn decimal_pow(base: &BigDecimal, exponent: i64) -> BigDecimal {
    let negative = exponent < 0;
    let mut magnitude = exponent.unsigned_abs();
    let mut result = BigDecimal::from(1);
    let mut squared = base.clone();
    while magnitude > 0 {
        if magnitude & 1 == 1 {
            result = &result * &squared;
        }
        squared = &squared * &squared;
        magnitude >>= 1;
    }
    if negative {
        BigDecimal::from(1) / result
    } else {
        result
    }
}

fn min_max(machine: &mut Machine, a: ValueRef, b: ValueRef, ctx: InstructionContext, want_min: bool) -> Result<ValueRef, DsmError> {
    let ordering = DsmValue::compare(machine.resolve(a), machine.resolve(b)).map_err(|e| e.with_context(ctx))?;
    let choose_a = if want_min { ordering != Ordering::Greater } else { ordering != Ordering::Less };
    Ok(if choose_a { a } else { b })
}
