//! Per-execution state: variable vectors, operand stack, arena, and the
//! knobs (`instruction_limit`, random iterator) that bound a single `run`.

use std::sync::Arc;

use tracing::debug;

use crate::arena::{Arena, ValueRef};
use crate::consts::DEFAULT_INSTRUCTION_LIMIT;
use crate::error::{DsmError, InstructionContext};
use crate::host::{self, HostValue};
use crate::interned;
use crate::program::Program;
use crate::random::RandomIterator;
use crate::value::DsmValue;

/// Per-run machine state derived from a [`Program`]. Holds a strong
/// reference to the program it was created from, so the program outlives
/// every machine derived from it; two machines sharing a program may run on
/// different threads as long as neither shares its own state.
pub struct Machine {
    program: Arc<Program>,
    pub(crate) stack: Vec<ValueRef>,
    pub(crate) arena: Arena,
    /// `variables[0..count]` is the current vector, `variables[count..2*count]`
    /// is the baseline vector established at construction / last `reset`.
    pub(crate) variables: Vec<ValueRef>,
    pub(crate) random: Option<Box<dyn RandomIterator>>,
    pub(crate) instruction_limit: u32,
    /// Which random source `Lr` resolved to, fixed the first time `Lr`
    /// executes and never re-resolved for the lifetime of this machine.
    pub(crate) random_resolution: Option<RandomResolution>,
}

/// The random source an `Lr` instruction resolves to, decided once per
/// machine (see §4.G / §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RandomResolution {
    /// Neither the machine nor the process had an iterator configured.
    None,
    /// This machine's own iterator, set via [`Machine::set_random_iterator`].
    Own,
    /// The process-wide default installed via
    /// [`crate::random::set_default_iterator`].
    ProcessDefault,
}

impl Machine {
    fn new(program: Arc<Program>) -> Self {
        let count = program.variable_count();
        Self {
            program,
            stack: Vec::new(),
            arena: Arena::new(),
            variables: vec![ValueRef::zero(); count * 2],
            random: None,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            random_resolution: None,
        }
    }

    /// The program this machine was created from.
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn program_arc(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }

    /// Override the per-run instruction budget (default
    /// [`DEFAULT_INSTRUCTION_LIMIT`]).
    pub fn set_instruction_limit(&mut self, limit: u32) {
        self.instruction_limit = limit;
    }

    /// Install (or clear) this machine's own random iterator, consulted by
    /// `Lr` before the process-wide default.
    pub fn set_random_iterator(&mut self, iter: Option<Box<dyn RandomIterator>>) {
        self.random = iter;
    }

    fn variable_count(&self) -> usize {
        self.program.variable_count()
    }

    fn current_range(&self) -> std::ops::Range<usize> {
        0..self.variable_count()
    }

    fn baseline_range(&self) -> std::ops::Range<usize> {
        self.variable_count()..self.variable_count() * 2
    }

    /// Resolve a variable name to its current-slot reference.
    fn slot_of(&self, name: &str) -> Result<u16, DsmError> {
        self.program
            .variable_slot(name)
            .ok_or_else(|| DsmError::UnknownVariable(name.to_string()))
    }

    /// Store `value` in the arena (or return the interned singleton it
    /// simplifies to), honoring the current GC roots.
    pub(crate) fn store(&mut self, value: DsmValue) -> Result<ValueRef, DsmError> {
        let value = value.simplify();
        if let Some(n) = value.int_fast() {
            if interned::lookup(n).is_some() {
                return Ok(ValueRef::Interned(n));
            }
        }
        let index = self
            .arena
            .allocate(&self.stack, &self.variables, &[])
            .ok_or(DsmError::OutOfSpace(InstructionContext { pc: 0, mnemonic: "assign" }))?;
        self.arena.set(index, value);
        Ok(ValueRef::Arena(index))
    }

    /// Resolve a reference to the value it denotes.
    pub(crate) fn resolve(&self, r: ValueRef) -> &DsmValue {
        crate::arena::resolve(r, self.program.constants(), &self.arena)
    }

    /// Assign a host value into a variable's *current* slot. Does not touch
    /// the baseline.
    pub fn assign_variable(&mut self, name: &str, value: impl Into<HostValue>) -> Result<(), DsmError> {
        let slot = self.slot_of(name)?;
        let host_value = value.into();
        let converted = host::convert(&host_value, Some(&format!("variable {name:?}")))?;
        let stored = self.store(converted)?;
        self.variables[slot as usize] = stored;
        Ok(())
    }

    /// The canonical display string of a variable's current value.
    pub fn read_variable(&self, name: &str) -> Result<String, DsmError> {
        let slot = self.slot_of(name)?;
        Ok(self.resolve(self.variables[slot as usize]).as_display_string())
    }

    /// Copy baseline into current, then apply `overrides` to current.
    /// Baseline itself is left untouched. Returns `self` for chaining, per
    /// the embedding surface in §6.
    pub fn reset<I, K, V>(&mut self, overrides: I) -> Result<&mut Self, DsmError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<HostValue>,
    {
        let count = self.variable_count();
        for i in 0..count {
            self.variables[i] = self.variables[count + i];
        }
        for (name, value) in overrides {
            self.assign_variable(name.as_ref(), value)?;
        }
        Ok(self)
    }

    /// Run to completion (or `Xx`), returning the number of instructions
    /// executed.
    pub fn run(&mut self) -> Result<u32, DsmError> {
        let result = crate::interpreter::run(self, None);
        match &result {
            Ok(n) => debug!(instructions_executed = n, "program run completed"),
            Err(e) => debug!(error = %e, "program run failed"),
        }
        result
    }

    /// Run to completion, recording which instructions were reached.
    /// Returns one boolean per instruction, set before that instruction is
    /// dispatched.
    pub fn run_with_coverage(&mut self) -> Result<Vec<bool>, DsmError> {
        let mut coverage = vec![false; self.program.instructions().len()];
        let result = crate::interpreter::run(self, Some(&mut coverage));
        match result {
            Ok(_) => Ok(coverage),
            Err(e) => {
                debug!(error = %e, "coverage run failed");
                Err(e)
            }
        }
    }
}

impl Program {
    /// Build a fresh machine: every slot starts at the interned zero, then
    /// `initial` is applied to the current vector, then current is copied
    /// into baseline (so baseline references become part of the GC root
    /// set from this point on).
    pub fn new_machine<I, K, V>(self: &Arc<Self>, initial: I) -> Result<Machine, DsmError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<HostValue>,
    {
        let mut machine = Machine::new(Arc::clone(self));
        for (name, value) in initial {
            machine.assign_variable(name.as_ref(), value)?;
        }
        let current = machine.current_range();
        let baseline = machine.baseline_range();
        for (c, b) in current.zip(baseline) {
            machine.variables[b] = machine.variables[c];
        }
        Ok(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn program(text: &str) -> Arc<Program> {
        Arc::new(compile(text).unwrap())
    }

    #[test]
    fn new_machine_initializes_and_snapshots_baseline() {
        let p = program("radius|area;3.14;Lv0CpMlLc0MlSt1Xx");
        let machine = p.new_machine([("radius", HostValue::Text("2".to_string()))]).unwrap();
        assert_eq!(machine.read_variable("radius").unwrap(), "2");
        assert_eq!(machine.read_variable("area").unwrap(), "0");
    }

    #[test]
    fn reset_restores_baseline_and_applies_overrides() {
        let p = program("x;;LoSt0Xx");
        let mut machine = p.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
        machine.run().unwrap();
        assert_eq!(machine.read_variable("x").unwrap(), "1");
        machine
            .reset([("x", HostValue::Text("42".to_string()))])
            .unwrap();
        assert_eq!(machine.read_variable("x").unwrap(), "42");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let p = program(";;Xx");
        let mut machine = p.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
        assert!(matches!(
            machine.assign_variable("nope", HostValue::Bool(true)),
            Err(DsmError::UnknownVariable(_))
        ));
        assert!(matches!(machine.read_variable("nope"), Err(DsmError::UnknownVariable(_))));
    }
}
