//! End-to-end scenarios drawn from the reference's scenario table: compile a
//! whole DSMAL program, run it, and inspect the resulting variable state or
//! error.

use std::sync::Arc;

use dsm::prelude::*;
use pretty_assertions::assert_eq;

fn compile_and_run<const N: usize>(text: &str, initial: [(&str, HostValue); N]) -> Result<Machine, DsmError> {
    let program = Arc::new(compile(text)?);
    let mut machine = program.new_machine(initial)?;
    machine.run()?;
    Ok(machine)
}

#[test]
fn halt_only_program_runs_once() {
    let program = Arc::new(compile(";;Xx").unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    assert_eq!(machine.run().unwrap(), 1);
}

#[test]
fn area_of_circle() {
    let machine = compile_and_run(
        "radius|area;3.14;Lv0CpMlLc0MlSt1Xx",
        [("radius", HostValue::Text("2".to_string()))],
    )
    .unwrap();
    assert_eq!(machine.read_variable("area").unwrap(), "12.56");
}

#[test]
fn referencing_a_nonexistent_variable_slot_is_caught_at_compile_time() {
    // The canonical corrected form of the reference's scenario #3: no
    // variables are declared, so `Lv0` has nothing to reference.
    assert!(matches!(compile(";;Lv0Xx"), Err(DsmError::InvalidProgram(_))));
}

#[test]
fn repeated_addition_counts_every_instruction() {
    let program = Arc::new(compile(";;LoLoAdXx").unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    assert_eq!(machine.run().unwrap(), 4);
}

#[test]
fn division_by_zero_names_the_offending_instruction() {
    let program = Arc::new(compile(";;LoLzDvXx").unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    match machine.run() {
        Err(DsmError::DivisionByZero(ctx)) => assert_eq!(ctx.mnemonic, "Dv"),
        other => panic!("expected DivisionByZero, got {other:?}"),
    }
}

#[test]
fn instruction_limit_below_requirement_aborts_the_run() {
    // Three multiplications of a constant against itself: needs 4 ticks
    // (Lc0, Ml, Ml, St0) before Xx even runs.
    let program = Arc::new(compile("r;10;Lc0Lc0MlLc0MlSt0Xx").unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    machine.set_instruction_limit(3);
    assert!(matches!(machine.run(), Err(DsmError::InstructionLimitExceeded(_))));
}

#[test]
fn reset_reapplies_the_baseline_before_overrides() {
    let program = Arc::new(compile("x;;Lv0Lv0AdSt0Xx").unwrap());
    let mut machine = program.new_machine([("x", HostValue::Int(5))]).unwrap();
    machine.run().unwrap();
    assert_eq!(machine.read_variable("x").unwrap(), "10");

    machine.reset(std::iter::empty::<(&str, HostValue)>()).unwrap();
    assert_eq!(machine.read_variable("x").unwrap(), "5");

    machine.reset([("x", HostValue::Int(100))]).unwrap();
    assert_eq!(machine.read_variable("x").unwrap(), "100");
}

#[test]
fn run_with_coverage_marks_only_the_taken_branch() {
    // n|f;; Lv0(0) Jn5(1) Lz(2) St1(3) Ju7(4) Lo(5) St1(6) Xx(7)
    let program = Arc::new(compile("n|f;;Lv0Jn5LzSt1Ju7LoSt1Xx").unwrap());
    let mut machine = program.new_machine([("n", HostValue::Int(0))]).unwrap();
    let coverage = machine.run_with_coverage().unwrap();
    assert_eq!(coverage, vec![true, true, true, true, true, false, false, true]);
    assert_eq!(machine.read_variable("f").unwrap(), "0");
}

#[test]
fn large_decimal_literal_arithmetic_stays_exact() {
    let machine = compile_and_run(
        "x|y;0.0000000000000000000000001;Lv0Lc0AdSt1Xx",
        [("x", HostValue::Text("3".to_string()))],
    )
    .unwrap();
    assert_eq!(machine.read_variable("y").unwrap(), "3.0000000000000000000000001");
}

#[test]
fn gc_reclaims_dead_values_within_capacity() {
    // Each iteration computes a fresh non-interned decimal (1.1 + 1.1) and
    // immediately lets it go dead by overwriting the same variable, so the
    // arena must reclaim behind the scenes to keep up. Iterating well past
    // `ARENA_CAPACITY` without ever holding more than one live value at a
    // time must still succeed.
    let mut text = "x;1.1;".to_string();
    for _ in 0..(dsm::consts::ARENA_CAPACITY * 4) {
        text.push_str("Lc0Lc0AdSt0");
    }
    text.push_str("Xx");
    let program = Arc::new(compile(&text).unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    machine.set_instruction_limit((dsm::consts::ARENA_CAPACITY as u32) * 4 + 16);
    machine.run().unwrap();
    assert_eq!(machine.read_variable("x").unwrap(), "2.2");
}

#[test]
fn exceeding_arena_capacity_with_everything_live_is_out_of_space() {
    // One variable per arena slot, each holding a distinct live non-interned
    // decimal for the whole run: once the count exceeds `ARENA_CAPACITY`
    // there is nothing left for the collector to reclaim.
    let capacity = dsm::consts::ARENA_CAPACITY;
    let within = build_live_allocation_program(capacity);
    let program = Arc::new(compile(&within).unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    machine.set_instruction_limit(u32::MAX);
    assert!(machine.run().is_ok());

    let beyond = build_live_allocation_program(capacity + 1);
    let program = Arc::new(compile(&beyond).unwrap());
    let mut machine = program.new_machine(std::iter::empty::<(&str, HostValue)>()).unwrap();
    machine.set_instruction_limit(u32::MAX);
    assert!(matches!(machine.run(), Err(DsmError::OutOfSpace(_))));
}

fn build_live_allocation_program(variable_count: usize) -> String {
    let variables: Vec<String> = (0..variable_count).map(|i| format!("v{i}")).collect();
    let mut text = format!("{};1.1;", variables.join("|"));
    for i in 0..variable_count {
        text.push_str(&format!("Lc0Lc0AdSt{i}"));
    }
    text.push_str("Xx");
    text
}
