//! Property-based tests for the invariants listed in spec §8.

use std::sync::Arc;

use dsm::prelude::*;
use quickcheck_macros::quickcheck;

/// Invariant #1: compiling never panics, only ever succeeds or reports
/// `InvalidProgram`.
#[quickcheck]
fn compile_never_crashes(text: String) -> bool {
    matches!(compile(&text), Ok(_) | Err(DsmError::InvalidProgram(_)) | Err(DsmError::InvalidValue { .. }))
}

/// Invariant #4: the canonical display of an assigned integer is its
/// standard signed-decimal string, for any `n` in `i32`'s range.
#[quickcheck]
fn canonical_display_of_an_integer_round_trips(n: i32) -> bool {
    let program = Arc::new(compile("x;;Xx").unwrap());
    let machine = program.new_machine([("x", HostValue::Int(n as i64))]).unwrap();
    machine.read_variable("x").unwrap() == n.to_string()
}

/// Invariant #6: `x + 0 == x`, `x * 0 == "0"`, `x - x == "0"`, `x * 1 == x`,
/// and `x^2 == x*x`, observed as equal display strings after running each
/// program independently with the same `x`.
#[quickcheck]
fn algebraic_identities_hold(n: i16) -> bool {
    let n = n as i64;

    let add_zero = run_with_x("x|y;;Lv0LzAdSt1Xx", n);
    let mul_zero = run_with_x("x|y;;Lv0LzMlSt1Xx", n);
    let sub_self = run_with_x("x|y;;Lv0Lv0SbSt1Xx", n);
    let mul_one = run_with_x("x|y;;Lv0LoMlSt1Xx", n);
    let square_direct = run_with_x("x|y;;Lv0Lv0MlSt1Xx", n);
    let square_via_power = run_with_x("x|y;;Lv0Lc0PwSt1Xx", n); // constants: "2"

    add_zero == n.to_string()
        && mul_zero == "0"
        && sub_self == "0"
        && mul_one == n.to_string()
        && square_direct == square_via_power
}

fn run_with_x(text_without_constants_marker: &str, x: i64) -> String {
    // `square_via_power` needs a constant table holding `2`; every other
    // program in this test has an empty one, so thread it through a single
    // helper that always supplies it.
    let text = text_without_constants_marker.replacen(";;", ";2;", 1);
    let program = Arc::new(compile(&text).unwrap());
    let mut machine = program.new_machine([("x", HostValue::Int(x))]).unwrap();
    machine.run().unwrap();
    machine.read_variable("y").unwrap()
}
