//! DSMAL text → [`Program`] compilation.

use std::collections::HashSet;

use crate::consts::MAX_SLOTS;
use crate::error::DsmError;
use crate::opcode::Opcode;
use crate::program::{Instruction, Program};
use crate::value::DsmValue;

/// Compile DSMAL source into a validated, immutable [`Program`].
///
/// The wire format is `<vars>;<consts>;<insts>`: exactly two top-level
/// semicolons. Any other section count, an unknown mnemonic, an
/// out-of-range slot reference, a duplicate variable name, or a parameter
/// that overflows its limit is reported as [`DsmError::InvalidProgram`].
/// Jump targets are deliberately *not* validated here (see §4.E / §9 of the
/// design): they are checked at run time on every fetch.
pub fn compile(text: &str) -> Result<Program, DsmError> {
    let sections: Vec<&str> = text.split(';').collect();
    if sections.len() != 3 {
        return Err(DsmError::InvalidProgram(format!(
            "expected exactly 2 top-level ';' separators (variables;constants;instructions), found {}",
            sections.len().saturating_sub(1)
        )));
    }
    let (variables_src, constants_src, instructions_src) = (sections[0], sections[1], sections[2]);

    let variable_names = parse_variables(variables_src)?;
    let constants = parse_constants(constants_src)?;

    if instructions_src.is_empty() {
        return Err(DsmError::InvalidProgram("instruction section must not be empty".to_string()));
    }
    let instructions = parse_instructions(instructions_src, variable_names.len(), constants.len())?;

    Ok(Program::new(text.to_string(), variable_names, constants, instructions))
}

fn parse_variables(src: &str) -> Result<Vec<String>, DsmError> {
    if src.is_empty() {
        return Ok(Vec::new());
    }
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for name in src.split('|') {
        if name.is_empty() {
            return Err(DsmError::InvalidProgram("variable name must not be empty".to_string()));
        }
        if !seen.insert(name) {
            return Err(DsmError::InvalidProgram(format!("duplicate variable name {name:?}")));
        }
        names.push(name.to_string());
    }
    if names.len() > MAX_SLOTS {
        return Err(DsmError::InvalidProgram(format!(
            "too many variables: {} exceeds the limit of {MAX_SLOTS}",
            names.len()
        )));
    }
    Ok(names)
}

fn parse_constants(src: &str) -> Result<Vec<DsmValue>, DsmError> {
    if src.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<&str> = src.split('|').collect();
    if entries.len() > MAX_SLOTS {
        return Err(DsmError::InvalidProgram(format!(
            "too many constants: {} exceeds the limit of {MAX_SLOTS}",
            entries.len()
        )));
    }
    entries
        .into_iter()
        .enumerate()
        .map(|(i, literal)| {
            if literal.is_empty() {
                return Err(DsmError::InvalidProgram(format!("invalid constant value \"\" at index {i}")));
            }
            DsmValue::set_from_string(literal, Some(&format!("constant {i}")))
                .map(DsmValue::simplify)
                .map_err(|e| DsmError::InvalidProgram(format!("invalid constant {literal:?} at index {i}: {e}")))
        })
        .collect()
}

fn parse_instructions(src: &str, variable_count: usize, constant_count: usize) -> Result<Vec<Instruction>, DsmError> {
    if !src.is_ascii() {
        return Err(DsmError::InvalidProgram("instruction section must be ASCII".to_string()));
    }
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < bytes.len() {
        if src.len() - i < 2 {
            return Err(DsmError::InvalidProgram(format!("truncated instruction at offset {i}")));
        }
        let mnemonic = &src[i..i + 2];
        let opcode = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| DsmError::InvalidProgram(format!("unknown instruction {mnemonic:?} at offset {i}")))?;
        i += 2;

        let param = if opcode.has_param() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(DsmError::InvalidProgram(format!(
                    "{} requires an unsigned parameter at offset {start}",
                    opcode.mnemonic()
                )));
            }
            let digits = &src[start..i];
            let value: u32 = digits
                .parse()
                .map_err(|_| DsmError::InvalidProgram(format!("parameter {digits:?} is not a valid number")))?;
            if value > u16::MAX as u32 {
                return Err(DsmError::InvalidProgram(format!(
                    "parameter {value} exceeds the maximum of {}",
                    u16::MAX
                )));
            }
            value as u16
        } else {
            0
        };

        match opcode {
            Opcode::LoadConstant if (param as usize) >= constant_count => {
                return Err(DsmError::InvalidProgram(format!(
                    "Lc{param} references nonexistent constant slot {param}"
                )));
            }
            Opcode::LoadVariable | Opcode::Store if (param as usize) >= variable_count => {
                return Err(DsmError::InvalidProgram(format!(
                    "{}{param} references nonexistent variable slot {param}",
                    opcode.mnemonic()
                )));
            }
            _ => {}
        }

        out.push(Instruction { opcode, param });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_program_compiles() {
        let program = compile(";;Xx").unwrap();
        assert_eq!(program.variables().len(), 0);
        assert_eq!(program.constants().len(), 0);
        assert_eq!(program.instructions().len(), 1);
    }

    #[test]
    fn wrong_section_count_is_invalid_program() {
        assert!(matches!(compile(";;;Xx"), Err(DsmError::InvalidProgram(_))));
        assert!(matches!(compile("Xx"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn empty_instruction_section_is_rejected() {
        assert!(matches!(compile(";;"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn duplicate_variable_name_is_rejected() {
        assert!(matches!(compile("a|a;;Xx"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        assert!(matches!(compile(";;Zz"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn out_of_range_variable_slot_is_rejected_at_compile_time() {
        // Canonical example from the design doc: referencing a variable
        // slot when none exist.
        assert!(matches!(compile(";;Lv0Xx"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn out_of_range_constant_slot_is_rejected() {
        assert!(matches!(compile(";;Lc0Xx"), Err(DsmError::InvalidProgram(_))));
    }

    #[test]
    fn jump_targets_are_not_bounds_checked_at_compile_time() {
        // A jump past the end of the program compiles fine; only `run`
        // detects the invalid target.
        assert!(compile(";;Ju9999Xx").is_ok());
    }

    #[test]
    fn area_of_circle_program_compiles() {
        let program = compile("radius|area;3.14;Lv0CpMlLc0MlSt1Xx").unwrap();
        assert_eq!(program.variables(), ["radius".to_string(), "area".to_string()]);
        assert_eq!(program.constants().len(), 1);
        assert_eq!(program.instructions().len(), 6);
    }

    #[test]
    fn parameter_overflow_is_rejected() {
        assert!(matches!(compile(";;Ju99999Xx"), Err(DsmError::InvalidProgram(_))));
    }
}
