//! Permanently-live singleton values for the integers in `-9..=9`.
//!
//! These sit outside the arena entirely: the collector never walks them, and
//! "marking" one (the mark phase treats every root uniformly) is a
//! documented no-op rather than a special case the sweep has to detect.

use std::sync::OnceLock;

use crate::consts::{INTERNED_COUNT, INTERNED_MAX, INTERNED_MIN};
use crate::value::DsmValue;

fn table() -> &'static [DsmValue; INTERNED_COUNT] {
    static TABLE: OnceLock<[DsmValue; INTERNED_COUNT]> = OnceLock::new();
    TABLE.get_or_init(|| {
        std::array::from_fn(|i| DsmValue::from_i32(INTERNED_MIN + i as i32))
    })
}

/// Look up the interned value for `digit`, if it is within `-9..=9`.
pub fn lookup(digit: i32) -> Option<&'static DsmValue> {
    if (INTERNED_MIN..=INTERNED_MAX).contains(&digit) {
        Some(&table()[(digit - INTERNED_MIN) as usize])
    } else {
        None
    }
}

/// The interned zero, used to initialize every variable slot.
pub fn zero() -> &'static DsmValue {
    lookup(0).expect("0 is within the interned range")
}

/// The interned one.
pub fn one() -> &'static DsmValue {
    lookup(1).expect("1 is within the interned range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_full_range() {
        for d in INTERNED_MIN..=INTERNED_MAX {
            let v = lookup(d).unwrap();
            assert_eq!(v.int_fast(), Some(d));
        }
    }

    #[test]
    fn out_of_range_is_none() {
        assert!(lookup(INTERNED_MIN - 1).is_none());
        assert!(lookup(INTERNED_MAX + 1).is_none());
    }

    #[test]
    fn zero_display_is_canonical() {
        assert_eq!(zero().as_display_string(), "0");
    }
}
