//! Injected source of random values for the `Lr` instruction.
//!
//! §1 treats the random source as an external collaborator; §9 leaves the
//! process-wide fallback (`dsm.random_number_iterator` in the reference
//! implementation) as an open question, to be either omitted or documented
//! explicitly. This port keeps it, as a single documented lookup site, so
//! embedders that don't wire a per-machine iterator still get the
//! reference's fallback behavior rather than a silently missing feature.

use std::sync::Mutex;

use crate::host::HostValue;

/// A source of host values for `Lr`. `next_value` returning `None` signals
/// end-of-sequence, which the interpreter surfaces as
/// [`crate::error::DsmError::RandomExhausted`].
pub trait RandomIterator: Send {
    /// Produce the next random value, or `None` if the sequence is exhausted.
    fn next_value(&mut self) -> Option<HostValue>;
}

static DEFAULT_ITERATOR: Mutex<Option<Box<dyn RandomIterator>>> = Mutex::new(None);

/// Install (or clear, with `None`) the process-wide default random
/// iterator consulted by machines that have no iterator of their own.
pub fn set_default_iterator(iter: Option<Box<dyn RandomIterator>>) {
    *DEFAULT_ITERATOR.lock().expect("default iterator mutex poisoned") = iter;
}

/// True if a process-wide default iterator is currently installed.
pub fn has_default() -> bool {
    DEFAULT_ITERATOR.lock().expect("default iterator mutex poisoned").is_some()
}

/// Pull the next value from the process-wide default iterator, if one is
/// installed.
pub fn next_from_default() -> Option<HostValue> {
    DEFAULT_ITERATOR
        .lock()
        .expect("default iterator mutex poisoned")
        .as_mut()
        .and_then(RandomIterator::next_value)
}
