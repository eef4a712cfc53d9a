//! Atomic allocation counter

use std::sync::atomic::{AtomicU32, Ordering};

/// Device-visible counter supporting atomic fetch-and-increment.
///
/// Every `increment` returns a distinct previous value, so invocations racing
/// on the counter receive a dense, strictly increasing sequence of slots.
#[derive(Debug)]
pub struct AtomicCounter {
    label: &'static str,
    value: AtomicU32,
}

impl AtomicCounter {
    pub fn new(label: &'static str) -> Self {
        Self { label, value: AtomicU32::new(0) }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Reset the counter (host side, between dispatches)
    pub fn set_value(&self, value: u32) {
        self.value.store(value, Ordering::Release);
    }

    /// Read back the counter (host side, after a dispatch)
    pub fn get_value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Claim the next slot; returns the value before the increment
    #[inline]
    pub fn increment(&self) -> u32 {
        self.value.fetch_add(1, Ordering::AcqRel)
    }
}
