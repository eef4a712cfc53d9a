//! Device storage buffers
//!
//! A `StorageBuffer` is a fixed array of 32-bit words that every invocation of
//! a dispatch may read and write concurrently. Kernels never see the whole
//! buffer: they get a `BufferRange`, the equivalent of binding a sub-range of a
//! GPU buffer. Accesses outside the bound range behave like robust buffer
//! access on a GPU: loads return 0 and stores are discarded.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::{Error, Result};

/// Fixed-length array of device words
pub struct StorageBuffer {
    label: String,
    words: Box<[AtomicU32]>,
}

impl StorageBuffer {
    /// Allocate a zeroed buffer of `len` words
    pub fn new(label: &str, len: usize) -> Self {
        Self {
            label: label.to_string(),
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Allocate a buffer holding a copy of `data`
    pub fn from_words(label: &str, data: &[u32]) -> Self {
        Self {
            label: label.to_string(),
            words: data.iter().map(|&w| AtomicU32::new(w)).collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Length in words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Length in bytes
    pub fn byte_len(&self) -> u64 {
        self.words.len() as u64 * 4
    }

    /// Upload `data` starting at word `offset`
    pub fn write(&self, offset: usize, data: &[u32]) -> Result<()> {
        let end = offset.checked_add(data.len()).filter(|&end| end <= self.len());
        let Some(end) = end else {
            return Err(Error::Capacity {
                required: (offset as u64).saturating_add(data.len() as u64).saturating_mul(4),
                available: self.byte_len(),
            });
        };
        for (slot, &word) in self.words[offset..end].iter().zip(data) {
            slot.store(word, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Download `len` words starting at word `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u32>> {
        let end = offset.checked_add(len).filter(|&end| end <= self.len());
        let Some(end) = end else {
            return Err(Error::Capacity {
                required: (offset as u64).saturating_add(len as u64).saturating_mul(4),
                available: self.byte_len(),
            });
        };
        Ok(self.words[offset..end].iter().map(|w| w.load(Ordering::Relaxed)).collect())
    }

    /// Download the whole buffer
    pub fn to_vec(&self) -> Vec<u32> {
        self.words.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }

    /// Bind `len` words starting at word `offset`.
    /// Returns None when the range does not fit the buffer.
    pub fn range(&self, offset: usize, len: usize) -> Option<BufferRange<'_>> {
        let end = offset.checked_add(len)?;
        (end <= self.len()).then_some(BufferRange { buffer: self, offset, len })
    }

    /// Bind the whole buffer
    pub fn full_range(&self) -> BufferRange<'_> {
        BufferRange { buffer: self, offset: 0, len: self.len() }
    }
}

impl std::fmt::Debug for StorageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBuffer")
            .field("label", &self.label)
            .field("len", &self.words.len())
            .finish()
    }
}

/// A bound sub-range of a storage buffer, indexed from 0
#[derive(Clone, Copy)]
pub struct BufferRange<'a> {
    buffer: &'a StorageBuffer,
    offset: usize,
    len: usize,
}

impl<'a> BufferRange<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Word offset of this range inside its buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    fn slot(&self, index: usize) -> Option<&'a AtomicU32> {
        if index < self.len {
            self.buffer.words.get(self.offset + index)
        } else {
            None
        }
    }

    /// Load a word; 0 outside the range
    #[inline]
    pub fn load(&self, index: usize) -> u32 {
        self.slot(index).map_or(0, |w| w.load(Ordering::Relaxed))
    }

    /// Store a word; returns false if the store fell outside the range
    #[inline]
    pub fn store(&self, index: usize, value: u32) -> bool {
        match self.slot(index) {
            Some(w) => {
                w.store(value, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Atomic OR; returns false if the access fell outside the range
    #[inline]
    pub fn fetch_or(&self, index: usize, bits: u32) -> bool {
        match self.slot(index) {
            Some(w) => {
                w.fetch_or(bits, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let buffer = StorageBuffer::new("test", 16);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.byte_len(), 64);
        assert!(buffer.to_vec().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_write_read() {
        let buffer = StorageBuffer::new("test", 8);
        buffer.write(2, &[7, 8, 9]).unwrap();
        assert_eq!(buffer.read(1, 4).unwrap(), vec![0, 7, 8, 9]);
        assert!(matches!(buffer.write(6, &[1, 2, 3]), Err(Error::Capacity { .. })));
        assert!(buffer.read(4, 5).is_err());
    }

    #[test]
    fn test_range_is_relative_and_robust() {
        let buffer = StorageBuffer::from_words("test", &[1, 2, 3, 4, 5, 6]);
        let range = buffer.range(2, 3).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range.offset(), 2);
        assert_eq!(range.load(0), 3);
        assert_eq!(range.load(3), 0); // outside the binding
        assert!(range.store(1, 40));
        assert!(!range.store(3, 99));
        assert!(range.fetch_or(2, 0x80));
        assert_eq!(buffer.to_vec(), vec![1, 2, 3, 40, 0x85, 6]);

        assert!(buffer.range(4, 3).is_none());
        assert!(buffer.range(usize::MAX, 2).is_none());
    }
}
