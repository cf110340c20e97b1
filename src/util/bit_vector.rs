//! Fixed-size bitmap with a cached population count.
//!
//! Each segment that has deletions keeps one [`BitVector`] sized to the
//! segment's `max_doc`, persisted as `<segment>.del`.
//!
//! File layout: `size: i32`, `count: i32`, then `ceil(size / 8)` bytes where
//! bit `i` lives in byte `i >> 3` at mask `1 << (i & 7)`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, StratumError};
use crate::storage::Storage;
use crate::storage::structured::{create_output, open_input};

const UNKNOWN_COUNT: usize = usize::MAX;

/// Number of set bits for every byte value.
const BYTE_COUNTS: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
};

/// A fixed-size bitmap whose set-bit count is cached until the next mutation.
#[derive(Debug)]
pub struct BitVector {
    bits: Vec<u8>,
    size: usize,
    count: AtomicUsize,
}

impl BitVector {
    /// Create a bitmap of `size` cleared bits.
    pub fn new(size: usize) -> Self {
        BitVector {
            bits: vec![0u8; size.div_ceil(8)],
            size,
            count: AtomicUsize::new(0),
        }
    }

    /// Set bit `bit` to one.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= size()`.
    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.size, "bit {bit} out of range 0..{}", self.size);
        self.bits[bit >> 3] |= 1 << (bit & 7);
        *self.count.get_mut() = UNKNOWN_COUNT;
    }

    /// Set bit `bit` to zero.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= size()`.
    pub fn clear(&mut self, bit: usize) {
        assert!(bit < self.size, "bit {bit} out of range 0..{}", self.size);
        self.bits[bit >> 3] &= !(1 << (bit & 7));
        *self.count.get_mut() = UNKNOWN_COUNT;
    }

    /// Returns `true` if bit `bit` is one. Out-of-range bits read as zero.
    pub fn get(&self, bit: usize) -> bool {
        bit < self.size && self.bits[bit >> 3] & (1 << (bit & 7)) != 0
    }

    /// Number of bits, as passed to [`BitVector::new`].
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        let cached = self.count.load(Ordering::Relaxed);
        if cached != UNKNOWN_COUNT {
            return cached;
        }

        let count = self
            .bits
            .iter()
            .map(|&b| BYTE_COUNTS[b as usize] as usize)
            .sum();
        self.count.store(count, Ordering::Relaxed);
        count
    }

    /// Write the bitmap to `name` in `storage`.
    pub fn write(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut output = create_output(storage, name)?;
        output.write_i32(self.size as i32)?;
        output.write_i32(self.count() as i32)?;
        output.write_raw(&self.bits)?;
        output.close()
    }

    /// Read a bitmap previously stored with [`BitVector::write`].
    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut input = open_input(storage, name)?;
        let size = input.read_i32()?;
        let count = input.read_i32()?;
        if size < 0 || count < 0 || count > size {
            return Err(StratumError::corruption(format!(
                "{name}: invalid bit vector header (size {size}, count {count})"
            )));
        }

        let size = size as usize;
        let bits = input.read_raw(size.div_ceil(8))?;
        let vector = BitVector {
            bits,
            size,
            count: AtomicUsize::new(UNKNOWN_COUNT),
        };

        if size % 8 != 0
            && let Some(&last) = vector.bits.last()
            && last >> (size % 8) != 0
        {
            return Err(StratumError::corruption(format!(
                "{name}: bits set past size {size}"
            )));
        }

        let actual = vector.count();
        if actual != count as usize {
            return Err(StratumError::corruption(format!(
                "{name}: header count {count} but {actual} bits set"
            )));
        }
        Ok(vector)
    }
}

impl Clone for BitVector {
    fn clone(&self) -> Self {
        BitVector {
            bits: self.bits.clone(),
            size: self.size,
            count: AtomicUsize::new(self.count.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.bits == other.bits
    }
}

impl Eq for BitVector {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_set_clear_count() {
        let mut bv = BitVector::new(10);
        assert_eq!(bv.count(), 0);

        bv.set(3);
        bv.set(7);
        assert_eq!(bv.count(), 2);
        assert!(bv.get(3));
        assert!(!bv.get(4));

        bv.set(3);
        assert_eq!(bv.count(), 2);

        bv.clear(3);
        assert_eq!(bv.count(), 1);
        assert!(!bv.get(3));
        assert!(!bv.get(100));
    }

    #[test]
    fn test_write_read() {
        let storage = MemoryStorage::new_default();

        let mut bv = BitVector::new(10);
        bv.set(3);
        bv.set(7);
        assert_eq!(bv.count(), 2);
        bv.write(&storage, "_0.del").unwrap();

        // size, count and ceil(10 / 8) bytes
        assert_eq!(storage.file_size("_0.del").unwrap(), 4 + 4 + 2);

        let read = BitVector::read(&storage, "_0.del").unwrap();
        assert_eq!(read.size(), 10);
        assert_eq!(read.count(), 2);
        assert!(read.get(3));
        assert!(!read.get(4));
        assert!(read.get(7));
        assert_eq!(read, bv);
    }

    #[test]
    fn test_exact_byte_multiple() {
        let storage = MemoryStorage::new_default();

        let mut bv = BitVector::new(16);
        for i in (0..16).step_by(3) {
            bv.set(i);
        }
        bv.write(&storage, "x.del").unwrap();
        assert_eq!(storage.file_size("x.del").unwrap(), 4 + 4 + 2);

        let read = BitVector::read(&storage, "x.del").unwrap();
        for i in 0..16 {
            assert_eq!(read.get(i), i % 3 == 0, "bit {i}");
        }
        assert_eq!(read.count(), 6);
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let storage = MemoryStorage::new_default();
        let mut output = create_output(&storage, "bad.del").unwrap();
        output.write_i32(64).unwrap();
        output.write_i32(1).unwrap();
        output.write_raw(&[1]).unwrap();
        output.close().unwrap();

        assert!(BitVector::read(&storage, "bad.del").unwrap_err().is_corruption());
    }

    #[test]
    fn test_count_mismatch_is_corruption() {
        let storage = MemoryStorage::new_default();
        let mut output = create_output(&storage, "lie.del").unwrap();
        output.write_i32(16).unwrap();
        output.write_i32(9).unwrap();
        output.write_raw(&[0b0000_0101, 0]).unwrap();
        output.close().unwrap();

        let err = BitVector::read(&storage, "lie.del").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    #[should_panic]
    fn test_set_out_of_range_panics() {
        let mut bv = BitVector::new(4);
        bv.set(4);
    }
}
