//! Fixed-width packed integer storage.
//!
//! Values are packed into 64-bit longs, low bits first, and never straddle
//! two longs. That is the layout of the long arrays stored on disk, so
//! converting to and from the disk form is a plain copy at matching widths.
//! Each long is kept as two 32-bit words (low word first).

/// A packed array of `capacity` unsigned values, each `bits_per_value` wide.
///
/// A width of 0 stores nothing: every value reads as 0 and writes are
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    data: Vec<u32>,
    capacity: usize,
    bits_per_value: u32,
    values_per_long: usize,
    value_mask: u32,
}

impl BitArray {
    /// Zero-filled array.
    ///
    /// # Panics
    /// If `bits_per_value` exceeds 32.
    pub fn new(bits_per_value: u32, capacity: usize) -> Self {
        assert!(
            bits_per_value <= 32,
            "bits per value must be at most 32, got {bits_per_value}"
        );
        let values_per_long = if bits_per_value == 0 {
            0
        } else {
            64 / bits_per_value as usize
        };
        let longs = if bits_per_value == 0 {
            0
        } else {
            capacity.div_ceil(values_per_long)
        };
        let value_mask = if bits_per_value == 32 {
            u32::MAX
        } else {
            (1u32 << bits_per_value) - 1
        };
        Self {
            data: vec![0; longs * 2],
            capacity,
            bits_per_value,
            values_per_long,
            value_mask,
        }
    }

    /// Unpacks disk/wire longs. Missing longs read as zero; surplus longs are
    /// ignored.
    pub fn from_long_array(longs: &[i64], bits_per_value: u32, capacity: usize) -> Self {
        let mut array = Self::new(bits_per_value, capacity);
        let count = array.long_count().min(longs.len());
        for (i, &long) in longs.iter().take(count).enumerate() {
            array.set_long(i, long as u64);
        }
        array
    }

    /// Packs the values into longs at `bits_per_value`, re-encoding first if
    /// that differs from the current width.
    pub fn to_long_array(&self, bits_per_value: u32) -> Vec<i64> {
        if bits_per_value != self.bits_per_value {
            let mut resized = self.clone();
            resized.resize(bits_per_value);
            return resized.to_long_array(bits_per_value);
        }
        (0..self.long_count()).map(|i| self.long(i) as i64).collect()
    }

    /// Unpacks a nibble array (two 4-bit values per byte, even index in the
    /// low nibble), the on-disk light layout.
    pub fn from_nibbles(bytes: &[u8]) -> Self {
        let mut array = Self::new(4, bytes.len() * 2);
        for (i, &byte) in bytes.iter().enumerate() {
            array.set(i * 2, u32::from(byte & 0x0f));
            array.set(i * 2 + 1, u32::from(byte >> 4));
        }
        array
    }

    /// Inverse of [`BitArray::from_nibbles`]. Values wider than 4 bits are
    /// truncated.
    pub fn to_nibbles(&self) -> Vec<u8> {
        (0..self.capacity.div_ceil(2))
            .map(|i| {
                let low = self.get(i * 2) & 0x0f;
                let high = if i * 2 + 1 < self.capacity {
                    self.get(i * 2 + 1) & 0x0f
                } else {
                    0
                };
                (low | (high << 4)) as u8
            })
            .collect()
    }

    pub fn bits_per_value(&self) -> u32 {
        self.bits_per_value
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values_per_long(&self) -> usize {
        self.values_per_long
    }

    pub fn value_mask(&self) -> u32 {
        self.value_mask
    }

    fn long_count(&self) -> usize {
        self.data.len() / 2
    }

    #[inline]
    fn long(&self, i: usize) -> u64 {
        (u64::from(self.data[i * 2 + 1]) << 32) | u64::from(self.data[i * 2])
    }

    #[inline]
    fn set_long(&mut self, i: usize, value: u64) {
        self.data[i * 2] = value as u32;
        self.data[i * 2 + 1] = (value >> 32) as u32;
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        assert!(
            index < self.capacity,
            "index {index} out of bounds for capacity {}",
            self.capacity
        );
        if self.bits_per_value == 0 {
            return 0;
        }
        let long_index = index / self.values_per_long;
        let shift = (index % self.values_per_long) * self.bits_per_value as usize;
        (self.long(long_index) >> shift) as u32 & self.value_mask
    }

    /// Stores `value & value_mask`; bits above the width are dropped.
    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        assert!(
            index < self.capacity,
            "index {index} out of bounds for capacity {}",
            self.capacity
        );
        if self.bits_per_value == 0 {
            return;
        }
        let long_index = index / self.values_per_long;
        let shift = (index % self.values_per_long) * self.bits_per_value as usize;
        let mask = u64::from(self.value_mask) << shift;
        let value = u64::from(value & self.value_mask) << shift;
        let long = (self.long(long_index) & !mask) | value;
        self.set_long(long_index, long);
    }

    /// Re-encodes every value at a new width. Shrinking below the width the
    /// stored values need truncates them; callers only ever grow.
    pub fn resize(&mut self, bits_per_value: u32) {
        if bits_per_value == self.bits_per_value {
            return;
        }
        let mut resized = Self::new(bits_per_value, self.capacity);
        for i in 0..self.capacity {
            resized.set(i, self.get(i));
        }
        *self = resized;
    }

    /// Changes the value count, keeping the existing prefix and zero-filling
    /// any new tail.
    pub fn resize_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        let mut resized = Self::new(self.bits_per_value, capacity);
        for i in 0..self.capacity.min(capacity) {
            resized.set(i, self.get(i));
        }
        *self = resized;
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.capacity).map(|i| self.get(i))
    }
}
