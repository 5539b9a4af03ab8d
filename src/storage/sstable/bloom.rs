//! Bloom filter
//!
//! A space-efficient probabilistic set membership structure embedded in
//! every SSTable. It can tell you with certainty that a key is **not** in
//! the table (no false negatives) but may occasionally claim a key **is**
//! present when it isn't. Point lookups check the filter before touching the
//! sparse index, so a miss costs no disk I/O at all.

use std::io::{self, Read, Write};

/// A bloom filter backed by a bit vector with `k` independent hash
/// functions, derived via double hashing from two FNV-1a seeds.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the given target
    /// false-positive rate.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(8);

        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        let byte_len = ((m + 7) / 8) as usize;

        Self {
            bits: vec![0u8; byte_len],
            num_bits: m,
            num_hashes: k,
        }
    }

    fn from_raw(bits: Vec<u8>, num_bits: u64, num_hashes: u32) -> Self {
        Self {
            bits,
            num_bits,
            num_hashes,
        }
    }

    /// Inserts a key into the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            self.set_bit(idx);
        }
    }

    /// Returns `true` if the key **might** be present, `false` if it is
    /// **definitely not**.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            if !self.get_bit(idx) {
                return false;
            }
        }
        true
    }

    /// Serialized size in bytes, used to compute section offsets before
    /// writing.
    pub fn serialized_size(&self) -> u64 {
        8 + 4 + 4 + self.bits.len() as u64
    }

    /// Writes `[num_bits: u64][num_hashes: u32][bits_len: u32][bits]`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_hashes.to_le_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        w.write_all(&self.bits)
    }

    /// Reads a filter written by [`Self::write_to`].
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;

        const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;
        if bits_len > MAX_BLOOM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", bits_len),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self::from_raw(bits, num_bits, num_hashes))
    }

    fn hash_pair(key: &[u8]) -> (u64, u64) {
        (
            fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
            fnv1a_64(key, 0x517c_c1b7_2722_0a95),
        )
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    fn set_bit(&mut self, idx: u64) {
        let (byte, bit) = (idx / 8, idx % 8);
        self.bits[byte as usize] |= 1 << bit;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let (byte, bit) = (idx / 8, idx % 8);
        (self.bits[byte as usize] >> bit) & 1 == 1
    }
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
