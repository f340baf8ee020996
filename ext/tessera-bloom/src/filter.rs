//! Bloom filter over MurmurHash2.
//!
//! Each key sets one bit per seed: `murmurhash2(key, seed) % bit_count`.
//! Bit `i` lives in byte `i / 8` at position `i % 8`. The seed list is part
//! of the serialized format and must never change.

use tessera_core::{ExtError, ExtResult};
use tessera_hash::murmurhash2;

/// Seeds for the per-key hash functions.
pub const SEEDS: [u32; 10] = [0, 1337, 37, 0xabcd, 0xdead, 0xface, 97, 0xed11, 0xcad9, 0x827b];

#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Creates a zeroed filter of `size_bytes * 8` bits.
    pub fn new(size_bytes: usize) -> ExtResult<Self> {
        if size_bytes == 0 {
            return Err(ExtError::Validation(
                "bloom filter size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            bits: vec![0u8; size_bytes],
        })
    }

    /// Rebuilds a filter from a buffer produced by `to_buffer`.
    pub fn from_buffer(buf: &[u8]) -> ExtResult<Self> {
        if buf.is_empty() {
            return Err(ExtError::Validation("bloom filter buffer is empty".to_string()));
        }
        Ok(Self { bits: buf.to_vec() })
    }

    pub fn size_bytes(&self) -> usize {
        self.bits.len()
    }

    pub fn bit_count(&self) -> u64 {
        self.bits.len() as u64 * 8
    }

    pub fn add(&mut self, key: &[u8]) {
        for seed in SEEDS {
            let bit = self.bit_index(key, seed);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    pub fn add_all<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        for key in keys {
            self.add(key.as_ref());
        }
    }

    /// `false` means the key was definitely never added.
    pub fn contains(&self, key: &[u8]) -> bool {
        SEEDS.iter().all(|&seed| {
            let bit = self.bit_index(key, seed);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn to_buffer(&self) -> Vec<u8> {
        self.bits.clone()
    }

    /// Optimal bit count for `n` items at false-positive rate `p`:
    /// `ceil(n * ln(p) / ln(1 / 2^ln(2)))`.
    pub fn calculate_size(n: f64, p: f64) -> ExtResult<u64> {
        if !(n >= 0.0) || !n.is_finite() {
            return Err(ExtError::Validation(format!("item count must be non-negative, got {}", n)));
        }
        if !(p > 0.0 && p < 1.0) {
            return Err(ExtError::Validation(format!(
                "false positive rate must be in (0, 1), got {}",
                p
            )));
        }
        let denom = (1.0 / 2.0_f64.powf(2.0_f64.ln())).ln();
        let m = ((n * p.ln()) / denom).ceil();
        Ok(m as u64)
    }

    fn bit_index(&self, key: &[u8], seed: u32) -> u64 {
        murmurhash2(key, seed) as u64 % self.bit_count()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ones: u32 = self.bits.iter().map(|b| b.count_ones()).sum();
        f.debug_struct("BloomFilter")
            .field("size_bytes", &self.bits.len())
            .field("bits_set", &ones)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let bf = BloomFilter::new(16).unwrap();
        assert_eq!(bf.size_bytes(), 16);
        assert_eq!(bf.bit_count(), 128);
        assert!(bf.as_bytes().iter().all(|b| *b == 0));
        assert!(!bf.contains(b"anything"));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(BloomFilter::new(0), Err(ExtError::Validation(_))));
        assert!(matches!(BloomFilter::from_buffer(&[]), Err(ExtError::Validation(_))));
    }

    #[test]
    fn test_small_filter_scenario() {
        let mut bf = BloomFilter::new(1024).unwrap();
        bf.add_all(["a", "b", "c"]);
        assert!(bf.contains(b"a"));
        assert!(bf.contains(b"b"));
        assert!(bf.contains(b"c"));
        assert!(!bf.contains(b"z"));
    }

    #[test]
    fn test_no_false_negatives() {
        for size in [1usize, 7, 64, 1000] {
            let mut bf = BloomFilter::new(size).unwrap();
            let keys: Vec<String> = (0..200).map(|i| format!("key-{}", i)).collect();
            bf.add_all(&keys);
            for key in &keys {
                assert!(bf.contains(key.as_bytes()), "missing {} at size {}", key, size);
            }
        }
    }

    #[test]
    fn test_buffer_round_trip() {
        let mut bf = BloomFilter::new(256).unwrap();
        bf.add_all(["alpha", "beta", "gamma"]);
        let buf = bf.to_buffer();
        assert_eq!(buf.len(), 256);

        let restored = BloomFilter::from_buffer(&buf).unwrap();
        assert_eq!(restored, bf);
        for key in ["alpha", "beta", "gamma", "delta"] {
            assert_eq!(restored.contains(key.as_bytes()), bf.contains(key.as_bytes()));
        }
    }

    #[test]
    fn test_one_bit_per_seed_at_most() {
        let mut bf = BloomFilter::new(4096).unwrap();
        bf.add(b"x");
        let ones: u32 = bf.as_bytes().iter().map(|b| b.count_ones()).sum();
        assert!(ones >= 1 && ones <= SEEDS.len() as u32);
    }

    #[test]
    fn test_calculate_size_monotonic() {
        let mut prev = 0;
        for n in [0.0, 1.0, 10.0, 100.0, 1000.0, 10000.0] {
            let m = BloomFilter::calculate_size(n, 0.01).unwrap();
            assert!(m >= prev);
            prev = m;
        }

        let mut prev = 0;
        for p in [0.5, 0.1, 0.01, 0.001, 0.0001] {
            let m = BloomFilter::calculate_size(1000.0, p).unwrap();
            assert!(m >= prev);
            prev = m;
        }
    }

    #[test]
    fn test_calculate_size_known_value() {
        // 1000 items at 1% needs about 9.6 bits per item.
        assert_eq!(BloomFilter::calculate_size(1000.0, 0.01).unwrap(), 9586);
    }

    #[test]
    fn test_calculate_size_rejects_bad_input() {
        assert!(BloomFilter::calculate_size(10.0, 0.0).is_err());
        assert!(BloomFilter::calculate_size(10.0, 1.0).is_err());
        assert!(BloomFilter::calculate_size(-1.0, 0.1).is_err());
        assert!(BloomFilter::calculate_size(f64::NAN, 0.1).is_err());
    }
}
