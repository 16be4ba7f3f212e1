use murmur3::murmur3_x64_128;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::io::Cursor;

/// A seeded family of independent hash functions plus a fingerprint digest.
///
/// Every lookup hash `i` is a full murmur3 x64/128 pass over the key seeded
/// with `seed + i`, so the digests do not share structure the way double
/// hashing (`h1 + i * h2`) does. The fingerprint uses seed
/// `seed + num_hashes + 1`, outside the range used by the lookup hashes.
///
/// Seeds belong to the instance: two families with different seeds address
/// the same key independently, and a fixed seed gives reproducible layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFamily {
    num_hashes: usize,
    seed: u32,
}

impl HashFamily {
    pub fn new(num_hashes: usize, seed: u32) -> Self {
        Self { num_hashes, seed }
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// `num_hashes` deterministic 64-bit digests of `key`.
    pub fn hashes<K: Hash + ?Sized>(&self, key: &K) -> Vec<u64> {
        let bytes = key_bytes(key);
        (0..self.num_hashes)
            .map(|i| hash_murmur64(&bytes, self.seed.wrapping_add(i as u32)))
            .collect()
    }

    /// Digests reduced to indices in `[0, modulus)`.
    pub fn indices<K: Hash + ?Sized>(
        &self,
        key: &K,
        modulus: usize,
    ) -> Vec<usize> {
        debug_assert!(modulus > 0, "modulus must be non-zero");
        self.hashes(key)
            .into_iter()
            .map(|h| (h % modulus as u64) as usize)
            .collect()
    }

    /// Fingerprint of `key` truncated to the low `bits` bits (`1..=64`).
    pub fn fingerprint<K: Hash + ?Sized>(&self, key: &K, bits: u8) -> u64 {
        let bytes = key_bytes(key);
        let seed = self.seed.wrapping_add(self.num_hashes as u32 + 1);
        hash_murmur64(&bytes, seed) & fingerprint_mask(bits)
    }
}

pub(crate) fn fingerprint_mask(bits: u8) -> u64 {
    debug_assert!((1..=64).contains(&bits));
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub(crate) fn hash_murmur64(key: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(key);
    murmur3_x64_128(&mut cursor, seed)
        .expect("Failed to compute Murmur3 hash") as u64
}

/// Collects the byte stream a `Hash` impl feeds to its hasher, so any
/// hashable flow key can be run through murmur3 with an arbitrary seed.
#[derive(Default)]
struct KeyBytes(Vec<u8>);

impl Hasher for KeyBytes {
    fn write(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        0
    }
}

pub(crate) fn key_bytes<K: Hash + ?Sized>(key: &K) -> Vec<u8> {
    let mut sink = KeyBytes::default();
    key.hash(&mut sink);
    sink.0
}

/// Number of cells for `n` entries at target false positive rate `fpr`.
pub fn optimal_num_cells(n: usize, fpr: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    ((-(n as f64) * fpr.ln()) / (ln2 * ln2)).ceil() as usize
}

pub fn optimal_num_hashes(n: usize, m: usize) -> usize {
    (((m as f64 / n as f64) * std::f64::consts::LN_2).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_deterministic() {
        let family = HashFamily::new(4, 0);
        assert_eq!(family.hashes("hello_world").len(), 4);
        assert_eq!(family.hashes("hello_world"), family.hashes("hello_world"));
        assert_ne!(family.hashes("val1"), family.hashes("val2"));
    }

    #[test]
    fn test_seeds_are_per_instance() {
        let a = HashFamily::new(3, 0);
        let b = HashFamily::new(3, 7);
        assert_ne!(a.hashes(&42u64), b.hashes(&42u64));
        assert_eq!(a.hashes(&42u64), HashFamily::new(3, 0).hashes(&42u64));
    }

    #[test]
    fn test_digests_differ_within_family() {
        let family = HashFamily::new(8, 11);
        let digests = family.hashes(&(1u32, "State 1"));
        let mut unique = digests.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), digests.len());
    }

    #[test]
    fn test_indices_in_range() {
        let family = HashFamily::new(5, 3);
        for key in 0..500u32 {
            assert!(family.indices(&key, 17).iter().all(|&i| i < 17));
        }
    }

    #[test]
    fn test_fingerprint_width() {
        let family = HashFamily::new(4, 0);
        for key in 0..1000u32 {
            assert!(family.fingerprint(&key, 3) < 8);
            assert!(family.fingerprint(&key, 10) < 1024);
        }
        // Full width keeps the whole digest.
        let full = family.fingerprint(&99u32, 64);
        assert_eq!(full & fingerprint_mask(16), family.fingerprint(&99u32, 16));
    }

    #[test]
    fn test_fingerprint_uses_separate_seed() {
        let family = HashFamily::new(2, 0);
        let key = 1234u64;
        let lookup = family.hashes(&key);
        let fp = family.fingerprint(&key, 64);
        assert!(!lookup.contains(&fp));
    }

    #[test]
    fn test_sizing_helpers() {
        let m = optimal_num_cells(1000, 0.01);
        assert!((9000..10000).contains(&m));
        assert_eq!(optimal_num_hashes(1000, m), 7);
        assert_eq!(optimal_num_hashes(1000, 10), 1);
    }
}
