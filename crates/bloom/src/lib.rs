//! # Bloom Filter
//!
//! A space-efficient probabilistic key filter for the TideLake storage
//! layers.
//!
//! A bloom filter answers "definitely not present" with certainty and
//! "possibly present" with a tunable false-positive rate.
//!
//! ## Usage in TideLake
//!
//! Data files and global-index run files embed a filter built from their
//! keys. Point lookups against the global index consult the filter first;
//! a negative answer skips the run's key index and any disk I/O, which is
//! what keeps steady-state routing cheap when most incoming keys are new.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Hard cap on a deserialized filter (64 MiB of bits). Guards against
/// corrupt length prefixes.
const MAX_FILTER_BLOCKS: usize = 8 * 1024 * 1024;

/// A bloom filter over 64-bit blocks with `k` derived hash probes.
///
/// Probes use double hashing, `h(i) = h1 + i * h2`, with the two base
/// hashes taken from FNV-1a under different seeds.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Bit storage, 64 bits per block.
    blocks: Vec<u64>,
    /// Number of addressable bits.
    num_bits: u64,
    /// Number of probes per key (k).
    num_probes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the given target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or the rate is outside `(0, 1)`.
    #[must_use]
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n ln(p) / ln(2)^2, k = (m/n) ln(2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(64);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        let block_len = ((m + 63) / 64) as usize;
        Self {
            blocks: vec![0u64; block_len],
            num_bits: m,
            num_probes: k,
        }
    }

    /// Inserts a key.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_probes {
            let bit = self.probe(h1, h2, i);
            self.blocks[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// `true` if the key **might** be present; `false` means definitely
    /// absent.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_probes {
            let bit = self.probe(h1, h2, i);
            if self.blocks[(bit / 64) as usize] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    /// Number of addressable bits.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of probes per key.
    #[must_use]
    pub fn num_probes(&self) -> u32 {
        self.num_probes
    }

    /// Serialized size in bytes:
    /// `num_bits(u64) + num_probes(u32) + block_len(u32) + blocks`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + 4 + self.blocks.len() * 8
    }

    /// Writes the filter to `w`.
    ///
    /// Wire format (little-endian):
    /// ```text
    /// [num_bits: u64][num_probes: u32][block_len: u32][blocks: u64 * block_len]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.num_bits)?;
        w.write_u32::<LittleEndian>(self.num_probes)?;
        w.write_u32::<LittleEndian>(self.blocks.len() as u32)?;
        for block in &self.blocks {
            w.write_u64::<LittleEndian>(*block)?;
        }
        Ok(())
    }

    /// Reads a filter written by [`write_to`](BloomFilter::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let num_bits = r.read_u64::<LittleEndian>()?;
        let num_probes = r.read_u32::<LittleEndian>()?;
        let block_len = r.read_u32::<LittleEndian>()? as usize;
        if block_len > MAX_FILTER_BLOCKS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter block count {block_len} exceeds maximum"),
            ));
        }
        if num_bits == 0 || num_bits > (block_len as u64) * 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter bit count inconsistent with storage",
            ));
        }
        let mut blocks = Vec::with_capacity(block_len);
        for _ in 0..block_len {
            blocks.push(r.read_u64::<LittleEndian>()?);
        }
        Ok(Self {
            blocks,
            num_bits,
            num_probes: num_probes.max(1),
        })
    }
}

/// Two FNV-1a hashes of the key under different seeds.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (fnv1a(key, 0xcbf2_9ce4_8422_2325), fnv1a(key, 0x8422_2325_cbf2_9ce4))
}

fn fnv1a(key: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for &b in key {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests;
