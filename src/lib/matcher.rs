//! Construction of the mismatch-tolerant lookup structure used for matching.
//!
//! Every observable `(index1, index2)` pair within the configured Hamming distance of
//! some sample's expected barcodes is precomputed: the two barcodes are expanded
//! independently into their Hamming balls, cross-multiplied, hashed, and inserted into
//! a map from 64-bit hash to sample ordinal.  Lookup hashes the raw observed pair and
//! does a single exact probe, so all fuzziness is paid for once at build time.

use std::hash::Hasher;

use ahash::{AHashMap, AHasher};
use itertools::Itertools;
use thiserror::Error;

use crate::sample_metadata::SampleMetadata;

/// The bases substituted during expansion.
const ALLOWED_BASES: &[u8] = &[b'A', b'C', b'T', b'G'];

/// The largest supported mismatch bound.  The expansion set grows combinatorially with
/// barcode length and mismatch count, so larger bounds are rejected outright.
pub const MAX_MISMATCHES: usize = 3;

/// The mismatch bound at or below which the lookup map is left unsized.  Above it the
/// map is pre-sized from the anticipated key-space to avoid rehashing during the build.
const PRESIZE_MISMATCH_THRESHOLD: usize = 1;

/// The name given to the "undetermined" sample.
pub const UNDETERMINED_NAME: &str = "Undetermined";

/// Fixed hasher keys so that the barcode hash is stable within a process.
const HASH_KEY_LO: u128 = 0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c834;
const HASH_KEY_HI: u128 = 0x1f83_d9ab_fb41_bd6b_5be0_cd19_137e_2179;

/// The error that may occur when building a [`SearchIndex`].
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Mismatch bound {given} exceeds the maximum of {MAX_MISMATCHES}")]
    MismatchBoundTooLarge { given: usize },

    #[error(
        "Ambiguous barcode assignment: samples `{sample_a}` and `{sample_b}` share an \
         observable index pair within the allowed mismatches"
    )]
    AmbiguousBarcodes { sample_a: String, sample_b: String },
}

/// Hash an observed `(index1, index2)` pair into the 64-bit key space of the index.
fn hash_index_pair(index1: &[u8], index2: &[u8]) -> u64 {
    let mut hasher = AHasher::new_with_keys(HASH_KEY_LO, HASH_KEY_HI);
    hasher.write(index1);
    hasher.write(index2);
    hasher.finish()
}

/// Generate the Hamming ball of radius <= `max_mismatches` around `barcode` over `ACTG`.
///
/// Positions to mutate are chosen combinatorially and the full alphabet is substituted
/// at each chosen position.  Because the substitution may reproduce the original
/// symbol, the result is the closed ball rather than a fixed-distance shell.  The
/// returned set is sorted and deduplicated so iteration order is deterministic.
pub fn expand_barcode(barcode: &[u8], max_mismatches: usize) -> Vec<Vec<u8>> {
    // combinations(n) yields nothing if n > len
    let max_mismatches = max_mismatches.min(barcode.len());
    (0..barcode.len())
        .combinations(max_mismatches)
        .flat_map(|locations| {
            let mut choices = barcode.iter().map(|c| vec![*c]).collect::<Vec<Vec<u8>>>();
            for location in locations {
                choices[location] = ALLOWED_BASES.to_vec();
            }
            choices.into_iter().multi_cartesian_product()
        })
        .sorted()
        .dedup()
        .collect()
}

/// The number of strings within Hamming distance `k` of a string of length `len` over a
/// 4-symbol alphabet: `sum_{i=0..k} C(len, i) * 3^i`.
pub fn hamming_ball_size(len: usize, k: usize) -> usize {
    (0..=k.min(len)).map(|i| binomial(len, i) * 3_usize.pow(i as u32)).sum()
}

fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// A precomputed map from hashed `(index1, index2)` pairs to sample ordinals.
///
/// Built once per run and read-only during matching.
#[derive(Debug)]
pub struct SearchIndex {
    lookup: AHashMap<u64, usize>,
    max_mismatches: usize,
}

impl SearchIndex {
    /// Build the index from the sample table.
    ///
    /// For each sample in table order, `index1` and `index2` are expanded
    /// independently and every pair from their Cartesian product is hashed and
    /// inserted.  The build aborts the moment an insertion would overwrite an entry
    /// that belongs to a different sample: that observed pair would be claimable by
    /// two samples, which is a configuration error, not something to resolve by
    /// picking one.
    ///
    /// # Errors
    ///
    /// - [`IndexError::MismatchBoundTooLarge`] if `max_mismatches > 3`
    /// - [`IndexError::AmbiguousBarcodes`] on the first cross-sample collision
    pub fn build(samples: &[SampleMetadata], max_mismatches: usize) -> Result<Self, IndexError> {
        if max_mismatches > MAX_MISMATCHES {
            return Err(IndexError::MismatchBoundTooLarge { given: max_mismatches });
        }

        let mut lookup = if max_mismatches <= PRESIZE_MISMATCH_THRESHOLD {
            AHashMap::new()
        } else {
            AHashMap::with_capacity(Self::anticipated_keys(samples, max_mismatches))
        };

        for sample in samples {
            let expanded1 = expand_barcode(&sample.index1, max_mismatches);
            let expanded2 = expand_barcode(&sample.index2, max_mismatches);
            for e1 in &expanded1 {
                for e2 in &expanded2 {
                    let key = hash_index_pair(e1, e2);
                    if let Some(previous) = lookup.insert(key, sample.ordinal) {
                        if previous != sample.ordinal {
                            return Err(IndexError::AmbiguousBarcodes {
                                sample_a: samples[previous].sample_id.clone(),
                                sample_b: sample.sample_id.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(Self { lookup, max_mismatches })
    }

    /// The summed cross-product of per-sample ball sizes, used to pre-size the map.
    fn anticipated_keys(samples: &[SampleMetadata], max_mismatches: usize) -> usize {
        samples
            .iter()
            .map(|s| {
                hamming_ball_size(s.index1.len(), max_mismatches)
                    * hamming_ball_size(s.index2.len(), max_mismatches)
            })
            .sum()
    }

    /// Look up an observed index pair, returning the matched sample ordinal if any.
    ///
    /// The observed sequences are hashed as-is; no expansion happens here.
    pub fn find(&self, observed_index1: &[u8], observed_index2: &[u8]) -> Option<usize> {
        self.lookup.get(&hash_index_pair(observed_index1, observed_index2)).copied()
    }

    /// The number of precomputed keys in the index.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// True when the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// The mismatch bound the index was built with.
    pub fn max_mismatches(&self) -> usize {
        self.max_mismatches
    }
}
