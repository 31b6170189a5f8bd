#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate)]

//! Loading and validation of the sample table.
//!
//! The sample table is a headerless tab-separated file with three columns:
//! `sample_id`, `index1`, `index2`.  All row-level and cross-row validation
//! problems are collected in one pass and reported together, so a user can fix
//! an entire bad table in a single round trip.

use std::{collections::HashMap, path::Path};

use bstr::{BStr, BString};
use itertools::Itertools;
use thiserror::Error;

use crate::utils::reverse_complement;

/// The bases that are allowed in [`SampleMetadata::index1`] and [`SampleMetadata::index2`].
const ALLOWED_BASES: &[u8] = &[b'A', b'C', b'T', b'G'];

/// The number of tab-separated columns expected per row.
const EXPECTED_COLUMNS: usize = 3;

/// Metadata about a single sample.
///
/// Created once from the sample table at startup and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleMetadata {
    /// The unique identifier for the sample.
    pub sample_id: String,

    /// The sample barcode observed in the I1 (forward index) read.
    pub index1: BString,

    /// The sample barcode observed in the I2 (reverse index) read.
    pub index2: BString,

    /// The position of the sample in the table, starting at 0.
    pub ordinal: usize,

    /// The 1-based line number in the input file where this sample was defined.
    pub line_number: usize,
}

/// A single independently checkable problem with the sample table.
#[derive(Error, Debug)]
pub enum RowError {
    #[error("Line {line}: expected {EXPECTED_COLUMNS} tab-separated columns, found {actual}")]
    InvalidNumberOfColumns { line: usize, actual: usize },

    #[error("Line {line}: sample id is empty")]
    EmptySampleId { line: usize },

    #[error("Line {line}: invalid barcode `{barcode}` for {id} - {reason}")]
    InvalidBarcode { line: usize, id: String, barcode: String, reason: ReasonBarcodeInvalid },

    #[error("Duplicate sample id `{id}` on lines {first_line} and {second_line}")]
    DuplicateSampleId { id: String, first_line: usize, second_line: usize },

    #[error(
        "Samples `{sample_a}` and `{sample_b}` share the same index pair {index1}+{index2}"
    )]
    DuplicateIndexPair { sample_a: String, sample_b: String, index1: String, index2: String },
}

/// The reason that a barcode has been deemed invalid.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReasonBarcodeInvalid {
    EmptyString,
    DisallowedBase(char),
}

impl std::fmt::Display for ReasonBarcodeInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyString => write!(f, "barcode is an empty string"),
            Self::DisallowedBase(base) => write!(f, "barcode contains disallowed base `{}`", base),
        }
    }
}

/// The error that may occur when loading the sample table.
#[derive(Error, Debug)]
pub enum SampleTableError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] csv::Error),

    #[error("The sample table was empty")]
    Empty,

    #[error(
        "The sample table contained {} error(s):\n{}",
        .errors.len(),
        .errors.iter().join("\n")
    )]
    Validation { errors: Vec<RowError> },
}

impl SampleMetadata {
    /// Create a new [`SampleMetadata`], optionally reverse-complementing either index.
    pub fn new(
        sample_id: String,
        index1: BString,
        index2: BString,
        ordinal: usize,
        line_number: usize,
    ) -> Self {
        Self { sample_id, index1, index2, ordinal, line_number }
    }

    /// The concatenation of the two index sequences, used for display in errors and reports.
    pub fn barcode(&self) -> BString {
        let mut joined = self.index1.to_vec();
        joined.extend_from_slice(&self.index2);
        BString::from(joined)
    }

    /// Check that a barcode is non-empty and contains only `ACTG`.
    fn validate_barcode(barcode: &BStr) -> Result<(), ReasonBarcodeInvalid> {
        if barcode.is_empty() {
            return Err(ReasonBarcodeInvalid::EmptyString);
        }
        match barcode.iter().find(|b| !ALLOWED_BASES.contains(b)) {
            Some(bad) => Err(ReasonBarcodeInvalid::DisallowedBase(char::from(*bad))),
            None => Ok(()),
        }
    }
}

/// Load the sample table from a headerless tab-separated file.
///
/// Rows are upper-cased before validation.  When `revcomp_index1` or
/// `revcomp_index2` is set, the corresponding column is reverse-complemented as
/// it is read, before any cross-row checks run.
///
/// # Errors
///
/// - [`SampleTableError::Empty`] when the file contains no rows
/// - [`SampleTableError::Validation`] carrying every row-level and cross-row
///   problem found in a full pass over the table
pub fn from_path<P: AsRef<Path>>(
    path: P,
    revcomp_index1: bool,
    revcomp_index2: bool,
) -> Result<Vec<SampleMetadata>, SampleTableError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut samples = Vec::new();
    let mut errors = Vec::new();

    for (ordinal, record) in reader.records().enumerate() {
        let record = record?;
        let line_number = ordinal + 1;

        if record.len() != EXPECTED_COLUMNS {
            errors
                .push(RowError::InvalidNumberOfColumns { line: line_number, actual: record.len() });
            continue;
        }

        let sample_id = record[0].trim().to_string();
        if sample_id.is_empty() {
            errors.push(RowError::EmptySampleId { line: line_number });
        }

        let mut index1 = BString::from(record[1].trim().to_ascii_uppercase());
        let mut index2 = BString::from(record[2].trim().to_ascii_uppercase());
        if revcomp_index1 {
            index1 = reverse_complement(index1.as_ref());
        }
        if revcomp_index2 {
            index2 = reverse_complement(index2.as_ref());
        }

        for barcode in [&index1, &index2] {
            if let Err(reason) = SampleMetadata::validate_barcode(barcode.as_ref()) {
                errors.push(RowError::InvalidBarcode {
                    line: line_number,
                    id: sample_id.clone(),
                    barcode: barcode.to_string(),
                    reason,
                });
            }
        }

        samples.push(SampleMetadata::new(sample_id, index1, index2, samples.len(), line_number));
    }

    if samples.is_empty() && errors.is_empty() {
        return Err(SampleTableError::Empty);
    }

    validate_uniqueness(&samples, &mut errors);

    if errors.is_empty() {
        Ok(samples)
    } else {
        Err(SampleTableError::Validation { errors })
    }
}

/// Collect duplicate-id and duplicate-index-pair errors across the whole table.
fn validate_uniqueness(samples: &[SampleMetadata], errors: &mut Vec<RowError>) {
    let mut ids_seen: HashMap<&str, usize> = HashMap::new();
    let mut pairs_seen: HashMap<(&BStr, &BStr), &SampleMetadata> = HashMap::new();

    for sample in samples {
        match ids_seen.get(sample.sample_id.as_str()) {
            Some(&first_line) => errors.push(RowError::DuplicateSampleId {
                id: sample.sample_id.clone(),
                first_line,
                second_line: sample.line_number,
            }),
            None => {
                ids_seen.insert(&sample.sample_id, sample.line_number);
            }
        }

        let key = (sample.index1.as_ref(), sample.index2.as_ref());
        match pairs_seen.get(&key) {
            Some(first) => errors.push(RowError::DuplicateIndexPair {
                sample_a: first.sample_id.clone(),
                sample_b: sample.sample_id.clone(),
                index1: sample.index1.to_string(),
                index2: sample.index2.to_string(),
            }),
            None => {
                pairs_seen.insert(key, sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use matches::assert_matches;
    use tempfile::tempdir;

    use super::*;

    fn write_table(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_valid_table() {
        let (_dir, path) = write_table("S1\tATCG\tGGTA\nS2\tTTTT\tCCCC\n");
        let samples = from_path(&path, false, false).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sample_id, "S1");
        assert_eq!(samples[0].index1, BString::from("ATCG"));
        assert_eq!(samples[0].index2, BString::from("GGTA"));
        assert_eq!(samples[0].ordinal, 0);
        assert_eq!(samples[1].ordinal, 1);
        assert_eq!(samples[1].line_number, 2);
    }

    #[test]
    fn test_lowercase_is_uppercased() {
        let (_dir, path) = write_table("S1\tatcg\tggta\n");
        let samples = from_path(&path, false, false).unwrap();
        assert_eq!(samples[0].index1, BString::from("ATCG"));
    }

    #[test]
    fn test_reverse_complement_applied() {
        let (_dir, path) = write_table("S1\tATCG\tGGTA\n");
        let samples = from_path(&path, true, false).unwrap();
        assert_eq!(samples[0].index1, BString::from("CGAT"));
        assert_eq!(samples[0].index2, BString::from("GGTA"));

        let samples = from_path(&path, false, true).unwrap();
        assert_eq!(samples[0].index1, BString::from("ATCG"));
        assert_eq!(samples[0].index2, BString::from("TACC"));
    }

    #[test]
    fn test_empty_table() {
        let (_dir, path) = write_table("");
        assert_matches!(from_path(&path, false, false), Err(SampleTableError::Empty));
    }

    #[test]
    fn test_duplicate_sample_id() {
        let (_dir, path) = write_table("S1\tATCG\tGGTA\nS1\tTTTT\tCCCC\n");
        let err = from_path(&path, false, false).unwrap_err();
        if let SampleTableError::Validation { errors } = err {
            assert_eq!(errors.len(), 1);
            assert_matches!(
                &errors[0],
                RowError::DuplicateSampleId { first_line: 1, second_line: 2, .. }
            );
        } else {
            panic!("Wrong error returned");
        }
    }

    #[test]
    fn test_duplicate_index_pair_reports_both_ids() {
        let (_dir, path) = write_table("S1\tATCG\tGGTA\nS2\tATCG\tGGTA\n");
        let err = from_path(&path, false, false).unwrap_err();
        if let SampleTableError::Validation { errors } = err {
            assert_eq!(errors.len(), 1);
            if let RowError::DuplicateIndexPair { sample_a, sample_b, .. } = &errors[0] {
                assert_eq!(sample_a, "S1");
                assert_eq!(sample_b, "S2");
            } else {
                panic!("Wrong row error");
            }
        } else {
            panic!("Wrong error returned");
        }
    }

    #[test]
    fn test_errors_are_aggregated_not_short_circuited() {
        // Three independent problems: a bad base, a duplicate id, and a duplicate pair.
        let table = "S1\tATXG\tGGTA\n\
                     S2\tAAAA\tCCCC\n\
                     S2\tTTTT\tGGGG\n\
                     S3\tAAAA\tCCCC\n";
        let (_dir, path) = write_table(table);
        let err = from_path(&path, false, false).unwrap_err();
        if let SampleTableError::Validation { errors } = err {
            assert_eq!(errors.len(), 3);
            assert!(errors.iter().any(|e| matches!(e, RowError::InvalidBarcode { .. })));
            assert!(errors.iter().any(|e| matches!(e, RowError::DuplicateSampleId { .. })));
            assert!(errors.iter().any(|e| matches!(e, RowError::DuplicateIndexPair { .. })));
        } else {
            panic!("Wrong error returned");
        }
    }

    #[test]
    fn test_wrong_column_count() {
        let (_dir, path) = write_table("S1\tATCG\n");
        let err = from_path(&path, false, false).unwrap_err();
        if let SampleTableError::Validation { errors } = err {
            assert_matches!(&errors[0], RowError::InvalidNumberOfColumns { line: 1, actual: 2 });
        } else {
            panic!("Wrong error returned");
        }
    }

    #[test]
    fn test_empty_barcode() {
        let (_dir, path) = write_table("S1\t\tGGTA\n");
        let err = from_path(&path, false, false).unwrap_err();
        if let SampleTableError::Validation { errors } = err {
            assert_eq!(errors.len(), 1);
            if let RowError::InvalidBarcode { reason, .. } = &errors[0] {
                assert_matches!(reason, ReasonBarcodeInvalid::EmptyString);
            } else {
                panic!("Wrong row error");
            }
        } else {
            panic!("Wrong error returned");
        }
    }

    #[test]
    fn test_barcode_display() {
        let sample = SampleMetadata::new(
            String::from("S1"),
            BString::from("ATCG"),
            BString::from("GGTA"),
            0,
            1,
        );
        assert_eq!(sample.barcode(), BString::from("ATCGGGTA"));
    }
}
