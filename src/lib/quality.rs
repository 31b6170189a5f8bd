//! Quality gating of index read pairs.
//!
//! Each quad's two index reads are checked against a mean and a minimum Phred
//! threshold before any matching is attempted.  The mean is checked for both indexes
//! before the minimum is checked for either; the order does not change whether a quad
//! is accepted, but it determines which rejection counter is attributed.

/// The offset subtracting an ASCII quality character down to its Phred score.
const PHRED_OFFSET: u8 = 33;

/// The minimum and mean Phred score thresholds applied to index reads.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// Reject a quad when any single base quality in an index read is below this.
    pub min_score: u8,
    /// Reject a quad when the mean base quality of an index read is below this.
    pub mean_score: u8,
}

/// Which check rejected a quad; attributes the rejection to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityRejection {
    Index1BelowMean,
    Index2BelowMean,
    Index1BelowMin,
    Index2BelowMin,
}

/// Evaluate an index read pair against the thresholds.
///
/// Returns `None` when the quad passes, otherwise the first check that failed in the
/// fixed order: index1 mean, index2 mean, index1 min, index2 min.
pub fn evaluate(
    index1_quals: &[u8],
    index2_quals: &[u8],
    thresholds: &QualityThresholds,
) -> Option<QualityRejection> {
    if mean_score(index1_quals) < f64::from(thresholds.mean_score) {
        Some(QualityRejection::Index1BelowMean)
    } else if mean_score(index2_quals) < f64::from(thresholds.mean_score) {
        Some(QualityRejection::Index2BelowMean)
    } else if min_score(index1_quals) < thresholds.min_score {
        Some(QualityRejection::Index1BelowMin)
    } else if min_score(index2_quals) < thresholds.min_score {
        Some(QualityRejection::Index2BelowMin)
    } else {
        None
    }
}

/// The mean Phred score of an ASCII quality string, 0.0 for an empty string.
fn mean_score(quals: &[u8]) -> f64 {
    if quals.is_empty() {
        return 0.0;
    }
    let total: u64 = quals.iter().map(|q| u64::from(q - PHRED_OFFSET)).sum();
    total as f64 / quals.len() as f64
}

/// The minimum Phred score of an ASCII quality string, 0 for an empty string.
fn min_score(quals: &[u8]) -> u8 {
    quals.iter().map(|q| q - PHRED_OFFSET).min().unwrap_or(0)
}
