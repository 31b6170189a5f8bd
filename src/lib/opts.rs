#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{ArgEnum, Parser};
use env_logger::Env;

use crate::matcher::MAX_MISMATCHES;

pub static TOOL_NAME: &str = "fqdemux";

static SHORT_USAGE: &str =
    "Demultiplexes dual-index paired-end FASTQs into per-sample file pairs.";

static LONG_USAGE: &str = "
Demultiplexes dual-index paired-end FASTQs into per-sample file pairs.

Four input FASTQs must be provided, one per channel, identified by the `_I1_`,
`_I2_`, `_R1_`, and `_R2_` markers in their file names.  Inputs may be plain or
gzip-compressed (`.gz`).

The sample table is a headerless tab-separated file with three columns:
sample_id, index1, index2.

Per-sample R1/R2 file pairs plus an Undetermined pair are written to the output
directory, named after the sample id and the `_S#_L###_R#_###` portion of the
R1 input file name.  Existing files are overwritten.  On error, partial output
files are left in place.

Example invocation:

fqdemux \\
  --fastqs run_S1_L001_I1_001.fastq.gz run_S1_L001_I2_001.fastq.gz \\
           run_S1_L001_R1_001.fastq.gz run_S1_L001_R2_001.fastq.gz \\
  --sample-metadata samples.tsv \\
  --output-dir demuxed/
";

/// The highest Phred score a threshold option may be set to.
const MAX_QUALITY_SCORE: u8 = 40;

/// How the per-sample output FASTQs are compressed.
#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    None,
    Gzip,
    Bgzf,
}

impl CompressionMode {
    /// The file extension for outputs written in this mode.
    pub fn extension(self) -> &'static str {
        match self {
            CompressionMode::None => ".fastq",
            CompressionMode::Gzip | CompressionMode::Bgzf => ".fastq.gz",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version, about = SHORT_USAGE, long_about = LONG_USAGE, term_width = 0)]
pub struct Opts {
    /// Paths to the four input FASTQs (I1, I2, R1, R2 in any order).
    #[clap(long, short = 'f', display_order = 1, required = true, multiple_values = true)]
    pub fastqs: Vec<PathBuf>,

    /// Path to the sample table (tab-separated: sample_id, index1, index2; no header).
    #[clap(long, short = 's', display_order = 2)]
    pub sample_metadata: PathBuf,

    /// The directory to write outputs to.
    ///
    /// This tool will overwrite existing files.
    #[clap(long, short = 'o', display_order = 3)]
    pub output_dir: PathBuf,

    /// Number of allowed mismatches between an observed index and an expected index.
    #[clap(long, short = 'm', default_value = "1", display_order = 11)]
    pub mismatches: u8,

    /// Reject a read pair when any single base quality in either index read is below this.
    #[clap(long, default_value = "0", display_order = 11)]
    pub min_score: u8,

    /// Reject a read pair when the mean base quality of either index read is below this.
    #[clap(long, default_value = "0", display_order = 11)]
    pub mean_score: u8,

    /// Reverse-complement the index1 column of the sample table.
    #[clap(long, display_order = 21)]
    pub revcomp_index1: bool,

    /// Reverse-complement the index2 column of the sample table.
    #[clap(long, display_order = 21)]
    pub revcomp_index2: bool,

    /// Compression applied to the output FASTQs.
    #[clap(long, short = 'c', arg_enum, default_value = "none", display_order = 21)]
    pub compression: CompressionMode,
}

impl Opts {
    /// Check option values that clap cannot express.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fastqs.len() == 4,
            "Expected exactly 4 input FASTQs (I1, I2, R1, R2), got {}",
            self.fastqs.len()
        );
        ensure!(
            usize::from(self.mismatches) <= MAX_MISMATCHES,
            "--mismatches must be at most {}, got {}",
            MAX_MISMATCHES,
            self.mismatches
        );
        ensure!(
            self.min_score <= MAX_QUALITY_SCORE,
            "--min-score must be at most {}, got {}",
            MAX_QUALITY_SCORE,
            self.min_score
        );
        ensure!(
            self.mean_score <= MAX_QUALITY_SCORE,
            "--mean-score must be at most {}, got {}",
            MAX_QUALITY_SCORE,
            self.mean_score
        );
        Ok(())
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for Opts {
    fn default() -> Self {
        Self {
            fastqs: vec![],
            sample_metadata: PathBuf::default(),
            output_dir: PathBuf::default(),
            mismatches: 1,
            min_score: 0,
            mean_score: 0,
            revcomp_index1: false,
            revcomp_index2: false,
            compression: CompressionMode::None,
        }
    }
}

/// Parse args and set up logging.
pub fn setup() -> Opts {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::{CompressionMode, Opts};

    fn four_paths() -> Vec<PathBuf> {
        ["i1", "i2", "r1", "r2"].iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_validate_ok() {
        let opts = Opts { fastqs: four_paths(), ..Opts::default() };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_wrong_fastq_count() {
        let opts = Opts { fastqs: vec![PathBuf::from("r1")], ..Opts::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_mismatches_out_of_range() {
        let opts = Opts { fastqs: four_paths(), mismatches: 4, ..Opts::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_scores_out_of_range() {
        let opts = Opts { fastqs: four_paths(), min_score: 41, ..Opts::default() };
        assert!(opts.validate().is_err());

        let opts = Opts { fastqs: four_paths(), mean_score: 41, ..Opts::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_extensions() {
        assert_eq!(CompressionMode::None.extension(), ".fastq");
        assert_eq!(CompressionMode::Gzip.extension(), ".fastq.gz");
        assert_eq!(CompressionMode::Bgzf.extension(), ".fastq.gz");
    }
}
