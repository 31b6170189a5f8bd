//! Run-status accounting and the end-of-run report.
//!
//! A single [`RunStatus`] is created at run start, passed by mutable reference into
//! the multiplexing loop, and persisted as a key/value TSV report at completion.
//! Every processed unit is an index pair representing a forward and reverse
//! biological read, so all counters advance in units of 2.

use std::{path::Path, time::Instant};

use ahash::AHashSet;
use anyhow::Result;
use bstr::BString;
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use crate::{quality::QualityRejection, sample_metadata::SampleMetadata};

/// The fixed name of the report file written into the output directory.
pub const REPORT_FILE_NAME: &str = "demux_report.tsv";

/// One row of the rendered report.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    pub key: String,
    pub value: String,
}

impl ReportEntry {
    fn new<V: ToString>(key: &str, value: V) -> Self {
        Self { key: key.to_string(), value: value.to_string() }
    }
}

/// Counters and run-level context accumulated while demultiplexing.
#[derive(Debug)]
pub struct RunStatus {
    /// Total reads processed (2 per quad).
    pub total: u64,
    /// Reads routed to a matched sample.
    pub matched: u64,
    /// Reads not routed to any sample, including quality-rejected reads.
    pub undetermined: u64,
    /// Reads rejected because index1's mean quality was below threshold.
    pub index1_below_mean: u64,
    /// Reads rejected because index2's mean quality was below threshold.
    pub index2_below_mean: u64,
    /// Reads rejected because index1's minimum quality was below threshold.
    pub index1_below_min: u64,
    /// Reads rejected because index2's minimum quality was below threshold.
    pub index2_below_min: u64,
    /// The sample ids involved in the run, in table order.
    sample_ids: Vec<String>,
    /// Every distinct index sequence across both columns of the table.
    unique_barcodes: AHashSet<BString>,
    /// Wall-clock start, set at construction.
    start: Instant,
}

impl RunStatus {
    /// Create a new [`RunStatus`] for the given samples, starting the clock.
    pub fn new(samples: &[SampleMetadata]) -> Self {
        let sample_ids = samples.iter().map(|s| s.sample_id.clone()).collect();
        let mut unique_barcodes = AHashSet::new();
        for sample in samples {
            unique_barcodes.insert(sample.index1.clone());
            unique_barcodes.insert(sample.index2.clone());
        }
        Self {
            total: 0,
            matched: 0,
            undetermined: 0,
            index1_below_mean: 0,
            index2_below_mean: 0,
            index1_below_min: 0,
            index2_below_min: 0,
            sample_ids,
            unique_barcodes,
            start: Instant::now(),
        }
    }

    /// Record a quad routed to a matched sample.
    pub fn record_matched(&mut self) {
        self.total += 2;
        self.matched += 2;
    }

    /// Record a quad routed to the undetermined pool.
    pub fn record_undetermined(&mut self) {
        self.total += 2;
        self.undetermined += 2;
    }

    /// Record a quad rejected by the quality gate.
    ///
    /// Rejected quads are tallied as undetermined even though they are never
    /// written, so `total == matched + undetermined` holds throughout the run.
    pub fn record_quality_rejection(&mut self, rejection: QualityRejection) {
        self.total += 2;
        self.undetermined += 2;
        match rejection {
            QualityRejection::Index1BelowMean => self.index1_below_mean += 2,
            QualityRejection::Index2BelowMean => self.index2_below_mean += 2,
            QualityRejection::Index1BelowMin => self.index1_below_min += 2,
            QualityRejection::Index2BelowMin => self.index2_below_min += 2,
        }
    }

    /// Percentage of processed reads that ended up undetermined, 0 when nothing was
    /// processed.
    pub fn undetermined_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.undetermined as f64 / self.total as f64
        }
    }

    /// Render the current state as report rows.
    pub fn snapshot(&self) -> Vec<ReportEntry> {
        vec![
            ReportEntry::new("total_reads", self.total),
            ReportEntry::new("matched_reads", self.matched),
            ReportEntry::new("undetermined_reads", self.undetermined),
            ReportEntry::new("undetermined_percent", format!("{:.2}", self.undetermined_percent())),
            ReportEntry::new("index1_below_mean_quality", self.index1_below_mean),
            ReportEntry::new("index2_below_mean_quality", self.index2_below_mean),
            ReportEntry::new("index1_below_min_quality", self.index1_below_min),
            ReportEntry::new("index2_below_min_quality", self.index2_below_min),
            ReportEntry::new("samples", self.sample_ids.len()),
            ReportEntry::new("sample_ids", self.sample_ids.join(",")),
            ReportEntry::new("unique_barcodes", self.unique_barcodes.len()),
            ReportEntry::new(
                "elapsed_seconds",
                format!("{:.3}", self.start.elapsed().as_secs_f64()),
            ),
        ]
    }

    /// Persist the snapshot to [`REPORT_FILE_NAME`] in the output directory.
    pub fn write_report<P: AsRef<Path>>(&self, output_dir: P) -> Result<()> {
        let output_path = output_dir.as_ref().join(REPORT_FILE_NAME);
        let delim = DelimFile::default();
        delim.write_tsv(&output_path, self.snapshot())?;
        Ok(())
    }
}
