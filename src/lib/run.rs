//! End-to-end orchestration: preflight checks, index build, the demultiplexing
//! loop, and the final report.

use anyhow::{ensure, Context, Result};
use log::info;

use crate::{
    demux::{InputQuad, SampleOutputSet, StreamMultiplexer},
    matcher::SearchIndex,
    metrics::RunStatus,
    opts::Opts,
    quality::QualityThresholds,
    sample_metadata,
};

/// Run the demultiplexer end to end.
pub fn run(opts: Opts) -> Result<()> {
    opts.validate()?;
    ensure!(
        opts.output_dir.is_dir(),
        "--output-dir {:?} does not exist or is not a directory",
        &opts.output_dir
    );
    for fastq in &opts.fastqs {
        ensure!(fastq.is_file(), "Input FASTQ {:?} does not exist", fastq);
    }
    ensure!(
        opts.sample_metadata.is_file(),
        "Sample table {:?} does not exist",
        &opts.sample_metadata
    );

    let inputs = InputQuad::from_paths(&opts.fastqs)?;
    let samples =
        sample_metadata::from_path(&opts.sample_metadata, opts.revcomp_index1, opts.revcomp_index2)
            .with_context(|| {
                format!("Failed to load sample table {:?}", &opts.sample_metadata)
            })?;
    info!("Loaded {} samples from {:?}", samples.len(), &opts.sample_metadata);

    let index = SearchIndex::build(&samples, usize::from(opts.mismatches))?;
    info!(
        "Precomputed {} index-pair keys at mismatch bound {}",
        index.len(),
        opts.mismatches
    );

    let outputs = SampleOutputSet::create(&samples, &opts.output_dir, &inputs, opts.compression)?;
    let thresholds = QualityThresholds { min_score: opts.min_score, mean_score: opts.mean_score };
    let mut status = RunStatus::new(&samples);
    StreamMultiplexer::new(&index, thresholds).demultiplex(&inputs, outputs, &mut status)?;

    info!(
        "Processed {} reads: {} matched, {} undetermined ({:.2}%)",
        status.total,
        status.matched,
        status.undetermined,
        status.undetermined_percent()
    );
    status.write_report(&opts.output_dir)?;

    Ok(())
}
