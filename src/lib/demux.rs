//! Synchronized four-channel reading and per-sample writing.
//!
//! The four input FASTQs (I1, I2, R1, R2) are read in lockstep, one record per
//! channel per step.  Each step's index pair is quality-gated, then looked up in
//! the [`SearchIndex`]; the template pair is written to the matched sample's
//! output pair, or to the Undetermined pair with the observed index sequences
//! appended to the read names.  The first exhausted channel ends the run.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use gzp::{BgzfSyncReader, BgzfSyncWriter, Compression, MgzipSyncWriter, BUFSIZE};
use log::{debug, info};
use seq_io::fastq::{self, Reader, Record, RefRecord};
use seq_io::BaseRecord;

use crate::{
    matcher::{SearchIndex, UNDETERMINED_NAME},
    metrics::RunStatus,
    opts::CompressionMode,
    quality::{self, QualityThresholds},
    sample_metadata::SampleMetadata,
    utils::output_suffixes,
};

/// Log progress after this many read pairs.
const LOG_EVERY: u64 = 1_000_000;

/// The compression level used for gzip and bgzf output.
const OUTPUT_COMPRESSION_LEVEL: u32 = 3;

/// The four input channels, identified by file name markers.
#[derive(Debug, Clone)]
pub struct InputQuad {
    pub index1: PathBuf,
    pub index2: PathBuf,
    pub read1: PathBuf,
    pub read2: PathBuf,
}

impl InputQuad {
    /// Assign the four given paths to channels by the `_I1_`, `_I2_`, `_R1_`, and
    /// `_R2_` markers in their file names.  Each marker must appear in exactly one
    /// file name.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut index1 = None;
        let mut index2 = None;
        let mut read1 = None;
        let mut read2 = None;

        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Input path has no usable file name: {:?}", path))?;
            let slot = match (
                name.contains("_I1_"),
                name.contains("_I2_"),
                name.contains("_R1_"),
                name.contains("_R2_"),
            ) {
                (true, false, false, false) => &mut index1,
                (false, true, false, false) => &mut index2,
                (false, false, true, false) => &mut read1,
                (false, false, false, true) => &mut read2,
                _ => bail!(
                    "Could not determine the channel of `{}`: expected exactly one of the _I1_, _I2_, _R1_, _R2_ markers",
                    name
                ),
            };
            if let Some(previous) = slot.replace(path.clone()) {
                bail!("Inputs `{:?}` and `{:?}` map to the same channel", previous, path);
            }
        }

        match (index1, index2, read1, read2) {
            (Some(index1), Some(index2), Some(read1), Some(read2)) => {
                Ok(Self { index1, index2, read1, read2 })
            }
            _ => bail!("Expected one input FASTQ for each of the I1, I2, R1, and R2 channels"),
        }
    }
}

/// Open a FASTQ reader over a plain or bgzf-compressed file, chosen by extension.
fn open_fastq_reader(path: &Path) -> Result<Reader<Box<dyn Read>>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.to_string_lossy()))?;
    let buffered = BufReader::with_capacity(BUFSIZE, file);
    let inner: Box<dyn Read> = if path.extension().map_or(false, |ext| ext == "gz") {
        Box::new(BgzfSyncReader::new(buffered))
    } else {
        Box::new(buffered)
    };
    Ok(Reader::new(inner))
}

/// Create an output stream for the given path, wrapped per the compression mode.
fn create_writer(path: &Path, compression: CompressionMode) -> Result<Box<dyn Write>> {
    let file = BufWriter::with_capacity(
        BUFSIZE,
        File::create(path)
            .with_context(|| format!("Failed to create {}", path.to_string_lossy()))?,
    );
    let writer: Box<dyn Write> = match compression {
        CompressionMode::None => Box::new(file),
        CompressionMode::Gzip => {
            Box::new(MgzipSyncWriter::new(file, Compression::new(OUTPUT_COMPRESSION_LEVEL)))
        }
        CompressionMode::Bgzf => {
            Box::new(BgzfSyncWriter::new(file, Compression::new(OUTPUT_COMPRESSION_LEVEL)))
        }
    };
    Ok(writer)
}

/// The full set of output streams: one forward/reverse pair per sample, plus the
/// Undetermined pair at the end.
pub struct SampleOutputSet {
    writers: Vec<(Box<dyn Write>, Box<dyn Write>)>,
}

impl SampleOutputSet {
    /// Derive the output file name suffixes from the R1 input file name and create
    /// every output stream under `output_dir`.
    ///
    /// An R1 file name without the `_S#_L###_R1_###` pattern is an error, raised
    /// before any output file is created.
    pub fn create<P: AsRef<Path>>(
        samples: &[SampleMetadata],
        output_dir: P,
        inputs: &InputQuad,
        compression: CompressionMode,
    ) -> Result<Self> {
        let r1_name = inputs
            .read1
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("R1 input has no usable file name: {:?}", inputs.read1))?;
        let (forward_suffix, reverse_suffix) = output_suffixes(r1_name).ok_or_else(|| {
            anyhow!(
                "Could not derive output file names: `{}` does not contain the _S#_L###_R1_### pattern",
                r1_name
            )
        })?;

        let extension = compression.extension();
        let output_dir = output_dir.as_ref();
        let names = samples
            .iter()
            .map(|s| s.sample_id.as_str())
            .chain(std::iter::once(UNDETERMINED_NAME));

        let mut writers = Vec::with_capacity(samples.len() + 1);
        for name in names {
            let forward =
                create_writer(&output_dir.join(format!("{}{}{}", name, forward_suffix, extension)), compression)?;
            let reverse =
                create_writer(&output_dir.join(format!("{}{}{}", name, reverse_suffix, extension)), compression)?;
            writers.push((forward, reverse));
        }
        debug!("Created {} output file pairs", writers.len());

        Ok(Self { writers })
    }

    /// The forward/reverse pair for a matched sample ordinal.
    fn pair_mut(&mut self, ordinal: usize) -> &mut (Box<dyn Write>, Box<dyn Write>) {
        &mut self.writers[ordinal]
    }

    /// The Undetermined forward/reverse pair.
    fn undetermined_mut(&mut self) -> &mut (Box<dyn Write>, Box<dyn Write>) {
        let last = self.writers.len() - 1;
        &mut self.writers[last]
    }

    /// Flush and close every output stream.
    pub fn finish(self) -> Result<()> {
        for (mut forward, mut reverse) in self.writers {
            forward.flush().context("Failed to flush an output stream")?;
            reverse.flush().context("Failed to flush an output stream")?;
        }
        Ok(())
    }
}

/// Write a record with the observed index sequence appended to its name.
fn write_annotated<W: Write>(record: &RefRecord, index_seq: &[u8], writer: &mut W) -> Result<()> {
    let mut head = record.head().to_vec();
    head.push(b' ');
    head.extend_from_slice(index_seq);
    fastq::write(writer, &head, record.seq(), record.qual())?;
    Ok(())
}

/// Drives the lockstep read/gate/match/write loop.
pub struct StreamMultiplexer<'a> {
    index: &'a SearchIndex,
    thresholds: QualityThresholds,
}

impl<'a> StreamMultiplexer<'a> {
    pub fn new(index: &'a SearchIndex, thresholds: QualityThresholds) -> Self {
        Self { index, thresholds }
    }

    /// Demultiplex the four input channels into the output set.
    ///
    /// The outputs are flushed and closed on every exit path; when both the loop
    /// and the flush fail, the loop's error is surfaced.
    pub fn demultiplex(
        &self,
        inputs: &InputQuad,
        mut outputs: SampleOutputSet,
        status: &mut RunStatus,
    ) -> Result<()> {
        let mut index1_reader = open_fastq_reader(&inputs.index1)?;
        let mut index2_reader = open_fastq_reader(&inputs.index2)?;
        let mut read1_reader = open_fastq_reader(&inputs.read1)?;
        let mut read2_reader = open_fastq_reader(&inputs.read2)?;

        let result = self.process(
            &mut index1_reader,
            &mut index2_reader,
            &mut read1_reader,
            &mut read2_reader,
            &mut outputs,
            status,
        );
        let finish = outputs.finish();
        result.and(finish)
    }

    fn process(
        &self,
        index1_reader: &mut Reader<Box<dyn Read>>,
        index2_reader: &mut Reader<Box<dyn Read>>,
        read1_reader: &mut Reader<Box<dyn Read>>,
        read2_reader: &mut Reader<Box<dyn Read>>,
        outputs: &mut SampleOutputSet,
        status: &mut RunStatus,
    ) -> Result<()> {
        let mut num_pairs: u64 = 0;

        loop {
            // The first exhausted channel ends the run; remaining records on the
            // other channels are ignored.
            let index1 = match index1_reader.next() {
                Some(record) => record.context("Failed reading the I1 channel")?,
                None => break,
            };
            let index2 = match index2_reader.next() {
                Some(record) => record.context("Failed reading the I2 channel")?,
                None => break,
            };
            let read1 = match read1_reader.next() {
                Some(record) => record.context("Failed reading the R1 channel")?,
                None => break,
            };
            let read2 = match read2_reader.next() {
                Some(record) => record.context("Failed reading the R2 channel")?,
                None => break,
            };

            num_pairs += 1;
            if num_pairs % LOG_EVERY == 0 {
                info!("Processed {} read pairs", num_pairs);
            }

            if let Some(rejection) = quality::evaluate(index1.qual(), index2.qual(), &self.thresholds)
            {
                status.record_quality_rejection(rejection);
                continue;
            }

            match self.index.find(index1.seq(), index2.seq()) {
                Some(ordinal) => {
                    let (forward, reverse) = outputs.pair_mut(ordinal);
                    read1.write(forward).context("Failed writing a matched R1 record")?;
                    read2.write(reverse).context("Failed writing a matched R2 record")?;
                    status.record_matched();
                }
                None => {
                    let (forward, reverse) = outputs.undetermined_mut();
                    write_annotated(&read1, index1.seq(), forward)
                        .context("Failed writing an undetermined R1 record")?;
                    write_annotated(&read2, index2.seq(), reverse)
                        .context("Failed writing an undetermined R2 record")?;
                    status.record_undetermined();
                }
            }
        }

        Ok(())
    }
}
