//! A library for demultiplexing dual-index paired-end FASTQ files.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - [`sample_metadata`] loads and validates the tab-separated sample table.
//! - [`matcher::SearchIndex`] precomputes every observable barcode pair within the
//!   configured mismatch tolerance and maps its hash to a sample ordinal.
//! - [`demux::StreamMultiplexer`] reads the four input channels (I1, I2, R1, R2) in
//!   lockstep, gates each index pair on quality via [`quality`], looks the pair up in
//!   the index, and writes the biological reads to the matched sample's output pair
//!   (or the undetermined pair).
//! - [`metrics::RunStatus`] accumulates counters throughout and is persisted as a
//!   report at run completion.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod demux;
pub mod matcher;
pub mod metrics;
pub mod opts;
pub mod quality;
pub mod run;
pub mod sample_metadata;
pub mod utils;
