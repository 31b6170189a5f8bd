//! Filename conventions and small shared helpers.

use bstr::{BStr, BString};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches the `_S<num>_L<lane>_R1_<chunk>` portion of an R1 input file name,
    /// capturing the pieces on either side of `R1`.
    static ref OUTPUT_SUFFIX_REGEX: Regex = Regex::new(r"(_S\d+_L\d{3}_)R1(_\d{3})").unwrap();
}

/// Reverse-complement a barcode sequence (A<->T, C<->G, order reversed).
pub fn reverse_complement(bases: &BStr) -> BString {
    let complemented: Vec<u8> = bases
        .iter()
        .rev()
        .map(|base| match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            other => *other,
        })
        .collect();
    BString::from(complemented)
}

/// Derive the forward and reverse output file name suffixes from the R1 input
/// file name.
///
/// For an input named `run1_S1_L001_R1_001.fastq.gz` this returns
/// `(_S1_L001_R1_001, _S1_L001_R2_001)`.  Returns `None` when the file name does
/// not carry the expected `_S#_L###_R1_###` pattern.
pub fn output_suffixes(r1_file_name: &str) -> Option<(String, String)> {
    let captures = OUTPUT_SUFFIX_REGEX.captures(r1_file_name)?;
    let head = captures.get(1)?.as_str();
    let tail = captures.get(2)?.as_str();
    Some((format!("{}R1{}", head, tail), format!("{}R2{}", head, tail)))
}

#[cfg(test)]
pub mod test_commons {
    //! Shared fixture helpers for demultiplexing tests.

    use std::{
        fs::File,
        io::{BufReader, BufWriter, Write},
        path::Path,
    };

    use gzp::{BgzfSyncReader, BgzfSyncWriter, Compression, BUFSIZE};
    use seq_io::{
        fastq::{OwnedRecord, Reader},
        BaseRecord,
    };

    /// Configuration struct for creating a FASTQ read.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Fq<'a> {
        pub name: &'a str,
        pub bases: &'a [u8],
        pub quals: Option<&'a [u8]>,
    }

    impl<'a> Fq<'a> {
        /// Convert the configuration into an [`OwnedRecord`].
        pub fn to_owned_record(&self) -> OwnedRecord {
            let qual = if let Some(qual) = self.quals {
                assert_eq!(qual.len(), self.bases.len());
                qual.to_vec()
            } else {
                vec![b'I'; self.bases.len()]
            };
            OwnedRecord { head: self.name.as_bytes().to_vec(), seq: self.bases.to_vec(), qual }
        }
    }

    /// Write a set of fastq reads to a file, returning the number of reads written.
    ///
    /// If the file extension is `gz` the reads are bgzf-compressed.
    pub fn write_reads_to_file(
        reads: impl Iterator<Item = OwnedRecord>,
        file: impl AsRef<Path>,
    ) -> usize {
        let mut num_written = 0;
        let mut writer: Box<dyn Write> =
            if file.as_ref().extension().map_or(false, |ext| ext == "gz") {
                Box::new(BgzfSyncWriter::new(
                    BufWriter::new(File::create(file).unwrap()),
                    Compression::new(3),
                ))
            } else {
                Box::new(BufWriter::new(File::create(file).unwrap()))
            };
        for read in reads {
            read.write(&mut writer).unwrap();
            num_written += 1;
        }
        writer.flush().unwrap();
        num_written
    }

    /// Slurp all records out of a FASTQ file, decompressing when the extension is `gz`.
    pub fn slurp_fastq(file: impl AsRef<Path>) -> Vec<OwnedRecord> {
        let inner = BufReader::with_capacity(
            BUFSIZE,
            File::open(&file).unwrap_or_else(|_| panic!("Unable to open {:?}", file.as_ref())),
        );
        if file.as_ref().extension().map_or(false, |ext| ext == "gz") {
            Reader::new(BgzfSyncReader::new(inner)).records().map(|r| r.unwrap()).collect()
        } else {
            Reader::new(inner).records().map(|r| r.unwrap()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use bstr::BString;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ATCG", "CGAT")]
    #[case("AAAA", "TTTT")]
    #[case("GGTA", "TACC")]
    #[case("", "")]
    fn test_reverse_complement(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(
            reverse_complement(BString::from(input).as_ref()),
            BString::from(expected)
        );
    }

    #[test]
    fn test_reverse_complement_is_involution() {
        let original = BString::from("ATTCGGTA");
        let twice = reverse_complement(reverse_complement(original.as_ref()).as_ref());
        assert_eq!(twice, original);
    }

    #[test]
    fn test_output_suffixes() {
        let (forward, reverse) = output_suffixes("run1_S1_L001_R1_001.fastq.gz").unwrap();
        assert_eq!(forward, "_S1_L001_R1_001");
        assert_eq!(reverse, "_S1_L001_R2_001");
    }

    #[test]
    fn test_output_suffixes_multi_digit_sample_number() {
        let (forward, reverse) = output_suffixes("x_S12_L002_R1_003.fastq").unwrap();
        assert_eq!(forward, "_S12_L002_R1_003");
        assert_eq!(reverse, "_S12_L002_R2_003");
    }

    #[rstest]
    #[case("run1_R1_001.fastq.gz")]
    #[case("run1_S1_L1_R1_001.fastq.gz")]
    #[case("run1_S1_L001_R2_001.fastq.gz")]
    #[case("plain_name.fastq")]
    fn test_output_suffixes_rejects_nonconforming_names(#[case] name: &str) {
        assert!(output_suffixes(name).is_none());
    }
}
