//! FASTA/FASTQ input and FASTA/JSON output
//!
//! Reading goes through needletail; gzipped files are decompressed with
//! flate2 before parsing.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use needletail::{parse_fastx_file, parse_fastx_reader};
use seqweave_core::{Alphabet, Sequence};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// FASTA line width for written sequences
const LINE_WIDTH: usize = 60;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },
    #[error("No sequences found in {0}")]
    EmptyFile(String),
    #[error("Cannot tell the alphabet of record {id} in {file}")]
    UnknownAlphabet { file: String, id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Fasta,
    Json,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fasta" | "fa" => Some(Self::Fasta),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Read every record of a FASTA/FASTQ file. Without an explicit alphabet
/// each record gets the smallest alphabet that accepts all its symbols.
pub fn read_sequences(path: &Path, alphabet: Option<Alphabet>) -> Result<Vec<Sequence>> {
    let file = path.display().to_string();
    let parse_error = |e: needletail::errors::ParseError| InputError::Parse {
        file: file.clone(),
        message: e.to_string(),
    };

    let mut reader = if path.extension().map_or(false, |ext| ext == "gz") {
        let handle = File::open(path).with_context(|| format!("Failed to open {}", file))?;
        parse_fastx_reader(BufReader::new(GzDecoder::new(handle))).map_err(parse_error)?
    } else {
        parse_fastx_file(path).map_err(parse_error)?
    };

    let mut sequences = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(parse_error)?;
        let id = String::from_utf8_lossy(record.id())
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let mut symbols = record.seq().to_vec();
        symbols.make_ascii_uppercase();

        let alphabet = match alphabet.or_else(|| Alphabet::infer(&symbols)) {
            Some(alphabet) => alphabet,
            None => {
                return Err(InputError::UnknownAlphabet {
                    file: file.clone(),
                    id,
                }
                .into())
            }
        };
        let mut sequence = Sequence::new(id.as_str(), alphabet, symbols)
            .with_context(|| format!("Invalid record {} in {}", id, file))?;
        if let Some(quality) = record.qual() {
            sequence = sequence.with_quality(quality.to_vec())?;
        }
        sequences.push(sequence);
    }

    if sequences.is_empty() {
        return Err(InputError::EmptyFile(file).into());
    }
    log::info!("Loaded {} sequences from {}", sequences.len(), file);
    Ok(sequences)
}

/// Stdout, or a file when a path is given
pub fn create_writer(out: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

/// Write one FASTA record, wrapping the symbols
pub fn write_fasta_record<W: Write + ?Sized>(writer: &mut W, id: &str, symbols: &[u8]) -> Result<()> {
    writeln!(writer, ">{}", id)?;
    for line in symbols.chunks(LINE_WIDTH) {
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_json<W: Write + ?Sized, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value).context("Failed to serialize results")?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::Builder;

    #[test]
    fn test_read_fasta_infers_alphabet() -> Result<()> {
        let file = Builder::new().suffix(".fa").tempfile()?;
        std::fs::write(file.path(), ">dna one\nacgt\nACGT\n>prot\nMKVLE\n")?;
        let sequences = read_sequences(file.path(), None)?;
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].id(), "dna");
        assert_eq!(sequences[0].symbols(), b"ACGTACGT");
        assert_eq!(sequences[0].alphabet(), Alphabet::Dna);
        assert_eq!(sequences[1].alphabet(), Alphabet::Protein);
        Ok(())
    }

    #[test]
    fn test_read_gzipped_fastq() -> Result<()> {
        let file = Builder::new().suffix(".fq.gz").tempfile()?;
        let mut encoder = GzEncoder::new(File::create(file.path())?, Compression::default());
        encoder.write_all(b"@r1\nACGTT\n+\nIIIII\n@r2\nGGCA\n+\nIIII\n")?;
        encoder.finish()?;

        let sequences = read_sequences(file.path(), Some(Alphabet::Dna))?;
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[1].symbols(), b"GGCA");
        assert_eq!(sequences[0].quality(), Some(&b"IIIII"[..]));
        Ok(())
    }

    #[test]
    fn test_explicit_alphabet_is_enforced() -> Result<()> {
        let file = Builder::new().suffix(".fa").tempfile()?;
        std::fs::write(file.path(), ">p\nMKVLE\n")?;
        assert!(read_sequences(file.path(), Some(Alphabet::Dna)).is_err());
        Ok(())
    }

    #[test]
    fn test_fasta_wrapping() -> Result<()> {
        let mut buffer = Vec::new();
        write_fasta_record(&mut buffer, "long", &[b'A'; 70])?;
        let text = String::from_utf8(buffer)?;
        let lines: Vec<&str> = text.lines().collect();
        let (full, rest) = ("A".repeat(60), "A".repeat(10));
        assert_eq!(lines, vec![">long", full.as_str(), rest.as_str()]);
        Ok(())
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_name("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name("fa"), Some(OutputFormat::Fasta));
        assert_eq!(OutputFormat::from_name("sam"), None);
    }
}
