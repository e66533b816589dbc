use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Gap symbol used in every aligned sequence
pub const GAP: u8 = b'-';

const DNA_BASES: &[u8] = b"ACGT";
const RNA_BASES: &[u8] = b"ACGU";
const NUCLEOTIDE_AMBIGUITY: &[u8] = b"NRYKMSWBDHV";
const PROTEIN_RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWYUO";
const PROTEIN_AMBIGUITY: &[u8] = b"BZXJ";
const PROTEIN_TERMINATION: u8 = b'*';

/// Molecule type of a sequence. Closed set; symbols are uppercase ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alphabet {
    Dna,
    Rna,
    Protein,
}

impl Alphabet {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "DNA" => Some(Alphabet::Dna),
            "RNA" => Some(Alphabet::Rna),
            "PROTEIN" | "AA" => Some(Alphabet::Protein),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Alphabet::Dna => "DNA",
            Alphabet::Rna => "RNA",
            Alphabet::Protein => "Protein",
        }
    }

    pub fn is_nucleotide(&self) -> bool {
        !matches!(self, Alphabet::Protein)
    }

    /// Unambiguous symbols in canonical order
    pub fn bases(&self) -> &'static [u8] {
        match self {
            Alphabet::Dna => DNA_BASES,
            Alphabet::Rna => RNA_BASES,
            Alphabet::Protein => PROTEIN_RESIDUES,
        }
    }

    pub fn is_gap(&self, symbol: u8) -> bool {
        symbol == GAP
    }

    pub fn is_termination(&self, symbol: u8) -> bool {
        matches!(self, Alphabet::Protein) && symbol == PROTEIN_TERMINATION
    }

    pub fn is_ambiguous(&self, symbol: u8) -> bool {
        let symbol = symbol.to_ascii_uppercase();
        match self {
            Alphabet::Dna | Alphabet::Rna => NUCLEOTIDE_AMBIGUITY.contains(&symbol),
            Alphabet::Protein => PROTEIN_AMBIGUITY.contains(&symbol),
        }
    }

    /// True for bases, ambiguity codes, the gap and (protein) the stop symbol
    pub fn contains(&self, symbol: u8) -> bool {
        let symbol = symbol.to_ascii_uppercase();
        self.bases().contains(&symbol)
            || self.is_ambiguous(symbol)
            || self.is_gap(symbol)
            || self.is_termination(symbol)
    }

    /// Watson-Crick complement including IUPAC codes; `None` for protein
    pub fn complement(&self, symbol: u8) -> Option<u8> {
        let t = match self {
            Alphabet::Dna => b'T',
            Alphabet::Rna => b'U',
            Alphabet::Protein => return None,
        };
        let complement = match symbol.to_ascii_uppercase() {
            b'A' => t,
            b'T' | b'U' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            b'R' => b'Y',
            b'Y' => b'R',
            b'K' => b'M',
            b'M' => b'K',
            b'B' => b'V',
            b'V' => b'B',
            b'D' => b'H',
            b'H' => b'D',
            s @ (b'S' | b'W' | b'N' | GAP) => s,
            _ => return None,
        };
        Some(complement)
    }

    /// Fails on the first symbol outside the alphabet
    pub fn validate(&self, id: &str, symbols: &[u8]) -> Result<()> {
        match symbols.iter().position(|&s| !self.contains(s)) {
            Some(pos) => Err(Error::invalid_sequence(
                id,
                format!(
                    "symbol '{}' at position {} is not in the {} alphabet",
                    symbols[pos] as char,
                    pos,
                    self.name()
                ),
            )),
            None => Ok(()),
        }
    }

    /// Smallest alphabet accepting every symbol, preferring DNA
    pub fn infer(symbols: &[u8]) -> Option<Self> {
        [Alphabet::Dna, Alphabet::Rna, Alphabet::Protein]
            .into_iter()
            .find(|alphabet| symbols.iter().all(|&s| alphabet.contains(s)))
    }

    /// DNA and RNA interoperate; protein only with protein
    pub fn is_compatible(&self, other: Alphabet) -> bool {
        self.is_nucleotide() == other.is_nucleotide()
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bit set of the bases an IUPAC nucleotide code stands for (A=1, C=2, G=4, T/U=8)
pub fn nucleotide_mask(symbol: u8) -> u8 {
    match symbol.to_ascii_uppercase() {
        b'A' => 0b0001,
        b'C' => 0b0010,
        b'G' => 0b0100,
        b'T' | b'U' => 0b1000,
        b'R' => 0b0101,
        b'Y' => 0b1010,
        b'K' => 0b1100,
        b'M' => 0b0011,
        b'S' => 0b0110,
        b'W' => 0b1001,
        b'B' => 0b1110,
        b'D' => 0b1101,
        b'H' => 0b1011,
        b'V' => 0b0111,
        b'N' => 0b1111,
        _ => 0,
    }
}

/// IUPAC code for a base set; inverse of [`nucleotide_mask`] (T for DNA, U for RNA)
pub fn nucleotide_code(mask: u8, alphabet: Alphabet) -> u8 {
    const CODES: &[u8; 16] = b"-ACMGRSVTWYHKDBN";
    let code = CODES[(mask & 0x0f) as usize];
    if code == b'T' && alphabet == Alphabet::Rna {
        b'U'
    } else {
        code
    }
}

/// An immutable biological sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    id: String,
    alphabet: Alphabet,
    symbols: Vec<u8>,
    quality: Option<Vec<u8>>,
    #[serde(skip)]
    reverse_complement: OnceLock<Vec<u8>>,
}

impl Sequence {
    /// Build a sequence, uppercasing and validating every symbol
    pub fn new<I: Into<String>, S: Into<Vec<u8>>>(
        id: I,
        alphabet: Alphabet,
        symbols: S,
    ) -> Result<Self> {
        let id = id.into();
        let mut symbols = symbols.into();
        symbols.make_ascii_uppercase();
        alphabet.validate(&id, &symbols)?;

        Ok(Self {
            id,
            alphabet,
            symbols,
            quality: None,
            reverse_complement: OnceLock::new(),
        })
    }

    pub fn dna<I: Into<String>, S: Into<Vec<u8>>>(id: I, symbols: S) -> Result<Self> {
        Self::new(id, Alphabet::Dna, symbols)
    }

    pub fn protein<I: Into<String>, S: Into<Vec<u8>>>(id: I, symbols: S) -> Result<Self> {
        Self::new(id, Alphabet::Protein, symbols)
    }

    /// Attach per-position quality scores; the length must match
    pub fn with_quality(mut self, quality: Vec<u8>) -> Result<Self> {
        if quality.len() != self.symbols.len() {
            return Err(Error::invalid_sequence(
                &self.id,
                format!(
                    "{} quality values for {} symbols",
                    quality.len(),
                    self.symbols.len()
                ),
            ));
        }
        self.quality = Some(quality);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    pub fn quality(&self) -> Option<&[u8]> {
        self.quality.as_deref()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn has_ambiguity(&self) -> bool {
        self.symbols.iter().any(|&s| self.alphabet.is_ambiguous(s))
    }

    pub fn reverse(&self) -> Vec<u8> {
        self.symbols.iter().rev().copied().collect()
    }

    pub fn complement(&self) -> Result<Vec<u8>> {
        self.symbols
            .iter()
            .map(|&s| self.complement_symbol(s))
            .collect()
    }

    /// Reverse complement, computed on first use and cached
    pub fn reverse_complement(&self) -> Result<&[u8]> {
        if let Some(cached) = self.reverse_complement.get() {
            return Ok(cached.as_slice());
        }
        let computed = self
            .symbols
            .iter()
            .rev()
            .map(|&s| self.complement_symbol(s))
            .collect::<Result<Vec<u8>>>()?;
        Ok(self.reverse_complement.get_or_init(|| computed).as_slice())
    }

    fn complement_symbol(&self, symbol: u8) -> Result<u8> {
        self.alphabet.complement(symbol).ok_or_else(|| {
            Error::invalid_argument(format!(
                "{} sequence {} has no complement",
                self.alphabet, self.id
            ))
        })
    }

    pub fn into_symbols(self) -> Vec<u8> {
        self.symbols
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.alphabet == other.alphabet
            && self.symbols == other.symbols
            && self.quality == other.quality
    }
}

impl Eq for Sequence {}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.symbols))
    }
}

/// Exact match between a reference and a query (0-based, half-open)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Anchor {
    pub reference_start: usize,
    pub query_start: usize,
    pub length: usize,
}

impl Anchor {
    pub fn new(reference_start: usize, query_start: usize, length: usize) -> Self {
        Self {
            reference_start,
            query_start,
            length,
        }
    }

    pub fn reference_end(&self) -> usize {
        self.reference_start + self.length
    }

    pub fn query_end(&self) -> usize {
        self.query_start + self.length
    }

    /// Diagonal offset (reference minus query)
    pub fn diagonal(&self) -> i64 {
        self.reference_start as i64 - self.query_start as i64
    }
}

/// One row of an alignment: gapped symbols plus the aligned input range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedSequence {
    pub id: String,
    pub symbols: Vec<u8>,
    /// Offset of the first aligned symbol in the ungapped input
    pub start: usize,
    /// Offset one past the last aligned symbol in the ungapped input
    pub end: usize,
}

impl AlignedSequence {
    pub fn new<I: Into<String>>(id: I, symbols: Vec<u8>, start: usize) -> Self {
        let residues = symbols.iter().filter(|&&s| s != GAP).count();
        Self {
            id: id.into(),
            symbols,
            start,
            end: start + residues,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols with gaps removed
    pub fn ungapped(&self) -> Vec<u8> {
        self.symbols.iter().copied().filter(|&s| s != GAP).collect()
    }

    pub fn gap_count(&self) -> usize {
        self.symbols.iter().filter(|&&s| s == GAP).count()
    }
}

impl fmt::Display for AlignedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.symbols))
    }
}

/// Result of a pairwise alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseAlignment {
    pub first: AlignedSequence,
    pub second: AlignedSequence,
    pub score: i64,
    pub gap_open: i32,
    pub gap_extension: i32,
    /// Column consensus, filled in by the anchor-based aligner
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub consensus: Option<Vec<u8>>,
    /// Anchors that seeded the alignment, if any
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub anchors: Vec<Anchor>,
}

impl PairwiseAlignment {
    /// Number of alignment columns
    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.first
            .symbols
            .iter()
            .copied()
            .zip(self.second.symbols.iter().copied())
    }

    pub fn matches(&self) -> usize {
        self.columns().filter(|&(a, b)| a != GAP && a == b).count()
    }

    pub fn mismatches(&self) -> usize {
        self.columns()
            .filter(|&(a, b)| a != GAP && b != GAP && a != b)
            .count()
    }

    pub fn gap_columns(&self) -> usize {
        self.columns().filter(|&(a, b)| a == GAP || b == GAP).count()
    }

    /// Fraction of identical columns (0.0 to 1.0)
    pub fn identity(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.matches() as f64 / self.len() as f64
    }
}
