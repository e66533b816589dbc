//! Similarity matrices for the aligners
//!
//! A matrix maps a pair of symbols to a signed substitution score. Matrices
//! are immutable once built and are shared between aligner threads by
//! reference.
//!
//! Text format accepted by [`SimilarityMatrix::parse`]:
//!
//! ```text
//! MyMatrix            <- name
//! DNA                 <- molecule type: DNA, RNA or Protein
//! A C G T             <- the N symbols (whitespace or comma separated)
//!  5 -4 -4 -4         <- N rows of N integers, optionally prefixed by
//! -4  5 -4 -4            the row symbol
//! ...
//! ```

use crate::error::{Error, Result};
use crate::types::{nucleotide_mask, Alphabet};
use std::fmt;
use std::path::Path;

const BLOSUM62: &str = include_str!("data/blosum62.txt");
const ABSENT: u8 = u8::MAX;

/// Built-in matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardMatrix {
    Blosum62,
    AmbiguousDna,
    AmbiguousRna,
}

#[derive(Clone)]
enum Scores {
    /// Identical symbols score `matches`, everything else `mismatches`
    Diagonal { matches: i32, mismatches: i32 },
    Table {
        symbols: Vec<u8>,
        /// Byte to row/column index, `ABSENT` when the symbol is unknown
        index: Box<[u8; 256]>,
        values: Vec<i32>,
    },
}

/// Substitution score table
#[derive(Clone)]
pub struct SimilarityMatrix {
    name: String,
    molecule: Option<Alphabet>,
    scores: Scores,
}

impl SimilarityMatrix {
    /// Match/mismatch matrix accepting any symbol pair
    pub fn diagonal(matches: i32, mismatches: i32) -> Self {
        Self {
            name: format!("Diagonal({}, {})", matches, mismatches),
            molecule: None,
            scores: Scores::Diagonal {
                matches,
                mismatches,
            },
        }
    }

    pub fn standard(matrix: StandardMatrix) -> Result<Self> {
        match matrix {
            StandardMatrix::Blosum62 => Self::parse(BLOSUM62),
            StandardMatrix::AmbiguousDna => Ok(Self::ambiguous_nucleotide(Alphabet::Dna)),
            StandardMatrix::AmbiguousRna => Ok(Self::ambiguous_nucleotide(Alphabet::Rna)),
        }
    }

    /// Look up a built-in matrix by name (case-insensitive)
    pub fn standard_by_name(name: &str) -> Option<StandardMatrix> {
        match name.to_ascii_lowercase().as_str() {
            "blosum62" => Some(StandardMatrix::Blosum62),
            "ambiguousdna" | "ambiguous-dna" => Some(StandardMatrix::AmbiguousDna),
            "ambiguousrna" | "ambiguous-rna" => Some(StandardMatrix::AmbiguousRna),
            _ => None,
        }
    }

    /// IUPAC-aware nucleotide scores: 5 for an identical base, -4 for a
    /// mismatch, and the expected value of the two for ambiguity codes
    fn ambiguous_nucleotide(alphabet: Alphabet) -> Self {
        let symbols: Vec<u8> = match alphabet {
            Alphabet::Rna => b"ACGURYKMSWBDHVN".to_vec(),
            _ => b"ACGTRYKMSWBDHVN".to_vec(),
        };
        let n = symbols.len();
        let mut values = Vec::with_capacity(n * n);
        for &a in &symbols {
            for &b in &symbols {
                let (ma, mb) = (nucleotide_mask(a), nucleotide_mask(b));
                let shared = (ma & mb).count_ones() as f64;
                let p = shared / (ma.count_ones() as f64 * mb.count_ones() as f64);
                values.push((9.0 * p - 4.0).round() as i32);
            }
        }
        let name = format!("Ambiguous{}", alphabet.name());
        Self::from_table(name, Some(alphabet), symbols, values)
    }

    fn from_table(
        name: String,
        molecule: Option<Alphabet>,
        symbols: Vec<u8>,
        values: Vec<i32>,
    ) -> Self {
        let mut index = Box::new([ABSENT; 256]);
        for (i, &symbol) in symbols.iter().enumerate() {
            index[symbol.to_ascii_uppercase() as usize] = i as u8;
            index[symbol.to_ascii_lowercase() as usize] = i as u8;
        }
        Self {
            name,
            molecule,
            scores: Scores::Table {
                symbols,
                index,
                values,
            },
        }
    }

    /// Parse the text format described in the module docs
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let (_, name) = lines
            .next()
            .ok_or_else(|| Error::format(1, "missing matrix name"))?;

        let (line_no, molecule) = lines
            .next()
            .ok_or_else(|| Error::format(2, "missing molecule type"))?;
        let molecule = Alphabet::from_name(molecule).ok_or_else(|| {
            Error::format(
                line_no,
                format!("unknown molecule type '{}', expected DNA, RNA or Protein", molecule),
            )
        })?;

        let (line_no, symbol_line) = lines
            .next()
            .ok_or_else(|| Error::format(3, "missing symbol line"))?;
        let mut symbols = Vec::new();
        for token in tokens(symbol_line) {
            let bytes = token.as_bytes();
            if bytes.len() != 1 || !bytes[0].is_ascii_graphic() {
                return Err(Error::format(
                    line_no,
                    format!("'{}' is not a single-character symbol", token),
                ));
            }
            let symbol = bytes[0].to_ascii_uppercase();
            if symbols.contains(&symbol) {
                return Err(Error::format(
                    line_no,
                    format!("duplicate symbol '{}'", symbol as char),
                ));
            }
            symbols.push(symbol);
        }
        if symbols.is_empty() || symbols.len() >= ABSENT as usize {
            return Err(Error::format(
                line_no,
                format!("expected 1 to {} symbols", ABSENT as usize - 1),
            ));
        }

        let n = symbols.len();
        let mut values = Vec::with_capacity(n * n);
        for row in 0..n {
            let (line_no, line) = lines.next().ok_or_else(|| {
                Error::format(
                    line_no + row + 1,
                    format!("expected {} rows, found {}", n, row),
                )
            })?;
            let mut fields: Vec<&str> = tokens(line).collect();
            if fields.len() == n + 1 {
                let label = fields.remove(0);
                if !label.eq_ignore_ascii_case(&(symbols[row] as char).to_string()) {
                    return Err(Error::format(
                        line_no,
                        format!(
                            "row label '{}' does not match symbol '{}'",
                            label, symbols[row] as char
                        ),
                    ));
                }
            }
            if fields.len() != n {
                return Err(Error::format(
                    line_no,
                    format!("expected {} values, found {}", n, fields.len()),
                ));
            }
            for field in fields {
                let value = field.parse::<i32>().map_err(|_| {
                    Error::format(line_no, format!("'{}' is not an integer", field))
                })?;
                values.push(value);
            }
        }

        if let Some((line_no, _)) = lines.next() {
            return Err(Error::format(line_no, "unexpected content after matrix rows"));
        }

        Ok(Self::from_table(name.to_string(), Some(molecule), symbols, values))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let matrix = Self::parse(&text)?;
        log::debug!(
            "Loaded similarity matrix {} ({} symbols) from {}",
            matrix.name,
            matrix.symbols().map_or(0, |s| s.len()),
            path.display()
        );
        Ok(matrix)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Molecule type the matrix was built for; `None` accepts any
    pub fn molecule(&self) -> Option<Alphabet> {
        self.molecule
    }

    /// Symbols of a table matrix; `None` for diagonal matrices
    pub fn symbols(&self) -> Option<&[u8]> {
        match &self.scores {
            Scores::Table { symbols, .. } => Some(symbols),
            Scores::Diagonal { .. } => None,
        }
    }

    pub fn is_compatible(&self, alphabet: Alphabet) -> bool {
        self.molecule.map_or(true, |m| m.is_compatible(alphabet))
    }

    /// Score of a symbol pair, or `None` if either symbol is unknown
    pub fn lookup(&self, a: u8, b: u8) -> Option<i32> {
        match &self.scores {
            Scores::Diagonal {
                matches,
                mismatches,
            } => Some(if a.eq_ignore_ascii_case(&b) {
                *matches
            } else {
                *mismatches
            }),
            Scores::Table { symbols, index, values } => {
                let (i, j) = (index[a as usize], index[b as usize]);
                if i == ABSENT || j == ABSENT {
                    None
                } else {
                    Some(values[i as usize * symbols.len() + j as usize])
                }
            }
        }
    }

    pub fn score(&self, a: u8, b: u8) -> Result<i32> {
        self.lookup(a, b).ok_or_else(|| Error::Lookup {
            matrix: self.name.clone(),
            first: a as char,
            second: b as char,
        })
    }

    /// Map a sequence to matrix codes so hot loops can score with
    /// [`SimilarityMatrix::score_codes`]. Fails on the first unknown symbol.
    pub(crate) fn encode(&self, symbols: &[u8]) -> Result<Vec<u16>> {
        symbols
            .iter()
            .map(|&s| match &self.scores {
                Scores::Diagonal { .. } => Ok(s.to_ascii_uppercase() as u16),
                Scores::Table { index, .. } => match index[s as usize] {
                    ABSENT => Err(Error::Lookup {
                        matrix: self.name.clone(),
                        first: s as char,
                        second: s as char,
                    }),
                    i => Ok(i as u16),
                },
            })
            .collect()
    }

    #[inline]
    pub(crate) fn score_codes(&self, a: u16, b: u16) -> i32 {
        match &self.scores {
            Scores::Diagonal {
                matches,
                mismatches,
            } => {
                if a == b {
                    *matches
                } else {
                    *mismatches
                }
            }
            Scores::Table { symbols, values, .. } => {
                values[a as usize * symbols.len() + b as usize]
            }
        }
    }
}

impl Default for SimilarityMatrix {
    /// Match 2, mismatch -2
    fn default() -> Self {
        Self::diagonal(2, -2)
    }
}

impl fmt::Debug for SimilarityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityMatrix")
            .field("name", &self.name)
            .field("molecule", &self.molecule)
            .field("symbols", &self.symbols().map(String::from_utf8_lossy))
            .finish()
    }
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blosum62() {
        let m = SimilarityMatrix::standard(StandardMatrix::Blosum62).unwrap();
        assert_eq!(m.name(), "BLOSUM62");
        assert_eq!(m.molecule(), Some(Alphabet::Protein));
        assert_eq!(m.score(b'W', b'W').unwrap(), 11);
        assert_eq!(m.score(b'a', b'R').unwrap(), -1);
        assert_eq!(m.score(b'*', b'*').unwrap(), 1);

        let symbols = m.symbols().unwrap().to_vec();
        for &a in &symbols {
            for &b in &symbols {
                assert_eq!(m.score(a, b).unwrap(), m.score(b, a).unwrap());
            }
        }
    }

    #[test]
    fn test_ambiguous_dna() {
        let m = SimilarityMatrix::standard(StandardMatrix::AmbiguousDna).unwrap();
        assert_eq!(m.score(b'A', b'A').unwrap(), 5);
        assert_eq!(m.score(b'A', b'C').unwrap(), -4);
        // A vs R (A or G): half the time a match
        assert_eq!(m.score(b'A', b'R').unwrap(), 1);
        assert_eq!(m.score(b'N', b'A').unwrap(), -2);
        assert!(m.score(b'U', b'A').is_err());

        let rna = SimilarityMatrix::standard(StandardMatrix::AmbiguousRna).unwrap();
        assert_eq!(rna.score(b'U', b'U').unwrap(), 5);
    }

    #[test]
    fn test_standard_names() {
        assert_eq!(
            SimilarityMatrix::standard_by_name("BLOSUM62"),
            Some(StandardMatrix::Blosum62)
        );
        assert_eq!(SimilarityMatrix::standard_by_name("pam250"), None);
    }

    #[test]
    fn test_diagonal() {
        let m = SimilarityMatrix::diagonal(1, -1);
        assert_eq!(m.score(b'G', b'g').unwrap(), 1);
        assert_eq!(m.score(b'G', b'T').unwrap(), -1);
        assert!(m.is_compatible(Alphabet::Protein));
    }

    #[test]
    fn test_parse_custom() {
        let text = "\
# custom test matrix
Simple
DNA
A, C, G, T
A  2 -1 -1 -1
C -1  2 -1 -1
G -1 -1  2 -1
T -1 -1 -1  2
";
        let m = SimilarityMatrix::parse(text).unwrap();
        assert_eq!(m.name(), "Simple");
        assert_eq!(m.score(b'c', b'c').unwrap(), 2);
        assert_eq!(m.score(b'A', b'T').unwrap(), -1);
        assert!(matches!(m.score(b'A', b'N'), Err(Error::Lookup { .. })));
        assert!(m.is_compatible(Alphabet::Rna));
        assert!(!m.is_compatible(Alphabet::Protein));
    }

    #[test]
    fn test_parse_errors() {
        let bad_molecule = "M\nMetal\nA C\n1 0\n0 1\n";
        assert!(matches!(
            SimilarityMatrix::parse(bad_molecule),
            Err(Error::Format { line: 2, .. })
        ));

        let short_row = "M\nDNA\nA C\n1 0\n0\n";
        assert!(matches!(
            SimilarityMatrix::parse(short_row),
            Err(Error::Format { line: 5, .. })
        ));

        let missing_row = "M\nDNA\nA C\n1 0\n";
        assert!(matches!(
            SimilarityMatrix::parse(missing_row),
            Err(Error::Format { .. })
        ));

        let not_integer = "M\nDNA\nA C\n1 x\n0 1\n";
        assert!(matches!(
            SimilarityMatrix::parse(not_integer),
            Err(Error::Format { line: 4, .. })
        ));

        let trailing = "M\nDNA\nA C\n1 0\n0 1\n0 0\n";
        assert!(matches!(
            SimilarityMatrix::parse(trailing),
            Err(Error::Format { line: 6, .. })
        ));
    }

    #[test]
    fn test_encode() {
        let m = SimilarityMatrix::standard(StandardMatrix::AmbiguousDna).unwrap();
        let codes = m.encode(b"ACGN").unwrap();
        assert_eq!(m.score_codes(codes[0], codes[0]), 5);
        assert_eq!(m.score_codes(codes[0], codes[1]), -4);
        assert!(m.encode(b"ACGX").is_err());
    }
}
