//! 2-bit packed k-mers for the de Bruijn graph

use crate::error::{Error, Result};

/// Longest k-mer whose (k+1)-mer edges still fit in a `u64`
pub const MAX_KMER_LENGTH: usize = 31;

/// Encode a nucleotide as 2 bits (A=0, C=1, G=2, T=3)
#[inline]
pub fn encode_nucleotide(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn decode_nucleotide(code: u64) -> u8 {
    b"ACGT"[(code & 3) as usize]
}

/// Reverse complement of an unambiguous DNA string
pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence
        .iter()
        .rev()
        .map(|&base| match base {
            b'A' | b'a' => b'T',
            b'T' | b't' => b'A',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            other => other,
        })
        .collect()
}

/// Packing rules for words of one fixed length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerCodec {
    k: usize,
    mask: u64,
}

impl KmerCodec {
    /// Codec for words of `k` bases; `k` may reach 32 so that edge
    /// (k+1)-mers of the longest supported k-mer can be packed too
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 || k > MAX_KMER_LENGTH + 1 {
            return Err(Error::invalid_argument(format!(
                "k-mer length {} outside 1..={}",
                k,
                MAX_KMER_LENGTH + 1
            )));
        }
        let mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        Ok(Self { k, mask })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Pack the first `k` bases of `sequence`; `None` on ambiguity or when
    /// the sequence is too short
    pub fn encode(&self, sequence: &[u8]) -> Option<u64> {
        if sequence.len() < self.k {
            return None;
        }
        sequence[..self.k]
            .iter()
            .try_fold(0u64, |word, &base| Some((word << 2) | encode_nucleotide(base)?))
    }

    pub fn decode(&self, word: u64) -> Vec<u8> {
        (0..self.k)
            .rev()
            .map(|i| decode_nucleotide(word >> (2 * i)))
            .collect()
    }

    pub fn reverse_complement(&self, word: u64) -> u64 {
        let mut result = 0u64;
        let mut rest = word;
        for _ in 0..self.k {
            result = (result << 2) | (3 - (rest & 3));
            rest >>= 2;
        }
        result
    }

    /// Smaller of the word and its reverse complement, and whether the
    /// word itself is the canonical one
    pub fn canonical(&self, word: u64) -> (u64, bool) {
        let rc = self.reverse_complement(word);
        if word <= rc {
            (word, true)
        } else {
            (rc, false)
        }
    }

    pub fn is_palindrome(&self, word: u64) -> bool {
        self.reverse_complement(word) == word
    }

    /// Leading `k - 1` bases of a `k`-mer
    pub fn prefix(&self, word: u64) -> u64 {
        word >> 2
    }

    /// Trailing `k - 1` bases of a `k`-mer
    pub fn suffix(&self, word: u64) -> u64 {
        word & (self.mask >> 2)
    }

    /// Canonical words of every unambiguous window of `sequence`, left to
    /// right. Windows touching an ambiguous base are skipped.
    pub fn canonical_windows<'a>(&'a self, sequence: &'a [u8]) -> CanonicalWindows<'a> {
        CanonicalWindows {
            codec: self,
            sequence,
            position: 0,
            forward: 0,
            reverse: 0,
            valid: 0,
        }
    }
}

/// Rolling forward and reverse-complement encodings over a sequence
pub struct CanonicalWindows<'a> {
    codec: &'a KmerCodec,
    sequence: &'a [u8],
    position: usize,
    forward: u64,
    reverse: u64,
    valid: usize,
}

impl Iterator for CanonicalWindows<'_> {
    /// (window start, canonical word, window is canonical)
    type Item = (usize, u64, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.codec.k;
        while self.position < self.sequence.len() {
            let base = self.sequence[self.position];
            self.position += 1;
            match encode_nucleotide(base) {
                Some(code) => {
                    self.forward = ((self.forward << 2) | code) & self.codec.mask;
                    self.reverse = (self.reverse >> 2) | ((3 - code) << (2 * (k - 1)));
                    self.valid += 1;
                }
                None => {
                    // reset on invalid nucleotide
                    self.forward = 0;
                    self.reverse = 0;
                    self.valid = 0;
                    continue;
                }
            }
            if self.valid >= k {
                let start = self.position - k;
                return Some(if self.forward <= self.reverse {
                    (start, self.forward, true)
                } else {
                    (start, self.reverse, false)
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nucleotide_encoding() {
        assert_eq!(encode_nucleotide(b'A'), Some(0));
        assert_eq!(encode_nucleotide(b'c'), Some(1));
        assert_eq!(encode_nucleotide(b'G'), Some(2));
        assert_eq!(encode_nucleotide(b'T'), Some(3));
        assert_eq!(encode_nucleotide(b'N'), None);
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ATCG"), b"CGAT");
        let codec = KmerCodec::new(4).unwrap();
        let word = codec.encode(b"ATCG").unwrap();
        assert_eq!(codec.decode(codec.reverse_complement(word)), b"CGAT");
    }

    #[test]
    fn test_canonical() {
        let codec = KmerCodec::new(3).unwrap();
        // TTG reverse complements to CAA
        let (word, forward) = codec.canonical(codec.encode(b"TTG").unwrap());
        assert_eq!(codec.decode(word), b"CAA");
        assert!(!forward);
        let even = KmerCodec::new(4).unwrap();
        assert!(even.is_palindrome(even.encode(b"ACGT").unwrap()));
    }

    #[test]
    fn test_prefix_and_suffix() {
        let edge = KmerCodec::new(4).unwrap();
        let node = KmerCodec::new(3).unwrap();
        let word = edge.encode(b"GATC").unwrap();
        assert_eq!(node.decode(edge.prefix(word)), b"GAT");
        assert_eq!(node.decode(edge.suffix(word)), b"ATC");
    }

    #[test]
    fn test_windows_skip_ambiguity() {
        let codec = KmerCodec::new(3).unwrap();
        let windows: Vec<_> = codec.canonical_windows(b"ACGNTTG").collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], (0, codec.encode(b"ACG").unwrap(), true));
        assert_eq!(windows[1], (4, codec.encode(b"CAA").unwrap(), false));
    }

    #[test]
    fn test_longest_edge_word() {
        let codec = KmerCodec::new(32).unwrap();
        let sequence = [b'T'; 32];
        let word = codec.encode(&sequence).unwrap();
        assert_eq!(word, u64::MAX);
        assert_eq!(codec.reverse_complement(word), 0);
        assert!(KmerCodec::new(33).is_err());
        assert!(KmerCodec::new(0).is_err());
    }
}
