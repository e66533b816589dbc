//! Maximal unique match (MUM) search
//!
//! The references and a batch of queries are concatenated with sentinels
//! and indexed by one generalised suffix array with an LCP array. Every
//! query suffix then learns its longest match in the references from the
//! nearest reference suffixes above and below it in suffix-array order, so
//! a whole batch is matched with two linear scans. A match is kept when it
//! occurs exactly once across all references, cannot be extended to the
//! left, and (in strict MUM mode) occurs exactly once in its query as well.

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::types::{Anchor, Sequence};
use bio::data_structures::suffix_array::suffix_array;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const SENTINEL: u8 = b'$';
/// Suffix-array ranks scanned between cancellation checks
const CHECK_INTERVAL: usize = 1 << 16;
const NONE: usize = usize::MAX;

/// MUMs of one query, keyed by reference id
pub type AnchorsByReference = BTreeMap<String, Vec<Anchor>>;

/// Which uniqueness rule a match must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// Unique in both the reference and the query
    #[default]
    Mum,
    /// Unique in the reference only
    MumReference,
}

/// Parameters for MUM search
#[derive(Debug, Clone)]
pub struct MumParams {
    /// Minimum match length (must be positive)
    pub min_length: usize,
    pub mode: MatchMode,
}

impl Default for MumParams {
    fn default() -> Self {
        Self {
            min_length: 20,
            mode: MatchMode::Mum,
        }
    }
}

/// Generalised suffix array over sentinel-separated sequences
struct SuffixIndex {
    text: Vec<u8>,
    sa: Vec<usize>,
    /// `lcp[r]` is the common prefix of `sa[r - 1]` and `sa[r]`, `lcp[0] = 0`
    lcp: Vec<usize>,
    /// Text offset of the first symbol of every sequence
    starts: Vec<usize>,
}

impl SuffixIndex {
    fn new<'a>(sequences: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut text = Vec::new();
        let mut starts = Vec::new();
        for symbols in sequences {
            starts.push(text.len());
            text.extend_from_slice(symbols);
            text.push(SENTINEL);
        }
        let sa = suffix_array(&text);
        let lcp = lcp_array(&text, &sa);
        Self {
            text,
            sa,
            lcp,
            starts,
        }
    }

    /// Index of the sequence holding text position `position`
    fn owner(&self, position: usize) -> usize {
        self.starts.partition_point(|&start| start <= position) - 1
    }

    /// True when no other suffix of sequence `owner` shares the first
    /// `length` symbols of the suffix at `rank`
    fn unique_in(&self, rank: usize, length: usize, owner: usize) -> bool {
        let mut r = rank;
        while r > 0 && self.lcp[r] >= length {
            r -= 1;
            if self.owner(self.sa[r]) == owner {
                return false;
            }
        }
        let mut r = rank + 1;
        while r < self.sa.len() && self.lcp[r] >= length {
            if self.owner(self.sa[r]) == owner {
                return false;
            }
            r += 1;
        }
        true
    }
}

/// Kasai's LCP construction. Comparison stops at sentinels, so a common
/// prefix never spans two sequences.
fn lcp_array(text: &[u8], sa: &[usize]) -> Vec<usize> {
    let n = text.len();
    let mut rank = vec![0; n];
    for (r, &p) in sa.iter().enumerate() {
        rank[p] = r;
    }
    let mut lcp = vec![0; n];
    let mut l = 0;
    for p in 0..n {
        let r = rank[p];
        if r == 0 {
            l = 0;
            continue;
        }
        let pred = sa[r - 1];
        while p + l < n
            && pred + l < n
            && text[p + l] == text[pred + l]
            && text[p + l] != SENTINEL
        {
            l += 1;
        }
        lcp[r] = l;
        l = l.saturating_sub(1);
    }
    lcp
}

/// Finds MUMs between a set of references and any number of queries.
/// Uniqueness is judged across all references together.
pub struct MumFinder {
    references: Vec<Sequence>,
    params: MumParams,
    cancel: Option<CancellationToken>,
}

impl MumFinder {
    /// Fails on an empty reference set, an empty reference, duplicate
    /// reference ids or a zero minimum length.
    pub fn new(references: &[Sequence], params: MumParams) -> Result<Self> {
        if params.min_length == 0 {
            return Err(Error::invalid_argument("minimum MUM length must be positive"));
        }
        if references.is_empty() {
            return Err(Error::empty_input("reference collection"));
        }
        let mut ids = HashSet::new();
        for reference in references {
            if reference.is_empty() {
                return Err(Error::empty_input(format!("reference {}", reference.id())));
            }
            if !ids.insert(reference.id()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate reference id {}",
                    reference.id()
                )));
            }
        }
        Ok(Self {
            references: references.to_vec(),
            params,
            cancel: None,
        })
    }

    /// Check `token` between scans of the suffix array
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn references(&self) -> &[Sequence] {
        &self.references
    }

    pub fn params(&self) -> &MumParams {
        &self.params
    }

    /// MUMs of one query for every reference (possibly empty), each list
    /// ordered by reference offset then query offset
    pub fn find(&self, query: &Sequence) -> Result<AnchorsByReference> {
        let mut found = self.search(&[query])?;
        Ok(self.by_reference(found.pop().unwrap_or_default()))
    }

    /// MUMs for every query, keyed by query id then reference id. All
    /// queries share one index.
    pub fn find_all(&self, queries: &[Sequence]) -> Result<BTreeMap<String, AnchorsByReference>> {
        if queries.is_empty() {
            return Err(Error::empty_input("query collection"));
        }
        let batch: Vec<&Sequence> = queries.iter().collect();
        let found = self.search(&batch)?;

        let mut result = BTreeMap::new();
        let mut total = 0;
        for (query, per_reference) in queries.iter().zip(found) {
            total += per_reference.iter().map(Vec::len).sum::<usize>();
            result.insert(query.id().to_string(), self.by_reference(per_reference));
        }
        log::info!("Found {} MUMs across {} queries", total, queries.len());
        Ok(result)
    }

    fn by_reference(&self, per_reference: Vec<Vec<Anchor>>) -> AnchorsByReference {
        self.references
            .iter()
            .map(|r| r.id().to_string())
            .zip(per_reference)
            .collect()
    }

    /// Anchors indexed by query then reference, both in input order
    pub(crate) fn search(&self, queries: &[&Sequence]) -> Result<Vec<Vec<Vec<Anchor>>>> {
        if let Some(query) = queries.iter().find(|q| q.is_empty()) {
            return Err(Error::empty_input(format!("query {}", query.id())));
        }
        let reference_count = self.references.len();
        let index = SuffixIndex::new(
            self.references
                .iter()
                .map(Sequence::symbols)
                .chain(queries.iter().map(|q| q.symbols())),
        );
        log::debug!(
            "Indexed {} references and {} queries ({} symbols)",
            reference_count,
            queries.len(),
            index.text.len()
        );
        let (text, sa, lcp) = (&index.text, &index.sa, &index.lcp);
        let reference_end = index.starts.get(reference_count).copied().unwrap_or(text.len());
        let n = sa.len();

        // Forward scan: nearest reference suffix above every rank. For
        // reference ranks `up_lcp` holds the LCP with the previous reference
        // suffix, for query ranks the LCP with `up_ref`.
        let mut up_ref = vec![NONE; n];
        let mut up_lcp = vec![0; n];
        let (mut last, mut running) = (NONE, 0);
        for r in 0..n {
            if r % CHECK_INTERVAL == 0 {
                checkpoint(self.cancel.as_ref())?;
            }
            running = running.min(lcp[r]);
            let position = sa[r];
            if text[position] == SENTINEL {
                continue;
            }
            if last != NONE {
                up_lcp[r] = running;
            }
            if position < reference_end {
                last = r;
                running = usize::MAX;
            } else {
                up_ref[r] = last;
            }
        }

        // Backward scan: nearest reference suffix below, then the match
        // decision for every query suffix
        let mut found = vec![vec![Vec::new(); reference_count]; queries.len()];
        let mut down_lcp = vec![0; n];
        let (mut next, mut running) = (NONE, 0);
        for r in (0..n).rev() {
            if r % CHECK_INTERVAL == 0 {
                checkpoint(self.cancel.as_ref())?;
            }
            let position = sa[r];
            if text[position] != SENTINEL {
                let below = if next == NONE { 0 } else { running };
                if position < reference_end {
                    down_lcp[r] = below;
                    next = r;
                    running = usize::MAX;
                } else {
                    let above = if up_ref[r] == NONE { 0 } else { up_lcp[r] };
                    let length = above.max(below);
                    // equal LCPs on both sides mean two reference occurrences
                    if length >= self.params.min_length && above != below {
                        let (best, beyond) = if above > below {
                            (up_ref[r], up_lcp[up_ref[r]])
                        } else {
                            (next, down_lcp[next])
                        };
                        if beyond < length {
                            self.consider(&index, r, best, length, reference_count, &mut found);
                        }
                    }
                }
            }
            running = running.min(lcp[r]);
        }

        for per_reference in &mut found {
            for anchors in per_reference.iter_mut() {
                anchors.sort();
            }
        }
        for (query, per_reference) in queries.iter().zip(&found) {
            log::debug!(
                "Query {}: {} MUMs of length >= {}",
                query.id(),
                per_reference.iter().map(Vec::len).sum::<usize>(),
                self.params.min_length
            );
        }
        Ok(found)
    }

    /// Keep the reference-unique match of the query suffix at `rank` when it
    /// is left-maximal and, in strict mode, unique in its query
    fn consider(
        &self,
        index: &SuffixIndex,
        rank: usize,
        best: usize,
        length: usize,
        reference_count: usize,
        found: &mut [Vec<Vec<Anchor>>],
    ) {
        let text = &index.text;
        let t = index.sa[rank];
        let p = index.sa[best];
        // a query suffix always follows a sentinel or a query symbol
        let left = text[t - 1];
        if left != SENTINEL && p > 0 && text[p - 1] == left {
            return;
        }
        let query_owner = index.owner(t);
        if self.params.mode == MatchMode::Mum && !index.unique_in(rank, length, query_owner) {
            return;
        }
        let reference_owner = index.owner(p);
        found[query_owner - reference_count][reference_owner].push(Anchor::new(
            p - index.starts[reference_owner],
            t - index.starts[query_owner],
            length,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dna(id: &str, s: &str) -> Sequence {
        Sequence::dna(id, s).unwrap()
    }

    fn finder(reference: &str, min_length: usize, mode: MatchMode) -> MumFinder {
        MumFinder::new(&[dna("ref", reference)], MumParams { min_length, mode }).unwrap()
    }

    fn find(finder: &MumFinder, query: &str) -> Vec<Anchor> {
        finder.find(&dna("q", query)).unwrap().remove("ref").unwrap()
    }

    fn random_dna(len: usize, mut state: u64) -> String {
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                b"ACGT"[(state % 4) as usize] as char
            })
            .collect()
    }

    #[test]
    fn test_gatcg_scenario() {
        let mums = find(&finder("AAAGATCG", 4, MatchMode::Mum), "GATCGAAA");
        assert_eq!(mums, vec![Anchor::new(3, 0, 5)]);
    }

    #[test]
    fn test_repeat_in_reference_is_not_unique() {
        let mums = find(&finder("ACGTTACGTT", 4, MatchMode::MumReference), "GGACGTTGG");
        assert!(mums.is_empty());
    }

    #[test]
    fn test_query_uniqueness_modes() {
        // GATTACA appears twice in the query but once in the reference
        let reference = "CCCCGATTACACCCC";
        let query = "GATTACATTTGATTACA";
        let strict = find(&finder(reference, 5, MatchMode::Mum), query);
        assert!(strict.is_empty());

        let relaxed = find(&finder(reference, 5, MatchMode::MumReference), query);
        assert_eq!(relaxed, vec![Anchor::new(4, 0, 7), Anchor::new(4, 10, 7)]);
    }

    #[test]
    fn test_left_maximal_only() {
        let mums = find(&finder("TTACGTACGA", 3, MatchMode::MumReference), "ACGTACGA");
        // the suffixes CGTACGA, GTACGA, ... are contained in the first match
        assert_eq!(mums, vec![Anchor::new(2, 0, 8)]);
    }

    #[test]
    fn test_invalid_inputs() {
        let reference = dna("ref", "ACGT");
        let zero = MumParams {
            min_length: 0,
            ..MumParams::default()
        };
        assert!(matches!(
            MumFinder::new(&[reference.clone()], zero),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            MumFinder::new(&[dna("empty", "")], MumParams::default()),
            Err(Error::EmptyInput { .. })
        ));
        assert!(matches!(
            MumFinder::new(&[], MumParams::default()),
            Err(Error::EmptyInput { .. })
        ));
        assert!(matches!(
            MumFinder::new(&[reference.clone(), reference], MumParams::default()),
            Err(Error::InvalidArgument { .. })
        ));
        let finder = finder("ACGT", 2, MatchMode::Mum);
        assert!(matches!(
            finder.find(&dna("q", "")),
            Err(Error::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_find_all_keyed_by_query() {
        let finder = finder("AAAGATCGTTTT", 4, MatchMode::Mum);
        let queries = vec![dna("q2", "GATCGAAA"), dna("q1", "CCTTTT")];
        let result = finder.find_all(&queries).unwrap();
        let keys: Vec<&String> = result.keys().collect();
        assert_eq!(keys, vec!["q1", "q2"]);
        assert_eq!(result["q1"]["ref"], vec![Anchor::new(8, 2, 4)]);
        assert_eq!(result["q2"]["ref"], vec![Anchor::new(3, 0, 5)]);
    }

    #[test]
    fn test_batch_matches_single_queries() {
        let reference = random_dna(600, 7);
        let finder = finder(&reference, 6, MatchMode::Mum);
        let queries = vec![
            dna("a", &reference[50..250]),
            dna("b", &format!("{}{}", &reference[400..480], &reference[100..180])),
            dna("c", &random_dna(150, 99)),
        ];
        let batch = finder.find_all(&queries).unwrap();
        for query in &queries {
            assert_eq!(batch[query.id()], finder.find(query).unwrap());
        }
        assert_eq!(batch["a"]["ref"], vec![Anchor::new(50, 0, 200)]);
    }

    #[test]
    fn test_matches_are_mapped_to_their_reference() {
        let first = random_dna(120, 3);
        let second = random_dna(90, 11);
        let references = vec![dna("chr1", &first), dna("chr2", &second)];
        let finder = MumFinder::new(&references, MumParams::default()).unwrap();

        // the tail of chr2 followed by the head of chr1
        let query = format!("{}{}", &second[40..], &first[..70]);
        let mums = finder.find(&dna("q", &query)).unwrap();
        assert_eq!(mums["chr1"], vec![Anchor::new(0, 50, 70)]);
        assert_eq!(mums["chr2"], vec![Anchor::new(40, 0, 50)]);
    }

    #[test]
    fn test_match_does_not_span_references() {
        // the query joins the end of one reference to the start of the next
        let references = vec![dna("r1", "TTTTTGATTA"), dna("r2", "CAGGGGG")];
        let finder = MumFinder::new(
            &references,
            MumParams {
                min_length: 3,
                mode: MatchMode::MumReference,
            },
        )
        .unwrap();
        let mums = finder.find(&dna("q", "GATTACAG")).unwrap();
        assert_eq!(mums["r1"], vec![Anchor::new(5, 0, 5)]);
        assert_eq!(mums["r2"], vec![Anchor::new(0, 5, 3)]);
    }

    #[test]
    fn test_self_match_of_long_sequence() {
        // one left-maximal match per query position would cost quadratic
        // time with a descent from the root at every offset
        let genome = random_dna(200_000, 42);
        let finder = finder(&genome, 20, MatchMode::Mum);
        let mums = find(&finder, &genome);
        assert_eq!(mums, vec![Anchor::new(0, 0, genome.len())]);
    }

    #[test]
    fn test_lcp_stops_at_sentinels() {
        let text = b"AC$AC$";
        let sa = suffix_array(text);
        let lcp = lcp_array(text, &sa);
        assert!(lcp.iter().all(|&l| l <= 2));
        assert_eq!(lcp.iter().filter(|&&l| l == 2).count(), 1);
    }
}
