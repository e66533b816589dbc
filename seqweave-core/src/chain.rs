//! Chaining module
//!
//! Selects a consistent subset of MUM anchors with a longest increasing
//! subsequence over (query offset, reference offset). Overlapping neighbours
//! are allowed while scoring and trimmed afterwards, so the final chain is
//! strictly increasing and non-overlapping in both coordinates.

use crate::error::{Error, Result};
use crate::types::Anchor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Parameters for the chaining algorithm
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Minimum chain score (covered query bases) to keep
    pub min_score: usize,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self { min_score: 1 }
    }
}

/// A chain of anchors representing an alignment backbone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Trimmed anchors in increasing order
    pub anchors: Vec<Anchor>,
    /// Bases covered by the chain
    pub score: usize,
}

impl Chain {
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Span of this chain in query coordinates
    pub fn query_span(&self) -> (usize, usize) {
        match (self.anchors.first(), self.anchors.last()) {
            (Some(first), Some(last)) => (first.query_start, last.query_end()),
            _ => (0, 0),
        }
    }

    /// Span of this chain in reference coordinates
    pub fn reference_span(&self) -> (usize, usize) {
        match (self.anchors.first(), self.anchors.last()) {
            (Some(first), Some(last)) => (first.reference_start, last.reference_end()),
            _ => (0, 0),
        }
    }
}

/// Per-anchor DP state
#[derive(Debug, Clone, Copy)]
struct Link {
    score: usize,
    /// Bases trimmed from the front of the anchor when following `from`
    adjacent: usize,
    from: Option<usize>,
}

/// Chaining algorithm implementation
pub struct Chainer {
    params: ChainParams,
}

impl Chainer {
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }

    /// Chain the anchors of one query. Fails with `NoAnchorsFound` when no
    /// chain reaches the minimum score.
    pub fn chain(&self, query_id: &str, anchors: &[Anchor]) -> Result<Chain> {
        if anchors.is_empty() {
            return Err(Error::NoAnchorsFound {
                query: query_id.to_string(),
            });
        }

        let mut sorted = anchors.to_vec();
        sorted.sort_by(|a, b| {
            a.query_start
                .cmp(&b.query_start)
                .then(a.reference_start.cmp(&b.reference_start))
                .then(b.length.cmp(&a.length))
        });
        sorted.dedup();

        let links = self.score_links(&sorted);

        // Highest score wins; ties go to the longer anchor, then the earlier one
        let best = (0..sorted.len())
            .max_by(|&x, &y| {
                links[x]
                    .score
                    .cmp(&links[y].score)
                    .then(sorted[x].length.cmp(&sorted[y].length))
                    .then(y.cmp(&x))
            })
            .unwrap_or(0);

        let mut chosen = Vec::new();
        let mut cursor = Some(best);
        while let Some(i) = cursor {
            let adjacent = links[i].adjacent;
            let anchor = sorted[i];
            chosen.push(Anchor::new(
                anchor.reference_start + adjacent,
                anchor.query_start + adjacent,
                anchor.length - adjacent,
            ));
            cursor = links[i].from;
        }
        chosen.reverse();

        let score = links[best].score;
        if score < self.params.min_score {
            log::debug!(
                "Query {}: best chain scores {} < {}",
                query_id,
                score,
                self.params.min_score
            );
            return Err(Error::NoAnchorsFound {
                query: query_id.to_string(),
            });
        }

        log::debug!(
            "Query {}: chained {} of {} anchors, score {}",
            query_id,
            chosen.len(),
            anchors.len(),
            score
        );
        Ok(Chain {
            anchors: chosen,
            score,
        })
    }

    fn score_links(&self, sorted: &[Anchor]) -> Vec<Link> {
        let mut links: Vec<Link> = Vec::with_capacity(sorted.len());
        for (i, current) in sorted.iter().enumerate() {
            let mut link = Link {
                score: current.length,
                adjacent: 0,
                from: None,
            };
            for (j, previous) in sorted[..i].iter().enumerate() {
                if previous.reference_start >= current.reference_start
                    || previous.query_start >= current.query_start
                {
                    continue;
                }
                let overlap = previous
                    .query_end()
                    .saturating_sub(current.query_start)
                    .max(previous.reference_end().saturating_sub(current.reference_start));
                if overlap >= current.length {
                    continue;
                }
                let score = links[j].score + current.length - overlap;
                let better = match score.cmp(&link.score) {
                    Ordering::Greater => true,
                    Ordering::Equal => link
                        .from
                        .map_or(false, |k| previous.length > sorted[k].length),
                    Ordering::Less => false,
                };
                if better {
                    link = Link {
                        score,
                        adjacent: overlap,
                        from: Some(j),
                    };
                }
            }
            links.push(link);
        }
        links
    }
}

impl Default for Chainer {
    fn default() -> Self {
        Self::new(ChainParams::default())
    }
}
