//! Anchor clustering
//!
//! Groups the anchors of one query/reference pair into clusters of anchors
//! lying near a common diagonal, so a query matching several distant
//! reference regions yields one chain per region instead of one global
//! chain. Anchors are taken in query order; two anchors join the same
//! cluster when they are at most `maximum_separation` apart in the query and
//! their diagonals differ by at most
//! `max(fixed_separation, separation_factor * separation)`.

use crate::chain::{Chain, ChainParams, Chainer};
use crate::types::Anchor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for anchor clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Diagonal drift always tolerated between neighbouring anchors
    pub fixed_separation: usize,
    /// Largest query distance between neighbouring anchors of a cluster
    pub maximum_separation: usize,
    /// Smallest reference span of a reported cluster
    pub minimum_score: usize,
    /// Diagonal drift tolerated per base of separation
    pub separation_factor: f64,
    /// Consecutive clusters closer than this in both sequences are merged
    pub break_length: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            fixed_separation: 5,
            maximum_separation: 1000,
            minimum_score: 200,
            separation_factor: 0.05,
            break_length: 200,
        }
    }
}

/// Splits anchors into clusters and chains each cluster
pub struct ClusterBuilder {
    params: ClusterParams,
    chainer: Chainer,
}

impl ClusterBuilder {
    pub fn new(params: ClusterParams, chain: ChainParams) -> Self {
        Self {
            params,
            chainer: Chainer::new(chain),
        }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Chains of one query against one reference, ordered by query offset.
    /// Empty when no cluster spans `minimum_score` reference bases.
    pub fn build(&self, query_id: &str, anchors: &[Anchor]) -> Vec<Chain> {
        let filtered = filter_overlaps(anchors);
        let mut chains = Vec::new();
        for members in self.group(&filtered) {
            self.extract_chains(query_id, members, &mut chains);
        }
        chains.sort_by_key(|c| (c.query_span().0, c.reference_span().0));
        let joined = self.join(chains);
        log::debug!(
            "Query {}: {} anchors in {} clusters",
            query_id,
            anchors.len(),
            joined.len()
        );
        joined
    }

    /// Union-find over neighbouring anchors
    fn group(&self, anchors: &[Anchor]) -> Vec<Vec<Anchor>> {
        let mut parent: Vec<usize> = (0..anchors.len()).collect();
        for (i, first) in anchors.iter().enumerate() {
            for (offset, second) in anchors[i + 1..].iter().enumerate() {
                let separation = second.query_start as i64 - first.query_end() as i64;
                if separation > self.params.maximum_separation as i64 {
                    break;
                }
                let drift = (second.diagonal() - first.diagonal()).unsigned_abs() as f64;
                let allowed = (self.params.fixed_separation as f64)
                    .max(self.params.separation_factor * separation as f64);
                if drift <= allowed {
                    union(&mut parent, i, i + 1 + offset);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<Anchor>> = BTreeMap::new();
        for (i, anchor) in anchors.iter().enumerate() {
            groups.entry(root(&mut parent, i)).or_default().push(*anchor);
        }
        groups.into_values().collect()
    }

    /// Chain a cluster repeatedly, taking the best chain of what is left
    /// each time
    fn extract_chains(&self, query_id: &str, mut members: Vec<Anchor>, chains: &mut Vec<Chain>) {
        while !members.is_empty() {
            let Ok(chain) = self.chainer.chain(query_id, &members) else {
                break;
            };
            // chaining trims anchor fronts only, so ends identify members
            members.retain(|a| {
                !chain
                    .anchors
                    .iter()
                    .any(|c| c.reference_end() == a.reference_end() && c.query_end() == a.query_end())
            });
            let (start, end) = chain.reference_span();
            if end - start >= self.params.minimum_score {
                chains.push(chain);
            }
        }
    }

    /// Merge a chain into its predecessor when it follows it in both
    /// sequences within `break_length`
    fn join(&self, chains: Vec<Chain>) -> Vec<Chain> {
        let mut joined: Vec<Chain> = Vec::with_capacity(chains.len());
        for chain in chains {
            if let Some(last) = joined.last_mut() {
                let (reference_end, query_end) = (last.reference_span().1, last.query_span().1);
                let (reference_start, query_start) =
                    (chain.reference_span().0, chain.query_span().0);
                if reference_start >= reference_end
                    && query_start >= query_end
                    && (reference_start - reference_end).max(query_start - query_end)
                        < self.params.break_length
                {
                    last.score += chain.score;
                    last.anchors.extend(chain.anchors);
                    continue;
                }
            }
            joined.push(chain);
        }
        joined
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new(ClusterParams::default(), ChainParams::default())
    }
}

fn root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (a, b) = (root(parent, a), root(parent, b));
    // lower index wins so group order follows query order
    if a < b {
        parent[b] = a;
    } else if b < a {
        parent[a] = b;
    }
}

/// Sort by query offset, fold anchors sharing a diagonal into one, and drop
/// the shorter of two anchors that start together in one sequence and
/// overlap by at least half its length in the other
fn filter_overlaps(anchors: &[Anchor]) -> Vec<Anchor> {
    let mut sorted = anchors.to_vec();
    sorted.sort_by_key(|a| (a.query_start, a.reference_start));
    sorted.dedup();
    let mut keep = vec![true; sorted.len()];

    for i in 0..sorted.len() {
        let mut j = i + 1;
        while keep[i] && j < sorted.len() && sorted[j].query_start <= sorted[i].query_end() {
            if keep[j] {
                let (a, b) = (sorted[i], sorted[j]);
                if a.diagonal() == b.diagonal() {
                    sorted[i].length = a.length.max(b.query_end() - a.query_start);
                    keep[j] = false;
                } else if a.reference_start == b.reference_start || a.query_start == b.query_start {
                    let overlap = if a.reference_start == b.reference_start {
                        a.query_end() - b.query_start
                    } else {
                        a.reference_end().saturating_sub(b.reference_start)
                    };
                    let shorter = a.length.min(b.length);
                    if overlap * 2 >= shorter {
                        if a.length < b.length {
                            keep[i] = false;
                        } else {
                            keep[j] = false;
                        }
                    }
                }
            }
            j += 1;
        }
    }

    sorted
        .into_iter()
        .zip(keep)
        .filter_map(|(anchor, keep)| keep.then_some(anchor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(minimum_score: usize, break_length: usize) -> ClusterBuilder {
        ClusterBuilder::new(
            ClusterParams {
                minimum_score,
                break_length,
                ..ClusterParams::default()
            },
            ChainParams::default(),
        )
    }

    #[test]
    fn test_distant_diagonals_form_separate_clusters() {
        let anchors = vec![Anchor::new(100, 0, 400), Anchor::new(1300, 401, 400)];
        let chains = builder(200, 200).build("q", &anchors);
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].anchors, vec![anchors[0]]);
        assert_eq!(chains[1].anchors, vec![anchors[1]]);
    }

    #[test]
    fn test_near_diagonals_share_a_cluster() {
        // a 3-base indel between the anchors
        let anchors = vec![Anchor::new(0, 0, 50), Anchor::new(53, 50, 60)];
        let chains = builder(10, 0).build("q", &anchors);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].anchors, anchors);
        assert_eq!(chains[0].score, 110);
    }

    #[test]
    fn test_minimum_score_drops_short_clusters() {
        let anchors = vec![Anchor::new(0, 0, 30), Anchor::new(5000, 40, 300)];
        let chains = builder(200, 0).build("q", &anchors);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].reference_span(), (5000, 5300));
    }

    #[test]
    fn test_break_length_joins_close_clusters() {
        let anchors = vec![Anchor::new(0, 0, 300), Anchor::new(400, 310, 300)];
        assert_eq!(builder(100, 50).build("q", &anchors).len(), 2);

        let joined = builder(100, 200).build("q", &anchors);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].anchors, anchors);
        assert_eq!(joined[0].score, 600);
    }

    #[test]
    fn test_filter_folds_shared_diagonal() {
        let filtered = filter_overlaps(&[Anchor::new(10, 0, 20), Anchor::new(15, 5, 30)]);
        assert_eq!(filtered, vec![Anchor::new(10, 0, 35)]);
    }

    #[test]
    fn test_filter_drops_shorter_overlap() {
        // same reference start, query copies overlapping by 10 of 12 bases
        let filtered = filter_overlaps(&[Anchor::new(50, 0, 30), Anchor::new(50, 20, 12)]);
        assert_eq!(filtered, vec![Anchor::new(50, 0, 30)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(ClusterBuilder::default().build("q", &[]).is_empty());
    }
}
