//! Contigs from maximal simple paths of the de Bruijn graph

use super::graph::{DeBruijnGraph, Edge};
use super::kmer::reverse_complement;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contig {
    pub sequence: Vec<u8>,
    /// Graph nodes in path order
    pub nodes: Vec<u32>,
    /// Mean k-mer coverage along the path
    pub coverage: f64,
}

impl Contig {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Extensions that may be followed while spelling a contig
struct ValidExtensions {
    left: Vec<Vec<Edge>>,
    right: Vec<Vec<Edge>>,
}

impl ValidExtensions {
    /// Sides with several extensions, palindromic nodes and self loops end
    /// simple paths; their edges are dropped on both endpoints
    fn new(graph: &DeBruijnGraph) -> Self {
        let mut invalid: HashSet<(u32, bool, Edge)> = HashSet::new();
        for id in graph.node_ids() {
            let palindrome = graph.is_palindrome(id);
            for side in [false, true] {
                let edges = graph.successors(id, side);
                let ambiguous = palindrome || edges.len() > 1;
                let self_loop = edges.len() == 1 && edges[0].target == id;
                if !(ambiguous || self_loop) {
                    continue;
                }
                for &edge in edges {
                    invalid.insert((id, side, edge));
                    let mirror = Edge {
                        target: id,
                        same_orientation: edge.same_orientation,
                    };
                    invalid.insert((edge.target, !edge.next_orientation(side), mirror));
                }
            }
        }

        let keep = |id: u32, side: bool| -> Vec<Edge> {
            graph
                .successors(id, side)
                .iter()
                .copied()
                .filter(|&edge| !invalid.contains(&(id, side, edge)))
                .collect()
        };
        let count = graph.node_ids().last().map_or(0, |id| id as usize + 1);
        let mut left = vec![Vec::new(); count];
        let mut right = vec![Vec::new(); count];
        for id in graph.node_ids() {
            left[id as usize] = keep(id, false);
            right[id as usize] = keep(id, true);
        }
        Self { left, right }
    }

    fn successors(&self, id: u32, forward: bool) -> &[Edge] {
        if forward {
            &self.right[id as usize]
        } else {
            &self.left[id as usize]
        }
    }
}

/// Spells the maximal simple paths of a graph
pub struct SimplePathContigBuilder<'g> {
    graph: &'g DeBruijnGraph,
    valid: ValidExtensions,
}

impl<'g> SimplePathContigBuilder<'g> {
    pub fn new(graph: &'g DeBruijnGraph) -> Self {
        Self {
            graph,
            valid: ValidExtensions::new(graph),
        }
    }

    /// Every simple path once, longest first. Each linear path is traced
    /// from both ends and kept from the end whose k-mer sorts last; cycles
    /// of otherwise unused nodes are spelled from their lowest node id.
    pub fn build(&self) -> Vec<Contig> {
        let ids = self.graph.live_ids();
        let mut paths: Vec<Contig> = ids
            .par_iter()
            .filter_map(|&id| {
                let left = self.valid.successors(id, false).len();
                let right = self.valid.successors(id, true).len();
                match (left, right) {
                    (0, 0) => Some(self.trace(id, true)),
                    (1, 0) | (0, 1) => {
                        let contig = self.trace(id, right == 1);
                        let first = self.graph.node(contig.nodes[0]).kmer;
                        let last = self.graph.node(contig.nodes[contig.nodes.len() - 1]).kmer;
                        (first >= last).then_some(contig)
                    }
                    _ => None,
                }
            })
            .collect();

        let mut visited: HashSet<u32> = paths.iter().flat_map(|c| c.nodes.iter().copied()).collect();
        for &id in &ids {
            if visited.contains(&id)
                || self.valid.successors(id, false).len() != 1
                || self.valid.successors(id, true).len() != 1
            {
                continue;
            }
            let cycle = self.trace(id, true);
            visited.extend(cycle.nodes.iter().copied());
            paths.push(cycle);
        }

        let mut seen: BTreeSet<Vec<u8>> = BTreeSet::new();
        let mut contigs: Vec<Contig> = paths
            .into_iter()
            .filter(|contig| {
                let rc = reverse_complement(&contig.sequence);
                seen.insert(contig.sequence.clone().min(rc))
            })
            .collect();
        contigs.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.sequence.cmp(&b.sequence)));
        log::debug!("Built {} contigs from {} nodes", contigs.len(), ids.len());
        contigs
    }

    fn trace(&self, start: u32, forward: bool) -> Contig {
        let mut nodes = vec![start];
        let mut sequence = self.graph.sequence(start, forward);
        let (mut id, mut orientation) = (start, forward);
        while let Some(&edge) = self.valid.successors(id, orientation).first() {
            orientation = edge.next_orientation(orientation);
            id = edge.target;
            if nodes.contains(&id) {
                break;
            }
            nodes.push(id);
            if let Some(&base) = self.graph.sequence(id, orientation).last() {
                sequence.push(base);
            }
        }
        let coverage = nodes
            .iter()
            .map(|&n| self.graph.node(n).coverage as f64)
            .sum::<f64>()
            / nodes.len() as f64;
        Contig {
            sequence,
            nodes,
            coverage,
        }
    }
}

/// Delete the nodes of every contig whose mean coverage is below
/// `threshold`; returns the number of nodes removed
pub fn remove_low_coverage_contigs(graph: &mut DeBruijnGraph, threshold: f64) -> usize {
    let weak: Vec<u32> = SimplePathContigBuilder::new(graph)
        .build()
        .into_iter()
        .filter(|contig| contig.coverage < threshold)
        .flat_map(|contig| contig.nodes)
        .collect();
    let removed = graph.remove_nodes(weak);
    log::debug!("Removed {} nodes of low coverage contigs", removed);
    removed
}
