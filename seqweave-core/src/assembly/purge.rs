//! Graph error removal: dangling links, redundant paths (bubbles) and
//! erosion of low-coverage tips

use super::graph::{DeBruijnGraph, Edge};
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Removes dead-end paths shorter than a length threshold
#[derive(Debug, Clone, Copy)]
pub struct DanglingLinksPurger {
    pub length_threshold: usize,
}

impl DanglingLinksPurger {
    pub fn new(length_threshold: usize) -> Self {
        Self { length_threshold }
    }

    /// Nodes of every dangling link, traced in parallel from each dead end
    pub fn detect(&self, graph: &DeBruijnGraph) -> Vec<Vec<u32>> {
        graph
            .live_ids()
            .par_iter()
            .filter_map(|&id| {
                let node = graph.node(id);
                if node.extension_count() == 0 {
                    // single node island
                    Some(vec![id])
                } else if node.right().is_empty() {
                    self.trace(graph, id, false)
                } else if node.left().is_empty() {
                    self.trace(graph, id, true)
                } else {
                    None
                }
            })
            .filter(|link| !link.is_empty())
            .collect()
    }

    /// Walk inwards from a dead end. The link ends before a node joined by
    /// other paths, at a branching node (included) or at the far end of an
    /// isolated path. Links reaching the threshold are not dangling.
    fn trace(&self, graph: &DeBruijnGraph, start: u32, forward: bool) -> Option<Vec<u32>> {
        let mut link: Vec<u32> = Vec::new();
        let (mut id, mut orientation) = (start, forward);
        loop {
            let ahead = graph.successors(id, orientation);
            let behind = graph.predecessors(id, orientation);
            if ahead.is_empty() {
                return self.add(&mut link, id).then_some(link);
            }
            if behind.len() > 1 {
                return Some(link);
            }
            if !self.add(&mut link, id) {
                return None;
            }
            if ahead.len() > 1 {
                return Some(link);
            }
            let edge = ahead[0];
            if link.contains(&edge.target) {
                return Some(link);
            }
            orientation = edge.next_orientation(orientation);
            id = edge.target;
        }
    }

    /// Append `id` unless the link is already long enough to be kept
    fn add(&self, link: &mut Vec<u32>, id: u32) -> bool {
        if link.len() >= self.length_threshold {
            return false;
        }
        if !link.contains(&id) {
            link.push(id);
        }
        true
    }

    /// Detect and remove once; returns the number of nodes removed
    pub fn purge(&self, graph: &mut DeBruijnGraph) -> usize {
        let links = self.detect(graph);
        let nodes: BTreeSet<u32> = links.into_iter().flatten().collect();
        graph.remove_nodes(nodes)
    }

    /// Purge until a pass removes nothing. At most `max_passes` passes may
    /// remove nodes.
    pub fn purge_to_fixed_point(
        &self,
        graph: &mut DeBruijnGraph,
        max_passes: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        let mut total = 0;
        // the pass that finds nothing is not counted against `max_passes`
        for pass in 0..=max_passes {
            checkpoint(cancel)?;
            let removed = self.purge(graph);
            log::debug!(
                "Dangling link pass {} (threshold {}): {} nodes removed",
                pass,
                self.length_threshold,
                removed
            );
            if removed == 0 {
                return Ok(total);
            }
            total += removed;
        }
        Err(Error::non_convergence("dangling link purge", max_passes))
    }
}

/// One unbranched path leaving a fork
#[derive(Debug, Clone)]
struct Branch {
    edge: Edge,
    interior: Vec<u32>,
    coverage: f64,
}

/// Removes the weaker of two paths that leave one node and reconverge
/// within a length threshold
#[derive(Debug, Clone, Copy)]
pub struct RedundantPathsPurger {
    pub length_threshold: usize,
}

/// A detected bubble: branches to drop, as (fork, orientation, branch)
type Redundancy = Vec<(u32, bool, Branch)>;

impl RedundantPathsPurger {
    pub fn new(length_threshold: usize) -> Self {
        Self { length_threshold }
    }

    fn detect(&self, graph: &DeBruijnGraph) -> Redundancy {
        graph
            .live_ids()
            .par_iter()
            .flat_map_iter(|&id| {
                [true, false]
                    .into_iter()
                    .filter(move |&forward| graph.successors(id, forward).len() > 1)
                    .flat_map(move |forward| self.losers(graph, id, forward))
            })
            .collect()
    }

    /// Branches out of (`fork`, `forward`) that are beaten by another branch
    /// ending at the same node and orientation
    fn losers(&self, graph: &DeBruijnGraph, fork: u32, forward: bool) -> Redundancy {
        let mut groups: BTreeMap<(u32, bool), Vec<Branch>> = BTreeMap::new();
        for &edge in graph.successors(fork, forward) {
            if let Some((end, branch)) = self.follow(graph, fork, forward, edge) {
                groups.entry(end).or_default().push(branch);
            }
        }

        let mut losers = Vec::new();
        for (_, mut branches) in groups {
            if branches.len() < 2 {
                continue;
            }
            // best first: highest coverage, then lowest node ids
            branches.sort_by(|a, b| {
                b.coverage
                    .total_cmp(&a.coverage)
                    .then_with(|| a.interior.cmp(&b.interior))
                    .then_with(|| a.edge.cmp(&b.edge))
            });
            losers.extend(branches.into_iter().skip(1).map(|b| (fork, forward, b)));
        }
        losers
    }

    /// Follow an unbranched path from `fork` along `edge` to the first node
    /// with more than one way in or out
    fn follow(
        &self,
        graph: &DeBruijnGraph,
        fork: u32,
        forward: bool,
        edge: Edge,
    ) -> Option<((u32, bool), Branch)> {
        let mut interior: Vec<u32> = Vec::new();
        let (mut id, mut orientation) = (edge.target, edge.next_orientation(forward));
        loop {
            if id == fork || interior.contains(&id) {
                return None;
            }
            let ahead = graph.successors(id, orientation);
            let behind = graph.predecessors(id, orientation);
            if behind.len() > 1 || ahead.len() != 1 {
                let coverage = if interior.is_empty() {
                    (graph.node(fork).coverage as f64 + graph.node(id).coverage as f64) / 2.0
                } else {
                    interior
                        .iter()
                        .map(|&n| graph.node(n).coverage as f64)
                        .sum::<f64>()
                        / interior.len() as f64
                };
                return Some((
                    (id, orientation),
                    Branch {
                        edge,
                        interior,
                        coverage,
                    },
                ));
            }
            if interior.len() >= self.length_threshold {
                return None;
            }
            interior.push(id);
            let next = ahead[0];
            orientation = next.next_orientation(orientation);
            id = next.target;
        }
    }

    /// Detect and remove once; returns the number of branches removed
    pub fn purge(&self, graph: &mut DeBruijnGraph) -> usize {
        let losers = self.detect(graph);
        let mut removed = 0;
        let mut seen: HashSet<Vec<u32>> = HashSet::new();
        for (fork, forward, branch) in losers {
            if branch.interior.is_empty() {
                if graph.successors(fork, forward).contains(&branch.edge) {
                    graph.remove_edge(fork, forward, branch.edge);
                    removed += 1;
                }
                continue;
            }
            let mut key = branch.interior.clone();
            key.sort_unstable();
            if branch.interior.iter().any(|&n| graph.node(n).is_deleted()) || !seen.insert(key) {
                continue;
            }
            graph.remove_nodes(branch.interior);
            removed += 1;
        }
        removed
    }

    /// Purge until no bubble is left, with at most `max_passes` passes
    /// removing paths
    pub fn purge_to_fixed_point(
        &self,
        graph: &mut DeBruijnGraph,
        max_passes: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        let mut total = 0;
        for pass in 0..=max_passes {
            checkpoint(cancel)?;
            let removed = self.purge(graph);
            log::debug!("Redundant path pass {}: {} paths removed", pass, removed);
            if removed == 0 {
                return Ok(total);
            }
            total += removed;
        }
        Err(Error::non_convergence("redundant path purge", max_passes))
    }
}

/// Repeatedly remove dead-end nodes whose coverage is below `threshold`
pub fn erode(
    graph: &mut DeBruijnGraph,
    threshold: u32,
    cancel: Option<&CancellationToken>,
) -> Result<usize> {
    let mut total = 0;
    loop {
        checkpoint(cancel)?;
        let tips: Vec<u32> = graph
            .live_ids()
            .into_par_iter()
            .filter(|&id| {
                let node = graph.node(id);
                node.coverage < threshold && (node.left().is_empty() || node.right().is_empty())
            })
            .collect();
        if tips.is_empty() {
            log::debug!("Erosion removed {} nodes (threshold {})", total, threshold);
            return Ok(total);
        }
        total += graph.remove_nodes(tips);
    }
}
