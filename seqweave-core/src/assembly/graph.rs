//! Bidirected de Bruijn graph over canonical k-mers
//!
//! Every node stands for a k-mer and its reverse complement. A walk visits
//! nodes in an orientation: `forward` reads the canonical k-mer, otherwise
//! its reverse complement. Right extensions are followed when reading
//! forward, left extensions when reading the reverse complement.

use super::kmer::{KmerCodec, MAX_KMER_LENGTH};
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Link to a neighbouring node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub target: u32,
    /// Both k-mers are read in the same orientation along this edge
    pub same_orientation: bool,
}

impl Edge {
    /// Orientation in which `target` is read after leaving a node read in
    /// orientation `forward`
    #[inline]
    pub fn next_orientation(&self, forward: bool) -> bool {
        forward == self.same_orientation
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kmer: u64,
    /// Occurrences of the k-mer on either strand
    pub coverage: u32,
    left: Vec<Edge>,
    right: Vec<Edge>,
    deleted: bool,
}

impl Node {
    pub fn left(&self) -> &[Edge] {
        &self.left
    }

    pub fn right(&self) -> &[Edge] {
        &self.right
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn extension_count(&self) -> usize {
        self.left.len() + self.right.len()
    }

    fn side_mut(&mut self, forward: bool) -> &mut Vec<Edge> {
        if forward {
            &mut self.right
        } else {
            &mut self.left
        }
    }
}

/// k-mer counts and edge words collected from one chunk of reads
#[derive(Default)]
struct Partition {
    kmers: HashMap<u64, u32>,
    edges: HashSet<u64>,
}

#[derive(Debug, Clone)]
pub struct DeBruijnGraph {
    codec: KmerCodec,
    nodes: Vec<Node>,
    index: HashMap<u64, u32>,
    live: usize,
}

impl DeBruijnGraph {
    /// Count the canonical k-mers and (k+1)-mers of `reads`. Reads are
    /// consumed `batch_size` at a time; each batch is split into chunks
    /// counted in parallel and merged in chunk order. Node ids follow the
    /// sorted canonical k-mers, so the graph does not depend on the thread
    /// count.
    pub fn build(
        reads: &[&[u8]],
        k: usize,
        batch_size: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self> {
        if k > MAX_KMER_LENGTH {
            return Err(Error::invalid_argument(format!(
                "k-mer length {} exceeds {}",
                k, MAX_KMER_LENGTH
            )));
        }
        let codec = KmerCodec::new(k)?;
        let edge_codec = KmerCodec::new(k + 1)?;

        let mut kmers: BTreeMap<u64, u32> = BTreeMap::new();
        let mut edges: BTreeSet<u64> = BTreeSet::new();
        for (number, batch) in reads.chunks(batch_size.max(1)).enumerate() {
            checkpoint(cancel)?;
            let chunk_size = (batch.len() / rayon::current_num_threads()).max(1);
            let partitions: Vec<Partition> = batch
                .par_chunks(chunk_size)
                .map(|chunk| count_partition(chunk, &codec, &edge_codec))
                .collect();
            log::debug!(
                "Batch {}: {} reads counted in {} partitions",
                number,
                batch.len(),
                partitions.len()
            );
            for partition in partitions {
                for (kmer, count) in partition.kmers {
                    let total = kmers.entry(kmer).or_insert(0);
                    *total = total.saturating_add(count);
                }
                edges.extend(partition.edges);
            }
        }

        let mut index = HashMap::with_capacity(kmers.len());
        let mut nodes = Vec::with_capacity(kmers.len());
        for (id, (kmer, coverage)) in kmers.into_iter().enumerate() {
            index.insert(kmer, id as u32);
            nodes.push(Node {
                kmer,
                coverage,
                left: Vec::new(),
                right: Vec::new(),
                deleted: false,
            });
        }

        for word in edges {
            let (prefix, prefix_forward) = codec.canonical(edge_codec.prefix(word));
            let (suffix, suffix_forward) = codec.canonical(edge_codec.suffix(word));
            let (Some(&p), Some(&s)) = (index.get(&prefix), index.get(&suffix)) else {
                continue;
            };
            let same_orientation = prefix_forward == suffix_forward;
            nodes[p as usize].side_mut(prefix_forward).push(Edge {
                target: s,
                same_orientation,
            });
            nodes[s as usize].side_mut(!suffix_forward).push(Edge {
                target: p,
                same_orientation,
            });
        }
        for node in &mut nodes {
            node.left.sort_unstable();
            node.left.dedup();
            node.right.sort_unstable();
            node.right.dedup();
        }

        let live = nodes.len();
        log::info!("Built de Bruijn graph: {} nodes (k = {})", live, k);
        Ok(Self {
            codec,
            nodes,
            index,
            live,
        })
    }

    pub fn kmer_length(&self) -> usize {
        self.codec.k()
    }

    pub fn codec(&self) -> &KmerCodec {
        &self.codec
    }

    /// Live node count
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    /// Ids of live nodes, ascending
    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.deleted)
            .map(|(id, _)| id as u32)
    }

    /// Live node ids as a vector, for parallel scans
    pub fn live_ids(&self) -> Vec<u32> {
        self.node_ids().collect()
    }

    pub fn find(&self, kmer: u64) -> Option<u32> {
        self.index
            .get(&kmer)
            .copied()
            .filter(|&id| !self.nodes[id as usize].deleted)
    }

    /// Extensions followed when leaving `id` read in orientation `forward`
    pub fn successors(&self, id: u32, forward: bool) -> &[Edge] {
        let node = &self.nodes[id as usize];
        if forward {
            &node.right
        } else {
            &node.left
        }
    }

    /// Extensions leading into `id` read in orientation `forward`
    pub fn predecessors(&self, id: u32, forward: bool) -> &[Edge] {
        self.successors(id, !forward)
    }

    /// The k-mer of `id` as read in orientation `forward`
    pub fn sequence(&self, id: u32, forward: bool) -> Vec<u8> {
        let kmer = self.nodes[id as usize].kmer;
        if forward {
            self.codec.decode(kmer)
        } else {
            self.codec.decode(self.codec.reverse_complement(kmer))
        }
    }

    pub fn is_palindrome(&self, id: u32) -> bool {
        self.codec.is_palindrome(self.nodes[id as usize].kmer)
    }

    /// Delete nodes together with every edge touching them
    pub fn remove_nodes<I: IntoIterator<Item = u32>>(&mut self, ids: I) -> usize {
        let mut neighbours = BTreeSet::new();
        let mut removed = 0;
        for id in ids {
            let node = &mut self.nodes[id as usize];
            if node.deleted {
                continue;
            }
            node.deleted = true;
            neighbours.extend(node.left.drain(..).map(|e| e.target));
            neighbours.extend(node.right.drain(..).map(|e| e.target));
            removed += 1;
        }
        for id in neighbours {
            if self.nodes[id as usize].deleted {
                continue;
            }
            let (left, right) = {
                let node = &self.nodes[id as usize];
                (
                    self.live_edges(&node.left),
                    self.live_edges(&node.right),
                )
            };
            let node = &mut self.nodes[id as usize];
            node.left = left;
            node.right = right;
        }
        self.live -= removed;
        removed
    }

    fn live_edges(&self, edges: &[Edge]) -> Vec<Edge> {
        edges
            .iter()
            .copied()
            .filter(|e| !self.nodes[e.target as usize].deleted)
            .collect()
    }

    /// Remove the single edge `edge` leaving `from` in orientation
    /// `forward`, together with its mirror on the target
    pub fn remove_edge(&mut self, from: u32, forward: bool, edge: Edge) {
        self.nodes[from as usize]
            .side_mut(forward)
            .retain(|e| *e != edge);
        let arrival = edge.next_orientation(forward);
        let mirror = Edge {
            target: from,
            same_orientation: edge.same_orientation,
        };
        self.nodes[edge.target as usize]
            .side_mut(!arrival)
            .retain(|e| *e != mirror);
    }
}

fn count_partition(reads: &[&[u8]], codec: &KmerCodec, edge_codec: &KmerCodec) -> Partition {
    let mut partition = Partition::default();
    for read in reads {
        for (_, kmer, _) in codec.canonical_windows(read) {
            *partition.kmers.entry(kmer).or_insert(0) += 1;
        }
        for (_, word, _) in edge_codec.canonical_windows(read) {
            partition.edges.insert(word);
        }
    }
    partition
}
