//! Scaffolding: order and orient contigs with mate-pair reads

use super::clone_library::CloneLibrary;
use super::contig::Contig;
use super::kmer::{reverse_complement, KmerCodec};
use crate::error::{Error, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// `name.X1:lib` / `name.Y1:lib` and `name.F:lib` / `name.R:lib`
const MATE_ID_PATTERN: &str = r"^(?P<name>.+)\.(?P<end>X1|Y1|F|R):(?P<library>[^:\s]+)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateEnd {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatePair {
    /// Read indices of the two ends
    pub forward: usize,
    pub reverse: usize,
    pub library: String,
}

/// Pairs reads by their ids
pub struct MatePairMapper {
    pattern: Regex,
}

impl MatePairMapper {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(MATE_ID_PATTERN)
            .map_err(|e| Error::invalid_argument(format!("mate id pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Split a read id into (name, end, library)
    pub fn parse<'a>(&self, id: &'a str) -> Option<(&'a str, MateEnd, &'a str)> {
        let captures = self.pattern.captures(id)?;
        let end = match captures.name("end")?.as_str() {
            "X1" | "F" => MateEnd::Forward,
            _ => MateEnd::Reverse,
        };
        Some((
            captures.name("name")?.as_str(),
            end,
            captures.name("library")?.as_str(),
        ))
    }

    /// Complete pairs, ordered by the index of their forward read. The
    /// first read of each end wins when a name repeats.
    pub fn pair<'a, I: IntoIterator<Item = &'a str>>(&self, ids: I) -> Vec<MatePair> {
        let mut ends: BTreeMap<(String, String), (Option<usize>, Option<usize>)> = BTreeMap::new();
        for (index, id) in ids.into_iter().enumerate() {
            let Some((name, end, library)) = self.parse(id) else {
                continue;
            };
            let slot = ends
                .entry((name.to_string(), library.to_ascii_uppercase()))
                .or_default();
            let target = match end {
                MateEnd::Forward => &mut slot.0,
                MateEnd::Reverse => &mut slot.1,
            };
            target.get_or_insert(index);
        }
        let mut pairs: Vec<MatePair> = ends
            .into_iter()
            .filter_map(|((_, library), ends)| match ends {
                (Some(forward), Some(reverse)) => Some(MatePair {
                    forward,
                    reverse,
                    library,
                }),
                _ => None,
            })
            .collect();
        pairs.sort_by_key(|p| p.forward);
        pairs
    }
}

/// Exact whole-read placement on a contig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReadPlacement {
    contig: usize,
    start: usize,
    /// Read matches the contig's forward strand
    forward: bool,
}

/// Forward-strand k-mer positions of every contig
struct ContigIndex<'c> {
    codec: KmerCodec,
    contigs: &'c [Contig],
    positions: HashMap<u64, Vec<(usize, usize)>>,
}

impl<'c> ContigIndex<'c> {
    fn new(contigs: &'c [Contig], k: usize) -> Result<Self> {
        let codec = KmerCodec::new(k)?;
        let mut positions: HashMap<u64, Vec<(usize, usize)>> = HashMap::new();
        for (c, contig) in contigs.iter().enumerate() {
            for start in 0..(contig.len() + 1).saturating_sub(k) {
                if let Some(word) = codec.encode(&contig.sequence[start..]) {
                    positions.entry(word).or_default().push((c, start));
                }
            }
        }
        Ok(Self {
            codec,
            contigs,
            positions,
        })
    }

    /// The single placement of `read` on either strand, if there is one
    fn place(&self, read: &[u8]) -> Option<ReadPlacement> {
        let reverse = reverse_complement(read);
        let mut found = HashSet::new();
        for (strand, forward) in [(read, true), (reverse.as_slice(), false)] {
            let Some(word) = self.codec.encode(strand) else {
                continue;
            };
            for &(contig, start) in self.positions.get(&word).into_iter().flatten() {
                let sequence = &self.contigs[contig].sequence;
                if sequence.get(start..start + strand.len()) == Some(strand) {
                    found.insert(ReadPlacement {
                        contig,
                        start,
                        forward,
                    });
                }
            }
        }
        if found.len() == 1 {
            found.into_iter().next()
        } else {
            None
        }
    }
}

/// Evidence that one oriented contig follows another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContigLink {
    pub from: usize,
    pub from_forward: bool,
    pub to: usize,
    pub to_forward: bool,
    /// Supporting mate pairs
    pub support: usize,
    /// Estimated gap between the two contigs, each pair weighted by the
    /// inverse variance of its library
    pub distance: f64,
    /// Standard deviation of `distance`
    pub standard_deviation: f64,
}

/// Contigs in scaffold order, with their orientation and the gaps between
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scaffold {
    pub contigs: Vec<(usize, bool)>,
    pub gaps: Vec<usize>,
    pub sequence: Vec<u8>,
}

/// Links contigs with mate pairs and walks the links greedily
pub struct Scaffolder<'a> {
    pub libraries: &'a CloneLibrary,
    /// Minimum supporting pairs per link
    pub redundancy: usize,
    /// Maximum contigs per scaffold
    pub depth: usize,
    pub kmer_length: usize,
}

impl Scaffolder<'_> {
    /// Link estimates between contig pairs, already filtered by support
    pub fn links(&self, contigs: &[Contig], reads: &[(&str, &[u8])]) -> Result<Vec<ContigLink>> {
        let mapper = MatePairMapper::new()?;
        let pairs = mapper.pair(reads.iter().map(|(id, _)| *id));
        if pairs.is_empty() || contigs.is_empty() {
            return Ok(Vec::new());
        }
        let index = ContigIndex::new(contigs, self.kmer_length)?;

        let estimates: Vec<((usize, bool, usize, bool), (f64, f64))> = pairs
            .par_iter()
            .filter_map(|pair| {
                let library = self.libraries.get(&pair.library)?;
                let forward_read = reads[pair.forward].1;
                let reverse_read = reads[pair.reverse].1;
                let f = index.place(forward_read)?;
                let r = index.place(reverse_read)?;
                if f.contig == r.contig {
                    return None;
                }
                let first_len = contigs[f.contig].len();
                let second_len = contigs[r.contig].len();
                // offset of the fragment start in the oriented first contig
                let offset = if f.forward {
                    f.start
                } else {
                    first_len - (f.start + forward_read.len())
                };
                // the reverse read lies on the opposite strand of the fragment
                let second_forward = !r.forward;
                let end = if second_forward {
                    r.start + reverse_read.len()
                } else {
                    second_len - r.start
                };
                let gap = library.mean_length_of_insert
                    - (first_len - offset) as f64
                    - end as f64;
                Some((
                    normalize(f.contig, f.forward, r.contig, second_forward),
                    (gap, library.standard_deviation),
                ))
            })
            .collect();

        let mut bundles: BTreeMap<(usize, bool, usize, bool), Vec<(f64, f64)>> = BTreeMap::new();
        for (key, estimate) in estimates {
            bundles.entry(key).or_default().push(estimate);
        }
        let links: Vec<ContigLink> = bundles
            .into_iter()
            .filter(|(_, estimates)| estimates.len() >= self.redundancy.max(1))
            .map(|((from, from_forward, to, to_forward), estimates)| {
                let (distance, standard_deviation) = weighted_distance(&estimates);
                ContigLink {
                    from,
                    from_forward,
                    to,
                    to_forward,
                    support: estimates.len(),
                    distance,
                    standard_deviation,
                }
            })
            .collect();
        log::debug!(
            "{} mate pairs gave {} contig links",
            pairs.len(),
            links.len()
        );
        Ok(links)
    }

    /// Every contig in exactly one scaffold; scaffolds start from the
    /// contigs in input order
    pub fn scaffold(&self, contigs: &[Contig], reads: &[(&str, &[u8])]) -> Result<Vec<Scaffold>> {
        let links = self.links(contigs, reads)?;
        let mut next: HashMap<(usize, bool), Vec<(usize, bool, &ContigLink)>> = HashMap::new();
        for link in &links {
            next.entry((link.from, link.from_forward))
                .or_default()
                .push((link.to, link.to_forward, link));
            next.entry((link.to, !link.to_forward))
                .or_default()
                .push((link.from, !link.from_forward, link));
        }

        let depth = self.depth.max(1);
        let mut used = vec![false; contigs.len()];
        let mut scaffolds = Vec::new();
        for seed in 0..contigs.len() {
            if used[seed] {
                continue;
            }
            used[seed] = true;
            let mut path: Vec<(usize, bool)> = vec![(seed, true)];
            let mut gaps: Vec<f64> = Vec::new();

            let mut tail = (seed, true);
            while path.len() < depth {
                let Some((contig, forward, distance)) = best_step(&next, tail, &used) else {
                    break;
                };
                used[contig] = true;
                path.push((contig, forward));
                gaps.push(distance);
                tail = (contig, forward);
            }
            let mut head = (seed, false);
            while path.len() < depth {
                let Some((contig, forward, distance)) = best_step(&next, head, &used) else {
                    break;
                };
                used[contig] = true;
                path.insert(0, (contig, !forward));
                gaps.insert(0, distance);
                head = (contig, forward);
            }

            scaffolds.push(assemble(contigs, path, &gaps));
        }
        log::info!(
            "Scaffolded {} contigs into {} scaffolds",
            contigs.len(),
            scaffolds.len()
        );
        Ok(scaffolds)
    }
}

/// The strongest link out of `from` to an unused contig: most support,
/// then the shortest gap, then the lowest contig index
fn best_step(
    next: &HashMap<(usize, bool), Vec<(usize, bool, &ContigLink)>>,
    from: (usize, bool),
    used: &[bool],
) -> Option<(usize, bool, f64)> {
    next.get(&from)?
        .iter()
        .filter(|(contig, _, _)| !used[*contig])
        .min_by(|a, b| {
            b.2.support
                .cmp(&a.2.support)
                .then_with(|| a.2.distance.total_cmp(&b.2.distance))
                .then_with(|| a.0.cmp(&b.0))
        })
        .map(|&(contig, forward, link)| (contig, forward, link.distance))
}

/// Inverse-variance weighted mean of `(gap, standard deviation)` estimates
/// and its standard deviation. Estimates from zero-deviation libraries are
/// exact and outweigh all others.
fn weighted_distance(estimates: &[(f64, f64)]) -> (f64, f64) {
    let exact: Vec<f64> = estimates
        .iter()
        .filter(|(_, sd)| *sd <= 0.0)
        .map(|(gap, _)| *gap)
        .collect();
    if !exact.is_empty() {
        return (exact.iter().sum::<f64>() / exact.len() as f64, 0.0);
    }
    let (mut weighted, mut total) = (0.0, 0.0);
    for (gap, sd) in estimates {
        let weight = 1.0 / (sd * sd);
        weighted += gap * weight;
        total += weight;
    }
    (weighted / total, (1.0 / total).sqrt())
}

/// (a, oa) -> (b, ob) is the same link as (b, !ob) -> (a, !oa); keep the
/// form starting at the lower contig index
fn normalize(a: usize, oa: bool, b: usize, ob: bool) -> (usize, bool, usize, bool) {
    if a <= b {
        (a, oa, b, ob)
    } else {
        (b, !ob, a, !oa)
    }
}

fn assemble(contigs: &[Contig], path: Vec<(usize, bool)>, gaps: &[f64]) -> Scaffold {
    let mut sequence = Vec::new();
    let mut filled = Vec::with_capacity(gaps.len());
    for (i, &(contig, forward)) in path.iter().enumerate() {
        if i > 0 {
            let gap = gaps[i - 1].round().max(1.0) as usize;
            sequence.extend(std::iter::repeat(b'N').take(gap));
            filled.push(gap);
        }
        if forward {
            sequence.extend_from_slice(&contigs[contig].sequence);
        } else {
            sequence.extend(reverse_complement(&contigs[contig].sequence));
        }
    }
    Scaffold {
        contigs: path,
        gaps: filled,
        sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &str = "GCACGAAACTTGTTGGCCCAGTGTGAATCGTAGGCTACTA";
    const SECOND: &str = "TTCGAGCCATGACAGGTCTACGGATTCAATCCGCATGCTT";
    const THIRD: &str = "ACCTGGTTACGAATGCG";

    fn contig(sequence: &str) -> Contig {
        Contig {
            sequence: sequence.as_bytes().to_vec(),
            nodes: Vec::new(),
            coverage: 1.0,
        }
    }

    fn libraries() -> CloneLibrary {
        let mut libraries = CloneLibrary::new();
        libraries.register("T", 60.0, 6.0).unwrap();
        libraries
    }

    /// Mate pairs from a fragment spanning FIRST, a 5 base gap and SECOND
    fn reads() -> Vec<(String, Vec<u8>)> {
        library_reads("T")
    }

    fn library_reads(library: &str) -> Vec<(String, Vec<u8>)> {
        let mut reads = Vec::new();
        for (n, start) in [15usize, 22].into_iter().enumerate() {
            let forward = FIRST[start..start + 10].as_bytes().to_vec();
            // fragment of 60 bases ends inside SECOND
            let end = 60 - (FIRST.len() - start) - 5;
            let reverse = reverse_complement(&SECOND.as_bytes()[end - 10..end]);
            reads.push((format!("frag{}.X1:{}", n, library), forward));
            reads.push((format!("frag{}.Y1:{}", n, library), reverse));
        }
        reads
    }

    fn borrowed(reads: &[(String, Vec<u8>)]) -> Vec<(&str, &[u8])> {
        reads.iter().map(|(id, r)| (id.as_str(), r.as_slice())).collect()
    }

    fn scaffolder(libraries: &CloneLibrary, redundancy: usize) -> Scaffolder<'_> {
        Scaffolder {
            libraries,
            redundancy,
            depth: 10,
            kmer_length: 7,
        }
    }

    #[test]
    fn test_parse_mate_ids() {
        let mapper = MatePairMapper::new().unwrap();
        assert_eq!(
            mapper.parse("chromosome 2.X1:2K"),
            Some(("chromosome 2", MateEnd::Forward, "2K"))
        );
        assert_eq!(mapper.parse("read7.R:0.5K"), Some(("read7", MateEnd::Reverse, "0.5K")));
        assert_eq!(mapper.parse("read7"), None);
        assert_eq!(mapper.parse("read7.Z1:2K"), None);
    }

    #[test]
    fn test_pairing() {
        let mapper = MatePairMapper::new().unwrap();
        let ids = ["b.Y1:2K", "a.F:10K", "b.X1:2k", "a.R:10K", "single.X1:2K", "plain"];
        let pairs = mapper.pair(ids);
        assert_eq!(
            pairs,
            vec![
                MatePair { forward: 1, reverse: 3, library: "10K".to_string() },
                MatePair { forward: 2, reverse: 0, library: "2K".to_string() },
            ]
        );
    }

    #[test]
    fn test_links_estimate_gap() {
        let contigs = vec![contig(FIRST), contig(SECOND), contig(THIRD)];
        let reads = reads();
        let libraries = libraries();
        let links = scaffolder(&libraries, 2)
            .links(&contigs, &borrowed(&reads))
            .unwrap();
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!((link.from, link.from_forward, link.to, link.to_forward), (0, true, 1, true));
        assert_eq!(link.support, 2);
        assert!((link.distance - 5.0).abs() < 1e-9);
        assert!((link.standard_deviation - 18f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_links_weight_libraries_by_variance() {
        let contigs = vec![contig(FIRST), contig(SECOND)];
        // the same fragments read as a 66 base library give a gap of 11
        let mut libraries = libraries();
        libraries.register("U", 66.0, 12.0).unwrap();
        let mut reads = library_reads("T");
        reads.extend(library_reads("U"));
        let links = scaffolder(&libraries, 1)
            .links(&contigs, &borrowed(&reads))
            .unwrap();
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.support, 4);
        // (2 * 5 / 36 + 2 * 11 / 144) / (2 / 36 + 2 / 144), not the plain mean of 8
        assert!((link.distance - 6.2).abs() < 1e-9);
        assert!((link.standard_deviation - 14.4f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_distance() {
        let (distance, sd) = weighted_distance(&[(10.0, 1.0), (20.0, 2.0)]);
        assert!((distance - 12.0).abs() < 1e-9);
        assert!((sd - 0.8f64.sqrt()).abs() < 1e-9);
        // an exact library wins
        assert_eq!(weighted_distance(&[(10.0, 0.0), (20.0, 2.0)]), (10.0, 0.0));
    }

    #[test]
    fn test_scaffold_joins_linked_contigs() {
        let contigs = vec![contig(FIRST), contig(SECOND), contig(THIRD)];
        let reads = reads();
        let libraries = libraries();
        let scaffolds = scaffolder(&libraries, 2)
            .scaffold(&contigs, &borrowed(&reads))
            .unwrap();
        assert_eq!(scaffolds.len(), 2);
        assert_eq!(scaffolds[0].contigs, vec![(0, true), (1, true)]);
        assert_eq!(scaffolds[0].gaps, vec![5]);
        assert_eq!(
            scaffolds[0].sequence,
            format!("{}NNNNN{}", FIRST, SECOND).into_bytes()
        );
        assert_eq!(scaffolds[1].contigs, vec![(2, true)]);
    }

    #[test]
    fn test_reversed_contig_is_oriented() {
        // SECOND supplied as its reverse complement
        let flipped = String::from_utf8(reverse_complement(SECOND.as_bytes())).unwrap();
        let contigs = vec![contig(&flipped), contig(FIRST)];
        let reads = reads();
        let libraries = libraries();
        let scaffolds = scaffolder(&libraries, 2)
            .scaffold(&contigs, &borrowed(&reads))
            .unwrap();
        assert_eq!(scaffolds.len(), 1);
        // seeded from contig 0, which reads as the reverse complement of the
        // FIRST, gap, SECOND layout
        let expected = format!(
            "{}NNNNN{}",
            flipped,
            String::from_utf8(reverse_complement(FIRST.as_bytes())).unwrap()
        );
        assert_eq!(scaffolds[0].contigs, vec![(0, true), (1, false)]);
        assert_eq!(scaffolds[0].sequence, expected.into_bytes());
    }

    #[test]
    fn test_weak_links_are_dropped() {
        let contigs = vec![contig(FIRST), contig(SECOND)];
        let reads = reads();
        let libraries = libraries();
        let scaffolds = scaffolder(&libraries, 3)
            .scaffold(&contigs, &borrowed(&reads))
            .unwrap();
        assert_eq!(scaffolds.len(), 2);
        assert!(scaffolds.iter().all(|s| s.gaps.is_empty()));
    }

    #[test]
    fn test_unknown_library_is_ignored() {
        let contigs = vec![contig(FIRST), contig(SECOND)];
        let reads = reads();
        let libraries = CloneLibrary::with_defaults();
        let links = scaffolder(&libraries, 1)
            .links(&contigs, &borrowed(&reads))
            .unwrap();
        assert!(links.is_empty());
    }
}
