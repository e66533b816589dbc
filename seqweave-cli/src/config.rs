//! Configuration handling for the seqweave CLI
//!
//! Supports loading configuration from seqweave.toml files with CLI argument overrides.

use anyhow::{anyhow, Context, Result};
use seqweave_core::msa::{DistanceFunction, ProfileScoreFunction, UpdateDistanceMethod};
use seqweave_core::{
    AlignerParams, AssemblerParams, CloneLibrary, ClusterParams, MatchMode, MsaParams, NucmerParams,
    SimilarityMatrix,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CONFIG_FILE: &str = "seqweave.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub align: AlignConfig,
    #[serde(default)]
    pub mum: MumConfig,
    #[serde(default)]
    pub nucmer: NucmerConfig,
    #[serde(default)]
    pub msa: MsaConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker threads; 0 leaves the choice to rayon
    #[serde(default)]
    pub threads: usize,

    /// Output format when --format is not given ("fasta" or "json")
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

/// Scoring shared by the aligner sections. `matrix` is `diagonal`, the name
/// of a built-in matrix or the path of a matrix file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_matrix")]
    pub matrix: String,

    /// Match score for the diagonal matrix
    #[serde(default = "default_match_score")]
    pub match_score: i32,

    /// Mismatch score for the diagonal matrix
    #[serde(default = "default_mismatch_score")]
    pub mismatch_score: i32,

    #[serde(default = "default_gap_open")]
    pub gap_open: i32,

    #[serde(default = "default_gap_extension")]
    pub gap_extension: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Largest DP matrix before switching to linear space
    #[serde(default = "default_max_matrix_cells")]
    pub max_matrix_cells: usize,

    /// Co-optimal local alignments reported
    #[serde(default = "default_max_alignments")]
    pub max_alignments: usize,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MumConfig {
    #[serde(default = "default_min_match_length")]
    pub min_length: usize,

    #[serde(default)]
    pub mode: MatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NucmerConfig {
    #[serde(default = "default_min_match_length")]
    pub min_match_length: usize,

    #[serde(default = "default_nucmer_mode")]
    pub mode: MatchMode,

    #[serde(default = "default_min_chain_score")]
    pub min_chain_score: usize,

    /// One alignment per anchor cluster instead of one per reference
    #[serde(default)]
    pub clustering: bool,

    #[serde(default)]
    pub clusters: ClusterParams,

    #[serde(default = "default_nucmer_scoring")]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsaConfig {
    /// k-mer length for the first-stage distances; 0 picks by alphabet
    #[serde(default)]
    pub kmer_length: usize,

    #[serde(default)]
    pub distance: DistanceFunction,

    #[serde(default)]
    pub linkage: UpdateDistanceMethod,

    #[serde(default)]
    pub profile_score: ProfileScoreFunction,

    #[serde(default = "default_refinement_iterations")]
    pub refinement_iterations: usize,

    #[serde(default = "default_true")]
    pub use_stage2: bool,

    #[serde(default = "default_msa_scoring")]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// 0 estimates k from the read lengths
    #[serde(default)]
    pub kmer_length: usize,

    /// 0 uses k + 1
    #[serde(default)]
    pub dangling_links_threshold: usize,

    /// 0 uses 3 * (k + 1)
    #[serde(default)]
    pub redundant_path_length_threshold: usize,

    #[serde(default)]
    pub allow_erosion: bool,

    /// 0 estimates from the coverage distribution
    #[serde(default)]
    pub erosion_threshold: u32,

    #[serde(default)]
    pub allow_low_coverage_contig_removal: bool,

    /// 0 estimates from the coverage distribution
    #[serde(default)]
    pub contig_coverage_threshold: f64,

    #[serde(default = "default_scaffold_redundancy")]
    pub scaffold_redundancy: usize,

    #[serde(default = "default_depth")]
    pub depth: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Extra clone libraries as `name,mean,sd` lines, added to the defaults
    #[serde(default)]
    pub clone_libraries: Vec<String>,
}

// Default value functions
fn default_output_format() -> String { "fasta".to_string() }
fn default_matrix() -> String { "diagonal".to_string() }
fn default_match_score() -> i32 { 2 }
fn default_mismatch_score() -> i32 { -1 }
fn default_gap_open() -> i32 { -8 }
fn default_gap_extension() -> i32 { -1 }
fn default_max_matrix_cells() -> usize { AlignerParams::default().max_matrix_cells }
fn default_max_alignments() -> usize { AlignerParams::default().max_alignments }
fn default_min_match_length() -> usize { 20 }
fn default_nucmer_mode() -> MatchMode { MatchMode::MumReference }
fn default_min_chain_score() -> usize { 1 }
fn default_refinement_iterations() -> usize { 2 }
fn default_true() -> bool { true }
fn default_scaffold_redundancy() -> usize { 2 }
fn default_depth() -> usize { 10 }
fn default_batch_size() -> usize { 100_000 }

fn default_nucmer_scoring() -> ScoringConfig {
    ScoringConfig {
        match_score: 1,
        mismatch_score: -1,
        gap_open: -13,
        gap_extension: -8,
        ..ScoringConfig::default()
    }
}

fn default_msa_scoring() -> ScoringConfig {
    ScoringConfig {
        gap_open: -4,
        ..ScoringConfig::default()
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            output_format: default_output_format(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            matrix: default_matrix(),
            match_score: default_match_score(),
            mismatch_score: default_mismatch_score(),
            gap_open: default_gap_open(),
            gap_extension: default_gap_extension(),
        }
    }
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            max_matrix_cells: default_max_matrix_cells(),
            max_alignments: default_max_alignments(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Default for MumConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_match_length(),
            mode: MatchMode::default(),
        }
    }
}

impl Default for NucmerConfig {
    fn default() -> Self {
        Self {
            min_match_length: default_min_match_length(),
            mode: default_nucmer_mode(),
            min_chain_score: default_min_chain_score(),
            clustering: false,
            clusters: ClusterParams::default(),
            scoring: default_nucmer_scoring(),
        }
    }
}

impl Default for MsaConfig {
    fn default() -> Self {
        Self {
            kmer_length: 0,
            distance: DistanceFunction::default(),
            linkage: UpdateDistanceMethod::default(),
            profile_score: ProfileScoreFunction::default(),
            refinement_iterations: default_refinement_iterations(),
            use_stage2: true,
            scoring: default_msa_scoring(),
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            kmer_length: 0,
            dangling_links_threshold: 0,
            redundant_path_length_threshold: 0,
            allow_erosion: false,
            erosion_threshold: 0,
            allow_low_coverage_contig_removal: false,
            contig_coverage_threshold: 0.0,
            scaffold_redundancy: default_scaffold_redundancy(),
            depth: default_depth(),
            batch_size: default_batch_size(),
            clone_libraries: Vec::new(),
        }
    }
}

impl ScoringConfig {
    /// Resolve the configured matrix
    pub fn matrix(&self) -> Result<Arc<SimilarityMatrix>> {
        let name = self.matrix.trim();
        let matrix = if name.eq_ignore_ascii_case("diagonal") {
            SimilarityMatrix::diagonal(self.match_score, self.mismatch_score)
        } else if let Some(standard) = SimilarityMatrix::standard_by_name(name) {
            SimilarityMatrix::standard(standard)?
        } else {
            let path = Path::new(name);
            if !path.exists() {
                return Err(anyhow!(
                    "Unknown similarity matrix '{}': not a built-in name or a file",
                    name
                ));
            }
            SimilarityMatrix::from_file(path)
                .with_context(|| format!("Failed to load similarity matrix: {}", path.display()))?
        };
        Ok(Arc::new(matrix))
    }
}

impl AlignConfig {
    pub fn aligner_params(&self) -> Result<AlignerParams> {
        Ok(AlignerParams {
            gap_open: self.scoring.gap_open,
            gap_extension: self.scoring.gap_extension,
            matrix: self.scoring.matrix()?,
            max_matrix_cells: self.max_matrix_cells,
            max_alignments: self.max_alignments,
        })
    }
}

impl NucmerConfig {
    pub fn nucmer_params(&self, max_matrix_cells: usize) -> Result<NucmerParams> {
        Ok(NucmerParams {
            min_match_length: self.min_match_length,
            mode: self.mode,
            gap_open: self.scoring.gap_open,
            gap_extension: self.scoring.gap_extension,
            matrix: self.scoring.matrix()?,
            max_matrix_cells,
            min_chain_score: self.min_chain_score,
            clusters: self.clustering.then(|| self.clusters.clone()),
        })
    }
}

impl MsaConfig {
    pub fn msa_params(&self) -> Result<MsaParams> {
        Ok(MsaParams {
            kmer_length: (self.kmer_length > 0).then_some(self.kmer_length),
            distance: self.distance,
            linkage: self.linkage,
            profile_score: self.profile_score,
            matrix: self.scoring.matrix()?,
            gap_open: self.scoring.gap_open,
            gap_extension: self.scoring.gap_extension,
            refinement_iterations: self.refinement_iterations,
            use_stage2: self.use_stage2,
            ..MsaParams::default()
        })
    }
}

impl AssemblyConfig {
    pub fn assembler_params(&self) -> Result<AssemblerParams> {
        let mut clone_library = CloneLibrary::with_defaults();
        clone_library
            .parse(&self.clone_libraries.join("\n"))
            .context("Invalid clone library in configuration")?;
        Ok(AssemblerParams {
            kmer_length: self.kmer_length,
            dangling_links_threshold: self.dangling_links_threshold,
            redundant_path_length_threshold: self.redundant_path_length_threshold,
            allow_erosion: self.allow_erosion,
            erosion_threshold: self.erosion_threshold,
            allow_low_coverage_contig_removal: self.allow_low_coverage_contig_removal,
            contig_coverage_threshold: self.contig_coverage_threshold,
            clone_library,
            scaffold_redundancy: self.scaffold_redundancy,
            depth: self.depth,
            batch_size: self.batch_size,
            ..AssemblerParams::default()
        })
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output_format, "fasta");
        assert_eq!(config.nucmer.mode, MatchMode::MumReference);
        assert_eq!(config.nucmer.scoring.gap_open, -13);
        assert_eq!(config.msa.scoring.gap_open, -4);
        assert_eq!(config.assembly.scaffold_redundancy, 2);
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.assembly.kmer_length = 21;
        config.assembly.clone_libraries = vec!["3K,3000,300".to_string()];
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.assembly.kmer_length, 21);
        assert_eq!(loaded.assembly.clone_libraries, config.assembly.clone_libraries);
        assert_eq!(loaded.align.max_matrix_cells, config.align.max_matrix_cells);
        assert_eq!(loaded.nucmer.scoring.gap_extension, -8);

        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(
            temp_file.path(),
            "[align.scoring]\nmatrix = \"blosum62\"\ngap_open = -11\n\n[mum]\nmode = \"MumReference\"\n",
        )?;
        let config = Config::load_from_file(temp_file.path())?;
        assert_eq!(config.align.scoring.gap_open, -11);
        assert_eq!(config.align.scoring.gap_extension, -1);
        assert_eq!(config.mum.mode, MatchMode::MumReference);
        assert_eq!(config.mum.min_length, 20);
        assert_eq!(config.assembly.depth, 10);

        let params = config.align.aligner_params()?;
        assert_eq!(params.matrix.name(), "BLOSUM62");
        Ok(())
    }

    #[test]
    fn test_unknown_matrix_is_rejected() {
        let scoring = ScoringConfig {
            matrix: "no-such-matrix".to_string(),
            ..ScoringConfig::default()
        };
        assert!(scoring.matrix().is_err());
    }

    #[test]
    fn test_clone_libraries_from_config() -> Result<()> {
        let config = AssemblyConfig {
            clone_libraries: vec!["3K,3000,300".to_string()],
            ..AssemblyConfig::default()
        };
        let params = config.assembler_params()?;
        assert_eq!(params.clone_library.len(), 4);
        assert!(params.clone_library.get("3k").is_some());

        let broken = AssemblyConfig {
            clone_libraries: vec!["3K,3000".to_string()],
            ..AssemblyConfig::default()
        };
        assert!(broken.assembler_params().is_err());
        Ok(())
    }
}
