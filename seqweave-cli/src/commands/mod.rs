//! Command implementations for the seqweave CLI

pub mod align;
pub mod assemble;
pub mod msa;
pub mod mum;
pub mod nucmer;

use crate::config::Config;
use crate::io::OutputFormat;
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

/// Output options shared by every command
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Output format: fasta or json (default from the configuration)
    #[arg(long)]
    pub format: Option<String>,
}

impl OutputArgs {
    pub fn format(&self, config: &Config) -> Result<OutputFormat> {
        let name = self
            .format
            .as_deref()
            .unwrap_or(&config.general.output_format);
        OutputFormat::from_name(name).ok_or_else(|| anyhow!("Unknown output format '{}'", name))
    }
}
