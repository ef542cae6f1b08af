
use anyhow::bail;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_optional_filename, check_required_filename, AFTER_HELP, FULL_VERSION};

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct AlignSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    bandicoot_version: String,

    /// Sequence graph (GFA)
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "graph")]
    #[clap(value_name = "GFA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub graph_filename: PathBuf,

    /// Reads to align (FASTQ)
    #[clap(required = true)]
    #[clap(short = 'f')]
    #[clap(long = "reads")]
    #[clap(value_name = "FASTQ")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_filename: PathBuf,

    /// Output directory containing the alignment table
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Optional seed hits (TSV: read_id, node_id, read_position); seeded reads use split alignment
    #[clap(short = 's')]
    #[clap(long = "seeds")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub seeds_filename: Option<PathBuf>,

    /// Optional output debug folder
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Band expansion width in characters
    #[clap(short = 'b')]
    #[clap(long = "band-width")]
    #[clap(value_name = "BP")]
    #[clap(help_heading = Some("Alignment parameters"))]
    #[clap(default_value = "64")]
    pub band_width: usize,

    /// Number of word-sized rows aligned under the full band before the band turns dynamic
    #[clap(long = "initial-full-rows")]
    #[clap(value_name = "ROWS")]
    #[clap(help_heading = Some("Alignment parameters"))]
    #[clap(default_value = "1")]
    pub initial_full_rows: usize,

    /// Band width around the seed node in seeded mode
    #[clap(long = "seed-bandwidth")]
    #[clap(value_name = "BP")]
    #[clap(help_heading = Some("Alignment parameters"))]
    #[clap(default_value = "64")]
    pub seed_bandwidth: usize,

    /// Number of threads to use for the alignment step
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,

    // Debug options that are generally hidden and just for quick testing
    /// Skips a number of reads (debug only)
    #[clap(hide = true)]
    #[clap(long = "skip")]
    #[clap(default_value = "0")]
    pub skip_reads: usize,

    /// Takes a number of reads (debug only)
    #[clap(hide = true)]
    #[clap(long = "take")]
    #[clap(default_value = "0")]
    pub take_reads: usize,
}

pub fn check_align_settings(mut settings: AlignSettings) -> anyhow::Result<AlignSettings> {
    // hard code the version in
    settings.bandicoot_version = FULL_VERSION.clone();
    info!("Bandicoot version: {:?}", &settings.bandicoot_version);
    info!("Sub-command: align");
    info!("Inputs:");

    // check for all the required input files
    check_required_filename(&settings.graph_filename, "Sequence graph")?;
    check_required_filename(&settings.reads_filename, "Reads FASTQ")?;
    check_optional_filename(settings.seeds_filename.as_deref(), "Seed hits")?;

    // dump stuff to the logger
    info!("\tGraph: {:?}", &settings.graph_filename);
    info!("\tReads: {:?}", &settings.reads_filename);
    if let Some(seeds_filename) = settings.seeds_filename.as_deref() {
        info!("\tSeeds: {seeds_filename:?}");
    } else {
        info!("\tSeeds: None");
    }

    // outputs
    info!("Outputs:");
    info!("\tOutput folder: {:?}", &settings.output_folder);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    // alignment parameters
    info!("Alignment parameters:");
    if settings.band_width == 0 {
        bail!("--band-width must be >0");
    }
    info!("\tBand width: {}", settings.band_width);
    if settings.initial_full_rows == 0 {
        bail!("--initial-full-rows must be >0");
    }
    info!("\tInitial full rows: {}", settings.initial_full_rows);
    if settings.seed_bandwidth == 0 {
        bail!("--seed-bandwidth must be >0");
    }
    info!("\tSeed bandwidth: {}", settings.seed_bandwidth);

    // 0 is just a sentinel for everything
    if settings.take_reads == 0 {
        settings.take_reads = usize::MAX;
    }

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}
