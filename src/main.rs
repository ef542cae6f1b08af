
use indicatif::ParallelProgressIterator;
use log::{debug, error, info, warn, LevelFilter};
use rayon::prelude::*;
use std::time::Instant;

use bandicoot::align::aligner::GraphAligner;
use bandicoot::align::result::AlignmentResult;
use bandicoot::cli::align::{check_align_settings, AlignSettings};
use bandicoot::cli::core::{get_cli, Commands};
use bandicoot::parsing::fastq::load_fastq;
use bandicoot::parsing::gfa::load_graph;
use bandicoot::parsing::seeds::load_seeds;
use bandicoot::util::progress_bar::get_progress_style;
use bandicoot::writers::alignment_writer::AlignmentWriter;

fn run_align(settings: AlignSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let settings = match check_align_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    // create the primary output folder
    info!("Creating output folder at {:?}...", settings.output_folder);
    match std::fs::create_dir_all(&settings.output_folder) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while creating output folder: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // create a debug folder if specified and save the CLI options there
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        match std::fs::create_dir_all(debug_folder) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while creating debug folder: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }

        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        let write_settings = || -> anyhow::Result<()> {
            let file = std::fs::File::create(&cli_json)?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &settings)?;
            std::io::Write::flush(&mut writer)?;
            Ok(())
        };
        if let Err(e) = write_settings() {
            error!("Error while saving align settings JSON: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // load the graph
    info!("Pre-loading sequence graph into memory...");
    let graph = match load_graph(&settings.graph_filename) {
        Ok(g) => g,
        Err(e) => {
            error!("Error while loading sequence graph: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    info!("Graph finalized with {} nodes over {} positions.", graph.node_count(), graph.buffer_len());

    // load the reads
    info!("Loading reads...");
    let reads = match load_fastq(&settings.reads_filename) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while loading reads: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    info!("Loaded {} reads.", reads.len());

    // load the optional seed hits
    let seed_hits = match settings.seeds_filename.as_deref() {
        Some(filename) => {
            info!("Loading seed hits...");
            match load_seeds(filename) {
                Ok(s) => Some(s),
                Err(e) => {
                    error!("Error while loading seed hits: {e:#}");
                    std::process::exit(exitcode::IOERR);
                }
            }
        }
        None => None
    };

    // check if we're in debug mode
    let skip_count = settings.skip_reads;
    let take_count = settings.take_reads;
    if skip_count != 0 || take_count != usize::MAX {
        warn!("Debug run detected, output may be truncated.");
        warn!("Reads to skip: {}", skip_count);
        warn!("Reads to process: {}", take_count);
    }
    let selected_reads: Vec<_> =
        reads.into_iter().skip(skip_count).take(take_count).enumerate().collect();

    // run the parallel iterator to align everything
    let style = get_progress_style();
    info!("Aligning reads...");
    let dynamic_row_start = settings.initial_full_rows * 64;
    let aligner = GraphAligner::new(&graph);
    let mut all_results: Vec<(usize, usize, Option<AlignmentResult>)> = selected_reads
        .into_par_iter()
        .progress_with_style(style)
        .map(|(read_index, read)| {
            debug!("aligning read #{read_index} ({})", read.seq_id);
            let read_seeds = seed_hits
                .as_ref()
                .and_then(|hits| hits.get(&read.seq_id))
                .filter(|hits| !hits.is_empty() && read.sequence.len() >= 3);
            let alignment = match read_seeds {
                Some(hits) => aligner.align_one_way_seeded(
                    &read.seq_id, &read.sequence, settings.band_width, hits, settings.seed_bandwidth,
                ),
                None => aligner.align_one_way(
                    &read.seq_id, &read.sequence, settings.band_width, dynamic_row_start,
                ),
            };
            let alignment = match alignment {
                Ok(result) => Some(result),
                Err(e) => {
                    error!("Error while aligning read #{read_index} ({}): {e:#}", read.seq_id);
                    None
                }
            };
            (read_index, read.sequence.len(), alignment)
        })
        .collect();

    // sort them back into input order
    all_results.sort_by_key(|(read_index, _len, _result)| *read_index);
    info!("Alignment complete, saving all outputs...");

    let alignments_fn = settings.output_folder.join("alignments.tsv.gz");
    let mut alignment_writer = match AlignmentWriter::new(&alignments_fn, settings.threads) {
        Ok(w) => w,
        Err(e) => {
            error!("Error while creating alignment writer: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    let mut aligned_reads = 0;
    let mut failed_reads = 0;
    let mut error_reads = 0;
    for (_read_index, read_length, opt_result) in all_results.into_iter() {
        if let Some(result) = opt_result {
            if result.alignment_failed {
                failed_reads += 1;
            } else {
                aligned_reads += 1;
            }
            if let Err(e) = alignment_writer.write_alignment(read_length, &result) {
                error!("Error while writing alignment results: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        } else {
            error_reads += 1;
        }
    }
    if let Err(e) = alignment_writer.finish() {
        error!("Error while finalizing alignment results: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    info!("Aligned:failed:error reads: {aligned_reads} : {failed_reads} : {error_reads}");
    info!("Alignment completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Align(settings) => {
            run_align(*settings);
        }
    }

    info!("Process finished successfully.");
}
