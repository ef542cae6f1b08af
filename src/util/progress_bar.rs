
use indicatif::{ProgressState, ProgressStyle};

/// Progress styling for the read alignment loop: elapsed time, aligned read
/// counts and read throughput.
pub fn get_progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} reads ({percent_reads}) at {reads_per_sec}; ETA: {eta_precise}")
        .unwrap()
        .with_key("percent_reads", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.1}%", state.fraction()*100.0).unwrap())
        .with_key("reads_per_sec", |state: &ProgressState, w: &mut dyn std::fmt::Write| write!(w, "{:.0} reads/s", state.per_sec()).unwrap())
        .progress_chars("=>-")
}
