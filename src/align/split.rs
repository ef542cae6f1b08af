
use anyhow::{bail, ensure};
use log::debug;

use crate::align::backtrace::{estimate_correctness_and_backtrace_biggest_part, MatrixPosition};
use crate::align::band::extended_node_band;
use crate::align::bitvector::WORD_SIZE;
use crate::align::engine::{compute_slice_scores, EngineError, MatrixSlice};
use crate::align::word_slice::Score;
use crate::graph::AlignmentGraph;
use crate::util::sequence::reverse_complement;

/// Pads a read to a multiple of the word size with wildcards.
pub fn pad_sequence(sequence: &str) -> Vec<u8> {
    let mut padded = sequence.as_bytes().to_vec();
    let padding = (WORD_SIZE - padded.len() % WORD_SIZE) % WORD_SIZE;
    padded.resize(padded.len() + padding, b'N');
    padded
}

/// Scores of a seeded two-directional alignment: the read is split at the
/// seed position and the halves are aligned outward on the two strand
/// siblings of the seed node.
#[derive(Clone, Debug, Default)]
pub struct TwoDirectionalSplitAlignment {
    pub sequence_split_index: usize,
    pub scores_forward: Vec<Score>,
    pub scores_backward: Vec<Score>,
    pub min_indices_forward: Vec<usize>,
    pub min_indices_backward: Vec<usize>,
    pub node_size: usize,
    pub start_extension_width: usize,
    pub cells_processed: usize,
}

impl TwoDirectionalSplitAlignment {
    pub fn min_score(&self) -> Score {
        self.scores_forward.last().unwrap_or(&0) + self.scores_backward.last().unwrap_or(&0)
    }

    /// Upper bound used to tighten the cap for the remaining seeds
    pub fn max_score(&self) -> Score {
        self.min_score() + self.node_size as Score + 2 * self.start_extension_width as Score
    }
}

/// Backtraced halves of a split alignment, each with the read slice its
/// trace coordinates refer to. The backward trace is still in
/// reverse-complement coordinates.
#[derive(Clone, Debug)]
pub struct PiecewiseTraces {
    pub forward: Option<(Score, Vec<MatrixPosition>)>,
    pub backward: Option<(Score, Vec<MatrixPosition>)>,
}

/// Runs the four DP combinations for one seed (each half against each strand
/// band) and keeps the orientation with the lower combined score.
/// # Arguments
/// * `match_bigraph_node_id` - seed segment id; both strand siblings must exist
/// * `match_sequence_position` - split point, strictly inside the read
/// * `max_score` - cap carried into every DP pass
/// # Errors
/// * if the seed references a segment the graph does not contain
/// * if the split position is not strictly inside the read
pub fn get_split_alignment(
    graph: &AlignmentGraph, sequence: &str, dynamic_width: usize, start_extension_width: usize,
    match_bigraph_node_id: u64, match_sequence_position: usize, max_score: f64,
) -> anyhow::Result<TwoDirectionalSplitAlignment> {
    ensure!(
        match_sequence_position > 0 && match_sequence_position < sequence.len() - 1,
        "seed position {match_sequence_position} is not inside the read"
    );
    let backward_part = {
        let mut rc = reverse_complement(&sequence.as_bytes()[..match_sequence_position]);
        let padding = (WORD_SIZE - rc.len() % WORD_SIZE) % WORD_SIZE;
        rc.resize(rc.len() + padding, b'N');
        rc
    };
    let forward_part = pad_sequence(&sequence[match_sequence_position..]);
    debug_assert!(backward_part.len() + forward_part.len() <= sequence.len() + 2 * WORD_SIZE);

    let forward_node = match graph.lookup_topology(match_bigraph_node_id * 2) {
        Some(node) => node,
        None => bail!("seed references missing node {match_bigraph_node_id}"),
    };
    let backward_node = match graph.lookup_topology(match_bigraph_node_id * 2 + 1) {
        Some(node) => node,
        None => bail!("seed references missing node {match_bigraph_node_id}"),
    };
    debug_assert_eq!(graph.node_len(forward_node), graph.node_len(backward_node));

    let forward_band = extended_node_band(graph, forward_node, start_extension_width);
    let backward_band = extended_node_band(graph, backward_node, start_extension_width);
    let run = |part: &[u8], band: &[Vec<bool>]| -> Result<MatrixSlice, EngineError> {
        compute_slice_scores(graph, part, dynamic_width, band, max_score)
    };
    let forward_slice = run(&forward_part, &forward_band)?;
    let backward_slice = run(&backward_part, &backward_band)?;
    let reverse_forward_slice = run(&forward_part, &backward_band)?;
    let reverse_backward_slice = run(&backward_part, &forward_band)?;
    let cells_processed = forward_slice.cells_processed
        + backward_slice.cells_processed
        + reverse_forward_slice.cells_processed
        + reverse_backward_slice.cells_processed;

    let first_score = forward_slice.final_min_score() + backward_slice.final_min_score();
    let second_score =
        reverse_forward_slice.final_min_score() + reverse_backward_slice.final_min_score();
    debug!("split orientation scores: {first_score} / {second_score}");
    let (forward_chosen, backward_chosen) = if first_score < second_score {
        (forward_slice, backward_slice)
    } else {
        (reverse_forward_slice, reverse_backward_slice)
    };
    Ok(TwoDirectionalSplitAlignment {
        sequence_split_index: match_sequence_position,
        scores_forward: forward_chosen.min_score_per_word_slice,
        scores_backward: backward_chosen.min_score_per_word_slice,
        min_indices_forward: forward_chosen.min_score_index_per_word_slice,
        min_indices_backward: backward_chosen.min_score_index_per_word_slice,
        node_size: graph.node_len(forward_node),
        start_extension_width,
        cells_processed,
    })
}

/// Windows and backtraces both halves of the chosen split. Padding cells are
/// popped so each trace ends at its half's real read length.
pub fn get_piecewise_traces_from_split(
    graph: &AlignmentGraph, split: &TwoDirectionalSplitAlignment, sequence: &str,
) -> PiecewiseTraces {
    let start_part_size = split.sequence_split_index;
    let end_part_size = sequence.len() - split.sequence_split_index;
    let forward_sequence = pad_sequence(&sequence[split.sequence_split_index..]);
    let backward_sequence = {
        let mut rc = reverse_complement(&sequence.as_bytes()[..split.sequence_split_index]);
        let padding = (WORD_SIZE - rc.len() % WORD_SIZE) % WORD_SIZE;
        rc.resize(rc.len() + padding, b'N');
        rc
    };
    let pop_padding = |half: Option<(Score, Vec<MatrixPosition>)>,
                       real_length: usize,
                       label: &str|
     -> Option<(Score, Vec<MatrixPosition>)> {
        let (score, mut trace) = half?;
        debug!("{label} half score: {score}");
        while trace.last().is_some_and(|p| p.1 > real_length) {
            trace.pop();
        }
        if trace.is_empty() {
            return None;
        }
        Some((score, trace))
    };
    let forward = pop_padding(
        estimate_correctness_and_backtrace_biggest_part(
            graph, &forward_sequence, &split.scores_forward, &split.min_indices_forward,
        ),
        end_part_size,
        "forward",
    );
    let backward = pop_padding(
        estimate_correctness_and_backtrace_biggest_part(
            graph, &backward_sequence, &split.scores_backward, &split.min_indices_backward,
        ),
        start_part_size,
        "backward",
    );
    PiecewiseTraces { forward, backward }
}
