
use log::trace;
use rustc_hash::FxHashSet as HashSet;

use crate::align::bitvector::WORD_SIZE;
use crate::align::correctness::estimate_correct_alignment_viterbi;
use crate::align::word_slice::Score;
use crate::graph::AlignmentGraph;
use crate::util::sequence::chars_match;

/// A cell of the implicit edit DAG: buffer position and number of read
/// characters consumed.
pub type MatrixPosition = (usize, usize);

/// An explored cell together with the index of the cell that discovered it.
struct ExpandoCell {
    position: MatrixPosition,
    backtrace_index: usize,
}

/// Largest contiguous run of set entries as an inclusive `(start, end)`
/// pair. Later runs win ties; `(0, 0)` with an unset entry at 0 means no run
/// was found.
fn largest_contiguous_block(entries: &[bool]) -> (usize, usize) {
    let mut this_block = 0usize;
    let mut max_block_size = 0usize;
    let mut max_block_end = 0usize;
    for (i, &entry) in entries.iter().enumerate() {
        if entry {
            this_block += 1;
        } else {
            if this_block > max_block_size {
                max_block_end = i - 1;
                max_block_size = this_block - 1;
            }
            this_block = 0;
        }
    }
    if this_block > max_block_size {
        max_block_end = entries.len() - 1;
        max_block_size = this_block - 1;
    }
    (max_block_end - max_block_size, max_block_end)
}

/// Reverse BFS over the implicit edit DAG from `end_position` back to read
/// position zero, bounded by the per-row score envelopes. Two distance
/// buckets are maintained; pruning discards cells whose accumulated cost
/// exceeds `score_at_end - min_score_at(row)`. Returns the final distance and
/// the trace in forward order (read position ascending, end cell included),
/// or None when the search degenerates.
/// # Arguments
/// * `sequence` - the read slice the row window covers
/// * `min_score_per_word_slice` - row minima of the window, boundary entry first
pub fn backtrace(
    graph: &AlignmentGraph, end_position: MatrixPosition, sequence: &[u8],
    min_score_per_word_slice: &[Score],
) -> Option<(Score, Vec<MatrixPosition>)> {
    debug_assert!(min_score_per_word_slice.len() * WORD_SIZE > sequence.len());
    let score_at_end = *min_score_per_word_slice.last()?;
    let mut current_distance: Score = 0;
    let mut visited_expandos: Vec<ExpandoCell> = Vec::new();
    let mut current_queue: Vec<ExpandoCell> = Vec::new();
    let mut next_queue: Vec<ExpandoCell> = Vec::new();
    current_queue.push(ExpandoCell { position: end_position, backtrace_index: 0 });
    let mut visited_cells: HashSet<(usize, usize)> = HashSet::default();

    loop {
        if current_queue.is_empty() {
            if next_queue.is_empty() {
                // the envelope pruned everything away
                return None;
            }
            std::mem::swap(&mut current_queue, &mut next_queue);
            current_distance += 1;
            if current_distance > score_at_end {
                return None;
            }
        }
        let current = current_queue.pop().expect("emptiness was handled above");
        let (w, j) = current.position;
        if j == 0 {
            visited_expandos.push(current);
            break;
        }
        let slice_index = (j - 1) / WORD_SIZE;
        debug_assert!(slice_index < min_score_per_word_slice.len());
        let max_distance_here = score_at_end - min_score_per_word_slice[slice_index];
        if current_distance > max_distance_here {
            continue;
        }
        if !visited_cells.insert((w, j)) {
            continue;
        }
        visited_expandos.push(current);
        let node = graph.index_to_node(w);
        let backtrace_index = visited_expandos.len() - 1;
        // vertical: the read character is an insertion
        next_queue.push(ExpandoCell { position: (w, j - 1), backtrace_index });
        let diagonal_match = chars_match(graph.seq_at(w), sequence[j - 1]);
        if w == graph.node_start(node) {
            for &neighbor in graph.in_neighbors(node) {
                let u = graph.node_end(neighbor) - 1;
                next_queue.push(ExpandoCell { position: (u, j), backtrace_index });
                if diagonal_match {
                    current_queue.push(ExpandoCell { position: (u, j - 1), backtrace_index });
                } else {
                    next_queue.push(ExpandoCell { position: (u, j - 1), backtrace_index });
                }
            }
        } else {
            let u = w - 1;
            next_queue.push(ExpandoCell { position: (u, j), backtrace_index });
            if diagonal_match {
                current_queue.push(ExpandoCell { position: (u, j - 1), backtrace_index });
            } else {
                next_queue.push(ExpandoCell { position: (u, j - 1), backtrace_index });
            }
        }
    }
    trace!("backtrace visited {} cells", visited_cells.len());
    debug_assert!(current_distance <= score_at_end);
    let mut index = visited_expandos.len() - 1;
    let mut result = Vec::new();
    loop {
        result.push(visited_expandos[index].position);
        if index == 0 {
            break;
        }
        debug_assert!(visited_expandos[index].backtrace_index < index);
        index = visited_expandos[index].backtrace_index;
    }
    Some((current_distance, result))
}

/// Runs the correctness estimator over the row minima, picks the largest
/// contiguous correct window and backtraces from that window's end position.
/// Returned trace read positions are shifted into the coordinates of the full
/// `sequence`. None means no correct window was found or the backtrace
/// degenerated.
pub fn estimate_correctness_and_backtrace_biggest_part(
    graph: &AlignmentGraph, sequence: &[u8], min_score_per_word_slice: &[Score],
    min_score_index_per_word_slice: &[usize],
) -> Option<(Score, Vec<MatrixPosition>)> {
    debug_assert_eq!(min_score_per_word_slice.len(), min_score_index_per_word_slice.len());
    let correct_parts = estimate_correct_alignment_viterbi(min_score_per_word_slice);
    if correct_parts.is_empty() {
        return None;
    }
    let (start, end) = largest_contiguous_block(&correct_parts);
    if !correct_parts[end] {
        return None;
    }
    debug_assert!(end < min_score_index_per_word_slice.len() - 1);
    let end_position = (
        min_score_index_per_word_slice[end + 1],
        (end - start + 1) * WORD_SIZE,
    );
    debug_assert!(end_position.1 <= sequence.len());
    let window_sequence = &sequence[start * WORD_SIZE..(end + 1) * WORD_SIZE];
    let partials = &min_score_per_word_slice[start..end + 2];
    let (distance, trace) = backtrace(graph, end_position, window_sequence, partials)?;
    if trace.is_empty() {
        return None;
    }
    // shift the window-relative read positions back into full coordinates
    let offset = start * WORD_SIZE;
    let shifted = trace.into_iter().map(|(w, j)| (w, j + offset)).collect();
    Some((distance, shifted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::band::full_band;
    use crate::align::engine::compute_slice_scores;
    use crate::graph::GraphBuilder;

    #[test]
    fn test_largest_contiguous_block() {
        assert_eq!(largest_contiguous_block(&[true]), (0, 0));
        assert_eq!(largest_contiguous_block(&[false, true, true, false]), (1, 2));
        assert_eq!(largest_contiguous_block(&[true, true, false, true]), (0, 1));
        // later block of the same length wins
        assert_eq!(largest_contiguous_block(&[true, false, true]), (2, 2));
        // all-false leaves the no-run marker
        let (start, end) = largest_contiguous_block(&[false, false]);
        assert_eq!((start, end), (0, 0));
    }

    #[test]
    fn test_backtrace_perfect_match() {
        // deliberately not its own reverse complement, so the zero-cost path
        // is unique to the forward strand
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "AACG").unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let mut sequence = b"AACG".to_vec();
        sequence.resize(WORD_SIZE, b'N');
        let slice = compute_slice_scores(&graph, &sequence, 64, &band, 100.0).unwrap();
        let (distance, trace) = estimate_correctness_and_backtrace_biggest_part(
            &graph,
            &sequence,
            &slice.min_score_per_word_slice,
            &slice.min_score_index_per_word_slice,
        )
        .unwrap();
        assert_eq!(distance, 0);
        // the trace starts at read position zero and is monotone
        assert_eq!(trace[0].1, 0);
        for pair in trace.windows(2) {
            assert!(pair[1].1 == pair[0].1 || pair[1].1 == pair[0].1 + 1);
        }
        // pruning soundness: the distance never exceeds the final row minimum
        assert!(distance <= slice.final_min_score());
        // the matched path passes through the real node
        let node1 = graph.lookup_topology(2).unwrap();
        assert!(trace.iter().any(|&(w, _)| graph.index_to_node(w) == node1));
    }

    #[test]
    fn test_backtrace_distance_matches_mismatch_score() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "AACG").unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let mut sequence = b"ATCG".to_vec();
        sequence.resize(WORD_SIZE, b'N');
        let slice = compute_slice_scores(&graph, &sequence, 64, &band, 100.0).unwrap();
        let (distance, _trace) = estimate_correctness_and_backtrace_biggest_part(
            &graph,
            &sequence,
            &slice.min_score_per_word_slice,
            &slice.min_score_index_per_word_slice,
        )
        .unwrap();
        assert_eq!(distance, 1);
    }
}
