
use anyhow::{bail, ensure};
use log::{debug, warn};
use std::time::Instant;

use crate::align::backtrace::{estimate_correctness_and_backtrace_biggest_part, MatrixPosition};
use crate::align::band::full_band;
use crate::align::bitvector::WORD_SIZE;
use crate::align::engine::{compute_slice_scores, EngineError};
use crate::align::result::{Alignment, AlignmentPath, AlignmentResult, Edit, Mapping};
use crate::align::split::{
    get_piecewise_traces_from_split, get_split_alignment, pad_sequence,
    TwoDirectionalSplitAlignment,
};
use crate::align::word_slice::Score;
use crate::graph::AlignmentGraph;
use crate::util::sequence::iupac_bits;

/// Alignments whose score exceeds this fraction of the read length are
/// rejected as failed.
pub const SCORE_CAP_FRACTION: f64 = 0.4;

enum TraceOutcome {
    Failed { cells_processed: usize },
    Aligned { score: Score, trace: Vec<MatrixPosition>, cells_processed: usize },
}

/// Aligns reads against a finalized graph. The graph is shared immutably;
/// every alignment call owns all of its scratch state, so independent reads
/// can be aligned from separate threads.
pub struct GraphAligner<'a> {
    graph: &'a AlignmentGraph,
}

impl<'a> GraphAligner<'a> {
    pub fn new(graph: &'a AlignmentGraph) -> Self {
        Self { graph }
    }

    /// Full-band alignment: the whole graph is banded for the first
    /// `dynamic_row_start / w` rows, later rows follow the expanding band.
    /// # Arguments
    /// * `seq_id` - read identifier carried into the result
    /// * `sequence` - the read; ACGT, IUPAC codes and N, case-insensitive
    /// * `dynamic_width` - band expansion width in characters
    /// * `dynamic_row_start` - read prefix length (in characters) aligned under the full band
    /// # Errors
    /// * if the read contains characters outside the accepted alphabet
    /// * if the band parameters are degenerate
    pub fn align_one_way(
        &self, seq_id: &str, sequence: &str, dynamic_width: usize, dynamic_row_start: usize,
    ) -> anyhow::Result<AlignmentResult> {
        let start_time = Instant::now();
        validate_sequence(seq_id, sequence)?;
        ensure!(dynamic_width > 0, "dynamic width must be positive");
        ensure!(
            dynamic_row_start >= WORD_SIZE,
            "dynamic row start must cover at least one word-sized row"
        );
        if sequence.is_empty() {
            return Ok(AlignmentResult::empty(seq_id, 0, elapsed_ms(start_time)));
        }
        let start_band = full_band(self.graph, dynamic_row_start);
        let outcome = self.get_backtrace(sequence, dynamic_width, &start_band);
        match outcome {
            Err(error) => {
                warn!("alignment of {seq_id} hit an internal inconsistency: {error}");
                Ok(AlignmentResult::empty(seq_id, 0, elapsed_ms(start_time)))
            }
            Ok(TraceOutcome::Failed { cells_processed }) => {
                Ok(AlignmentResult::empty(seq_id, cells_processed, elapsed_ms(start_time)))
            }
            Ok(TraceOutcome::Aligned { score, trace, cells_processed }) => {
                let mut result =
                    self.trace_to_alignment(seq_id, sequence, score, &trace, cells_processed);
                result.elapsed_ms = elapsed_ms(start_time);
                Ok(result)
            }
        }
    }

    /// Seed-guided split alignment: every seed splits the read in two, both
    /// halves are aligned outward from the seed node's strand siblings, and
    /// the seed with the lowest combined score wins. The cap starts at
    /// `0.4 x |read|` and tightens to the best seed's upper bound.
    /// # Arguments
    /// * `seed_hits` - `(segment id, read position)` pairs, each strictly inside the read
    /// * `start_bandwidth` - band width around the seed node for row zero
    /// # Errors
    /// * if the read or a seed is malformed, or a seed references a missing segment
    pub fn align_one_way_seeded(
        &self, seq_id: &str, sequence: &str, dynamic_width: usize, seed_hits: &[(u64, usize)],
        start_bandwidth: usize,
    ) -> anyhow::Result<AlignmentResult> {
        let start_time = Instant::now();
        validate_sequence(seq_id, sequence)?;
        ensure!(!seed_hits.is_empty(), "seeded alignment requires at least one seed");
        ensure!(sequence.len() >= 3, "read {seq_id} is too short to split around a seed");
        let mut best: Option<TwoDirectionalSplitAlignment> = None;
        for (index, &(node_id, position)) in seed_hits.iter().enumerate() {
            debug!("seed {}/{}: node {} at read position {}", index, seed_hits.len(), node_id, position);
            let cap = match best.as_ref() {
                Some(current) => current.max_score() as f64,
                None => sequence.len() as f64 * SCORE_CAP_FRACTION,
            };
            let split = match get_split_alignment(
                self.graph, sequence, dynamic_width, start_bandwidth, node_id, position, cap,
            ) {
                Ok(split) => split,
                Err(error) if error.downcast_ref::<EngineError>().is_some() => {
                    warn!("seed {index} of {seq_id} hit an internal inconsistency: {error}");
                    continue;
                }
                Err(error) => return Err(error),
            };
            if split.min_score() as f64 > sequence.len() as f64 * SCORE_CAP_FRACTION {
                continue;
            }
            let replace = match best.as_ref() {
                None => true,
                Some(current) => split.min_score() < current.min_score(),
            };
            if replace {
                best = Some(split);
            }
        }
        let best = match best {
            Some(best) => best,
            None => return Ok(AlignmentResult::empty(seq_id, 0, elapsed_ms(start_time))),
        };
        let traces = get_piecewise_traces_from_split(self.graph, &best, sequence);
        let forward_result = match traces.forward {
            Some((score, trace)) => self.trace_to_alignment(
                seq_id, &sequence[best.sequence_split_index..], score, &trace, 0,
            ),
            None => AlignmentResult::empty(seq_id, 0, 0),
        };
        let backward_result = match traces.backward {
            Some((score, trace)) => {
                // the largest consumed count decides how much of the first
                // part the reversed coordinates cover
                let covered = trace.last().map_or(0, |p| p.1);
                let reversed = self.reverse_trace(trace);
                let window =
                    &sequence[best.sequence_split_index - covered..best.sequence_split_index];
                self.trace_to_alignment(seq_id, window, score, &reversed, 0)
            }
            None => AlignmentResult::empty(seq_id, 0, 0),
        };
        if forward_result.alignment_failed && backward_result.alignment_failed {
            return Ok(AlignmentResult::empty(seq_id, best.cells_processed, elapsed_ms(start_time)));
        }
        let mut merged = self.merge_alignments(backward_result, forward_result);
        merged.alignment.name = seq_id.to_string();
        merged.alignment.sequence = sequence.to_string();
        merged.cells_processed += best.cells_processed;
        merged.elapsed_ms = elapsed_ms(start_time);
        Ok(merged)
    }

    fn get_backtrace(
        &self, sequence: &str, dynamic_width: usize, start_band: &[Vec<bool>],
    ) -> Result<TraceOutcome, EngineError> {
        let padded = pad_sequence(sequence);
        let max_score = sequence.len() as f64 * SCORE_CAP_FRACTION;
        let slice =
            compute_slice_scores(self.graph, &padded, dynamic_width, start_band, max_score)?;
        debug!("forward pass score: {}", slice.final_min_score());
        if slice.final_min_score() as f64 > max_score {
            return Ok(TraceOutcome::Failed { cells_processed: slice.cells_processed });
        }
        let estimated = estimate_correctness_and_backtrace_biggest_part(
            self.graph,
            &padded,
            &slice.min_score_per_word_slice,
            &slice.min_score_index_per_word_slice,
        );
        let (backtrace_score, mut trace) = match estimated {
            Some(outcome) => outcome,
            None => return Ok(TraceOutcome::Failed { cells_processed: slice.cells_processed }),
        };
        if cfg!(debug_assertions) {
            assert!(backtrace_score <= slice.final_min_score());
        }
        while trace.last().is_some_and(|p| p.1 > sequence.len()) {
            trace.pop();
        }
        if trace.is_empty() {
            return Ok(TraceOutcome::Failed { cells_processed: slice.cells_processed });
        }
        Ok(TraceOutcome::Aligned {
            score: slice.final_min_score(),
            trace,
            cells_processed: slice.cells_processed,
        })
    }

    /// Converts a forward-ordered trace into a path. Each move between
    /// consecutive cells is attributed to the node it lands on, so the edit
    /// lengths sum to exactly the consumed read and graph characters.
    /// Traversal halts at the end sentinel; leading start-sentinel cells
    /// never open a mapping.
    fn trace_to_alignment(
        &self, seq_id: &str, sequence: &str, score: Score, trace: &[MatrixPosition],
        cells_processed: usize,
    ) -> AlignmentResult {
        let graph = self.graph;
        if trace.is_empty() {
            return AlignmentResult::empty(seq_id, cells_processed, 0);
        }
        let sequence_bytes = sequence.as_bytes();
        struct OpenMapping {
            node: usize,
            offset: usize,
            from_length: usize,
            to_length: usize,
            consumed: Vec<u8>,
        }
        let mut mappings: Vec<Mapping> = Vec::new();
        let mut open: Option<OpenMapping> = None;
        let close = |mappings: &mut Vec<Mapping>, open: Option<OpenMapping>| {
            if let Some(segment) = open {
                mappings.push(Mapping {
                    node_id: graph.node_id(segment.node),
                    is_reverse: graph.is_reverse(segment.node),
                    offset: segment.offset,
                    rank: mappings.len(),
                    edits: vec![Edit {
                        from_length: segment.from_length,
                        to_length: segment.to_length,
                        sequence: String::from_utf8_lossy(&segment.consumed).into_owned(),
                    }],
                });
            }
        };
        for window in trace.windows(2) {
            let (previous_position, previous_consumed) = window[0];
            let (position, consumed) = window[1];
            let node = graph.index_to_node(position);
            if node == graph.dummy_node_end() {
                break;
            }
            if node == graph.dummy_node_start() {
                continue;
            }
            if open.as_ref().map(|segment| segment.node) != Some(node) {
                close(&mut mappings, open.take());
                open = Some(OpenMapping {
                    node,
                    offset: position - graph.node_start(node),
                    from_length: 0,
                    to_length: 0,
                    consumed: Vec::new(),
                });
            }
            let segment = open.as_mut().expect("a mapping was just opened");
            if position != previous_position {
                segment.from_length += 1;
            }
            if consumed > previous_consumed {
                segment.to_length += consumed - previous_consumed;
                segment.consumed.extend_from_slice(&sequence_bytes[previous_consumed..consumed]);
            }
        }
        close(&mut mappings, open.take());
        if mappings.is_empty() {
            return AlignmentResult::empty(seq_id, cells_processed, 0);
        }
        AlignmentResult {
            alignment: Alignment {
                name: seq_id.to_string(),
                sequence: sequence.to_string(),
                score,
                path: AlignmentPath { mappings },
            },
            alignment_failed: false,
            cells_processed,
            elapsed_ms: 0,
        }
    }

    /// Mirrors a trace onto the opposite strand: order reversed, buffer
    /// positions mapped through the strand involution and read positions
    /// counted from the other end.
    fn reverse_trace(&self, mut trace: Vec<MatrixPosition>) -> Vec<MatrixPosition> {
        if trace.is_empty() {
            return trace;
        }
        trace.reverse();
        let consumed_max = trace[0].1;
        for position in trace.iter_mut() {
            position.0 = self.graph.get_reverse_position(position.0);
            debug_assert!(position.1 <= consumed_max);
            position.1 = consumed_max - position.1;
        }
        trace
    }

    /// Stitches the two split halves. Identical junction nodes drop the
    /// second half's first mapping; adjacent junctions keep both; anything
    /// else is reported and concatenated regardless.
    fn merge_alignments(&self, first: AlignmentResult, second: AlignmentResult) -> AlignmentResult {
        debug_assert!(!first.alignment_failed || !second.alignment_failed);
        if first.alignment_failed {
            return second;
        }
        if second.alignment_failed {
            return first;
        }
        let mut merged = first;
        merged.cells_processed += second.cells_processed;
        merged.elapsed_ms += second.elapsed_ms;
        merged.alignment.score += second.alignment.score;
        let first_end = merged
            .alignment
            .path
            .mappings
            .last()
            .expect("successful alignments carry mappings")
            .clone();
        let second_start = second
            .alignment
            .path
            .mappings
            .first()
            .expect("successful alignments carry mappings")
            .clone();
        let skip = if first_end.node_id == second_start.node_id
            && first_end.is_reverse == second_start.is_reverse
        {
            1
        } else {
            let first_internal = self
                .graph
                .lookup_topology(first_end.node_id * 2 + u64::from(first_end.is_reverse));
            let second_internal = self
                .graph
                .lookup_topology(second_start.node_id * 2 + u64::from(second_start.is_reverse));
            let adjacent = match (first_internal, second_internal) {
                (Some(a), Some(b)) => self.graph.out_neighbors(a).contains(&b),
                _ => false,
            };
            if !adjacent {
                warn!(
                    "piecewise alignments cannot be merged cleanly: first ends at {}{}, second starts at {}{}",
                    first_end.node_id,
                    if first_end.is_reverse { '-' } else { '+' },
                    second_start.node_id,
                    if second_start.is_reverse { '-' } else { '+' },
                );
            }
            0
        };
        merged
            .alignment
            .path
            .mappings
            .extend(second.alignment.path.mappings.into_iter().skip(skip));
        for (rank, mapping) in merged.alignment.path.mappings.iter_mut().enumerate() {
            mapping.rank = rank;
        }
        merged
    }
}

fn elapsed_ms(start_time: Instant) -> u64 {
    start_time.elapsed().as_millis() as u64
}

fn validate_sequence(seq_id: &str, sequence: &str) -> anyhow::Result<()> {
    for c in sequence.bytes() {
        if iupac_bits(c).is_none() {
            bail!("read {} contains unsupported character {:?}", seq_id, c as char);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn single_node_graph(sequence: &str) -> AlignmentGraph {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, sequence).unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn test_single_linear_node_exact() {
        let graph = single_node_graph("ACGT");
        let aligner = GraphAligner::new(&graph);
        let result = aligner.align_one_way("read", "ACGT", 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        let mappings = &result.alignment.path.mappings;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].node_id, 1);
        assert_eq!(mappings[0].offset, 0);
        assert_eq!(
            mappings[0].edits,
            vec![Edit { from_length: 4, to_length: 4, sequence: "ACGT".to_string() }]
        );
    }

    #[test]
    fn test_single_mismatch() {
        let graph = single_node_graph("ACGT");
        let aligner = GraphAligner::new(&graph);
        let result = aligner.align_one_way("read", "ACCT", 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 1);
        let mappings = &result.alignment.path.mappings;
        assert_eq!(mappings.len(), 1);
        assert_eq!(
            mappings[0].edits,
            vec![Edit { from_length: 4, to_length: 4, sequence: "ACCT".to_string() }]
        );
    }

    #[test]
    fn test_bubble_takes_matching_branch() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "ACG").unwrap();
        builder.add_node(2, "TCG").unwrap();
        builder.add_node(3, "AAA").unwrap();
        builder.add_edge(1, false, 3, false);
        builder.add_edge(2, false, 3, false);
        let graph = builder.finalize().unwrap();
        let aligner = GraphAligner::new(&graph);
        let result = aligner.align_one_way("read", "TCGAAA", 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        let mappings = &result.alignment.path.mappings;
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].node_id, 2);
        assert_eq!(mappings[1].node_id, 3);
        assert_eq!(result.alignment.path.total_to_length(), 6);
        assert_eq!(result.alignment.path.total_from_length(), 6);
    }

    #[test]
    fn test_cycle_walk() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "AT").unwrap();
        builder.add_node(2, "CG").unwrap();
        builder.add_edge(1, false, 2, false);
        builder.add_edge(2, false, 1, false);
        let graph = builder.finalize().unwrap();
        let aligner = GraphAligner::new(&graph);
        let result = aligner.align_one_way("read", "ATCGATCG", 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        let nodes: Vec<u64> =
            result.alignment.path.mappings.iter().map(|m| m.node_id).collect();
        assert_eq!(nodes, vec![1, 2, 1, 2]);
        assert_eq!(result.alignment.path.total_to_length(), 8);
    }

    #[test]
    fn test_iupac_graph_wildcard() {
        let graph = single_node_graph("ANGT");
        let aligner = GraphAligner::new(&graph);
        let result = aligner.align_one_way("read", "ACGT", 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
    }

    #[test]
    fn test_score_cap_rejects_garbage() {
        let graph = single_node_graph(&"A".repeat(120));
        let aligner = GraphAligner::new(&graph);
        // one hundred read characters, none of which can match
        let read = "T".repeat(100);
        let result = aligner.align_one_way("read", &read, 64, 64).unwrap();
        assert!(result.alignment_failed);
        assert_eq!(result.alignment.score, Score::MAX);
        assert!(result.alignment.path.mappings.is_empty());
    }

    #[test]
    fn test_rejects_unknown_characters() {
        let graph = single_node_graph("ACGT");
        let aligner = GraphAligner::new(&graph);
        assert!(aligner.align_one_way("read", "ACXT", 64, 64).is_err());
    }

    #[test]
    fn test_long_read_multiple_rows() {
        let repeated = "ACGTTGCA".repeat(32);
        let graph = single_node_graph(&repeated);
        let aligner = GraphAligner::new(&graph);
        let read: String = repeated.chars().take(192).collect();
        let result = aligner.align_one_way("read", &read, 64, 192).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        assert_eq!(result.alignment.path.total_to_length(), 192);
    }

    #[test]
    fn test_dynamic_band_follows_minimum() {
        // only the first row is fully banded; the rest follow the expansion
        let repeated = "ACGTTGCA".repeat(32);
        let graph = single_node_graph(&repeated);
        let aligner = GraphAligner::new(&graph);
        let read: String = repeated.chars().take(192).collect();
        let result = aligner.align_one_way("read", &read, 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
    }

    #[test]
    fn test_reverse_strand_read() {
        use crate::util::sequence::reverse_complement;
        let graph = single_node_graph("AACGTACGGT");
        let aligner = GraphAligner::new(&graph);
        let read =
            String::from_utf8(reverse_complement(b"AACGTACGGT")).unwrap();
        let result = aligner.align_one_way("read", &read, 64, 64).unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        assert!(result.alignment.path.mappings.iter().all(|m| m.is_reverse));
    }

    #[test]
    fn test_reverse_trace_involution() {
        let graph = single_node_graph("ACGTACGT");
        let aligner = GraphAligner::new(&graph);
        let node = graph.lookup_topology(2).unwrap();
        let start = graph.node_start(node);
        let trace: Vec<MatrixPosition> =
            (0..4).map(|i| (start + i, i)).collect();
        let double = aligner.reverse_trace(aligner.reverse_trace(trace.clone()));
        assert_eq!(double, trace);
    }

    #[test]
    fn test_seeded_alignment() {
        let graph = single_node_graph("ACGTACGT");
        let aligner = GraphAligner::new(&graph);
        let result = aligner
            .align_one_way_seeded("read", "ACGTACGT", 64, &[(1, 4)], 64)
            .unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
        assert!(!result.alignment.path.mappings.is_empty());
        assert_eq!(result.alignment.sequence, "ACGTACGT");
    }

    #[test]
    fn test_seeded_alignment_multiple_seeds_picks_best() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "ACGTACGT").unwrap();
        builder.add_node(2, "TTTTTTTT").unwrap();
        let graph = builder.finalize().unwrap();
        let aligner = GraphAligner::new(&graph);
        let result = aligner
            .align_one_way_seeded("read", "ACGTACGT", 64, &[(2, 4), (1, 4)], 64)
            .unwrap();
        assert!(!result.alignment_failed);
        assert_eq!(result.alignment.score, 0);
    }

    #[test]
    fn test_seeded_alignment_rejects_invalid_seed() {
        let graph = single_node_graph("ACGTACGT");
        let aligner = GraphAligner::new(&graph);
        assert!(aligner
            .align_one_way_seeded("read", "ACGTACGT", 64, &[(1, 0)], 64)
            .is_err());
        assert!(aligner
            .align_one_way_seeded("read", "ACGTACGT", 64, &[], 64)
            .is_err());
    }
}
