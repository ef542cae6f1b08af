
use log::trace;
use rustc_hash::FxHashMap as HashMap;
use std::collections::BTreeSet;

use crate::align::band::{get_band_order, project_forward_and_expand_band};
use crate::align::bitvector::WORD_SIZE;
use crate::align::node_slice::NodeSliceMap;
use crate::align::word_slice::{
    assert_slice_correctness, get_next_slice, merge_two_slices, source_slice_from_score,
    source_slice_without_before, Score, WordSlice,
};
use crate::graph::AlignmentGraph;
use crate::util::sequence::{chars_match, iupac_bits, SENTINEL_CHAR};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("DP produced a slice with overlapping increment and decrement masks")]
    SliceInvariant,
    #[error("row minimum scores regressed between rows")]
    ScoreRegression,
}

/// Forward-pass output: per-row minimum scores and their buffer positions.
/// The leading entry describes the boundary before the first row.
#[derive(Clone, Debug, Default)]
pub struct MatrixSlice {
    pub min_score_per_word_slice: Vec<Score>,
    pub min_score_index_per_word_slice: Vec<usize>,
    pub cells_processed: usize,
}

impl MatrixSlice {
    pub fn final_min_score(&self) -> Score {
        *self.min_score_per_word_slice.last().expect("slice always has the boundary entry")
    }

    pub fn final_min_score_column(&self) -> usize {
        *self.min_score_index_per_word_slice.last().expect("slice always has the boundary entry")
    }
}

/// Per-row equality bitmasks: bit i of a mask is set when read character
/// `row + i` is compatible with that nucleotide.
#[derive(Clone, Copy, Debug, Default)]
pub struct EqMasks {
    pub a: u64,
    pub t: u64,
    pub c: u64,
    pub g: u64,
}

impl EqMasks {
    /// Preprocesses the w read characters starting at `row`. IUPAC codes set
    /// multiple masks and `N` sets all four.
    pub fn from_sequence(sequence: &[u8], row: usize) -> Self {
        let mut masks = EqMasks::default();
        for i in 0..WORD_SIZE.min(sequence.len() - row) {
            let mask = 1u64 << i;
            let bits = iupac_bits(sequence[row + i]).unwrap_or_else(|| {
                panic!("unsupported character {:?} in read", sequence[row + i] as char)
            });
            if bits & 0b0001 != 0 {
                masks.a |= mask;
            }
            if bits & 0b0010 != 0 {
                masks.c |= mask;
            }
            if bits & 0b0100 != 0 {
                masks.g |= mask;
            }
            if bits & 0b1000 != 0 {
                masks.t |= mask;
            }
        }
        masks
    }

    /// Equality mask for one graph character: the union of the masks of the
    /// nucleotides it can stand for. Sentinel positions only match the read
    /// wildcard, so their mask is the intersection of all four.
    pub fn eq_for(&self, graph_char: u8) -> u64 {
        if graph_char == SENTINEL_CHAR {
            return self.a & self.c & self.g & self.t;
        }
        let bits = iupac_bits(graph_char)
            .unwrap_or_else(|| panic!("unsupported character {:?} in graph", graph_char as char));
        let mut eq = 0;
        if bits & 0b0001 != 0 {
            eq |= self.a;
        }
        if bits & 0b0010 != 0 {
            eq |= self.c;
        }
        if bits & 0b0100 != 0 {
            eq |= self.g;
        }
        if bits & 0b1000 != 0 {
            eq |= self.t;
        }
        eq
    }
}

/// Shared per-row inputs of the node calculations.
struct RowContext<'a> {
    graph: &'a AlignmentGraph,
    sequence: &'a [u8],
    row: usize,
    eq: EqMasks,
    current_band: &'a [bool],
    previous_band: &'a [bool],
}

impl RowContext<'_> {
    /// Diagonal equality between a graph position and the last read
    /// character of the previous row.
    fn previous_eq(&self, position: usize) -> bool {
        self.row == 0 || chars_match(self.graph.seq_at(position), self.sequence[self.row - 1])
    }
}

#[derive(Clone, Copy, Debug)]
struct NodeCalculationResult {
    min_score: Score,
    min_score_index: usize,
    cells_processed: usize,
}

fn is_source(graph: &AlignmentGraph, node: usize, current_band: &[bool], previous_band: &[bool]) -> bool {
    graph
        .in_neighbors(node)
        .iter()
        .all(|&neighbor| !current_band[neighbor] && !previous_band[neighbor])
}

/// First-column slice of a node with banded predecessors: merge across the
/// in-neighbors' last columns, each contributing its current-row value when
/// banded this row or a source slice derived from its previous-row end score
/// when banded only previously, then advance by one Myers step.
fn get_node_start_slice(
    ctx: &RowContext, eq: u64, node: usize, current_slice: &NodeSliceMap,
    previous_slice: &NodeSliceMap, previous_eq: bool,
) -> WordSlice {
    let mut previous: Option<WordSlice> = None;
    let mut previous_up: Option<WordSlice> = None;
    for &neighbor in ctx.graph.in_neighbors(node) {
        if ctx.previous_band[neighbor] {
            let candidate = previous_slice.last_column(neighbor);
            previous_up = Some(match previous_up {
                Some(up) => merge_two_slices(up, candidate),
                None => candidate,
            });
        }
        if ctx.previous_band[neighbor] && !ctx.current_band[neighbor] {
            let candidate = source_slice_from_score(previous_slice.last_column(neighbor).score_end);
            previous = Some(match previous {
                Some(p) => merge_two_slices(p, candidate),
                None => candidate,
            });
        }
        if !ctx.current_band[neighbor] {
            continue;
        }
        let candidate = current_slice.last_column(neighbor);
        previous = Some(match previous {
            Some(p) => merge_two_slices(p, candidate),
            None => candidate,
        });
    }
    let previous = previous.expect("a non-source node has a banded in-neighbor");
    let found_up = previous_up.is_some();
    let up = previous_up.unwrap_or_default();
    assert_slice_correctness(&previous, &up, found_up);
    get_next_slice(eq, previous, found_up, previous_eq, up)
}

/// Predicts corner cases where the horizontal input into the next column is
/// forced positive, so the upper-neighbor selection could be skipped. Kept as
/// a checked prediction rather than wired into the advance itself; the tests
/// exercise the claim on the unconditional branches.
pub fn first_zero_forced(
    previous_band: &[bool], current_band: &[bool], node: usize, left_slice: WordSlice, current_eq: u64
) -> bool {
    if previous_band[node] && current_band[node] {
        if left_slice.vn & 1 != 0 {
            return true;
        }
        if left_slice.vp & 1 == 0 && left_slice.vn & 1 == 0 && current_eq & 1 == 0 {
            return true;
        }
        false
    } else if previous_band[node] {
        false
    } else {
        true
    }
}

/// Computes all column slices of one banded node for the current row.
/// # Arguments
/// * `node` - internal node index, must be banded and registered in `current_slice`
/// * `force_source` - treat the node as a band entry regardless of its neighbors
fn calculate_node(
    ctx: &RowContext, node: usize, current_slice: &mut NodeSliceMap,
    previous_slice: &NodeSliceMap, force_source: bool,
) -> Result<NodeCalculationResult, EngineError> {
    let graph = ctx.graph;
    let node_start = graph.node_start(node);
    let len = graph.node_len(node);
    let has_previous = ctx.previous_band[node];
    let row = ctx.row;

    let first = if force_source || is_source(graph, node, ctx.current_band, ctx.previous_band) {
        if has_previous {
            source_slice_from_score(previous_slice.node(node)[0].score_end)
        } else {
            source_slice_without_before(row)
        }
    } else {
        let eq = ctx.eq.eq_for(graph.seq_at(node_start));
        let mut slice = get_node_start_slice(
            ctx, eq, node, current_slice, previous_slice, ctx.previous_eq(node_start)
        );
        if has_previous && slice.score_before_start > previous_slice.node(node)[0].score_end {
            slice = merge_two_slices(
                source_slice_from_score(previous_slice.node(node)[0].score_end), slice
            );
        }
        if slice.score_before_start > row as Score {
            slice = merge_two_slices(source_slice_without_before(row), slice);
        }
        slice
        // note: the start column score minus the optimal in-neighbor end score
        // is not always within one because of the band
    };

    let old_column = |w: usize| -> WordSlice {
        if has_previous {
            previous_slice.node(node)[w]
        } else {
            WordSlice::default()
        }
    };

    let mut result = NodeCalculationResult {
        min_score: Score::MAX,
        min_score_index: 0,
        cells_processed: 0,
    };
    {
        let slices = current_slice.node_mut(node);
        debug_assert_eq!(slices.len(), len);
        slices[0] = first;
        assert_slice_correctness(&slices[0], &old_column(0), has_previous);
        if slices[0].score_end < result.min_score {
            result.min_score = slices[0].score_end;
            result.min_score_index = node_start;
        }

        for w in 1..len {
            let position = node_start + w;
            let eq = ctx.eq.eq_for(graph.seq_at(position));
            slices[w] = get_next_slice(
                eq, slices[w - 1], has_previous, ctx.previous_eq(position), old_column(w - 1)
            );
            if has_previous && slices[w].score_before_start > old_column(w).score_end {
                slices[w] =
                    merge_two_slices(source_slice_from_score(old_column(w).score_end), slices[w]);
            }
            if slices[w].score_before_start > row as Score {
                slices[w] = merge_two_slices(source_slice_without_before(row), slices[w]);
            }
            debug_assert!(
                has_previous
                    || slices[w].score_before_start == row as Score
                    || slices[w].score_before_start == slices[w - 1].score_before_start + 1
            );
            assert_slice_correctness(&slices[w], &old_column(w), has_previous);

            if slices[w].score_end <= result.min_score {
                result.min_score = slices[w].score_end;
                result.min_score_index = position;
            }
        }
        let last = slices[len - 1];
        if last.vp & last.vn != 0 {
            return Err(EngineError::SliceInvariant);
        }
    }
    result.cells_processed = len * WORD_SIZE;
    Ok(result)
}

/// Reverse DFS over a cut's member list: which members can influence the cut
/// owner this row, and which of them act as band-entry sources.
fn cycle_cut_reachability(
    cut: &crate::graph::CycleCut, index: usize, current_band: &[bool], previous_band: &[bool],
    reachable: &mut [bool], source: &mut [bool],
) {
    if reachable[index] {
        return;
    }
    reachable[index] = true;
    debug_assert!(current_band[cut.nodes[index]]);
    if cut.previous_cut[index] {
        return;
    }
    source[index] = true;
    for &other_index in &cut.predecessors[index] {
        debug_assert!(other_index > index);
        if previous_band[cut.nodes[other_index]] {
            source[index] = false;
        }
        if current_band[cut.nodes[other_index]] {
            cycle_cut_reachability(cut, other_index, current_band, previous_band, reachable, source);
            source[index] = false;
        }
    }
}

/// Resolves the cyclic dependencies of a row. Every banded node's last column
/// is first set to a harmless source value, then each out-of-order banded
/// node is computed over its cut in reverse cut order, snapshotting the
/// resolved end value and restoring the other members before the next cut.
/// Finally the snapshots are applied so the main pass reads consistent
/// values.
fn cut_cycles(
    ctx: &RowContext, current_slice: &mut NodeSliceMap, previous_slice: &NodeSliceMap,
    band_order_out_of_order: &BTreeSet<usize>,
) -> Result<(), EngineError> {
    if ctx.graph.first_in_order() == 0 {
        return Ok(());
    }
    let row = ctx.row;
    for (node, slices) in current_slice.iter_mut() {
        let value = if ctx.previous_band[node] {
            source_slice_from_score(previous_slice.last_column(node).score_end)
        } else {
            source_slice_without_before(row)
        };
        *slices.last_mut().expect("nodes always span at least one position") = value;
    }
    // cuts within two words of each other can overwrite each other's values,
    // so the resolved end values are kept aside and applied at the end
    let mut correct_end_values: HashMap<usize, WordSlice> = band_order_out_of_order
        .iter()
        .map(|&node| (node, WordSlice::new(0, 0, Score::MAX, Score::MAX)))
        .collect();
    for &owner in band_order_out_of_order {
        if owner == 0 {
            continue;
        }
        debug_assert!(ctx.current_band[owner]);
        debug_assert!(owner < ctx.graph.first_in_order());
        let cut = ctx.graph.cut(owner);
        debug_assert!(!cut.nodes.is_empty());
        debug_assert_eq!(cut.nodes[0], owner);
        let mut reachable = vec![false; cut.nodes.len()];
        let mut source = vec![false; cut.nodes.len()];
        cycle_cut_reachability(cut, 0, ctx.current_band, ctx.previous_band, &mut reachable, &mut source);
        for index in (0..cut.nodes.len()).rev() {
            if !reachable[index] {
                continue;
            }
            let member = cut.nodes[index];
            if cut.previous_cut[index] {
                let value = correct_end_values[&member];
                debug_assert!(value.score_before_start != Score::MAX);
                current_slice.set_last_column(member, value);
            } else {
                calculate_node(ctx, member, current_slice, previous_slice, source[index])?;
            }
        }
        correct_end_values.insert(owner, current_slice.last_column(owner));
        for index in 1..cut.nodes.len() {
            let member = cut.nodes[index];
            if !ctx.current_band[member] {
                continue;
            }
            let value = if ctx.previous_band[member] {
                source_slice_from_score(previous_slice.last_column(member).score_end)
            } else {
                source_slice_without_before(row)
            };
            current_slice.set_last_column(member, value);
        }
        current_slice.set_last_column(owner, correct_end_values[&owner]);
    }
    for &owner in band_order_out_of_order {
        if owner == 0 {
            continue;
        }
        current_slice.set_last_column(owner, correct_end_values[&owner]);
    }
    Ok(())
}

/// The forward DP: iterates row bands of height w over the padded read,
/// computing every banded node per row and recording the row minima. When a
/// row minimum exceeds `max_score` the remaining rows are filled with
/// sentinel entries and the pass stops early.
/// # Arguments
/// * `sequence` - the read, padded to a multiple of w
/// * `dynamic_width` - band expansion width in characters
/// * `start_band` - one full membership vector per pre-banded row; later rows expand dynamically
/// * `max_score` - score cap; row minima above it terminate the pass
pub fn compute_slice_scores(
    graph: &AlignmentGraph, sequence: &[u8], dynamic_width: usize, start_band: &[Vec<bool>],
    max_score: f64,
) -> Result<MatrixSlice, EngineError> {
    debug_assert_eq!(sequence.len() % WORD_SIZE, 0);
    let mut result = MatrixSlice {
        min_score_per_word_slice: vec![0],
        min_score_index_per_word_slice: vec![0],
        cells_processed: 0,
    };

    let mut previous_slice = NodeSliceMap::default();
    let mut previous_minimum_index = usize::MAX;
    let mut current_band = vec![false; graph.node_count()];
    let mut previous_band = vec![false; graph.node_count()];
    debug_assert!(!start_band.is_empty());
    let mut previous_band_order: BTreeSet<usize> = BTreeSet::new();
    let mut previous_band_order_out_of_order: BTreeSet<usize> = BTreeSet::new();

    for row in (0..sequence.len()).step_by(WORD_SIZE) {
        let mut current_slice = NodeSliceMap::default();
        let mut current_minimum_score = Score::MAX;
        let mut current_minimum_index = usize::MAX;
        let eq = EqMasks::from_sequence(sequence, row);
        let slice_index = row / WORD_SIZE;
        let mut band_order: BTreeSet<usize>;
        let mut band_order_out_of_order: BTreeSet<usize>;
        if slice_index < start_band.len() {
            if slice_index > 0 {
                std::mem::swap(&mut previous_band, &mut current_band);
            }
            current_band.copy_from_slice(&start_band[slice_index]);
            let (in_order, out_of_order) = get_band_order(&current_band, graph.first_in_order());
            band_order = in_order;
            band_order_out_of_order = out_of_order;
            if slice_index == 0 {
                previous_band.copy_from_slice(&current_band);
                previous_band_order = band_order.clone();
                previous_band_order_out_of_order = band_order_out_of_order.clone();
                for &node in previous_band_order.iter().chain(previous_band_order_out_of_order.iter()) {
                    previous_slice.add_node(node, graph.node_len(node));
                }
            }
        } else {
            std::mem::swap(&mut current_band, &mut previous_band);
            debug_assert!(previous_minimum_index != usize::MAX);
            band_order = BTreeSet::new();
            band_order_out_of_order = BTreeSet::new();
            project_forward_and_expand_band(
                graph, &mut current_band, previous_minimum_index, dynamic_width,
                &mut band_order, &mut band_order_out_of_order,
            );
        }
        for &node in band_order.iter().chain(band_order_out_of_order.iter()) {
            current_slice.add_node(node, graph.node_len(node));
        }
        debug_assert!(!band_order.is_empty() || !band_order_out_of_order.is_empty());

        let ctx = RowContext {
            graph,
            sequence,
            row,
            eq,
            current_band: &current_band,
            previous_band: &previous_band,
        };
        cut_cycles(&ctx, &mut current_slice, &previous_slice, &band_order_out_of_order)?;
        // in-order nodes first, then the cycle participants
        for &node in band_order.iter().chain(band_order_out_of_order.iter()) {
            debug_assert!(current_band[node]);
            let node_calc = calculate_node(&ctx, node, &mut current_slice, &previous_slice, false)?;
            debug_assert!(node_calc.min_score >= *result.min_score_per_word_slice.last().unwrap());
            if node_calc.min_score < current_minimum_score {
                current_minimum_score = node_calc.min_score;
                current_minimum_index = node_calc.min_score_index;
            }
            if node_calc.min_score <= current_minimum_score
                && node_calc.min_score_index == graph.node_end(node) - 1
                && current_slice.last_column(node).vp & (1u64 << (WORD_SIZE - 1)) != 0
                && node_calc.min_score > 0
            {
                // the minimum sits at the node's last position with a rising
                // score: a matching first character one step into an
                // out-neighbor lowers it by one
                for &neighbor in graph.out_neighbors(node) {
                    if chars_match(
                        graph.seq_at(graph.node_start(neighbor)),
                        sequence[row + WORD_SIZE - 1],
                    ) {
                        current_minimum_score = node_calc.min_score - 1;
                        current_minimum_index = graph.node_start(neighbor);
                    }
                }
            }
            result.cells_processed += node_calc.cells_processed;
        }
        for &node in previous_band_order.iter().chain(previous_band_order_out_of_order.iter()) {
            previous_band[node] = false;
        }
        debug_assert!(current_minimum_index != usize::MAX);
        if current_minimum_score < *result.min_score_per_word_slice.last().unwrap() {
            return Err(EngineError::ScoreRegression);
        }
        previous_slice = current_slice;
        previous_minimum_index = current_minimum_index;
        result.min_score_per_word_slice.push(current_minimum_score);
        result.min_score_index_per_word_slice.push(current_minimum_index);
        previous_band_order = band_order;
        previous_band_order_out_of_order = band_order_out_of_order;
        if current_minimum_score as f64 > max_score {
            trace!("row minimum {current_minimum_score} exceeded the score cap, filling remaining rows");
            let mut fill_row = row + WORD_SIZE;
            while fill_row < sequence.len() {
                result.min_score_per_word_slice.push(sequence.len() as Score);
                result.min_score_index_per_word_slice.push(0);
                fill_row += WORD_SIZE;
            }
            break;
        }
    }
    debug_assert!(result
        .min_score_per_word_slice
        .windows(2)
        .all(|pair| pair[1] >= pair[0] || pair[1] == sequence.len() as Score));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::band::full_band;
    use crate::graph::GraphBuilder;

    fn pad(read: &str) -> Vec<u8> {
        let mut sequence = read.as_bytes().to_vec();
        while sequence.len() % WORD_SIZE != 0 {
            sequence.push(b'N');
        }
        sequence
    }

    #[test]
    fn test_eq_masks() {
        let masks = EqMasks::from_sequence(b"ACGTNRAA", 0);
        assert_eq!(masks.a & 0b1111, 0b0001);
        assert_eq!(masks.c & 0b1111, 0b0010);
        assert_eq!(masks.g & 0b1111, 0b0100);
        assert_eq!(masks.t & 0b1111, 0b1000);
        // N sets every mask, R sets A and G
        assert_eq!(masks.a & 0b110000, 0b110000);
        assert_eq!(masks.g & 0b110000, 0b110000);
        assert_eq!(masks.c & 0b110000, 0b010000);
        // the sentinel character only matches wildcard read positions
        assert_eq!(masks.eq_for(b'-') & 0xFF, 0b010000);
        assert_eq!(masks.eq_for(b'R') & 0b1111, 0b0101);
    }

    #[test]
    fn test_first_zero_forced_unconditional_branches() {
        let previous_band = vec![false, true];
        let current_band = vec![true, true];
        // never banded before: the horizontal input is always forced positive
        assert!(first_zero_forced(&previous_band, &current_band, 0, WordSlice::default(), 0));
        // banded only previously: no prediction
        let current_band_only_previous = vec![false, false];
        assert!(!first_zero_forced(&previous_band, &current_band_only_previous, 1, WordSlice::default(), 0));
        // banded in both rows: a dropping first bit forces the prediction
        let dropping = WordSlice::new(0, 1, -1, 0);
        assert!(first_zero_forced(&previous_band, &current_band, 1, dropping, 0));
        let flat_no_match = WordSlice::default();
        assert!(first_zero_forced(&previous_band, &current_band, 1, flat_no_match, 0));
        assert!(!first_zero_forced(&previous_band, &current_band, 1, flat_no_match, 1));
    }

    #[test]
    fn test_perfect_match_row_minimum() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "ACGT").unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let slice =
            compute_slice_scores(&graph, &pad("ACGT"), 64, &band, 100.0).unwrap();
        assert_eq!(slice.min_score_per_word_slice.len(), 2);
        assert_eq!(slice.final_min_score(), 0);
        assert!(slice.cells_processed > 0);
    }

    #[test]
    fn test_mismatch_row_minimum() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "ACGT").unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let slice =
            compute_slice_scores(&graph, &pad("ACCT"), 64, &band, 100.0).unwrap();
        assert_eq!(slice.final_min_score(), 1);
    }

    #[test]
    fn test_score_cap_fills_remaining_rows() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, &"A".repeat(100)).unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let read = "T".repeat(128);
        let slice = compute_slice_scores(&graph, &pad(&read), 64, &band, 10.0).unwrap();
        // two rows plus the boundary entry, the second row filled with the sentinel
        assert_eq!(slice.min_score_per_word_slice.len(), 3);
        assert_eq!(slice.final_min_score(), 128);
        assert_eq!(slice.final_min_score_column(), 0);
    }

    #[test]
    fn test_row_minima_monotone_across_rows() {
        let mut builder = GraphBuilder::default();
        builder.add_node(1, &"ACGT".repeat(40)).unwrap();
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let read = "ACGT".repeat(30);
        let slice = compute_slice_scores(&graph, &pad(&read), 64, &band, 200.0).unwrap();
        for pair in slice.min_score_per_word_slice.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(slice.final_min_score(), 0);
    }

    #[test]
    fn test_cycle_row_minimum() {
        // two-node cycle, read loops it twice
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "AT").unwrap();
        builder.add_node(2, "CG").unwrap();
        builder.add_edge(1, false, 2, false);
        builder.add_edge(2, false, 1, false);
        let graph = builder.finalize().unwrap();
        let band = full_band(&graph, WORD_SIZE);
        let slice =
            compute_slice_scores(&graph, &pad("ATCGATCG"), 64, &band, 100.0).unwrap();
        assert_eq!(slice.final_min_score(), 0);
    }
}
