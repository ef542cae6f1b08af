
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap as HashMap;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::align::bitvector::WORD_SIZE;
use crate::graph::AlignmentGraph;

/// Full-width start band: every node is alive for the first
/// `dynamic_row_start / w` rows.
pub fn full_band(graph: &AlignmentGraph, dynamic_row_start: usize) -> Vec<Vec<bool>> {
    vec![vec![true; graph.node_count()]; dynamic_row_start / WORD_SIZE]
}

/// Single-row start band for seeded mode: the given node plus everything
/// within `start_extension_width` characters downstream of it.
pub fn extended_node_band(
    graph: &AlignmentGraph, node: usize, start_extension_width: usize
) -> Vec<Vec<bool>> {
    let mut band = vec![false; graph.node_count()];
    let mut visited: BTreeSet<usize> = BTreeSet::new();
    let mut queue: PriorityQueue<usize, Reverse<usize>> = PriorityQueue::new();
    queue.push(node, Reverse(0));
    while let Some((top, Reverse(distance))) = queue.pop() {
        if distance > start_extension_width {
            continue;
        }
        if !visited.insert(top) {
            continue;
        }
        band[top] = true;
        let new_distance = distance + graph.node_len(top);
        for &neighbor in graph.out_neighbors(top) {
            queue.push_increase(neighbor, Reverse(new_distance));
        }
    }
    vec![band]
}

/// Splits band membership into the two ordered iteration sets: in-order ids
/// at or above `first_in_order` and the out-of-order cycle participants.
pub fn get_band_order(
    current_band: &[bool], first_in_order: usize
) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let mut band_order = BTreeSet::new();
    let mut band_order_out_of_order = BTreeSet::new();
    for (node, &banded) in current_band.iter().enumerate() {
        if !banded {
            continue;
        }
        if node < first_in_order {
            band_order_out_of_order.insert(node);
        } else {
            band_order.insert(node);
        }
    }
    (band_order, band_order_out_of_order)
}

fn mark_banded(
    band: &mut [bool], node: usize, first_in_order: usize,
    band_order: &mut BTreeSet<usize>, band_order_out_of_order: &mut BTreeSet<usize>
) {
    band[node] = true;
    if node < first_in_order {
        band_order_out_of_order.insert(node);
    } else {
        band_order.insert(node);
    }
}

/// Min-priority BFS band expansion: everything reachable within
/// `dynamic_width` characters of the start positions (forward or backward)
/// becomes banded, with per-node minimum distances recorded at both node
/// boundaries.
pub fn expand_band_from_positions(
    graph: &AlignmentGraph,
    band: &mut [bool],
    start_positions: &BTreeSet<usize>,
    dynamic_width: usize,
    distance_at_node_start: &mut HashMap<usize, usize>,
    distance_at_node_end: &mut HashMap<usize, usize>,
    band_order: &mut BTreeSet<usize>,
    band_order_out_of_order: &mut BTreeSet<usize>,
) {
    let first_in_order = graph.first_in_order();
    // items are (node, at-end) pairs so both boundaries propagate separately
    let mut queue: PriorityQueue<(usize, bool), Reverse<usize>> = PriorityQueue::new();
    for &start_position in start_positions {
        let node = graph.index_to_node(start_position);
        mark_banded(band, node, first_in_order, band_order, band_order_out_of_order);
        let start = graph.node_start(node);
        let end = graph.node_end(node);
        debug_assert!(start_position >= start && start_position < end);
        queue.push_increase((node, false), Reverse(start_position - start));
        queue.push_increase((node, true), Reverse(end - start_position - 1));
    }
    while let Some(((node, at_end), Reverse(distance))) = queue.pop() {
        if distance > dynamic_width {
            continue;
        }
        let recorded = if at_end {
            &mut *distance_at_node_end
        } else {
            &mut *distance_at_node_start
        };
        if let Some(&previous) = recorded.get(&node) {
            if previous <= distance {
                continue;
            }
        }
        recorded.insert(node, distance);
        mark_banded(band, node, first_in_order, band_order, band_order_out_of_order);
        let size = graph.node_len(node);
        if at_end {
            queue.push_increase((node, false), Reverse(distance + size - 1));
            for &neighbor in graph.out_neighbors(node) {
                queue.push_increase((neighbor, false), Reverse(distance + 1));
            }
        } else {
            queue.push_increase((node, true), Reverse(distance + size - 1));
            for &neighbor in graph.in_neighbors(node) {
                queue.push_increase((neighbor, true), Reverse(distance + 1));
            }
        }
    }
}

/// Expands the band for the next row: the previous row's minimum position is
/// projected w characters forward and everything within `dynamic_width` of
/// the projection becomes banded.
pub fn project_forward_and_expand_band(
    graph: &AlignmentGraph,
    band: &mut [bool],
    previous_minimum_index: usize,
    dynamic_width: usize,
    band_order: &mut BTreeSet<usize>,
    band_order_out_of_order: &mut BTreeSet<usize>,
) {
    debug_assert!(previous_minimum_index < graph.buffer_len());
    let node = graph.index_to_node(previous_minimum_index);
    let mut positions = BTreeSet::new();
    positions.insert(previous_minimum_index);
    let mut positions = graph.project_forward(&positions, WORD_SIZE);
    positions.insert(previous_minimum_index);
    mark_banded(band, node, graph.first_in_order(), band_order, band_order_out_of_order);
    let mut distance_at_node_start = HashMap::default();
    let mut distance_at_node_end = HashMap::default();
    expand_band_from_positions(
        graph, band, &positions, dynamic_width,
        &mut distance_at_node_start, &mut distance_at_node_end,
        band_order, band_order_out_of_order,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn chain_graph() -> AlignmentGraph {
        // 1 -> 2 -> 3, each ten characters long
        let mut builder = GraphBuilder::default();
        builder.add_node(1, "AAAAAAAAAA").unwrap();
        builder.add_node(2, "CCCCCCCCCC").unwrap();
        builder.add_node(3, "GGGGGGGGGG").unwrap();
        builder.add_edge(1, false, 2, false);
        builder.add_edge(2, false, 3, false);
        builder.finalize().unwrap()
    }

    #[test]
    fn test_full_band() {
        let graph = chain_graph();
        let band = full_band(&graph, 128);
        assert_eq!(band.len(), 2);
        assert!(band[0].iter().all(|&b| b));
        assert_eq!(band[0].len(), graph.node_count());
    }

    #[test]
    fn test_extended_node_band_respects_width() {
        let graph = chain_graph();
        let node1 = graph.lookup_topology(2).unwrap();
        let node2 = graph.lookup_topology(4).unwrap();
        let node3 = graph.lookup_topology(6).unwrap();
        // width 5 only reaches the seed node itself
        let band = extended_node_band(&graph, node1, 5);
        assert!(band[0][node1]);
        assert!(!band[0][node2]);
        // width 15 reaches the second node but not the third
        let band = extended_node_band(&graph, node1, 15);
        assert!(band[0][node2]);
        assert!(!band[0][node3]);
    }

    #[test]
    fn test_expand_band_distances() {
        let graph = chain_graph();
        let node1 = graph.lookup_topology(2).unwrap();
        let node2 = graph.lookup_topology(4).unwrap();
        let node3 = graph.lookup_topology(6).unwrap();
        let mut band = vec![false; graph.node_count()];
        let mut starts = HashMap::default();
        let mut ends = HashMap::default();
        let mut order = BTreeSet::new();
        let mut out_of_order = BTreeSet::new();
        let mut positions = BTreeSet::new();
        // last position of node 2
        positions.insert(graph.node_end(node2) - 1);
        expand_band_from_positions(
            &graph, &mut band, &positions, 12, &mut starts, &mut ends, &mut order, &mut out_of_order,
        );
        assert!(band[node1] && band[node2] && band[node3]);
        assert_eq!(ends[&node2], 0);
        assert_eq!(starts[&node2], 9);
        assert_eq!(starts[&node3], 1);
        assert_eq!(ends[&node3], 10);
        assert_eq!(ends[&node1], 10);
        // node 1's start is 19 characters away, beyond the width
        assert!(!starts.contains_key(&node1));
        assert!(out_of_order.is_empty());
    }

    #[test]
    fn test_project_and_expand_marks_downstream() {
        let graph = chain_graph();
        let node1 = graph.lookup_topology(2).unwrap();
        let node3 = graph.lookup_topology(6).unwrap();
        let mut band = vec![false; graph.node_count()];
        let mut order = BTreeSet::new();
        let mut out_of_order = BTreeSet::new();
        project_forward_and_expand_band(
            &graph, &mut band, graph.node_start(node1), 10, &mut order, &mut out_of_order,
        );
        // the projection runs 64 characters ahead, well past the chain end
        assert!(band[node1]);
        assert!(band[node3]);
        assert!(order.contains(&node1));
    }
}
