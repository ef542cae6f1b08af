
use anyhow::{bail, ensure};
use rustc_hash::FxHashMap as HashMap;
use std::collections::BTreeSet;

use crate::align::bitvector::WORD_SIZE;
use crate::graph::cuts::{build_cycle_cut, cycle_participants, CycleCut};
use crate::util::sequence::{iupac_bits, reverse_complement, SENTINEL_CHAR};

/// A finalized, immutable sequence graph ready for alignment. Every segment
/// exists on both strands (forward topology id `2k`, reverse `2k+1`, carrying
/// the reverse complement sequence), and two sentinel nodes bracket all
/// paths. Internal node indices are ordered so that every cycle participant
/// sits below `first_in_order` and the remaining nodes are topological.
#[derive(Clone, Debug)]
pub struct AlignmentGraph {
    /// Concatenated node sequences, one flat buffer
    node_sequences: Vec<u8>,
    node_start: Vec<usize>,
    node_end: Vec<usize>,
    /// Owning node of every buffer position
    index_to_node: Vec<usize>,
    /// Original segment id per internal node (sentinels hold u64::MAX)
    node_id: Vec<u64>,
    /// Strand flag per internal node
    reverse: Vec<bool>,
    /// Bigraph topology id per internal node, used for strand-sibling lookups
    topology_id: Vec<u64>,
    /// Bigraph topology id to internal node index
    node_lookup: HashMap<u64, usize>,
    in_neighbors: Vec<Vec<usize>>,
    out_neighbors: Vec<Vec<usize>>,
    /// Nodes below this internal index participate in cycles
    first_in_order: usize,
    /// Cycle cut descriptors, non-trivial only for out-of-order nodes above 0
    cuts: Vec<CycleCut>,
    dummy_node_start: usize,
    dummy_node_end: usize,
}

impl AlignmentGraph {
    pub fn node_count(&self) -> usize {
        self.node_start.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.node_sequences.len()
    }

    #[inline]
    pub fn node_start(&self, node: usize) -> usize {
        self.node_start[node]
    }

    #[inline]
    pub fn node_end(&self, node: usize) -> usize {
        self.node_end[node]
    }

    #[inline]
    pub fn node_len(&self, node: usize) -> usize {
        self.node_end[node] - self.node_start[node]
    }

    #[inline]
    pub fn seq_at(&self, position: usize) -> u8 {
        self.node_sequences[position]
    }

    #[inline]
    pub fn index_to_node(&self, position: usize) -> usize {
        self.index_to_node[position]
    }

    #[inline]
    pub fn in_neighbors(&self, node: usize) -> &[usize] {
        &self.in_neighbors[node]
    }

    #[inline]
    pub fn out_neighbors(&self, node: usize) -> &[usize] {
        &self.out_neighbors[node]
    }

    pub fn first_in_order(&self) -> usize {
        self.first_in_order
    }

    pub fn cut(&self, node: usize) -> &CycleCut {
        &self.cuts[node]
    }

    pub fn dummy_node_start(&self) -> usize {
        self.dummy_node_start
    }

    pub fn dummy_node_end(&self) -> usize {
        self.dummy_node_end
    }

    pub fn is_dummy(&self, node: usize) -> bool {
        node == self.dummy_node_start || node == self.dummy_node_end
    }

    pub fn node_id(&self, node: usize) -> u64 {
        self.node_id[node]
    }

    pub fn is_reverse(&self, node: usize) -> bool {
        self.reverse[node]
    }

    /// Internal node index for a bigraph topology id (`2k` forward strand of
    /// segment k, `2k+1` reverse strand).
    pub fn lookup_topology(&self, topology_id: u64) -> Option<usize> {
        self.node_lookup.get(&topology_id).copied()
    }

    /// Buffer positions reachable by walking exactly `distance` characters
    /// forward from the given positions; paths that dead-end earlier keep
    /// their terminal position.
    pub fn project_forward(&self, positions: &BTreeSet<usize>, distance: usize) -> BTreeSet<usize> {
        let mut result = BTreeSet::new();
        let mut visited: BTreeSet<usize> = positions.clone();
        let mut frontier: BTreeSet<usize> = positions.clone();
        for _ in 0..distance {
            let mut next = BTreeSet::new();
            for &position in &frontier {
                let node = self.index_to_node[position];
                if position + 1 < self.node_end[node] {
                    if visited.insert(position + 1) {
                        next.insert(position + 1);
                    }
                } else {
                    if self.out_neighbors[node].is_empty() {
                        result.insert(position);
                    }
                    for &neighbor in &self.out_neighbors[node] {
                        let start = self.node_start[neighbor];
                        if visited.insert(start) {
                            next.insert(start);
                        }
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        result.extend(frontier);
        result
    }

    /// The same offset on the strand-sibling node; sentinel positions map to
    /// themselves. An involution over the buffer.
    pub fn get_reverse_position(&self, position: usize) -> usize {
        let node = self.index_to_node[position];
        if self.is_dummy(node) {
            return position;
        }
        let offset = position - self.node_start[node];
        let sibling = self.node_lookup[&(self.topology_id[node] ^ 1)];
        self.node_start[sibling] + (self.node_len(sibling) - 1 - offset)
    }
}

/// Accumulates segments and links, then finalizes them into an
/// [`AlignmentGraph`]. Edge endpoints are resolved at finalize time so
/// segments and links can arrive in any order.
#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    sequences: Vec<Vec<u8>>,
    segment_ids: Vec<u64>,
    strand_reverse: Vec<bool>,
    topology_ids: Vec<u64>,
    topology_lookup: HashMap<u64, usize>,
    edges: Vec<(u64, u64)>,
}

impl GraphBuilder {
    /// Adds a segment, creating both strand nodes (the reverse strand carries
    /// the reverse complement).
    /// # Arguments
    /// * `node_id` - the segment identifier
    /// * `sequence` - the forward-strand sequence
    /// # Errors
    /// * if the sequence is empty or contains characters outside the accepted alphabet
    /// * if the segment id was already added
    pub fn add_node(&mut self, node_id: u64, sequence: &str) -> anyhow::Result<()> {
        ensure!(!sequence.is_empty(), "node {node_id} has an empty sequence");
        ensure!(node_id < u64::MAX / 2, "node id {node_id} is out of range");
        for c in sequence.bytes() {
            if iupac_bits(c).is_none() {
                bail!("node {} contains unsupported character {:?}", node_id, c as char);
            }
        }
        let forward_topology = node_id * 2;
        ensure!(
            !self.topology_lookup.contains_key(&forward_topology),
            "node {node_id} was added twice"
        );
        let upper: Vec<u8> = sequence.bytes().map(|c| c.to_ascii_uppercase()).collect();
        let reverse = reverse_complement(&upper);
        self.push_strand(forward_topology, node_id, false, upper);
        self.push_strand(forward_topology + 1, node_id, true, reverse);
        Ok(())
    }

    fn push_strand(&mut self, topology_id: u64, segment_id: u64, is_reverse: bool, sequence: Vec<u8>) {
        let index = self.sequences.len();
        self.sequences.push(sequence);
        self.segment_ids.push(segment_id);
        self.strand_reverse.push(is_reverse);
        self.topology_ids.push(topology_id);
        self.topology_lookup.insert(topology_id, index);
    }

    /// Adds a link between two oriented segments, together with its mirror on
    /// the opposite strands. Endpoints are validated at finalize time.
    pub fn add_edge(&mut self, from_id: u64, from_reverse: bool, to_id: u64, to_reverse: bool) {
        let from_topology = from_id * 2 + u64::from(from_reverse);
        let to_topology = to_id * 2 + u64::from(to_reverse);
        self.edges.push((from_topology, to_topology));
        self.edges.push((to_topology ^ 1, from_topology ^ 1));
    }

    /// Finalizes the graph: resolves edges, brackets all paths with the two
    /// sentinel nodes, orders cycle participants below `first_in_order` with
    /// the acyclic remainder in topological order, and precomputes the cycle
    /// cut descriptors.
    /// # Errors
    /// * if the graph has no nodes
    /// * if an edge references a segment that was never added
    pub fn finalize(self) -> anyhow::Result<AlignmentGraph> {
        ensure!(!self.sequences.is_empty(), "graph has no nodes");
        let base = self.sequences.len();
        let builder_dummy_start = base;
        let builder_dummy_end = base + 1;
        let total = base + 2;

        let mut out_adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); total];
        let mut in_adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); total];
        for &(from_topology, to_topology) in &self.edges {
            let from = match self.topology_lookup.get(&from_topology) {
                Some(&index) => index,
                None => bail!("edge references missing node {}", from_topology / 2),
            };
            let to = match self.topology_lookup.get(&to_topology) {
                Some(&index) => index,
                None => bail!("edge references missing node {}", to_topology / 2),
            };
            out_adjacency[from].insert(to);
            in_adjacency[to].insert(from);
        }
        // sentinels bracket all paths
        let source_nodes: Vec<usize> = (0..base).filter(|&n| in_adjacency[n].is_empty()).collect();
        let sink_nodes: Vec<usize> = (0..base).filter(|&n| out_adjacency[n].is_empty()).collect();
        for node in source_nodes {
            out_adjacency[builder_dummy_start].insert(node);
            in_adjacency[node].insert(builder_dummy_start);
        }
        for node in sink_nodes {
            out_adjacency[node].insert(builder_dummy_end);
            in_adjacency[builder_dummy_end].insert(node);
        }
        let out_vec: Vec<Vec<usize>> =
            out_adjacency.iter().map(|s| s.iter().copied().collect()).collect();
        let in_vec: Vec<Vec<usize>> =
            in_adjacency.iter().map(|s| s.iter().copied().collect()).collect();

        // cycle participants first, then the acyclic remainder topologically
        let cyclic = cycle_participants(&out_vec);
        let mut order: Vec<usize> = (0..total).filter(|&v| cyclic[v]).collect();
        let first_in_order = order.len();
        let mut indegree = vec![0usize; total];
        for v in 0..total {
            if cyclic[v] {
                continue;
            }
            indegree[v] = in_vec[v].iter().filter(|&&u| !cyclic[u]).count();
        }
        let mut ready: BTreeSet<usize> =
            (0..total).filter(|&v| !cyclic[v] && indegree[v] == 0).collect();
        while let Some(v) = ready.pop_first() {
            order.push(v);
            for &u in &out_vec[v] {
                if cyclic[u] {
                    continue;
                }
                indegree[u] -= 1;
                if indegree[u] == 0 {
                    ready.insert(u);
                }
            }
        }
        ensure!(order.len() == total, "topological ordering left nodes unplaced");

        let mut internal = vec![0usize; total];
        for (position, &builder_index) in order.iter().enumerate() {
            internal[builder_index] = position;
        }

        // assemble the flat buffers in internal order
        let mut node_sequences = Vec::new();
        let mut node_start = Vec::with_capacity(total);
        let mut node_end = Vec::with_capacity(total);
        let mut index_to_node = Vec::new();
        let mut node_id = Vec::with_capacity(total);
        let mut reverse = Vec::with_capacity(total);
        let mut topology_id = Vec::with_capacity(total);
        let mut node_lookup = HashMap::default();
        for (position, &builder_index) in order.iter().enumerate() {
            let sequence: &[u8] = if builder_index == builder_dummy_start {
                &[SENTINEL_CHAR]
            } else if builder_index == builder_dummy_end {
                &[SENTINEL_CHAR; WORD_SIZE]
            } else {
                &self.sequences[builder_index]
            };
            node_start.push(node_sequences.len());
            node_sequences.extend_from_slice(sequence);
            node_end.push(node_sequences.len());
            index_to_node.resize(node_sequences.len(), position);
            if builder_index < base {
                node_id.push(self.segment_ids[builder_index]);
                reverse.push(self.strand_reverse[builder_index]);
                topology_id.push(self.topology_ids[builder_index]);
                node_lookup.insert(self.topology_ids[builder_index], position);
            } else {
                node_id.push(u64::MAX);
                reverse.push(false);
                topology_id.push(u64::MAX);
            }
        }
        let remap = |neighbors: &[Vec<usize>]| -> Vec<Vec<usize>> {
            order
                .iter()
                .map(|&builder_index| {
                    neighbors[builder_index].iter().map(|&n| internal[n]).collect()
                })
                .collect()
        };
        let in_neighbors = remap(&in_vec);
        let out_neighbors = remap(&out_vec);

        let node_lengths: Vec<usize> =
            node_start.iter().zip(node_end.iter()).map(|(&s, &e)| e - s).collect();
        let mut cuts = vec![CycleCut::default(); total];
        for owner in 1..first_in_order {
            cuts[owner] = build_cycle_cut(owner, &in_neighbors, &node_lengths, first_in_order);
        }

        Ok(AlignmentGraph {
            node_sequences,
            node_start,
            node_end,
            index_to_node,
            node_id,
            reverse,
            topology_id,
            node_lookup,
            in_neighbors,
            out_neighbors,
            first_in_order,
            cuts,
            dummy_node_start: internal[builder_dummy_start],
            dummy_node_end: internal[builder_dummy_end],
        })
    }
}
