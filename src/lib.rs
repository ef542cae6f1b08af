
/*!
# Bandicoot
Bandicoot is the underlying library that supports the Bandicoot command line tool.
The library aligns DNA reads against a bigraph sequence graph with a bit-parallel,
banded edit-distance DP. The aligner module contains the main entry points, with
example usage below:

## Example align usage
```rust
use bandicoot::align::aligner::GraphAligner;
use bandicoot::graph::GraphBuilder;

// build a small bubble: two alternative openings feeding a shared tail
let mut builder = GraphBuilder::default();
builder.add_node(1, "ACG").unwrap();
builder.add_node(2, "TCG").unwrap();
builder.add_node(3, "AAA").unwrap();
builder.add_edge(1, false, 3, false);
builder.add_edge(2, false, 3, false);
let graph = builder.finalize().unwrap();

// align a read that follows the second branch
let aligner = GraphAligner::new(&graph);
let result = aligner.align_one_way("read-1", "TCGAAA", 64, 64).unwrap();
assert!(!result.alignment_failed);
assert_eq!(result.alignment.score, 0);

// the path visits segment 2 and then segment 3, consuming the whole read
let nodes: Vec<u64> = result.alignment.path.mappings.iter().map(|m| m.node_id).collect();
assert_eq!(nodes, vec![2, 3]);
assert_eq!(result.alignment.path.total_to_length(), 6);
```
*/

/// Contains the bit-parallel banded DP engine and the alignment entry points
pub mod align;
/// Command line interface functionality that is specific to Bandicoot
pub mod cli;
/// Contains the finalized sequence graph and its builder
pub mod graph;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Contains generic utility functions
pub mod util;
/// All output writers
pub mod writers;
