/*!
# Graph module
The finalized alignment graph, its builder, and the cycle cut decomposition
used when the graph is not a DAG.
*/

/// The finalized graph structure and its builder
pub mod alignment_graph;
/// Strongly connected component detection and cycle cut construction
pub mod cuts;

pub use alignment_graph::{AlignmentGraph, GraphBuilder};
pub use cuts::CycleCut;
