/*!
# Alignment module
Contains the bit-parallel banded DP engine and everything around it: the
word-level primitives, the per-row state, the band bookkeeping, the backtrace
and the entry points that turn a read into an alignment path.
*/

/// Entry points of the aligner and trace-to-path conversion
pub mod aligner;
/// Reverse-BFS backtrace over the implicit edit DAG and window selection
pub mod backtrace;
/// Band membership, expansion and ordering
pub mod band;
/// Fixed-width word primitives for the bit-parallel arithmetic
pub mod bitvector;
/// Two-state Viterbi estimator over the per-row score deltas
pub mod correctness;
/// Per-row DP computation and the cycle resolver
pub mod engine;
/// Sparse node-to-slices state of the current and previous row
pub mod node_slice;
/// Alignment outcome types
pub mod result;
/// Seeded two-directional split alignment
pub mod split;
/// The compressed w-tall DP column and its operations
pub mod word_slice;
