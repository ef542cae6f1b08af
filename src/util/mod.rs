
/// Helper functions for generating the progress bars
pub mod progress_bar;
/// Alphabet tables and sequence helpers
pub mod sequence;
