
/// Generates the alignment table, one line per read
pub mod alignment_writer;
