
use noodles::bgzf;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::align::result::AlignmentResult;

/// This is a wrapper for writing the per-read alignment table to a file
pub struct AlignmentWriter {
    /// Handle on the writer
    csv_writer: csv::Writer<bgzf::MultithreadedWriter<File>>,
}

/// Contains all the data written to each row of our alignment file
#[derive(Serialize)]
struct AlignmentRow {
    /// Read identifier
    read_id: String,
    /// True when the alignment was rejected
    alignment_failed: bool,
    /// Edit distance of the reported path; absent for failed alignments
    score: Option<i64>,
    /// Compact path rendering, `segment(+/-):offset` joined by `>`
    path: String,
    /// Read length
    read_length: usize,
    /// Read characters covered by the reported path
    aligned_read_length: usize,
    /// Graph characters covered by the reported path
    aligned_graph_length: usize,
    /// DP cells processed while aligning this read
    cells_processed: usize,
    /// Wall-clock alignment time
    elapsed_ms: u64,
}

impl AlignmentRow {
    /// Creates a new row from an alignment outcome
    /// # Arguments
    /// * `read_length` - length of the input read (failed alignments carry an empty sequence)
    /// * `result` - the alignment outcome
    pub fn new(read_length: usize, result: &AlignmentResult) -> Self {
        Self {
            read_id: result.alignment.name.clone(),
            alignment_failed: result.alignment_failed,
            score: if result.alignment_failed { None } else { Some(result.alignment.score) },
            path: result.alignment.path.path_string(),
            read_length,
            aligned_read_length: result.alignment.path.total_to_length(),
            aligned_graph_length: result.alignment.path.total_from_length(),
            cells_processed: result.cells_processed,
            elapsed_ms: result.elapsed_ms,
        }
    }
}

impl AlignmentWriter {
    /// Creates a new writer for the alignment table
    /// # Arguments
    /// * `filename` - path that will get opened, must be .tsv.gz
    /// * `threads` - worker threads for the gzip writing
    pub fn new(filename: &Path, threads: usize) -> csv::Result<Self> {
        let delimiter: u8 = b'\t';
        let worker_threads = std::num::NonZeroUsize::new(threads.clamp(1, 4)).unwrap();
        let gzip_writer =
            bgzf::MultithreadedWriter::with_worker_count(worker_threads, File::create(filename)?);
        let csv_writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(gzip_writer);
        Ok(Self { csv_writer })
    }

    /// Will write one alignment outcome to the table
    /// # Arguments
    /// * `read_length` - length of the input read
    /// * `result` - the alignment outcome
    pub fn write_alignment(
        &mut self, read_length: usize, result: &AlignmentResult
    ) -> csv::Result<()> {
        let row = AlignmentRow::new(read_length, result);
        self.csv_writer.serialize(&row)?;
        Ok(())
    }

    /// Flushes the table; the bgzf stream is finalized when the writer drops
    pub fn finish(mut self) -> csv::Result<()> {
        self.csv_writer.flush()?;
        Ok(())
    }
}
