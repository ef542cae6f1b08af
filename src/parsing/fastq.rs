
use anyhow::Context;
use noodles::fastq;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One loaded read
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FastqRecord {
    pub seq_id: String,
    pub sequence: String,
}

/// Loads all reads from a FASTQ file, plain or gzipped by extension.
/// # Arguments
/// * `filename` - the FASTQ file to load
/// # Errors
/// * if the file cannot be opened or a record is malformed
/// * if a read name or sequence is not valid UTF-8
pub fn load_fastq(filename: &Path) -> anyhow::Result<Vec<FastqRecord>> {
    let reader: Box<dyn BufRead> = if filename.extension().unwrap_or_default() == "gz" {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            File::open(filename).with_context(|| format!("Error while opening {filename:?}:"))?,
        )))
    } else {
        Box::new(BufReader::new(
            File::open(filename).with_context(|| format!("Error while opening {filename:?}:"))?,
        ))
    };
    let mut fastq_reader = fastq::io::Reader::new(reader);
    let mut result = Vec::new();
    for record in fastq_reader.records() {
        let record = record.with_context(|| format!("Error while reading {filename:?}:"))?;
        let seq_id = String::from_utf8(record.name().to_vec())
            .with_context(|| format!("Non-UTF-8 read name in {filename:?}"))?;
        let sequence = String::from_utf8(record.sequence().to_vec())
            .with_context(|| format!("Non-UTF-8 sequence in {filename:?}"))?;
        result.push(FastqRecord { seq_id, sequence });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_fastq() {
        let path = std::env::temp_dir().join("bandicoot_fastq_test.fastq");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"@read-1\nACGT\n+\nIIII\n@read-2\nTTTT\n+\nIIII\n").unwrap();
        drop(file);
        let records = load_fastq(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq_id, "read-1");
        assert_eq!(records[0].sequence, "ACGT");
        assert_eq!(records[1].seq_id, "read-2");
        std::fs::remove_file(&path).ok();
    }
}
