
use anyhow::Context;
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use std::path::Path;

/// One row of the seed hits file
#[derive(Debug, Deserialize)]
struct SeedRow {
    read_id: String,
    node_id: u64,
    read_position: usize,
}

/// Loads seed hits from a headered TSV with columns
/// `read_id / node_id / read_position`, grouped by read.
/// # Arguments
/// * `filename` - the seed TSV
/// # Errors
/// * if the file cannot be opened or a row fails to parse
pub fn load_seeds(filename: &Path) -> anyhow::Result<HashMap<String, Vec<(u64, usize)>>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let mut result: HashMap<String, Vec<(u64, usize)>> = HashMap::default();
    for row in csv_reader.deserialize() {
        let row: SeedRow = row.with_context(|| format!("Error while parsing {filename:?}:"))?;
        result.entry(row.read_id).or_default().push((row.node_id, row.read_position));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_seeds() {
        let path = std::env::temp_dir().join("bandicoot_seeds_test.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"read_id\tnode_id\tread_position\nread-1\t5\t10\nread-1\t7\t20\nread-2\t5\t3\n")
            .unwrap();
        drop(file);
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(seeds["read-1"], vec![(5, 10), (7, 20)]);
        assert_eq!(seeds["read-2"], vec![(5, 3)]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_seeds_rejects_garbage() {
        let path = std::env::temp_dir().join("bandicoot_seeds_bad.tsv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"read_id\tnode_id\tread_position\nread-1\tfive\t10\n").unwrap();
        drop(file);
        assert!(load_seeds(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
