
use anyhow::{bail, Context};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::graph::{AlignmentGraph, GraphBuilder};

/// Parses the orientation column of an `L` line.
fn parse_orientation(field: &str, line_number: usize) -> anyhow::Result<bool> {
    match field {
        "+" => Ok(false),
        "-" => Ok(true),
        other => bail!("line {line_number}: unknown orientation {other:?}"),
    }
}

/// Loads a graph from a GFA subset: `S` lines with numeric segment names and
/// `L` lines with zero-overlap links. Header and other record types are
/// skipped. Gzipped files are detected by extension.
/// # Arguments
/// * `filename` - the GFA file to load, plain or `.gz`
/// # Errors
/// * if the file cannot be opened or a record is malformed
/// * if finalization fails, e.g. a link references a missing segment
pub fn load_graph(filename: &Path) -> anyhow::Result<AlignmentGraph> {
    let reader: Box<dyn BufRead> = if filename.extension().unwrap_or_default() == "gz" {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            File::open(filename).with_context(|| format!("Error while opening {filename:?}:"))?,
        )))
    } else {
        Box::new(BufReader::new(
            File::open(filename).with_context(|| format!("Error while opening {filename:?}:"))?,
        ))
    };

    let mut builder = GraphBuilder::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Error while reading {filename:?}:"))?;
        let line_number = index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            "S" => {
                if fields.len() < 3 {
                    bail!("line {line_number}: S record with fewer than 3 fields");
                }
                let segment_id: u64 = fields[1]
                    .parse()
                    .with_context(|| format!("line {line_number}: non-numeric segment name {:?}", fields[1]))?;
                builder
                    .add_node(segment_id, fields[2])
                    .with_context(|| format!("line {line_number}:"))?;
            }
            "L" => {
                if fields.len() < 5 {
                    bail!("line {line_number}: L record with fewer than 5 fields");
                }
                let from_id: u64 = fields[1]
                    .parse()
                    .with_context(|| format!("line {line_number}: non-numeric segment name {:?}", fields[1]))?;
                let from_reverse = parse_orientation(fields[2], line_number)?;
                let to_id: u64 = fields[3]
                    .parse()
                    .with_context(|| format!("line {line_number}: non-numeric segment name {:?}", fields[3]))?;
                let to_reverse = parse_orientation(fields[4], line_number)?;
                if let Some(&overlap) = fields.get(5) {
                    if overlap != "0M" && overlap != "*" {
                        bail!("line {line_number}: only zero-overlap links are supported, found {overlap:?}");
                    }
                }
                builder.add_edge(from_id, from_reverse, to_id, to_reverse);
            }
            _ => {}
        }
    }
    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_gfa(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_simple_gfa() {
        let path = write_temp_gfa(
            "bandicoot_gfa_simple.gfa",
            "H\tVN:Z:1.0\nS\t1\tACG\nS\t2\tTT\nL\t1\t+\t2\t+\t0M\n",
        );
        let graph = load_graph(&path).unwrap();
        let node1 = graph.lookup_topology(2).unwrap();
        let node2 = graph.lookup_topology(4).unwrap();
        assert!(graph.out_neighbors(node1).contains(&node2));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_bad_records() {
        let path = write_temp_gfa("bandicoot_gfa_bad_s.gfa", "S\t1\n");
        assert!(load_graph(&path).is_err());
        std::fs::remove_file(&path).ok();

        let path = write_temp_gfa("bandicoot_gfa_bad_overlap.gfa", "S\t1\tACG\nS\t2\tTT\nL\t1\t+\t2\t+\t5M\n");
        assert!(load_graph(&path).is_err());
        std::fs::remove_file(&path).ok();

        let path = write_temp_gfa("bandicoot_gfa_dead_link.gfa", "S\t1\tACG\nL\t1\t+\t9\t+\t0M\n");
        assert!(load_graph(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
