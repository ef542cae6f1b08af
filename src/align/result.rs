
use serde::Serialize;

use crate::align::word_slice::Score;

/// A single edit within a mapping: `from_length` graph characters against
/// `to_length` read characters, with the read slice they consume.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Edit {
    pub from_length: usize,
    pub to_length: usize,
    pub sequence: String,
}

/// One node visit on the alignment path.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Mapping {
    /// Original segment id
    pub node_id: u64,
    /// Strand of the visit
    pub is_reverse: bool,
    /// Offset of the first touched position from the node start
    pub offset: usize,
    /// Position of this mapping along the path
    pub rank: usize,
    pub edits: Vec<Edit>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AlignmentPath {
    pub mappings: Vec<Mapping>,
}

impl AlignmentPath {
    /// Compact single-line rendering, e.g. `1+:0>2-:3`
    pub fn path_string(&self) -> String {
        self.mappings
            .iter()
            .map(|m| format!("{}{}:{}", m.node_id, if m.is_reverse { '-' } else { '+' }, m.offset))
            .collect::<Vec<String>>()
            .join(">")
    }

    /// Total read characters consumed by the path edits
    pub fn total_to_length(&self) -> usize {
        self.mappings.iter().flat_map(|m| m.edits.iter()).map(|e| e.to_length).sum()
    }

    /// Total graph characters consumed by the path edits
    pub fn total_from_length(&self) -> usize {
        self.mappings.iter().flat_map(|m| m.edits.iter()).map(|e| e.from_length).sum()
    }
}

/// A scored alignment of one read against the graph.
#[derive(Clone, Debug, Serialize)]
pub struct Alignment {
    pub name: String,
    pub sequence: String,
    pub score: Score,
    pub path: AlignmentPath,
}

/// Outcome of one alignment call. A failed alignment carries the maximum
/// score and an empty path.
#[derive(Clone, Debug)]
pub struct AlignmentResult {
    pub alignment: Alignment,
    pub alignment_failed: bool,
    pub cells_processed: usize,
    pub elapsed_ms: u64,
}

impl AlignmentResult {
    /// The empty failed alignment
    pub fn empty(name: &str, cells_processed: usize, elapsed_ms: u64) -> Self {
        Self {
            alignment: Alignment {
                name: name.to_string(),
                sequence: String::new(),
                score: Score::MAX,
                path: AlignmentPath::default(),
            },
            alignment_failed: true,
            cells_processed,
            elapsed_ms,
        }
    }
}
