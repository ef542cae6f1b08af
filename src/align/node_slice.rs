
use rustc_hash::FxHashMap as HashMap;

use crate::align::word_slice::WordSlice;

/// Sparse per-row DP state: one `WordSlice` per graph position for every
/// banded node. Two instances are alive during an alignment, one for the
/// current row and one for the previous row; their roles swap on row advance.
#[derive(Clone, Debug, Default)]
pub struct NodeSliceMap {
    slices: HashMap<usize, Vec<WordSlice>>,
}

impl NodeSliceMap {
    /// Registers a node with zero-initialized slices for all of its positions.
    /// # Arguments
    /// * `node` - internal node index
    /// * `len` - number of graph positions the node spans
    pub fn add_node(&mut self, node: usize, len: usize) {
        self.slices.insert(node, vec![WordSlice::default(); len]);
    }

    pub fn has_node(&self, node: usize) -> bool {
        self.slices.contains_key(&node)
    }

    pub fn node(&self, node: usize) -> &[WordSlice] {
        &self.slices[&node]
    }

    pub fn node_mut(&mut self, node: usize) -> &mut [WordSlice] {
        self.slices.get_mut(&node).expect("node was not added to the slice map")
    }

    /// Last column of a node, the value its out-neighbors read.
    pub fn last_column(&self, node: usize) -> WordSlice {
        *self.slices[&node].last().expect("nodes always span at least one position")
    }

    pub fn set_last_column(&mut self, node: usize, value: WordSlice) {
        *self.node_mut(node).last_mut().expect("nodes always span at least one position") = value;
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Vec<WordSlice>)> + '_ {
        self.slices.iter_mut().map(|(&node, slices)| (node, slices))
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::word_slice::source_slice_without_before;

    #[test]
    fn test_add_and_access() {
        let mut map = NodeSliceMap::default();
        map.add_node(3, 4);
        assert!(map.has_node(3));
        assert!(!map.has_node(2));
        assert_eq!(map.node(3).len(), 4);
        assert_eq!(map.last_column(3), WordSlice::default());

        let source = source_slice_without_before(0);
        map.set_last_column(3, source);
        assert_eq!(map.last_column(3), source);
        assert_eq!(map.node(3)[2], WordSlice::default());

        map.node_mut(3)[0] = source;
        assert_eq!(map.node(3)[0], source);
        assert_eq!(map.len(), 1);
    }
}
