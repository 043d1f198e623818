mod bplus_tree;
mod tree_iterator;

pub use bplus_tree::BPlusTreeIndex;
pub use tree_iterator::TreeIndexIterator;
