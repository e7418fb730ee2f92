pub mod tree_merger;

pub use tree_merger::{MergeProgress, TreeMerger};
