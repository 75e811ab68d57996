pub mod avl_tree;

pub use avl_tree::{AvlTree, Compare};
