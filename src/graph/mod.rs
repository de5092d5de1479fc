//! Pure chain-of-command graph algorithms
//!
//! Nothing here touches the store: services build a `ChainIndex` from the
//! edges they loaded and run the traversals against it.

pub mod index;
pub mod traversal;

pub use index::{ChainIndex, SuperiorLink};
pub use traversal::{
    ancestors, best_superior, centrality, descendants, find_cycle, find_path, reporting_chain,
};
