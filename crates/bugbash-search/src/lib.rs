#![forbid(unsafe_code)]
//! bugbash-search library.
//!
//! # Conventions
//!
//! - **Purity**: scoring and clustering never touch the store; callers pass
//!   a snapshot in and act on the result.
//! - **Logging**: Use `tracing` macros (`warn!`, `debug!`).

pub mod duplicates;
pub mod similarity;

pub use duplicates::{
    DuplicateGroup, DuplicatePolicy, SimilarityEdge, compute_duplicate_groups, similarity_edges,
};
pub use similarity::{jaccard, similarity, tokenize};
