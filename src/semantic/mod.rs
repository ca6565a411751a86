//! Semantic model: symbols, occurrences, relationships, and the per-package
//! index assembled from per-file fragments.

mod index;
mod records;

pub use index::{FragmentDiff, SemanticIndex};
pub use records::{content_hash, FileFragment, Occurrence, Relationship, Symbol};
