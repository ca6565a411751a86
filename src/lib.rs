//! symdex: incremental semantic code index with a read-only SQL query
//! surface, exposed to editor and LLM tooling over line-framed JSON-RPC.
//!
//! Data flow: watcher -> indexer -> (cache hit or analyzer) -> semantic
//! index -> converter -> relational store -> query.

pub mod binding;
pub mod cache;
pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod registry;
pub mod rpc;
pub mod semantic;
pub mod store;
pub mod types;
pub mod watcher;

pub use binding::{Binding, BindingRegistry, PlainBinding};
pub use cache::FragmentCache;
pub use config::Settings;
pub use indexing::{IndexStats, IndexUpdate, PackageIndexer};
pub use registry::{PackageInfo, PackageRegistry};
pub use rpc::{Session, SessionState};
pub use semantic::{FileFragment, Occurrence, Relationship, SemanticIndex, Symbol};
pub use store::{QueryResult, SymbolStore};
pub use types::{ChangeKind, FileChange, QueryScope, RelationKind, SymbolKind};
