//! Gildash: a local code-intelligence engine for TypeScript source trees.
//!
//! Gildash crawls a project root, parses source files with tree-sitter,
//! extracts symbol declarations and inter-file relationships (imports,
//! heritage, calls, type references, re-exports), persists them in an
//! embedded SQLite store, and answers queries about symbols, dependency
//! graphs, and change-impact sets. In watch mode it debounces filesystem
//! events and incrementally reconciles the store, coordinating multiple
//! processes on the same store through a single-writer ownership protocol.
//!
//! # Path Conventions
//!
//! - Store rows are keyed by **project-root-relative** paths with `/`
//!   separators (`src/store/index.ts`).
//! - Byte spans are 0-indexed offsets into the file's bytes.
//!
//! # Roles
//!
//! Exactly one process at a time owns the store and performs writes; any
//! number of readers serve queries and promote themselves when the owner
//! releases, dies, or goes stale. See [`store::OwnershipRepo`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod filter;
pub mod graph;
pub mod index;
pub mod parser;
pub mod resolver;
pub mod store;
pub mod validation;
pub mod watch;

pub use config::EngineConfig;
pub use engine::{EngineStats, Gildash, SemanticBridge};
pub use error::{EngineError, Result};
pub use events::{ChangeKind, EngineEvent, Role};
pub use extract::{RelationType, SymbolKind};
pub use graph::{CycleOptions, DependencyGraph, FanMetrics};
pub use index::{FailureStage, IndexFailure, IndexReport, KnownFiles};
pub use resolver::{AliasTable, ImportResolver};
pub use store::{
    AcquireOutcome, AcquireParams, FileRecord, OwnerRow, RelationRecord, Store, SymbolRecord,
    SymbolStats,
};
pub use watch::{FileSystemWatcher, WatcherBatch, WatcherMessage};
