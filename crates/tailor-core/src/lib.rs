//! Core data model and deterministic algorithms for tailor.
//!
//! Nothing in this crate performs I/O or talks to the reasoning service:
//! parsing, snapshot validation, splicing and the offline strategy heuristic
//! are pure functions of their inputs so they can be exercised directly.

pub mod change;
pub mod heuristics;
pub mod parser;
pub mod project;
pub mod protocol;
pub mod routes;
pub mod scope;
pub mod snapshot;
pub mod splice;

pub use change::{ChangeDetails, ChangeLog, ChangeType, ModificationChange};
pub use heuristics::HeuristicSuggestion;
pub use parser::{parse, parse_for_path, parses_cleanly, Dialect, NodeKind, StructuralNode};
pub use project::{FileMap, FileType, ProjectFile};
pub use protocol::{Approach, ModificationRequest, ModificationResult, RelevanceResult};
pub use routes::RouteUpdateError;
pub use scope::{ComponentType, ModificationScope, Strategy};
pub use snapshot::{StructuralSnapshot, ValidationFailure};
pub use splice::{Replacement, SpliceError};
