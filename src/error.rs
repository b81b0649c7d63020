//! Error types for oxidiff
//!
//! Every fault the diff pipeline can raise is a variant of [`DiffError`]. Internal-consistency
//! faults (missing statements, unbreakable cycles, unknown object types) are not recoverable and
//! abort the whole run; I/O faults carry the path and the underlying cause.

use std::path::PathBuf;
use thiserror::Error;

use crate::dialect::Dialect;
use crate::model::{DbObjType, ObjectId, Side};

/// The main error type for oxidiff
#[derive(Debug, Error)]
pub enum DiffError {
    // ========================================================================
    // Internal consistency
    // ========================================================================
    /// A selected element or an additional dependency pair names a statement that is absent
    /// from the snapshot it is expected in.
    #[error("Unresolved reference: {id} is not present in the {side} snapshot")]
    UnresolvedReference { id: ObjectId, side: Side },

    /// Cycle breaking could not reduce the dependency graph to a DAG.
    #[error("Unresolvable dependency cycle between: {}", .objects.join(", "))]
    UnresolvableCycle { objects: Vec<String> },

    /// The dialect has no model for this object type at all.
    #[error("{kind} objects are not supported by the {dialect} dialect")]
    UnsupportedObjectType { dialect: Dialect, kind: DbObjType },

    /// The same identity carries incompatible statement bodies.
    #[error("Object {id} has mismatched types: {left} and {right}")]
    TypeMismatch {
        id: ObjectId,
        left: DbObjType,
        right: DbObjType,
    },

    // ========================================================================
    // Snapshot construction
    // ========================================================================
    /// A statement was placed under a parent that cannot own it.
    #[error("{child} cannot be placed under {parent}")]
    InvalidHierarchy { parent: ObjectId, child: ObjectId },

    /// An explicitly declared dependency names a statement the snapshot does not contain.
    #[error("{from} depends on {to}, which does not exist")]
    MissingDependency { from: ObjectId, to: ObjectId },

    /// Two statements share one identity.
    #[error("Duplicate object: {0}")]
    DuplicateObject(ObjectId),

    /// Old and new snapshots were loaded for different dialects.
    #[error("Snapshot dialects differ: old is {old}, new is {new}")]
    DialectMismatch { old: Dialect, new: Dialect },

    /// A snapshot was built while analysis tasks were still queued.
    #[error("{0} analysis tasks are still pending; drain them before building the snapshot")]
    PendingAnalysis(usize),

    // ========================================================================
    // Configuration and I/O
    // ========================================================================
    /// An ignore or selection pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Unknown object type name in settings or on the command line.
    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    /// Reading a snapshot, settings or pre/post script failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document did not match the expected layout.
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A background analysis task panicked or was cancelled.
    #[error("Analysis task failed: {0}")]
    Analysis(String),
}

impl DiffError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiffError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for faults that indicate a bug in the caller or in the model rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DiffError::UnresolvedReference { .. }
                | DiffError::UnresolvableCycle { .. }
                | DiffError::UnsupportedObjectType { .. }
                | DiffError::TypeMismatch { .. }
                | DiffError::PendingAnalysis(_)
                | DiffError::MissingDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DiffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_participants() {
        let err = DiffError::UnresolvableCycle {
            objects: vec!["VIEW public.a".to_string(), "VIEW public.b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unresolvable dependency cycle between: VIEW public.a, VIEW public.b"
        );
        assert!(err.is_internal());
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error;

        let err = DiffError::io(
            "pre.sql",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("pre.sql"));
        assert!(err.source().is_some());
        assert!(!err.is_internal());
    }
}
