//! `TideExecutor` Module
//!
//! Provides the `TideExecutor` trait that abstracts round-trip execution of a
//! composed query term against a document store.
//!
//! This trait is the seam between the pure query compiler and the physical
//! transport: connection acquisition, pooling and retry all live behind an
//! implementation of this trait, never in the core.

use crate::term::{Datum, Term};
use serde::Deserialize;
use std::fmt;

/// `TideExecutor` error type
#[derive(Debug)]
pub enum TideError {
    /// A model name that was never registered
    UnknownModel(String),
    /// The same model name registered twice (configuration error)
    DuplicateModel(String),
    /// A traversal references a relation the parent model does not define
    UnknownRelation { relation: String, model: String },
    /// A hasMany relation marked sync-eligible (only singular relations cascade)
    UnsupportedRelationSync { relation: String, model: String },
    /// A manyMany relation without a join-collection name
    MissingThroughCollection { relation: String, model: String },
    /// A query that cannot be built or evaluated as requested
    InvalidQuery(String),
    /// Round-trip executor failure (connection, wire, server-side evaluation)
    Transport(String),
    /// A create/update inside a cascade failed; remaining steps were aborted
    CascadeStep {
        relation: String,
        source: Box<TideError>,
    },
    /// A row or write summary could not be decoded
    Decode(String),
    /// Configuration loading failure
    Config(String),
}

impl fmt::Display for TideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TideError::UnknownModel(name) => {
                write!(f, "model {name} is not registered")
            }
            TideError::DuplicateModel(name) => {
                write!(f, "model {name} is already registered")
            }
            TideError::UnknownRelation { relation, model } => {
                write!(f, "relationship {relation} is not defined in {model}")
            }
            TideError::UnsupportedRelationSync { relation, model } => {
                write!(
                    f,
                    "sync option doesn't support the hasMany relation {relation} in {model}"
                )
            }
            TideError::MissingThroughCollection { relation, model } => {
                write!(
                    f,
                    "collection name for 'through' option is not specified for {relation} in {model}"
                )
            }
            TideError::InvalidQuery(msg) => {
                write!(f, "Invalid query: {msg}")
            }
            TideError::Transport(msg) => {
                write!(f, "Transport error: {msg}")
            }
            TideError::CascadeStep { relation, source } => {
                write!(f, "Cascade aborted at relation {relation}: {source}")
            }
            TideError::Decode(msg) => {
                write!(f, "Decode error: {msg}")
            }
            TideError::Config(msg) => {
                write!(f, "Configuration error: {msg}")
            }
        }
    }
}

impl std::error::Error for TideError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TideError::CascadeStep { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Trait for executing composed query terms
///
/// One call is one round trip: the implementation acquires whatever scoped
/// resource it needs (a pooled connection, usually), evaluates the term, and
/// releases the resource on both success and failure paths. The core never
/// retries; retry policy belongs to the implementation.
///
/// Read terms evaluate to a document, an array of documents, a count, or
/// JSON null for an explicit absence. Write terms (`insert`, `update`,
/// `delete`) evaluate to a summary document decodable as [`WriteResult`].
///
/// # Examples
///
/// ```
/// use tidepool::{MemoryStore, Term, TideExecutor};
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// store.seed("courses", vec![json!({"id": "c1", "title": "Course1"})]);
///
/// let doc = store.run(&Term::table("courses").get(json!("c1"))).unwrap();
/// assert_eq!(doc["title"], "Course1");
/// ```
pub trait TideExecutor {
    /// Evaluate a composed term and return its result
    ///
    /// # Errors
    ///
    /// Returns `TideError::Transport` when the round trip itself fails, or
    /// `TideError::InvalidQuery` when the term cannot be evaluated.
    fn run(&self, query: &Term) -> Result<Datum, TideError>;
}

/// Summary document produced by a write term
///
/// Mirrors the shape the store reports for inserts, updates and deletes.
/// Fields absent from the summary decode to their zero values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteResult {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub replaced: u64,
    #[serde(default)]
    pub unchanged: u64,
    #[serde(default)]
    pub deleted: u64,
    /// Keys assigned to inserted documents that carried no primary key,
    /// in insertion order.
    #[serde(default)]
    pub generated_keys: Vec<String>,
    /// The written row, present when the write requested returned changes
    /// and affected exactly one document.
    #[serde(default)]
    pub new_val: Option<Datum>,
    #[serde(default)]
    pub old_val: Option<Datum>,
}

impl WriteResult {
    /// Decode a write summary from the raw datum an executor returned
    pub fn from_datum(datum: Datum) -> Result<Self, TideError> {
        serde_json::from_value(datum)
            .map_err(|e| TideError::Decode(format!("Failed to parse write summary: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tide_error_display() {
        let err = TideError::UnknownRelation {
            relation: "lectures".into(),
            model: "Course".into(),
        };
        assert!(err.to_string().contains("lectures"));
        assert!(err.to_string().contains("Course"));
    }

    #[test]
    fn test_tide_error_cascade_source() {
        use std::error::Error;
        let err = TideError::CascadeStep {
            relation: "privateLecture".into(),
            source: Box::new(TideError::Transport("connection reset".into())),
        };
        assert!(err.to_string().contains("privateLecture"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_write_result_defaults() {
        let summary = WriteResult::from_datum(json!({"inserted": 1})).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.replaced, 0);
        assert!(summary.generated_keys.is_empty());
        assert!(summary.new_val.is_none());
    }

    #[test]
    fn test_write_result_with_changes() {
        let summary = WriteResult::from_datum(json!({
            "inserted": 1,
            "generated_keys": ["a-b-c"],
            "new_val": {"id": "a-b-c", "title": "Lecture5"}
        }))
        .unwrap();
        assert_eq!(summary.generated_keys, vec!["a-b-c".to_string()]);
        assert_eq!(summary.new_val.unwrap()["title"], "Lecture5");
    }

    #[test]
    fn test_write_result_rejects_malformed_summary() {
        let err = WriteResult::from_datum(json!({"inserted": "one"}));
        assert!(matches!(err, Err(TideError::Decode(_))));
    }
}
