//! # Tidepool
//!
//! Relation-aware ORM and query compiler for document-oriented data stores.
//!
//! Models and their relations (hasOne, hasMany, manyMany) are declared in a
//! [`Registry`]; reads compile a traversal directive into one composed
//! [`Term`] against the store's query algebra, and writes cascade embedded
//! relation payloads into ordered dependent writes. Round trips go through
//! the [`TideExecutor`] seam; [`MemoryStore`] is an embedded implementation
//! evaluating the full algebra.
//!
//! ```
//! use std::sync::Arc;
//! use tidepool::{Criteria, MemoryStore, ModelDef, Orm, QueryOptions, Registry, RelationDef};
//! use serde_json::json;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(ModelDef::new("Course")
//!         .relation("lectures", RelationDef::has_many("courseId", "Lecture")))
//!     .unwrap();
//! registry.register(ModelDef::new("Lecture")).unwrap();
//!
//! let store = MemoryStore::new();
//! store.seed("courses", vec![json!({"id": "c1", "title": "Course1"})]);
//! store.seed("lectures", vec![json!({"id": "l1", "courseId": "c1", "title": "Lecture1"})]);
//!
//! let orm = Orm::new(Arc::new(registry), store);
//! let course = orm.model("Course").unwrap()
//!     .find(&Criteria::key("c1"), &QueryOptions::default().with("lectures"))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(course["lectures"][0]["title"], "Lecture1");
//! ```

pub mod cascade;
pub mod compiler;
pub mod config;
pub mod executor;
pub mod extract;
pub mod hooks;
pub mod memory;
pub mod model;
pub mod registry;
pub mod term;
pub mod tests_cfg;
pub mod traversal;

pub use cascade::cascade;
pub use compiler::{compose, EvalContext, JoinKind, JoinSpec, OrderBy, ReadOptions};
pub use config::{OrmDefaults, StoreConfig};
pub use executor::{TideError, TideExecutor, WriteResult};
pub use extract::{extract, with_from_saves, RelationSave};
pub use hooks::{DefaultHooks, Hooks, WriteMode};
pub use memory::MemoryStore;
pub use model::{Criteria, ModelHandle, Orm, QueryOptions, WriteOptions};
pub use registry::{Linkage, ModelDef, Registry, RelationDef, RelationKind, SyncMode, ThroughSpec};
pub use term::{Datum, Direction, Predicate, Term};
pub use traversal::{normalize, ResolvedThrough, TraversalKind, TraversalNode, TraversalSpec, With};
