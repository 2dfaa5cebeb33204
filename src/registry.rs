//! Relation registry: model metadata and relation descriptors
//!
//! Models are declared once as explicit definition records and collected
//! into a [`Registry`] instance that the compiler and extractor read. The
//! registry is constructed at startup and treated as read-only thereafter;
//! there is no process-wide global, callers pass the instance (usually
//! behind an `Arc`) to whatever needs it.
//!
//! Re-registering a model name is a configuration error, not an override.

use crate::config::OrmDefaults;
use crate::executor::TideError;
use crate::hooks::Hooks;
use crate::term::Predicate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The three relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Parent holds the foreign key (or the related row is found by a
    /// filtered index scan when a filter is present); yields one row or null
    HasOne,
    /// Related rows hold the foreign key pointing back at the parent;
    /// yields an array
    HasMany,
    /// Resolved through a join collection holding both keys; yields an array
    ManyMany,
}

/// How the foreign key links parent and related rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    /// A single foreign-key field; which side holds it depends on the kind
    Key(String),
    /// The two foreign-key fields of a join collection row
    Pair {
        parent_key: String,
        related_key: String,
    },
}

/// Write-cascade eligibility of an embedded relation payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Embedded payloads are dropped from writes, never persisted
    #[default]
    Off,
    /// Embedded payloads cascade into the related collection
    Cascade,
    /// Accepted for read-shape purposes only, never cascaded
    ReadOnly,
}

/// The join collection realizing a many-to-many relation
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughSpec {
    pub collection: String,
    /// Default filter on join rows, overridable per traversal
    pub filter: Option<Predicate>,
}

impl ThroughSpec {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Static metadata describing how one model's rows relate to another's
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub kind: RelationKind,
    /// The related model name
    pub from: String,
    pub on: Linkage,
    pub through: Option<ThroughSpec>,
    /// Narrows which related rows qualify; on hasOne, a non-matching row
    /// makes the relation resolve to an explicit absence
    pub filter: Option<Predicate>,
    pub sync: SyncMode,
}

impl RelationDef {
    pub fn has_one(on: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasOne,
            from: from.into(),
            on: Linkage::Key(on.into()),
            through: None,
            filter: None,
            sync: SyncMode::Off,
        }
    }

    pub fn has_many(on: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            from: from.into(),
            on: Linkage::Key(on.into()),
            through: None,
            filter: None,
            sync: SyncMode::Off,
        }
    }

    /// Many-to-many; the join collection is supplied with [`Self::through`]
    pub fn many_many(
        parent_key: impl Into<String>,
        related_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::ManyMany,
            from: from.into(),
            on: Linkage::Pair {
                parent_key: parent_key.into(),
                related_key: related_key.into(),
            },
            through: None,
            filter: None,
            sync: SyncMode::Off,
        }
    }

    pub fn through(mut self, through: ThroughSpec) -> Self {
        self.through = Some(through);
        self
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }
}

/// One model's definition record
///
/// The collection name defaults to the pluralized, lower-cased model name
/// (`Course` → `courses`). Relations are keyed by the attribute they appear
/// under in query results and write bodies.
#[derive(Clone)]
pub struct ModelDef {
    pub model_name: String,
    pub collection_name: String,
    pub relations: BTreeMap<String, RelationDef>,
    /// `None` falls back to the registry's configured default at registration
    pub timestamps: Option<bool>,
    pub hooks: Option<Arc<dyn Hooks>>,
}

impl std::fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDef")
            .field("model_name", &self.model_name)
            .field("collection_name", &self.collection_name)
            .field("relations", &self.relations)
            .field("timestamps", &self.timestamps)
            .field("hooks", &if self.hooks.is_some() { "Some" } else { "None" })
            .finish()
    }
}

impl ModelDef {
    pub fn new(model_name: impl Into<String>) -> Self {
        let model_name = model_name.into();
        let collection_name = pluralize(&model_name);
        Self {
            model_name,
            collection_name,
            relations: BTreeMap::new(),
            timestamps: None,
            hooks: None,
        }
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn relation(mut self, attribute: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(attribute.into(), def);
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = Some(enabled);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

/// Default collection name: lower-cased first letter plus an `s`
fn pluralize(model_name: &str) -> String {
    let mut chars = model_name.chars();
    match chars.next() {
        Some(first) => format!("{}{}s", first.to_lowercase(), chars.as_str()),
        None => String::new(),
    }
}

/// Read-only mapping from model name to its definition
///
/// Built once at startup; every later compile and extraction reads it.
pub struct Registry {
    models: HashMap<String, ModelDef>,
    defaults: OrmDefaults,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_defaults(OrmDefaults::default())
    }

    pub fn with_defaults(defaults: OrmDefaults) -> Self {
        Self {
            models: HashMap::new(),
            defaults,
        }
    }

    /// Register a model definition
    ///
    /// # Errors
    ///
    /// Returns `TideError::DuplicateModel` when the name is already taken;
    /// there are no merge or override semantics.
    pub fn register(&mut self, mut def: ModelDef) -> Result<(), TideError> {
        if def.model_name.is_empty() {
            return Err(TideError::Config("model name cannot be empty".into()));
        }
        if self.models.contains_key(&def.model_name) {
            return Err(TideError::DuplicateModel(def.model_name));
        }
        if def.timestamps.is_none() {
            def.timestamps = Some(self.defaults.timestamps);
        }
        self.models.insert(def.model_name.clone(), def);
        Ok(())
    }

    pub fn model(&self, name: &str) -> Result<&ModelDef, TideError> {
        self.models
            .get(name)
            .ok_or_else(|| TideError::UnknownModel(name.to_string()))
    }

    /// The physical collection a model's rows live in
    pub fn collection(&self, model: &str) -> Result<&str, TideError> {
        Ok(self.model(model)?.collection_name.as_str())
    }

    /// Whether writes to a model stamp create/update times
    pub fn timestamps(&self, model: &str) -> Result<bool, TideError> {
        Ok(self.model(model)?.timestamps.unwrap_or(true))
    }

    /// Look up a relation by the attribute it appears under
    pub fn relation(&self, model: &str, attribute: &str) -> Result<&RelationDef, TideError> {
        self.model(model)?
            .relations
            .get(attribute)
            .ok_or_else(|| TideError::UnknownRelation {
                relation: attribute.to_string(),
                model: model.to_string(),
            })
    }
}
