//! Model operations
//!
//! [`Orm`] ties a [`Registry`] to a [`TideExecutor`] and hands out
//! [`ModelHandle`]s. All operations are generic over the handle: `find`,
//! `find_all`, `create`, `update`, `delete` and `exists` take explicit
//! [`Criteria`] instead of synthesized per-model method names.
//!
//! Writes run the lifecycle in a fixed order: timestamp stamping, hooks
//! (`validate`, `before_*`), relation extraction, the physical write, the
//! cascade, a re-read of everything the cascade touched, and the matching
//! `after_*` hook. Any `before_*` hook returning `false` resolves the whole
//! operation to `None` without touching the store.

use crate::cascade::cascade;
use crate::compiler::{compose, EvalContext, JoinSpec, OrderBy, ReadOptions};
use crate::executor::{TideError, TideExecutor, WriteResult};
use crate::extract::{extract, with_from_saves, RelationSave};
use crate::hooks::{DefaultHooks, Hooks, WriteMode};
use crate::registry::Registry;
use crate::term::{Datum, Predicate, Term};
use crate::traversal::{normalize, With};
use serde_json::json;
use std::sync::Arc;

/// How the target rows of an operation are selected
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Every row of the model's collection
    All,
    /// One row by primary key; the only criteria evaluated in single context
    Key(Datum),
    /// Rows matching a predicate
    Match(Predicate),
    /// Rows whose secondary index equals a value
    Index { key: Datum, index: String },
}

impl Criteria {
    /// Primary-key criteria from a string key
    pub fn key(value: impl Into<String>) -> Self {
        Criteria::Key(Datum::String(value.into()))
    }
}

/// Read shaping accepted by `find`/`find_all`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub with: Option<With>,
    /// Ad-hoc joins, applied before any relation traversal
    pub join: Vec<JoinSpec>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub fields: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn with(mut self, with: impl Into<With>) -> Self {
        self.with = Some(with.into());
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.join.push(join);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Write behavior toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Run the `validate` hook before writing
    pub validate: bool,
    /// Ask the store for the written row; with non-key criteria this
    /// narrows an update to the first match ordered by primary key
    pub return_changes: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            validate: true,
            return_changes: true,
        }
    }
}

/// A registry bound to a round-trip executor
pub struct Orm<E> {
    registry: Arc<Registry>,
    executor: E,
}

impl<E: TideExecutor> Orm<E> {
    pub fn new(registry: Arc<Registry>, executor: E) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Handle for one registered model
    ///
    /// # Errors
    ///
    /// `UnknownModel` when the name was never registered.
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_, E>, TideError> {
        self.registry.model(name)?;
        Ok(ModelHandle {
            orm: self,
            model: name.to_string(),
        })
    }
}

/// One model's operations, borrowed from the [`Orm`]
pub struct ModelHandle<'a, E> {
    orm: &'a Orm<E>,
    model: String,
}

impl<'a, E: TideExecutor> ModelHandle<'a, E> {
    fn registry(&self) -> &Registry {
        &self.orm.registry
    }

    fn hooks(&self) -> Result<Arc<dyn Hooks>, TideError> {
        Ok(self
            .registry()
            .model(&self.model)?
            .hooks
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultHooks)))
    }

    fn timestamps(&self) -> Result<bool, TideError> {
        self.registry().timestamps(&self.model)
    }

    /// Compile criteria and read options into one composed query
    ///
    /// Key criteria evaluate in single context; everything else denotes a
    /// row set and evaluates in multi context.
    pub fn build_query(
        &self,
        criteria: &Criteria,
        opts: &QueryOptions,
    ) -> Result<(Term, EvalContext), TideError> {
        let table = Term::table(self.registry().collection(&self.model)?);
        let (base, ctx) = match criteria {
            Criteria::All => (table, EvalContext::Multi),
            Criteria::Key(key) => (table.get(key.clone()), EvalContext::Single),
            Criteria::Match(predicate) => (table.filter(predicate.clone()), EvalContext::Multi),
            Criteria::Index { key, index } => (
                table.get_all(key.clone().into(), index.clone()),
                EvalContext::Multi,
            ),
        };

        let with = match &opts.with {
            Some(with) => normalize(self.registry(), &self.model, with)?,
            None => Vec::new(),
        };
        let read = ReadOptions {
            with,
            join: opts.join.clone(),
            order_by: opts.order_by.clone(),
            limit: opts.limit,
            fields: opts.fields.clone(),
        };
        log::debug!(
            "compiled {:?}-context query for {} ({} traversals)",
            ctx,
            self.model,
            read.with.len()
        );
        Ok((compose(base, &read, ctx), ctx))
    }

    /// One document, or `None` when nothing matches
    ///
    /// Non-key criteria resolve to the first matching row.
    pub fn find(
        &self,
        criteria: &Criteria,
        opts: &QueryOptions,
    ) -> Result<Option<Datum>, TideError> {
        if matches!(criteria, Criteria::All) {
            return Err(TideError::InvalidQuery(
                "criteria for a single lookup cannot be empty".to_string(),
            ));
        }
        let (query, _) = self.build_query(criteria, opts)?;
        Ok(first_document(self.orm.executor.run(&query)?))
    }

    /// Every matching document
    pub fn find_all(
        &self,
        criteria: &Criteria,
        opts: &QueryOptions,
    ) -> Result<Vec<Datum>, TideError> {
        let (query, _) = self.build_query(criteria, opts)?;
        Ok(match self.orm.executor.run(&query)? {
            Datum::Array(rows) => rows,
            Datum::Null => Vec::new(),
            doc => vec![doc],
        })
    }

    /// Insert one document or a list of documents
    ///
    /// Single bodies go through the full lifecycle: hooks, relation
    /// extraction, cascade and a re-read returning the materialized result.
    /// List bodies are one batch insert; generated keys are assigned back
    /// positionally and no cascade runs.
    pub fn create(&self, body: Datum, opts: &WriteOptions) -> Result<Option<Datum>, TideError> {
        let mut body = body;
        let hooks = self.hooks()?;

        if self.timestamps()? {
            let now = json!(chrono::Utc::now().timestamp_millis());
            match &mut body {
                Datum::Array(items) => {
                    for item in items {
                        if let Some(object) = item.as_object_mut() {
                            object.insert("createTime".to_string(), now.clone());
                        }
                    }
                }
                item => {
                    if let Some(object) = item.as_object_mut() {
                        object.insert("createTime".to_string(), now.clone());
                    }
                }
            }
        }

        if opts.validate && !hooks.validate(&body, WriteMode::Create)? {
            return Ok(None);
        }
        if !hooks.before_create(&mut body)? {
            return Ok(None);
        }
        if !hooks.before_save(&mut body)? {
            return Ok(None);
        }

        let saves = extract(self.registry(), &self.model, &mut body)?;
        let is_batch = body.is_array();
        let return_changes = !is_batch && opts.return_changes;
        let documents = match body.clone() {
            Datum::Array(items) => items,
            doc => vec![doc],
        };

        let collection = self.registry().collection(&self.model)?;
        let summary = WriteResult::from_datum(
            self.orm
                .executor
                .run(&Term::table(collection).insert(documents, return_changes))?,
        )?;

        let mut saved = body;
        if is_batch {
            if let Datum::Array(items) = &mut saved {
                let mut keys = summary.generated_keys.iter();
                for item in items {
                    if let Some(object) = item.as_object_mut() {
                        if !object.contains_key("id") {
                            if let Some(key) = keys.next() {
                                object.insert("id".to_string(), json!(key));
                            }
                        }
                    }
                }
            }
        } else if return_changes {
            if let Some(new_val) = summary.new_val {
                saved = new_val;
            }
        }

        cascade(self.registry(), &self.orm.executor, &saved, &saves)?;
        let saved = self.reread(saved, &saves)?;
        hooks.after_create(saved).map(Some)
    }

    /// Merge a patch into matching rows
    ///
    /// Key criteria update that row. Non-key criteria with
    /// `return_changes` update only the first match ordered by primary key,
    /// so the returned row is unambiguous; without `return_changes` every
    /// match is updated and the patch itself is echoed back.
    pub fn update(
        &self,
        patch: Datum,
        criteria: &Criteria,
        opts: &WriteOptions,
    ) -> Result<Option<Datum>, TideError> {
        let mut patch = patch;
        let hooks = self.hooks()?;

        if self.timestamps()? {
            if let Some(object) = patch.as_object_mut() {
                object.insert(
                    "updateTime".to_string(),
                    json!(chrono::Utc::now().timestamp_millis()),
                );
            }
        }

        if opts.validate && !hooks.validate(&patch, WriteMode::Update)? {
            return Ok(None);
        }
        if !hooks.before_update(&mut patch)? {
            return Ok(None);
        }
        if !hooks.before_save(&mut patch)? {
            return Ok(None);
        }

        let saves = extract(self.registry(), &self.model, &mut patch)?;

        let query = match criteria {
            Criteria::Key(key) => {
                let collection = self.registry().collection(&self.model)?;
                Term::table(collection)
                    .get(key.clone())
                    .update(patch.clone(), opts.return_changes)
            }
            _ if opts.return_changes => {
                let narrowed = QueryOptions::default().order_by(OrderBy::asc("id")).limit(1);
                let (base, _) = self.build_query(criteria, &narrowed)?;
                base.update(patch.clone(), true)
            }
            _ => {
                let (base, _) = self.build_query(criteria, &QueryOptions::default())?;
                base.update(patch.clone(), false)
            }
        };

        let summary = WriteResult::from_datum(self.orm.executor.run(&query)?)?;
        let updated = if opts.return_changes {
            summary.new_val.clone()
        } else if summary.replaced + summary.unchanged > 0 {
            Some(patch)
        } else {
            None
        };
        let Some(updated) = updated else {
            return Ok(None);
        };

        cascade(self.registry(), &self.orm.executor, &updated, &saves)?;
        let updated = self.reread(updated, &saves)?;
        hooks.after_update(updated, summary.old_val).map(Some)
    }

    /// Delete matching rows, returning the write summary
    pub fn delete(&self, criteria: &Criteria) -> Result<WriteResult, TideError> {
        let (query, _) = self.build_query(criteria, &QueryOptions::default())?;
        WriteResult::from_datum(self.orm.executor.run(&query.delete())?)
    }

    /// Whether any row matches the criteria
    pub fn exists(&self, criteria: &Criteria) -> Result<bool, TideError> {
        if let Criteria::Key(key) = criteria {
            let collection = self.registry().collection(&self.model)?;
            let doc = self.orm.executor.run(&Term::table(collection).get(key.clone()))?;
            return Ok(!doc.is_null());
        }
        let (query, _) = self.build_query(criteria, &QueryOptions::default())?;
        let count = self.orm.executor.run(&query.count())?;
        Ok(count.as_u64().unwrap_or(0) > 0)
    }

    /// Re-read the written row with the traversal the save plan implies,
    /// so the caller sees materialized relation values, not its own input
    fn reread(&self, saved: Datum, saves: &[RelationSave]) -> Result<Datum, TideError> {
        if saves.is_empty() {
            return Ok(saved);
        }
        let Some(id) = saved.get("id").cloned().filter(|key| !key.is_null()) else {
            return Ok(saved);
        };
        let opts = QueryOptions::default().with(with_from_saves(saves));
        let (query, _) = self.build_query(&Criteria::Key(id), &opts)?;
        self.orm.executor.run(&query)
    }
}

fn first_document(result: Datum) -> Option<Datum> {
    match result {
        Datum::Null => None,
        Datum::Array(rows) => rows.into_iter().next(),
        doc => Some(doc),
    }
}
