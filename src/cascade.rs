//! Cascading persistence engine
//!
//! Executes a relation-save plan against a parent document: for each entry,
//! create-or-update the related row, link it to the parent, then recurse
//! into the entry's own nested saves. Steps run strictly in plan order and
//! the first failure aborts the remaining steps. There is no rollback;
//! completed steps stay written.
//!
//! Linking direction depends on the relation shape. A filtered relation's
//! dependent row owns the foreign key, so the key is stamped onto the
//! payload and the parent row is never touched. An unfiltered relation is a
//! reference held by the parent, so the related row is written first and
//! the parent's foreign-key field is then updated to its key.

use crate::executor::{TideError, TideExecutor, WriteResult};
use crate::extract::RelationSave;
use crate::registry::{Linkage, Registry};
use crate::term::{Datum, Term};
use serde_json::{json, Map};

/// Run a relation-save plan under `parent`
///
/// Entries without a payload (readOnly relations) are skipped. A failing
/// step surfaces as `CascadeStep` naming the relation and wrapping the
/// underlying error; prior steps are not rolled back.
pub fn cascade(
    registry: &Registry,
    executor: &dyn TideExecutor,
    parent: &Datum,
    saves: &[RelationSave],
) -> Result<(), TideError> {
    for save in saves {
        let Some(payload) = &save.payload else {
            continue;
        };
        apply(registry, executor, parent, save, payload.clone()).map_err(|source| {
            TideError::CascadeStep {
                relation: save.attribute.clone(),
                source: Box::new(source),
            }
        })?;
    }
    Ok(())
}

fn apply(
    registry: &Registry,
    executor: &dyn TideExecutor,
    parent: &Datum,
    save: &RelationSave,
    mut payload: Datum,
) -> Result<(), TideError> {
    let collection = registry.collection(&save.related_model)?.to_string();
    let stamp = registry.timestamps(&save.related_model)?;
    let foreign_key = match &save.on {
        Linkage::Key(key) => key.clone(),
        Linkage::Pair { parent_key, .. } => parent_key.clone(),
    };

    if save.filter.is_some() {
        // The dependent owns the foreign key: stamp it and write the
        // dependent; the parent row is never touched.
        if let Some(object) = payload.as_object_mut() {
            object.insert(foreign_key, parent["id"].clone());
        }
        let written = save_or_create(executor, &collection, payload, stamp)?;
        log::debug!(
            "cascade {}: wrote dependent row into {collection}",
            save.attribute
        );
        cascade(registry, executor, &written, &save.nested)
    } else {
        // The parent holds the reference: write the related row first, then
        // point the parent's foreign-key field at its key.
        let written = save_or_create(executor, &collection, payload, stamp)?;
        let parent_collection = registry.collection(&save.parent_model)?;
        let mut patch = Map::new();
        patch.insert(foreign_key, written["id"].clone());
        executor.run(
            &Term::table(parent_collection)
                .get(parent["id"].clone())
                .update(Datum::Object(patch), false),
        )?;
        log::debug!(
            "cascade {}: relinked parent in {parent_collection}",
            save.attribute
        );
        cascade(registry, executor, &written, &save.nested)
    }
}

/// Update by primary key when the payload carries one, insert otherwise,
/// stamping the matching timestamp. Returns the written row.
fn save_or_create(
    executor: &dyn TideExecutor,
    collection: &str,
    mut data: Datum,
    stamp: bool,
) -> Result<Datum, TideError> {
    let id = data.get("id").cloned().filter(|key| !key.is_null());
    if stamp {
        if let Some(object) = data.as_object_mut() {
            let field = if id.is_some() { "updateTime" } else { "createTime" };
            object.insert(field.to_string(), json!(chrono::Utc::now().timestamp_millis()));
        }
    }

    let query = match &id {
        Some(id) => Term::table(collection).get(id.clone()).update(data.clone(), true),
        None => Term::table(collection).insert(vec![data.clone()], true),
    };
    let summary = WriteResult::from_datum(executor.run(&query)?)?;
    Ok(summary.new_val.unwrap_or(data))
}
