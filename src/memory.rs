//! In-memory document store
//!
//! [`MemoryStore`] implements [`TideExecutor`] by evaluating the full term
//! algebra against `Vec`-backed collections behind a mutex. It exists so
//! compiled queries and the cascade can be exercised end to end without a
//! running server; the test suite and doc examples run against it.
//!
//! Semantics follow the real store where it matters to the compiler: `get`
//! resolves by the `id` field, `getAll` treats the index name as a plain
//! field, `outerJoin` keeps unmatched left rows without a `right` field,
//! `nth` on an out-of-range index is an error, and inserts assign v4 UUID
//! string keys to documents that carry none.

use crate::executor::{TideError, TideExecutor};
use crate::term::{Datum, Direction, Predicate, Term};
use regex::Regex;
use serde_json::{json, Map};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

type Tables = BTreeMap<String, Vec<Datum>>;

/// A mutex-guarded set of named collections evaluating the query algebra
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace a collection's contents
    pub fn seed(&self, collection: impl Into<String>, rows: Vec<Datum>) {
        self.lock().insert(collection.into(), rows);
    }

    /// Snapshot a collection's rows
    pub fn dump(&self, collection: &str) -> Vec<Datum> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }
}

impl TideExecutor for MemoryStore {
    fn run(&self, query: &Term) -> Result<Datum, TideError> {
        let mut tables = self.lock();
        match query {
            Term::Insert {
                source,
                documents,
                return_changes,
            } => insert(&mut tables, source, documents, *return_changes),
            Term::Update {
                source,
                patch,
                return_changes,
            } => update(&mut tables, source, patch, *return_changes),
            Term::Delete { source } => delete(&mut tables, source),
            read => eval(&tables, read, None),
        }
    }
}

/// The table a write selection is rooted at
fn root_table(term: &Term) -> Result<&str, TideError> {
    match term {
        Term::Table(name) => Ok(name),
        Term::Get { source, .. }
        | Term::GetAll { source, .. }
        | Term::Filter { source, .. }
        | Term::OrderBy { source, .. }
        | Term::Limit { source, .. } => root_table(source),
        _ => Err(TideError::InvalidQuery(
            "write terms apply to a table selection".to_string(),
        )),
    }
}

fn insert(
    tables: &mut Tables,
    source: &Term,
    documents: &[Datum],
    return_changes: bool,
) -> Result<Datum, TideError> {
    let table = root_table(source)?.to_string();
    let rows = tables.entry(table).or_default();

    let mut generated = Vec::new();
    let mut last = Datum::Null;
    for document in documents {
        let mut document = document.clone();
        if document.get("id").map_or(true, Datum::is_null) {
            let key = Uuid::new_v4().to_string();
            if let Some(object) = document.as_object_mut() {
                object.insert("id".to_string(), json!(key));
            }
            generated.push(key);
        }
        last = document.clone();
        rows.push(document);
    }

    let mut summary = json!({
        "inserted": documents.len(),
        "generated_keys": generated,
    });
    if return_changes && documents.len() == 1 {
        summary["new_val"] = last;
    }
    Ok(summary)
}

fn update(
    tables: &mut Tables,
    source: &Term,
    patch: &Datum,
    return_changes: bool,
) -> Result<Datum, TideError> {
    let table = root_table(source)?.to_string();
    let targets = match eval(tables, source, None)? {
        Datum::Null => Vec::new(),
        Datum::Array(rows) => rows,
        doc => vec![doc],
    };

    let rows = tables.entry(table).or_default();
    let mut replaced = 0u64;
    let mut unchanged = 0u64;
    let mut new_val = Datum::Null;
    let mut old_val = Datum::Null;

    for target in &targets {
        let Some(id) = target.get("id") else { continue };
        let Some(row) = rows.iter_mut().find(|row| row.get("id") == Some(id)) else {
            continue;
        };
        let before = row.clone();
        if let (Some(object), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (name, value) in fields {
                object.insert(name.clone(), value.clone());
            }
        }
        if *row == before {
            unchanged += 1;
        } else {
            replaced += 1;
        }
        old_val = before;
        new_val = row.clone();
    }

    let mut summary = json!({"replaced": replaced, "unchanged": unchanged});
    if return_changes && targets.len() == 1 {
        summary["new_val"] = new_val;
        summary["old_val"] = old_val;
    }
    Ok(summary)
}

fn delete(tables: &mut Tables, source: &Term) -> Result<Datum, TideError> {
    let table = root_table(source)?.to_string();
    let targets = match eval(tables, source, None)? {
        Datum::Null => Vec::new(),
        Datum::Array(rows) => rows,
        doc => vec![doc],
    };

    let rows = tables.entry(table).or_default();
    let before = rows.len();
    rows.retain(|row| {
        !targets
            .iter()
            .any(|target| target.get("id").is_some() && target.get("id") == row.get("id"))
    });
    Ok(json!({"deleted": (before - rows.len()) as u64}))
}

fn eval(tables: &Tables, term: &Term, row: Option<&Datum>) -> Result<Datum, TideError> {
    match term {
        Term::Table(name) => Ok(Datum::Array(tables.get(name).cloned().unwrap_or_default())),
        Term::Datum(value) => Ok(value.clone()),
        Term::Row => row.cloned().ok_or_else(|| {
            TideError::InvalidQuery("row reference outside of a map body".to_string())
        }),
        Term::Field { source, path } => {
            let value = eval(tables, source, row)?;
            Ok(lookup_path(&value, path))
        }
        Term::Get { source, key } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let key = eval(tables, key, row)?;
            if key.is_null() {
                return Ok(Datum::Null);
            }
            Ok(rows
                .into_iter()
                .find(|doc| doc.get("id") == Some(&key))
                .unwrap_or(Datum::Null))
        }
        Term::GetAll { source, key, index } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let key = eval(tables, key, row)?;
            if key.is_null() {
                return Ok(json!([]));
            }
            Ok(Datum::Array(
                rows.into_iter()
                    .filter(|doc| doc.get(index.as_str()) == Some(&key))
                    .collect(),
            ))
        }
        Term::Filter { source, predicate } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let mut kept = Vec::new();
            for doc in rows {
                if matches(predicate, &doc)? {
                    kept.push(doc);
                }
            }
            Ok(Datum::Array(kept))
        }
        Term::EqJoin {
            source,
            field,
            target,
        } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let targets = sequence(eval(tables, target, row)?)?;
            let mut joined = Vec::new();
            for left in rows {
                let Some(key) = left.get(field.as_str()).filter(|key| !key.is_null()) else {
                    continue;
                };
                if let Some(right) = targets.iter().find(|doc| doc.get("id") == Some(key)) {
                    joined.push(json!({"left": left, "right": right}));
                }
            }
            Ok(Datum::Array(joined))
        }
        Term::OuterJoin {
            source,
            target,
            left_field,
            right_field,
        } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let targets = sequence(eval(tables, target, row)?)?;
            let mut joined = Vec::new();
            for left in rows {
                let key = left.get(left_field.as_str()).filter(|key| !key.is_null());
                let matched: Vec<&Datum> = targets
                    .iter()
                    .filter(|doc| key.is_some() && doc.get(right_field.as_str()) == key)
                    .collect();
                if matched.is_empty() {
                    joined.push(json!({"left": left}));
                } else {
                    for right in matched {
                        joined.push(json!({"left": left, "right": right}));
                    }
                }
            }
            Ok(Datum::Array(joined))
        }
        Term::Map { source, body } => {
            let rows = sequence(eval(tables, source, row)?)?;
            let mut mapped = Vec::with_capacity(rows.len());
            for doc in rows {
                mapped.push(eval(tables, body, Some(&doc))?);
            }
            Ok(Datum::Array(mapped))
        }
        Term::Merge { source, fields } => match eval(tables, source, row)? {
            Datum::Null => Ok(Datum::Null),
            Datum::Object(mut object) => {
                for (name, term) in fields {
                    let value = eval(tables, term, row)?;
                    object.insert(name.clone(), value);
                }
                Ok(Datum::Object(object))
            }
            other => Err(TideError::InvalidQuery(format!(
                "cannot merge fields onto {other}"
            ))),
        },
        Term::Branch {
            condition,
            if_true,
            if_false,
        } => {
            let condition = eval(tables, condition, row)?;
            if truthy(&condition) {
                eval(tables, if_true, row)
            } else {
                eval(tables, if_false, row)
            }
        }
        Term::HasFields { source, fields } => {
            let value = eval(tables, source, row)?;
            Ok(json!(fields
                .iter()
                .all(|field| value.get(field).map_or(false, |v| !v.is_null()))))
        }
        Term::Count { source } => Ok(json!(sequence(eval(tables, source, row)?)?.len())),
        Term::Gt { left, right } => {
            let left = eval(tables, left, row)?;
            let right = eval(tables, right, row)?;
            Ok(json!(compare(&left, &right) == Ordering::Greater))
        }
        Term::Nth { source, index } => sequence(eval(tables, source, row)?)?
            .into_iter()
            .nth(*index)
            .ok_or_else(|| TideError::InvalidQuery(format!("index {index} out of bounds"))),
        Term::OrderBy {
            source,
            path,
            direction,
        } => {
            let mut rows = sequence(eval(tables, source, row)?)?;
            rows.sort_by(|a, b| {
                let ordering = compare(&lookup_path(a, path), &lookup_path(b, path));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
            Ok(Datum::Array(rows))
        }
        Term::Limit { source, count } => {
            let mut rows = sequence(eval(tables, source, row)?)?;
            rows.truncate(*count as usize);
            Ok(Datum::Array(rows))
        }
        Term::Pluck { source, fields } => match eval(tables, source, row)? {
            Datum::Array(rows) => Ok(Datum::Array(
                rows.iter().map(|doc| pluck(doc, fields)).collect(),
            )),
            doc => Ok(pluck(&doc, fields)),
        },
        Term::CoerceToArray { source } => {
            Ok(Datum::Array(sequence(eval(tables, source, row)?)?))
        }
        Term::Insert { .. } | Term::Update { .. } | Term::Delete { .. } => Err(
            TideError::InvalidQuery("write term nested inside a read".to_string()),
        ),
    }
}

fn sequence(value: Datum) -> Result<Vec<Datum>, TideError> {
    match value {
        Datum::Array(rows) => Ok(rows),
        other => Err(TideError::InvalidQuery(format!(
            "expected a sequence, got {other}"
        ))),
    }
}

fn lookup_path(value: &Datum, path: &[String]) -> Datum {
    let mut current = value;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Datum::Null,
        }
    }
    current.clone()
}

fn pluck(doc: &Datum, fields: &[String]) -> Datum {
    match doc.as_object() {
        Some(object) => {
            let mut kept = Map::new();
            for field in fields {
                if let Some(value) = object.get(field) {
                    kept.insert(field.clone(), value.clone());
                }
            }
            Datum::Object(kept)
        }
        None => doc.clone(),
    }
}

fn truthy(value: &Datum) -> bool {
    !matches!(value, Datum::Null | Datum::Bool(false))
}

fn compare(a: &Datum, b: &Datum) -> Ordering {
    match (a, b) {
        (Datum::Number(x), Datum::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Datum::String(x), Datum::String(y)) => x.cmp(y),
        (Datum::Bool(x), Datum::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn matches(predicate: &Predicate, doc: &Datum) -> Result<bool, TideError> {
    match predicate {
        Predicate::Match(fields) => Ok(fields
            .iter()
            .all(|(name, value)| doc.get(name) == Some(value))),
        Predicate::Matches { field, pattern } => {
            let regex = Regex::new(pattern)
                .map_err(|e| TideError::InvalidQuery(format!("bad match pattern: {e}")))?;
            Ok(doc
                .get(field)
                .and_then(Datum::as_str)
                .map_or(false, |text| regex.is_match(text)))
        }
        Predicate::HasFields(fields) => Ok(fields
            .iter()
            .all(|field| doc.get(field).map_or(false, |v| !v.is_null()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            "lectures",
            vec![
                json!({"id": "l1", "title": "Lecture1", "courseId": "c1"}),
                json!({"id": "l2", "title": "Lecture2", "courseId": "c1"}),
                json!({"id": "l3", "title": "Lecture3", "courseId": "c2"}),
            ],
        );
        store
    }

    #[test]
    fn test_get_resolves_by_id_or_null() {
        let store = store();
        let doc = store.run(&Term::table("lectures").get(json!("l2"))).unwrap();
        assert_eq!(doc["title"], "Lecture2");
        let missing = store.run(&Term::table("lectures").get(json!("zz"))).unwrap();
        assert!(missing.is_null());
    }

    #[test]
    fn test_get_all_scans_by_field() {
        let store = store();
        let rows = store
            .run(&Term::table("lectures").get_all(json!("c1").into(), "courseId"))
            .unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_insert_assigns_generated_keys() {
        let store = store();
        let summary = store
            .run(&Term::table("lectures").insert(
                vec![json!({"title": "Lecture4"}), json!({"id": "l5", "title": "Lecture5"})],
                false,
            ))
            .unwrap();
        assert_eq!(summary["inserted"], 2);
        assert_eq!(summary["generated_keys"].as_array().unwrap().len(), 1);
        assert_eq!(store.dump("lectures").len(), 5);
    }

    #[test]
    fn test_update_reports_replaced_and_changes() {
        let store = store();
        let summary = store
            .run(
                &Term::table("lectures")
                    .get(json!("l1"))
                    .update(json!({"title": "Renamed"}), true),
            )
            .unwrap();
        assert_eq!(summary["replaced"], 1);
        assert_eq!(summary["new_val"]["title"], "Renamed");
        assert_eq!(summary["old_val"]["title"], "Lecture1");
    }

    #[test]
    fn test_update_same_value_counts_unchanged() {
        let store = store();
        let summary = store
            .run(
                &Term::table("lectures")
                    .get(json!("l1"))
                    .update(json!({"title": "Lecture1"}), false),
            )
            .unwrap();
        assert_eq!(summary["unchanged"], 1);
        assert_eq!(summary["replaced"], 0);
    }

    #[test]
    fn test_delete_by_selection() {
        let store = store();
        let summary = store
            .run(
                &Term::table("lectures")
                    .filter(Predicate::fields([("courseId", json!("c1"))]))
                    .delete(),
            )
            .unwrap();
        assert_eq!(summary["deleted"], 2);
        assert_eq!(store.dump("lectures").len(), 1);
    }

    #[test]
    fn test_outer_join_keeps_unmatched_left_rows() {
        let store = store();
        store.seed(
            "links",
            vec![
                json!({"id": "x1", "lectureId": "l1"}),
                json!({"id": "x2", "lectureId": "gone"}),
            ],
        );
        let rows = store
            .run(
                &Term::table("links")
                    .outer_join(Term::table("lectures"), "lectureId", "id"),
            )
            .unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("right").is_some());
        assert!(rows[1].get("right").is_none());
    }

    #[test]
    fn test_order_by_desc_and_limit() {
        let store = store();
        let rows = store
            .run(
                &Term::table("lectures")
                    .order_by(vec!["title".to_string()], Direction::Desc)
                    .limit(2),
            )
            .unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows[0]["title"], "Lecture3");
        assert_eq!(rows[1]["title"], "Lecture2");
    }

    #[test]
    fn test_regex_predicate() {
        let store = MemoryStore::new();
        store.seed(
            "students",
            vec![
                json!({"id": "s1", "email": "student1@inst1.edu"}),
                json!({"id": "s2", "email": "student2@inst2.edu"}),
            ],
        );
        let rows = store
            .run(&Term::table("students").filter(Predicate::matches("email", "inst1\\.edu")))
            .unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_nth_out_of_range_is_an_error() {
        let store = store();
        let err = store.run(&Term::table("lectures").nth(9));
        assert!(matches!(err, Err(TideError::InvalidQuery(_))));
    }
}
