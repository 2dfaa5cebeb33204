//! Relation extraction from write bodies
//!
//! A write body may embed related payloads under its relation attributes.
//! [`extract`] lifts every sync-eligible payload into a [`RelationSave`]
//! plan entry and strips all relation attributes from the body, so the
//! parent document is persisted without embedded relation data regardless
//! of sync mode.
//!
//! List bodies are batch inserts; extraction applies to single documents
//! only and returns an empty plan for lists.

use crate::executor::TideError;
use crate::registry::{Linkage, Registry, RelationKind, SyncMode};
use crate::term::{Datum, Predicate};
use crate::traversal::{TraversalSpec, With};

/// One relation payload lifted out of a write body
///
/// Consumed once by the cascade, then used to rebuild the traversal that
/// re-reads exactly what the write touched.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSave {
    pub attribute: String,
    pub parent_model: String,
    pub related_model: String,
    pub kind: RelationKind,
    pub on: Linkage,
    pub filter: Option<Predicate>,
    /// `None` marks a readOnly payload: acknowledged and re-read, never written
    pub payload: Option<Datum>,
    pub nested: Vec<RelationSave>,
}

impl RelationSave {
    /// The traversal that re-reads this save's relation attribute
    pub fn to_with(&self) -> With {
        let mut spec = TraversalSpec::new(self.attribute.clone()).parent(self.parent_model.clone());
        if !self.nested.is_empty() {
            spec = spec.with(with_from_saves(&self.nested));
        }
        With::Spec(spec)
    }
}

/// The traversal re-reading everything a save plan touched
pub fn with_from_saves(saves: &[RelationSave]) -> With {
    With::List(saves.iter().map(RelationSave::to_with).collect())
}

/// Lift sync-eligible relation payloads out of a write body
///
/// Every relation attribute is removed from `body`. An embedded payload
/// becomes a plan entry when its relation is sync-eligible; readOnly
/// relations yield an entry with no payload; `Off` relations are silently
/// dropped. Nested payloads are extracted depth-first against the related
/// model, so each embedded document is itself stripped before it is written.
///
/// # Errors
///
/// Fails with `UnsupportedRelationSync` before any I/O when a sync-eligible
/// payload is a list or belongs to a non-singular relation; only hasOne
/// relations cascade.
pub fn extract(
    registry: &Registry,
    model: &str,
    body: &mut Datum,
) -> Result<Vec<RelationSave>, TideError> {
    let def = registry.model(model)?;
    let Some(object) = body.as_object_mut() else {
        return Ok(Vec::new());
    };

    let mut saves = Vec::new();
    for (attribute, relation) in &def.relations {
        let embedded = object.remove(attribute);
        if relation.sync == SyncMode::Off {
            continue;
        }
        let Some(mut embedded) = embedded else {
            continue;
        };
        if embedded.is_null() {
            continue;
        }
        if embedded.is_array() || relation.kind != RelationKind::HasOne {
            return Err(TideError::UnsupportedRelationSync {
                relation: attribute.clone(),
                model: model.to_string(),
            });
        }

        let nested = extract(registry, &relation.from, &mut embedded)?;
        saves.push(RelationSave {
            attribute: attribute.clone(),
            parent_model: model.to_string(),
            related_model: relation.from.clone(),
            kind: relation.kind,
            on: relation.on.clone(),
            filter: relation.filter.clone(),
            payload: match relation.sync {
                SyncMode::ReadOnly => None,
                _ => Some(embedded),
            },
            nested,
        });
    }

    Ok(saves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ModelDef, Registry, RelationDef};
    use crate::tests_cfg::course_registry;
    use serde_json::json;

    #[test]
    fn test_strips_every_relation_attribute() {
        let registry = course_registry();
        let mut body = json!({
            "title": "Course3",
            "lectures": [{"title": "ignored"}],
            "privateLecture": {"title": "Lecture5", "private": true},
        });

        let saves = extract(&registry, "Course", &mut body).unwrap();
        assert_eq!(body, json!({"title": "Course3"}));
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].attribute, "privateLecture");
        assert_eq!(
            saves[0].payload,
            Some(json!({"title": "Lecture5", "private": true}))
        );
    }

    #[test]
    fn test_read_only_payload_yields_entry_without_data() {
        let registry = course_registry();
        let mut body = json!({
            "title": "Course3",
            "lecture4": {"title": "Lecture4 changed"},
        });

        let saves = extract(&registry, "Course", &mut body).unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].attribute, "lecture4");
        assert!(saves[0].payload.is_none());
        assert!(body.get("lecture4").is_none());
    }

    #[test]
    fn test_nested_payloads_extracted_depth_first() {
        let registry = course_registry();
        let mut body = json!({
            "title": "Course3",
            "lectureSpecial": {
                "title": "Lecture Special",
                "video": {"url": "dir/video5.mp4"},
            },
        });

        let saves = extract(&registry, "Course", &mut body).unwrap();
        assert_eq!(saves.len(), 1);
        // the embedded lecture itself is stripped of its own relations
        assert_eq!(
            saves[0].payload,
            Some(json!({"title": "Lecture Special"}))
        );
        assert_eq!(saves[0].nested.len(), 1);
        assert_eq!(saves[0].nested[0].attribute, "video");
        assert_eq!(
            saves[0].nested[0].payload,
            Some(json!({"url": "dir/video5.mp4"}))
        );
    }

    #[test]
    fn test_list_body_skips_extraction() {
        let registry = course_registry();
        let mut body = json!([{"title": "Course3"}, {"title": "Course4"}]);
        let saves = extract(&registry, "Course", &mut body).unwrap();
        assert!(saves.is_empty());
    }

    #[test]
    fn test_sync_eligible_many_relation_is_rejected() {
        let mut registry = Registry::new();
        registry.register(ModelDef::new("Lecture")).unwrap();
        registry
            .register(ModelDef::new("Course").relation(
                "lectures",
                RelationDef::has_many("courseId", "Lecture").sync(SyncMode::Cascade),
            ))
            .unwrap();

        let mut body = json!({"title": "Course3", "lectures": [{"title": "Lecture1"}]});
        let err = extract(&registry, "Course", &mut body);
        assert!(matches!(
            err,
            Err(TideError::UnsupportedRelationSync { relation, model })
                if relation == "lectures" && model == "Course"
        ));
    }

    #[test]
    fn test_with_from_saves_rebuilds_nested_traversal() {
        let registry = course_registry();
        let mut body = json!({
            "privateLecture": {"title": "Lecture5", "private": true},
            "lectureSpecial": {"title": "Lecture Special", "video": {"url": "u"}},
        });
        let saves = extract(&registry, "Course", &mut body).unwrap();
        let with = with_from_saves(&saves);

        let With::List(entries) = with else {
            panic!("expected a list directive");
        };
        assert_eq!(entries.len(), 2);
        let With::Spec(special) = &entries[0] else {
            panic!("expected a spec directive");
        };
        assert_eq!(special.related, "lectureSpecial");
        assert!(special.with.is_some());
    }
}
