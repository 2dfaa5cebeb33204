//! Traversal spec normalization
//!
//! Callers describe which related data to include with a [`With`] directive:
//! a bare relation name, a full [`TraversalSpec`], or a list of either. The
//! normalizer canonicalizes the directive into ordered [`TraversalNode`]s,
//! resolving each against the [`Registry`] and validating existence before
//! any query is composed.
//!
//! Nested `with` entries are normalized recursively against the related
//! model, so `{related: "lectures", with: "course"}` resolves `course`
//! among `Lecture`'s relations.

use crate::compiler::OrderBy;
use crate::executor::TideError;
use crate::registry::{Linkage, Registry, RelationKind};
use crate::term::Predicate;

/// A caller-supplied read directive naming related data to include
#[derive(Debug, Clone, PartialEq)]
pub enum With {
    /// Shorthand for a spec with only `related` set
    Related(String),
    Spec(TraversalSpec),
    List(Vec<With>),
}

impl With {
    pub fn related(name: impl Into<String>) -> Self {
        With::Related(name.into())
    }
}

impl From<&str> for With {
    fn from(name: &str) -> Self {
        With::Related(name.to_string())
    }
}

impl From<TraversalSpec> for With {
    fn from(spec: TraversalSpec) -> Self {
        With::Spec(spec)
    }
}

impl From<Vec<With>> for With {
    fn from(list: Vec<With>) -> Self {
        With::List(list)
    }
}

/// One relation traversal, with optional shaping of the related result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraversalSpec {
    pub related: String,
    /// Model the relation is looked up on; defaults to the model being
    /// queried (or, nested, to the enclosing relation's target model)
    pub parent: Option<String>,
    /// Traversal-level filter; the relation's own filter takes precedence
    pub filter: Option<Predicate>,
    /// Filter on join-collection rows of a manyMany relation, overriding
    /// the through spec's default filter
    pub filter_through: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub fields: Option<Vec<String>>,
    pub with: Option<Box<With>>,
}

impl TraversalSpec {
    pub fn new(related: impl Into<String>) -> Self {
        Self {
            related: related.into(),
            ..Default::default()
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter_through(mut self, filter: Predicate) -> Self {
        self.filter_through = Some(filter);
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

    pub fn with(mut self, with: impl Into<With>) -> Self {
        self.with = Some(Box::new(with.into()));
        self
    }
}

/// The resolved join collection of a manyMany traversal
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedThrough {
    pub collection: String,
    pub filter: Option<Predicate>,
}

/// Relation kind of a resolved traversal node
///
/// The manyMany variant carries its join collection, so a normalized node
/// without one is unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalKind {
    HasOne,
    HasMany,
    ManyMany(ResolvedThrough),
}

/// A fully-resolved instruction to include one related entity or collection
///
/// Built by [`normalize`], consumed by the compiler, and discarded after the
/// compile; nothing here is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalNode {
    pub attribute: String,
    pub parent_model: String,
    pub kind: TraversalKind,
    pub related_model: String,
    pub related_collection: String,
    pub on: Linkage,
    pub filter: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub fields: Option<Vec<String>>,
    pub nested: Vec<TraversalNode>,
}

/// Canonicalize a `With` directive into ordered traversal nodes
///
/// # Errors
///
/// Fails fast, before any I/O, with `UnknownRelation` when a named relation
/// is absent from the parent model, `UnknownModel` when a relation points at
/// an unregistered model, and `MissingThroughCollection` when a manyMany
/// relation lacks a join collection.
pub fn normalize(
    registry: &Registry,
    parent_model: &str,
    with: &With,
) -> Result<Vec<TraversalNode>, TideError> {
    match with {
        With::Related(name) => {
            let spec = TraversalSpec::new(name.clone());
            Ok(vec![resolve(registry, parent_model, &spec)?])
        }
        With::Spec(spec) => Ok(vec![resolve(registry, parent_model, spec)?]),
        With::List(entries) => {
            let mut nodes = Vec::with_capacity(entries.len());
            for entry in entries {
                nodes.extend(normalize(registry, parent_model, entry)?);
            }
            Ok(nodes)
        }
    }
}

fn resolve(
    registry: &Registry,
    default_parent: &str,
    spec: &TraversalSpec,
) -> Result<TraversalNode, TideError> {
    let parent_model = spec.parent.as_deref().unwrap_or(default_parent);
    let relation = registry.relation(parent_model, &spec.related)?;
    let related_collection = registry.collection(&relation.from)?.to_string();

    let kind = match (relation.kind, &relation.through) {
        (RelationKind::ManyMany, Some(through)) if !through.collection.is_empty() => {
            TraversalKind::ManyMany(ResolvedThrough {
                collection: through.collection.clone(),
                // the traversal's filterThrough wins over the through spec's default
                filter: spec
                    .filter_through
                    .clone()
                    .or_else(|| through.filter.clone()),
            })
        }
        (RelationKind::ManyMany, _) => {
            return Err(TideError::MissingThroughCollection {
                relation: spec.related.clone(),
                model: parent_model.to_string(),
            });
        }
        (RelationKind::HasOne, _) => TraversalKind::HasOne,
        (RelationKind::HasMany, _) => TraversalKind::HasMany,
    };

    let nested = match &spec.with {
        Some(inner) => normalize(registry, &relation.from, inner)?,
        None => Vec::new(),
    };

    Ok(TraversalNode {
        attribute: spec.related.clone(),
        parent_model: parent_model.to_string(),
        kind,
        related_model: relation.from.clone(),
        related_collection,
        on: relation.on.clone(),
        // the relation's own filter takes precedence over the traversal's
        filter: relation.filter.clone().or_else(|| spec.filter.clone()),
        order_by: spec.order_by.clone(),
        limit: spec.limit,
        fields: spec.fields.clone(),
        nested,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::course_registry;
    use crate::term::Predicate;
    use serde_json::json;

    #[test]
    fn test_bare_name_normalizes_to_one_node() {
        let registry = course_registry();
        let nodes = normalize(&registry, "Course", &With::related("lectures")).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].attribute, "lectures");
        assert_eq!(nodes[0].kind, TraversalKind::HasMany);
        assert_eq!(nodes[0].related_collection, "lectures");
        assert_eq!(nodes[0].on, Linkage::Key("courseId".into()));
    }

    #[test]
    fn test_unknown_relation_fails_fast() {
        let registry = course_registry();
        let err = normalize(&registry, "Course", &With::related("teachers"));
        assert!(matches!(
            err,
            Err(TideError::UnknownRelation { relation, model })
                if relation == "teachers" && model == "Course"
        ));
    }

    #[test]
    fn test_nested_with_inherits_related_model_as_parent() {
        let registry = course_registry();
        let with = With::Spec(TraversalSpec::new("lectures").with("course"));
        let nodes = normalize(&registry, "Course", &with).unwrap();
        let nested = &nodes[0].nested;
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].parent_model, "Lecture");
        assert_eq!(nested[0].related_model, "Course");
    }

    #[test]
    fn test_list_preserves_order() {
        let registry = course_registry();
        let with = With::List(vec![
            With::Spec(TraversalSpec::new("lecture3").with("video")),
            With::related("lecture4"),
        ]);
        let nodes = normalize(&registry, "Course", &with).unwrap();
        assert_eq!(nodes[0].attribute, "lecture3");
        assert_eq!(nodes[1].attribute, "lecture4");
    }

    #[test]
    fn test_relation_filter_beats_traversal_filter() {
        let registry = course_registry();
        let with = With::Spec(
            TraversalSpec::new("lecture4")
                .filter(Predicate::fields([("title", json!("Other"))])),
        );
        let nodes = normalize(&registry, "Course", &with).unwrap();
        assert_eq!(
            nodes[0].filter,
            Some(Predicate::fields([("title", json!("Lecture4"))]))
        );
    }

    #[test]
    fn test_filter_through_overrides_through_default() {
        let registry = course_registry();
        let with = With::Spec(
            TraversalSpec::new("enrolledCourses")
                .parent("Student")
                .filter_through(Predicate::fields([("enrolled", json!(false))])),
        );
        let nodes = normalize(&registry, "Student", &with).unwrap();
        let TraversalKind::ManyMany(through) = &nodes[0].kind else {
            panic!("expected a manyMany node");
        };
        assert_eq!(through.collection, "courses_students");
        assert_eq!(
            through.filter,
            Some(Predicate::fields([("enrolled", json!(false))]))
        );
    }

    #[test]
    fn test_many_many_without_through_is_rejected() {
        use crate::config::OrmDefaults;
        use crate::registry::{ModelDef, Registry, RelationDef};

        let mut registry = Registry::with_defaults(OrmDefaults::default());
        registry.register(ModelDef::new("Student")).unwrap();
        registry
            .register(
                ModelDef::new("Course").relation(
                    "students",
                    RelationDef::many_many("courseId", "studentId", "Student"),
                ),
            )
            .unwrap();

        let err = normalize(&registry, "Course", &With::related("students"));
        assert!(matches!(
            err,
            Err(TideError::MissingThroughCollection { .. })
        ));
    }
}
