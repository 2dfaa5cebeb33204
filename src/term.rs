//! Query algebra terms
//!
//! The compiler emits values of [`Term`], a pure AST over the document
//! store's query primitives: key lookup, secondary-index scan, filter, joins,
//! map/merge, conditional branch, ordering, limiting and field projection.
//!
//! Terms perform no I/O. They are plain data, `Clone` and `PartialEq`, so a
//! composed query can be unit-tested synchronously by inspecting its shape
//! and handed to any [`crate::TideExecutor`] for the actual round trip.
//!
//! Predicates are declarative ([`Predicate`]) rather than closures, which
//! keeps compiled terms comparable and serializable to a wire protocol.

use serde_json::Map;

/// A document value. Documents, keys and write summaries are all JSON.
pub type Datum = serde_json::Value;

/// Sort direction for `orderBy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Declarative row predicate
///
/// Covers the two filter shapes callers hand to a relation: a key-value
/// match object, and a field-against-pattern match (the declarative form of
/// the original's function filters, e.g. "email matches this domain").
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every named field equals the given value
    Match(Map<String, Datum>),
    /// The named field is a string matching the regular expression
    Matches { field: String, pattern: String },
    /// Every named field is present and non-null
    HasFields(Vec<String>),
}

impl Predicate {
    /// Key-value match predicate from field/value pairs
    pub fn fields<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Datum)>,
        K: Into<String>,
    {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert(k.into(), v);
        }
        Predicate::Match(map)
    }

    /// Regex match predicate on a single field
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Matches {
            field: field.into(),
            pattern: pattern.into(),
        }
    }
}

/// A composed query term
///
/// Constructors mirror the store's own query language so a compiled term
/// reads like the query it produces:
///
/// ```
/// use tidepool::{Term, Predicate};
/// use serde_json::json;
///
/// let q = Term::table("lectures")
///     .get_all(json!("course-1").into(), "courseId")
///     .filter(Predicate::fields([("private", json!(true))]))
///     .nth(0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A whole collection
    Table(String),
    /// A literal value embedded in the query
    Datum(Datum),
    /// The current row inside a `map` body
    Row,
    /// Field access, possibly through a dotted path
    Field { source: Box<Term>, path: Vec<String> },
    /// Primary-key lookup; evaluates to the document or null
    Get { source: Box<Term>, key: Box<Term> },
    /// Secondary-index scan: all documents whose indexed field equals the key
    GetAll {
        source: Box<Term>,
        key: Box<Term>,
        index: String,
    },
    Filter {
        source: Box<Term>,
        predicate: Predicate,
    },
    /// Inner equi-join: pairs each row's field value with the target
    /// document holding it as primary key; rows without a match are dropped
    EqJoin {
        source: Box<Term>,
        field: String,
        target: Box<Term>,
    },
    /// Left outer join on a field-pair equality; unmatched rows keep their
    /// `left` half and carry no `right` field
    OuterJoin {
        source: Box<Term>,
        target: Box<Term>,
        left_field: String,
        right_field: String,
    },
    /// Per-row projection; `body` is evaluated with [`Term::Row`] bound
    Map { source: Box<Term>, body: Box<Term> },
    /// Merge computed fields onto a document
    Merge {
        source: Box<Term>,
        fields: Vec<(String, Term)>,
    },
    Branch {
        condition: Box<Term>,
        if_true: Box<Term>,
        if_false: Box<Term>,
    },
    /// True when the document carries all fields, non-null
    HasFields { source: Box<Term>, fields: Vec<String> },
    Count { source: Box<Term> },
    Gt { left: Box<Term>, right: Box<Term> },
    Nth { source: Box<Term>, index: usize },
    OrderBy {
        source: Box<Term>,
        path: Vec<String>,
        direction: Direction,
    },
    Limit { source: Box<Term>, count: u64 },
    /// Prune documents to exactly the named fields
    Pluck { source: Box<Term>, fields: Vec<String> },
    /// Force a deferred sequence into a concrete, finite array
    CoerceToArray { source: Box<Term> },
    Insert {
        source: Box<Term>,
        documents: Vec<Datum>,
        return_changes: bool,
    },
    Update {
        source: Box<Term>,
        patch: Datum,
        return_changes: bool,
    },
    Delete { source: Box<Term> },
}

impl Term {
    pub fn table(name: impl Into<String>) -> Term {
        Term::Table(name.into())
    }

    /// The current row of an enclosing `map`
    pub fn row() -> Term {
        Term::Row
    }

    pub fn null() -> Term {
        Term::Datum(Datum::Null)
    }

    /// Access a field of this document
    pub fn field(self, name: impl Into<String>) -> Term {
        Term::Field {
            source: Box::new(self),
            path: vec![name.into()],
        }
    }

    /// Access a dotted field path of this document
    pub fn field_path(self, path: Vec<String>) -> Term {
        Term::Field {
            source: Box::new(self),
            path,
        }
    }

    pub fn get(self, key: impl Into<Term>) -> Term {
        Term::Get {
            source: Box::new(self),
            key: Box::new(key.into()),
        }
    }

    pub fn get_all(self, key: Term, index: impl Into<String>) -> Term {
        Term::GetAll {
            source: Box::new(self),
            key: Box::new(key),
            index: index.into(),
        }
    }

    pub fn filter(self, predicate: Predicate) -> Term {
        Term::Filter {
            source: Box::new(self),
            predicate,
        }
    }

    pub fn eq_join(self, field: impl Into<String>, target: Term) -> Term {
        Term::EqJoin {
            source: Box::new(self),
            field: field.into(),
            target: Box::new(target),
        }
    }

    pub fn outer_join(
        self,
        target: Term,
        left_field: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Term {
        Term::OuterJoin {
            source: Box::new(self),
            target: Box::new(target),
            left_field: left_field.into(),
            right_field: right_field.into(),
        }
    }

    pub fn map(self, body: Term) -> Term {
        Term::Map {
            source: Box::new(self),
            body: Box::new(body),
        }
    }

    pub fn merge(self, fields: Vec<(String, Term)>) -> Term {
        Term::Merge {
            source: Box::new(self),
            fields,
        }
    }

    pub fn branch(condition: Term, if_true: Term, if_false: Term) -> Term {
        Term::Branch {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn has_fields(self, fields: Vec<String>) -> Term {
        Term::HasFields {
            source: Box::new(self),
            fields,
        }
    }

    pub fn count(self) -> Term {
        Term::Count {
            source: Box::new(self),
        }
    }

    pub fn gt(self, right: impl Into<Term>) -> Term {
        Term::Gt {
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    pub fn nth(self, index: usize) -> Term {
        Term::Nth {
            source: Box::new(self),
            index,
        }
    }

    pub fn order_by(self, path: Vec<String>, direction: Direction) -> Term {
        Term::OrderBy {
            source: Box::new(self),
            path,
            direction,
        }
    }

    pub fn limit(self, count: u64) -> Term {
        Term::Limit {
            source: Box::new(self),
            count,
        }
    }

    pub fn pluck(self, fields: Vec<String>) -> Term {
        Term::Pluck {
            source: Box::new(self),
            fields,
        }
    }

    pub fn coerce_to_array(self) -> Term {
        Term::CoerceToArray {
            source: Box::new(self),
        }
    }

    pub fn insert(self, documents: Vec<Datum>, return_changes: bool) -> Term {
        Term::Insert {
            source: Box::new(self),
            documents,
            return_changes,
        }
    }

    pub fn update(self, patch: Datum, return_changes: bool) -> Term {
        Term::Update {
            source: Box::new(self),
            patch,
            return_changes,
        }
    }

    pub fn delete(self) -> Term {
        Term::Delete {
            source: Box::new(self),
        }
    }
}

impl From<Datum> for Term {
    fn from(value: Datum) -> Self {
        Term::Datum(value)
    }
}

impl From<u64> for Term {
    fn from(value: u64) -> Self {
        Term::Datum(Datum::from(value))
    }
}
