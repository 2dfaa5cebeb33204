//! Relation-aware query compiler
//!
//! Compiles an ordered list of [`TraversalNode`]s plus an evaluation context
//! into one composed [`Term`] against the query algebra. The context is an
//! explicit tagged variant ([`EvalContext`]): `Single` when the base query
//! denotes exactly one known row, `Multi` when it denotes a row set. The
//! same relation compiles to structurally different terms in the two
//! contexts, and relation kind × context forms the six dispatch cases below.
//!
//! Compilation is pure: it only composes primitives, performs no I/O and
//! touches no shared state, so composing the same traversal twice yields
//! structurally equal terms.

use crate::term::{Direction, Predicate, Term};
use crate::traversal::{TraversalKind, TraversalNode};
use crate::registry::Linkage;

/// Whether a traversal is compiled against one known row or a row set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    Single,
    Multi,
}

/// An ordering directive, optionally on a dotted nested-field path
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub path: Vec<String>,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            path: field.split('.').map(str::to_string).collect(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            path: field.split('.').map(str::to_string).collect(),
            direction: Direction::Desc,
        }
    }

    /// Parse the `"field"` / `"field desc"` shorthand, dotted paths allowed
    pub fn parse(directive: &str) -> Self {
        let mut parts = directive.split_whitespace();
        let field = parts.next().unwrap_or_default();
        match parts.next() {
            Some("desc") => OrderBy::desc(field),
            _ => OrderBy::asc(field),
        }
    }
}

/// Whether an ad-hoc join resolves one target row or a list of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// The row field holds one key into the target collection
    One,
    /// The row field holds a list of keys into the target collection
    Many,
}

/// An ad-hoc equi-join of a row field against an arbitrary collection
///
/// Unlike a traversal, a join needs no registered relation: it pairs the
/// key(s) found in `on` (defaulting to the result attribute) with the
/// target collection's primary key. One-joins drop rows without a target
/// unless marked [`optional`](JoinSpec::optional), which keeps them with an
/// explicit null; many-joins always discard dangling keys.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Attribute the joined value is merged under
    pub attribute: String,
    /// Target collection, joined on its primary key
    pub collection: String,
    /// Row field holding the key(s); defaults to `attribute`
    pub on: Option<String>,
    pub kind: JoinKind,
    /// One-joins only: `false` keeps unmatched rows with a null value
    pub require_match: bool,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub fields: Option<Vec<String>>,
}

impl JoinSpec {
    pub fn one(attribute: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            collection: collection.into(),
            on: None,
            kind: JoinKind::One,
            require_match: true,
            order_by: None,
            limit: None,
            fields: None,
        }
    }

    pub fn many(attribute: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            kind: JoinKind::Many,
            ..Self::one(attribute, collection)
        }
    }

    pub fn on(mut self, field: impl Into<String>) -> Self {
        self.on = Some(field.into());
        self
    }

    /// Keep rows without a matching target, resolving the attribute to null
    pub fn optional(mut self) -> Self {
        self.require_match = false;
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

    fn key_field(&self) -> &str {
        self.on.as_deref().unwrap_or(&self.attribute)
    }

    /// Shaping applied to the joined value itself
    fn shaping(&self) -> ReadOptions {
        ReadOptions {
            with: Vec::new(),
            join: Vec::new(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            fields: self.fields.clone(),
        }
    }
}

/// Shaping applied around a base query: relation traversals, ad-hoc joins,
/// ordering, limiting and field projection
///
/// `order_by` and `limit` page the base row set and therefore apply only in
/// `Multi` context; `fields` prunes the result at any level. Each traversal
/// node carries its own shaping for the related rows it produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    pub with: Vec<TraversalNode>,
    pub join: Vec<JoinSpec>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub fields: Option<Vec<String>>,
}

/// Compose a base query with relation traversals and result shaping
///
/// In `Single` context each relation value is merged directly onto the one
/// row; in `Multi` context it becomes a per-row projection applied under
/// `map`, because the algebra has no per-group ordering at the collection
/// level. Ordering and limits on a relation are always pushed inside the
/// projection for the same reason.
pub fn compose(base: Term, opts: &ReadOptions, ctx: EvalContext) -> Term {
    let mut query = base;

    for join in &opts.join {
        query = match ctx {
            EvalContext::Single => {
                let value = join_value(query.clone(), join);
                query.merge(vec![(join.attribute.clone(), value)])
            }
            EvalContext::Multi => multi_join(query, join),
        };
    }

    for node in &opts.with {
        query = match ctx {
            EvalContext::Single => {
                let value = relation_term(query.clone(), node, EvalContext::Single);
                query.merge(vec![(node.attribute.clone(), value)])
            }
            EvalContext::Multi => {
                let value = relation_term(Term::row(), node, EvalContext::Multi);
                query.map(Term::row().merge(vec![(node.attribute.clone(), value)]))
            }
        };
    }

    if ctx == EvalContext::Multi {
        if let Some(order_by) = &opts.order_by {
            query = query.order_by(order_by.path.clone(), order_by.direction);
        }
        if let Some(limit) = opts.limit {
            query = query.limit(limit);
        }
    }

    if let Some(fields) = &opts.fields {
        query = query.pluck(fields.clone());
    }

    query
}

/// The shaping a traversal node applies to its own related rows
fn node_options(node: &TraversalNode) -> ReadOptions {
    ReadOptions {
        with: node.nested.clone(),
        join: Vec::new(),
        order_by: node.order_by.clone(),
        limit: node.limit,
        fields: node.fields.clone(),
    }
}

/// The joined value for one row; `row` denotes the single-row query in
/// `Single` context and [`Term::Row`] inside the enclosing `map` otherwise.
fn join_value(row: Term, join: &JoinSpec) -> Term {
    let target = Term::table(join.collection.clone());
    match join.kind {
        JoinKind::One => {
            let fetched = target.get(row.field(join.key_field()));
            compose(fetched, &join.shaping(), EvalContext::Single)
        }
        JoinKind::Many => {
            // Each element of the key list is looked up by primary key;
            // dangling keys resolve to null and are dropped.
            let fetched = row
                .field(join.key_field())
                .map(target.get(Term::row()))
                .filter(Predicate::HasFields(vec!["id".to_string()]));
            compose(fetched, &join.shaping(), EvalContext::Multi).coerce_to_array()
        }
    }
}

/// A join applied to a row set
fn multi_join(query: Term, join: &JoinSpec) -> Term {
    let shaped = || {
        compose(
            Term::row().field("right"),
            &join.shaping(),
            EvalContext::Single,
        )
    };
    match join.kind {
        // The equi-join drops rows without a target.
        JoinKind::One if join.require_match => query
            .eq_join(join.key_field(), Term::table(join.collection.clone()))
            .map(Term::row()
                .field("left")
                .merge(vec![(join.attribute.clone(), shaped())])),
        JoinKind::One => {
            let value = Term::branch(
                Term::row().has_fields(vec!["right".to_string()]),
                shaped(),
                Term::null(),
            );
            query
                .outer_join(Term::table(join.collection.clone()), join.key_field(), "id")
                .map(Term::row()
                    .field("left")
                    .merge(vec![(join.attribute.clone(), value)]))
        }
        JoinKind::Many => {
            let value = join_value(Term::row(), join);
            query.map(Term::row().merge(vec![(join.attribute.clone(), value)]))
        }
    }
}

/// The value of one relation attribute, computed from the parent row
///
/// `row` is the accumulated single-row query in `Single` context and
/// [`Term::Row`] inside the enclosing `map` in `Multi` context.
fn relation_term(row: Term, node: &TraversalNode, ctx: EvalContext) -> Term {
    let related = Term::table(node.related_collection.clone());

    match (&node.kind, &node.filter) {
        // Direct key lookup: the parent row holds the foreign key.
        (TraversalKind::HasOne, None) => {
            let on = foreign_key(&node.on);
            let fetched = related.get(row.clone().field(on));
            let value = compose(fetched, &node_options(node), EvalContext::Single);
            match ctx {
                EvalContext::Single => value,
                // Rows without the foreign key resolve to an explicit null.
                EvalContext::Multi => {
                    Term::branch(row.has_fields(vec![on.to_string()]), value, Term::null())
                }
            }
        }

        // Filtered index scan on the inverse linkage; first match or an
        // explicit absence. The relation can lapse and return purely
        // through the filter's evaluation against the current related row.
        (TraversalKind::HasOne, Some(filter)) => {
            let on = foreign_key(&node.on);
            let scan = related
                .get_all(row.field("id"), on)
                .filter(filter.clone());
            Term::branch(
                scan.clone().count().gt(0u64),
                compose(scan.nth(0), &node_options(node), EvalContext::Single),
                Term::null(),
            )
        }

        // Index scan by the foreign key pointing back at the parent;
        // ordering/limit live inside the per-row projection, and the
        // sequence is materialized before being merged onto the row.
        (TraversalKind::HasMany, filter) => {
            let on = foreign_key(&node.on);
            let mut scan = related.get_all(row.field("id"), on);
            if let Some(filter) = filter {
                scan = scan.filter(filter.clone());
            }
            compose(scan, &node_options(node), EvalContext::Multi).coerce_to_array()
        }

        // Two-step composition through the join collection: scan by the
        // parent-side key, outer-join the related collection, drop join
        // rows whose target no longer exists, project the related row only.
        (TraversalKind::ManyMany(through), filter) => {
            let (parent_key, related_key) = pair_keys(&node.on);

            let mut join = Term::table(through.collection.clone())
                .get_all(row.field("id"), parent_key);
            if let Some(filter) = &through.filter {
                join = join.filter(filter.clone());
            }

            let mut projected = join
                .outer_join(related, related_key, "id")
                .filter(Predicate::HasFields(vec!["right".to_string()]))
                .map(Term::row().field("right"));
            if let Some(filter) = filter {
                projected = projected.filter(filter.clone());
            }

            compose(projected, &node_options(node), EvalContext::Multi).coerce_to_array()
        }
    }
}

fn foreign_key(on: &Linkage) -> &str {
    match on {
        Linkage::Key(key) => key,
        Linkage::Pair { parent_key, .. } => parent_key,
    }
}

fn pair_keys(on: &Linkage) -> (&str, &str) {
    match on {
        Linkage::Pair {
            parent_key,
            related_key,
        } => (parent_key, related_key),
        Linkage::Key(key) => (key.as_str(), key.as_str()),
    }
}
