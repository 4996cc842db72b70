use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::subject::TypeName;

/// References another relation on the same object: `viewer` defined as
/// `computed_userset { relation: "editor" }` means every editor is also a
/// viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedUserset {
    pub relation: String,
}

/// Follows a relation to a *different* object, then re-evaluates a relation
/// there: `viewer` defined as `tuple_to_userset { tupleset: "parent",
/// computed_userset: "viewer" }` means "look up this object's `parent`
/// tuple, then ask whether the subject has `viewer` on the parent". This is
/// how folder/document hierarchies and group-to-group nesting are expressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleToUserset {
    pub tupleset_relation: String,
    pub computed_userset_relation: String,
}

/// One node of a userset rewrite expression tree. A `RelationSchema`'s
/// `rewrite` is the root of such a tree; the Check Engine walks it with an
/// iterative worklist (spec.md §9) rather than native recursion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteRule {
    /// Direct tuples naming this relation: the base case of every rewrite.
    This,
    ComputedUserset(ComputedUserset),
    TupleToUserset(TupleToUserset),
    #[serde(deserialize_with = "deserialize_children")]
    Union(Vec<RewriteRule>),
    #[serde(deserialize_with = "deserialize_children")]
    Intersection(Vec<RewriteRule>),
    Exclusion {
        base: Box<RewriteRule>,
        subtract: Box<RewriteRule>,
    },
}

/// Accepts both a bare array (`[This, ComputedUserset(...)]`) and the
/// OpenFGA-style `{ "child": [...] }` wrapper object for union/intersection
/// children, since schemas authored against either convention should load
/// without edits.
fn deserialize_children<'de, D>(deserializer: D) -> Result<Vec<RewriteRule>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChildrenForm {
        Bare(Vec<RewriteRule>),
        Wrapped { child: Vec<RewriteRule> },
    }
    match ChildrenForm::deserialize(deserializer)? {
        ChildrenForm::Bare(v) => Ok(v),
        ChildrenForm::Wrapped { child } => Ok(child),
    }
}

/// The rewrite rule for a single named relation on a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub rewrite: RewriteRule,
}

impl RelationSchema {
    pub fn direct() -> Self {
        Self { rewrite: RewriteRule::This }
    }
}

/// The set of relations defined on a single object type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSchema {
    pub type_name: TypeName,
    pub relations: HashMap<String, RelationSchema>,
}

impl TypeSchema {
    pub fn new(type_name: impl Into<TypeName>) -> Self {
        Self {
            type_name: type_name.into(),
            relations: HashMap::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>, schema: RelationSchema) -> Self {
        self.relations.insert(relation.into(), schema);
        self
    }
}

/// The full userset rewrite schema for a zone: one [`TypeSchema`] per
/// object type. Configured per zone at engine construction time rather than
/// stored as a tenant-administered, API-key-gated resource (the teacher's
/// `FgaStore` multi-store/versioning surface is out of scope here — see
/// DESIGN.md).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteSchema {
    pub types: HashMap<String, TypeSchema>,
}

impl RewriteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, schema: TypeSchema) -> Self {
        self.types.insert(schema.type_name.as_str().to_string(), schema);
        self
    }

    /// Looks up the rewrite rule for `(type, relation)`, if the schema
    /// defines it. A `None` means the relation doesn't exist on that type;
    /// callers must treat this as a deny, never as an error-worthy miss.
    pub fn rewrite_for(&self, type_name: &str, relation: &str) -> Option<&RewriteRule> {
        self.types
            .get(type_name)
            .and_then(|t| t.relations.get(relation))
            .map(|r| &r.rewrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_relation_round_trips_through_json() {
        let schema = RewriteSchema::new().with_type(
            TypeSchema::new("document").with_relation("viewer", RelationSchema::direct()),
        );
        let json = serde_json::to_string(&schema).unwrap();
        let back: RewriteSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rewrite_for("document", "viewer"), Some(&RewriteRule::This));
    }

    #[test]
    fn union_accepts_bare_array_form() {
        let json = r#"{"union": ["this", {"computed_userset": {"relation": "editor"}}]}"#;
        let rule: RewriteRule = serde_json::from_str(json).unwrap();
        match rule {
            RewriteRule::Union(children) => assert_eq!(children.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn union_accepts_openfga_style_child_wrapper() {
        let json = r#"{"union": {"child": ["this"]}}"#;
        let rule: RewriteRule = serde_json::from_str(json).unwrap();
        match rule {
            RewriteRule::Union(children) => assert_eq!(children.len(), 1),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn missing_relation_returns_none_not_error() {
        let schema = RewriteSchema::new();
        assert!(schema.rewrite_for("document", "viewer").is_none());
    }
}
