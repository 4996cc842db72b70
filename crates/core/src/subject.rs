use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::zone::ZoneId;

/// Characters reserved by the wire/display grammar (`type:id#relation`, the
/// format [`Subject`] and [`ObjectRef`] render through). An identifier that
/// contains one of these would make a rendered reference ambiguous to parse
/// back, so they're rejected at the write boundary rather than the read
/// boundary.
const RESERVED_CHARS: [char; 2] = [':', '#'];

fn validate_identifier(label: &str, value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err(format!("{label} must not be empty"));
    }
    if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(format!("{label} {value:?} contains reserved character '{c}'"));
    }
    Ok(())
}

/// Well-known subject type reserved for the "everyone" userset. A tuple
/// `(object, relation, role:public#member)` grants the relation to any
/// caller without a subject-relation lookup.
pub const PUBLIC_SUBJECT_TYPE: &str = "role";
pub const PUBLIC_SUBJECT_ID: &str = "public";

/// A namespaced type name, e.g. `document`, `group`, `role`. Interned as a
/// plain `String` rather than a closed enum: schemas are zone-configurable,
/// so the set of valid type names is data, not a compile-time fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(pub String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The object side of a tuple or a check: `(type, id)` within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: TypeName,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<TypeName>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

impl ObjectRef {
    /// Rejects malformed identifiers (spec.md §7's `InvalidObject`): an
    /// empty type/id, or one carrying a character reserved by the
    /// `type:id` display grammar.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("object type", self.object_type.as_str())
            .and_then(|_| validate_identifier("object id", &self.object_id))
            .map_err(CoreError::InvalidObject)
    }
}

/// The subject side of a tuple: either a concrete principal (`user:alice`)
/// or a userset reference (`group:eng#member`). `relation == None` means
/// "this exact subject"; `Some(r)` means "anyone related to the subject
/// object via relation `r`" (spec.md's `tuple_to_userset` target shape).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub subject_type: TypeName,
    pub subject_id: String,
    pub subject_relation: Option<String>,
}

impl Subject {
    pub fn principal(subject_type: impl Into<TypeName>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
        }
    }

    pub fn userset(
        subject_type: impl Into<TypeName>,
        subject_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: Some(relation.into()),
        }
    }

    pub fn public() -> Self {
        Self::userset(PUBLIC_SUBJECT_TYPE, PUBLIC_SUBJECT_ID, "member")
    }

    pub fn is_public(&self) -> bool {
        self.subject_type.as_str() == PUBLIC_SUBJECT_TYPE
            && self.subject_id == PUBLIC_SUBJECT_ID
            && self.subject_relation.as_deref() == Some("member")
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }

    /// Rejects malformed identifiers (spec.md §7's `InvalidSubject`): an
    /// empty type/id/relation, or one carrying a character reserved by the
    /// `type:id#relation` display grammar. The public subject (`role:public`)
    /// is exempt, since it's a fixed well-known value, not caller input.
    pub fn validate(&self) -> Result<()> {
        if self.is_public() {
            return Ok(());
        }
        validate_identifier("subject type", self.subject_type.as_str())
            .and_then(|_| validate_identifier("subject id", &self.subject_id))
            .and_then(|_| match &self.subject_relation {
                Some(rel) => validate_identifier("subject relation", rel),
                None => Ok(()),
            })
            .map_err(CoreError::InvalidSubject)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject_relation {
            Some(rel) => write!(f, "{}:{}#{}", self.subject_type, self.subject_id, rel),
            None => write!(f, "{}:{}", self.subject_type, self.subject_id),
        }
    }
}

/// A fully zone-scoped object, for call sites (e.g. the identity map) that
/// need the zone alongside the type/id pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZonedObject {
    pub zone: ZoneId,
    pub object: ObjectRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_subject_round_trips_is_public() {
        let s = Subject::public();
        assert!(s.is_public());
        assert!(s.is_userset());
    }

    #[test]
    fn principal_display_has_no_hash() {
        let s = Subject::principal("user", "alice");
        assert_eq!(s.to_string(), "user:alice");
        assert!(!s.is_userset());
    }

    #[test]
    fn userset_display_includes_relation() {
        let s = Subject::userset("group", "eng", "member");
        assert_eq!(s.to_string(), "group:eng#member");
    }

    #[test]
    fn empty_subject_id_is_invalid() {
        let s = Subject::principal("user", "");
        assert!(matches!(s.validate(), Err(CoreError::InvalidSubject(_))));
    }

    #[test]
    fn subject_id_with_reserved_char_is_invalid() {
        let s = Subject::principal("user", "alice#admin");
        assert!(s.validate().is_err());
    }

    #[test]
    fn public_subject_always_validates() {
        assert!(Subject::public().validate().is_ok());
    }

    #[test]
    fn ordinary_principal_and_userset_validate() {
        assert!(Subject::principal("user", "alice").validate().is_ok());
        assert!(Subject::userset("group", "eng", "member").validate().is_ok());
    }

    #[test]
    fn empty_object_id_is_invalid() {
        let o = ObjectRef::new("document", "");
        assert!(matches!(o.validate(), Err(CoreError::InvalidObject(_))));
    }

    #[test]
    fn object_id_with_reserved_char_is_invalid() {
        let o = ObjectRef::new("document", "doc:1");
        assert!(o.validate().is_err());
    }
}
