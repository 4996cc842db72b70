use nexus_core::{ObjectRef, Subject, ZoneId};

/// Structural L1 cache key: every field the spec's key format enumerates,
/// hashed as a struct rather than a formatted string (`"subject:perm:..."`)
/// so key construction can't accidentally drift between the write side and
/// the read side the way string interpolation invites.
///
/// `revision_bucket` is `current_version(zone) / quantization_window`
/// (see [`crate::l1::revision_bucket`]); embedding it here is what makes a
/// tuple write invalidate exactly the entries it should, and nothing else —
/// the key simply stops matching once the bucket moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckKey {
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
    pub permission: String,
    pub object_type: String,
    pub object_id: String,
    pub zone: ZoneId,
    pub revision_bucket: u64,
}

impl CheckKey {
    pub fn new(
        subject: &Subject,
        permission: &str,
        object: &ObjectRef,
        zone: ZoneId,
        revision_bucket: u64,
    ) -> Self {
        Self {
            subject_type: subject.subject_type.as_str().to_string(),
            subject_id: subject.subject_id.clone(),
            subject_relation: subject.subject_relation.clone(),
            permission: permission.to_string(),
            object_type: object.object_type.as_str().to_string(),
            object_id: object.object_id.clone(),
            zone,
            revision_bucket,
        }
    }
}
