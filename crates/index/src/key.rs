use nexus_core::{Subject, TypeName, ZoneId};

/// The L2 key is subject-oriented and does not include the specific
/// object: one entry covers every resource of `object_type` the subject
/// can reach via `permission`, in `zone` (spec.md §3/§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessibleSetKey {
    pub subject_type: String,
    pub subject_id: String,
    pub permission: String,
    pub object_type: String,
    pub zone: ZoneId,
}

impl AccessibleSetKey {
    pub fn new(
        subject: &Subject,
        permission: &str,
        object_type: &TypeName,
        zone: ZoneId,
    ) -> Self {
        Self {
            subject_type: subject.subject_type.as_str().to_string(),
            subject_id: subject.subject_id.clone(),
            permission: permission.to_string(),
            object_type: object_type.as_str().to_string(),
            zone,
        }
    }
}
