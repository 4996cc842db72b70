pub mod error;
pub mod rewrite;
pub mod subject;
pub mod tuple;
pub mod zone;

pub use error::{CoreError, Result};
pub use rewrite::{RewriteRule, RewriteSchema, TypeSchema};
pub use subject::{ObjectRef, Subject, TypeName, PUBLIC_SUBJECT_ID, PUBLIC_SUBJECT_TYPE};
pub use tuple::{deny_relation, is_deny_relation, strip_deny_prefix, NewTuple, PermissionTuple, TupleId};
pub use zone::ZoneId;
