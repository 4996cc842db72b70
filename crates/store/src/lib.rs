pub mod connection;
pub mod error;
pub mod identity_map;
pub mod revisions;
pub mod tuple_store;

pub use connection::{Database, StoreConfig};
pub use error::{Result, StoreError};
pub use identity_map::{ResourceIdentityMap, SharedIdentityMap};
pub use revisions::{RevisionRepository, RESET_ZONE_TUPLE_LIMIT};
pub use tuple_store::TupleStore;
