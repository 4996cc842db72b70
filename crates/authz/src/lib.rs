pub mod admin;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod nexus;
pub mod revision_source;
pub mod schema;

pub use admin::AdminInterface;
pub use config::{EngineConfig, NexusConfig};
pub use coordinator::WriteThroughCoordinator;
pub use engine::CheckEngine;
pub use error::{AuthzError, Result};
pub use nexus::Nexus;
pub use revision_source::StoreRevisionSource;
pub use schema::SchemaRegistry;
