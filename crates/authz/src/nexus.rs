use std::sync::Arc;

use nexus_cache::{L1Cache, RevisionBroker};
use nexus_index::TigerCache;
use nexus_store::{Database, ResourceIdentityMap, RevisionRepository, TupleStore};

use crate::admin::AdminInterface;
use crate::config::NexusConfig;
use crate::coordinator::WriteThroughCoordinator;
use crate::engine::CheckEngine;
use crate::error::Result;
use crate::revision_source::StoreRevisionSource;
use crate::schema::SchemaRegistry;

/// Composition root: wires the Tuple Store, Revision Broker, L1/L2 caches
/// and Write-Through Coordinator into one [`AdminInterface`], the way
/// `ciam-api::main`'s `AppState` wires `ciam-database`/`ciam-cache`/
/// `ciam-authz` together — minus the HTTP server, which is out of scope
/// (spec.md's Non-goals: transport is the embedder's concern).
pub struct Nexus {
    pub admin: AdminInterface,
    pub schemas: Arc<SchemaRegistry>,
}

impl Nexus {
    pub async fn connect(config: NexusConfig) -> Result<Self> {
        let database = Database::connect(config.store.clone()).await?;
        let pool = database.pool().clone();

        let store = TupleStore::new(pool.clone());
        let revisions = RevisionRepository::new(pool.clone());
        let identity = Arc::new(ResourceIdentityMap::new(pool.clone(), config.l1.l1_capacity));

        let revision_source = Arc::new(StoreRevisionSource::new(revisions.clone()));
        let broker = Arc::new(RevisionBroker::new(revision_source, &config.l1));
        let l1 = Arc::new(L1Cache::new(broker, &config.l1));
        let l2 = Arc::new(TigerCache::new(config.l2_capacity));

        let schemas = Arc::new(SchemaRegistry::new());
        let coordinator = Arc::new(WriteThroughCoordinator::new(
            l1.clone(),
            l2.clone(),
            identity.clone(),
            config.engine.l2_enabled,
        ));
        let engine = Arc::new(CheckEngine::new(
            store.clone(),
            l1,
            l2,
            identity,
            schemas.clone(),
            coordinator.clone(),
            config.engine,
        ));

        let admin = AdminInterface::new(store, revisions, engine, coordinator);

        Ok(Self { admin, schemas })
    }
}
