//! Persistence layer for Undercroft.
//!
//! Every persisted entity class gets a repository port (an `async_trait`
//! contract), so the engine never sees a concrete store. The shipped
//! implementation is [`MemoryStore`], a process-wide store suited to a
//! single-player session; durability comes from the versioned JSON save
//! snapshots in [`save_system`].

pub mod error;
pub mod memory;
pub mod save_system;
pub mod traits;

pub use error::{DatabaseError, DatabaseResult};
pub use memory::{MemoryStore, StoreSnapshot};
pub use save_system::{SaveSnapshot, SaveSystem};
pub use traits::*;

use std::sync::Arc;

/// Bundle of every repository port the engine consumes. Constructed once
/// at boot; handlers borrow it.
#[derive(Clone)]
pub struct Repositories {
    pub world_seed: Arc<dyn WorldSeedRepository>,
    pub chunks: Arc<dyn WorldChunkRepository>,
    pub graph_nodes: Arc<dyn GraphNodeRepository>,
    pub spaces: Arc<dyn SpacePropertiesRepository>,
    pub entities: Arc<dyn SpaceEntityRepository>,
    pub inventories: Arc<dyn InventoryRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub skills: Arc<dyn SkillRepository>,
    pub skill_components: Arc<dyn SkillComponentRepository>,
    pub social_components: Arc<dyn SocialComponentRepository>,
    pub social_events: Arc<dyn SocialEventRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub corpses: Arc<dyn CorpseRepository>,
    pub respawns: Arc<dyn RespawnRepository>,
}

impl Repositories {
    /// Wire every port to one shared in-memory store.
    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            world_seed: store.clone(),
            chunks: store.clone(),
            graph_nodes: store.clone(),
            spaces: store.clone(),
            entities: store.clone(),
            inventories: store.clone(),
            items: store.clone(),
            skills: store.clone(),
            skill_components: store.clone(),
            social_components: store.clone(),
            social_events: store.clone(),
            knowledge: store.clone(),
            corpses: store.clone(),
            respawns: store,
        }
    }
}
