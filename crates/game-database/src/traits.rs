//! Repository ports, one per persisted entity class.
//!
//! Contracts are semantic: a port returns a typed value or a
//! `DatabaseError`, and the engine decides whether a failure aborts the
//! action or degrades to in-memory state. Implementations must be safe to
//! share across logical tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use game_domain::{
    ChunkId, CorpseData, CorpseId, Entity, EntityId, GameTime, GraphNode, InventoryComponent,
    ItemInstance, ItemInstanceId, ItemTemplate, ItemTemplateId, ItemType, KnowledgeId, Rarity,
    SkillEvent, SkillSet, SocialComponent, SocialEventRecord, Space, SpaceId, WorldChunk,
    WorldSeed,
};

use crate::error::DatabaseResult;

// ============================================================================
// WORLD STRUCTURE
// ============================================================================

#[async_trait]
pub trait WorldSeedRepository: Send + Sync {
    async fn get(&self) -> DatabaseResult<Option<WorldSeed>>;
    async fn save(&self, seed: &WorldSeed) -> DatabaseResult<()>;
}

#[async_trait]
pub trait WorldChunkRepository: Send + Sync {
    async fn find_by_id(&self, id: ChunkId) -> DatabaseResult<Option<WorldChunk>>;
    async fn save(&self, chunk: &WorldChunk) -> DatabaseResult<()>;
    async fn get_all(&self) -> DatabaseResult<Vec<WorldChunk>>;
}

#[async_trait]
pub trait GraphNodeRepository: Send + Sync {
    async fn find_by_id(&self, id: SpaceId) -> DatabaseResult<Option<GraphNode>>;
    async fn save(&self, node: &GraphNode) -> DatabaseResult<()>;
    /// Save, requiring the node to already exist.
    async fn update(&self, node: &GraphNode) -> DatabaseResult<()>;
    async fn get_all(&self) -> DatabaseResult<Vec<GraphNode>>;
}

#[async_trait]
pub trait SpacePropertiesRepository: Send + Sync {
    async fn find_by_id(&self, id: SpaceId) -> DatabaseResult<Option<Space>>;
    async fn save(&self, space: &Space) -> DatabaseResult<()>;
}

// ============================================================================
// ENTITIES AND POSSESSIONS
// ============================================================================

#[async_trait]
pub trait SpaceEntityRepository: Send + Sync {
    async fn find_by_id(&self, id: EntityId) -> DatabaseResult<Option<Entity>>;
    async fn save(&self, entity: &Entity) -> DatabaseResult<()>;
    async fn save_all(&self, entities: &[Entity]) -> DatabaseResult<()>;
    async fn delete(&self, id: EntityId) -> DatabaseResult<()>;
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn find_by_entity_id(&self, id: EntityId) -> DatabaseResult<Option<InventoryComponent>>;
    async fn save(&self, id: EntityId, inventory: &InventoryComponent) -> DatabaseResult<()>;
    async fn update_gold(&self, id: EntityId, gold: i64) -> DatabaseResult<()>;
    async fn update_capacity(&self, id: EntityId, capacity: u32) -> DatabaseResult<()>;
    async fn delete(&self, id: EntityId) -> DatabaseResult<()>;
    async fn find_all(&self) -> DatabaseResult<Vec<(EntityId, InventoryComponent)>>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn save_template(&self, template: &ItemTemplate) -> DatabaseResult<()>;
    async fn find_template(&self, id: ItemTemplateId) -> DatabaseResult<Option<ItemTemplate>>;
    async fn find_template_by_name(&self, name: &str) -> DatabaseResult<Option<ItemTemplate>>;
    async fn templates_by_type(&self, item_type: ItemType) -> DatabaseResult<Vec<ItemTemplate>>;
    async fn templates_by_rarity(&self, rarity: Rarity) -> DatabaseResult<Vec<ItemTemplate>>;
    async fn save_instance(&self, instance: &ItemInstance) -> DatabaseResult<()>;
    async fn find_instance(&self, id: ItemInstanceId) -> DatabaseResult<Option<ItemInstance>>;
    async fn delete_instance(&self, id: ItemInstanceId) -> DatabaseResult<()>;
}

// ============================================================================
// SKILLS AND SOCIAL STATE
// ============================================================================

/// Append-only log of skill happenings (unlock, xp gained, level up).
#[async_trait]
pub trait SkillRepository: Send + Sync {
    async fn append_event(&self, entity: EntityId, event: &SkillEvent) -> DatabaseResult<()>;
    async fn events_for(&self, entity: EntityId) -> DatabaseResult<Vec<SkillEvent>>;
}

/// Per-entity skill state.
#[async_trait]
pub trait SkillComponentRepository: Send + Sync {
    async fn load(&self, entity: EntityId) -> DatabaseResult<Option<SkillSet>>;
    async fn save(&self, entity: EntityId, skills: &SkillSet) -> DatabaseResult<()>;
}

#[async_trait]
pub trait SocialComponentRepository: Send + Sync {
    async fn load(&self, entity: EntityId) -> DatabaseResult<Option<SocialComponent>>;
    async fn save(&self, entity: EntityId, social: &SocialComponent) -> DatabaseResult<()>;
}

#[async_trait]
pub trait SocialEventRepository: Send + Sync {
    async fn append(&self, record: &SocialEventRecord) -> DatabaseResult<()>;
    async fn for_npc(&self, npc: EntityId) -> DatabaseResult<Vec<SocialEventRecord>>;
}

/// A fragment of world knowledge an NPC can surface when asked. Ranked by
/// embedding similarity when vectors are present, recency otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFragment {
    pub id: KnowledgeId,
    pub topic: String,
    pub text: String,
    pub embedding: Option<Vec<f64>>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn save(&self, fragment: &KnowledgeFragment) -> DatabaseResult<()>;
    /// Nearest fragments by cosine similarity; falls back to recency for
    /// fragments without embeddings.
    async fn search(&self, query: &[f64], limit: usize) -> DatabaseResult<Vec<KnowledgeFragment>>;
    async fn by_topic(&self, topic: &str) -> DatabaseResult<Vec<KnowledgeFragment>>;
}

// ============================================================================
// DEATH AND RESPAWN
// ============================================================================

#[async_trait]
pub trait CorpseRepository: Send + Sync {
    async fn save(&self, corpse: &CorpseData) -> DatabaseResult<()>;
    async fn find_by_space_id(&self, space: SpaceId) -> DatabaseResult<Vec<CorpseData>>;
    async fn find_expired(&self, now: GameTime) -> DatabaseResult<Vec<CorpseData>>;
    async fn delete(&self, id: CorpseId) -> DatabaseResult<()>;
}

/// Respawn bookkeeping for NPCs that come back after being killed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespawnComponent {
    /// Ticks from death to respawn.
    pub respawn_delay: GameTime,
    /// Snapshot of the entity to re-create.
    pub template: Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespawnEntry {
    pub entity_id: EntityId,
    pub space_id: SpaceId,
    pub component: RespawnComponent,
    pub killed_at: Option<GameTime>,
}

#[async_trait]
pub trait RespawnRepository: Send + Sync {
    async fn save(
        &self,
        component: RespawnComponent,
        entity: EntityId,
        space: SpaceId,
    ) -> DatabaseResult<()>;
    async fn find_ready_to_respawn(&self, now: GameTime) -> DatabaseResult<Vec<RespawnEntry>>;
    async fn mark_killed(&self, entity: EntityId, time: GameTime) -> DatabaseResult<()>;
    async fn reset_timer(&self, entity: EntityId) -> DatabaseResult<()>;
}
