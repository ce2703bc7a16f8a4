//! Process-wide store backing every repository port.
//!
//! A single-player session keeps its whole world resident; durability is
//! handled by snapshotting the store into the save system. Each map is
//! guarded separately, and no lock is held across an await point.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use game_domain::{
    ChunkId, CorpseData, CorpseId, Entity, EntityId, GameTime, GraphNode, InventoryComponent,
    ItemInstance, ItemInstanceId, ItemTemplate, ItemTemplateId, ItemType, Rarity, SkillEvent,
    SkillSet, SocialComponent, SocialEventRecord, Space, SpaceId, WorldChunk, WorldSeed,
};

use crate::error::{DatabaseError, DatabaseResult};
use crate::traits::*;

#[derive(Default)]
pub struct MemoryStore {
    seed: RwLock<Option<WorldSeed>>,
    chunks: RwLock<HashMap<ChunkId, WorldChunk>>,
    nodes: RwLock<HashMap<SpaceId, GraphNode>>,
    spaces: RwLock<HashMap<SpaceId, Space>>,
    entities: RwLock<HashMap<EntityId, Entity>>,
    inventories: RwLock<HashMap<EntityId, InventoryComponent>>,
    item_templates: RwLock<HashMap<ItemTemplateId, ItemTemplate>>,
    item_instances: RwLock<HashMap<ItemInstanceId, ItemInstance>>,
    skill_events: RwLock<HashMap<EntityId, Vec<SkillEvent>>>,
    skill_components: RwLock<HashMap<EntityId, SkillSet>>,
    social_components: RwLock<HashMap<EntityId, SocialComponent>>,
    social_events: RwLock<Vec<SocialEventRecord>>,
    knowledge: RwLock<Vec<KnowledgeFragment>>,
    corpses: RwLock<HashMap<CorpseId, CorpseData>>,
    respawns: RwLock<HashMap<EntityId, RespawnEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of everything persisted, for the save system.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            seed: self.seed.read().clone(),
            chunks: self.chunks.read().values().cloned().collect(),
            nodes: self.nodes.read().values().cloned().collect(),
            spaces: self.spaces.read().values().cloned().collect(),
            entities: self.entities.read().values().cloned().collect(),
            inventories: self
                .inventories
                .read()
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            item_templates: self.item_templates.read().values().cloned().collect(),
            item_instances: self.item_instances.read().values().cloned().collect(),
            skill_components: self
                .skill_components
                .read()
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            social_components: self
                .social_components
                .read()
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            social_events: self.social_events.read().clone(),
            knowledge: self.knowledge.read().clone(),
            corpses: self.corpses.read().values().cloned().collect(),
            respawns: self.respawns.read().values().cloned().collect(),
        }
    }

    /// Replace the entire store contents with a snapshot.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        *self.seed.write() = snapshot.seed;
        *self.chunks.write() = snapshot.chunks.into_iter().map(|c| (c.id, c)).collect();
        *self.nodes.write() = snapshot.nodes.into_iter().map(|n| (n.id, n)).collect();
        *self.spaces.write() = snapshot.spaces.into_iter().map(|s| (s.id, s)).collect();
        *self.entities.write() = snapshot.entities.into_iter().map(|e| (e.id(), e)).collect();
        *self.inventories.write() = snapshot.inventories.into_iter().collect();
        *self.item_templates.write() = snapshot
            .item_templates
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        *self.item_instances.write() = snapshot
            .item_instances
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        *self.skill_components.write() = snapshot.skill_components.into_iter().collect();
        *self.social_components.write() = snapshot.social_components.into_iter().collect();
        *self.social_events.write() = snapshot.social_events;
        *self.knowledge.write() = snapshot.knowledge;
        *self.corpses.write() = snapshot.corpses.into_iter().map(|c| (c.id, c)).collect();
        *self.respawns.write() = snapshot
            .respawns
            .into_iter()
            .map(|r| (r.entity_id, r))
            .collect();
    }
}

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub seed: Option<WorldSeed>,
    pub chunks: Vec<WorldChunk>,
    pub nodes: Vec<GraphNode>,
    pub spaces: Vec<Space>,
    pub entities: Vec<Entity>,
    pub inventories: Vec<(EntityId, InventoryComponent)>,
    pub item_templates: Vec<ItemTemplate>,
    pub item_instances: Vec<ItemInstance>,
    pub skill_components: Vec<(EntityId, SkillSet)>,
    pub social_components: Vec<(EntityId, SocialComponent)>,
    pub social_events: Vec<SocialEventRecord>,
    pub knowledge: Vec<KnowledgeFragment>,
    pub corpses: Vec<CorpseData>,
    pub respawns: Vec<RespawnEntry>,
}

#[async_trait]
impl WorldSeedRepository for MemoryStore {
    async fn get(&self) -> DatabaseResult<Option<WorldSeed>> {
        Ok(self.seed.read().clone())
    }

    async fn save(&self, seed: &WorldSeed) -> DatabaseResult<()> {
        *self.seed.write() = Some(seed.clone());
        Ok(())
    }
}

#[async_trait]
impl WorldChunkRepository for MemoryStore {
    async fn find_by_id(&self, id: ChunkId) -> DatabaseResult<Option<WorldChunk>> {
        Ok(self.chunks.read().get(&id).cloned())
    }

    async fn save(&self, chunk: &WorldChunk) -> DatabaseResult<()> {
        self.chunks.write().insert(chunk.id, chunk.clone());
        Ok(())
    }

    async fn get_all(&self) -> DatabaseResult<Vec<WorldChunk>> {
        Ok(self.chunks.read().values().cloned().collect())
    }
}

#[async_trait]
impl GraphNodeRepository for MemoryStore {
    async fn find_by_id(&self, id: SpaceId) -> DatabaseResult<Option<GraphNode>> {
        Ok(self.nodes.read().get(&id).cloned())
    }

    async fn save(&self, node: &GraphNode) -> DatabaseResult<()> {
        self.nodes.write().insert(node.id, node.clone());
        Ok(())
    }

    async fn update(&self, node: &GraphNode) -> DatabaseResult<()> {
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&node.id) {
            return Err(DatabaseError::NotFound(format!("graph node {}", node.id)));
        }
        nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn get_all(&self) -> DatabaseResult<Vec<GraphNode>> {
        Ok(self.nodes.read().values().cloned().collect())
    }
}

#[async_trait]
impl SpacePropertiesRepository for MemoryStore {
    async fn find_by_id(&self, id: SpaceId) -> DatabaseResult<Option<Space>> {
        Ok(self.spaces.read().get(&id).cloned())
    }

    async fn save(&self, space: &Space) -> DatabaseResult<()> {
        self.spaces.write().insert(space.id, space.clone());
        Ok(())
    }
}

#[async_trait]
impl SpaceEntityRepository for MemoryStore {
    async fn find_by_id(&self, id: EntityId) -> DatabaseResult<Option<Entity>> {
        Ok(self.entities.read().get(&id).cloned())
    }

    async fn save(&self, entity: &Entity) -> DatabaseResult<()> {
        self.entities.write().insert(entity.id(), entity.clone());
        Ok(())
    }

    async fn save_all(&self, entities: &[Entity]) -> DatabaseResult<()> {
        let mut map = self.entities.write();
        for entity in entities {
            map.insert(entity.id(), entity.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> DatabaseResult<()> {
        self.entities.write().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl InventoryRepository for MemoryStore {
    async fn find_by_entity_id(&self, id: EntityId) -> DatabaseResult<Option<InventoryComponent>> {
        Ok(self.inventories.read().get(&id).cloned())
    }

    async fn save(&self, id: EntityId, inventory: &InventoryComponent) -> DatabaseResult<()> {
        self.inventories.write().insert(id, inventory.clone());
        Ok(())
    }

    async fn update_gold(&self, id: EntityId, gold: i64) -> DatabaseResult<()> {
        let mut map = self.inventories.write();
        let inv = map
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("inventory {id}")))?;
        inv.gold = gold;
        Ok(())
    }

    async fn update_capacity(&self, id: EntityId, capacity: u32) -> DatabaseResult<()> {
        let mut map = self.inventories.write();
        let inv = map
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("inventory {id}")))?;
        inv.capacity = capacity;
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> DatabaseResult<()> {
        self.inventories.write().remove(&id);
        Ok(())
    }

    async fn find_all(&self) -> DatabaseResult<Vec<(EntityId, InventoryComponent)>> {
        Ok(self
            .inventories
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }
}

#[async_trait]
impl ItemRepository for MemoryStore {
    async fn save_template(&self, template: &ItemTemplate) -> DatabaseResult<()> {
        self.item_templates
            .write()
            .insert(template.id, template.clone());
        Ok(())
    }

    async fn find_template(&self, id: ItemTemplateId) -> DatabaseResult<Option<ItemTemplate>> {
        Ok(self.item_templates.read().get(&id).cloned())
    }

    async fn find_template_by_name(&self, name: &str) -> DatabaseResult<Option<ItemTemplate>> {
        let wanted = name.to_lowercase();
        Ok(self
            .item_templates
            .read()
            .values()
            .find(|t| t.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn templates_by_type(&self, item_type: ItemType) -> DatabaseResult<Vec<ItemTemplate>> {
        Ok(self
            .item_templates
            .read()
            .values()
            .filter(|t| t.item_type == item_type)
            .cloned()
            .collect())
    }

    async fn templates_by_rarity(&self, rarity: Rarity) -> DatabaseResult<Vec<ItemTemplate>> {
        Ok(self
            .item_templates
            .read()
            .values()
            .filter(|t| t.rarity == rarity)
            .cloned()
            .collect())
    }

    async fn save_instance(&self, instance: &ItemInstance) -> DatabaseResult<()> {
        self.item_instances
            .write()
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn find_instance(&self, id: ItemInstanceId) -> DatabaseResult<Option<ItemInstance>> {
        Ok(self.item_instances.read().get(&id).cloned())
    }

    async fn delete_instance(&self, id: ItemInstanceId) -> DatabaseResult<()> {
        self.item_instances.write().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl SkillRepository for MemoryStore {
    async fn append_event(&self, entity: EntityId, event: &SkillEvent) -> DatabaseResult<()> {
        self.skill_events
            .write()
            .entry(entity)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn events_for(&self, entity: EntityId) -> DatabaseResult<Vec<SkillEvent>> {
        Ok(self
            .skill_events
            .read()
            .get(&entity)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SkillComponentRepository for MemoryStore {
    async fn load(&self, entity: EntityId) -> DatabaseResult<Option<SkillSet>> {
        Ok(self.skill_components.read().get(&entity).cloned())
    }

    async fn save(&self, entity: EntityId, skills: &SkillSet) -> DatabaseResult<()> {
        self.skill_components.write().insert(entity, skills.clone());
        Ok(())
    }
}

#[async_trait]
impl SocialComponentRepository for MemoryStore {
    async fn load(&self, entity: EntityId) -> DatabaseResult<Option<SocialComponent>> {
        Ok(self.social_components.read().get(&entity).cloned())
    }

    async fn save(&self, entity: EntityId, social: &SocialComponent) -> DatabaseResult<()> {
        self.social_components.write().insert(entity, social.clone());
        Ok(())
    }
}

#[async_trait]
impl SocialEventRepository for MemoryStore {
    async fn append(&self, record: &SocialEventRecord) -> DatabaseResult<()> {
        self.social_events.write().push(record.clone());
        Ok(())
    }

    async fn for_npc(&self, npc: EntityId) -> DatabaseResult<Vec<SocialEventRecord>> {
        Ok(self
            .social_events
            .read()
            .iter()
            .filter(|r| r.npc_id == npc)
            .cloned()
            .collect())
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl KnowledgeRepository for MemoryStore {
    async fn save(&self, fragment: &KnowledgeFragment) -> DatabaseResult<()> {
        self.knowledge.write().push(fragment.clone());
        Ok(())
    }

    async fn search(&self, query: &[f64], limit: usize) -> DatabaseResult<Vec<KnowledgeFragment>> {
        let mut scored: Vec<(f64, KnowledgeFragment)> = self
            .knowledge
            .read()
            .iter()
            .map(|f| {
                let score = f
                    .embedding
                    .as_ref()
                    .map(|e| cosine_similarity(query, e))
                    .unwrap_or(f64::MIN);
                (score, f.clone())
            })
            .collect();
        // Embedded fragments rank by similarity; the rest fall back to recency.
        scored.sort_by(|(sa, fa), (sb, fb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(fb.created_at.cmp(&fa.created_at))
        });
        Ok(scored.into_iter().take(limit).map(|(_, f)| f).collect())
    }

    async fn by_topic(&self, topic: &str) -> DatabaseResult<Vec<KnowledgeFragment>> {
        let wanted = topic.to_lowercase();
        Ok(self
            .knowledge
            .read()
            .iter()
            .filter(|f| f.topic.to_lowercase().contains(&wanted))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CorpseRepository for MemoryStore {
    async fn save(&self, corpse: &CorpseData) -> DatabaseResult<()> {
        self.corpses.write().insert(corpse.id, corpse.clone());
        Ok(())
    }

    async fn find_by_space_id(&self, space: SpaceId) -> DatabaseResult<Vec<CorpseData>> {
        Ok(self
            .corpses
            .read()
            .values()
            .filter(|c| c.space_id == space)
            .cloned()
            .collect())
    }

    async fn find_expired(&self, now: GameTime) -> DatabaseResult<Vec<CorpseData>> {
        Ok(self
            .corpses
            .read()
            .values()
            .filter(|c| c.decay_timer <= now)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: CorpseId) -> DatabaseResult<()> {
        self.corpses.write().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl RespawnRepository for MemoryStore {
    async fn save(
        &self,
        component: RespawnComponent,
        entity: EntityId,
        space: SpaceId,
    ) -> DatabaseResult<()> {
        self.respawns.write().insert(
            entity,
            RespawnEntry {
                entity_id: entity,
                space_id: space,
                component,
                killed_at: None,
            },
        );
        Ok(())
    }

    async fn find_ready_to_respawn(&self, now: GameTime) -> DatabaseResult<Vec<RespawnEntry>> {
        Ok(self
            .respawns
            .read()
            .values()
            .filter(|r| {
                r.killed_at
                    .map(|t| t + r.component.respawn_delay <= now)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn mark_killed(&self, entity: EntityId, time: GameTime) -> DatabaseResult<()> {
        let mut map = self.respawns.write();
        let entry = map
            .get_mut(&entity)
            .ok_or_else(|| DatabaseError::NotFound(format!("respawn entry {entity}")))?;
        entry.killed_at = Some(time);
        Ok(())
    }

    async fn reset_timer(&self, entity: EntityId) -> DatabaseResult<()> {
        let mut map = self.respawns.write();
        let entry = map
            .get_mut(&entity)
            .ok_or_else(|| DatabaseError::NotFound(format!("respawn entry {entity}")))?;
        entry.killed_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use game_domain::{ChunkLevel, KnowledgeId};

    #[tokio::test]
    async fn chunk_roundtrip_is_structural() {
        let store = MemoryStore::new();
        let mut chunk = WorldChunk::new(ChunkLevel::Zone, None);
        chunk.lore = "Old water under old stone.".into();
        chunk.children.push(ChunkId::new());
        WorldChunkRepository::save(&store, &chunk).await.unwrap();

        let loaded = WorldChunkRepository::find_by_id(&store, chunk.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.lore, chunk.lore);
        assert_eq!(loaded.children, chunk.children);
        assert_eq!(loaded.level, chunk.level);
    }

    #[tokio::test]
    async fn update_requires_existing_node() {
        let store = MemoryStore::new();
        let node = GraphNode::new(SpaceId::new(), game_domain::NodeType::Hub, ChunkId::new());
        let err = GraphNodeRepository::update(&store, &node).await;
        assert!(matches!(err, Err(DatabaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn knowledge_search_prefers_similar_embeddings() {
        let store = MemoryStore::new();
        for (topic, embedding) in [
            ("mushrooms", vec![1.0, 0.0, 0.0]),
            ("river", vec![0.0, 1.0, 0.0]),
        ] {
            KnowledgeRepository::save(
                &store,
                &KnowledgeFragment {
                    id: KnowledgeId::new(),
                    topic: topic.into(),
                    text: String::new(),
                    embedding: Some(embedding),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        let hits = KnowledgeRepository::search(&store, &[0.9, 0.1, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits[0].topic, "mushrooms");
    }

    #[tokio::test]
    async fn respawn_entries_become_ready_after_delay() {
        let store = MemoryStore::new();
        let npc = game_domain::Npc::new("Gloom Rat", 10);
        let id = npc.id;
        let space = SpaceId::new();
        RespawnRepository::save(
            &store,
            RespawnComponent {
                respawn_delay: 50,
                template: Entity::Npc(npc),
            },
            id,
            space,
        )
        .await
        .unwrap();

        assert!(RespawnRepository::find_ready_to_respawn(&store, 1_000)
            .await
            .unwrap()
            .is_empty());

        RespawnRepository::mark_killed(&store, id, 100).await.unwrap();
        assert!(RespawnRepository::find_ready_to_respawn(&store, 149)
            .await
            .unwrap()
            .is_empty());
        let ready = RespawnRepository::find_ready_to_respawn(&store, 150)
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].space_id, space);
    }
}
