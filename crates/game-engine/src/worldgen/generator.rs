//! Chunk composition: lore, topology, and space stubs.
//!
//! `generate_chunk` is single-flighted through the generation cache;
//! concurrent requests for the same chunk id await the first one.
//! Descriptions are filled lazily on first visit, and a failed fill
//! leaves the stub marked stale for the next attempt.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use game_database::{RespawnComponent, Repositories};
use game_domain::{
    ChunkLevel, Component, Entity, GraphNode, InventoryComponent, ItemQuality, ItemTemplate,
    ItemType, NodeType, Npc, PersonalityTrait, SocialComponent, Space, TerrainType, WorldChunk,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::worldgen::cache::{CacheState, GenerationCache};
use crate::worldgen::lore::LoreEngine;
use crate::worldgen::{graph, GenerationContext};

pub struct GeneratedChunk {
    pub chunk: WorldChunk,
    pub graph_nodes: Vec<GraphNode>,
    pub space_stubs: Vec<Space>,
}

pub struct WorldGenerator {
    repos: Repositories,
    cache: Arc<GenerationCache>,
    lore: LoreEngine,
    config: EngineConfig,
}

impl WorldGenerator {
    pub fn new(
        repos: Repositories,
        cache: Arc<GenerationCache>,
        lore: LoreEngine,
        config: EngineConfig,
    ) -> Self {
        Self {
            repos,
            cache,
            lore,
            config,
        }
    }

    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn lore_engine(&self) -> &LoreEngine {
        &self.lore
    }

    /// Generate (or fetch) the chunk for `ctx.chunk_id`. Concurrent calls
    /// for the same id are deduplicated; waiters see the originator's
    /// outcome.
    pub async fn generate_chunk(&self, ctx: GenerationContext) -> EngineResult<WorldChunk> {
        let id = ctx.chunk_id;
        loop {
            match self.cache.state_of(id) {
                CacheState::Complete(chunk) => return Ok(chunk),
                CacheState::Pending(mut rx) => {
                    let _ = rx.changed().await;
                    match self.cache.state_of(id) {
                        CacheState::Complete(chunk) => return Ok(chunk),
                        CacheState::Pending(_) => continue,
                        CacheState::Absent => {
                            return Err(EngineError::GenerationFailed(format!(
                                "awaited generation of chunk {id} failed"
                            )));
                        }
                    }
                }
                CacheState::Absent => {
                    if self.cache.cache_pending(id, ctx.clone()) {
                        break;
                    }
                    // Lost the claim race; re-observe.
                }
            }
        }

        match self.build_chunk(&ctx).await {
            Ok(generated) => {
                self.cache.cache_complete(id, generated.chunk.clone());
                tracing::info!(
                    chunk = %id,
                    level = %generated.chunk.level,
                    spaces = generated.space_stubs.len(),
                    theme = %generated.chunk.biome_theme,
                    "generated chunk"
                );
                Ok(generated.chunk)
            }
            Err(e) => {
                self.cache.clear_pending(id);
                Err(e)
            }
        }
    }

    async fn build_chunk(&self, ctx: &GenerationContext) -> EngineResult<GeneratedChunk> {
        let (parent_lore, parent_level, parent_theme, parent_id) = match &ctx.parent {
            Some(p) => (
                p.lore.clone(),
                p.level,
                p.biome_theme.clone(),
                Some(p.id),
            ),
            None => (String::new(), ChunkLevel::World, String::new(), None),
        };

        let lore = self
            .lore
            .vary_lore(
                &ctx.global_lore,
                &parent_lore,
                parent_level,
                ctx.level,
                ctx.direction.as_ref(),
            )
            .await?;
        let variation = ctx
            .direction
            .as_ref()
            .map(|d| format!("{d}ward"))
            .unwrap_or_else(|| ctx.level.to_string());
        let biome_theme = self.lore.blend_themes(&parent_theme, &variation).await?;

        let mut chunk = WorldChunk::new(ctx.level, parent_id);
        chunk.id = ctx.chunk_id;
        chunk.lore = lore;
        chunk.biome_theme = biome_theme;
        chunk.difficulty_level = ctx.difficulty;
        chunk.boss_capable = ctx.boss_capable;
        chunk.mob_density = (0.15 + ctx.difficulty as f32 * 0.05).min(1.0);

        // Only subzones carry a navigable micro-graph.
        let graph_nodes = if ctx.level == ChunkLevel::Subzone {
            let mut rng = StdRng::seed_from_u64(ctx.rng_seed ^ (u64::from(ctx.difficulty) << 32));
            graph::generate(
                &mut rng,
                chunk.id,
                ctx.difficulty,
                ctx.boss_capable,
                self.config.graph_retry_limit,
            )?
        } else {
            Vec::new()
        };

        let space_stubs: Vec<Space> = graph_nodes
            .iter()
            .map(|node| self.generate_space_stub(node, &chunk))
            .collect();
        chunk.spaces = space_stubs.iter().map(|s| s.id).collect();
        chunk.size_estimate = space_stubs.len().max(1) as u32;
        chunk.entry_space = graph_nodes
            .iter()
            .find(|n| n.node_type == NodeType::Hub)
            .map(|n| n.id);

        self.repos.chunks.save(&chunk).await?;
        for node in &graph_nodes {
            self.repos.graph_nodes.save(node).await?;
        }
        for space in &space_stubs {
            self.repos.spaces.save(space).await?;
        }

        Ok(GeneratedChunk {
            chunk,
            graph_nodes,
            space_stubs,
        })
    }

    /// Deterministic minimal space, fit to persist and enrich later.
    pub fn generate_space_stub(&self, node: &GraphNode, chunk: &WorldChunk) -> Space {
        let theme = if chunk.biome_theme.is_empty() {
            "the dark"
        } else {
            &chunk.biome_theme
        };
        let (name, terrain) = match node.node_type {
            NodeType::Hub => (format!("Heart of {theme}"), TerrainType::Chamber),
            NodeType::Corridor => (format!("Passage through {theme}"), TerrainType::Tunnel),
            NodeType::DeadEnd => (format!("Collapsed end of {theme}"), TerrainType::Cavern),
            NodeType::Frontier => ("Unbroken dark".to_string(), TerrainType::Crevasse),
            NodeType::Boss => (format!("Sealed vault of {theme}"), TerrainType::Ruins),
            NodeType::Town => (format!("Settlement hall of {theme}"), TerrainType::Chamber),
        };
        let mut space = Space::stub(node.id, chunk.id, name);
        space.terrain_type = terrain;
        space.brightness = 40u8.saturating_sub((chunk.difficulty_level * 4).min(35) as u8);
        for edge in &node.neighbors {
            space
                .exits
                .push(game_domain::Exit::open(edge.direction.clone(), edge.target));
        }
        space
    }

    /// Expand a stub into visitable prose, seeding inhabitants on first
    /// fill. A failed LLM call keeps the stub and leaves it stale.
    pub async fn fill_space_content(
        &self,
        mut space: Space,
        node: &GraphNode,
        chunk: &WorldChunk,
    ) -> EngineResult<Space> {
        let first_fill = space.description.is_empty();

        let exits = space
            .exits
            .iter()
            .map(|e| e.direction.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let described = self
            .lore
            .describe_space(
                &chunk.lore,
                &chunk.biome_theme,
                &format!("{:?}", node.node_type),
                &space.name,
                &exits,
            )
            .await?;

        match described {
            Some(description) => {
                space.description = description;
                space.description_stale = false;
            }
            None => {
                space.description_stale = true;
                tracing::warn!(space = %space.id, "description fill failed, stub kept stale");
            }
        }

        // Seed once: a failed description fill must not re-roll occupants
        // on the next visit.
        if first_fill && space.entities.is_empty() && node.node_type != NodeType::Town {
            self.seed_inhabitants(&mut space, chunk).await?;
        }

        self.repos.spaces.save(&space).await?;
        Ok(space)
    }

    /// Roll the chunk's mob density once per space and place a hostile.
    async fn seed_inhabitants(&self, space: &mut Space, chunk: &WorldChunk) -> EngineResult<()> {
        let seed = space.id.0.as_u128() as u64 ^ u64::from(chunk.difficulty_level);
        let mut rng = StdRng::seed_from_u64(seed);
        if !rng.random_bool(f64::from(chunk.mob_density.clamp(0.0, 1.0))) {
            return Ok(());
        }

        let npc = roll_inhabitant(&mut rng, chunk.difficulty_level);
        let npc_id = npc.id;
        let mut inventory = InventoryComponent::with_capacity(20);
        inventory.gold = rng.random_range(0..=i64::from(chunk.difficulty_level) * 7);
        if rng.random_bool(0.4) {
            let draught = ItemTemplate {
                heal_amount: Some(12),
                ..ItemTemplate::basic("Murkwater Draught", ItemType::Consumable, 6, 1)
            };
            self.repos.items.save_template(&draught).await?;
            inventory.items.push(draught.instantiate(ItemQuality::Common));
        }

        self.repos.inventories.save(npc_id, &inventory).await?;
        if let Some(social) = npc.social() {
            self.repos.social_components.save(npc_id, social).await?;
        }
        self.repos
            .respawns
            .save(
                RespawnComponent {
                    respawn_delay: self.config.npc_respawn_delay,
                    template: Entity::Npc(npc.clone()),
                },
                npc_id,
                space.id,
            )
            .await?;
        self.repos.entities.save(&Entity::Npc(npc)).await?;
        space.entities.push(npc_id);
        Ok(())
    }
}

/// Hostile appropriate to the difficulty band.
pub fn roll_inhabitant(rng: &mut StdRng, difficulty: u32) -> Npc {
    const ROSTER: &[(&str, i32, &[PersonalityTrait])] = &[
        ("Pale Creeper", 14, &[PersonalityTrait::Cowardly]),
        ("Gloom Rat", 8, &[PersonalityTrait::Aggressive]),
        ("Hollow Sentinel", 22, &[PersonalityTrait::Defensive]),
        ("Relic Scavenger", 16, &[PersonalityTrait::Greedy]),
        ("Deep Warden", 28, &[PersonalityTrait::Brave]),
    ];
    let (name, base_health, traits) = ROSTER[rng.random_range(0..ROSTER.len())];
    let mut npc = Npc::new(name, base_health + difficulty as i32 * 4);
    npc.is_hostile = true;
    npc.description = format!("A {} of the deep places.", name.to_lowercase());
    npc.stats.strength = 8 + rng.random_range(0..=difficulty as i32);
    npc.stats.speed = rng.random_range(0..=5);
    npc.stats.intelligence = rng.random_range(4..=24);
    npc.stats.wisdom = rng.random_range(4..=20);
    npc.armor = (difficulty / 2) as i32;
    npc.personality = traits.to_vec();
    npc.insert_component(Component::Social(SocialComponent::with_disposition(-80)));
    npc
}
