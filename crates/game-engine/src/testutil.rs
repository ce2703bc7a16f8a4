//! Shared fixtures for engine tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ai_bridge::{ChatRequest, LlmClient, LlmError, LlmResult};
use game_database::{MemoryStore, Repositories};
use game_domain::{
    ChunkId, ChunkLevel, EntityId, GraphNode, PlayerState, SpaceId, WorldChunk,
};

use crate::config::EngineConfig;
use crate::worldgen::lore::LoreEngine;
use crate::worldgen::{GenerationCache, GenerationContext, WorldGenerator};

pub(crate) fn repos() -> (Repositories, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Repositories::from_store(store.clone()), store)
}

/// Generator with no LLM attached: deterministic fallback lore.
pub(crate) fn world_generator(repos: &Repositories) -> WorldGenerator {
    let config = EngineConfig::default();
    let cache = Arc::new(GenerationCache::new(config.cache_capacity));
    let lore = LoreEngine::new(None, config.clone()).expect("templates compile");
    WorldGenerator::new(repos.clone(), cache, lore, config)
}

pub(crate) fn player_at(space: SpaceId) -> PlayerState {
    PlayerState::fresh(EntityId::new(), "Maro", space)
}

pub(crate) struct SubzoneFixture {
    pub chunk: WorldChunk,
    pub nodes: Vec<GraphNode>,
}

/// Generate a subzone under a throwaway zone and collect its nodes.
pub(crate) async fn generated_subzone(generator: &WorldGenerator, seed: u64) -> SubzoneFixture {
    let mut zone = WorldChunk::new(ChunkLevel::Zone, None);
    zone.lore = "Old water under old stone.".into();
    zone.biome_theme = "Sunken Galleries".into();

    let ctx = GenerationContext::child_of(
        &zone,
        ChunkId::new(),
        None,
        "An endless under-realm.".into(),
        seed,
    );
    let chunk = generator.generate_chunk(ctx).await.expect("generation succeeds");
    let nodes = fixture_nodes(generator, &chunk).await;
    SubzoneFixture { chunk, nodes }
}

/// Walk seeds until the generated graph contains a frontier node.
pub(crate) async fn generated_subzone_with_frontier(
    generator: &WorldGenerator,
) -> SubzoneFixture {
    // Frontier assignment is random per seed; a handful of tries always
    // lands one.
    for seed in 0..64 {
        let fixture = generated_subzone(generator, seed).await;
        if fixture
            .nodes
            .iter()
            .any(|n| n.node_type == game_domain::NodeType::Frontier)
        {
            return fixture;
        }
    }
    panic!("no frontier node in 64 seeds");
}

async fn fixture_nodes(generator: &WorldGenerator, chunk: &WorldChunk) -> Vec<GraphNode> {
    let mut nodes = Vec::new();
    for space_id in &chunk.spaces {
        if let Some(node) = generator_repo_node(generator, *space_id).await {
            nodes.push(node);
        }
    }
    nodes
}

async fn generator_repo_node(generator: &WorldGenerator, id: SpaceId) -> Option<GraphNode> {
    // The generator shares its repositories; reach through for fixtures.
    generator.repositories().graph_nodes.find_by_id(id).await.ok().flatten()
}

// ============================================================================
// SCRIPTED LLM
// ============================================================================

/// Deterministic stand-in for the chat model. Pops scripted replies in
/// order; an empty script or `failing()` yields transport errors.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    fail: bool,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn with_replies(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            fail: false,
            calls: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fail: true,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(&self, _request: ChatRequest) -> LlmResult<String> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(LlmError::Transport("scripted failure".into()));
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".into()))
    }

    async fn create_embedding(&self, text: &str, _model: &str) -> LlmResult<Vec<f64>> {
        if self.fail {
            return Err(LlmError::Transport("scripted failure".into()));
        }
        // Stable toy embedding: character histogram over three buckets.
        let mut vector = vec![0.0; 3];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 3] += f64::from(byte) / 255.0;
        }
        Ok(vector)
    }

    async fn close(&self) {}
}
