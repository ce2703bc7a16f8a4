//! Lazily materialized world generation.
//!
//! A chunk is born from a [`GenerationContext`]: lore varied from the
//! parent, a theme blend, a deterministic graph topology, and one stub
//! space per node. The cache serializes concurrent requests; the exit
//! linker and frontier expander grow the world at its edges.

pub mod cache;
pub mod exit_linker;
pub mod frontier;
pub mod generator;
pub mod graph;
pub mod init;
pub mod lore;

pub use cache::{CacheState, GenerationCache};
pub use generator::{GeneratedChunk, WorldGenerator};
pub use init::DungeonInitializer;

use game_domain::{ChunkId, ChunkLevel, Direction, WorldChunk};

/// Everything needed to generate one chunk. Carried in the cache while
/// generation is in flight.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Id the new chunk will be persisted under.
    pub chunk_id: ChunkId,
    pub level: ChunkLevel,
    pub parent: Option<WorldChunk>,
    /// Direction of travel from the parent, when expansion is directional.
    pub direction: Option<Direction>,
    pub global_lore: String,
    pub difficulty: u32,
    pub rng_seed: u64,
    pub boss_capable: bool,
}

impl GenerationContext {
    /// A parentless context; used for the seed world and in tests.
    pub fn root(chunk_id: ChunkId, rng_seed: u64) -> Self {
        Self {
            chunk_id,
            level: ChunkLevel::World,
            parent: None,
            direction: None,
            global_lore: String::new(),
            difficulty: 1,
            rng_seed,
            boss_capable: false,
        }
    }

    pub fn child_of(
        parent: &WorldChunk,
        chunk_id: ChunkId,
        direction: Option<Direction>,
        global_lore: String,
        rng_seed: u64,
    ) -> Self {
        Self {
            chunk_id,
            level: parent.level.child().unwrap_or(ChunkLevel::Subzone),
            direction,
            global_lore,
            difficulty: parent.difficulty_level + 1,
            boss_capable: parent.boss_capable,
            parent: Some(parent.clone()),
            rng_seed,
        }
    }
}
