//! The hierarchical world tree.
//!
//! Chunks form a five-level tree (WORLD down to SPACE) with adjacency
//! shortcuts between siblings for horizontal linking. Back-references are
//! by id only; resolution goes through the chunk repository or the
//! generation cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::ids::{ChunkId, SpaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkLevel {
    World,
    Region,
    Zone,
    Subzone,
    Space,
}

impl ChunkLevel {
    /// The level one step down the hierarchy, if any.
    pub fn child(self) -> Option<ChunkLevel> {
        match self {
            ChunkLevel::World => Some(ChunkLevel::Region),
            ChunkLevel::Region => Some(ChunkLevel::Zone),
            ChunkLevel::Zone => Some(ChunkLevel::Subzone),
            ChunkLevel::Subzone => Some(ChunkLevel::Space),
            ChunkLevel::Space => None,
        }
    }
}

impl std::fmt::Display for ChunkLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChunkLevel::World => "world",
            ChunkLevel::Region => "region",
            ChunkLevel::Zone => "zone",
            ChunkLevel::Subzone => "subzone",
            ChunkLevel::Space => "space",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldChunk {
    pub id: ChunkId,
    pub level: ChunkLevel,
    /// Every chunk except the root has a parent whose `children` contains it.
    pub parent_id: Option<ChunkId>,
    pub children: Vec<ChunkId>,
    pub lore: String,
    pub biome_theme: String,
    /// Rough space count the generator aims for at the SUBZONE level.
    pub size_estimate: u32,
    /// 0.0..=1.0, how densely the generator seeds hostiles.
    pub mob_density: f32,
    pub difficulty_level: u32,
    /// Sibling shortcuts for horizontal exit linking.
    pub adjacency: HashMap<Direction, ChunkId>,
    /// Zones flagged here may receive a boss node in their subzone graphs.
    pub boss_capable: bool,
    /// Hub space of a subzone; where arrivals land.
    pub entry_space: Option<SpaceId>,
    /// Spaces owned by a subzone-level chunk.
    pub spaces: Vec<SpaceId>,
}

impl WorldChunk {
    pub fn new(level: ChunkLevel, parent_id: Option<ChunkId>) -> Self {
        Self {
            id: ChunkId::new(),
            level,
            parent_id,
            children: Vec::new(),
            lore: String::new(),
            biome_theme: String::new(),
            size_estimate: 6,
            mob_density: 0.3,
            difficulty_level: 1,
            adjacency: HashMap::new(),
            boss_capable: false,
            entry_space: None,
            spaces: Vec::new(),
        }
    }
}

/// Root bootstrap record. Losing this is fatal on boot (the starting space
/// must resolve); creating it is fatal if the save fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub starting_space_id: SpaceId,
    pub root_chunk_id: ChunkId,
    pub rng_seed: u64,
}
