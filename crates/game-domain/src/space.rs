//! Leaf rooms.
//!
//! A space is created stub-first when its chunk is generated and filled
//! with prose on first visit. Exits mirror the graph edges, plus
//! placeholders the description pass may introduce; the exit linker
//! resolves those into real targets.

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::ids::{ChunkId, EntityId, SpaceId};
use crate::item::ItemInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerrainType {
    Cavern,
    Tunnel,
    Chamber,
    Crevasse,
    FungalGrove,
    Ruins,
    Waterway,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStack {
    pub name: String,
    pub quantity: u32,
}

/// Where an exit leads. Placeholders are produced by generation and are
/// resolved by the exit linker before the player can use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitTarget {
    Space(SpaceId),
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub direction: Direction,
    pub target: ExitTarget,
    pub hidden: bool,
    pub hidden_difficulty: Option<u32>,
}

impl Exit {
    pub fn open(direction: Direction, target: SpaceId) -> Self {
        Self {
            direction,
            target: ExitTarget::Space(target),
            hidden: false,
            hidden_difficulty: None,
        }
    }

    pub fn placeholder(direction: Direction) -> Self {
        Self {
            direction,
            target: ExitTarget::Placeholder,
            hidden: false,
            hidden_difficulty: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.target == ExitTarget::Placeholder
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub chunk_id: ChunkId,
    pub name: String,
    pub description: String,
    pub terrain_type: TerrainType,
    /// 0..=100; 0 is pitch black.
    pub brightness: u8,
    pub entities: Vec<EntityId>,
    pub resources: Vec<ResourceStack>,
    pub items_dropped: Vec<ItemInstance>,
    pub exits: Vec<Exit>,
    /// Set on stubs and after failed description fills; cleared once the
    /// LLM pass succeeds.
    pub description_stale: bool,
}

impl Space {
    pub fn stub(id: SpaceId, chunk_id: ChunkId, name: impl Into<String>) -> Self {
        Self {
            id,
            chunk_id,
            name: name.into(),
            description: String::new(),
            terrain_type: TerrainType::Tunnel,
            brightness: 20,
            entities: Vec::new(),
            resources: Vec::new(),
            items_dropped: Vec::new(),
            exits: Vec::new(),
            description_stale: true,
        }
    }

    pub fn exit_in(&self, direction: &Direction) -> Option<&Exit> {
        let wanted = direction.normalized();
        self.exits
            .iter()
            .find(|e| e.direction.normalized() == wanted)
    }
}
