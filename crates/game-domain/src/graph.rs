//! The navigable micro-graph inside a subzone.
//!
//! Nodes correspond one-to-one with spaces; edges are owned by the source
//! node and reference the target by id, which keeps the inherently cyclic
//! world graph representable without ownership cycles.

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::ids::{ChunkId, SpaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Hub,
    Corridor,
    DeadEnd,
    /// Neighbor chunk not yet generated; entering triggers expansion.
    Frontier,
    Boss,
    Town,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub target: SpaceId,
    pub direction: Direction,
    pub hidden: bool,
    pub hidden_difficulty: Option<u32>,
}

impl EdgeData {
    pub fn open(target: SpaceId, direction: Direction) -> Self {
        Self {
            target,
            direction,
            hidden: false,
            hidden_difficulty: None,
        }
    }

    pub fn hidden(target: SpaceId, direction: Direction, difficulty: u32) -> Self {
        Self {
            target,
            direction,
            hidden: true,
            hidden_difficulty: Some(difficulty),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Same id as the space this node renders as.
    pub id: SpaceId,
    pub node_type: NodeType,
    pub neighbors: Vec<EdgeData>,
    pub chunk_id: ChunkId,
}

impl GraphNode {
    pub fn new(id: SpaceId, node_type: NodeType, chunk_id: ChunkId) -> Self {
        Self {
            id,
            node_type,
            neighbors: Vec::new(),
            chunk_id,
        }
    }

    pub fn edge_in(&self, direction: &Direction) -> Option<&EdgeData> {
        let wanted = direction.normalized();
        self.neighbors
            .iter()
            .find(|e| e.direction.normalized() == wanted)
    }

    pub fn has_direction(&self, direction: &Direction) -> bool {
        self.edge_in(direction).is_some()
    }

    /// Cardinal directions with no outgoing edge yet.
    pub fn free_cardinals(&self) -> Vec<Direction> {
        Direction::CARDINALS
            .into_iter()
            .filter(|d| !self.has_direction(d))
            .collect()
    }
}

/// Identifies one directed edge for the player's revealed-exit set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub space: SpaceId,
    pub direction: String,
}

impl EdgeKey {
    pub fn new(space: SpaceId, direction: &Direction) -> Self {
        Self {
            space,
            direction: direction.normalized(),
        }
    }
}
