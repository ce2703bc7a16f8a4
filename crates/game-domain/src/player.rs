//! Player state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entity::Stats;
use crate::graph::EdgeKey;
use crate::ids::{EntityId, SpaceId};
use crate::item::{InventoryComponent, ItemInstance};
use crate::quest::Quest;
use crate::skill::SkillSet;

pub const PLAYER_BASE_HEALTH: i32 = 100;
pub const PLAYER_BASE_CAPACITY: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: EntityId,
    pub name: String,
    pub current_room_id: SpaceId,
    pub health: i32,
    pub max_health: i32,
    pub stats: Stats,
    pub inventory: InventoryComponent,
    pub equipped_weapon: Option<ItemInstance>,
    pub equipped_armor: Option<ItemInstance>,
    pub skills: SkillSet,
    pub active_quests: Vec<Quest>,
    pub completed_quests: Vec<Quest>,
    /// Hidden edges this player has scouted out.
    pub revealed_exits: HashSet<EdgeKey>,
}

impl PlayerState {
    /// A level-one character at the given space, with nothing on them.
    pub fn fresh(id: EntityId, name: impl Into<String>, starting_space: SpaceId) -> Self {
        Self {
            id,
            name: name.into(),
            current_room_id: starting_space,
            health: PLAYER_BASE_HEALTH,
            max_health: PLAYER_BASE_HEALTH,
            stats: Stats::default(),
            inventory: InventoryComponent::with_capacity(PLAYER_BASE_CAPACITY),
            equipped_weapon: None,
            equipped_armor: None,
            skills: SkillSet::default(),
            active_quests: Vec::new(),
            completed_quests: Vec::new(),
            revealed_exits: HashSet::new(),
        }
    }

    pub fn gold(&self) -> i64 {
        self.inventory.gold
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }

    pub fn armor_defense(&self) -> i32 {
        self.equipped_armor.as_ref().map(|a| a.armor_defense).unwrap_or(0)
    }
}
