//! Quests and the action events objectives match against.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, ItemTemplateId, QuestId, SpaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    Available,
    Active,
    Completed,
    Claimed,
    Abandoned,
}

/// What an objective is waiting for. Counted objectives track progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    KillNpc { target_name: String, count: u32, progress: u32 },
    CollectItem { template_id: ItemTemplateId, count: u32 },
    VisitRoom { space_id: SpaceId },
    TalkToNpc { npc_id: EntityId },
    UseSkill { skill: String },
    DeliverItem { template_id: ItemTemplateId, npc_id: EntityId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub description: String,
    pub kind: ObjectiveKind,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub name: String,
    pub description: String,
    /// Quest giver gets a disposition bump when the quest completes.
    pub giver: Option<EntityId>,
    pub status: QuestStatus,
    pub objectives: Vec<Objective>,
    pub reward_gold: i64,
    pub reward_items: Vec<ItemTemplateId>,
}

impl Quest {
    pub fn all_objectives_done(&self) -> bool {
        !self.objectives.is_empty() && self.objectives.iter().all(|o| o.done)
    }
}

/// Things a player action did, fed to the quest tracker after every
/// handled intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionEvent {
    KillEnemy { npc_id: EntityId, name: String },
    CollectItem { template_id: ItemTemplateId },
    ExploreRoom { space_id: SpaceId },
    TalkToNpc { npc_id: EntityId },
    UseSkill { skill: String },
    DeliverItem { template_id: ItemTemplateId, npc_id: EntityId },
}
