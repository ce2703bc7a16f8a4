//! The fixed command surface the dispatcher consumes.
//!
//! Free-text recognition happens upstream; by the time an `Intent`
//! reaches the engine it is fully structured.

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::ids::QuestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    Move { dir: Direction },
    Scout { dir: Direction },
    Travel { dir: Direction },
    Look { target: Option<String> },
    Search { target: Option<String> },
    Interact { target: String },
    Inventory,
    Take { target: String },
    TakeAll,
    Drop { target: String },
    Give { item: String, npc: String },
    Talk { npc: String },
    Say { message: String, npc: Option<String> },
    Attack { target: Option<String> },
    Equip { target: String },
    Use { target: String },
    Check { target: String },
    Persuade { target: String },
    Intimidate { target: String },
    Emote { kind: String, target: Option<String> },
    AskQuestion { npc: String, topic: String },
    UseSkill { skill: String, action: String },
    TrainSkill { skill: String, method: String },
    ChoosePerk { skill: String, choice: String },
    ViewSkills,
    Save { name: String },
    Load { name: String },
    Quests,
    AcceptQuest { id: QuestId },
    AbandonQuest { id: QuestId },
    ClaimReward { id: QuestId },
    Help,
    Quit,
    Rest,
    LootCorpse,
    Trade {
        action: TradeAction,
        target: Option<String>,
        quantity: u32,
        merchant: Option<String>,
    },
    Craft { recipe: String },
    Pickpocket { target: String },
    Invalid { message: String },
}
