//! Events emitted toward whatever front-end is listening.
//!
//! Emission is the last step of every handler, so observers always see
//! committed state.

use serde::{Deserialize, Serialize};

use crate::ids::QuestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// Second-person prose shown to the player.
    Narrative { text: String },
    System { text: String, level: SystemLevel },
    Combat { text: String, damage: Option<i32> },
    Quest { text: String, quest_id: Option<QuestId> },
    StatusUpdate {
        hp: i32,
        max_hp: i32,
        location: String,
    },
}

impl GameEvent {
    pub fn narrative(text: impl Into<String>) -> Self {
        GameEvent::Narrative { text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        GameEvent::System {
            text: text.into(),
            level: SystemLevel::Info,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        GameEvent::System {
            text: text.into(),
            level: SystemLevel::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        GameEvent::System {
            text: text.into(),
            level: SystemLevel::Error,
        }
    }
}
