//! Disposition state and the social event log.

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::GameTime;

pub const DISPOSITION_MIN: i32 = -100;
pub const DISPOSITION_MAX: i32 = 100;

/// Discretization of the -100..=100 disposition integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DispositionTier {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Allied,
}

impl DispositionTier {
    pub fn from_value(value: i32) -> Self {
        if value >= 75 {
            DispositionTier::Allied
        } else if value > 25 {
            DispositionTier::Friendly
        } else if value >= -25 {
            DispositionTier::Neutral
        } else if value > -75 {
            DispositionTier::Unfriendly
        } else {
            DispositionTier::Hostile
        }
    }

    /// Buy-price multiplier. Hostile merchants usually refuse outright;
    /// the 1.5 figure applies when they deign to sell.
    pub fn price_modifier(self) -> f64 {
        match self {
            DispositionTier::Allied => 0.7,
            DispositionTier::Friendly => 0.85,
            DispositionTier::Neutral => 1.0,
            DispositionTier::Unfriendly => 1.15,
            DispositionTier::Hostile => 1.5,
        }
    }

    /// Training xp multiplier, for tiers that allow training at all.
    pub fn training_multiplier(self) -> Option<f64> {
        match self {
            DispositionTier::Allied => Some(2.5),
            DispositionTier::Friendly => Some(2.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for DispositionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispositionTier::Hostile => "hostile",
            DispositionTier::Unfriendly => "unfriendly",
            DispositionTier::Neutral => "neutral",
            DispositionTier::Friendly => "friendly",
            DispositionTier::Allied => "allied",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialComponent {
    /// Clamped to [-100, 100] by every update path.
    pub disposition: i32,
    /// Skills this NPC will teach at FRIENDLY or better.
    pub teachable_skills: Vec<String>,
}

impl SocialComponent {
    pub fn with_disposition(disposition: i32) -> Self {
        Self {
            disposition: disposition.clamp(DISPOSITION_MIN, DISPOSITION_MAX),
            teachable_skills: Vec::new(),
        }
    }

    pub fn tier(&self) -> DispositionTier {
        DispositionTier::from_value(self.disposition)
    }
}

/// Events that move disposition. Deltas are decided by the disposition
/// engine; the record stores what was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispositionEvent {
    PersuasionAttempt { success: bool, margin: i32 },
    IntimidationAttempt { success: bool, margin: i32 },
    QuestCompleted,
    AttackedWithoutProvocation,
    HelpProvided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialEventRecord {
    pub npc_id: EntityId,
    pub event: DispositionEvent,
    pub delta: i32,
    pub disposition_after: i32,
    pub at_tick: GameTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(DispositionTier::from_value(-100), DispositionTier::Hostile);
        assert_eq!(DispositionTier::from_value(-75), DispositionTier::Hostile);
        assert_eq!(DispositionTier::from_value(-74), DispositionTier::Unfriendly);
        assert_eq!(DispositionTier::from_value(-25), DispositionTier::Neutral);
        assert_eq!(DispositionTier::from_value(25), DispositionTier::Neutral);
        assert_eq!(DispositionTier::from_value(26), DispositionTier::Friendly);
        assert_eq!(DispositionTier::from_value(75), DispositionTier::Allied);
        assert_eq!(DispositionTier::from_value(100), DispositionTier::Allied);
    }
}
