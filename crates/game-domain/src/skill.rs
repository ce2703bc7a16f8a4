//! Per-entity skill state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Well-known skill names. Skills are open-ended strings; these are the
/// ones the engine itself rolls against.
pub mod skills {
    pub const PERCEPTION: &str = "Perception";
    pub const STEALTH: &str = "Stealth";
    pub const PERSUASION: &str = "Persuasion";
    pub const INTIMIDATION: &str = "Intimidation";
    pub const LOCKPICKING: &str = "Lockpicking";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perk {
    pub name: String,
    /// Flat bonus to effective level.
    pub level_bonus: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillState {
    pub level: u32,
    pub xp: u64,
    pub unlocked: bool,
    pub perks: Vec<Perk>,
    /// Perk picks earned (every 10th level) but not yet spent.
    pub pending_perk_choices: u32,
}

impl Default for SkillState {
    fn default() -> Self {
        Self {
            level: 0,
            xp: 0,
            unlocked: false,
            perks: Vec::new(),
            pending_perk_choices: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkillSet {
    pub skills: HashMap<String, SkillState>,
}

impl SkillSet {
    pub fn get(&self, skill: &str) -> Option<&SkillState> {
        self.skills.get(skill)
    }

    pub fn entry(&mut self, skill: &str) -> &mut SkillState {
        self.skills.entry(skill.to_string()).or_default()
    }

    pub fn is_unlocked(&self, skill: &str) -> bool {
        self.skills.get(skill).map(|s| s.unlocked).unwrap_or(false)
    }
}

/// How a skill came to be unlocked or trained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockMethod {
    Use,
    Training,
    Quest,
}

/// Append-only skill event log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkillEvent {
    Unlocked {
        skill: String,
        method: UnlockMethod,
    },
    XpGained {
        skill: String,
        amount: u64,
        success: bool,
    },
    LevelUp {
        skill: String,
        new_level: u32,
    },
    PerkChosen {
        skill: String,
        perk: String,
    },
}

/// Outcome of a skill check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCheck {
    pub success: bool,
    pub roll: i32,
    pub margin: i32,
}
