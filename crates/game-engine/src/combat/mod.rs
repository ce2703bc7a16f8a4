//! Combat: attack resolution, NPC decisions, corpses, and death.

pub mod corpse;
pub mod death;
pub mod monster_ai;
pub mod resolver;

pub use monster_ai::{MonsterAi, NpcAction};
pub use resolver::{resolve_attack, AttackOutcome, AttackerProfile, DefenderProfile};
