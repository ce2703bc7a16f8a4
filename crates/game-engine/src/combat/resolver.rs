//! Attack resolution.
//!
//! Damage is `max(1, base + weapon + strength modifier - armor)`, doubled
//! on a natural 20, then shaved by the defender's typed resistance. The
//! resolver reports death; removing the entity is the corpse handler's
//! job.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;

use game_domain::{DamageType, ItemInstance, Npc, PlayerState};

/// Bare-handed damage before any bonuses.
pub const UNARMED_BASE_DAMAGE: i32 = 2;
/// NPCs claw and bite a little harder than an empty fist.
pub const NPC_BASE_DAMAGE: i32 = 3;

#[derive(Debug, Clone)]
pub struct AttackerProfile {
    pub name: String,
    pub base_damage: i32,
    pub weapon_bonus: i32,
    pub strength_mod: i32,
    pub damage_type: DamageType,
}

impl AttackerProfile {
    pub fn for_player(player: &PlayerState) -> Self {
        let (weapon_bonus, damage_type) = match &player.equipped_weapon {
            Some(w) => (w.attack_bonus, w.damage_type),
            None => (0, DamageType::Physical),
        };
        Self {
            name: player.name.clone(),
            base_damage: UNARMED_BASE_DAMAGE,
            weapon_bonus,
            strength_mod: player.stats.strength_mod(),
            damage_type,
        }
    }

    pub fn for_npc(npc: &Npc) -> Self {
        Self {
            name: npc.name.clone(),
            base_damage: NPC_BASE_DAMAGE,
            weapon_bonus: 0,
            strength_mod: npc.stats.strength_mod(),
            damage_type: DamageType::Physical,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DefenderProfile {
    pub name: String,
    pub armor_defense: i32,
    pub resistances: HashMap<DamageType, u32>,
    /// A defender that chose Defend halves the next incoming hit.
    pub defending: bool,
}

impl DefenderProfile {
    pub fn for_player(player: &PlayerState) -> Self {
        Self {
            name: player.name.clone(),
            armor_defense: player.armor_defense(),
            resistances: HashMap::new(),
            defending: false,
        }
    }

    pub fn for_npc(npc: &Npc, now: game_domain::GameTime) -> Self {
        let defending = npc
            .combat()
            .and_then(|c| c.defending_until)
            .is_some_and(|until| until > now);
        Self {
            name: npc.name.clone(),
            armor_defense: npc.armor,
            resistances: npc.resistances.clone(),
            defending,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttackOutcome {
    pub damage: i32,
    pub crit: bool,
    /// Defender health after the hit was at or below zero.
    pub died: bool,
    pub attack_roll: i32,
}

pub fn resolve_attack(
    rng: &mut StdRng,
    attacker: &AttackerProfile,
    defender: &DefenderProfile,
    defender_health: i32,
) -> AttackOutcome {
    let roll = rng.random_range(1..=20);
    let crit = roll == 20;

    let mut damage = (attacker.base_damage + attacker.weapon_bonus + attacker.strength_mod
        - defender.armor_defense)
        .max(1);
    if crit {
        damage *= 2;
    }
    if let Some(&level) = defender.resistances.get(&attacker.damage_type) {
        damage -= damage * (level as i32 / 2) / 100;
    }
    if defender.defending {
        damage = (damage / 2).max(1);
    }
    damage = damage.max(1);

    AttackOutcome {
        damage,
        crit,
        died: defender_health - damage <= 0,
        attack_roll: roll,
    }
}

/// Equip helper: swap the weapon or armor slot for an inventory item.
pub fn weapon_or_armor_slot(item: &ItemInstance) -> Option<Slot> {
    match item.item_type {
        game_domain::ItemType::Weapon => Some(Slot::Weapon),
        game_domain::ItemType::Armor => Some(Slot::Armor),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Weapon,
    Armor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn attacker(base: i32, weapon: i32, str_mod: i32) -> AttackerProfile {
        AttackerProfile {
            name: "attacker".into(),
            base_damage: base,
            weapon_bonus: weapon,
            strength_mod: str_mod,
            damage_type: DamageType::Physical,
        }
    }

    fn defender(armor: i32) -> DefenderProfile {
        DefenderProfile {
            name: "defender".into(),
            armor_defense: armor,
            resistances: HashMap::new(),
            defending: false,
        }
    }

    #[test]
    fn damage_never_drops_below_one() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let outcome = resolve_attack(&mut rng, &attacker(1, 0, -3), &defender(50), 100);
            assert!(outcome.damage >= 1);
        }
    }

    #[test]
    fn resistance_shaves_incoming_damage() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut resistant = defender(0);
        resistant.resistances.insert(DamageType::Physical, 50);
        // 50/2 = 25% reduction on a 12-damage hit = 9.
        loop {
            let outcome = resolve_attack(&mut rng, &attacker(12, 0, 0), &resistant, 100);
            if !outcome.crit {
                assert_eq!(outcome.damage, 9);
                break;
            }
        }
    }

    #[test]
    fn lethal_hit_reports_death_but_resolver_removes_nothing() {
        let mut rng = StdRng::seed_from_u64(5);
        let outcome = resolve_attack(&mut rng, &attacker(10, 5, 2), &defender(0), 3);
        assert!(outcome.died);
    }

    #[test]
    fn crit_doubles_before_resistance() {
        let mut rng = StdRng::seed_from_u64(0);
        // Walk the rng until a natural 20 shows up.
        loop {
            let outcome = resolve_attack(&mut rng, &attacker(6, 0, 0), &defender(0), 1_000);
            if outcome.crit {
                assert_eq!(outcome.damage, 12);
                break;
            }
        }
    }
}
