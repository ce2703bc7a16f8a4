//! Skill progression: unlock, xp, levels, perks, checks.

use rand::rngs::StdRng;
use rand::Rng;

use game_database::Repositories;
use game_domain::{
    EntityId, Perk, SkillCheck, SkillEvent, SkillSet, UnlockMethod,
};

use crate::error::{EngineError, EngineResult};

/// Cumulative xp required to reach `level`: `100 × level^1.5`.
pub fn xp_threshold(level: u32) -> u64 {
    (100.0 * f64::from(level).powf(1.5)).floor() as u64
}

/// Failed attempts still teach a fifth of the lesson.
pub fn xp_gain(base: u64, success: bool) -> u64 {
    if success {
        base
    } else {
        base / 5
    }
}

/// `d20 + effective_level/2` against a difficulty.
pub fn check_skill(
    rng: &mut StdRng,
    skills: &SkillSet,
    equipment_bonus: i32,
    skill: &str,
    difficulty: i32,
) -> SkillCheck {
    let effective = effective_level(skills, equipment_bonus, skill);
    let roll = rng.random_range(1..=20) + effective / 2;
    SkillCheck {
        success: roll >= difficulty,
        roll,
        margin: roll - difficulty,
    }
}

/// Base level plus perk and equipment bonuses.
pub fn effective_level(skills: &SkillSet, equipment_bonus: i32, skill: &str) -> i32 {
    let Some(state) = skills.get(skill) else {
        return equipment_bonus;
    };
    let perk_bonus: i32 = state.perks.iter().map(|p| p.level_bonus).sum();
    state.level as i32 + perk_bonus + equipment_bonus
}

/// Unlock a skill at level 1. A second unlock changes nothing.
pub async fn unlock(
    repos: &Repositories,
    entity: EntityId,
    skills: &mut SkillSet,
    skill: &str,
    method: UnlockMethod,
) -> EngineResult<bool> {
    if skills.is_unlocked(skill) {
        return Ok(false);
    }
    let state = skills.entry(skill);
    state.unlocked = true;
    state.level = state.level.max(1);

    let event = SkillEvent::Unlocked {
        skill: skill.to_string(),
        method,
    };
    repos.skills.append_event(entity, &event).await?;
    repos.skill_components.save(entity, skills).await?;
    tracing::info!(%entity, skill, "skill unlocked");
    Ok(true)
}

/// Add xp to an unlocked skill, levelling through any crossed thresholds.
/// Every 10th level banks a perk choice. Returns gained xp and new level.
pub async fn grant_xp(
    repos: &Repositories,
    entity: EntityId,
    skills: &mut SkillSet,
    skill: &str,
    gain: u64,
    success: bool,
) -> EngineResult<(u64, u32)> {
    if !skills.is_unlocked(skill) {
        return Err(EngineError::InvalidArgument(format!(
            "skill {skill} is not unlocked"
        )));
    }
    let state = skills.entry(skill);
    state.xp += gain;

    let mut events = vec![SkillEvent::XpGained {
        skill: skill.to_string(),
        amount: gain,
        success,
    }];
    while state.xp >= xp_threshold(state.level + 1) {
        state.level += 1;
        if state.level % 10 == 0 {
            state.pending_perk_choices += 1;
        }
        events.push(SkillEvent::LevelUp {
            skill: skill.to_string(),
            new_level: state.level,
        });
    }
    let new_level = state.level;

    for event in &events {
        repos.skills.append_event(entity, event).await?;
    }
    repos.skill_components.save(entity, skills).await?;
    Ok((gain, new_level))
}

/// Spend a banked perk choice.
pub async fn choose_perk(
    repos: &Repositories,
    entity: EntityId,
    skills: &mut SkillSet,
    skill: &str,
    perk_name: &str,
) -> EngineResult<()> {
    let state = skills
        .skills
        .get_mut(skill)
        .filter(|s| s.unlocked)
        .ok_or_else(|| EngineError::InvalidArgument(format!("skill {skill} is not unlocked")))?;
    if state.pending_perk_choices == 0 {
        return Err(EngineError::ConstraintViolated(format!(
            "no perk choice pending for {skill}"
        )));
    }
    state.pending_perk_choices -= 1;
    state.perks.push(Perk {
        name: perk_name.to_string(),
        level_bonus: 2,
    });

    let event = SkillEvent::PerkChosen {
        skill: skill.to_string(),
        perk: perk_name.to_string(),
    };
    repos.skills.append_event(entity, &event).await?;
    repos.skill_components.save(entity, skills).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::skill::skills as names;
    use rand::SeedableRng;

    #[test]
    fn thresholds_follow_the_curve() {
        assert_eq!(xp_threshold(1), 100);
        assert_eq!(xp_threshold(2), 282);
        assert_eq!(xp_threshold(4), 800);
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let (repos, _store) = testutil::repos();
        let entity = EntityId::new();
        let mut skills = SkillSet::default();

        assert!(unlock(&repos, entity, &mut skills, names::STEALTH, UnlockMethod::Training)
            .await
            .unwrap());
        let snapshot = skills.clone();
        assert!(!unlock(&repos, entity, &mut skills, names::STEALTH, UnlockMethod::Use)
            .await
            .unwrap());
        assert_eq!(skills, snapshot);
        assert_eq!(skills.get(names::STEALTH).unwrap().level, 1);
    }

    #[tokio::test]
    async fn xp_crossing_threshold_levels_up() {
        let (repos, _store) = testutil::repos();
        let entity = EntityId::new();
        let mut skills = SkillSet::default();
        unlock(&repos, entity, &mut skills, names::STEALTH, UnlockMethod::Training)
            .await
            .unwrap();

        // 250 xp is below the 282 needed for level 2.
        grant_xp(&repos, entity, &mut skills, names::STEALTH, 250, true)
            .await
            .unwrap();
        assert_eq!(skills.get(names::STEALTH).unwrap().level, 1);

        // 50 more crosses it.
        let (_, level) = grant_xp(&repos, entity, &mut skills, names::STEALTH, 50, true)
            .await
            .unwrap();
        assert_eq!(level, 2);

        let log = repos.skills.events_for(entity).await.unwrap();
        assert!(log
            .iter()
            .any(|e| matches!(e, SkillEvent::LevelUp { new_level: 2, .. })));
    }

    #[tokio::test]
    async fn tenth_level_banks_a_perk_choice() {
        let (repos, _store) = testutil::repos();
        let entity = EntityId::new();
        let mut skills = SkillSet::default();
        unlock(&repos, entity, &mut skills, names::PERCEPTION, UnlockMethod::Use)
            .await
            .unwrap();

        grant_xp(
            &repos,
            entity,
            &mut skills,
            names::PERCEPTION,
            xp_threshold(10),
            true,
        )
        .await
        .unwrap();
        let state = skills.get(names::PERCEPTION).unwrap();
        assert_eq!(state.level, 10);
        assert_eq!(state.pending_perk_choices, 1);

        choose_perk(&repos, entity, &mut skills, names::PERCEPTION, "Cat Eyes")
            .await
            .unwrap();
        let state = skills.get(names::PERCEPTION).unwrap();
        assert_eq!(state.pending_perk_choices, 0);
        assert_eq!(state.perks.len(), 1);

        // No second choice to spend.
        assert!(choose_perk(&repos, entity, &mut skills, names::PERCEPTION, "Again")
            .await
            .is_err());
    }

    #[test]
    fn margin_reflects_roll_minus_difficulty() {
        let mut skills = SkillSet::default();
        let state = skills.entry(names::PERSUASION);
        state.unlocked = true;
        state.level = 10;

        let mut rng = StdRng::seed_from_u64(9);
        let check = check_skill(&mut rng, &skills, 0, names::PERSUASION, 10);
        assert_eq!(check.margin, check.roll - 10);
        // Level 10 adds +5 to every roll, so the minimum is 6.
        assert!(check.roll >= 6);
    }

    #[test]
    fn failed_attempts_grant_a_fifth() {
        assert_eq!(xp_gain(100, true), 100);
        assert_eq!(xp_gain(100, false), 20);
    }
}
