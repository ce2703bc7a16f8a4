//! Disposition engine: tiers, event deltas, de-escalation, tone, pricing.

use game_database::Repositories;
use game_domain::{
    DispositionEvent, DispositionTier, EntityId, GameTime, SocialComponent, SocialEventRecord,
    DISPOSITION_MAX, DISPOSITION_MIN,
};

use crate::error::EngineResult;
use crate::scheduler::TurnQueue;

/// How far each event moves an NPC's disposition. Successful persuasion
/// and intimidation scale with the check margin, banded so a scraped pass
/// still counts and a crushing one does not rewrite a relationship.
pub fn delta_for(event: &DispositionEvent) -> i32 {
    match event {
        DispositionEvent::PersuasionAttempt { success: true, margin } => (*margin).clamp(1, 20),
        DispositionEvent::PersuasionAttempt { success: false, .. } => -5,
        DispositionEvent::IntimidationAttempt { success: true, margin } => (*margin).clamp(5, 15),
        DispositionEvent::IntimidationAttempt { success: false, .. } => -10,
        DispositionEvent::QuestCompleted => 15,
        DispositionEvent::AttackedWithoutProvocation => -100,
        DispositionEvent::HelpProvided => 20,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AppliedDisposition {
    pub delta: i32,
    pub disposition: i32,
    pub tier: DispositionTier,
    /// The event cooled an engaged NPC back below hostility.
    pub de_escalated: bool,
}

/// Apply a disposition event: clamp, persist, log, and de-escalate when
/// the NPC comes up to NEUTRAL or better while queued for combat.
pub async fn apply_event(
    repos: &Repositories,
    queue: &mut TurnQueue,
    npc_id: EntityId,
    event: DispositionEvent,
    now: GameTime,
) -> EngineResult<AppliedDisposition> {
    let mut social = repos
        .social_components
        .load(npc_id)
        .await?
        .unwrap_or_else(|| SocialComponent::with_disposition(0));

    let delta = delta_for(&event);
    social.disposition = (social.disposition + delta).clamp(DISPOSITION_MIN, DISPOSITION_MAX);
    let tier = social.tier();

    repos.social_components.save(npc_id, &social).await?;
    repos
        .social_events
        .append(&SocialEventRecord {
            npc_id,
            event,
            delta,
            disposition_after: social.disposition,
            at_tick: now,
        })
        .await?;

    // Combat de-escalation: a mollified NPC stands down.
    let mut de_escalated = false;
    if tier >= DispositionTier::Neutral && queue.contains(npc_id) {
        queue.remove(npc_id);
        if let Some(mut entity) = repos.entities.find_by_id(npc_id).await? {
            if let Some(npc) = entity.as_npc_mut() {
                npc.clear_combat();
                npc.is_hostile = false;
            }
            repos.entities.save(&entity).await?;
        }
        de_escalated = true;
        tracing::info!(npc = %npc_id, disposition = social.disposition, "combat de-escalated");
    }

    Ok(AppliedDisposition {
        delta,
        disposition: social.disposition,
        tier,
        de_escalated,
    })
}

/// Tone instructions handed to the narrator for NPC speech.
pub fn dialogue_tone(tier: DispositionTier) -> &'static str {
    match tier {
        DispositionTier::Hostile => {
            "Speak in threats or refuse to speak at all. No help is offered."
        }
        DispositionTier::Unfriendly => "Curt, suspicious, one sentence at a time.",
        DispositionTier::Neutral => "Businesslike. Answers questions, volunteers nothing.",
        DispositionTier::Friendly => "Warm and forthcoming, happy to give advice.",
        DispositionTier::Allied => "Confiding; shares secrets and worries as with family.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::{Component, CombatComponent, Entity, Npc};
    use proptest::prelude::*;

    #[tokio::test]
    async fn persuasion_then_help_de_escalates_at_neutral() {
        let (repos, _store) = testutil::repos();
        let mut queue = TurnQueue::new();

        let mut npc = Npc::new("Hollow Sentinel", 22);
        npc.is_hostile = true;
        npc.insert_component(Component::Social(SocialComponent::with_disposition(-100)));
        npc.insert_component(Component::Combat(CombatComponent {
            target: EntityId::new(),
            engaged_since: 0,
            defending_until: None,
        }));
        let npc_id = npc.id;
        repos
            .social_components
            .save(npc_id, npc.social().unwrap())
            .await
            .unwrap();
        repos.entities.save(&Entity::Npc(npc)).await.unwrap();
        queue.enqueue(npc_id, 10);

        // A successful persuasion with margin 8 moves -100 to -92: still
        // hostile, still queued.
        let applied = apply_event(
            &repos,
            &mut queue,
            npc_id,
            DispositionEvent::PersuasionAttempt { success: true, margin: 8 },
            5,
        )
        .await
        .unwrap();
        assert_eq!(applied.disposition, -92);
        assert_eq!(applied.tier, DispositionTier::Hostile);
        assert!(queue.contains(npc_id));
        assert!(!applied.de_escalated);

        // Repeated help climbs to -12 (NEUTRAL): dequeued, combat cleared.
        let mut last = applied;
        for _ in 0..4 {
            last = apply_event(&repos, &mut queue, npc_id, DispositionEvent::HelpProvided, 6)
                .await
                .unwrap();
        }
        assert_eq!(last.disposition, -12);
        assert_eq!(last.tier, DispositionTier::Neutral);
        assert!(last.de_escalated);
        assert!(!queue.contains(npc_id));

        let entity = repos.entities.find_by_id(npc_id).await.unwrap().unwrap();
        let npc = entity.as_npc().unwrap();
        assert!(npc.combat().is_none());
        assert!(!npc.is_hostile);

        // The event log recorded every step.
        let log = repos.social_events.for_npc(npc_id).await.unwrap();
        assert_eq!(log.len(), 5);
        assert_eq!(log.last().unwrap().disposition_after, -12);
    }

    #[tokio::test]
    async fn unprovoked_attack_bottoms_out_disposition() {
        let (repos, _store) = testutil::repos();
        let mut queue = TurnQueue::new();
        let npc_id = EntityId::new();
        repos
            .social_components
            .save(npc_id, &SocialComponent::with_disposition(40))
            .await
            .unwrap();

        let applied = apply_event(
            &repos,
            &mut queue,
            npc_id,
            DispositionEvent::AttackedWithoutProvocation,
            0,
        )
        .await
        .unwrap();
        assert_eq!(applied.disposition, -60);

        let again = apply_event(
            &repos,
            &mut queue,
            npc_id,
            DispositionEvent::AttackedWithoutProvocation,
            1,
        )
        .await
        .unwrap();
        // Clamped at the floor.
        assert_eq!(again.disposition, -100);
    }

    proptest! {
        #[test]
        fn disposition_stays_clamped_under_any_event_sequence(
            start in -100i32..=100,
            events in proptest::collection::vec(0usize..7, 0..40),
        ) {
            let mut disposition = start;
            for pick in events {
                let event = match pick {
                    0 => DispositionEvent::PersuasionAttempt { success: true, margin: 18 },
                    1 => DispositionEvent::PersuasionAttempt { success: false, margin: -3 },
                    2 => DispositionEvent::IntimidationAttempt { success: true, margin: 9 },
                    3 => DispositionEvent::IntimidationAttempt { success: false, margin: -1 },
                    4 => DispositionEvent::QuestCompleted,
                    5 => DispositionEvent::AttackedWithoutProvocation,
                    _ => DispositionEvent::HelpProvided,
                };
                disposition = (disposition + delta_for(&event)).clamp(DISPOSITION_MIN, DISPOSITION_MAX);
                prop_assert!((-100..=100).contains(&disposition));
            }
        }
    }
}
