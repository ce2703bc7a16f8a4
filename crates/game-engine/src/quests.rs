//! Quest tracking: objectives match action events, completion is
//! automatic once the last objective closes. Quests live on the player
//! state and persist with it.

use game_domain::{
    ActionEvent, EntityId, GameEvent, ObjectiveKind, PlayerState, Quest, QuestStatus,
};

/// A quest that just completed, for the disposition follow-up.
#[derive(Debug, Clone)]
pub struct CompletedQuest {
    pub quest_id: game_domain::QuestId,
    pub name: String,
    pub giver: Option<EntityId>,
}

/// Match one action against every active quest. Objectives needing
/// inventory verification check the player's actual pack.
pub fn update_quests_after_action(
    player: &mut PlayerState,
    action: &ActionEvent,
) -> (Vec<GameEvent>, Vec<CompletedQuest>) {
    let mut events = Vec::new();
    let mut completed = Vec::new();

    let inventory_count = |player: &PlayerState, template_id| {
        player
            .inventory
            .items
            .iter()
            .filter(|i| i.template_id == template_id)
            .count() as u32
    };

    // Collect objective progress first; the borrow on active_quests ends
    // before inventory checks need the player again.
    for quest_index in 0..player.active_quests.len() {
        let mut advanced = false;
        {
            let quest = &mut player.active_quests[quest_index];
            if quest.status != QuestStatus::Active {
                continue;
            }
            for objective in quest.objectives.iter_mut().filter(|o| !o.done) {
                match (&mut objective.kind, action) {
                    (
                        ObjectiveKind::KillNpc { target_name, count, progress },
                        ActionEvent::KillEnemy { name, .. },
                    ) if name.to_lowercase().contains(&target_name.to_lowercase()) => {
                        *progress += 1;
                        if progress >= count {
                            objective.done = true;
                        }
                        advanced = true;
                    }
                    (
                        ObjectiveKind::VisitRoom { space_id },
                        ActionEvent::ExploreRoom { space_id: visited },
                    ) if space_id == visited => {
                        objective.done = true;
                        advanced = true;
                    }
                    (
                        ObjectiveKind::TalkToNpc { npc_id },
                        ActionEvent::TalkToNpc { npc_id: talked },
                    ) if npc_id == talked => {
                        objective.done = true;
                        advanced = true;
                    }
                    (
                        ObjectiveKind::UseSkill { skill },
                        ActionEvent::UseSkill { skill: used },
                    ) if skill.eq_ignore_ascii_case(used) => {
                        objective.done = true;
                        advanced = true;
                    }
                    (
                        ObjectiveKind::DeliverItem { template_id, npc_id },
                        ActionEvent::DeliverItem { template_id: given, npc_id: to },
                    ) if template_id == given && npc_id == to => {
                        objective.done = true;
                        advanced = true;
                    }
                    _ => {}
                }
            }
        }

        // Collected-item objectives verify against the pack itself.
        if let ActionEvent::CollectItem { template_id } = action {
            let have = inventory_count(player, *template_id);
            let quest = &mut player.active_quests[quest_index];
            for objective in quest.objectives.iter_mut().filter(|o| !o.done) {
                if let ObjectiveKind::CollectItem { template_id: wanted, count } = &objective.kind {
                    if wanted == template_id && have >= *count {
                        objective.done = true;
                        advanced = true;
                    }
                }
            }
        }

        let quest = &mut player.active_quests[quest_index];
        if advanced && quest.all_objectives_done() {
            quest.status = QuestStatus::Completed;
            events.push(GameEvent::Quest {
                text: format!("Quest complete: {}.", quest.name),
                quest_id: Some(quest.id),
            });
            completed.push(CompletedQuest {
                quest_id: quest.id,
                name: quest.name.clone(),
                giver: quest.giver,
            });
        } else if advanced {
            events.push(GameEvent::Quest {
                text: format!("Progress on {}.", quest.name),
                quest_id: Some(quest.id),
            });
        }
    }

    (events, completed)
}

/// Claim a completed quest's reward: gold now, then the quest moves to
/// the completed list as CLAIMED.
pub fn claim_reward(player: &mut PlayerState, quest_id: game_domain::QuestId) -> Option<Quest> {
    let index = player
        .active_quests
        .iter()
        .position(|q| q.id == quest_id && q.status == QuestStatus::Completed)?;
    let mut quest = player.active_quests.remove(index);
    player.inventory.gold += quest.reward_gold;
    quest.status = QuestStatus::Claimed;
    player.completed_quests.push(quest.clone());
    Some(quest)
}

/// Abandon an active quest outright.
pub fn abandon(player: &mut PlayerState, quest_id: game_domain::QuestId) -> Option<Quest> {
    let index = player
        .active_quests
        .iter()
        .position(|q| q.id == quest_id && q.status == QuestStatus::Active)?;
    let mut quest = player.active_quests.remove(index);
    quest.status = QuestStatus::Abandoned;
    Some(quest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::{
        ItemQuality, ItemTemplate, ItemType, Objective, QuestId, SpaceId,
    };

    fn quest_with(objectives: Vec<Objective>) -> Quest {
        Quest {
            id: QuestId::new(),
            name: "Test Quest".into(),
            description: String::new(),
            giver: Some(EntityId::new()),
            status: QuestStatus::Active,
            objectives,
            reward_gold: 25,
            reward_items: Vec::new(),
        }
    }

    #[test]
    fn completing_the_last_objective_completes_the_quest() {
        let space = SpaceId::new();
        let mut player = testutil::player_at(space);
        player.active_quests.push(quest_with(vec![
            Objective {
                description: "kill".into(),
                kind: ObjectiveKind::KillNpc {
                    target_name: "Gloom Rat".into(),
                    count: 1,
                    progress: 0,
                },
                done: false,
            },
            Objective {
                description: "visit".into(),
                kind: ObjectiveKind::VisitRoom { space_id: space },
                done: false,
            },
        ]));

        let (_, completed) = update_quests_after_action(
            &mut player,
            &ActionEvent::KillEnemy {
                npc_id: EntityId::new(),
                name: "Gloom Rat".into(),
            },
        );
        assert!(completed.is_empty());
        assert_eq!(player.active_quests[0].status, QuestStatus::Active);

        let (events, completed) =
            update_quests_after_action(&mut player, &ActionEvent::ExploreRoom { space_id: space });
        assert_eq!(completed.len(), 1);
        assert_eq!(player.active_quests[0].status, QuestStatus::Completed);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Quest { text, .. } if text.contains("complete"))));
    }

    #[test]
    fn collect_objective_verifies_the_pack() {
        let mut player = testutil::player_at(SpaceId::new());
        let template = ItemTemplate::basic("Glowcap Spores", ItemType::Treasure, 18, 1);
        player.active_quests.push(quest_with(vec![Objective {
            description: "gather".into(),
            kind: ObjectiveKind::CollectItem {
                template_id: template.id,
                count: 2,
            },
            done: false,
        }]));

        // Claiming collection without the goods does nothing.
        let (_, completed) = update_quests_after_action(
            &mut player,
            &ActionEvent::CollectItem { template_id: template.id },
        );
        assert!(completed.is_empty());

        player.inventory.items.push(template.instantiate(ItemQuality::Common));
        player.inventory.items.push(template.instantiate(ItemQuality::Common));
        let (_, completed) = update_quests_after_action(
            &mut player,
            &ActionEvent::CollectItem { template_id: template.id },
        );
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn claim_moves_quest_and_pays_out() {
        let mut player = testutil::player_at(SpaceId::new());
        let mut quest = quest_with(vec![]);
        quest.status = QuestStatus::Completed;
        let id = quest.id;
        player.active_quests.push(quest);

        let claimed = claim_reward(&mut player, id).unwrap();
        assert_eq!(claimed.status, QuestStatus::Claimed);
        assert_eq!(player.gold(), 25);
        assert!(player.active_quests.is_empty());
        assert_eq!(player.completed_quests.len(), 1);

        // Claiming twice fails quietly.
        assert!(claim_reward(&mut player, id).is_none());
    }
}
