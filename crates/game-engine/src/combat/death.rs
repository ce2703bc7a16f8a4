//! Player death and respawn.
//!
//! Death writes a recoverable corpse record carrying everything the
//! player had, then stands a fresh level-one character up at the town
//! with starter gear. The world around the corpse is untouched.

use game_database::Repositories;
use game_domain::{
    CorpseData, CorpseEntity, CorpseId, Entity, EntityId, GameEvent, GameTime, ItemQuality,
    PlayerState, SpaceId,
};

use crate::combat::corpse::TrackedCorpses;
use crate::error::EngineResult;
use crate::worldgen::init::STARTER_WEAPON;

pub async fn handle_player_death(
    repos: &Repositories,
    tracked: &mut TrackedCorpses,
    player: &mut PlayerState,
    now: GameTime,
    decay_after: GameTime,
    local_decay: u32,
    town_space: SpaceId,
) -> EngineResult<Vec<GameEvent>> {
    let equipment: Vec<_> = [player.equipped_weapon.take(), player.equipped_armor.take()]
        .into_iter()
        .flatten()
        .collect();
    let corpse = CorpseData {
        id: CorpseId::new(),
        player_id: player.id,
        space_id: player.current_room_id,
        inventory: std::mem::take(&mut player.inventory.items),
        equipment,
        gold: player.inventory.gold,
        decay_timer: now + decay_after,
        looted: false,
    };
    let died_at = corpse.space_id;
    repos.corpses.save(&corpse).await?;

    // A visible remnant in the room itself; the goods are on the corpse
    // record, this just marks where they fell.
    let marker = CorpseEntity {
        id: EntityId::new(),
        name: format!("corpse of {}", player.name),
        decay_timer: local_decay,
        contents: Vec::new(),
        gold_amount: 0,
    };
    let marker_id = marker.id;
    repos.entities.save(&Entity::Corpse(marker)).await?;
    if let Some(mut space) = repos.spaces.find_by_id(died_at).await? {
        space.entities.push(marker_id);
        repos.spaces.save(&space).await?;
    }
    tracked.push((marker_id, died_at));

    // Fresh start: same identity, nothing else carried over.
    let mut reborn = PlayerState::fresh(player.id, player.name.clone(), town_space);
    if let Some(dagger) = repos.items.find_template_by_name(STARTER_WEAPON).await? {
        reborn.equipped_weapon = Some(dagger.instantiate(ItemQuality::Poor));
    }
    *player = reborn;

    tracing::info!(player = %player.id, space = %died_at, "player died and respawned");
    Ok(vec![
        GameEvent::narrative(
            "The dark takes you. For a while there is nothing at all, and then lantern \
             light, and the worn stones of Lanterncross under your back. Someone dragged \
             you up the stair; everything you carried stayed below.",
        ),
        GameEvent::StatusUpdate {
            hp: player.health,
            max_hp: player.max_health,
            location: "Lanterncross Commons".into(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::worldgen::init::starter_templates;
    use game_domain::{EntityId, ItemType};

    #[tokio::test]
    async fn death_roundtrip_preserves_goods_on_the_corpse() {
        let (repos, _store) = testutil::repos();
        for template in starter_templates() {
            repos.items.save_template(&template).await.unwrap();
        }

        let town = SpaceId::new();
        let grave = SpaceId::new();
        let mut player = PlayerState::fresh(EntityId::new(), "Maro", grave);
        let sack = game_domain::ItemTemplate::basic("Sack of Bones", ItemType::Misc, 1, 2);
        for _ in 0..3 {
            player
                .inventory
                .items
                .push(sack.instantiate(ItemQuality::Common));
        }
        player.inventory.gold = 137;
        player.health = 0;

        let mut tracked = TrackedCorpses::new();
        let events = handle_player_death(&repos, &mut tracked, &mut player, 1_000, 5_000, 200, town)
            .await
            .unwrap();
        assert!(!events.is_empty());
        // The room keeps a visible remnant on the decay clock.
        assert_eq!(tracked.len(), 1);

        // The corpse sits where the player fell, holding everything.
        let corpses = repos.corpses.find_by_space_id(grave).await.unwrap();
        assert_eq!(corpses.len(), 1);
        let corpse = &corpses[0];
        assert_eq!(corpse.inventory.len(), 3);
        assert_eq!(corpse.gold, 137);
        assert_eq!(corpse.decay_timer, 6_000);
        assert!(!corpse.looted);

        // The reborn player: same identity, starter gear, nothing else.
        assert_eq!(player.name, "Maro");
        assert_eq!(player.current_room_id, town);
        assert_eq!(player.gold(), 0);
        assert!(player.inventory.items.is_empty());
        assert_eq!(
            player.equipped_weapon.as_ref().map(|w| w.name.as_str()),
            Some(STARTER_WEAPON)
        );
        assert_eq!(player.health, player.max_health);
    }
}
