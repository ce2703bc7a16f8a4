//! Corpse lifecycle: creation on death, decay ticking, looting.

use game_database::Repositories;
use game_domain::{
    CorpseEntity, Entity, EntityId, GameEvent, GameTime, InventoryComponent, ItemInstance, Npc,
    SpaceId,
};

use crate::error::{EngineError, EngineResult};

/// Corpse entities the engine is currently decaying, by location.
pub type TrackedCorpses = Vec<(EntityId, SpaceId)>;

/// Replace a dead NPC with its corpse: loot comes from its inventory,
/// the NPC entity goes away, and the respawn clock starts if it has one.
pub async fn handle_npc_death(
    repos: &Repositories,
    tracked: &mut TrackedCorpses,
    npc: &Npc,
    space_id: SpaceId,
    now: GameTime,
    decay_timer: u32,
) -> EngineResult<Vec<GameEvent>> {
    let loot = repos
        .inventories
        .find_by_entity_id(npc.id)
        .await?
        .unwrap_or_else(|| InventoryComponent::with_capacity(0));

    let corpse = CorpseEntity {
        id: EntityId::new(),
        name: format!("corpse of {}", npc.name),
        decay_timer,
        contents: loot.items,
        gold_amount: loot.gold,
    };
    let corpse_id = corpse.id;

    let mut space = repos
        .spaces
        .find_by_id(space_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("space {space_id}")))?;
    space.entities.retain(|e| *e != npc.id);
    space.entities.push(corpse_id);

    repos.entities.save(&Entity::Corpse(corpse)).await?;
    repos.spaces.save(&space).await?;
    repos.entities.delete(npc.id).await?;
    repos.inventories.delete(npc.id).await?;
    if let Err(e) = repos.respawns.mark_killed(npc.id, now).await {
        // Not every NPC respawns.
        tracing::debug!(npc = %npc.id, error = %e, "no respawn entry to mark");
    }
    tracked.push((corpse_id, space_id));

    tracing::info!(npc = %npc.name, space = %space_id, "npc died, corpse placed");
    Ok(vec![GameEvent::Combat {
        text: format!("The {} collapses into the dust it came from.", npc.name),
        damage: None,
    }])
}

/// Advance corpse decay by `delta` ticks. Expired corpses are destroyed
/// with their contents; a summary event is emitted per space. Returns the
/// destroyed items for conservation accounting.
pub async fn tick_decay(
    repos: &Repositories,
    tracked: &mut TrackedCorpses,
    delta: GameTime,
    now: GameTime,
) -> EngineResult<(Vec<GameEvent>, Vec<ItemInstance>)> {
    let mut events = Vec::new();
    let mut destroyed = Vec::new();
    let mut kept = TrackedCorpses::new();

    for (corpse_id, space_id) in tracked.drain(..) {
        let Some(Entity::Corpse(mut corpse)) = repos.entities.find_by_id(corpse_id).await? else {
            continue;
        };
        corpse.decay_timer = corpse.decay_timer.saturating_sub(delta.min(u32::MAX as u64) as u32);
        if corpse.decay_timer > 0 {
            repos.entities.save(&Entity::Corpse(corpse)).await?;
            kept.push((corpse_id, space_id));
            continue;
        }

        // Gone, along with everything it held.
        if let Some(mut space) = repos.spaces.find_by_id(space_id).await? {
            space.entities.retain(|e| *e != corpse_id);
            repos.spaces.save(&space).await?;
        }
        repos.entities.delete(corpse_id).await?;
        let item_count = corpse.contents.len();
        destroyed.extend(corpse.contents);
        events.push(GameEvent::info(format!(
            "The {} crumbles away{}.",
            corpse.name,
            if item_count > 0 {
                format!(", taking {item_count} item(s) with it")
            } else {
                String::new()
            }
        )));
    }
    *tracked = kept;

    // Recoverable player corpses expire on the absolute clock.
    for expired in repos.corpses.find_expired(now).await? {
        destroyed.extend(expired.inventory.iter().cloned());
        destroyed.extend(expired.equipment.iter().cloned());
        repos.corpses.delete(expired.id).await?;
        events.push(GameEvent::info(
            "Somewhere below, the dark finishes what it started: an old corpse is gone.",
        ));
    }

    Ok((events, destroyed))
}

/// Move a corpse's contents into the player's pack, capacity permitting.
/// Gold always transfers; items that do not fit stay on the corpse.
pub fn loot_into(
    inventory: &mut InventoryComponent,
    contents: &mut Vec<ItemInstance>,
    gold: &mut i64,
) -> (Vec<String>, bool) {
    let mut taken = Vec::new();
    let mut remaining = Vec::new();
    let mut overflow = false;
    for item in contents.drain(..) {
        if inventory.can_add(&item) {
            taken.push(item.name.clone());
            inventory.items.push(item);
        } else {
            overflow = true;
            remaining.push(item);
        }
    }
    *contents = remaining;
    inventory.gold += *gold;
    *gold = 0;
    (taken, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::{ItemQuality, ItemTemplate, ItemType, Space};

    #[tokio::test]
    async fn decay_destroys_exactly_the_expired_corpse_contents() {
        let (repos, _store) = testutil::repos();
        let space = Space::stub(game_domain::SpaceId::new(), game_domain::ChunkId::new(), "pit");
        repos.spaces.save(&space).await.unwrap();

        let template = ItemTemplate::basic("Bone Charm", ItemType::Treasure, 4, 1);
        let items: Vec<ItemInstance> = (0..3)
            .map(|_| template.instantiate(ItemQuality::Common))
            .collect();

        let mut npc = Npc::new("Gloom Rat", 8);
        npc.health = 0;
        let mut inventory = InventoryComponent::with_capacity(20);
        inventory.items = items.clone();
        inventory.gold = 5;
        repos.inventories.save(npc.id, &inventory).await.unwrap();
        repos.entities.save(&Entity::Npc(npc.clone())).await.unwrap();
        let mut space = repos.spaces.find_by_id(space.id).await.unwrap().unwrap();
        space.entities.push(npc.id);
        repos.spaces.save(&space).await.unwrap();

        let mut tracked = TrackedCorpses::new();
        handle_npc_death(&repos, &mut tracked, &npc, space.id, 0, 10)
            .await
            .unwrap();
        assert_eq!(tracked.len(), 1);

        // Not yet expired after 9 ticks.
        let (_, destroyed) = tick_decay(&repos, &mut tracked, 9, 9).await.unwrap();
        assert!(destroyed.is_empty());

        // The 10th tick destroys corpse and contents together.
        let (events, destroyed) = tick_decay(&repos, &mut tracked, 1, 10).await.unwrap();
        assert!(tracked.is_empty());
        assert!(!events.is_empty());
        let mut destroyed_ids: Vec<_> = destroyed.iter().map(|i| i.id).collect();
        let mut expected_ids: Vec<_> = items.iter().map(|i| i.id).collect();
        destroyed_ids.sort();
        expected_ids.sort();
        assert_eq!(destroyed_ids, expected_ids);

        // The space no longer holds the corpse.
        let space = repos.spaces.find_by_id(space.id).await.unwrap().unwrap();
        assert!(space.entities.is_empty());
    }

    #[test]
    fn looting_respects_capacity_and_moves_gold() {
        let template = ItemTemplate::basic("Iron Ingot", ItemType::Misc, 2, 6);
        let mut contents = vec![
            template.instantiate(ItemQuality::Common),
            template.instantiate(ItemQuality::Common),
        ];
        let mut gold = 30;
        let mut inventory = InventoryComponent::with_capacity(8);

        let (taken, overflow) = loot_into(&mut inventory, &mut contents, &mut gold);
        assert_eq!(taken.len(), 1);
        assert!(overflow);
        assert_eq!(contents.len(), 1);
        assert_eq!(inventory.gold, 30);
        assert_eq!(gold, 0);
    }
}
