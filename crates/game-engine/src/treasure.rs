//! Treasure rooms: take one piece and the others lock until it is
//! returned. Walking out holding the piece loots the room for good.

use game_domain::{
    InventoryComponent, ItemInstance, ItemTemplateId, PedestalState, TreasureRoomComponent,
};

use crate::error::{EngineError, EngineResult};

/// Take a pedestal item. Locks every other pedestal until it is returned.
pub fn take_item(
    room: &mut TreasureRoomComponent,
    inventory: &mut InventoryComponent,
    template_id: ItemTemplateId,
) -> EngineResult<String> {
    if room.has_been_looted {
        return Err(EngineError::ConstraintViolated(
            "the pedestals here are bare; this place has given all it will give".into(),
        ));
    }
    if room.currently_taken_item.is_some() {
        return Err(EngineError::ConstraintViolated(
            "you already hold the room's due; return it before taking another".into(),
        ));
    }
    let pedestal = room
        .pedestals
        .iter_mut()
        .find(|p| p.template_id == template_id)
        .ok_or_else(|| EngineError::NotFound("no such pedestal".into()))?;
    if pedestal.state != PedestalState::Available {
        return Err(EngineError::ConstraintViolated(
            "that pedestal refuses you".into(),
        ));
    }
    let item = pedestal
        .item
        .take()
        .ok_or_else(|| EngineError::ConstraintViolated("the pedestal stands empty".into()))?;
    if !inventory.can_add(&item) {
        pedestal.item = Some(item);
        return Err(EngineError::ConstraintViolated(
            "your pack cannot bear it".into(),
        ));
    }

    pedestal.state = PedestalState::Empty;
    let name = item.name.clone();
    inventory.items.push(item);
    room.currently_taken_item = Some(template_id);
    for other in room
        .pedestals
        .iter_mut()
        .filter(|p| p.template_id != template_id)
    {
        if other.state == PedestalState::Available {
            other.state = PedestalState::Locked;
        }
    }
    Ok(name)
}

/// Return the held item to its pedestal, reversing every lockout.
pub fn return_item(
    room: &mut TreasureRoomComponent,
    inventory: &mut InventoryComponent,
    template_id: ItemTemplateId,
) -> EngineResult<()> {
    if room.currently_taken_item != Some(template_id) {
        return Err(EngineError::ConstraintViolated(
            "that is not what this room is owed".into(),
        ));
    }
    let index = inventory
        .items
        .iter()
        .position(|i| i.template_id == template_id)
        .ok_or_else(|| EngineError::NotFound("you no longer carry it".into()))?;
    let item = inventory.items.remove(index);

    let pedestal = room
        .pedestals
        .iter_mut()
        .find(|p| p.template_id == template_id)
        .ok_or_else(|| EngineError::NotFound("no such pedestal".into()))?;
    pedestal.item = Some(item);
    pedestal.state = PedestalState::Available;
    room.currently_taken_item = None;
    for other in room.pedestals.iter_mut() {
        if other.state == PedestalState::Locked {
            other.state = PedestalState::Available;
        }
    }
    Ok(())
}

/// Leaving while holding the piece seals the bargain: the room counts as
/// looted and whatever remained on the pedestals is destroyed.
pub fn on_leave_room(room: &mut TreasureRoomComponent) -> Vec<ItemInstance> {
    if room.currently_taken_item.is_none() {
        return Vec::new();
    }
    room.has_been_looted = true;
    room.currently_taken_item = None;
    let mut forfeited = Vec::new();
    for pedestal in room.pedestals.iter_mut() {
        if let Some(item) = pedestal.item.take() {
            forfeited.push(item);
        }
        pedestal.state = PedestalState::Empty;
    }
    forfeited
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_domain::{ItemQuality, ItemTemplate, ItemType};

    fn three_pedestal_room() -> (TreasureRoomComponent, Vec<ItemTemplateId>) {
        let items: Vec<_> = ["Pale Crown", "Hollow Blade", "Last Lamp"]
            .iter()
            .map(|name| {
                ItemTemplate::basic(name, ItemType::Treasure, 100, 2)
                    .instantiate(ItemQuality::Exceptional)
            })
            .collect();
        let ids = items.iter().map(|i| i.template_id).collect();
        (TreasureRoomComponent::new(items), ids)
    }

    #[test]
    fn taking_locks_returning_unlocks_leaving_loots() {
        let (mut room, ids) = three_pedestal_room();
        let mut pack = InventoryComponent::with_capacity(50);

        // Take pedestal 1: it empties, 2 and 3 lock.
        take_item(&mut room, &mut pack, ids[0]).unwrap();
        assert_eq!(room.currently_taken_item, Some(ids[0]));
        assert_eq!(room.pedestal(ids[0]).unwrap().state, PedestalState::Empty);
        assert_eq!(room.pedestal(ids[1]).unwrap().state, PedestalState::Locked);
        assert_eq!(room.pedestal(ids[2]).unwrap().state, PedestalState::Locked);

        // While holding, the invariant holds: all others locked.
        for other in &ids[1..] {
            assert_ne!(room.pedestal(*other).unwrap().state, PedestalState::Available);
        }

        // Taking from a locked pedestal is a constraint violation.
        assert!(matches!(
            take_item(&mut room, &mut pack, ids[1]),
            Err(EngineError::ConstraintViolated(_))
        ));

        // Return: everything available again.
        return_item(&mut room, &mut pack, ids[0]).unwrap();
        assert_eq!(room.currently_taken_item, None);
        for id in &ids {
            assert_eq!(room.pedestal(*id).unwrap().state, PedestalState::Available);
        }

        // Take pedestal 2, then walk out with it.
        take_item(&mut room, &mut pack, ids[1]).unwrap();
        assert_eq!(room.pedestal(ids[0]).unwrap().state, PedestalState::Locked);
        assert_eq!(room.pedestal(ids[2]).unwrap().state, PedestalState::Locked);

        let forfeited = on_leave_room(&mut room);
        assert!(room.has_been_looted);
        assert_eq!(forfeited.len(), 2);

        // Nothing more to take, ever.
        assert!(matches!(
            take_item(&mut room, &mut pack, ids[2]),
            Err(EngineError::ConstraintViolated(_))
        ));
        assert!(pack.items.iter().any(|i| i.template_id == ids[1]));
    }

    #[test]
    fn overweight_pack_cannot_take() {
        let (mut room, ids) = three_pedestal_room();
        let mut pack = InventoryComponent::with_capacity(1);
        assert!(matches!(
            take_item(&mut room, &mut pack, ids[0]),
            Err(EngineError::ConstraintViolated(_))
        ));
        // Refusal left the room untouched.
        assert_eq!(room.currently_taken_item, None);
        assert_eq!(room.pedestal(ids[0]).unwrap().state, PedestalState::Available);
        assert!(room.pedestal(ids[0]).unwrap().item.is_some());
    }
}
