//! Treasure rooms: pick one, the rest lock.

use serde::{Deserialize, Serialize};

use crate::ids::ItemTemplateId;
use crate::item::ItemInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedestalState {
    Available,
    Locked,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pedestal {
    pub template_id: ItemTemplateId,
    pub item: Option<ItemInstance>,
    pub state: PedestalState,
}

/// Invariant: while `currently_taken_item` is set, every pedestal other
/// than the taken one is LOCKED. Returning the item reverses the lockout;
/// leaving the room while holding loots the room for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasureRoomComponent {
    pub pedestals: Vec<Pedestal>,
    pub currently_taken_item: Option<ItemTemplateId>,
    pub has_been_looted: bool,
}

impl TreasureRoomComponent {
    pub fn new(items: Vec<ItemInstance>) -> Self {
        Self {
            pedestals: items
                .into_iter()
                .map(|item| Pedestal {
                    template_id: item.template_id,
                    item: Some(item),
                    state: PedestalState::Available,
                })
                .collect(),
            currently_taken_item: None,
            has_been_looted: false,
        }
    }

    pub fn pedestal(&self, template_id: ItemTemplateId) -> Option<&Pedestal> {
        self.pedestals.iter().find(|p| p.template_id == template_id)
    }
}
