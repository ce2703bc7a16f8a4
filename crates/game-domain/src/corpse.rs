//! Player corpse records.

use serde::{Deserialize, Serialize};

use crate::ids::{CorpseId, EntityId, SpaceId};
use crate::item::ItemInstance;
use crate::GameTime;

/// Everything the player was carrying when they died, recoverable until
/// the decay deadline passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpseData {
    pub id: CorpseId,
    pub player_id: EntityId,
    pub space_id: SpaceId,
    pub inventory: Vec<ItemInstance>,
    pub equipment: Vec<ItemInstance>,
    pub gold: i64,
    /// Absolute game time at which the corpse is destroyed.
    pub decay_timer: GameTime,
    pub looted: bool,
}
