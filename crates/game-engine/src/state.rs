//! The engine's runtime aggregate.

use std::collections::VecDeque;

use game_domain::{GameTime, PlayerState, Quest, SpaceId, WorldSeed};

use crate::combat::corpse::TrackedCorpses;
use crate::navigation::RECENT_VISITS;
use crate::scheduler::TurnQueue;

/// Everything the engine mutates while playing. The player, clock, and
/// quests persist through save snapshots; the queue and corpse tracker
/// are session-local and rebuilt on load.
pub struct WorldState {
    pub player: PlayerState,
    pub game_time: GameTime,
    pub seed: WorldSeed,
    pub queue: TurnQueue,
    pub recent_visits: VecDeque<SpaceId>,
    pub tracked_corpses: TrackedCorpses,
    /// Offers posted around town, acceptable by id.
    pub available_quests: Vec<Quest>,
}

impl WorldState {
    pub fn new(player: PlayerState, seed: WorldSeed, available_quests: Vec<Quest>) -> Self {
        Self {
            player,
            game_time: 0,
            seed,
            queue: TurnQueue::new(),
            recent_visits: VecDeque::with_capacity(RECENT_VISITS),
            tracked_corpses: TrackedCorpses::new(),
            available_quests,
        }
    }
}
