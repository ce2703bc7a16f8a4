//! The turn scheduler: action costs and the entity turn queue.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use game_domain::{EntityId, GameTime};

// ============================================================================
// ACTION COSTS
// ============================================================================

/// Base tick costs per action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    MeleeAttack,
    RangedAttack,
    Spell,
    UseItem,
    Move,
    Social,
    Defend,
    Hide,
    Flee,
}

impl ActionKind {
    pub fn base_cost(self) -> u64 {
        match self {
            ActionKind::MeleeAttack => 6,
            ActionKind::RangedAttack => 5,
            ActionKind::Spell => 8,
            ActionKind::UseItem => 4,
            ActionKind::Move => 10,
            ActionKind::Social => 3,
            ActionKind::Defend => 4,
            ActionKind::Hide => 5,
            ActionKind::Flee => 6,
        }
    }
}

/// Cost of an action with the given base for an entity at speed level `L`:
/// `max(2, floor(base / (1 + L/10)))`, computed in integers so it is exact.
pub fn cost(base: GameTime, speed_level: i32) -> GameTime {
    let level = speed_level.max(0) as u64;
    (base * 10 / (10 + level)).max(2)
}

pub fn action_cost(kind: ActionKind, speed_level: i32) -> GameTime {
    cost(kind.base_cost(), speed_level)
}

// ============================================================================
// TURN QUEUE
// ============================================================================

/// Min-priority queue ordered by `(due_tick, seq)`; `seq` is a monotonically
/// increasing insertion counter that makes same-tick ordering stable. At
/// most one live entry per entity; superseded heap entries are skipped
/// lazily on pop.
#[derive(Debug, Default)]
pub struct TurnQueue {
    heap: BinaryHeap<Reverse<(GameTime, u64, EntityId)>>,
    live: HashMap<EntityId, (GameTime, u64)>,
    seq: u64,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an entity. If it is already queued, the earlier due tick
    /// wins.
    pub fn enqueue(&mut self, entity: EntityId, tick: GameTime) {
        if let Some((existing, _)) = self.live.get(&entity) {
            if *existing <= tick {
                return;
            }
        }
        let seq = self.seq;
        self.seq += 1;
        self.live.insert(entity, (tick, seq));
        self.heap.push(Reverse((tick, seq, entity)));
    }

    /// Pop every entity due at or before `now`, in (tick, seq) order.
    pub fn poll_due_before(&mut self, now: GameTime) -> Vec<EntityId> {
        let mut due = Vec::new();
        while let Some(Reverse((tick, seq, entity))) = self.heap.peek().copied() {
            if tick > now {
                break;
            }
            self.heap.pop();
            // Skip entries superseded by a re-enqueue or removal.
            if self.live.get(&entity) == Some(&(tick, seq)) {
                self.live.remove(&entity);
                due.push(entity);
            }
        }
        due
    }

    /// Cancellation primitive.
    pub fn remove(&mut self, entity: EntityId) {
        self.live.remove(&entity);
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.live.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundary_costs_match_contract() {
        assert_eq!(action_cost(ActionKind::MeleeAttack, 50), 2);
        assert_eq!(action_cost(ActionKind::MeleeAttack, 10), 3);
        assert_eq!(action_cost(ActionKind::Move, 0), 10);
    }

    #[test]
    fn negative_speed_is_floored_at_zero() {
        assert_eq!(
            action_cost(ActionKind::Move, -5),
            action_cost(ActionKind::Move, 0)
        );
    }

    proptest! {
        #[test]
        fn cost_is_at_least_two_and_monotone(base in 1u64..=40, l1 in 0i32..200, l2 in 0i32..200) {
            let (lo, hi) = if l1 <= l2 { (l1, l2) } else { (l2, l1) };
            prop_assert!(cost(base, lo) >= 2);
            prop_assert!(cost(base, lo) >= cost(base, hi));
        }
    }

    #[test]
    fn queue_orders_by_tick_then_insertion() {
        let mut queue = TurnQueue::new();
        let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());
        queue.enqueue(a, 20);
        queue.enqueue(b, 10);
        queue.enqueue(c, 10);

        assert_eq!(queue.poll_due_before(15), vec![b, c]);
        assert_eq!(queue.poll_due_before(25), vec![a]);
        assert!(queue.is_empty());
    }

    #[test]
    fn reenqueue_keeps_earlier_tick_and_single_entry() {
        let mut queue = TurnQueue::new();
        let a = EntityId::new();
        queue.enqueue(a, 30);
        queue.enqueue(a, 10);
        queue.enqueue(a, 50);
        assert_eq!(queue.len(), 1);

        assert!(queue.poll_due_before(9).is_empty());
        assert_eq!(queue.poll_due_before(10), vec![a]);
        assert!(queue.poll_due_before(100).is_empty());
    }

    #[test]
    fn remove_cancels_scheduled_turn() {
        let mut queue = TurnQueue::new();
        let a = EntityId::new();
        queue.enqueue(a, 5);
        assert!(queue.contains(a));
        queue.remove(a);
        assert!(!queue.contains(a));
        assert!(queue.poll_due_before(100).is_empty());
    }
}
