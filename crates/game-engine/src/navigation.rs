//! Player movement: move, scout, travel.

use std::collections::VecDeque;

use rand::rngs::StdRng;

use game_database::Repositories;
use game_domain::{
    Direction, EdgeKey, Entity, GameEvent, NodeType, PlayerState, SkillCheck, Space, SpaceId,
    skill::skills,
};

use crate::error::{EngineError, EngineResult};
use crate::skills as skill_engine;
use crate::worldgen::frontier::FrontierExpander;
use crate::worldgen::generator::WorldGenerator;

/// Recent-visit ring buffer capacity.
pub const RECENT_VISITS: usize = 32;
const TRAVEL_STEP_CAP: usize = 16;

pub enum MoveOutcome {
    Moved {
        events: Vec<GameEvent>,
        entered: SpaceId,
    },
    NoSuchExit,
    Blocked(String),
}

pub struct Navigator<'a> {
    repos: &'a Repositories,
    generator: &'a WorldGenerator,
}

impl<'a> Navigator<'a> {
    pub fn new(repos: &'a Repositories, generator: &'a WorldGenerator) -> Self {
        Self { repos, generator }
    }

    /// Resolve one step of movement. Hidden edges count as absent until
    /// scouted.
    pub async fn move_to(
        &self,
        player: &mut PlayerState,
        recent: &mut VecDeque<SpaceId>,
        dir: &Direction,
    ) -> EngineResult<MoveOutcome> {
        let node = self
            .repos
            .graph_nodes
            .find_by_id(player.current_room_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("graph node {}", player.current_room_id))
            })?;

        let Some(edge) = node.edge_in(dir) else {
            return Ok(MoveOutcome::NoSuchExit);
        };
        if edge.hidden && !player.revealed_exits.contains(&EdgeKey::new(node.id, dir)) {
            return Ok(MoveOutcome::NoSuchExit);
        }
        let target_id = edge.target;

        let mut events = Vec::new();

        // Arriving on a frontier may break open a new subzone.
        let expander = FrontierExpander::new(self.repos, self.generator);
        match expander.maybe_expand(target_id).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "frontier expansion failed");
                events.push(GameEvent::warning(
                    "Something shifts in the dark ahead, but the way stays shut.",
                ));
            }
        }

        let space = self.load_filled_space(target_id).await?;

        player.current_room_id = target_id;
        if recent.len() == RECENT_VISITS {
            recent.pop_front();
        }
        recent.push_back(target_id);

        events.push(GameEvent::narrative(describe(&space)));
        Ok(MoveOutcome::Moved {
            events,
            entered: target_id,
        })
    }

    /// Load a space, filling its description on first visit.
    async fn load_filled_space(&self, id: SpaceId) -> EngineResult<Space> {
        let space = self
            .repos
            .spaces
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("space {id}")))?;
        if !space.description_stale && !space.description.is_empty() {
            return Ok(space);
        }
        let node = self
            .repos
            .graph_nodes
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("graph node {id}")))?;
        let chunk = self
            .repos
            .chunks
            .find_by_id(node.chunk_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chunk {}", node.chunk_id)))?;
        self.generator.fill_space_content(space, &node, &chunk).await
    }

    /// Perception roll against a hidden exit in the given direction.
    pub async fn scout(
        &self,
        player: &mut PlayerState,
        rng: &mut StdRng,
        dir: &Direction,
    ) -> EngineResult<(Vec<GameEvent>, Option<SkillCheck>)> {
        let node = self
            .repos
            .graph_nodes
            .find_by_id(player.current_room_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("graph node {}", player.current_room_id))
            })?;

        let key = EdgeKey::new(node.id, dir);
        let Some(edge) = node
            .edge_in(dir)
            .filter(|e| e.hidden && !player.revealed_exits.contains(&key))
        else {
            return Ok((
                vec![GameEvent::narrative(
                    "You study the stone and find nothing you had not already seen.",
                )],
                None,
            ));
        };

        let difficulty = edge.hidden_difficulty.unwrap_or(10) as i32;
        let check = skill_engine::check_skill(
            rng,
            &player.skills,
            equipment_bonus(player, skills::PERCEPTION),
            skills::PERCEPTION,
            difficulty,
        );

        let events = if check.success {
            player.revealed_exits.insert(key);
            vec![GameEvent::narrative(format!(
                "Something breaks the pattern of the stone: a concealed way {dir}."
            ))]
        } else {
            vec![GameEvent::narrative(
                "If anything hides here, it stays hidden.",
            )]
        };
        Ok((events, Some(check)))
    }

    /// Repeated movement along corridors until a hub, a hostile, a
    /// frontier, or a branch.
    pub async fn travel(
        &self,
        player: &mut PlayerState,
        recent: &mut VecDeque<SpaceId>,
        dir: &Direction,
    ) -> EngineResult<Vec<GameEvent>> {
        let mut events = Vec::new();
        let mut heading = dir.clone();

        for step in 0..TRAVEL_STEP_CAP {
            match self.move_to(player, recent, &heading).await? {
                MoveOutcome::Moved { events: step_events, entered } => {
                    events.extend(step_events);

                    let node = self
                        .repos
                        .graph_nodes
                        .find_by_id(entered)
                        .await?
                        .ok_or_else(|| EngineError::NotFound(format!("graph node {entered}")))?;
                    if !matches!(node.node_type, NodeType::Corridor) {
                        break;
                    }
                    if self.space_has_hostiles(entered).await? {
                        events.push(GameEvent::warning("You stop short: something is here."));
                        break;
                    }
                    // Continue only while the corridor has exactly one way on.
                    let back = heading.reverse();
                    let onward: Vec<Direction> = node
                        .neighbors
                        .iter()
                        .filter(|e| !e.hidden && e.direction != back)
                        .map(|e| e.direction.clone())
                        .collect();
                    match onward.as_slice() {
                        [only] => heading = only.clone(),
                        _ => break,
                    }
                }
                MoveOutcome::NoSuchExit => {
                    if step == 0 {
                        events.push(GameEvent::narrative("You see no way there."));
                    }
                    break;
                }
                MoveOutcome::Blocked(reason) => {
                    events.push(GameEvent::narrative(reason));
                    break;
                }
            }
        }
        Ok(events)
    }

    pub async fn space_has_hostiles(&self, id: SpaceId) -> EngineResult<bool> {
        let Some(space) = self.repos.spaces.find_by_id(id).await? else {
            return Ok(false);
        };
        for entity_id in &space.entities {
            if let Some(Entity::Npc(npc)) = self.repos.entities.find_by_id(*entity_id).await? {
                if npc.is_hostile && npc.health > 0 {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn equipment_bonus(player: &PlayerState, skill: &str) -> i32 {
    [&player.equipped_weapon, &player.equipped_armor]
        .into_iter()
        .flatten()
        .filter_map(|item| item.skill_bonuses.get(skill))
        .sum()
}

fn describe(space: &Space) -> String {
    let exits = space
        .exits
        .iter()
        .filter(|e| !e.hidden)
        .map(|e| e.direction.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let body = if space.description.is_empty() {
        "Darkness presses in; the shape of this place refuses to settle."
    } else {
        &space.description
    };
    if exits.is_empty() {
        format!("{}\n{}", space.name, body)
    } else {
        format!("{}\n{}\nWays out: {}.", space.name, body, exits)
    }
}
