//! Exit linking for freshly generated spaces.
//!
//! Runs in a fixed order: collapse duplicate directions (first wins),
//! resolve placeholder exits (vertical ones spawn a subzone, horizontal
//! ones follow or claim chunk adjacency), then enforce edge reciprocity.
//! Each placeholder is saved all-or-nothing; a failure leaves the
//! placeholder in place with a logged warning, and in-memory consistency
//! is restored by the next read.

use std::collections::HashSet;

use game_database::Repositories;
use game_domain::{
    ChunkId, Direction, EdgeData, Exit, ExitTarget, GraphNode, NodeType, Space, SpaceId,
    WorldChunk,
};

use crate::error::{EngineError, EngineResult};
use crate::worldgen::generator::WorldGenerator;
use crate::worldgen::GenerationContext;

pub struct ExitLinker<'a> {
    repos: &'a Repositories,
    generator: &'a WorldGenerator,
}

impl<'a> ExitLinker<'a> {
    pub fn new(repos: &'a Repositories, generator: &'a WorldGenerator) -> Self {
        Self { repos, generator }
    }

    /// Link one space: dedupe, resolve placeholders, repair reciprocity.
    pub async fn link_space(&self, space_id: SpaceId) -> EngineResult<()> {
        let mut space = self
            .repos
            .spaces
            .find_by_id(space_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("space {space_id}")))?;

        collapse_duplicates(&mut space);

        let placeholders: Vec<Exit> = space
            .exits
            .iter()
            .filter(|e| e.is_placeholder())
            .cloned()
            .collect();
        for placeholder in placeholders {
            if let Err(e) = self.resolve_placeholder(&mut space, &placeholder).await {
                tracing::warn!(
                    space = %space.id,
                    direction = %placeholder.direction,
                    error = %e,
                    "placeholder link failed, exit left unresolved"
                );
            }
        }

        self.enforce_reciprocity(&space).await?;
        self.repos.spaces.save(&space).await?;
        Ok(())
    }

    async fn resolve_placeholder(
        &self,
        space: &mut Space,
        placeholder: &Exit,
    ) -> EngineResult<()> {
        let mut chunk = self
            .repos
            .chunks
            .find_by_id(space.chunk_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chunk {}", space.chunk_id)))?;

        let direction = &placeholder.direction;
        let target_space_id = if direction.is_vertical() {
            self.spawn_vertical_subzone(&chunk, direction).await?
        } else {
            match chunk.adjacency.get(direction).copied() {
                Some(neighbor_id) => self.grow_space_in_chunk(neighbor_id).await?,
                None => {
                    // No neighbor that way yet: grow inward and claim the
                    // direction so later links reuse this chunk.
                    let new_id = self.grow_space_in_chunk(chunk.id).await?;
                    chunk.adjacency.insert(direction.clone(), chunk.id);
                    self.repos.chunks.save(&chunk).await?;
                    new_id
                }
            }
        };

        self.connect(space, direction, target_space_id, placeholder)
            .await
    }

    /// New subzone below (or above) the current one; returns its hub.
    async fn spawn_vertical_subzone(
        &self,
        chunk: &WorldChunk,
        direction: &Direction,
    ) -> EngineResult<SpaceId> {
        let parent = match chunk.parent_id {
            Some(pid) => self.repos.chunks.find_by_id(pid).await?,
            None => None,
        };
        let ctx = GenerationContext {
            chunk_id: ChunkId::new(),
            level: game_domain::ChunkLevel::Subzone,
            parent: parent.or_else(|| Some(chunk.clone())),
            direction: Some(direction.clone()),
            global_lore: chunk.lore.clone(),
            difficulty: chunk.difficulty_level + 1,
            rng_seed: chunk.id.0.as_u128() as u64 ^ direction.normalized().len() as u64,
            boss_capable: chunk.boss_capable,
        };
        let new_chunk = self.generator.generate_chunk(ctx).await?;
        self.register_child(&new_chunk).await?;
        new_chunk.entry_space.ok_or_else(|| {
            EngineError::GenerationFailed(format!("subzone {} has no entry space", new_chunk.id))
        })
    }

    /// New dead-end space grown inside an existing chunk.
    async fn grow_space_in_chunk(&self, chunk_id: ChunkId) -> EngineResult<SpaceId> {
        let mut chunk = self
            .repos
            .chunks
            .find_by_id(chunk_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chunk {chunk_id}")))?;

        let node = GraphNode::new(SpaceId::new(), NodeType::DeadEnd, chunk.id);
        let stub = self.generator.generate_space_stub(&node, &chunk);
        chunk.spaces.push(stub.id);

        self.repos.graph_nodes.save(&node).await?;
        self.repos.spaces.save(&stub).await?;
        self.repos.chunks.save(&chunk).await?;
        Ok(stub.id)
    }

    /// Wire both directions of the new link and swap the placeholder out.
    async fn connect(
        &self,
        space: &mut Space,
        direction: &Direction,
        target_space_id: SpaceId,
        placeholder: &Exit,
    ) -> EngineResult<()> {
        let mut source_node = self
            .repos
            .graph_nodes
            .find_by_id(space.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("graph node {}", space.id)))?;
        let mut target_node = self
            .repos
            .graph_nodes
            .find_by_id(target_space_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("graph node {target_space_id}")))?;
        let mut target_space = self
            .repos
            .spaces
            .find_by_id(target_space_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("space {target_space_id}")))?;

        if !source_node.has_direction(direction) {
            source_node.neighbors.push(EdgeData {
                target: target_space_id,
                direction: direction.clone(),
                hidden: placeholder.hidden,
                hidden_difficulty: placeholder.hidden_difficulty,
            });
        }
        let reverse = direction.reverse();
        if !target_node.has_direction(&reverse) {
            target_node.neighbors.push(EdgeData {
                target: space.id,
                direction: reverse.clone(),
                hidden: placeholder.hidden,
                hidden_difficulty: placeholder.hidden_difficulty,
            });
            target_space.exits.push(Exit {
                direction: reverse,
                target: ExitTarget::Space(space.id),
                hidden: placeholder.hidden,
                hidden_difficulty: placeholder.hidden_difficulty,
            });
        }

        // Replace the placeholder on the source space in place.
        if let Some(exit) = space
            .exits
            .iter_mut()
            .find(|e| e.is_placeholder() && e.direction.normalized() == direction.normalized())
        {
            exit.target = ExitTarget::Space(target_space_id);
        }

        self.repos.graph_nodes.save(&source_node).await?;
        self.repos.graph_nodes.save(&target_node).await?;
        self.repos.spaces.save(&target_space).await?;
        tracing::info!(
            from = %space.id,
            to = %target_space_id,
            direction = %direction,
            "linked exit"
        );
        Ok(())
    }

    /// Restore any missing reverse edge for this space's outgoing edges.
    /// Hidden flags are copied when creating the missing half; an existing
    /// reverse edge keeps its own hidden state.
    async fn enforce_reciprocity(&self, space: &Space) -> EngineResult<()> {
        let Some(node) = self.repos.graph_nodes.find_by_id(space.id).await? else {
            return Ok(());
        };
        for edge in &node.neighbors {
            let Some(mut target) = self.repos.graph_nodes.find_by_id(edge.target).await? else {
                continue;
            };
            let reverse = edge.direction.reverse();
            let has_reverse = target
                .neighbors
                .iter()
                .any(|back| back.target == node.id && back.direction == reverse);
            if !has_reverse {
                target.neighbors.push(EdgeData {
                    target: node.id,
                    direction: reverse.clone(),
                    hidden: edge.hidden,
                    hidden_difficulty: edge.hidden_difficulty,
                });
                self.repos.graph_nodes.update(&target).await?;
                if let Some(mut target_space) =
                    self.repos.spaces.find_by_id(edge.target).await?
                {
                    if target_space.exit_in(&reverse).is_none() {
                        target_space.exits.push(Exit {
                            direction: reverse.clone(),
                            target: ExitTarget::Space(node.id),
                            hidden: edge.hidden,
                            hidden_difficulty: edge.hidden_difficulty,
                        });
                        self.repos.spaces.save(&target_space).await?;
                    }
                }
                tracing::warn!(
                    from = %edge.target,
                    to = %node.id,
                    direction = %reverse,
                    "restored missing reciprocal edge"
                );
            }
        }
        Ok(())
    }

    /// Register a freshly generated chunk under its parent.
    async fn register_child(&self, chunk: &WorldChunk) -> EngineResult<()> {
        if let Some(parent_id) = chunk.parent_id {
            if let Some(mut parent) = self.repos.chunks.find_by_id(parent_id).await? {
                if !parent.children.contains(&chunk.id) {
                    parent.children.push(chunk.id);
                    self.repos.chunks.save(&parent).await?;
                }
            }
        }
        Ok(())
    }
}

/// First exit in a direction wins; later duplicates are dropped.
fn collapse_duplicates(space: &mut Space) {
    let mut seen = HashSet::new();
    space.exits.retain(|e| seen.insert(e.direction.normalized()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::ChunkLevel;

    #[tokio::test]
    async fn duplicate_directions_collapse_first_wins() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let fixture = testutil::generated_subzone(&generator, 42).await;

        let hub = fixture.chunk.entry_space.unwrap();
        let mut space = repos.spaces.find_by_id(hub).await.unwrap().unwrap();
        let first = space.exits[0].clone();
        let mut dup = first.clone();
        dup.target = ExitTarget::Placeholder;
        space.exits.push(dup);
        repos.spaces.save(&space).await.unwrap();

        ExitLinker::new(&repos, &generator)
            .link_space(hub)
            .await
            .unwrap();

        let relinked = repos.spaces.find_by_id(hub).await.unwrap().unwrap();
        let same_dir: Vec<_> = relinked
            .exits
            .iter()
            .filter(|e| e.direction.normalized() == first.direction.normalized())
            .collect();
        assert_eq!(same_dir.len(), 1);
        assert_eq!(same_dir[0].target, first.target);
    }

    #[tokio::test]
    async fn every_edge_has_a_reverse_after_generation() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let fixture = testutil::generated_subzone(&generator, 42).await;

        for node in &fixture.nodes {
            for edge in &node.neighbors {
                let target = repos
                    .graph_nodes
                    .find_by_id(edge.target)
                    .await
                    .unwrap()
                    .unwrap();
                assert!(
                    target
                        .neighbors
                        .iter()
                        .any(|back| back.target == node.id
                            && back.direction == edge.direction.reverse()),
                    "missing reverse of {} --{}-->",
                    node.id,
                    edge.direction
                );
            }
        }
    }

    #[tokio::test]
    async fn linker_restores_deleted_reverse_edge() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let fixture = testutil::generated_subzone(&generator, 42).await;

        // Delete the reverse of the hub's first edge.
        let hub_id = fixture.chunk.entry_space.unwrap();
        let hub = repos.graph_nodes.find_by_id(hub_id).await.unwrap().unwrap();
        let edge = hub.neighbors[0].clone();
        let mut target = repos
            .graph_nodes
            .find_by_id(edge.target)
            .await
            .unwrap()
            .unwrap();
        target.neighbors.retain(|back| back.target != hub_id);
        repos.graph_nodes.save(&target).await.unwrap();

        ExitLinker::new(&repos, &generator)
            .link_space(hub_id)
            .await
            .unwrap();

        let repaired = repos
            .graph_nodes
            .find_by_id(edge.target)
            .await
            .unwrap()
            .unwrap();
        assert!(repaired
            .neighbors
            .iter()
            .any(|back| back.target == hub_id && back.direction == edge.direction.reverse()));
    }

    #[tokio::test]
    async fn vertical_placeholder_spawns_linked_subzone() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let fixture = testutil::generated_subzone(&generator, 7).await;

        let hub_id = fixture.chunk.entry_space.unwrap();
        let mut space = repos.spaces.find_by_id(hub_id).await.unwrap().unwrap();
        space
            .exits
            .push(Exit::placeholder(Direction::parse("climb ladder")));
        repos.spaces.save(&space).await.unwrap();

        ExitLinker::new(&repos, &generator)
            .link_space(hub_id)
            .await
            .unwrap();

        let relinked = repos.spaces.find_by_id(hub_id).await.unwrap().unwrap();
        let exit = relinked
            .exit_in(&Direction::parse("climb ladder"))
            .expect("placeholder resolved");
        let ExitTarget::Space(target_id) = exit.target else {
            panic!("placeholder still unresolved");
        };

        // Target is the hub of a brand-new subzone, with a reciprocal
        // "descend ladder" edge back.
        let target_node = repos
            .graph_nodes
            .find_by_id(target_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(target_node.chunk_id, fixture.chunk.id);
        assert!(target_node
            .neighbors
            .iter()
            .any(|e| e.target == hub_id
                && e.direction == Direction::parse("descend ladder")));

        let new_chunk = repos
            .chunks
            .find_by_id(target_node.chunk_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new_chunk.level, ChunkLevel::Subzone);
        assert_eq!(new_chunk.difficulty_level, fixture.chunk.difficulty_level + 1);
    }

    #[tokio::test]
    async fn horizontal_placeholder_grows_into_current_chunk_and_claims_adjacency() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let fixture = testutil::generated_subzone(&generator, 7).await;

        let hub_id = fixture.chunk.entry_space.unwrap();
        let mut space = repos.spaces.find_by_id(hub_id).await.unwrap().unwrap();
        let free = repos
            .graph_nodes
            .find_by_id(hub_id)
            .await
            .unwrap()
            .unwrap()
            .free_cardinals();
        let direction = free.first().cloned().expect("hub has a free cardinal");
        space.exits.push(Exit::placeholder(direction.clone()));
        repos.spaces.save(&space).await.unwrap();

        ExitLinker::new(&repos, &generator)
            .link_space(hub_id)
            .await
            .unwrap();

        let relinked = repos.spaces.find_by_id(hub_id).await.unwrap().unwrap();
        let exit = relinked.exit_in(&direction).unwrap();
        let ExitTarget::Space(target_id) = exit.target else {
            panic!("placeholder still unresolved");
        };
        let target_node = repos
            .graph_nodes
            .find_by_id(target_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target_node.chunk_id, fixture.chunk.id);

        let chunk = repos
            .chunks
            .find_by_id(fixture.chunk.id)
            .await
            .unwrap()
            .unwrap();
        assert!(chunk.spaces.contains(&target_id));
        assert_eq!(chunk.adjacency.get(&direction), Some(&chunk.id));
    }
}
