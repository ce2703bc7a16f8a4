//! Frontier expansion.
//!
//! A frontier node borders ungenerated dark. The first entry spawns the
//! adjacent subzone and links the frontier to its hub; concurrent
//! re-entry is deduplicated by the generation cache because the new
//! chunk's id is derived from the frontier node.

use game_database::Repositories;
use game_domain::{
    ChunkId, ChunkLevel, Direction, EdgeData, Exit, GameEvent, SpaceId,
};

use crate::error::{EngineError, EngineResult};
use crate::worldgen::generator::WorldGenerator;
use crate::worldgen::GenerationContext;

pub struct FrontierExpander<'a> {
    repos: &'a Repositories,
    generator: &'a WorldGenerator,
}

impl<'a> FrontierExpander<'a> {
    pub fn new(repos: &'a Repositories, generator: &'a WorldGenerator) -> Self {
        Self { repos, generator }
    }

    /// Expand past a frontier node if it has no onward passage yet.
    /// Returns the system event to emit, or None when nothing happened.
    pub async fn maybe_expand(&self, node_id: SpaceId) -> EngineResult<Option<GameEvent>> {
        let Some(node) = self.repos.graph_nodes.find_by_id(node_id).await? else {
            return Ok(None);
        };
        if node.node_type != game_domain::NodeType::Frontier {
            return Ok(None);
        }
        // Already expanded if any edge crosses into another chunk.
        for edge in &node.neighbors {
            if let Some(target) = self.repos.graph_nodes.find_by_id(edge.target).await? {
                if target.chunk_id != node.chunk_id {
                    return Ok(None);
                }
            }
        }

        let chunk = self
            .repos
            .chunks
            .find_by_id(node.chunk_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chunk {}", node.chunk_id)))?;
        let parent = match chunk.parent_id {
            Some(pid) => self.repos.chunks.find_by_id(pid).await?,
            None => None,
        };

        // Chunk id derived from the frontier node keeps re-entry
        // single-flighted through the cache.
        let ctx = GenerationContext {
            chunk_id: ChunkId(node.id.0),
            level: ChunkLevel::Subzone,
            parent: parent.or_else(|| Some(chunk.clone())),
            direction: None,
            global_lore: chunk.lore.clone(),
            difficulty: chunk.difficulty_level + 1,
            rng_seed: node.id.0.as_u128() as u64,
            boss_capable: chunk.boss_capable,
        };
        let new_chunk = self.generator.generate_chunk(ctx).await?;

        let hub_id = new_chunk.entry_space.ok_or_else(|| {
            EngineError::GenerationFailed(format!("subzone {} has no entry space", new_chunk.id))
        })?;

        // Link frontier -> hub through a free cardinal, falling back to a
        // free-text passage when all four are taken.
        let mut node = node;
        let direction = node
            .free_cardinals()
            .into_iter()
            .next()
            .unwrap_or_else(|| Direction::Other("onward into the dark".into()));
        node.neighbors
            .push(EdgeData::open(hub_id, direction.clone()));
        self.repos.graph_nodes.update(&node).await?;

        if let Some(mut frontier_space) = self.repos.spaces.find_by_id(node.id).await? {
            frontier_space
                .exits
                .push(Exit::open(direction.clone(), hub_id));
            self.repos.spaces.save(&frontier_space).await?;
        }

        let reverse = direction.reverse();
        if let Some(mut hub) = self.repos.graph_nodes.find_by_id(hub_id).await? {
            hub.neighbors.push(EdgeData::open(node.id, reverse.clone()));
            self.repos.graph_nodes.update(&hub).await?;
        }
        if let Some(mut hub_space) = self.repos.spaces.find_by_id(hub_id).await? {
            hub_space.exits.push(Exit::open(reverse, node.id));
            self.repos.spaces.save(&hub_space).await?;
        }

        // Register under the parent and as a sibling of the old chunk.
        if let Some(parent_id) = new_chunk.parent_id {
            if let Some(mut parent) = self.repos.chunks.find_by_id(parent_id).await? {
                if !parent.children.contains(&new_chunk.id) {
                    parent.children.push(new_chunk.id);
                    self.repos.chunks.save(&parent).await?;
                }
            }
        }
        if let Some(mut old_chunk) = self.repos.chunks.find_by_id(node.chunk_id).await? {
            old_chunk
                .adjacency
                .entry(direction.clone())
                .or_insert(new_chunk.id);
            self.repos.chunks.save(&old_chunk).await?;
        }

        tracing::info!(
            frontier = %node.id,
            chunk = %new_chunk.id,
            "frontier expanded into new subzone"
        );
        Ok(Some(GameEvent::info(
            "The dark ahead gives way: a new passage has opened.",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::NodeType;

    #[tokio::test]
    async fn entering_a_frontier_spawns_an_adjacent_subzone_once() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        // Seed chosen so the fixture graph contains a frontier node.
        let fixture = testutil::generated_subzone_with_frontier(&generator).await;
        let frontier = fixture
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Frontier)
            .expect("fixture has a frontier");

        let expander = FrontierExpander::new(&repos, &generator);
        let event = expander.maybe_expand(frontier.id).await.unwrap();
        assert!(event.is_some());

        let expanded = repos
            .graph_nodes
            .find_by_id(frontier.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expanded.neighbors.len(), frontier.neighbors.len() + 1);

        // Second entry is a no-op.
        let again = expander.maybe_expand(frontier.id).await.unwrap();
        assert!(again.is_none());

        // The new chunk hangs off the same parent (P2).
        let new_chunk = repos
            .chunks
            .find_by_id(ChunkId(frontier.id.0))
            .await
            .unwrap()
            .unwrap();
        let parent = repos
            .chunks
            .find_by_id(new_chunk.parent_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(parent.children.contains(&new_chunk.id));
    }
}
