//! One-shot world bootstrap.
//!
//! Idempotently ensures the seed hierarchy exists: WORLD, seed REGION and
//! ZONE, the hand-built starting town, and the first generated subzone
//! under it, with a hidden way placed for scouts to find. The town works
//! without an LLM, so a keyless engine still boots into the sample world.

use game_database::Repositories;
use game_domain::{
    ChunkLevel, Component, Direction, EdgeData, Entity, Exit, GraphNode, InventoryComponent,
    ItemTemplate, ItemType, NodeType, Npc, Objective, ObjectiveKind, Quest, QuestId,
    QuestStatus, SocialComponent, Space, SpaceId, StockEntry, TerrainType, TradingComponent,
    WorldChunk, WorldSeed, skill::skills,
};

use crate::error::{EngineError, EngineResult};
use crate::worldgen::generator::WorldGenerator;
use crate::worldgen::GenerationContext;

pub const STARTER_WEAPON: &str = "Rusty Dagger";
const HIDDEN_WAY_DIFFICULTY: u32 = 12;

pub struct BootstrappedWorld {
    pub seed: WorldSeed,
    /// Offers posted in town; re-issued on every boot.
    pub starter_quests: Vec<Quest>,
}

pub struct DungeonInitializer<'a> {
    repos: &'a Repositories,
    generator: &'a WorldGenerator,
}

impl<'a> DungeonInitializer<'a> {
    pub fn new(repos: &'a Repositories, generator: &'a WorldGenerator) -> Self {
        Self { repos, generator }
    }

    /// Ensure the root world exists and return its seed. Both fatal boot
    /// conditions surface here: a starting space that no longer resolves
    /// forces regeneration, and a seed that cannot be persisted aborts.
    pub async fn ensure_world(
        &self,
        rng_seed: u64,
        global_lore: &str,
        world_theme: &str,
    ) -> EngineResult<BootstrappedWorld> {
        if let Some(seed) = self.repos.world_seed.get().await? {
            match self.repos.spaces.find_by_id(seed.starting_space_id).await? {
                Some(_) => {
                    tracing::info!(root = %seed.root_chunk_id, "world seed already present");
                    return Ok(BootstrappedWorld {
                        starter_quests: self.starter_quests(&seed).await?,
                        seed,
                    });
                }
                None => {
                    tracing::warn!(
                        space = %seed.starting_space_id,
                        "starting space unresolvable, regenerating world"
                    );
                }
            }
        }

        self.create_world(rng_seed, global_lore, world_theme).await
    }

    async fn create_world(
        &self,
        rng_seed: u64,
        global_lore: &str,
        world_theme: &str,
    ) -> EngineResult<BootstrappedWorld> {
        let lore_engine = self.generator.lore_engine();

        // WORLD -> REGION -> ZONE spine.
        let mut world = WorldChunk::new(ChunkLevel::World, None);
        world.lore = global_lore.to_string();
        world.biome_theme = world_theme.to_string();

        let mut region = WorldChunk::new(ChunkLevel::Region, Some(world.id));
        region.lore = lore_engine
            .vary_lore(global_lore, &world.lore, ChunkLevel::World, ChunkLevel::Region, None)
            .await?;
        region.biome_theme = lore_engine
            .blend_themes(world_theme, "first region")
            .await?;
        world.children.push(region.id);

        let mut zone = WorldChunk::new(ChunkLevel::Zone, Some(region.id));
        zone.lore = lore_engine
            .vary_lore(global_lore, &region.lore, ChunkLevel::Region, ChunkLevel::Zone, None)
            .await?;
        zone.biome_theme = region.biome_theme.clone();
        zone.boss_capable = true;
        zone.difficulty_level = 1;
        region.children.push(zone.id);

        // The town: a hand-built, fully described subzone.
        let (mut town, town_nodes, mut town_spaces) = build_town(&zone);
        zone.children.push(town.id);

        let item_templates = starter_templates();
        for template in &item_templates {
            self.repos.items.save_template(template).await?;
        }
        let starter_quests = self
            .populate_town(&mut town_spaces, &item_templates)
            .await?;

        // First delve: a generated subzone under the town gate.
        let delve_ctx = GenerationContext::child_of(
            &zone,
            game_domain::ChunkId::new(),
            Some(Direction::Down),
            global_lore.to_string(),
            rng_seed,
        );
        let delve = self.generator.generate_chunk(delve_ctx).await?;
        zone.children.push(delve.id);

        // Persist the spine before linking so every id resolves.
        let hub_id = town.entry_space.ok_or_else(|| {
            EngineError::Initialization("town built without an entry space".into())
        })?;
        self.repos.chunks.save(&world).await?;
        self.repos.chunks.save(&region).await?;
        self.repos.chunks.save(&zone).await?;
        self.repos.chunks.save(&town).await?;
        for node in &town_nodes {
            self.repos.graph_nodes.save(node).await?;
        }
        for space in &town_spaces {
            self.repos.spaces.save(space).await?;
        }

        self.link_town_to_delve(&mut town, &town_nodes, &delve)
            .await?;

        self.seed_town_knowledge(&zone).await?;

        let seed = WorldSeed {
            starting_space_id: hub_id,
            root_chunk_id: world.id,
            rng_seed,
        };
        // Failing to persist the seed of a new world is fatal.
        self.repos.world_seed.save(&seed).await.map_err(|e| {
            EngineError::Initialization(format!("could not persist world seed: {e}"))
        })?;

        tracing::info!(root = %world.id, town = %town.id, "seed world created");
        Ok(BootstrappedWorld {
            seed,
            starter_quests,
        })
    }

    /// Merchant, mentor, and overseer, with their stock and offers.
    async fn populate_town(
        &self,
        town_spaces: &mut [Space],
        templates: &[ItemTemplate],
    ) -> EngineResult<Vec<Quest>> {
        let find = |name: &str| -> ItemTemplate {
            templates
                .iter()
                .find(|t| t.name == name)
                .cloned()
                .unwrap_or_else(|| ItemTemplate::basic(name, ItemType::Misc, 1, 1))
        };

        // Market: the provisioner.
        let mut merchant = Npc::new("Provisioner Brakka", 40);
        merchant.description =
            "A broad trader whose stall glitters with salvage from a dozen delves.".into();
        merchant.insert_component(Component::Social(SocialComponent::with_disposition(10)));
        merchant.insert_component(Component::Trading(TradingComponent {
            stock: vec![
                StockEntry { template_id: find("Iron Sword").id, quantity: 2 },
                StockEntry { template_id: find("Leather Jerkin").id, quantity: 2 },
                StockEntry { template_id: find("Healing Draught").id, quantity: 5 },
                StockEntry { template_id: find("Torch").id, quantity: 10 },
            ],
            gold: 200,
        }));
        let mut merchant_inventory = InventoryComponent::with_capacity(200);
        merchant_inventory.gold = 200;
        self.repos
            .inventories
            .save(merchant.id, &merchant_inventory)
            .await?;

        // Shrine: the mentor.
        let mut mentor = Npc::new("Warden Sel", 35);
        mentor.description = "Keeper of the shrine, scarred by years in the unlit galleries.".into();
        let mut mentor_social = SocialComponent::with_disposition(30);
        mentor_social.teachable_skills =
            vec![skills::STEALTH.to_string(), skills::PERCEPTION.to_string()];
        mentor.insert_component(Component::Social(mentor_social));

        // Gate: the overseer, who posts work.
        let mut overseer = Npc::new("Overseer Varn", 45);
        overseer.description = "The gate overseer, tallying who goes down and who comes back.".into();
        overseer.insert_component(Component::Social(SocialComponent::with_disposition(20)));

        let quest = Quest {
            id: QuestId::new(),
            name: "Teeth in the Dark".into(),
            description: "Gloom rats have been chewing the gate ropes. Kill one and report back."
                .into(),
            giver: Some(overseer.id),
            status: QuestStatus::Available,
            objectives: vec![Objective {
                description: "Kill a Gloom Rat".into(),
                kind: ObjectiveKind::KillNpc {
                    target_name: "Gloom Rat".into(),
                    count: 1,
                    progress: 0,
                },
                done: false,
            }],
            reward_gold: 25,
            reward_items: Vec::new(),
        };

        for (npc, space_idx) in [(merchant, 1usize), (mentor, 2), (overseer, 3)] {
            let id = npc.id;
            // The social component repo is authoritative for disposition;
            // keep it in step with the entity from the start.
            if let Some(social) = npc.social() {
                self.repos.social_components.save(id, social).await?;
            }
            self.repos.entities.save(&Entity::Npc(npc)).await?;
            if let Some(space) = town_spaces.get_mut(space_idx) {
                space.entities.push(id);
            }
        }

        Ok(vec![quest])
    }

    /// Open way down through the gate, plus a hidden shortcut at the
    /// shrine for scouts to find.
    async fn link_town_to_delve(
        &self,
        town: &mut WorldChunk,
        town_nodes: &[GraphNode],
        delve: &WorldChunk,
    ) -> EngineResult<()> {
        let delve_hub_id = delve.entry_space.ok_or_else(|| {
            EngineError::Initialization("delve generated without an entry space".into())
        })?;
        let gate_id = town_nodes[3].id;
        let shrine_id = town_nodes[2].id;

        self.link_pair(gate_id, delve_hub_id, Direction::Down, None)
            .await?;

        // Hidden way: shrine to the far side of the delve.
        let delve_nodes = self.repos.graph_nodes.get_all().await?;
        if let Some(far) = delve_nodes
            .iter()
            .filter(|n| n.chunk_id == delve.id && n.id != delve_hub_id)
            .max_by_key(|n| n.neighbors.len())
        {
            self.link_pair(
                shrine_id,
                far.id,
                Direction::Other("crawl through the reliquary crack".into()),
                Some(HIDDEN_WAY_DIFFICULTY),
            )
            .await?;
        }

        town.adjacency.insert(Direction::Down, delve.id);
        self.repos.chunks.save(town).await?;
        Ok(())
    }

    async fn link_pair(
        &self,
        from: SpaceId,
        to: SpaceId,
        direction: Direction,
        hidden_difficulty: Option<u32>,
    ) -> EngineResult<()> {
        let hidden = hidden_difficulty.is_some();
        for (a, b, dir) in [
            (from, to, direction.clone()),
            (to, from, direction.reverse()),
        ] {
            let mut node = self
                .repos
                .graph_nodes
                .find_by_id(a)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("graph node {a}")))?;
            if !node.has_direction(&dir) {
                node.neighbors.push(EdgeData {
                    target: b,
                    direction: dir.clone(),
                    hidden,
                    hidden_difficulty,
                });
                self.repos.graph_nodes.save(&node).await?;
            }
            if let Some(mut space) = self.repos.spaces.find_by_id(a).await? {
                if space.exit_in(&dir).is_none() {
                    space.exits.push(Exit {
                        direction: dir,
                        target: game_domain::ExitTarget::Space(b),
                        hidden,
                        hidden_difficulty,
                    });
                    self.repos.spaces.save(&space).await?;
                }
            }
        }
        Ok(())
    }

    /// Common knowledge the townsfolk can surface when asked.
    async fn seed_town_knowledge(&self, zone: &WorldChunk) -> EngineResult<()> {
        let fragments = [
            (
                "glowcap",
                "Glowcap spores keep their light for a season if you keep them dry; \
                 the shrine pays honest coin for a full pouch.",
            ),
            (
                "the builders",
                "Nobody alive worked these halls. The builders cut them long before \
                 the factions came, and their vaults are still sealed.",
            ),
            (
                "the delves",
                "Below the gate stair the passages go deeper than any tally. \
                 Delvers who mark their turnings come back; the proud do not.",
            ),
        ];
        for (topic, text) in fragments {
            self.repos
                .knowledge
                .save(&game_database::KnowledgeFragment {
                    id: game_domain::KnowledgeId::new(),
                    topic: topic.to_string(),
                    text: text.to_string(),
                    embedding: None,
                    created_at: chrono::Utc::now(),
                })
                .await?;
        }
        tracing::debug!(zone = %zone.id, "seeded town knowledge");
        Ok(())
    }

    /// Re-issue town offers for an already existing world.
    async fn starter_quests(&self, seed: &WorldSeed) -> EngineResult<Vec<Quest>> {
        // The overseer re-posts the same work each session; accepted or
        // completed copies live on the player and are never duplicated by
        // id matching (fresh ids each boot).
        let Some(hub) = self.repos.spaces.find_by_id(seed.starting_space_id).await? else {
            return Ok(Vec::new());
        };
        let chunk = self.repos.chunks.find_by_id(hub.chunk_id).await?;
        let Some(chunk) = chunk else {
            return Ok(Vec::new());
        };
        let mut giver = None;
        for space_id in &chunk.spaces {
            if let Some(space) = self.repos.spaces.find_by_id(*space_id).await? {
                for entity_id in &space.entities {
                    if let Some(Entity::Npc(npc)) =
                        self.repos.entities.find_by_id(*entity_id).await?
                    {
                        if npc.name == "Overseer Varn" {
                            giver = Some(npc.id);
                        }
                    }
                }
            }
        }
        Ok(vec![Quest {
            id: QuestId::new(),
            name: "Teeth in the Dark".into(),
            description: "Gloom rats have been chewing the gate ropes. Kill one and report back."
                .into(),
            giver,
            status: QuestStatus::Available,
            objectives: vec![Objective {
                description: "Kill a Gloom Rat".into(),
                kind: ObjectiveKind::KillNpc {
                    target_name: "Gloom Rat".into(),
                    count: 1,
                    progress: 0,
                },
                done: false,
            }],
            reward_gold: 25,
            reward_items: Vec::new(),
        }])
    }
}

/// Four town rooms: hub, market, shrine, gate.
fn build_town(zone: &WorldChunk) -> (WorldChunk, Vec<GraphNode>, Vec<Space>) {
    let mut town = WorldChunk::new(ChunkLevel::Subzone, Some(zone.id));
    town.lore = format!(
        "{} The settlement of Lanterncross clings to the old stair, trading \
         glowcap light for whatever the delves give up.",
        zone.lore
    );
    town.biome_theme = "Lanterncross".into();
    town.difficulty_level = 0;
    town.mob_density = 0.0;

    let hub = GraphNode::new(SpaceId::new(), NodeType::Town, town.id);
    let market = GraphNode::new(SpaceId::new(), NodeType::Town, town.id);
    let shrine = GraphNode::new(SpaceId::new(), NodeType::Town, town.id);
    let gate = GraphNode::new(SpaceId::new(), NodeType::Town, town.id);
    let mut nodes = [hub, market, shrine, gate];

    let links = [
        (0usize, 1usize, Direction::East),
        (0, 2, Direction::West),
        (0, 3, Direction::North),
    ];
    for (a, b, dir) in links {
        let (a_id, b_id) = (nodes[a].id, nodes[b].id);
        nodes[a].neighbors.push(EdgeData::open(b_id, dir.clone()));
        nodes[b].neighbors.push(EdgeData::open(a_id, dir.reverse()));
    }

    let details = [
        (
            "Lanterncross Commons",
            "Rope bridges and glowcap lanterns knot together over a drop that swallows \
             sound. Every delver in the region passes through here eventually.",
        ),
        (
            "The Salvage Market",
            "Stalls built from shoring timber lean against one another, heavy with rope, \
             rations, and relics nobody can name.",
        ),
        (
            "Shrine of the Last Lamp",
            "A single flame burns in a niche worn smooth by ten generations of thumbs. \
             The warden keeps it lit and keeps her counsel.",
        ),
        (
            "The Gate Stair",
            "A counterweighted gate of black iron guards the stair down. Tally marks \
             crowd the wall beside it, one for each delver gone below.",
        ),
    ];

    let mut spaces = Vec::new();
    for (node, (name, description)) in nodes.iter().zip(details) {
        let mut space = Space::stub(node.id, town.id, name);
        space.terrain_type = TerrainType::Chamber;
        space.brightness = 70;
        space.description = description.to_string();
        space.description_stale = false;
        for edge in &node.neighbors {
            space.exits.push(Exit::open(edge.direction.clone(), edge.target));
        }
        spaces.push(space);
    }

    town.entry_space = Some(nodes[0].id);
    town.spaces = spaces.iter().map(|s| s.id).collect();
    town.size_estimate = spaces.len() as u32;
    (town, nodes.to_vec(), spaces)
}

/// Templates every run needs: starter gear, basic stock, and the respawn
/// weapon looked up by name.
pub fn starter_templates() -> Vec<ItemTemplate> {
    let mut dagger = ItemTemplate::basic(STARTER_WEAPON, ItemType::Weapon, 5, 2);
    dagger.attack_bonus = 2;
    dagger.description = "Pitted, but it still has a point.".into();

    let mut sword = ItemTemplate::basic("Iron Sword", ItemType::Weapon, 40, 6);
    sword.attack_bonus = 5;

    let mut jerkin = ItemTemplate::basic("Leather Jerkin", ItemType::Armor, 25, 8);
    jerkin.armor_defense = 2;

    let mut torch = ItemTemplate::basic("Torch", ItemType::Tool, 3, 1);
    torch.description = "An hour of light, if the draft allows.".into();

    let mut draught = ItemTemplate::basic("Healing Draught", ItemType::Consumable, 12, 1);
    draught.heal_amount = Some(20);

    let mut spores = ItemTemplate::basic("Glowcap Spores", ItemType::Treasure, 18, 1);
    spores.description = "A pouch of faintly luminous spores, prized by the shrine.".into();

    vec![dagger, sword, jerkin, torch, draught, spores]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn ensure_world_is_idempotent() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let init = DungeonInitializer::new(&repos, &generator);

        let first = init.ensure_world(11, "Deep lore.", "the Undercroft").await.unwrap();
        let second = init.ensure_world(11, "Deep lore.", "the Undercroft").await.unwrap();
        assert_eq!(first.seed, second.seed);

        // The starting space resolves and is the town hub.
        let hub = repos
            .spaces
            .find_by_id(first.seed.starting_space_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.name, "Lanterncross Commons");
        assert!(!first.starter_quests.is_empty());
    }

    #[tokio::test]
    async fn chunk_tree_parents_contain_their_children() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let init = DungeonInitializer::new(&repos, &generator);
        init.ensure_world(11, "Deep lore.", "the Undercroft").await.unwrap();

        let chunks = repos.chunks.get_all().await.unwrap();
        for chunk in &chunks {
            if let Some(parent_id) = chunk.parent_id {
                let parent = repos
                    .chunks
                    .find_by_id(parent_id)
                    .await
                    .unwrap()
                    .unwrap_or_else(|| panic!("parent of {} missing", chunk.id));
                assert!(
                    parent.children.contains(&chunk.id),
                    "parent {} does not list child {}",
                    parent.id,
                    chunk.id
                );
            }
        }
    }

    #[tokio::test]
    async fn gate_and_delve_are_reciprocally_linked() {
        let (repos, _store) = testutil::repos();
        let generator = testutil::world_generator(&repos);
        let init = DungeonInitializer::new(&repos, &generator);
        let world = init.ensure_world(11, "Deep lore.", "the Undercroft").await.unwrap();

        let hub = repos
            .graph_nodes
            .find_by_id(world.seed.starting_space_id)
            .await
            .unwrap()
            .unwrap();
        let gate = hub
            .neighbors
            .iter()
            .find(|e| e.direction == Direction::North)
            .expect("hub links north to the gate");
        let gate_node = repos.graph_nodes.find_by_id(gate.target).await.unwrap().unwrap();
        let down = gate_node
            .neighbors
            .iter()
            .find(|e| e.direction == Direction::Down)
            .expect("gate has a way down");

        let delve_hub = repos
            .graph_nodes
            .find_by_id(down.target)
            .await
            .unwrap()
            .unwrap();
        assert!(delve_hub
            .neighbors
            .iter()
            .any(|e| e.target == gate_node.id && e.direction == Direction::Up));
        assert_ne!(delve_hub.chunk_id, gate_node.chunk_id);
    }
}
