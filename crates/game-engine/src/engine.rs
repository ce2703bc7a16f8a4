//! The engine proper: intent dispatch, the turn loop, and the glue
//! between world generation, combat, and the social systems.
//!
//! Within one player action, mutations commit in order: player state,
//! world entity state, scheduler insertions, event emissions. Events are
//! returned last so observers always see committed state.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ai_bridge::{ChatRequest, LlmClient};
use game_database::{MemoryStore, Repositories, SaveSystem};
use game_domain::{
    ActionEvent, CombatComponent, Component, DispositionEvent, DispositionTier, Entity, EntityId,
    GameEvent, GameTime, Intent, ItemQuality, Npc, PlayerState, QuestStatus, SpaceId, TradeAction,
    UnlockMethod,
    skill::skills as skill_names,
};

use crate::combat::corpse::{self, loot_into};
use crate::combat::death::handle_player_death;
use crate::combat::monster_ai::{MonsterAi, NpcAction};
use crate::combat::resolver::{
    resolve_attack, weapon_or_armor_slot, AttackerProfile, DefenderProfile, Slot,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::navigation::{MoveOutcome, Navigator};
use crate::quests;
use crate::scheduler::{action_cost, ActionKind};
use crate::skills as skill_engine;
use crate::social;
use crate::state::WorldState;
use crate::trading;
use crate::treasure;
use crate::worldgen::init::DungeonInitializer;
use crate::worldgen::lore::LoreEngine;
use crate::worldgen::{GenerationCache, WorldGenerator};

pub struct GameEngine {
    config: EngineConfig,
    repos: Repositories,
    store: Arc<MemoryStore>,
    generator: WorldGenerator,
    ai: MonsterAi,
    llm: Option<Arc<dyn LlmClient>>,
    save_system: SaveSystem,
    state: WorldState,
    rng: StdRng,
}

impl GameEngine {
    /// Boot the engine: ensure the world exists, stand the player up in
    /// town. Without an LLM client the world generates from deterministic
    /// fallbacks (the pre-baked sample world).
    pub async fn boot(
        config: EngineConfig,
        llm: Option<Arc<dyn LlmClient>>,
        player_name: &str,
        rng_seed: u64,
    ) -> EngineResult<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::boot_with(config, llm, player_name, rng_seed, store, SaveSystem::new()).await
    }

    pub async fn boot_with(
        config: EngineConfig,
        llm: Option<Arc<dyn LlmClient>>,
        player_name: &str,
        rng_seed: u64,
        store: Arc<MemoryStore>,
        save_system: SaveSystem,
    ) -> EngineResult<Self> {
        let repos = Repositories::from_store(store.clone());
        let cache = Arc::new(GenerationCache::new(config.cache_capacity));
        let lore = LoreEngine::new(llm.clone(), config.clone())?;
        let generator = WorldGenerator::new(repos.clone(), cache, lore, config.clone());
        let ai = MonsterAi::new(llm.clone(), config.model_id.clone());

        let init = DungeonInitializer::new(&repos, &generator);
        let world = init
            .ensure_world(rng_seed, &config.global_lore, &config.world_theme)
            .await?;

        let mut player = PlayerState::fresh(
            EntityId::new(),
            player_name,
            world.seed.starting_space_id,
        );
        if let Some(dagger) = repos
            .items
            .find_template_by_name(crate::worldgen::init::STARTER_WEAPON)
            .await?
        {
            player.equipped_weapon = Some(dagger.instantiate(ItemQuality::Poor));
        }
        player.inventory.gold = 15;

        let state = WorldState::new(player, world.seed, world.starter_quests);
        Ok(Self {
            rng: StdRng::seed_from_u64(rng_seed ^ 0x5eed),
            config,
            repos,
            store,
            generator,
            ai,
            llm,
            save_system,
            state,
        })
    }

    pub fn player(&self) -> &PlayerState {
        &self.state.player
    }

    pub fn game_time(&self) -> GameTime {
        self.state.game_time
    }

    pub fn queue_contains(&self, entity: EntityId) -> bool {
        self.state.queue.contains(entity)
    }

    /// Handle one intent, returning everything the front-end should show.
    /// Errors become second-person system events; no action is half-taken.
    pub async fn handle_intent(&mut self, intent: Intent) -> Vec<GameEvent> {
        match self.dispatch(intent).await {
            Ok(events) => events,
            Err(e) => vec![user_facing_error(&e)],
        }
    }

    async fn dispatch(&mut self, intent: Intent) -> EngineResult<Vec<GameEvent>> {
        tracing::debug!(?intent, tick = self.state.game_time, "dispatching intent");
        match intent {
            Intent::Move { dir } => self.handle_move(dir).await,
            Intent::Scout { dir } => self.handle_scout(dir).await,
            Intent::Travel { dir } => self.handle_travel(dir).await,
            Intent::Look { target } => self.handle_look(target).await,
            Intent::Search { target: _ } => self.handle_search().await,
            Intent::Interact { target } => self.handle_interact(&target).await,
            Intent::Inventory => Ok(self.handle_inventory()),
            Intent::Take { target } => self.handle_take(&target).await,
            Intent::TakeAll => self.handle_take_all().await,
            Intent::Drop { target } => self.handle_drop(&target).await,
            Intent::Give { item, npc } => self.handle_give(&item, &npc).await,
            Intent::Talk { npc } => self.handle_talk(&npc, None).await,
            Intent::Say { message, npc } => {
                let npc = npc.unwrap_or_default();
                self.handle_talk(&npc, Some(message)).await
            }
            Intent::Attack { target } => self.handle_attack(target.as_deref()).await,
            Intent::Equip { target } => self.handle_equip(&target).await,
            Intent::Use { target } => self.handle_use(&target).await,
            Intent::Check { target } => self.handle_check(&target).await,
            Intent::Persuade { target } => {
                self.handle_social_check(&target, skill_names::PERSUASION).await
            }
            Intent::Intimidate { target } => {
                self.handle_social_check(&target, skill_names::INTIMIDATION).await
            }
            Intent::Emote { kind, target } => Ok(self.handle_emote(&kind, target.as_deref())),
            Intent::AskQuestion { npc, topic } => self.handle_ask(&npc, &topic).await,
            Intent::UseSkill { skill, action } => self.handle_use_skill(&skill, &action).await,
            Intent::TrainSkill { skill, method: _ } => self.handle_train(&skill).await,
            Intent::ChoosePerk { skill, choice } => self.handle_choose_perk(&skill, &choice).await,
            Intent::ViewSkills => Ok(self.handle_view_skills()),
            Intent::Save { name } => self.handle_save(&name),
            Intent::Load { name } => self.handle_load(&name).await,
            Intent::Quests => Ok(self.handle_quests()),
            Intent::AcceptQuest { id } => Ok(self.handle_accept_quest(id)),
            Intent::AbandonQuest { id } => Ok(self.handle_abandon_quest(id)),
            Intent::ClaimReward { id } => self.handle_claim_reward(id).await,
            Intent::Help => Ok(vec![GameEvent::info(HELP_TEXT)]),
            Intent::Quit => Ok(vec![GameEvent::narrative(
                "You bank the lantern. The dark will keep until you return.",
            )]),
            Intent::Rest => self.handle_rest().await,
            Intent::LootCorpse => self.handle_loot_corpse().await,
            Intent::Trade { action, target, quantity, merchant } => {
                self.handle_trade(action, target.as_deref(), quantity.max(1), merchant.as_deref())
                    .await
            }
            Intent::Craft { recipe } => Ok(vec![GameEvent::narrative(format!(
                "You have neither forge nor tools for {recipe}; the smiths of Lanterncross might."
            ))]),
            Intent::Pickpocket { target } => self.handle_pickpocket(&target).await,
            Intent::Invalid { message } => Ok(vec![GameEvent::warning(message)]),
        }
    }

    // ========================================================================
    // MOVEMENT
    // ========================================================================

    async fn handle_move(&mut self, dir: game_domain::Direction) -> EngineResult<Vec<GameEvent>> {
        let left = self.state.player.current_room_id;
        let navigator = Navigator::new(&self.repos, &self.generator);
        let outcome = navigator
            .move_to(&mut self.state.player, &mut self.state.recent_visits, &dir)
            .await?;
        match outcome {
            MoveOutcome::Moved { events, entered } => {
                let mut events = [self.seal_treasure_room_on_exit(left).await?, events].concat();
                let (quest_events, completed) = quests::update_quests_after_action(
                    &mut self.state.player,
                    &ActionEvent::ExploreRoom { space_id: entered },
                );
                events.extend(quest_events);
                self.reward_quest_givers(completed, &mut events).await?;
                self.aggro_hostiles(entered, &mut events).await?;
                events.extend(self.advance(ActionKind::Move).await?);
                self.push_status(&mut events).await?;
                Ok(events)
            }
            MoveOutcome::NoSuchExit => Ok(vec![GameEvent::narrative(format!(
                "You see no way {dir}."
            ))]),
            MoveOutcome::Blocked(reason) => Ok(vec![GameEvent::narrative(reason)]),
        }
    }

    async fn handle_travel(&mut self, dir: game_domain::Direction) -> EngineResult<Vec<GameEvent>> {
        let before = self.state.player.current_room_id;
        let navigator = Navigator::new(&self.repos, &self.generator);
        let travel_events = navigator
            .travel(&mut self.state.player, &mut self.state.recent_visits, &dir)
            .await?;
        let arrived = self.state.player.current_room_id;
        let mut events = if arrived != before {
            [
                self.seal_treasure_room_on_exit(before).await?,
                travel_events,
            ]
            .concat()
        } else {
            travel_events
        };
        if arrived != before {
            let (quest_events, completed) = quests::update_quests_after_action(
                &mut self.state.player,
                &ActionEvent::ExploreRoom { space_id: arrived },
            );
            events.extend(quest_events);
            self.reward_quest_givers(completed, &mut events).await?;
            self.aggro_hostiles(arrived, &mut events).await?;
            events.extend(self.advance(ActionKind::Move).await?);
            self.push_status(&mut events).await?;
        }
        Ok(events)
    }

    async fn handle_scout(&mut self, dir: game_domain::Direction) -> EngineResult<Vec<GameEvent>> {
        skill_engine::unlock(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill_names::PERCEPTION,
            UnlockMethod::Use,
        )
        .await?;
        let navigator = Navigator::new(&self.repos, &self.generator);
        let (mut events, check) = navigator
            .scout(&mut self.state.player, &mut self.rng, &dir)
            .await?;
        if let Some(check) = check {
            let gain = skill_engine::xp_gain(15, check.success);
            skill_engine::grant_xp(
                &self.repos,
                self.state.player.id,
                &mut self.state.player.skills,
                skill_names::PERCEPTION,
                gain,
                check.success,
            )
            .await?;
            events.extend(self.advance(ActionKind::Hide).await?);
        }
        Ok(events)
    }

    // ========================================================================
    // OBSERVATION AND ITEMS
    // ========================================================================

    async fn handle_look(&mut self, target: Option<String>) -> EngineResult<Vec<GameEvent>> {
        let space = self.current_space().await?;
        if let Some(target) = target {
            let wanted = target.to_lowercase();
            for entity_id in &space.entities {
                if let Some(entity) = self.repos.entities.find_by_id(*entity_id).await? {
                    if entity.name().to_lowercase().contains(&wanted) {
                        let description = match &entity {
                            Entity::Npc(n) => n.description.clone(),
                            Entity::Item(i) => i.description.clone(),
                            Entity::Feature(f) => f.description.clone(),
                            Entity::Corpse(c) => {
                                format!("The {} lies where it fell.", c.name)
                            }
                        };
                        return Ok(vec![GameEvent::narrative(if description.is_empty() {
                            format!("You see nothing remarkable about the {}.", entity.name())
                        } else {
                            description
                        })]);
                    }
                }
            }
            return Ok(vec![GameEvent::narrative(format!(
                "You see no {wanted} here."
            ))]);
        }

        let mut text = format!("{}\n{}", space.name, space.description);
        let mut present = Vec::new();
        for entity_id in &space.entities {
            if let Some(entity) = self.repos.entities.find_by_id(*entity_id).await? {
                present.push(entity.name().to_string());
            }
        }
        if !present.is_empty() {
            text.push_str(&format!("\nHere: {}.", present.join(", ")));
        }
        let exits: Vec<String> = space
            .exits
            .iter()
            .filter(|e| {
                !e.hidden
                    || self
                        .state
                        .player
                        .revealed_exits
                        .contains(&game_domain::EdgeKey::new(space.id, &e.direction))
            })
            .map(|e| e.direction.to_string())
            .collect();
        if !exits.is_empty() {
            text.push_str(&format!("\nWays out: {}.", exits.join(", ")));
        }
        Ok(vec![GameEvent::narrative(text)])
    }

    async fn handle_search(&mut self) -> EngineResult<Vec<GameEvent>> {
        let space = self.current_space().await?;
        let mut found = Vec::new();
        for item in &space.items_dropped {
            found.push(item.name.clone());
        }
        for resource in &space.resources {
            found.push(format!("{} ({})", resource.name, resource.quantity));
        }
        let corpses = self
            .repos
            .corpses
            .find_by_space_id(space.id)
            .await?
            .len();
        if corpses > 0 {
            found.push("the remains of someone who came before".to_string());
        }
        let mut events = vec![if found.is_empty() {
            GameEvent::narrative("You turn over loose stone and find nothing worth keeping.")
        } else {
            GameEvent::narrative(format!("Your search turns up: {}.", found.join(", ")))
        }];
        events.extend(self.advance(ActionKind::Hide).await?);
        Ok(events)
    }

    fn handle_inventory(&mut self) -> Vec<GameEvent> {
        let inv = &self.state.player.inventory;
        let mut lines = vec![format!(
            "You carry {} gold; {}/{} weight.",
            inv.gold,
            inv.carried_weight(),
            inv.capacity
        )];
        for item in &inv.items {
            lines.push(format!("- {}", item.name));
        }
        if let Some(weapon) = &self.state.player.equipped_weapon {
            lines.push(format!("Wielding: {}.", weapon.name));
        }
        if let Some(armor) = &self.state.player.equipped_armor {
            lines.push(format!("Wearing: {}.", armor.name));
        }
        vec![GameEvent::info(lines.join("\n"))]
    }

    async fn handle_take(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        // Treasure pedestals answer to Take while one is in the room.
        if let Some(events) = self.try_take_from_pedestal(target).await? {
            return Ok(events);
        }

        let mut space = self.current_space().await?;
        let wanted = target.to_lowercase();
        let Some(index) = space
            .items_dropped
            .iter()
            .position(|i| i.name.to_lowercase().contains(&wanted))
        else {
            return Ok(vec![GameEvent::narrative(format!(
                "There is no {target} here to take."
            ))]);
        };
        let item = space.items_dropped[index].clone();
        if !self.state.player.inventory.can_add(&item) {
            return Err(EngineError::ConstraintViolated(
                "your pack cannot bear it".into(),
            ));
        }
        space.items_dropped.remove(index);
        let template_id = item.template_id;
        let name = item.name.clone();
        self.state.player.inventory.items.push(item);
        self.repos.spaces.save(&space).await?;

        let mut events = vec![GameEvent::narrative(format!("You take the {name}."))];
        let (quest_events, completed) = quests::update_quests_after_action(
            &mut self.state.player,
            &ActionEvent::CollectItem { template_id },
        );
        events.extend(quest_events);
        self.reward_quest_givers(completed, &mut events).await?;
        events.extend(self.advance(ActionKind::UseItem).await?);
        Ok(events)
    }

    async fn handle_take_all(&mut self) -> EngineResult<Vec<GameEvent>> {
        let mut space = self.current_space().await?;
        if space.items_dropped.is_empty() {
            return Ok(vec![GameEvent::narrative("There is nothing here to take.")]);
        }
        let mut taken = Vec::new();
        let mut left = Vec::new();
        let mut collected = Vec::new();
        for item in space.items_dropped.drain(..) {
            if self.state.player.inventory.can_add(&item) {
                taken.push(item.name.clone());
                collected.push(item.template_id);
                self.state.player.inventory.items.push(item);
            } else {
                left.push(item);
            }
        }
        let overflow = !left.is_empty();
        space.items_dropped = left;
        self.repos.spaces.save(&space).await?;

        let mut events = Vec::new();
        if !taken.is_empty() {
            events.push(GameEvent::narrative(format!(
                "You gather up: {}.",
                taken.join(", ")
            )));
        }
        if overflow {
            events.push(GameEvent::warning("Some of it will not fit in your pack."));
        }
        for template_id in collected {
            let (quest_events, completed) = quests::update_quests_after_action(
                &mut self.state.player,
                &ActionEvent::CollectItem { template_id },
            );
            events.extend(quest_events);
            self.reward_quest_givers(completed, &mut events).await?;
        }
        events.extend(self.advance(ActionKind::UseItem).await?);
        Ok(events)
    }

    async fn handle_drop(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        // Returning a treasure-room piece to its pedestal takes precedence
        // over dropping it on the floor.
        if let Some(events) = self.try_return_to_pedestal(target).await? {
            return Ok(events);
        }
        let wanted = target.to_lowercase();
        let Some(index) = self
            .state
            .player
            .inventory
            .items
            .iter()
            .position(|i| i.name.to_lowercase().contains(&wanted))
        else {
            return Ok(vec![GameEvent::narrative(format!(
                "You carry no {target}."
            ))]);
        };
        let item = self.state.player.inventory.items.remove(index);
        let name = item.name.clone();
        let mut space = self.current_space().await?;
        space.items_dropped.push(item);
        self.repos.spaces.save(&space).await?;
        let mut events = vec![GameEvent::narrative(format!(
            "You set the {name} down on the stone."
        ))];
        events.extend(self.advance(ActionKind::UseItem).await?);
        Ok(events)
    }

    async fn handle_give(&mut self, item_name: &str, npc_name: &str) -> EngineResult<Vec<GameEvent>> {
        let Some(npc) = self.find_npc(Some(npc_name)).await? else {
            return Ok(vec![GameEvent::narrative(format!(
                "No one called {npc_name} is here."
            ))]);
        };
        let wanted = item_name.to_lowercase();
        let Some(index) = self
            .state
            .player
            .inventory
            .items
            .iter()
            .position(|i| i.name.to_lowercase().contains(&wanted))
        else {
            return Ok(vec![GameEvent::narrative(format!(
                "You carry no {item_name}."
            ))]);
        };
        let item = self.state.player.inventory.items.remove(index);
        let template_id = item.template_id;
        let item_label = item.name.clone();

        let mut npc_inventory = self
            .repos
            .inventories
            .find_by_entity_id(npc.id)
            .await?
            .unwrap_or_else(|| game_domain::InventoryComponent::with_capacity(50));
        npc_inventory.items.push(item);
        self.repos.inventories.save(npc.id, &npc_inventory).await?;

        let mut events = vec![GameEvent::narrative(format!(
            "You hand the {item_label} to {}.",
            npc.name
        ))];
        let applied = social::apply_event(
            &self.repos,
            &mut self.state.queue,
            npc.id,
            DispositionEvent::HelpProvided,
            self.state.game_time,
        )
        .await?;
        if applied.de_escalated {
            events.push(GameEvent::narrative(format!(
                "{} lowers their guard; the fight has gone out of them.",
                npc.name
            )));
        }
        let (quest_events, completed) = quests::update_quests_after_action(
            &mut self.state.player,
            &ActionEvent::DeliverItem { template_id, npc_id: npc.id },
        );
        events.extend(quest_events);
        self.reward_quest_givers(completed, &mut events).await?;
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    // ========================================================================
    // COMBAT
    // ========================================================================

    async fn handle_attack(&mut self, target: Option<&str>) -> EngineResult<Vec<GameEvent>> {
        let Some(mut npc) = self.find_npc_preferring_hostile(target).await? else {
            return Ok(vec![GameEvent::narrative("There is nothing here to fight.")]);
        };

        let mut events = Vec::new();

        // Striking the peaceable is remembered.
        let unprovoked = !npc.is_hostile && npc.combat().is_none();
        if unprovoked {
            let applied = social::apply_event(
                &self.repos,
                &mut self.state.queue,
                npc.id,
                DispositionEvent::AttackedWithoutProvocation,
                self.state.game_time,
            )
            .await?;
            npc.is_hostile = true;
            if let Some(social_component) = npc.social_mut() {
                social_component.disposition = applied.disposition;
            }
            events.push(GameEvent::warning(format!(
                "{} will not forget this.",
                npc.name
            )));
        }

        let attacker = AttackerProfile::for_player(&self.state.player);
        let defender = DefenderProfile::for_npc(&npc, self.state.game_time);
        let outcome = resolve_attack(&mut self.rng, &attacker, &defender, npc.health);
        npc.health -= outcome.damage;
        events.push(GameEvent::Combat {
            text: if outcome.crit {
                format!(
                    "A perfect opening: you strike the {} for {} damage.",
                    npc.name, outcome.damage
                )
            } else {
                format!("You hit the {} for {} damage.", npc.name, outcome.damage)
            },
            damage: Some(outcome.damage),
        });

        let space_id = self.state.player.current_room_id;
        if outcome.died {
            self.state.queue.remove(npc.id);
            let death_events = corpse::handle_npc_death(
                &self.repos,
                &mut self.state.tracked_corpses,
                &npc,
                space_id,
                self.state.game_time,
                self.config.npc_corpse_decay,
            )
            .await?;
            events.extend(death_events);
            let (quest_events, completed) = quests::update_quests_after_action(
                &mut self.state.player,
                &ActionEvent::KillEnemy { npc_id: npc.id, name: npc.name.clone() },
            );
            events.extend(quest_events);
            self.reward_quest_givers(completed, &mut events).await?;
        } else {
            // The defender answers: schedule its counter-turn.
            if npc.combat().is_none() {
                npc.insert_component(Component::Combat(CombatComponent {
                    target: self.state.player.id,
                    engaged_since: self.state.game_time,
                    defending_until: None,
                }));
            }
            self.repos.entities.save(&Entity::Npc(npc.clone())).await?;
            let counter_at = self.state.game_time
                + action_cost(ActionKind::MeleeAttack, npc.stats.speed);
            self.state.queue.enqueue(npc.id, counter_at);
        }

        events.extend(self.advance(ActionKind::MeleeAttack).await?);
        self.push_status(&mut events).await?;
        Ok(events)
    }

    async fn handle_equip(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        let wanted = target.to_lowercase();
        let Some(index) = self
            .state
            .player
            .inventory
            .items
            .iter()
            .position(|i| i.name.to_lowercase().contains(&wanted))
        else {
            return Ok(vec![GameEvent::narrative(format!(
                "You carry no {target}."
            ))]);
        };
        let item = self.state.player.inventory.items[index].clone();
        let Some(slot) = weapon_or_armor_slot(&item) else {
            return Err(EngineError::InvalidArgument(format!(
                "the {} is nothing you can wield or wear",
                item.name
            )));
        };
        self.state.player.inventory.items.remove(index);
        let displaced = match slot {
            Slot::Weapon => self.state.player.equipped_weapon.replace(item.clone()),
            Slot::Armor => self.state.player.equipped_armor.replace(item.clone()),
        };
        if let Some(old) = displaced {
            self.state.player.inventory.items.push(old);
        }
        let mut events = vec![GameEvent::narrative(format!("You ready the {}.", item.name))];
        events.extend(self.advance(ActionKind::UseItem).await?);
        Ok(events)
    }

    async fn handle_use(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        let wanted = target.to_lowercase();
        let Some(index) = self
            .state
            .player
            .inventory
            .items
            .iter()
            .position(|i| i.name.to_lowercase().contains(&wanted))
        else {
            return Ok(vec![GameEvent::narrative(format!(
                "You carry no {target}."
            ))]);
        };
        let item = self.state.player.inventory.items[index].clone();
        let Some(heal) = item.heal_amount else {
            return Ok(vec![GameEvent::narrative(format!(
                "The {} does nothing you know how to use here.",
                item.name
            ))]);
        };
        self.state.player.inventory.items.remove(index);
        let healed = heal.min(self.state.player.max_health - self.state.player.health);
        self.state.player.health += healed;
        let mut events = vec![GameEvent::narrative(format!(
            "You drink the {}; warmth crawls back into you ({healed} health).",
            item.name
        ))];
        events.extend(self.advance(ActionKind::UseItem).await?);
        self.push_status(&mut events).await?;
        Ok(events)
    }

    async fn handle_rest(&mut self) -> EngineResult<Vec<GameEvent>> {
        let space_id = self.state.player.current_room_id;
        let navigator = Navigator::new(&self.repos, &self.generator);
        if navigator.space_has_hostiles(space_id).await? {
            return Err(EngineError::ConstraintViolated(
                "you cannot rest with something circling you in the dark".into(),
            ));
        }
        let healed = (self.state.player.max_health / 10)
            .max(1)
            .min(self.state.player.max_health - self.state.player.health);
        self.state.player.health += healed;
        let mut events = vec![GameEvent::narrative(if healed > 0 {
            format!("You rest against the cold stone and recover {healed} health.")
        } else {
            "You rest, though nothing ails you.".to_string()
        })];
        events.extend(self.advance(ActionKind::Move).await?);
        self.push_status(&mut events).await?;
        Ok(events)
    }

    async fn handle_loot_corpse(&mut self) -> EngineResult<Vec<GameEvent>> {
        let space = self.current_space().await?;
        let mut events = Vec::new();

        // NPC remains first.
        for entity_id in space.entities.clone() {
            if let Some(Entity::Corpse(mut remains)) =
                self.repos.entities.find_by_id(entity_id).await?
            {
                let (taken, overflow) = loot_into(
                    &mut self.state.player.inventory,
                    &mut remains.contents,
                    &mut remains.gold_amount,
                );
                self.repos.entities.save(&Entity::Corpse(remains)).await?;
                if !taken.is_empty() {
                    for name in &taken {
                        events.push(GameEvent::narrative(format!("You take the {name}.")));
                    }
                }
                if overflow {
                    events.push(GameEvent::warning("Some of it will not fit in your pack."));
                }
            }
        }

        // Then any recoverable player corpse.
        for mut corpse in self.repos.corpses.find_by_space_id(space.id).await? {
            if corpse.looted {
                continue;
            }
            let mut gold = corpse.gold;
            let mut contents: Vec<_> = corpse
                .inventory
                .drain(..)
                .chain(corpse.equipment.drain(..))
                .collect();
            let (taken, overflow) =
                loot_into(&mut self.state.player.inventory, &mut contents, &mut gold);
            corpse.inventory = contents;
            corpse.gold = gold;
            corpse.looted = corpse.inventory.is_empty();
            self.repos.corpses.save(&corpse).await?;
            if !taken.is_empty() {
                events.push(GameEvent::narrative(format!(
                    "You recover what the dark did not keep: {}.",
                    taken.join(", ")
                )));
            }
            if overflow {
                events.push(GameEvent::warning("Some of it will not fit in your pack."));
            }
        }

        if events.is_empty() {
            events.push(GameEvent::narrative("There are no remains here to loot."));
        } else {
            events.extend(self.advance(ActionKind::UseItem).await?);
        }
        Ok(events)
    }

    // ========================================================================
    // SOCIAL
    // ========================================================================

    async fn handle_talk(
        &mut self,
        npc_name: &str,
        said: Option<String>,
    ) -> EngineResult<Vec<GameEvent>> {
        let Some(npc) = self.find_npc(if npc_name.is_empty() { None } else { Some(npc_name) }).await?
        else {
            return Ok(vec![GameEvent::narrative("No one here is listening.")]);
        };
        let tier = self.disposition_tier(&npc).await?;
        let line = self
            .npc_line(&npc, tier, said.as_deref().unwrap_or("a greeting"))
            .await;
        let mut events = vec![GameEvent::narrative(format!("{}: \"{line}\"", npc.name))];

        let (quest_events, completed) = quests::update_quests_after_action(
            &mut self.state.player,
            &ActionEvent::TalkToNpc { npc_id: npc.id },
        );
        events.extend(quest_events);
        self.reward_quest_givers(completed, &mut events).await?;
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    async fn handle_social_check(
        &mut self,
        target: &str,
        skill: &str,
    ) -> EngineResult<Vec<GameEvent>> {
        let Some(npc) = self.find_npc(Some(target)).await? else {
            return Ok(vec![GameEvent::narrative(format!(
                "No one called {target} is here."
            ))]);
        };
        skill_engine::unlock(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            UnlockMethod::Use,
        )
        .await?;
        let check = skill_engine::check_skill(
            &mut self.rng,
            &self.state.player.skills,
            0,
            skill,
            12,
        );
        let event = if skill == skill_names::PERSUASION {
            DispositionEvent::PersuasionAttempt {
                success: check.success,
                margin: check.margin,
            }
        } else {
            DispositionEvent::IntimidationAttempt {
                success: check.success,
                margin: check.margin,
            }
        };
        let applied = social::apply_event(
            &self.repos,
            &mut self.state.queue,
            npc.id,
            event,
            self.state.game_time,
        )
        .await?;

        let mut events = vec![GameEvent::narrative(if check.success {
            format!(
                "Your words land. {} regards you differently now ({}).",
                npc.name, applied.tier
            )
        } else {
            format!("{} is unmoved.", npc.name)
        })];
        if applied.de_escalated {
            events.push(GameEvent::narrative(format!(
                "{} lowers their weapon. The moment passes.",
                npc.name
            )));
        }

        let gain = skill_engine::xp_gain(20, check.success);
        skill_engine::grant_xp(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            gain,
            check.success,
        )
        .await?;
        let (quest_events, completed) = quests::update_quests_after_action(
            &mut self.state.player,
            &ActionEvent::UseSkill { skill: skill.to_string() },
        );
        events.extend(quest_events);
        self.reward_quest_givers(completed, &mut events).await?;
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    fn handle_emote(&mut self, kind: &str, target: Option<&str>) -> Vec<GameEvent> {
        let text = match target {
            Some(target) => format!("You {kind} at {target}."),
            None => format!("You {kind}, and the dark takes no notice."),
        };
        vec![GameEvent::narrative(text)]
    }

    async fn handle_ask(&mut self, npc_name: &str, topic: &str) -> EngineResult<Vec<GameEvent>> {
        let Some(npc) = self.find_npc(Some(npc_name)).await? else {
            return Ok(vec![GameEvent::narrative(format!(
                "No one called {npc_name} is here."
            ))]);
        };
        let tier = self.disposition_tier(&npc).await?;
        if tier == DispositionTier::Hostile {
            return Ok(vec![GameEvent::narrative(format!(
                "{} answers with a bared blade.",
                npc.name
            ))]);
        }

        // Embedding search when a model is on hand, topic match otherwise.
        let fragments = match &self.llm {
            Some(llm) => match llm
                .create_embedding(topic, &self.config.embedding_model)
                .await
            {
                Ok(vector) => self.repos.knowledge.search(&vector, 3).await?,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding failed, topic search instead");
                    self.repos.knowledge.by_topic(topic).await?
                }
            },
            None => self.repos.knowledge.by_topic(topic).await?,
        };

        let mut events = Vec::new();
        if fragments.is_empty() {
            events.push(GameEvent::narrative(format!(
                "{} shrugs. \"Ask the warden about {topic}; I keep to my own tunnels.\"",
                npc.name
            )));
        } else {
            let known = fragments
                .iter()
                .map(|f| f.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            events.push(GameEvent::narrative(format!("{}: \"{known}\"", npc.name)));
        }
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    async fn handle_pickpocket(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        let Some(mut npc) = self.find_npc(Some(target)).await? else {
            return Ok(vec![GameEvent::narrative(format!(
                "No one called {target} is here."
            ))]);
        };
        skill_engine::unlock(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill_names::STEALTH,
            UnlockMethod::Use,
        )
        .await?;
        let check = skill_engine::check_skill(
            &mut self.rng,
            &self.state.player.skills,
            0,
            skill_names::STEALTH,
            14,
        );
        let gain = skill_engine::xp_gain(25, check.success);
        skill_engine::grant_xp(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill_names::STEALTH,
            gain,
            check.success,
        )
        .await?;

        let mut events = Vec::new();
        if check.success {
            let mut npc_inventory = self
                .repos
                .inventories
                .find_by_entity_id(npc.id)
                .await?
                .unwrap_or_else(|| game_domain::InventoryComponent::with_capacity(0));
            let lifted = (npc_inventory.gold / 4).clamp(0, 20);
            npc_inventory.gold -= lifted;
            self.repos.inventories.save(npc.id, &npc_inventory).await?;
            self.state.player.inventory.gold += lifted;
            events.push(GameEvent::narrative(if lifted > 0 {
                format!("Your fingers come back with {lifted} gold.")
            } else {
                "Their pockets hold nothing but lint and grit.".to_string()
            }));
        } else {
            // Caught in the act.
            npc.is_hostile = true;
            npc.insert_component(Component::Combat(CombatComponent {
                target: self.state.player.id,
                engaged_since: self.state.game_time,
                defending_until: None,
            }));
            self.repos.entities.save(&Entity::Npc(npc.clone())).await?;
            self.state.queue.enqueue(
                npc.id,
                self.state.game_time + action_cost(ActionKind::MeleeAttack, npc.stats.speed),
            );
            events.push(GameEvent::warning(format!(
                "{} catches your wrist mid-reach.",
                npc.name
            )));
        }
        events.extend(self.advance(ActionKind::Hide).await?);
        Ok(events)
    }

    // ========================================================================
    // SKILLS
    // ========================================================================

    async fn handle_use_skill(&mut self, skill: &str, action: &str) -> EngineResult<Vec<GameEvent>> {
        skill_engine::unlock(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            UnlockMethod::Use,
        )
        .await?;
        let check =
            skill_engine::check_skill(&mut self.rng, &self.state.player.skills, 0, skill, 10);
        let gain = skill_engine::xp_gain(15, check.success);
        skill_engine::grant_xp(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            gain,
            check.success,
        )
        .await?;

        let mut events = vec![GameEvent::narrative(if check.success {
            format!("You put your {skill} to work on {action}, and it answers.")
        } else {
            format!("Your attempt at {action} goes poorly.")
        })];
        let (quest_events, completed) = quests::update_quests_after_action(
            &mut self.state.player,
            &ActionEvent::UseSkill { skill: skill.to_string() },
        );
        events.extend(quest_events);
        self.reward_quest_givers(completed, &mut events).await?;
        events.extend(self.advance(ActionKind::Hide).await?);
        Ok(events)
    }

    async fn handle_train(&mut self, skill: &str) -> EngineResult<Vec<GameEvent>> {
        // Training needs a willing mentor in the room.
        let space = self.current_space().await?;
        let mut mentor = None;
        for entity_id in &space.entities {
            if let Some(Entity::Npc(npc)) = self.repos.entities.find_by_id(*entity_id).await? {
                let social_component = self.repos.social_components.load(npc.id).await?;
                let teachable = social_component
                    .as_ref()
                    .or(npc.social())
                    .map(|s| {
                        s.teachable_skills.iter().any(|t| t.eq_ignore_ascii_case(skill))
                    })
                    .unwrap_or(false);
                if !teachable {
                    continue;
                }
                let disposition = social_component
                    .or_else(|| npc.social().cloned())
                    .map(|s| s.disposition)
                    .unwrap_or(0);
                mentor = Some((npc, DispositionTier::from_value(disposition)));
                break;
            }
        }
        let Some((mentor, tier)) = mentor else {
            return Ok(vec![GameEvent::narrative(format!(
                "No one here can teach you {skill}."
            ))]);
        };
        let Some(multiplier) = tier.training_multiplier() else {
            return Err(EngineError::ConstraintViolated(format!(
                "{} does not trust you enough to teach you anything",
                mentor.name
            )));
        };

        skill_engine::unlock(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            UnlockMethod::Training,
        )
        .await?;
        let gain = (100.0 * multiplier) as u64;
        let (_, level) = skill_engine::grant_xp(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            gain,
            true,
        )
        .await?;

        let mut events = vec![GameEvent::narrative(format!(
            "{} drills you until your hands remember on their own. ({gain} {skill} xp, level {level})",
            mentor.name
        ))];
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    async fn handle_choose_perk(&mut self, skill: &str, choice: &str) -> EngineResult<Vec<GameEvent>> {
        skill_engine::choose_perk(
            &self.repos,
            self.state.player.id,
            &mut self.state.player.skills,
            skill,
            choice,
        )
        .await?;
        Ok(vec![GameEvent::info(format!(
            "{choice} is yours; your {skill} deepens."
        ))])
    }

    fn handle_view_skills(&mut self) -> Vec<GameEvent> {
        let skills = &self.state.player.skills;
        if skills.skills.is_empty() {
            return vec![GameEvent::info("You have learned nothing yet.")];
        }
        let mut lines = Vec::new();
        let mut names: Vec<_> = skills.skills.keys().collect();
        names.sort();
        for name in names {
            let state = &skills.skills[name];
            if !state.unlocked {
                continue;
            }
            let mut line = format!("{name}: level {} ({} xp)", state.level, state.xp);
            if state.pending_perk_choices > 0 {
                line.push_str(&format!(
                    " - {} perk choice(s) waiting",
                    state.pending_perk_choices
                ));
            }
            lines.push(line);
        }
        vec![GameEvent::info(lines.join("\n"))]
    }

    // ========================================================================
    // QUESTS AND TRADE
    // ========================================================================

    fn handle_quests(&mut self) -> Vec<GameEvent> {
        let mut lines = Vec::new();
        for quest in &self.state.player.active_quests {
            let progress = quest.objectives.iter().filter(|o| o.done).count();
            lines.push(format!(
                "{} [{}/{} objectives]{}",
                quest.name,
                progress,
                quest.objectives.len(),
                if quest.status == QuestStatus::Completed {
                    " - ready to claim"
                } else {
                    ""
                }
            ));
        }
        for quest in &self.state.available_quests {
            lines.push(format!("(offered) {}: {}", quest.name, quest.description));
        }
        if lines.is_empty() {
            lines.push("No work on your ledger.".to_string());
        }
        vec![GameEvent::info(lines.join("\n"))]
    }

    fn handle_accept_quest(&mut self, id: game_domain::QuestId) -> Vec<GameEvent> {
        let Some(index) = self.state.available_quests.iter().position(|q| q.id == id) else {
            return vec![GameEvent::warning("No such offer stands.")];
        };
        let mut quest = self.state.available_quests.remove(index);
        quest.status = QuestStatus::Active;
        let name = quest.name.clone();
        let quest_id = quest.id;
        self.state.player.active_quests.push(quest);
        vec![GameEvent::Quest {
            text: format!("You take on: {name}."),
            quest_id: Some(quest_id),
        }]
    }

    fn handle_abandon_quest(&mut self, id: game_domain::QuestId) -> Vec<GameEvent> {
        match quests::abandon(&mut self.state.player, id) {
            Some(quest) => vec![GameEvent::Quest {
                text: format!("You let {} go.", quest.name),
                quest_id: Some(quest.id),
            }],
            None => vec![GameEvent::warning("That is not work you hold.")],
        }
    }

    async fn handle_claim_reward(&mut self, id: game_domain::QuestId) -> EngineResult<Vec<GameEvent>> {
        match quests::claim_reward(&mut self.state.player, id) {
            Some(quest) => Ok(vec![GameEvent::Quest {
                text: format!(
                    "The ledger closes on {}: {} gold is yours.",
                    quest.name, quest.reward_gold
                ),
                quest_id: Some(quest.id),
            }]),
            None => Err(EngineError::ConstraintViolated(
                "nothing there is finished enough to claim".into(),
            )),
        }
    }

    async fn handle_trade(
        &mut self,
        action: TradeAction,
        target: Option<&str>,
        quantity: u32,
        merchant_name: Option<&str>,
    ) -> EngineResult<Vec<GameEvent>> {
        let Some(mut merchant) = self.find_merchant(merchant_name).await? else {
            return Ok(vec![GameEvent::narrative("No one here is selling.")]);
        };
        let tier = self.disposition_tier(&merchant).await?;

        let mut events = Vec::new();
        match action {
            TradeAction::List => {
                let Some(trading) = merchant.trading() else {
                    return Ok(vec![GameEvent::narrative("Their stall is bare.")]);
                };
                let mut lines = vec![format!("{} shows you the goods:", merchant.name)];
                for entry in &trading.stock {
                    if entry.quantity == 0 {
                        continue;
                    }
                    if let Some(template) =
                        self.repos.items.find_template(entry.template_id).await?
                    {
                        let price =
                            trading::calculate_buy_price(&template, ItemQuality::Common, tier);
                        lines.push(format!(
                            "- {} x{} at {price} gold",
                            template.name, entry.quantity
                        ));
                    }
                }
                events.push(GameEvent::info(lines.join("\n")));
            }
            TradeAction::Buy => {
                let Some(item_name) = target else {
                    return Err(EngineError::InvalidArgument("buy what?".into()));
                };
                for _ in 0..quantity {
                    let message = trading::buy_from_merchant(
                        &self.repos,
                        &mut merchant,
                        &mut self.state.player.inventory,
                        item_name,
                        tier,
                    )
                    .await?;
                    events.push(GameEvent::narrative(message));
                }
                self.repos.entities.save(&Entity::Npc(merchant.clone())).await?;
            }
            TradeAction::Sell => {
                let Some(item_name) = target else {
                    return Err(EngineError::InvalidArgument("sell what?".into()));
                };
                for _ in 0..quantity {
                    let message = trading::sell_to_merchant(
                        &self.repos,
                        &mut merchant,
                        &mut self.state.player.inventory,
                        item_name,
                        tier,
                    )
                    .await?;
                    events.push(GameEvent::narrative(message));
                }
                self.repos.entities.save(&Entity::Npc(merchant.clone())).await?;
            }
        }
        events.extend(self.advance(ActionKind::Social).await?);
        Ok(events)
    }

    async fn handle_check(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        if let Some(state) = self.state.player.skills.get(target) {
            return Ok(vec![GameEvent::info(format!(
                "{target}: level {}, {} xp, {} perk(s).",
                state.level,
                state.xp,
                state.perks.len()
            ))]);
        }
        if let Some(npc) = self.find_npc(Some(target)).await? {
            let tier = self.disposition_tier(&npc).await?;
            return Ok(vec![GameEvent::narrative(format!(
                "{} seems {tier} toward you.",
                npc.name
            ))]);
        }
        if let Some(item) = self.state.player.inventory.find_by_name(target) {
            return Ok(vec![GameEvent::info(format!(
                "{}: weight {}, {:?} quality.",
                item.name, item.weight, item.quality
            ))]);
        }
        Ok(vec![GameEvent::narrative(format!(
            "You find nothing to say about {target}."
        ))])
    }

    async fn handle_interact(&mut self, target: &str) -> EngineResult<Vec<GameEvent>> {
        let space = self.current_space().await?;
        let wanted = target.to_lowercase();
        for entity_id in &space.entities {
            if let Some(Entity::Feature(feature)) =
                self.repos.entities.find_by_id(*entity_id).await?
            {
                if !feature.name.to_lowercase().contains(&wanted) {
                    continue;
                }
                if let Some(room) = &feature.treasure {
                    let mut lines = vec![feature.description.clone()];
                    for pedestal in &room.pedestals {
                        let state = match pedestal.state {
                            game_domain::PedestalState::Available => "waiting",
                            game_domain::PedestalState::Locked => "sealed",
                            game_domain::PedestalState::Empty => "bare",
                        };
                        let label = pedestal
                            .item
                            .as_ref()
                            .map(|i| i.name.clone())
                            .unwrap_or_else(|| "nothing".into());
                        lines.push(format!("A pedestal ({state}): {label}."));
                    }
                    return Ok(vec![GameEvent::narrative(lines.join("\n"))]);
                }
                return Ok(vec![GameEvent::narrative(feature.description.clone())]);
            }
        }
        Ok(vec![GameEvent::narrative(format!(
            "Nothing here answers to {target}."
        ))])
    }

    // ========================================================================
    // SAVE / LOAD
    // ========================================================================

    fn handle_save(&mut self, name: &str) -> EngineResult<Vec<GameEvent>> {
        let snapshot = SaveSystem::capture(
            name,
            &self.store,
            &self.state.player,
            self.state.game_time,
        );
        let path = self.save_system.save(&snapshot)?;
        Ok(vec![GameEvent::info(format!(
            "Saved '{name}' ({}).",
            path.display()
        ))])
    }

    async fn handle_load(&mut self, name: &str) -> EngineResult<Vec<GameEvent>> {
        let snapshot = self.save_system.load(name)?;
        let (player, game_time) = SaveSystem::restore(snapshot, &self.store);
        self.state.player = player;
        self.state.game_time = game_time;
        self.state.queue.clear();
        self.state.recent_visits.clear();
        self.state.tracked_corpses = self.rebuild_corpse_tracker();
        let seed = self
            .repos
            .world_seed
            .get()
            .await?
            .ok_or_else(|| EngineError::Initialization("loaded world has no seed".into()))?;
        self.state.seed = seed;

        let mut events = vec![GameEvent::info(format!("Loaded '{name}'."))];
        self.push_status(&mut events).await?;
        Ok(events)
    }

    /// Corpse entities are rediscovered from the store after a load.
    fn rebuild_corpse_tracker(&self) -> crate::combat::corpse::TrackedCorpses {
        let snapshot = self.store.snapshot();
        let mut tracked = Vec::new();
        for space in &snapshot.spaces {
            for entity in &snapshot.entities {
                if let Entity::Corpse(c) = entity {
                    if space.entities.contains(&c.id) {
                        tracked.push((c.id, space.id));
                    }
                }
            }
        }
        tracked
    }

    // ========================================================================
    // THE TURN LOOP
    // ========================================================================

    /// Advance the logical clock by the player's action cost and let the
    /// world catch up: respawns, decay, and every NPC turn that came due.
    async fn advance(&mut self, kind: ActionKind) -> EngineResult<Vec<GameEvent>> {
        let cost = action_cost(kind, self.state.player.stats.speed);
        let now = self.state.game_time + cost;
        self.state.game_time = now;
        let mut events = Vec::new();

        // Respawns first: the world refills before it acts.
        for entry in self.repos.respawns.find_ready_to_respawn(now).await? {
            let mut entity = entry.component.template.clone();
            if let Some(npc) = entity.as_npc_mut() {
                npc.health = npc.max_health;
                npc.clear_combat();
            }
            self.repos.entities.save(&entity).await?;
            if let Some(mut space) = self.repos.spaces.find_by_id(entry.space_id).await? {
                if !space.entities.contains(&entry.entity_id) {
                    space.entities.push(entry.entity_id);
                    self.repos.spaces.save(&space).await?;
                }
            }
            self.repos.respawns.reset_timer(entry.entity_id).await?;
            tracing::debug!(entity = %entry.entity_id, "respawned");
        }

        // Corpses rot on the same clock.
        let (decay_events, _destroyed) = corpse::tick_decay(
            &self.repos,
            &mut self.state.tracked_corpses,
            cost,
            now,
        )
        .await?;
        events.extend(decay_events);

        // Every entity whose turn came due acts, in (tick, seq) order.
        for npc_id in self.state.queue.poll_due_before(now) {
            let turn_events = self.take_npc_turn(npc_id, now).await?;
            events.extend(turn_events);
            if self.state.player.is_dead() {
                // Death already rebuilt the player; stop the round.
                self.state.queue.clear();
                break;
            }
        }
        Ok(events)
    }

    async fn take_npc_turn(&mut self, npc_id: EntityId, now: GameTime) -> EngineResult<Vec<GameEvent>> {
        let Some(Entity::Npc(mut npc)) = self.repos.entities.find_by_id(npc_id).await? else {
            return Ok(Vec::new());
        };
        if npc.health <= 0 {
            return Ok(Vec::new());
        }

        // An NPC the player walked away from disengages.
        let player_space = self.current_space().await?;
        if !player_space.entities.contains(&npc_id) {
            npc.clear_combat();
            self.repos.entities.save(&Entity::Npc(npc)).await?;
            return Ok(Vec::new());
        }

        let has_heal = self
            .repos
            .inventories
            .find_by_entity_id(npc_id)
            .await?
            .map(|inv| inv.items.iter().any(|i| i.heal_amount.is_some()))
            .unwrap_or(false);
        let action = self.ai.decide(&npc, has_heal).await;
        let mut events = Vec::new();
        let mut reschedule = true;
        let kind;

        match action {
            NpcAction::Attack => {
                kind = ActionKind::MeleeAttack;
                let attacker = AttackerProfile::for_npc(&npc);
                let defender = DefenderProfile::for_player(&self.state.player);
                let outcome = resolve_attack(
                    &mut self.rng,
                    &attacker,
                    &defender,
                    self.state.player.health,
                );
                self.state.player.health -= outcome.damage;
                events.push(GameEvent::Combat {
                    text: format!(
                        "The {} tears into you for {} damage{}.",
                        npc.name,
                        outcome.damage,
                        if outcome.crit { " - a savage blow" } else { "" }
                    ),
                    damage: Some(outcome.damage),
                });
                if self.state.player.is_dead() {
                    let town = self.state.seed.starting_space_id;
                    let death_events = handle_player_death(
                        &self.repos,
                        &mut self.state.tracked_corpses,
                        &mut self.state.player,
                        now,
                        self.config.player_corpse_decay,
                        self.config.player_corpse_decay_local,
                        town,
                    )
                    .await?;
                    events.extend(death_events);
                    reschedule = false;
                }
            }
            NpcAction::Defend => {
                kind = ActionKind::Defend;
                let until = now + action_cost(ActionKind::Defend, npc.stats.speed);
                match npc.components.get_mut(&game_domain::ComponentType::Combat) {
                    Some(Component::Combat(combat)) => combat.defending_until = Some(until),
                    _ => npc.insert_component(Component::Combat(CombatComponent {
                        target: self.state.player.id,
                        engaged_since: now,
                        defending_until: Some(until),
                    })),
                }
                events.push(GameEvent::Combat {
                    text: format!("The {} coils in on itself, guarding.", npc.name),
                    damage: None,
                });
            }
            NpcAction::Flee => {
                kind = ActionKind::Flee;
                reschedule = false;
                let fled = self.flee_to_neighbor(&mut npc).await?;
                events.push(GameEvent::Combat {
                    text: if fled {
                        format!("The {} breaks and runs into the dark.", npc.name)
                    } else {
                        format!("The {} scrabbles for an exit and finds none.", npc.name)
                    },
                    damage: None,
                });
                if !fled {
                    reschedule = true;
                }
            }
            NpcAction::UseItem => {
                kind = ActionKind::UseItem;
                if let Some(mut inventory) =
                    self.repos.inventories.find_by_entity_id(npc_id).await?
                {
                    if let Some(index) =
                        inventory.items.iter().position(|i| i.heal_amount.is_some())
                    {
                        let item = inventory.items.remove(index);
                        let heal = item.heal_amount.unwrap_or(0);
                        npc.health = (npc.health + heal).min(npc.max_health);
                        self.repos.inventories.save(npc_id, &inventory).await?;
                        events.push(GameEvent::Combat {
                            text: format!("The {} gulps something down and steadies.", npc.name),
                            damage: None,
                        });
                    }
                }
            }
            NpcAction::Wait => {
                kind = ActionKind::Defend;
                events.push(GameEvent::Combat {
                    text: format!("The {} watches you, waiting.", npc.name),
                    damage: None,
                });
            }
        }

        if npc.health > 0 {
            self.repos.entities.save(&Entity::Npc(npc.clone())).await?;
        }
        if reschedule {
            self.state
                .queue
                .enqueue(npc_id, now + action_cost(kind, npc.stats.speed));
        }
        Ok(events)
    }

    async fn flee_to_neighbor(&mut self, npc: &mut Npc) -> EngineResult<bool> {
        let space_id = self.state.player.current_room_id;
        let Some(node) = self.repos.graph_nodes.find_by_id(space_id).await? else {
            return Ok(false);
        };
        let open: Vec<SpaceId> = node
            .neighbors
            .iter()
            .filter(|e| !e.hidden)
            .map(|e| e.target)
            .collect();
        if open.is_empty() {
            return Ok(false);
        }
        let target = open[self.rng.random_range(0..open.len())];
        let Some(mut here) = self.repos.spaces.find_by_id(space_id).await? else {
            return Ok(false);
        };
        let Some(mut there) = self.repos.spaces.find_by_id(target).await? else {
            return Ok(false);
        };
        here.entities.retain(|e| *e != npc.id);
        there.entities.push(npc.id);
        npc.clear_combat();
        self.repos.spaces.save(&here).await?;
        self.repos.spaces.save(&there).await?;
        Ok(true)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn current_space(&self) -> EngineResult<game_domain::Space> {
        self.repos
            .spaces
            .find_by_id(self.state.player.current_room_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "space {}",
                    self.state.player.current_room_id
                ))
            })
    }

    async fn find_npc(&self, name: Option<&str>) -> EngineResult<Option<Npc>> {
        let space = self.current_space().await?;
        let wanted = name.map(str::to_lowercase);
        for entity_id in &space.entities {
            if let Some(Entity::Npc(npc)) = self.repos.entities.find_by_id(*entity_id).await? {
                match &wanted {
                    Some(wanted) if !npc.name.to_lowercase().contains(wanted) => continue,
                    _ => return Ok(Some(npc)),
                }
            }
        }
        Ok(None)
    }

    /// Unnamed attacks pick a hostile first, then anyone.
    async fn find_npc_preferring_hostile(&self, name: Option<&str>) -> EngineResult<Option<Npc>> {
        if name.is_some() {
            return self.find_npc(name).await;
        }
        let space = self.current_space().await?;
        let mut first = None;
        for entity_id in &space.entities {
            if let Some(Entity::Npc(npc)) = self.repos.entities.find_by_id(*entity_id).await? {
                if npc.is_hostile && npc.health > 0 {
                    return Ok(Some(npc));
                }
                first.get_or_insert(npc);
            }
        }
        Ok(first)
    }

    async fn find_merchant(&self, name: Option<&str>) -> EngineResult<Option<Npc>> {
        let space = self.current_space().await?;
        let wanted = name.map(str::to_lowercase);
        for entity_id in &space.entities {
            if let Some(Entity::Npc(npc)) = self.repos.entities.find_by_id(*entity_id).await? {
                if npc.trading().is_none() {
                    continue;
                }
                match &wanted {
                    Some(wanted) if !npc.name.to_lowercase().contains(wanted) => continue,
                    _ => return Ok(Some(npc)),
                }
            }
        }
        Ok(None)
    }

    async fn disposition_tier(&self, npc: &Npc) -> EngineResult<DispositionTier> {
        let disposition = self
            .repos
            .social_components
            .load(npc.id)
            .await?
            .or_else(|| npc.social().cloned())
            .map(|s| s.disposition)
            .unwrap_or(0);
        Ok(DispositionTier::from_value(disposition))
    }

    /// NPC speech: the model with a tone brief when available, canned
    /// lines per tier otherwise.
    async fn npc_line(&self, npc: &Npc, tier: DispositionTier, heard: &str) -> String {
        if let Some(llm) = &self.llm {
            let request = ChatRequest {
                model: self.config.model_id.clone(),
                system_prompt: format!(
                    "You voice {} in an underground settlement. {} One or two sentences, \
                     speech only, no quotation marks.",
                    npc.name,
                    social::dialogue_tone(tier)
                ),
                user_context: format!("The traveler says: {heard}"),
                max_tokens: 80,
                temperature: 0.8,
            };
            if let Ok(line) = llm.chat_completion(request).await {
                let line = line.trim().trim_matches('"').to_string();
                if !line.is_empty() {
                    return line;
                }
            }
        }
        match tier {
            DispositionTier::Hostile => "Walk away while you still have knees.".into(),
            DispositionTier::Unfriendly => "Say what you want and be gone.".into(),
            DispositionTier::Neutral => "Well met, traveler. Mind the drop.".into(),
            DispositionTier::Friendly => {
                "Good to see a friendly face down here. Sit, the stone is warm by the lamp.".into()
            }
            DispositionTier::Allied => {
                "Whatever you need, it is yours. We do not forget our own.".into()
            }
        }
    }

    async fn try_take_from_pedestal(&mut self, target: &str) -> EngineResult<Option<Vec<GameEvent>>> {
        let space = self.current_space().await?;
        let wanted = target.to_lowercase();
        for entity_id in &space.entities {
            let Some(Entity::Feature(mut feature)) =
                self.repos.entities.find_by_id(*entity_id).await?
            else {
                continue;
            };
            let Some(room) = feature.treasure.as_mut() else {
                continue;
            };
            let Some(template_id) = room
                .pedestals
                .iter()
                .find(|p| {
                    p.item
                        .as_ref()
                        .is_some_and(|i| i.name.to_lowercase().contains(&wanted))
                })
                .map(|p| p.template_id)
            else {
                continue;
            };
            let name = treasure::take_item(
                room,
                &mut self.state.player.inventory,
                template_id,
            )?;
            self.repos.entities.save(&Entity::Feature(feature)).await?;
            let mut events = vec![GameEvent::narrative(format!(
                "You lift the {name}. Around you, stone grinds: the other pedestals seal."
            ))];
            events.extend(self.advance(ActionKind::UseItem).await?);
            return Ok(Some(events));
        }
        Ok(None)
    }

    /// Walking out while holding the room's due loots it permanently.
    async fn seal_treasure_room_on_exit(
        &mut self,
        left: SpaceId,
    ) -> EngineResult<Vec<GameEvent>> {
        let Some(space) = self.repos.spaces.find_by_id(left).await? else {
            return Ok(Vec::new());
        };
        for entity_id in &space.entities {
            let Some(Entity::Feature(mut feature)) =
                self.repos.entities.find_by_id(*entity_id).await?
            else {
                continue;
            };
            let Some(room) = feature.treasure.as_mut() else {
                continue;
            };
            if room.currently_taken_item.is_none() || room.has_been_looted {
                continue;
            }
            let forfeited = treasure::on_leave_room(room);
            self.repos.entities.save(&Entity::Feature(feature)).await?;
            return Ok(vec![GameEvent::narrative(format!(
                "As you cross the threshold, the pedestals grind shut for good{}.",
                if forfeited.is_empty() {
                    String::new()
                } else {
                    format!(", swallowing {} treasure(s)", forfeited.len())
                }
            ))]);
        }
        Ok(Vec::new())
    }

    async fn try_return_to_pedestal(&mut self, target: &str) -> EngineResult<Option<Vec<GameEvent>>> {
        let wanted = target.to_lowercase();
        let Some(held) = self
            .state
            .player
            .inventory
            .items
            .iter()
            .find(|i| i.name.to_lowercase().contains(&wanted))
            .map(|i| i.template_id)
        else {
            return Ok(None);
        };
        let space = self.current_space().await?;
        for entity_id in &space.entities {
            let Some(Entity::Feature(mut feature)) =
                self.repos.entities.find_by_id(*entity_id).await?
            else {
                continue;
            };
            let Some(room) = feature.treasure.as_mut() else {
                continue;
            };
            if room.currently_taken_item != Some(held) {
                continue;
            }
            treasure::return_item(room, &mut self.state.player.inventory, held)?;
            self.repos.entities.save(&Entity::Feature(feature)).await?;
            return Ok(Some(vec![GameEvent::narrative(
                "You set it back on its pedestal. One by one, the seals release.",
            )]));
        }
        Ok(None)
    }

    async fn reward_quest_givers(
        &mut self,
        completed: Vec<quests::CompletedQuest>,
        events: &mut Vec<GameEvent>,
    ) -> EngineResult<()> {
        for quest in completed {
            if let Some(giver) = quest.giver {
                let applied = social::apply_event(
                    &self.repos,
                    &mut self.state.queue,
                    giver,
                    DispositionEvent::QuestCompleted,
                    self.state.game_time,
                )
                .await?;
                tracing::debug!(
                    quest = %quest.name,
                    %giver,
                    disposition = applied.disposition,
                    "quest giver pleased"
                );
            }
            events.push(GameEvent::Quest {
                text: format!("Word will travel: {} is done.", quest.name),
                quest_id: Some(quest.quest_id),
            });
        }
        Ok(())
    }

    async fn aggro_hostiles(
        &mut self,
        space_id: SpaceId,
        events: &mut Vec<GameEvent>,
    ) -> EngineResult<()> {
        let Some(space) = self.repos.spaces.find_by_id(space_id).await? else {
            return Ok(());
        };
        for entity_id in &space.entities {
            let Some(Entity::Npc(mut npc)) = self.repos.entities.find_by_id(*entity_id).await?
            else {
                continue;
            };
            if !npc.is_hostile || npc.health <= 0 || self.state.queue.contains(npc.id) {
                continue;
            }
            npc.insert_component(Component::Combat(CombatComponent {
                target: self.state.player.id,
                engaged_since: self.state.game_time,
                defending_until: None,
            }));
            self.repos.entities.save(&Entity::Npc(npc.clone())).await?;
            self.state.queue.enqueue(
                npc.id,
                self.state.game_time + action_cost(ActionKind::MeleeAttack, npc.stats.speed),
            );
            events.push(GameEvent::warning(format!(
                "The {} turns toward you.",
                npc.name
            )));
        }
        Ok(())
    }

    async fn push_status(&mut self, events: &mut Vec<GameEvent>) -> EngineResult<()> {
        let location = self
            .repos
            .spaces
            .find_by_id(self.state.player.current_room_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| "somewhere unmapped".into());
        events.push(GameEvent::StatusUpdate {
            hp: self.state.player.health,
            max_hp: self.state.player.max_health,
            location,
        });
        Ok(())
    }
}

fn user_facing_error(error: &EngineError) -> GameEvent {
    match error {
        EngineError::NotFound(_)
        | EngineError::InvalidArgument(_)
        | EngineError::ConstraintViolated(_) => {
            // These carry second-person phrasing already.
            let text = match error {
                EngineError::NotFound(m)
                | EngineError::InvalidArgument(m)
                | EngineError::ConstraintViolated(m) => m.clone(),
                _ => unreachable!(),
            };
            GameEvent::warning(first_upper(&text))
        }
        other => {
            tracing::error!(error = %other, "intent failed");
            GameEvent::error("Something gives way in the deep machinery of the world. Try again.")
        }
    }
}

fn first_upper(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

const HELP_TEXT: &str = "You can move (north/south/east/west/up/down), scout for hidden ways, \
travel along corridors, look, search, take, drop, equip, use, talk, persuade, intimidate, \
attack, trade, train skills with a willing mentor, rest, loot remains, and save or load your \
delve.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::{Direction, SocialComponent};

    async fn booted_engine() -> GameEngine {
        let (_, store) = testutil::repos();
        let save_dir =
            std::env::temp_dir().join(format!("undercroft-engine-{}", uuid::Uuid::new_v4()));
        GameEngine::boot_with(
            EngineConfig::default(),
            None,
            "Maro",
            11,
            store,
            SaveSystem::with_directory(save_dir),
        )
        .await
        .expect("engine boots")
    }

    fn place_rat(health: i32) -> Npc {
        let mut rat = Npc::new("Gloom Rat", health);
        rat.is_hostile = true;
        rat.stats.speed = 0;
        rat
    }

    async fn put_npc_in_player_space(engine: &GameEngine, npc: &Npc) {
        let mut space = engine
            .repos
            .spaces
            .find_by_id(engine.player().current_room_id)
            .await
            .unwrap()
            .unwrap();
        space.entities.push(npc.id);
        engine.repos.spaces.save(&space).await.unwrap();
        engine
            .repos
            .entities
            .save(&Entity::Npc(npc.clone()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn boot_places_the_player_in_town_with_a_dagger() {
        let engine = booted_engine().await;
        assert_eq!(
            engine.player().current_room_id,
            engine.state.seed.starting_space_id
        );
        assert_eq!(
            engine
                .player()
                .equipped_weapon
                .as_ref()
                .map(|w| w.name.as_str()),
            Some("Rusty Dagger")
        );
    }

    #[tokio::test]
    async fn moving_between_town_rooms_costs_time_and_reports_status() {
        let mut engine = booted_engine().await;
        let before = engine.game_time();
        let events = engine
            .handle_intent(Intent::Move { dir: Direction::East })
            .await;
        assert!(engine.game_time() > before);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::StatusUpdate { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Narrative { text } if text.contains("Salvage Market"))));

        // Walking into a wall costs nothing.
        let stuck = engine.game_time();
        engine
            .handle_intent(Intent::Move { dir: Direction::Down })
            .await;
        assert_eq!(engine.game_time(), stuck);
    }

    #[tokio::test]
    async fn killing_the_quest_target_completes_and_pays_out() {
        let mut engine = booted_engine().await;
        let offer_id = engine.state.available_quests[0].id;
        engine.handle_intent(Intent::AcceptQuest { id: offer_id }).await;

        let rat = place_rat(1);
        put_npc_in_player_space(&engine, &rat).await;

        let events = engine.handle_intent(Intent::Attack { target: None }).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Quest { text, .. } if text.contains("complete"))));
        assert_eq!(
            engine.player().active_quests[0].status,
            QuestStatus::Completed
        );

        let gold_before = engine.player().gold();
        engine
            .handle_intent(Intent::ClaimReward { id: offer_id })
            .await;
        assert_eq!(engine.player().gold(), gold_before + 25);
        assert_eq!(engine.player().completed_quests.len(), 1);

        // The rat left remains behind.
        let space = engine
            .repos
            .spaces
            .find_by_id(engine.player().current_room_id)
            .await
            .unwrap()
            .unwrap();
        let mut corpse_found = false;
        for id in &space.entities {
            if let Some(Entity::Corpse(_)) = engine.repos.entities.find_by_id(*id).await.unwrap() {
                corpse_found = true;
            }
        }
        assert!(corpse_found);
    }

    #[tokio::test]
    async fn surviving_defender_counter_attacks_on_schedule() {
        let mut engine = booted_engine().await;
        let rat = place_rat(500);
        put_npc_in_player_space(&engine, &rat).await;

        let events = engine.handle_intent(Intent::Attack { target: None }).await;
        // The player's swing costs 6 ticks; the rat's counter lands within
        // the same advance window.
        assert!(engine.player().health < engine.player().max_health);
        assert!(events.iter().any(
            |e| matches!(e, GameEvent::Combat { text, .. } if text.contains("tears into you"))
        ));
        // One live queue entry for the rat, never more (P4).
        assert!(engine.queue_contains(rat.id));
    }

    #[tokio::test]
    async fn training_with_an_allied_mentor_grants_exactly_250_xp() {
        let mut engine = booted_engine().await;
        let mut mentor = Npc::new("Sable the Knife", 30);
        let mut social_component = SocialComponent::with_disposition(90);
        social_component.teachable_skills = vec!["Stealth".to_string()];
        mentor.insert_component(Component::Social(social_component.clone()));
        put_npc_in_player_space(&engine, &mentor).await;
        engine
            .repos
            .social_components
            .save(mentor.id, &social_component)
            .await
            .unwrap();

        engine
            .handle_intent(Intent::TrainSkill {
                skill: "Stealth".into(),
                method: "practice".into(),
            })
            .await;

        let stealth = engine.player().skills.get("Stealth").unwrap();
        assert_eq!(stealth.xp, 250);
        // 250 is below the 282 threshold for level 2.
        assert_eq!(stealth.level, 1);
    }

    #[tokio::test]
    async fn unfriendly_mentor_refuses_training() {
        let mut engine = booted_engine().await;
        let mut mentor = Npc::new("Sable the Knife", 30);
        let mut social_component = SocialComponent::with_disposition(0);
        social_component.teachable_skills = vec!["Stealth".to_string()];
        mentor.insert_component(Component::Social(social_component.clone()));
        put_npc_in_player_space(&engine, &mentor).await;
        engine
            .repos
            .social_components
            .save(mentor.id, &social_component)
            .await
            .unwrap();

        let events = engine
            .handle_intent(Intent::TrainSkill {
                skill: "Stealth".into(),
                method: "practice".into(),
            })
            .await;
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::System { level: game_domain::SystemLevel::Warning, .. }
        )));
        assert!(engine.player().skills.get("Stealth").is_none());
    }

    #[tokio::test]
    async fn rest_is_refused_while_hunted_and_heals_otherwise() {
        let mut engine = booted_engine().await;
        engine.state.player.health = 50;

        let events = engine.handle_intent(Intent::Rest).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Narrative { text } if text.contains("recover"))));
        assert_eq!(engine.player().health, 60);

        let rat = place_rat(100);
        put_npc_in_player_space(&engine, &rat).await;
        let refused = engine.handle_intent(Intent::Rest).await;
        assert!(refused.iter().any(|e| matches!(
            e,
            GameEvent::System { level: game_domain::SystemLevel::Warning, .. }
        )));
    }

    #[tokio::test]
    async fn save_then_load_restores_the_session() {
        let mut engine = booted_engine().await;
        engine
            .handle_intent(Intent::Move { dir: Direction::East })
            .await;
        let position = engine.player().current_room_id;
        let clock = engine.game_time();

        engine
            .handle_intent(Intent::Save { name: "delve one".into() })
            .await;
        engine
            .handle_intent(Intent::Move { dir: Direction::West })
            .await;
        assert_ne!(engine.player().current_room_id, position);

        let events = engine
            .handle_intent(Intent::Load { name: "delve one".into() })
            .await;
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::System { text, .. } if text.contains("Loaded"))));
        assert_eq!(engine.player().current_room_id, position);
        assert_eq!(engine.game_time(), clock);

        std::fs::remove_dir_all(engine.save_system.directory()).ok();
    }
}
