//! Entities and their tagged components.
//!
//! NPC capabilities are a tagged sum stored in an `id -> variant` map
//! rather than a virtual hierarchy; access is by tag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, ItemTemplateId};
use crate::item::{DamageType, ItemInstance, ItemType};
use crate::skill::SkillSet;
use crate::social::SocialComponent;
use crate::GameTime;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub strength: i32,
    pub agility: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    /// Speed level L in the action-cost formula.
    pub speed: i32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            strength: 10,
            agility: 10,
            intelligence: 10,
            wisdom: 10,
            speed: 0,
        }
    }
}

impl Stats {
    /// d20-style ability modifier.
    pub fn strength_mod(&self) -> i32 {
        (self.strength - 10) / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonalityTrait {
    Aggressive,
    Cowardly,
    Defensive,
    Greedy,
    Brave,
}

/// Engagement state. Present only while the NPC is actively fighting;
/// cleared by de-escalation and death.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatComponent {
    pub target: EntityId,
    pub engaged_since: GameTime,
    /// Set by a Defend action; halves the next incoming hit before this tick.
    pub defending_until: Option<GameTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub template_id: ItemTemplateId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingComponent {
    pub stock: Vec<StockEntry>,
    pub gold: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Social,
    Trading,
    Combat,
    Skill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    Social(SocialComponent),
    Trading(TradingComponent),
    Combat(CombatComponent),
    Skill(SkillSet),
}

impl Component {
    pub fn component_type(&self) -> ComponentType {
        match self {
            Component::Social(_) => ComponentType::Social,
            Component::Trading(_) => ComponentType::Trading,
            Component::Combat(_) => ComponentType::Combat,
            Component::Skill(_) => ComponentType::Skill,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub is_hostile: bool,
    pub health: i32,
    pub max_health: i32,
    pub stats: Stats,
    pub armor: i32,
    pub resistances: HashMap<DamageType, u32>,
    pub personality: Vec<PersonalityTrait>,
    pub components: HashMap<ComponentType, Component>,
}

impl Npc {
    pub fn new(name: impl Into<String>, health: i32) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            description: String::new(),
            is_hostile: false,
            health,
            max_health: health,
            stats: Stats::default(),
            armor: 0,
            resistances: HashMap::new(),
            personality: Vec::new(),
            components: HashMap::new(),
        }
    }

    pub fn insert_component(&mut self, component: Component) {
        self.components.insert(component.component_type(), component);
    }

    pub fn social(&self) -> Option<&SocialComponent> {
        match self.components.get(&ComponentType::Social) {
            Some(Component::Social(s)) => Some(s),
            _ => None,
        }
    }

    pub fn social_mut(&mut self) -> Option<&mut SocialComponent> {
        match self.components.get_mut(&ComponentType::Social) {
            Some(Component::Social(s)) => Some(s),
            _ => None,
        }
    }

    pub fn trading(&self) -> Option<&TradingComponent> {
        match self.components.get(&ComponentType::Trading) {
            Some(Component::Trading(t)) => Some(t),
            _ => None,
        }
    }

    pub fn trading_mut(&mut self) -> Option<&mut TradingComponent> {
        match self.components.get_mut(&ComponentType::Trading) {
            Some(Component::Trading(t)) => Some(t),
            _ => None,
        }
    }

    pub fn combat(&self) -> Option<&CombatComponent> {
        match self.components.get(&ComponentType::Combat) {
            Some(Component::Combat(c)) => Some(c),
            _ => None,
        }
    }

    pub fn skills(&self) -> Option<&SkillSet> {
        match self.components.get(&ComponentType::Skill) {
            Some(Component::Skill(s)) => Some(s),
            _ => None,
        }
    }

    pub fn clear_combat(&mut self) {
        self.components.remove(&ComponentType::Combat);
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0 {
            return 0.0;
        }
        self.health as f32 / self.max_health as f32
    }
}

/// A placed interactable item entity (distinct from dropped item instances,
/// which live on the space).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntity {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub item_type: ItemType,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub treasure: Option<crate::treasure::TreasureRoomComponent>,
}

/// NPC remains. Decays to nothing on the scheduler clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpseEntity {
    pub id: EntityId,
    pub name: String,
    pub decay_timer: u32,
    pub contents: Vec<ItemInstance>,
    pub gold_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entity {
    Npc(Npc),
    Item(ItemEntity),
    Feature(Feature),
    Corpse(CorpseEntity),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Npc(n) => n.id,
            Entity::Item(i) => i.id,
            Entity::Feature(f) => f.id,
            Entity::Corpse(c) => c.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Npc(n) => &n.name,
            Entity::Item(i) => &i.name,
            Entity::Feature(f) => &f.name,
            Entity::Corpse(c) => &c.name,
        }
    }

    pub fn as_npc(&self) -> Option<&Npc> {
        match self {
            Entity::Npc(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_npc_mut(&mut self) -> Option<&mut Npc> {
        match self {
            Entity::Npc(n) => Some(n),
            _ => None,
        }
    }
}
