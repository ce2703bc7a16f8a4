//! Item templates, instances, and inventories.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ItemInstanceId, ItemTemplateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Weapon,
    Armor,
    Consumable,
    Treasure,
    Tool,
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemQuality {
    Poor,
    Common,
    Fine,
    Exceptional,
}

impl ItemQuality {
    /// Price multiplier applied on top of the template base price.
    pub fn price_modifier(self) -> f64 {
        match self {
            ItemQuality::Poor => 0.8,
            ItemQuality::Common => 1.0,
            ItemQuality::Fine => 1.25,
            ItemQuality::Exceptional => 1.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Physical,
    Fire,
    Cold,
    Poison,
    Arcane,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub id: ItemTemplateId,
    pub name: String,
    pub description: String,
    pub item_type: ItemType,
    pub rarity: Rarity,
    pub base_price: i64,
    pub weight: u32,
    pub attack_bonus: i32,
    pub armor_defense: i32,
    pub damage_type: DamageType,
    /// Consumables restore this much health when used.
    pub heal_amount: Option<i32>,
    /// Flat bonuses to effective skill level while equipped.
    pub skill_bonuses: HashMap<String, i32>,
}

impl ItemTemplate {
    pub fn basic(name: &str, item_type: ItemType, base_price: i64, weight: u32) -> Self {
        Self {
            id: ItemTemplateId::new(),
            name: name.to_string(),
            description: String::new(),
            item_type,
            rarity: Rarity::Common,
            base_price,
            weight,
            attack_bonus: 0,
            armor_defense: 0,
            damage_type: DamageType::Physical,
            heal_amount: None,
            skill_bonuses: HashMap::new(),
        }
    }

    /// Instantiate at a given quality. Display/capacity fields are copied
    /// onto the instance so inventory math never needs a template lookup.
    pub fn instantiate(&self, quality: ItemQuality) -> ItemInstance {
        ItemInstance {
            id: ItemInstanceId::new(),
            template_id: self.id,
            name: self.name.clone(),
            item_type: self.item_type,
            weight: self.weight,
            quality,
            attack_bonus: self.attack_bonus,
            armor_defense: self.armor_defense,
            damage_type: self.damage_type,
            heal_amount: self.heal_amount,
            skill_bonuses: self.skill_bonuses.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemInstanceId,
    pub template_id: ItemTemplateId,
    pub name: String,
    pub item_type: ItemType,
    pub weight: u32,
    pub quality: ItemQuality,
    pub attack_bonus: i32,
    pub armor_defense: i32,
    pub damage_type: DamageType,
    pub heal_amount: Option<i32>,
    pub skill_bonuses: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryComponent {
    pub items: Vec<ItemInstance>,
    /// Total carry weight.
    pub capacity: u32,
    pub gold: i64,
}

impl InventoryComponent {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            items: Vec::new(),
            capacity,
            gold: 0,
        }
    }

    pub fn carried_weight(&self) -> u32 {
        self.items.iter().map(|i| i.weight).sum()
    }

    pub fn can_add(&self, item: &ItemInstance) -> bool {
        self.carried_weight() + item.weight <= self.capacity
    }

    pub fn remove(&mut self, id: ItemInstanceId) -> Option<ItemInstance> {
        let idx = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ItemInstance> {
        let wanted = name.to_lowercase();
        self.items
            .iter()
            .find(|i| i.name.to_lowercase().contains(&wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_enforced_by_weight() {
        let mut inv = InventoryComponent::with_capacity(10);
        let rock = ItemTemplate::basic("Rock", ItemType::Misc, 1, 6);
        let first = rock.instantiate(ItemQuality::Common);
        let second = rock.instantiate(ItemQuality::Common);
        assert!(inv.can_add(&first));
        inv.items.push(first);
        assert!(!inv.can_add(&second));
    }
}
