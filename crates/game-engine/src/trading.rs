//! Merchant trading: disposition-priced buying and selling.

use game_database::Repositories;
use game_domain::{
    DispositionTier, InventoryComponent, ItemQuality, ItemTemplate, Npc, TradingComponent,
};

use crate::error::{EngineError, EngineResult};

/// Buy price: `base × quality × tier`, floored, never below 1.
pub fn calculate_buy_price(
    template: &ItemTemplate,
    quality: ItemQuality,
    tier: DispositionTier,
) -> i64 {
    let price =
        template.base_price as f64 * quality.price_modifier() * tier.price_modifier();
    (price.floor() as i64).max(1)
}

/// Merchants pay half of what they would charge.
pub fn calculate_sell_price(
    template: &ItemTemplate,
    quality: ItemQuality,
    tier: DispositionTier,
) -> i64 {
    (calculate_buy_price(template, quality, tier) / 2).max(1)
}

/// Move one unit of stock to the player. Stock, gold, and goods are
/// conserved; the transfer happens only after every check passes.
pub async fn buy_from_merchant(
    repos: &Repositories,
    merchant: &mut Npc,
    player_inventory: &mut InventoryComponent,
    item_name: &str,
    tier: DispositionTier,
) -> EngineResult<String> {
    if tier == DispositionTier::Hostile {
        return Err(EngineError::ConstraintViolated(
            "the merchant spits at your feet and turns away".into(),
        ));
    }
    let template = repos
        .items
        .find_template_by_name(item_name)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("no goods called '{item_name}'")))?;

    let trading = merchant
        .trading_mut()
        .ok_or_else(|| EngineError::InvalidArgument("they have nothing to sell".into()))?;
    let stock = trading
        .stock
        .iter_mut()
        .find(|s| s.template_id == template.id && s.quantity > 0)
        .ok_or_else(|| EngineError::NotFound(format!("'{}' is sold out", template.name)))?;

    let quality = ItemQuality::Common;
    let price = calculate_buy_price(&template, quality, tier);
    if player_inventory.gold < price {
        return Err(EngineError::ConstraintViolated(format!(
            "{} gold short for the asking price of {price}",
            price - player_inventory.gold
        )));
    }
    let item = template.instantiate(quality);
    if !player_inventory.can_add(&item) {
        return Err(EngineError::ConstraintViolated(
            "your pack cannot bear it".into(),
        ));
    }

    stock.quantity -= 1;
    trading.gold += price;
    player_inventory.gold -= price;
    let name = item.name.clone();
    player_inventory.items.push(item);
    Ok(format!("You pay {price} gold for the {name}."))
}

/// Sell an item out of the player's pack into merchant stock.
pub async fn sell_to_merchant(
    repos: &Repositories,
    merchant: &mut Npc,
    player_inventory: &mut InventoryComponent,
    item_name: &str,
    tier: DispositionTier,
) -> EngineResult<String> {
    if tier == DispositionTier::Hostile {
        return Err(EngineError::ConstraintViolated(
            "the merchant wants nothing from you".into(),
        ));
    }
    let item = player_inventory
        .find_by_name(item_name)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(format!("you carry no '{item_name}'")))?;
    let template = repos
        .items
        .find_template(item.template_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("the merchant cannot appraise that".into()))?;

    let trading = merchant
        .trading_mut()
        .ok_or_else(|| EngineError::InvalidArgument("they are not buying".into()))?;
    let price = calculate_sell_price(&template, item.quality, tier);
    if trading.gold < price {
        return Err(EngineError::ConstraintViolated(
            "the merchant's coffers cannot cover it".into(),
        ));
    }

    trading.gold -= price;
    player_inventory.gold += price;
    player_inventory.remove(item.id);
    match trading.stock.iter_mut().find(|s| s.template_id == template.id) {
        Some(entry) => entry.quantity += 1,
        None => trading.stock.push(game_domain::StockEntry {
            template_id: template.id,
            quantity: 1,
        }),
    }
    Ok(format!("The merchant counts out {price} gold for your {}.", item.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use game_domain::{Component, ItemType, SocialComponent, StockEntry};

    #[test]
    fn price_composes_quality_and_tier() {
        let template = ItemTemplate::basic("Iron Sword", ItemType::Weapon, 40, 6);
        assert_eq!(
            calculate_buy_price(&template, ItemQuality::Common, DispositionTier::Neutral),
            40
        );
        assert_eq!(
            calculate_buy_price(&template, ItemQuality::Common, DispositionTier::Allied),
            28
        );
        assert_eq!(
            calculate_buy_price(&template, ItemQuality::Fine, DispositionTier::Unfriendly),
            57
        );
        assert_eq!(
            calculate_buy_price(&template, ItemQuality::Common, DispositionTier::Hostile),
            60
        );
    }

    #[tokio::test]
    async fn buying_conserves_gold_and_stock() {
        let (repos, _store) = testutil::repos();
        let template = ItemTemplate::basic("Healing Draught", ItemType::Consumable, 12, 1);
        repos.items.save_template(&template).await.unwrap();

        let mut merchant = Npc::new("Provisioner", 40);
        merchant.insert_component(Component::Social(SocialComponent::with_disposition(0)));
        merchant.insert_component(Component::Trading(TradingComponent {
            stock: vec![StockEntry { template_id: template.id, quantity: 2 }],
            gold: 100,
        }));

        let mut pack = InventoryComponent::with_capacity(30);
        pack.gold = 20;

        let before_total = pack.gold + merchant.trading().unwrap().gold;
        buy_from_merchant(
            &repos,
            &mut merchant,
            &mut pack,
            "Healing Draught",
            DispositionTier::Neutral,
        )
        .await
        .unwrap();

        assert_eq!(pack.gold, 8);
        assert_eq!(pack.items.len(), 1);
        let trading = merchant.trading().unwrap();
        assert_eq!(trading.stock[0].quantity, 1);
        assert_eq!(pack.gold + trading.gold, before_total);

        // A second purchase fails on gold, leaving everything unchanged.
        let err = buy_from_merchant(
            &repos,
            &mut merchant,
            &mut pack,
            "Healing Draught",
            DispositionTier::Neutral,
        )
        .await;
        assert!(matches!(err, Err(EngineError::ConstraintViolated(_))));
        assert_eq!(pack.items.len(), 1);
        assert_eq!(merchant.trading().unwrap().stock[0].quantity, 1);
    }

    #[tokio::test]
    async fn hostile_merchants_refuse() {
        let (repos, _store) = testutil::repos();
        let mut merchant = Npc::new("Provisioner", 40);
        merchant.insert_component(Component::Trading(TradingComponent {
            stock: vec![],
            gold: 100,
        }));
        let mut pack = InventoryComponent::with_capacity(30);
        let err = buy_from_merchant(
            &repos,
            &mut merchant,
            &mut pack,
            "anything",
            DispositionTier::Hostile,
        )
        .await;
        assert!(matches!(err, Err(EngineError::ConstraintViolated(_))));
    }
}
