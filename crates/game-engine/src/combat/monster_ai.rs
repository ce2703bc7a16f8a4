//! NPC decisions.
//!
//! Pipeline: rule-based fallback, an optional LLM pass for intelligent
//! NPCs (noisier at low wisdom), then a personality filter over whatever
//! came out. The fallback never fails, so neither does the pipeline.

use std::sync::Arc;

use serde::Deserialize;

use ai_bridge::{clean_json_reply, ChatRequest, LlmClient};
use game_domain::{Npc, PersonalityTrait};

/// Intelligence above which an NPC consults the model.
const LLM_INTELLIGENCE_FLOOR: i32 = 20;
const FLEE_THRESHOLD: f32 = 0.15;
const WOUNDED_THRESHOLD: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcAction {
    Attack,
    Defend,
    Flee,
    UseItem,
    Wait,
}

pub struct MonsterAi {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
}

#[derive(Deserialize)]
struct DecisionReply {
    action: String,
}

impl MonsterAi {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, model: String) -> Self {
        Self { llm, model }
    }

    /// Decide this NPC's turn. `has_heal` is whether its inventory holds
    /// anything drinkable.
    pub async fn decide(&self, npc: &Npc, has_heal: bool) -> NpcAction {
        let fallback = Self::fallback(npc, has_heal);

        let mut action = fallback;
        if npc.stats.intelligence > LLM_INTELLIGENCE_FLOOR {
            if let Some(llm) = &self.llm {
                match self.ask_model(llm.as_ref(), npc, has_heal).await {
                    Some(decided) => action = decided,
                    None => {
                        tracing::debug!(npc = %npc.name, "model decision failed, using fallback");
                    }
                }
            }
        }

        Self::apply_personality(npc, action)
    }

    /// Health-band rules. Never fails.
    pub fn fallback(npc: &Npc, has_heal: bool) -> NpcAction {
        let health = npc.health_fraction();
        if health < FLEE_THRESHOLD {
            NpcAction::Flee
        } else if health < WOUNDED_THRESHOLD && has_heal {
            NpcAction::UseItem
        } else {
            NpcAction::Attack
        }
    }

    async fn ask_model(&self, llm: &dyn LlmClient, npc: &Npc, has_heal: bool) -> Option<NpcAction> {
        // Low wisdom runs hot: temperature 1.5 - min(1.2, wisdom/50).
        let temperature = 1.5 - (npc.stats.wisdom as f32 / 50.0).min(1.2);
        let request = ChatRequest {
            model: self.model.clone(),
            system_prompt: "You decide one combat action for a dungeon creature. Reply with \
                            JSON only: {\"action\": \"attack\"|\"defend\"|\"flee\"|\"use_item\"|\"wait\"}."
                .to_string(),
            user_context: format!(
                "Creature: {} ({}). Health {}/{}. Healing item available: {}. Personality: {:?}.",
                npc.name, npc.description, npc.health, npc.max_health, has_heal, npc.personality
            ),
            max_tokens: 40,
            temperature,
        };

        let reply = match llm.chat_completion(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(npc = %npc.name, error = %e, "decision request failed");
                return None;
            }
        };
        let parsed: DecisionReply = serde_json::from_str(clean_json_reply(&reply)).ok()?;
        match parsed.action.to_lowercase().as_str() {
            "attack" => Some(NpcAction::Attack),
            "defend" => Some(NpcAction::Defend),
            "flee" => Some(NpcAction::Flee),
            "use_item" | "useitem" | "heal" => Some(NpcAction::UseItem),
            "wait" => Some(NpcAction::Wait),
            _ => None,
        }
    }

    /// Traits veto or redirect the chosen action.
    pub fn apply_personality(npc: &Npc, mut action: NpcAction) -> NpcAction {
        let health = npc.health_fraction();
        for personality in &npc.personality {
            action = match (personality, action) {
                (
                    PersonalityTrait::Aggressive,
                    NpcAction::Flee | NpcAction::Wait | NpcAction::Defend,
                ) => NpcAction::Attack,
                (PersonalityTrait::Cowardly, NpcAction::Attack) if health < 0.5 => NpcAction::Flee,
                (PersonalityTrait::Defensive, NpcAction::Attack) if health < 0.7 => {
                    NpcAction::Defend
                }
                (PersonalityTrait::Greedy, NpcAction::Flee) if health < 0.2 => NpcAction::Attack,
                (PersonalityTrait::Brave, NpcAction::Flee) if health > 0.1 => NpcAction::Attack,
                (_, unchanged) => unchanged,
            };
        }
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedLlm;

    fn npc_at_health(health: i32, max: i32) -> Npc {
        let mut npc = Npc::new("Test Beast", max);
        npc.health = health;
        npc
    }

    #[test]
    fn fallback_follows_health_bands() {
        assert_eq!(MonsterAi::fallback(&npc_at_health(10, 100), true), NpcAction::Flee);
        assert_eq!(
            MonsterAi::fallback(&npc_at_health(30, 100), true),
            NpcAction::UseItem
        );
        assert_eq!(
            MonsterAi::fallback(&npc_at_health(30, 100), false),
            NpcAction::Attack
        );
        assert_eq!(
            MonsterAi::fallback(&npc_at_health(90, 100), true),
            NpcAction::Attack
        );
    }

    #[test]
    fn personality_filter_rules() {
        let mut brave = npc_at_health(50, 100);
        brave.personality = vec![PersonalityTrait::Brave];
        assert_eq!(
            MonsterAi::apply_personality(&brave, NpcAction::Flee),
            NpcAction::Attack
        );

        let mut cowardly = npc_at_health(40, 100);
        cowardly.personality = vec![PersonalityTrait::Cowardly];
        assert_eq!(
            MonsterAi::apply_personality(&cowardly, NpcAction::Attack),
            NpcAction::Flee
        );

        let mut aggressive = npc_at_health(90, 100);
        aggressive.personality = vec![PersonalityTrait::Aggressive];
        assert_eq!(
            MonsterAi::apply_personality(&aggressive, NpcAction::Wait),
            NpcAction::Attack
        );

        let mut greedy = npc_at_health(10, 100);
        greedy.personality = vec![PersonalityTrait::Greedy];
        assert_eq!(
            MonsterAi::apply_personality(&greedy, NpcAction::Flee),
            NpcAction::Attack
        );
    }

    #[tokio::test]
    async fn model_reply_overrides_fallback_for_smart_npcs() {
        let llm = ScriptedLlm::with_replies(vec!["{\"action\": \"defend\"}"]);
        let ai = MonsterAi::new(Some(llm as Arc<dyn LlmClient>), "test-model".into());
        let mut npc = npc_at_health(90, 100);
        npc.stats.intelligence = 30;
        assert_eq!(ai.decide(&npc, false).await, NpcAction::Defend);
    }

    #[tokio::test]
    async fn unparsable_reply_falls_back() {
        let llm = ScriptedLlm::with_replies(vec!["the beast ponders its fate"]);
        let ai = MonsterAi::new(Some(llm as Arc<dyn LlmClient>), "test-model".into());
        let mut npc = npc_at_health(90, 100);
        npc.stats.intelligence = 30;
        assert_eq!(ai.decide(&npc, false).await, NpcAction::Attack);
    }

    #[tokio::test]
    async fn dim_npcs_never_consult_the_model() {
        let llm = ScriptedLlm::with_replies(vec!["{\"action\": \"wait\"}"]);
        let ai = MonsterAi::new(
            Some(llm.clone() as Arc<dyn LlmClient>),
            "test-model".into(),
        );
        let mut npc = npc_at_health(90, 100);
        npc.stats.intelligence = 10;
        assert_eq!(ai.decide(&npc, false).await, NpcAction::Attack);
        assert_eq!(llm.calls(), 0);
    }
}
