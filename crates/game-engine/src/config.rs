//! Engine configuration.
//!
//! Defaults cover everything; a TOML file can overlay tuning knobs and the
//! API key comes from the environment only. Without a key the engine
//! refuses LLM world generation and runs the pre-baked sample world.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use ai_bridge::{LlmClient, OpenAiClient};

use crate::error::{EngineError, EngineResult};

pub const API_KEY_VARS: [&str; 2] = ["UNDERCROFT_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chat model for lore, descriptions, dialogue, and NPC decisions.
    pub model_id: String,
    pub embedding_model: String,

    // Per-purpose sampling temperatures.
    pub lore_temperature: f32,
    pub theme_temperature: f32,
    pub description_temperature: f32,

    pub llm_timeout_secs: u64,
    pub llm_max_tokens: u32,

    pub cache_capacity: usize,
    /// Topology generation retries before GenerationFailed.
    pub graph_retry_limit: u32,

    /// Ticks before an NPC corpse rots away.
    pub npc_corpse_decay: u32,
    /// Ticks for the corpse entity left where a player died.
    pub player_corpse_decay_local: u32,
    /// Ticks before the recoverable player corpse record expires.
    pub player_corpse_decay: u64,
    pub npc_respawn_delay: u64,

    pub world_theme: String,
    pub global_lore: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_id: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            lore_temperature: 0.7,
            theme_temperature: 0.7,
            description_temperature: 0.8,
            llm_timeout_secs: 30,
            llm_max_tokens: 600,
            cache_capacity: 64,
            graph_retry_limit: 8,
            npc_corpse_decay: 100,
            player_corpse_decay_local: 200,
            player_corpse_decay: 5_000,
            npc_respawn_delay: 600,
            world_theme: "the Undercroft".to_string(),
            global_lore: "An endless under-realm of worked stone and living dark, \
                          abandoned by the surface so long ago that no one remembers sky. \
                          Rival delver factions tunnel for relics of the builders."
                .to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with a TOML file, if one is given.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    EngineError::InvalidArgument(format!(
                        "config {}: {e}",
                        path.display()
                    ))
                })?;
                toml::from_str(&text)
                    .map_err(|e| EngineError::InvalidArgument(format!("config parse: {e}")))
            }
        }
    }

    /// The key that unlocks LLM generation, if the environment has one.
    pub fn api_key_from_env() -> Option<String> {
        API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }

    /// Build the chat client this config describes. Without a key the
    /// engine runs the pre-baked sample world instead of LLM generation.
    pub fn connect_llm(&self) -> Option<Arc<dyn LlmClient>> {
        let Some(key) = Self::api_key_from_env() else {
            tracing::warn!(
                "no API key in {API_KEY_VARS:?}; world generation will use \
                 deterministic fallbacks only"
            );
            return None;
        };
        match OpenAiClient::with_timeout(key, Duration::from_secs(self.llm_timeout_secs)) {
            Ok(client) => {
                let client: Arc<dyn LlmClient> = Arc::new(client);
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not build LLM client");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overlay_keeps_unspecified_defaults() {
        let parsed: EngineConfig =
            toml::from_str("cache_capacity = 8\nmodel_id = \"local-model\"").unwrap();
        assert_eq!(parsed.cache_capacity, 8);
        assert_eq!(parsed.model_id, "local-model");
        assert_eq!(parsed.graph_retry_limit, EngineConfig::default().graph_retry_limit);
    }
}
