//! Lore inheritance and prompt construction.
//!
//! Child lore is a short variation on the parent's, tightened to the
//! chunk level; themes are blended into a 2-4 word name. Prompts are
//! minijinja templates compiled once. Every path has a deterministic
//! fallback: one retry, then the parent's lore verbatim.

use std::sync::Arc;

use minijinja::{context, Environment};

use ai_bridge::{ChatRequest, LlmClient};
use game_domain::{ChunkLevel, Direction};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Fixed universe constraint carried by every world-generation call.
/// Surface vocabulary is banned outright.
const UNDERGROUND_SYSTEM_PROMPT: &str = "You are the chronicler of a subterranean \
world. Everything that exists is underground: caverns, tunnels, worked halls, \
sunless waterways. Never mention or imply the surface. Banned words: sky, sun, \
moon, star, cloud, rain, wind, horizon, daylight, outdoors, sunrise, sunset. \
Light comes only from fungi, forges, and flame. Respond with prose only, no \
markdown, no preamble.";

const LORE_TEMPLATE: &str = "World lore:\n{{ global_lore }}\n\n\
Parent {{ parent_level }} lore:\n{{ parent_lore }}\n\n\
Write the lore of one {{ level }} inside it{% if direction %}, reached heading \
{{ direction }}{% endif %}. 2 to 4 sentences. Keep the factions consistent and \
add detail at the {{ level }} scale: a {{ level }} is smaller and more specific \
than its parent.";

const THEME_TEMPLATE: &str = "Parent biome theme: {{ parent_theme }}\n\
Variation: {{ variation }}\n\n\
Blend these into the name of an underground biome. Answer with the name only, \
2 to 4 words.";

const DESCRIPTION_TEMPLATE: &str = "Chunk lore:\n{{ lore }}\n\
Biome theme: {{ theme }}\n\
Room kind: {{ node_kind }}\n\
Room name: {{ name }}\nExits lead: {{ exits }}\n\n\
Describe this room to a traveler standing in it. Second person, 2 to 4 \
sentences, consistent with the lore. Mention what the exits look like.";

pub struct LoreEngine {
    llm: Option<Arc<dyn LlmClient>>,
    env: Environment<'static>,
    config: EngineConfig,
}

impl LoreEngine {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, config: EngineConfig) -> EngineResult<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("lore", LORE_TEMPLATE),
            ("theme", THEME_TEMPLATE),
            ("description", DESCRIPTION_TEMPLATE),
        ] {
            env.add_template(name, source)
                .map_err(|e| EngineError::Initialization(format!("prompt template {name}: {e}")))?;
        }
        Ok(Self { llm, env, config })
    }

    fn render(&self, template: &str, ctx: minijinja::Value) -> EngineResult<String> {
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|e| EngineError::Initialization(format!("prompt template {template}: {e}")))?;
        tmpl.render(ctx)
            .map_err(|e| EngineError::GenerationFailed(format!("prompt render: {e}")))
    }

    async fn chat(&self, prompt: String, temperature: f32) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = ChatRequest {
            model: self.config.model_id.clone(),
            system_prompt: UNDERGROUND_SYSTEM_PROMPT.to_string(),
            user_context: prompt,
            max_tokens: self.config.llm_max_tokens,
            temperature,
        };
        // One retry, then the caller falls back.
        for attempt in 0..2 {
            match llm.chat_completion(request.clone()).await {
                Ok(text) if !text.trim().is_empty() => return Some(text.trim().to_string()),
                Ok(_) => return None,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "lore generation attempt failed");
                }
            }
        }
        None
    }

    /// Child lore varied from the parent; the parent's lore verbatim when
    /// the model is unavailable or keeps failing.
    pub async fn vary_lore(
        &self,
        global_lore: &str,
        parent_lore: &str,
        parent_level: ChunkLevel,
        level: ChunkLevel,
        direction: Option<&Direction>,
    ) -> EngineResult<String> {
        let prompt = self.render(
            "lore",
            context! {
                global_lore => global_lore,
                parent_lore => parent_lore,
                parent_level => parent_level.to_string(),
                level => level.to_string(),
                direction => direction.map(|d| d.to_string()),
            },
        )?;
        match self.chat(prompt, self.config.lore_temperature).await {
            Some(lore) => Ok(lore),
            None => {
                let fallback = if parent_lore.is_empty() {
                    global_lore
                } else {
                    parent_lore
                };
                Ok(fallback.to_string())
            }
        }
    }

    /// 2-4 word biome name. Falls back to a deterministic blend.
    pub async fn blend_themes(&self, parent_theme: &str, variation: &str) -> EngineResult<String> {
        let prompt = self.render(
            "theme",
            context! { parent_theme => parent_theme, variation => variation },
        )?;
        if let Some(theme) = self.chat(prompt, self.config.theme_temperature).await {
            let words: Vec<&str> = theme.split_whitespace().collect();
            if (2..=4).contains(&words.len()) {
                return Ok(theme);
            }
            if !words.is_empty() {
                return Ok(words[..words.len().min(4)].join(" "));
            }
        }
        let base = if parent_theme.is_empty() {
            "Deep Galleries"
        } else {
            parent_theme
        };
        Ok(format!("{} {}", variation, base)
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Room prose for a stub space. `None` means the caller keeps the stub
    /// and leaves it marked stale.
    pub async fn describe_space(
        &self,
        lore: &str,
        theme: &str,
        node_kind: &str,
        name: &str,
        exits: &str,
    ) -> EngineResult<Option<String>> {
        let prompt = self.render(
            "description",
            context! {
                lore => lore,
                theme => theme,
                node_kind => node_kind,
                name => name,
                exits => exits,
            },
        )?;
        Ok(self.chat(prompt, self.config.description_temperature).await)
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }
}
