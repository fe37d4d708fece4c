//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::DebateError;
use crate::model::{CredentialKey, ModelDescriptor, Side, default_catalog, find_model};
use crate::research::ResearchBriefing;

/// Root configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: Credentials,
    pub http: HttpConfig,
    pub streaming: StreamingConfig,
    pub debate: DebateDefaults,
    pub prompts: PromptsConfig,
    /// Extra models appended to the built-in catalog.
    pub models: Vec<ModelDescriptor>,
}

/// API keys, one per vendor. Empty strings count as missing.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub openai: String,
    pub claude: String,
    pub gemini: String,
    pub deepseek: String,
    pub groq: String,
}

impl Credentials {
    /// The credential for `key`, if configured.
    pub fn get(&self, key: CredentialKey) -> Option<&str> {
        let value = match key {
            CredentialKey::OpenAi => &self.openai,
            CredentialKey::Claude => &self.claude,
            CredentialKey::Gemini => &self.gemini,
            CredentialKey::Deepseek => &self.deepseek,
            CredentialKey::Groq => &self.groq,
        };
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    }

    pub fn set(&mut self, key: CredentialKey, value: impl Into<String>) {
        let slot = match key {
            CredentialKey::OpenAi => &mut self.openai,
            CredentialKey::Claude => &mut self.claude,
            CredentialKey::Gemini => &mut self.gemini,
            CredentialKey::Deepseek => &mut self.deepseek,
            CredentialKey::Groq => &mut self.groq,
        };
        *slot = value.into();
    }

    /// Builder-style [`Credentials::set`].
    pub fn with(mut self, key: CredentialKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Override values with non-empty environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in CredentialKey::all() {
            if let Some(value) = lookup(key.env_var()).filter(|v| !v.trim().is_empty()) {
                self.set(key, value);
            }
        }
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Credentials");
        for key in CredentialKey::all() {
            let state = if self.get(key).is_some() { "<redacted>" } else { "<unset>" };
            debug.field(key.env_var(), &state);
        }
        debug.finish()
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 180,
            connect_timeout_secs: 30,
        }
    }
}

/// Streaming presentation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Pause between words when replaying single-shot replies. 0 disables it.
    pub gemini_word_delay_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            gemini_word_delay_ms: 50,
        }
    }
}

/// Defaults for a debate when the CLI does not override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateDefaults {
    pub rounds: u32,
    pub language: String,
    pub affirmative_model: String,
    pub opposition_model: String,
    pub research_model: String,
}

impl Default for DebateDefaults {
    fn default() -> Self {
        Self {
            rounds: 2,
            language: "English".to_string(),
            affirmative_model: "GPT-4o".to_string(),
            opposition_model: "GPT-4o-mini".to_string(),
            research_model: "gemini-2.0-flash".to_string(),
        }
    }
}

/// System prompt templates.
///
/// Placeholders: `{topic}`, `{research}`, `{language}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub affirmative: String,
    pub opposition: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            affirmative: DEFAULT_AFFIRMATIVE_PROMPT.to_string(),
            opposition: DEFAULT_OPPOSITION_PROMPT.to_string(),
        }
    }
}

impl PromptsConfig {
    /// Render the system prompt for `side`, with placeholders replaced.
    pub fn system_prompt(
        &self,
        side: Side,
        topic: &str,
        briefing: &ResearchBriefing,
        language: &str,
    ) -> String {
        let (template, research) = match side {
            Side::Affirmative => (&self.affirmative, &briefing.affirmative_arguments),
            Side::Opposition => (&self.opposition, &briefing.opposition_arguments),
        };

        render_template(
            template,
            &[("topic", topic), ("research", research), ("language", language)],
        )
    }
}

/// Replace `{name}` placeholders in one pass. Substituted text is never
/// rescanned, so braces in a topic or a briefing come through unchanged.
/// Unknown placeholders are left as they are.
fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_brace = &rest[open + 1..];

        let hit = values.iter().find_map(|(name, value)| {
            let remainder = after_brace.strip_prefix(name)?.strip_prefix('}')?;
            Some((*value, remainder))
        });
        match hit {
            Some((value, remainder)) => {
                rendered.push_str(value);
                rest = remainder;
            }
            None => {
                rendered.push('{');
                rest = after_brace;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        content.parse()
    }

    /// The built-in catalog followed by any configured extra models.
    pub fn catalog(&self) -> Vec<ModelDescriptor> {
        let mut catalog = default_catalog();
        catalog.extend(self.models.iter().cloned());
        catalog
    }

    /// Look up a model by display name or model id.
    pub fn model(&self, query: &str) -> Result<ModelDescriptor, DebateError> {
        let catalog = self.catalog();
        find_model(&catalog, query)
            .cloned()
            .ok_or_else(|| DebateError::UnknownModel(query.to_string()))
    }
}

impl FromStr for Config {
    type Err = DebateError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }
}

const DEFAULT_AFFIRMATIVE_PROMPT: &str = r#"You are a world-class debater arguing IN FAVOR of the topic: {topic}.
## Research Briefing (Arguments FOR your stance)
<research>
{research}
</research>

Your opening statement should use this research.
In subsequent turns, counter your opponent's arguments directly while reinforcing your own. Provide your response in {language}."#;

const DEFAULT_OPPOSITION_PROMPT: &str = r#"You are a world-class debater arguing AGAINST the topic: {topic}.
## Research Briefing (Arguments AGAINST your stance)
<research>
{research}
</research>

Your opening statement should use this research.
In subsequent turns, counter your opponent's arguments directly while reinforcing your own. Provide your response in {language}."#;
