//! Model descriptors and debate sides.
//!
//! Represents the LLM backends a debater can be assigned to, and which side
//! of the motion each debater argues.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol family a model speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI chat completions with SSE streaming (also Deepseek, Groq).
    #[serde(rename = "openai")]
    OpenAiCompatible,
    /// Anthropic messages API with typed SSE events.
    #[serde(rename = "claude")]
    Claude,
    /// Google generateContent, single-shot JSON.
    #[serde(rename = "gemini")]
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAiCompatible => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
        })
    }
}

/// Which configured secret a model authenticates with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKey {
    OpenAi,
    Claude,
    Gemini,
    Deepseek,
    Groq,
}

impl CredentialKey {
    /// Environment variable that overrides this credential.
    pub fn env_var(&self) -> &'static str {
        match self {
            CredentialKey::OpenAi => "OPENAI_API_KEY",
            CredentialKey::Claude => "ANTHROPIC_API_KEY",
            CredentialKey::Gemini => "GEMINI_API_KEY",
            CredentialKey::Deepseek => "DEEPSEEK_API_KEY",
            CredentialKey::Groq => "GROQ_API_KEY",
        }
    }

    pub fn all() -> [CredentialKey; 5] {
        [
            CredentialKey::OpenAi,
            CredentialKey::Claude,
            CredentialKey::Gemini,
            CredentialKey::Deepseek,
            CredentialKey::Groq,
        ]
    }
}

/// An LLM a debater can use. Immutable once the catalog is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Display name (e.g., "GPT-4o").
    pub name: String,
    /// Protocol used to talk to the model.
    pub provider: ProviderKind,
    /// Vendor model identifier sent on the wire (e.g., "gpt-4o").
    pub model_id: String,
    /// Overrides the vendor's default endpoint host.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Secret used to authenticate.
    pub credential: CredentialKey,
}

impl ModelDescriptor {
    pub fn new(
        name: impl Into<String>,
        provider: ProviderKind,
        model_id: impl Into<String>,
        credential: CredentialKey,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model_id: model_id.into(),
            base_url: None,
            credential,
        }
    }

    /// Point the model at a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Whether `query` names this model, by display name or model id.
    pub fn matches(&self, query: &str) -> bool {
        self.name.eq_ignore_ascii_case(query) || self.model_id.eq_ignore_ascii_case(query)
    }
}

/// The built-in model catalog.
pub fn default_catalog() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(
            "GPT-4o",
            ProviderKind::OpenAiCompatible,
            "gpt-4o",
            CredentialKey::OpenAi,
        )
        .with_base_url("https://api.openai.com"),
        ModelDescriptor::new(
            "GPT-4o-mini",
            ProviderKind::OpenAiCompatible,
            "gpt-4o-mini",
            CredentialKey::OpenAi,
        )
        .with_base_url("https://api.openai.com"),
        ModelDescriptor::new(
            "Claude 3.7 Sonnet",
            ProviderKind::Claude,
            "claude-3-7-sonnet-latest",
            CredentialKey::Claude,
        ),
        ModelDescriptor::new(
            "Gemini-2.0-Flash",
            ProviderKind::Gemini,
            "gemini-2.0-flash",
            CredentialKey::Gemini,
        ),
        ModelDescriptor::new(
            "Deepseek-Chat",
            ProviderKind::OpenAiCompatible,
            "deepseek-chat",
            CredentialKey::Deepseek,
        )
        .with_base_url("https://api.deepseek.com"),
        ModelDescriptor::new(
            "Llama-3.3-70b-versatile (Groq)",
            ProviderKind::OpenAiCompatible,
            "llama-3.3-70b-versatile",
            CredentialKey::Groq,
        )
        .with_base_url("https://api.groq.com/openai"),
    ]
}

/// Find a model in `catalog` by display name or model id.
pub fn find_model<'a>(catalog: &'a [ModelDescriptor], query: &str) -> Option<&'a ModelDescriptor> {
    catalog.iter().find(|m| m.matches(query))
}

/// Side of the motion a debater argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    /// Arguing in favor of the topic. Always speaks first in a round.
    Affirmative,
    /// Arguing against the topic.
    Opposition,
}

impl Side {
    pub fn display_name(&self) -> &str {
        match self {
            Side::Affirmative => "Affirmative",
            Side::Opposition => "Opposition",
        }
    }

    /// Transcript label for a speaker on this side, e.g. "Affirmative (GPT-4o)".
    pub fn speaker_label(&self, model: &ModelDescriptor) -> String {
        format!("{} ({})", self.display_name(), model.name)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contains_all_provider_kinds() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 6);
        for kind in [ProviderKind::OpenAiCompatible, ProviderKind::Claude, ProviderKind::Gemini] {
            assert!(catalog.iter().any(|m| m.provider == kind));
        }
    }

    #[test]
    fn test_find_model_by_name_or_id() {
        let catalog = default_catalog();
        let claude = find_model(&catalog, "claude 3.7 sonnet").unwrap();
        assert_eq!(claude.model_id, "claude-3-7-sonnet-latest");
        let deepseek = find_model(&catalog, "deepseek-chat").unwrap();
        assert_eq!(deepseek.credential, CredentialKey::Deepseek);
        assert!(find_model(&catalog, "gpt-5").is_none());
    }

    #[test]
    fn test_groq_uses_openai_protocol_with_own_credential() {
        let catalog = default_catalog();
        let groq = find_model(&catalog, "llama-3.3-70b-versatile").unwrap();
        assert_eq!(groq.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(groq.credential, CredentialKey::Groq);
        assert_eq!(groq.base_url.as_deref(), Some("https://api.groq.com/openai"));
    }

    #[test]
    fn test_speaker_label() {
        let model = ModelDescriptor::new(
            "GPT-4o",
            ProviderKind::OpenAiCompatible,
            "gpt-4o",
            CredentialKey::OpenAi,
        );
        assert_eq!(Side::Affirmative.speaker_label(&model), "Affirmative (GPT-4o)");
        assert_eq!(Side::Opposition.to_string(), "Opposition");
    }
}
