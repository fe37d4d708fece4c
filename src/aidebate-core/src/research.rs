//! Pre-debate research.
//!
//! One search-grounded Gemini call produces a two-sided briefing that seeds
//! both debaters' system prompts.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::DebateError;
use crate::provider::describe_http_error;
use crate::provider::gemini::{GEMINI_BASE_URL, extract_candidate_text, generate_content_url};

/// Heading that opens the affirmative section of a briefing.
pub const AFFIRMATIVE_MARKER: &str = "## Affirmative Arguments";
/// Heading that opens the opposition section of a briefing.
pub const OPPOSITION_MARKER: &str = "## Opposition Arguments";

/// Arguments for each side of the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBriefing {
    pub affirmative_arguments: String,
    pub opposition_arguments: String,
}

impl ResearchBriefing {
    /// Split a model reply into the two sections.
    ///
    /// When both headings are present, in order, the text before the
    /// opposition heading (minus the affirmative heading) is the affirmative
    /// section and everything after it is the opposition section. Otherwise
    /// the whole reply is used for both sides.
    pub fn parse(text: &str) -> Self {
        let affirmative_at = text.find(AFFIRMATIVE_MARKER);
        let opposition_at = text.find(OPPOSITION_MARKER);

        match (affirmative_at, opposition_at) {
            (Some(aff), Some(opp)) if aff < opp => {
                let (head, tail) = text.split_at(opp);
                let affirmative = head.replacen(AFFIRMATIVE_MARKER, "", 1);
                Self {
                    affirmative_arguments: affirmative.trim().to_string(),
                    opposition_arguments: tail[OPPOSITION_MARKER.len()..].trim().to_string(),
                }
            }
            _ => {
                tracing::warn!(
                    "research reply is missing section headings, using it for both sides"
                );
                Self {
                    affirmative_arguments: text.to_string(),
                    opposition_arguments: text.to_string(),
                }
            }
        }
    }
}

/// Something that can produce a briefing for a topic.
#[async_trait]
pub trait BriefingSource: Send + Sync {
    async fn research(
        &self,
        topic: &str,
        credential: &str,
    ) -> Result<ResearchBriefing, DebateError>;
}

/// Collects a briefing with a search-grounded Gemini call.
#[derive(Debug, Clone)]
pub struct ResearchCollector {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    language: String,
}

impl ResearchCollector {
    pub fn new(http: reqwest::Client, model_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: GEMINI_BASE_URL.to_string(),
            model_id: model_id.into(),
            language: "English".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Language the briefing should be written in.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn prompt(&self, topic: &str) -> String {
        format!(
            "Please perform a Google search to find the strongest arguments both FOR and \
             AGAINST the topic: '{topic}'.\n\n\
             Based on your search results, generate two concise, point-form summaries.\n\n\
             The output MUST have two sections. Start the first section with the exact \
             heading '{AFFIRMATIVE_MARKER}' and the second with '{OPPOSITION_MARKER}'.\n\
             Respond in {language}.",
            language = self.language,
        )
    }

    fn request_body(&self, topic: &str) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [{"text": self.prompt(topic)}],
                "role": "user",
            }],
            "tools": [{"googleSearch": {}}],
        })
    }
}

#[async_trait]
impl BriefingSource for ResearchCollector {
    async fn research(
        &self,
        topic: &str,
        credential: &str,
    ) -> Result<ResearchBriefing, DebateError> {
        if credential.trim().is_empty() {
            return Err(DebateError::ResearchFailed("Gemini API key not configured".to_string()));
        }

        tracing::debug!(topic, model = %self.model_id, "requesting research briefing");

        let response = self
            .http
            .post(generate_content_url(&self.base_url, &self.model_id))
            .query(&[("key", credential)])
            .json(&self.request_body(topic))
            .send()
            .await
            .map_err(|e| {
                let reason = describe_http_error(e);
                DebateError::ResearchFailed(format!("network request failed: {reason}"))
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DebateError::ResearchFailed(format!(
                "server responded with HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(|e| {
            DebateError::ResearchFailed(format!(
                "failed to read response body: {}",
                describe_http_error(e)
            ))
        })?;
        let text = extract_candidate_text(&body)
            .map_err(|e| DebateError::ResearchFailed(e.to_string()))?;

        Ok(ResearchBriefing::parse(&text))
    }
}
