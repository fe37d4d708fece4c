//! Google Gemini `generateContent` adapter.
//!
//! Gemini replies in one JSON document. The adapter replays the reply word by
//! word, with a short pause between words, so consumers still see the text
//! grow progressively. Line breaks survive the replay.

use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;

use super::{
    FragmentStream, GenerateRequest, MAX_TOKENS, OPENING_INSTRUCTION, ProviderAdapter,
    describe_http_error, endpoint,
};
use crate::error::ProviderError;

/// Default Gemini host.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Pause between replayed words.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// `generateContent` URL for `model_id` under `base_url`.
pub(crate) fn generate_content_url(base_url: &str, model_id: &str) -> String {
    endpoint(base_url, &format!("/v1beta/models/{model_id}:generateContent"))
}

/// Extract `candidates[0].content.parts[0].text` from a response body.
pub(crate) fn extract_candidate_text(body: &str) -> Result<String, ProviderError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::UnparsableResponse(format!("invalid JSON: {e}")))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| ProviderError::UnparsableResponse("response has no candidate text".into()))
}

/// Split `text` into words, each carrying the whitespace that follows it.
///
/// Leading whitespace is dropped. The last word gets a single space when
/// nothing follows it, so every fragment ends in whitespace.
fn word_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let gap = &rest[word_end..];
        let gap_end = gap.find(|c: char| !c.is_whitespace()).unwrap_or(gap.len());

        let mut fragment = rest[..word_end + gap_end].to_string();
        if gap_end == 0 {
            fragment.push(' ');
        }
        fragments.push(fragment);
        rest = &gap[gap_end..];
    }

    fragments
}

/// Replay `text` one word at a time, pausing `delay` between words.
pub(crate) fn replay_words(text: String, delay: Duration) -> impl Stream<Item = String> + Send {
    async_stream::stream! {
        let mut words = word_fragments(&text).into_iter().peekable();
        while let Some(word) = words.next() {
            yield word;
            if words.peek().is_some() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Adapter for Gemini's single-shot `generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    word_delay: Duration,
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_DELAY)
    }
}

impl GeminiAdapter {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }

    /// Combined prompt: the system prompt, a blank line, then the latest
    /// history entry or the opening instruction.
    pub(crate) fn prompt(request: &GenerateRequest<'_>) -> String {
        let latest = request
            .history
            .last()
            .map(|turn| turn.content.as_str())
            .unwrap_or(OPENING_INSTRUCTION);
        format!("{}\n\n{}", request.system_prompt, latest)
    }

    pub(crate) fn request_body(request: &GenerateRequest<'_>) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [{"text": Self::prompt(request)}],
                "role": "user",
            }],
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": MAX_TOKENS,
            },
        })
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn build_request(
        &self,
        http: &reqwest::Client,
        request: &GenerateRequest<'_>,
    ) -> reqwest::RequestBuilder {
        let base_url = request.model.base_url.as_deref().unwrap_or(GEMINI_BASE_URL);
        http.post(generate_content_url(base_url, &request.model.model_id))
            .query(&[("key", request.credential)])
            .json(&Self::request_body(request))
    }

    fn parse_response(&self, response: reqwest::Response) -> FragmentStream {
        let delay = self.word_delay;
        Box::pin(try_stream! {
            let body = response.text().await.map_err(|e| {
                ProviderError::TransportError(format!(
                    "failed to read response body: {}",
                    describe_http_error(e)
                ))
            })?;
            let text = extract_candidate_text(&body)?;

            for await word in replay_words(text, delay) {
                yield word;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ChatTurn;
    use crate::model::{CredentialKey, ModelDescriptor, ProviderKind};
    use futures::StreamExt;
    use std::time::Instant;

    fn model() -> ModelDescriptor {
        ModelDescriptor::new(
            "Gemini-2.0-Flash",
            ProviderKind::Gemini,
            "gemini-2.0-flash",
            CredentialKey::Gemini,
        )
    }

    #[tokio::test]
    async fn test_replay_words_yields_each_word_with_trailing_space() {
        let words: Vec<String> = replay_words("a b c".to_string(), Duration::ZERO).collect().await;
        assert_eq!(words, vec!["a ", "b ", "c "]);
    }

    #[test]
    fn test_word_fragments_keep_line_breaks() {
        assert_eq!(
            word_fragments("  Intro line.\n\n- first point\n- second"),
            vec!["Intro ", "line.\n\n", "- ", "first ", "point\n", "- ", "second "]
        );
        assert_eq!(word_fragments("one\t "), vec!["one\t "]);
        assert!(word_fragments(" \n ").is_empty());
    }

    #[tokio::test]
    async fn test_replayed_text_preserves_paragraphs() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let words: Vec<String> = replay_words(text.to_string(), Duration::ZERO).collect().await;
        assert_eq!(words.concat(), format!("{text} "));
    }

    #[tokio::test]
    async fn test_replay_words_pauses_between_words() {
        let delay = Duration::from_millis(20);
        let started = Instant::now();
        let words: Vec<String> = replay_words("a b c".to_string(), delay).collect().await;

        assert_eq!(words.len(), 3);
        assert!(started.elapsed() >= delay * 2);
    }

    #[test]
    fn test_extract_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"a b c"}],"role":"model"}}]}"#;
        assert_eq!(extract_candidate_text(body).unwrap(), "a b c");
    }

    #[test]
    fn test_extract_candidate_text_rejects_unrecognized_bodies() {
        assert!(matches!(
            extract_candidate_text("<html>"),
            Err(ProviderError::UnparsableResponse(_))
        ));
        assert!(matches!(
            extract_candidate_text(r#"{"candidates":[]}"#),
            Err(ProviderError::UnparsableResponse(_))
        ));
        assert!(matches!(
            extract_candidate_text(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(ProviderError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn test_prompt_uses_latest_turn_or_opening() {
        let model = model();
        let empty = GenerateRequest {
            model: &model,
            system_prompt: "sys",
            history: &[],
            credential: "k",
        };
        assert_eq!(GeminiAdapter::prompt(&empty), "sys\n\nPlease provide your opening statement.");

        let history = vec![ChatTurn::user("first"), ChatTurn::assistant("second")];
        let request = GenerateRequest { history: &history, ..empty };
        assert_eq!(GeminiAdapter::prompt(&request), "sys\n\nsecond");
    }

    #[test]
    fn test_request_body_shape() {
        let model = model();
        let request = GenerateRequest {
            model: &model,
            system_prompt: "sys",
            history: &[],
            credential: "k",
        };
        let body = GeminiAdapter::request_body(&request);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1500);
    }

    #[test]
    fn test_generate_content_url() {
        assert_eq!(
            generate_content_url(GEMINI_BASE_URL, "gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
