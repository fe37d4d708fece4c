//! Anthropic messages adapter.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use super::{
    FragmentStream, GenerateRequest, MAX_TOKENS, OPENING_INSTRUCTION, ProviderAdapter,
    describe_http_error, endpoint, sse,
};
use crate::conversation::ChatTurn;
use crate::error::ProviderError;

/// Default Anthropic host.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<EventDelta>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    text: Option<String>,
}

/// Text carried by one `data:` payload, if it is a `content_block_delta`.
pub(crate) fn parse_event(data: &str) -> Option<String> {
    let event: MessageEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed message event");
            return None;
        }
    };

    if event.event_type != "content_block_delta" {
        return None;
    }
    event.delta.and_then(|d| d.text)
}

/// Fragments from a messages SSE body. Runs until the body ends.
pub(crate) fn fragments<S, B, E>(
    body: S,
) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    try_stream! {
        let mut payloads = Box::pin(sse::data_payloads(body));
        while let Some(data) = payloads.next().await {
            if let Some(text) = parse_event(&data?) {
                yield text;
            }
        }
    }
}

/// Adapter for the Anthropic messages API.
#[derive(Debug, Clone, Default)]
pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Request body: the system prompt travels outside `messages`.
    ///
    /// The messages API rejects an empty conversation, so a first turn is
    /// sent the opening instruction as its only user message.
    pub(crate) fn request_body(request: &GenerateRequest<'_>) -> serde_json::Value {
        let opening = [ChatTurn::user(OPENING_INSTRUCTION)];
        let messages = if request.history.is_empty() {
            &opening[..]
        } else {
            request.history
        };

        json!({
            "model": request.model.model_id,
            "system": request.system_prompt,
            "messages": messages,
            "stream": true,
            "max_tokens": MAX_TOKENS,
        })
    }
}

impl ProviderAdapter for ClaudeAdapter {
    fn build_request(
        &self,
        http: &reqwest::Client,
        request: &GenerateRequest<'_>,
    ) -> reqwest::RequestBuilder {
        let base_url = request.model.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
        http.post(endpoint(base_url, "/v1/messages"))
            .header("x-api-key", request.credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&Self::request_body(request))
    }

    fn parse_response(&self, response: reqwest::Response) -> FragmentStream {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(describe_http_error));
        Box::pin(fragments(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialKey, ModelDescriptor, ProviderKind};

    #[test]
    fn test_ping_yields_nothing() {
        assert_eq!(parse_event(r#"{"type":"ping"}"#), None);
    }

    #[test]
    fn test_content_block_delta_yields_text() {
        assert_eq!(
            parse_event(
                r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"X"}}"#
            ),
            Some("X".to_string())
        );
    }

    #[test]
    fn test_other_events_and_garbage_ignored() {
        assert_eq!(parse_event(r#"{"type":"message_start","message":{"id":"m1"}}"#), None);
        assert_eq!(
            parse_event(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#),
            None
        );
        assert_eq!(parse_event("{oops"), None);
    }

    #[tokio::test]
    async fn test_stream_runs_until_body_ends() {
        let body = futures::stream::iter(vec![
            Ok::<_, std::io::Error>("event: message_start\ndata: {\"type\":\"message_start\"}\n\n"),
            Ok("event: ping\ndata: {\"type\":\"ping\"}\n\n"),
            Ok("event: content_block_delta\n\
                data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hello\"}}\n\n"),
            Ok("data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\" there\"}}\n\n"),
            Ok("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"),
        ]);

        let items: Vec<_> = fragments(body).collect().await;
        assert_eq!(items, vec![Ok("Hello".to_string()), Ok(" there".to_string())]);
    }

    #[test]
    fn test_request_body_separates_system_prompt() {
        let model = ModelDescriptor::new(
            "Claude 3.7 Sonnet",
            ProviderKind::Claude,
            "claude-3-7-sonnet-latest",
            CredentialKey::Claude,
        );
        let history = vec![ChatTurn::user("opening"), ChatTurn::assistant("reply")];
        let request = GenerateRequest {
            model: &model,
            system_prompt: "argue against",
            history: &history,
            credential: "key",
        };

        assert_eq!(
            ClaudeAdapter::request_body(&request),
            json!({
                "model": "claude-3-7-sonnet-latest",
                "system": "argue against",
                "messages": [
                    {"role": "user", "content": "opening"},
                    {"role": "assistant", "content": "reply"},
                ],
                "stream": true,
                "max_tokens": 1500,
            })
        );
    }

    #[test]
    fn test_first_turn_sends_opening_instruction() {
        let model =
            ModelDescriptor::new("Claude", ProviderKind::Claude, "claude-x", CredentialKey::Claude);
        let request = GenerateRequest {
            model: &model,
            system_prompt: "argue for",
            history: &[],
            credential: "key",
        };

        let body = ClaudeAdapter::request_body(&request);
        assert_eq!(
            body["messages"],
            json!([{"role": "user", "content": "Please provide your opening statement."}])
        );
    }
}
