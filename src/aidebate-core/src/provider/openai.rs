//! OpenAI chat completions adapter.
//!
//! Also serves OpenAI-compatible hosts (Deepseek, Groq) through the model's
//! base URL.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use super::{
    FragmentStream, GenerateRequest, MAX_TOKENS, ProviderAdapter, describe_http_error, endpoint,
    sse,
};
use crate::conversation::ChatTurn;
use crate::error::ProviderError;

/// Default OpenAI host.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// What a single `data:` payload means for the stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkOutcome {
    Fragment(String),
    Done,
    Skip,
}

/// Interpret one `data:` payload of a chat completions stream.
pub(crate) fn parse_chunk(data: &str) -> ChunkOutcome {
    if data.trim() == DONE_SENTINEL {
        return ChunkOutcome::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty())
            .map_or(ChunkOutcome::Skip, ChunkOutcome::Fragment),
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed chat completion chunk");
            ChunkOutcome::Skip
        }
    }
}

/// Fragments from a chat completions SSE body, stopping at `data: [DONE]`.
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
            match parse_chunk(&data?) {
                ChunkOutcome::Fragment(text) => yield text,
                ChunkOutcome::Done => break,
                ChunkOutcome::Skip => {}
            }
        }
    }
}

/// Adapter for OpenAI-compatible chat completions.
#[derive(Debug, Clone, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Request body: the system prompt followed by the history.
    pub(crate) fn request_body(request: &GenerateRequest<'_>) -> serde_json::Value {
        let messages: Vec<ChatTurn> = std::iter::once(ChatTurn::system(request.system_prompt))
            .chain(request.history.iter().cloned())
            .collect();

        json!({
            "model": request.model.model_id,
            "messages": messages,
            "stream": true,
            "max_tokens": MAX_TOKENS,
        })
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn build_request(
        &self,
        http: &reqwest::Client,
        request: &GenerateRequest<'_>,
    ) -> reqwest::RequestBuilder {
        let base_url = request.model.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        http.post(endpoint(base_url, "/v1/chat/completions"))
            .bearer_auth(request.credential)
            .json(&Self::request_body(request))
    }

    fn parse_response(&self, response: reqwest::Response) -> FragmentStream {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(describe_http_error));
        Box::pin(fragments(body))
    }
}
