//! Streaming response engine.
//!
//! Dispatches a generation call to the adapter for the model's provider and
//! normalizes the result into one event stream: any number of fragments,
//! then exactly one terminal event.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conversation::ChatTurn;
use crate::error::{DebateError, ProviderError};
use crate::model::{ModelDescriptor, ProviderKind};
use crate::provider::{
    ClaudeAdapter, GeminiAdapter, GenerateRequest, OpenAiAdapter, ProviderAdapter,
    describe_http_error,
};

/// One item of a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of generated text.
    Fragment(String),
    /// All fragments were delivered.
    Completed,
    /// The call failed; fragments already delivered stand.
    Failed(ProviderError),
    /// The cancellation token was raised before the call finished.
    Cancelled,
}

/// Fragments followed by exactly one terminal event.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Something that can stream a model's reply.
pub trait FragmentSource: Send + Sync {
    fn generate(
        &self,
        model: &ModelDescriptor,
        system_prompt: &str,
        history: &[ChatTurn],
        credential: &str,
        cancel: &CancellationToken,
    ) -> EventStream;
}

/// HTTP settings for the engine's client.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub gemini_word_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            connect_timeout: Duration::from_secs(30),
            gemini_word_delay: crate::provider::gemini::DEFAULT_WORD_DELAY,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            connect_timeout: Duration::from_secs(config.http.connect_timeout_secs),
            gemini_word_delay: Duration::from_millis(config.streaming.gemini_word_delay_ms),
        }
    }
}

/// Build the shared HTTP client.
pub fn build_http_client(settings: &EngineSettings) -> Result<reqwest::Client, DebateError> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .build()
        .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

/// Streams replies from OpenAI-compatible, Claude, and Gemini models.
#[derive(Clone)]
pub struct StreamingEngine {
    http: reqwest::Client,
    openai: Arc<dyn ProviderAdapter>,
    claude: Arc<dyn ProviderAdapter>,
    gemini: Arc<dyn ProviderAdapter>,
}

impl StreamingEngine {
    /// Create an engine with its own HTTP client.
    pub fn new(settings: &EngineSettings) -> Result<Self, DebateError> {
        let http = build_http_client(settings)?;
        Ok(Self::with_client(http, settings.gemini_word_delay))
    }

    /// Create an engine around an existing client.
    pub fn with_client(http: reqwest::Client, gemini_word_delay: Duration) -> Self {
        Self {
            http,
            openai: Arc::new(OpenAiAdapter::new()),
            claude: Arc::new(ClaudeAdapter::new()),
            gemini: Arc::new(GeminiAdapter::new(gemini_word_delay)),
        }
    }

    fn adapter(&self, kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::OpenAiCompatible => Arc::clone(&self.openai),
            ProviderKind::Claude => Arc::clone(&self.claude),
            ProviderKind::Gemini => Arc::clone(&self.gemini),
        }
    }
}

impl FragmentSource for StreamingEngine {
    fn generate(
        &self,
        model: &ModelDescriptor,
        system_prompt: &str,
        history: &[ChatTurn],
        credential: &str,
        cancel: &CancellationToken,
    ) -> EventStream {
        let adapter = self.adapter(model.provider);
        let request = adapter.build_request(
            &self.http,
            &GenerateRequest {
                model,
                system_prompt,
                history,
                credential,
            },
        );
        let cancel = cancel.clone();
        let model_name = model.name.clone();

        tracing::debug!(
            model = %model_name,
            provider = ?model.provider,
            turns = history.len(),
            "sending generation request"
        );

        Box::pin(stream! {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                sent = request.send() => Some(sent),
            };

            let response = match sent {
                None => {
                    yield StreamEvent::Cancelled;
                    return;
                }
                Some(Err(e)) => {
                    tracing::warn!(model = %model_name, error = %e, "generation request failed");
                    let message = describe_http_error(e);
                    yield StreamEvent::Failed(ProviderError::TransportError(message));
                    return;
                }
                Some(Ok(response)) => response,
            };

            let status = response.status();
            if status != StatusCode::OK {
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    body = response.text() => Some(body.unwrap_or_default()),
                };
                let Some(body) = body else {
                    yield StreamEvent::Cancelled;
                    return;
                };

                tracing::warn!(
                    model = %model_name,
                    status = status.as_u16(),
                    body = %body,
                    "provider rejected request"
                );
                yield StreamEvent::Failed(ProviderError::BadServerResponse {
                    status: status.as_u16(),
                });
                return;
            }

            let mut fragments = adapter.parse_response(response);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = fragments.next() => Some(item),
                };

                match next {
                    None => {
                        tracing::debug!(model = %model_name, "generation cancelled");
                        yield StreamEvent::Cancelled;
                        break;
                    }
                    Some(None) => {
                        yield StreamEvent::Completed;
                        break;
                    }
                    Some(Some(Ok(fragment))) => yield StreamEvent::Fragment(fragment),
                    Some(Some(Err(e))) => {
                        tracing::warn!(model = %model_name, error = %e, "stream failed");
                        yield StreamEvent::Failed(e);
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CredentialKey;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> StreamingEngine {
        StreamingEngine::new(&EngineSettings {
            gemini_word_delay: Duration::ZERO,
            ..EngineSettings::default()
        })
        .unwrap()
    }

    async fn collect(stream: EventStream) -> Vec<StreamEvent> {
        stream.collect().await
    }

    async fn generate(model: &ModelDescriptor, credential: &str) -> Vec<StreamEvent> {
        collect(engine().generate(model, "sys", &[], credential, &CancellationToken::new())).await
    }

    fn gemini_model(base_url: impl Into<String>) -> ModelDescriptor {
        ModelDescriptor::new(
            "Gemini",
            ProviderKind::Gemini,
            "gemini-2.0-flash",
            CredentialKey::Gemini,
        )
        .with_base_url(base_url)
    }

    fn openai_model(base_url: impl Into<String>) -> ModelDescriptor {
        ModelDescriptor::new(
            "GPT-4o",
            ProviderKind::OpenAiCompatible,
            "gpt-4o",
            CredentialKey::OpenAi,
        )
        .with_base_url(base_url)
    }

    fn sse(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
    }

    #[tokio::test]
    async fn test_openai_stream_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "stream": true,
                "max_tokens": 1500,
                "messages": [{"role": "system", "content": "sys"}],
            })))
            .respond_with(sse(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
                 data: [DONE]\n\n",
            ))
            .mount(&server)
            .await;

        let model = openai_model(server.uri());
        let events = generate(&model, "sk-test").await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("Hello".into()),
                StreamEvent::Fragment(" world".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_claude_stream_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "claude-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({"system": "sys", "stream": true})))
            .respond_with(sse(
                "event: ping\ndata: {\"type\":\"ping\"}\n\n\
                 event: content_block_delta\n\
                 data: {\"type\":\"content_block_delta\",\
                 \"delta\":{\"type\":\"text_delta\",\"text\":\"X\"}}\n\n",
            ))
            .mount(&server)
            .await;

        let model = ModelDescriptor::new(
            "Claude",
            ProviderKind::Claude,
            "claude-3-7-sonnet-latest",
            CredentialKey::Claude,
        )
        .with_base_url(server.uri());
        let events = generate(&model, "claude-key").await;

        assert_eq!(events, vec![StreamEvent::Fragment("X".into()), StreamEvent::Completed]);
    }

    #[tokio::test]
    async fn test_gemini_replays_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "a b c"}], "role": "model"}}]
            })))
            .mount(&server)
            .await;

        let model = gemini_model(server.uri());
        let events = generate(&model, "g-key").await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("a ".into()),
                StreamEvent::Fragment("b ".into()),
                StreamEvent::Fragment("c ".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_gemini_unparsable_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let model = gemini_model(server.uri());
        let events = generate(&model, "g-key").await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Failed(ProviderError::UnparsableResponse(_))));
    }

    #[tokio::test]
    async fn test_non_200_is_bad_server_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"bad key\"}"))
            .mount(&server)
            .await;

        let model = openai_model(server.uri());
        let events = generate(&model, "wrong").await;

        assert_eq!(
            events,
            vec![StreamEvent::Failed(ProviderError::BadServerResponse { status: 401 })]
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let model = openai_model("http://127.0.0.1:1");
        let events = generate(&model, "k").await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Failed(ProviderError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let model = openai_model("http://127.0.0.1:1");
        let events = collect(engine().generate(&model, "sys", &[], "k", &cancel)).await;

        assert_eq!(events, vec![StreamEvent::Cancelled]);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "one two three four"}]}}]
            })))
            .mount(&server)
            .await;

        let engine = StreamingEngine::new(&EngineSettings {
            gemini_word_delay: Duration::from_millis(200),
            ..EngineSettings::default()
        })
        .unwrap();
        let model = gemini_model(server.uri());
        let cancel = CancellationToken::new();
        let mut stream = engine.generate(&model, "sys", &[], "g-key", &cancel);

        assert_eq!(stream.next().await, Some(StreamEvent::Fragment("one ".into())));
        cancel.cancel();
        assert_eq!(stream.next().await, Some(StreamEvent::Cancelled));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_transport_error_hides_gemini_key() {
        let model = gemini_model("http://127.0.0.1:1");
        let events = generate(&model, "SECRET-GEMINI-KEY").await;

        let [StreamEvent::Failed(ProviderError::TransportError(message))] = events.as_slice() else {
            panic!("expected a transport error, got {events:?}");
        };
        assert!(!message.contains("SECRET-GEMINI-KEY"));
        assert!(!message.contains("key="));
    }

    #[tokio::test]
    async fn test_cancel_while_reading_error_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 1000\r\n\r\n";
            socket.write_all(head).await.unwrap();
            socket.write_all(b"partial").await.unwrap();
            // Hold the connection open with the body incomplete.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let model = openai_model(format!("http://{address}"));
        let cancel = CancellationToken::new();
        let mut stream = engine().generate(&model, "sys", &[], "k", &cancel);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let first = tokio::time::timeout(Duration::from_secs(3), stream.next()).await;
        assert_eq!(first, Ok(Some(StreamEvent::Cancelled)));
        assert_eq!(stream.next().await, None);

        server.abort();
    }
}
