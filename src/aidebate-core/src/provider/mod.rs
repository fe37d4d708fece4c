//! Vendor adapters.
//!
//! Each adapter knows how to turn a generic chat request into one HTTP call
//! for its vendor, and how to turn that vendor's response body back into a
//! lazy, finite sequence of text fragments.

pub mod claude;
pub mod gemini;
pub mod openai;
mod sse;

use std::pin::Pin;

use futures::Stream;

use crate::conversation::ChatTurn;
use crate::error::ProviderError;
use crate::model::ModelDescriptor;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// Response length cap sent to every vendor.
pub const MAX_TOKENS: u32 = 1500;

/// Prompt used when a model speaks first and has no history to respond to.
pub const OPENING_INSTRUCTION: &str = "Please provide your opening statement.";

/// Text fragments from one provider call. Not restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Everything an adapter needs to issue one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub model: &'a ModelDescriptor,
    pub system_prompt: &'a str,
    pub history: &'a [ChatTurn],
    pub credential: &'a str,
}

/// One vendor's wire protocol.
pub trait ProviderAdapter: Send + Sync {
    /// Build the HTTP request for `request`. Nothing is sent.
    fn build_request(
        &self,
        http: &reqwest::Client,
        request: &GenerateRequest<'_>,
    ) -> reqwest::RequestBuilder;

    /// Turn a successful (HTTP 200) response into text fragments.
    fn parse_response(&self, response: reqwest::Response) -> FragmentStream;
}

/// Describe a reqwest failure without its URL.
///
/// Gemini authenticates with a `?key=` query parameter, so the URL must never
/// reach the transcript or the logs. The source chain is kept for context.
pub(crate) fn describe_http_error(error: reqwest::Error) -> String {
    let error = error.without_url();
    let mut description = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}

/// Join a base URL and an absolute path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
