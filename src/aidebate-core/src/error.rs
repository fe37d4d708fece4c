//! Error types for the debate system.

use thiserror::Error;

/// Failure of a single provider call.
///
/// These never abort a debate on their own; the orchestrator turns them into
/// transcript entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network request failed: {0}")]
    TransportError(String),

    #[error("server responded with HTTP {status}")]
    BadServerResponse { status: u16 },

    #[error("could not parse response: {0}")]
    UnparsableResponse(String),
}

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Debate topic cannot be empty")]
    EmptyTopic,

    #[error("Invalid round count: {0} (a debate needs at least one round)")]
    InvalidRoundCount(u32),

    #[error("Research failed: {0}")]
    ResearchFailed(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
