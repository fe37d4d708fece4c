//! AI Debate Core Library
//!
//! Provides the debate orchestration logic, the streaming engine that talks to
//! the model vendors, research collection, and transcript export.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod research;
pub mod transcript;

pub use config::{Config, Credentials, PromptsConfig};
pub use conversation::{ChatRole, ChatTurn, SpeakerLog, build_conversation_history};
pub use engine::{
    EngineSettings, EventStream, FragmentSource, StreamEvent, StreamingEngine, build_http_client,
};
pub use error::{DebateError, ProviderError};
pub use model::{CredentialKey, ModelDescriptor, ProviderKind, Side, default_catalog, find_model};
pub use orchestrator::{
    DebateCallback, DebateEvent, DebateOrchestrator, DebatePhase, DebateSession, DebateSetup,
    SessionStatus, TurnOutcome,
};
pub use research::{BriefingSource, ResearchBriefing, ResearchCollector};
pub use transcript::{Transcript, TranscriptEntry, export_markdown};
