//! Debate orchestration logic.
//!
//! Runs the research phase, then alternates the two sides for a fixed number
//! of rounds, streaming each turn into the transcript as it arrives.

use std::sync::Arc;

use chrono::{DateTime, Local};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{Credentials, PromptsConfig};
use crate::conversation::{SpeakerLog, build_conversation_history};
use crate::engine::{FragmentSource, StreamEvent};
use crate::error::DebateError;
use crate::model::{CredentialKey, ModelDescriptor, Side};
use crate::research::{BriefingSource, ResearchBriefing};
use crate::transcript::{Transcript, TranscriptEntry, export_markdown};

/// What to debate and who debates it.
#[derive(Debug, Clone)]
pub struct DebateSetup {
    pub topic: String,
    pub rounds: u32,
    pub affirmative: ModelDescriptor,
    pub opposition: ModelDescriptor,
}

impl DebateSetup {
    pub fn new(
        topic: impl Into<String>,
        rounds: u32,
        affirmative: ModelDescriptor,
        opposition: ModelDescriptor,
    ) -> Self {
        Self {
            topic: topic.into(),
            rounds,
            affirmative,
            opposition,
        }
    }
}

/// Where a debate is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebatePhase {
    Idle,
    Researching,
    /// A side is speaking in a 1-based round.
    Debating { round: u32, side: Side },
    Finished,
}

impl DebatePhase {
    /// The phase that follows this one when everything succeeds.
    ///
    /// Affirmative always opens a round; the round after the opposition's
    /// turn in the last round is `Finished`.
    pub fn next(self, rounds: u32) -> DebatePhase {
        match self {
            DebatePhase::Idle => DebatePhase::Researching,
            DebatePhase::Researching => DebatePhase::Debating {
                round: 1,
                side: Side::Affirmative,
            },
            DebatePhase::Debating {
                round,
                side: Side::Affirmative,
            } => DebatePhase::Debating {
                round,
                side: Side::Opposition,
            },
            DebatePhase::Debating {
                round,
                side: Side::Opposition,
            } if round < rounds => DebatePhase::Debating {
                round: round + 1,
                side: Side::Affirmative,
            },
            DebatePhase::Debating { .. } | DebatePhase::Finished => DebatePhase::Finished,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            DebatePhase::Idle => SessionStatus::Idle,
            DebatePhase::Researching | DebatePhase::Debating { .. } => SessionStatus::Running,
            DebatePhase::Finished => SessionStatus::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Finished,
}

/// How a single turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply streamed to completion and was added to the side's log.
    Completed,
    /// The call failed; the entry shows the error.
    Failed,
    /// No API key for the side's model; no call was made.
    Skipped,
    /// Cancelled mid-stream; the entry keeps the partial text.
    Cancelled,
}

/// Everything about one debate.
#[derive(Debug, Clone)]
pub struct DebateSession {
    topic: String,
    rounds: u32,
    affirmative: ModelDescriptor,
    opposition: ModelDescriptor,
    briefing: Option<ResearchBriefing>,
    affirmative_prompt: String,
    opposition_prompt: String,
    transcript: Transcript,
    affirmative_log: SpeakerLog,
    opposition_log: SpeakerLog,
    phase: DebatePhase,
    cancelled: bool,
}

impl DebateSession {
    fn new(setup: DebateSetup) -> Self {
        Self {
            topic: setup.topic,
            rounds: setup.rounds,
            affirmative: setup.affirmative,
            opposition: setup.opposition,
            briefing: None,
            affirmative_prompt: String::new(),
            opposition_prompt: String::new(),
            transcript: Transcript::new(),
            affirmative_log: SpeakerLog::new(),
            opposition_log: SpeakerLog::new(),
            phase: DebatePhase::Idle,
            cancelled: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn model(&self, side: Side) -> &ModelDescriptor {
        match side {
            Side::Affirmative => &self.affirmative,
            Side::Opposition => &self.opposition,
        }
    }

    pub fn briefing(&self) -> Option<&ResearchBriefing> {
        self.briefing.as_ref()
    }

    /// The rendered system prompt for `side`. Empty until research completes.
    pub fn system_prompt(&self, side: Side) -> &str {
        match side {
            Side::Affirmative => &self.affirmative_prompt,
            Side::Opposition => &self.opposition_prompt,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    pub fn log(&self, side: Side) -> &SpeakerLog {
        match side {
            Side::Affirmative => &self.affirmative_log,
            Side::Opposition => &self.opposition_log,
        }
    }

    fn log_mut(&mut self, side: Side) -> &mut SpeakerLog {
        match side {
            Side::Affirmative => &mut self.affirmative_log,
            Side::Opposition => &mut self.opposition_log,
        }
    }

    pub fn phase(&self) -> DebatePhase {
        self.phase
    }

    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Render the transcript as Markdown.
    pub fn export_markdown(&self, generated_at: DateTime<Local>) -> String {
        export_markdown(&self.topic, self.transcript.entries(), generated_at)
    }
}

/// Callback for debate events.
pub type DebateCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Events emitted during a debate.
#[derive(Debug, Clone)]
pub enum DebateEvent {
    /// The debate moved to a new phase.
    PhaseChanged(DebatePhase),
    /// An entry was added to the transcript. Speaker entries start empty.
    EntryAppended { index: usize, entry: TranscriptEntry },
    /// A fragment was appended to the entry at `index`.
    Fragment { index: usize, fragment: String },
    /// A speaker's turn ended and its entry is frozen.
    TurnFinished {
        index: usize,
        entry: TranscriptEntry,
        outcome: TurnOutcome,
    },
    /// The debate has concluded.
    DebateEnd,
}

/// Orchestrates a debate between two models.
pub struct DebateOrchestrator {
    engine: Arc<dyn FragmentSource>,
    researcher: Arc<dyn BriefingSource>,
    credentials: Credentials,
    prompts: PromptsConfig,
    language: String,
    session: Option<DebateSession>,
    cancel: CancellationToken,
    callback: Option<DebateCallback>,
}

impl DebateOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        engine: Arc<dyn FragmentSource>,
        researcher: Arc<dyn BriefingSource>,
        credentials: Credentials,
    ) -> Self {
        Self {
            engine,
            researcher,
            credentials,
            prompts: PromptsConfig::default(),
            language: "English".to_string(),
            session: None,
            cancel: CancellationToken::new(),
            callback: None,
        }
    }

    /// Use custom system prompt templates.
    pub fn with_prompts(mut self, prompts: PromptsConfig) -> Self {
        self.prompts = prompts;
        self
    }

    /// Language both debaters answer in.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set a callback for debate events.
    pub fn with_callback(mut self, callback: DebateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Token that cancels the debate in progress.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The current or most recent debate.
    pub fn session(&self) -> Option<&DebateSession> {
        self.session.as_ref()
    }

    /// Run a full debate, replacing any previous session.
    ///
    /// Per-turn failures are recorded in the transcript and do not stop the
    /// debate. A failed research phase ends it: the session is kept (see
    /// [`DebateOrchestrator::session`]) and `ResearchFailed` is returned.
    pub async fn run(&mut self, setup: DebateSetup) -> Result<&DebateSession, DebateError> {
        if setup.topic.trim().is_empty() {
            return Err(DebateError::EmptyTopic);
        }
        if setup.rounds == 0 {
            return Err(DebateError::InvalidRoundCount(setup.rounds));
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.session = None;
        let mut session = DebateSession::new(setup);
        let result = self.drive(&mut session).await;
        let session = &*self.session.insert(session);

        result?;
        Ok(session)
    }

    async fn drive(&self, session: &mut DebateSession) -> Result<(), DebateError> {
        self.enter(session, DebatePhase::Researching);

        let briefing = match self.research(session).await {
            Ok(Some(briefing)) => briefing,
            Ok(None) => {
                self.finish(session, true);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "research failed, ending debate");
                self.append(session, TranscriptEntry::system(format!("❌ {}", e)));
                self.finish(session, false);
                return Err(e);
            }
        };

        let render = |side| {
            self.prompts.system_prompt(side, &session.topic, &briefing, &self.language)
        };
        session.affirmative_prompt = render(Side::Affirmative);
        session.opposition_prompt = render(Side::Opposition);

        self.append(
            session,
            TranscriptEntry::system(format!(
                "### Affirmative Research Briefing\n\n---\n{}",
                briefing.affirmative_arguments
            )),
        );
        self.append(
            session,
            TranscriptEntry::system(format!(
                "### Opposition Research Briefing\n\n---\n{}",
                briefing.opposition_arguments
            )),
        );
        session.briefing = Some(briefing);

        let mut phase = DebatePhase::Researching.next(session.rounds);
        while let DebatePhase::Debating { side, .. } = phase {
            if self.cancel.is_cancelled() {
                self.finish(session, true);
                return Ok(());
            }

            self.enter(session, phase);
            if self.take_turn(session, side).await == TurnOutcome::Cancelled {
                self.finish(session, true);
                return Ok(());
            }
            phase = phase.next(session.rounds);
        }

        self.finish(session, false);
        Ok(())
    }

    /// Collect the briefing. `Ok(None)` means the debate was cancelled.
    async fn research(
        &self,
        session: &DebateSession,
    ) -> Result<Option<ResearchBriefing>, DebateError> {
        let Some(credential) = self.credentials.get(CredentialKey::Gemini) else {
            return Err(DebateError::ResearchFailed(
                "Gemini API key not configured".to_string(),
            ));
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            result = self.researcher.research(&session.topic, credential) => result,
        };

        match result {
            Ok(briefing) => Ok(Some(briefing)),
            Err(DebateError::ResearchFailed(reason)) => Err(DebateError::ResearchFailed(reason)),
            Err(other) => Err(DebateError::ResearchFailed(other.to_string())),
        }
    }

    /// Run one side's turn, streaming its reply into a new transcript entry.
    async fn take_turn(&self, session: &mut DebateSession, side: Side) -> TurnOutcome {
        let model = session.model(side).clone();
        let speaker = side.speaker_label(&model);

        let Some(credential) = self.credentials.get(model.credential) else {
            tracing::warn!(
                side = %side,
                model = %model.name,
                "no API key configured, skipping turn"
            );
            let entry = TranscriptEntry::system_for(
                &speaker,
                format!("❌ API key not configured for {}", model.name),
            );
            let index = self.append(session, entry.clone());
            self.emit(DebateEvent::TurnFinished {
                index,
                entry,
                outcome: TurnOutcome::Skipped,
            });
            return TurnOutcome::Skipped;
        };

        let history =
            build_conversation_history(&session.affirmative_log, &session.opposition_log, side);
        let system_prompt = session.system_prompt(side).to_string();

        let index = session.transcript.open_entry(speaker.as_str());
        if let Some(entry) = session.entries().get(index).cloned() {
            self.emit(DebateEvent::EntryAppended { index, entry });
        }

        let mut stream = self
            .engine
            .generate(&model, &system_prompt, &history, credential, &self.cancel);
        let mut accumulated = String::new();
        let mut outcome = None;

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Fragment(fragment) => {
                    accumulated.push_str(&fragment);
                    session.transcript.set_open_text(accumulated.as_str());
                    self.emit(DebateEvent::Fragment { index, fragment });
                }
                StreamEvent::Completed => {
                    session.log_mut(side).push(accumulated.clone());
                    outcome = Some(TurnOutcome::Completed);
                    break;
                }
                StreamEvent::Failed(e) => {
                    tracing::warn!(side = %side, model = %model.name, error = %e, "turn failed");
                    session.transcript.set_open_text(format!("❌ Error: {}", e));
                    outcome = Some(TurnOutcome::Failed);
                    break;
                }
                StreamEvent::Cancelled => {
                    outcome = Some(TurnOutcome::Cancelled);
                    break;
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| {
            session
                .transcript
                .set_open_text("❌ Error: stream ended unexpectedly");
            TurnOutcome::Failed
        });

        if let Some(entry) = session.transcript.close().cloned() {
            self.emit(DebateEvent::TurnFinished {
                index,
                entry,
                outcome,
            });
        }

        outcome
    }

    fn enter(&self, session: &mut DebateSession, phase: DebatePhase) {
        tracing::debug!(?phase, topic = %session.topic, "entering debate phase");
        session.phase = phase;
        self.emit(DebateEvent::PhaseChanged(phase));
    }

    fn finish(&self, session: &mut DebateSession, cancelled: bool) {
        session.transcript.close();
        session.cancelled = cancelled;

        let closing = if cancelled {
            "🛑 Debate cancelled."
        } else {
            "🏁 Debate finished."
        };
        self.append(session, TranscriptEntry::system(closing));
        self.enter(session, DebatePhase::Finished);
        self.emit(DebateEvent::DebateEnd);
    }

    fn append(&self, session: &mut DebateSession, entry: TranscriptEntry) -> usize {
        let index = session.transcript.push(entry.clone());
        self.emit(DebateEvent::EntryAppended { index, entry });
        index
    }

    /// Emit an event if a callback is registered.
    fn emit(&self, event: DebateEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
