//! The live debate transcript and its Markdown export.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A message in the debate transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    /// Speaker label; `None` for status messages.
    pub speaker: Option<String>,
    /// Text of the entry. Grows while the entry's stream is in flight.
    pub text: String,
    pub timestamp: DateTime<Local>,
    pub is_system: bool,
}

impl TranscriptEntry {
    /// A status message with no speaker.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: None,
            text: text.into(),
            timestamp: Local::now(),
            is_system: true,
        }
    }

    /// A status message attributed to a speaker (e.g. a skipped turn).
    pub fn system_for(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Some(speaker.into()),
            text: text.into(),
            timestamp: Local::now(),
            is_system: true,
        }
    }

    /// A speaker's turn.
    pub fn speech(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Some(speaker.into()),
            text: text.into(),
            timestamp: Local::now(),
            is_system: false,
        }
    }
}

/// Append-only list of entries with at most one open (streaming) entry.
///
/// The open entry, when present, is always the last one. Appending a new
/// entry freezes it.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry currently being streamed into.
    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    /// Append a frozen entry and return its index.
    pub(crate) fn push(&mut self, entry: TranscriptEntry) -> usize {
        self.open = None;
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Append an empty entry for `speaker` that stays open for updates.
    pub(crate) fn open_entry(&mut self, speaker: impl Into<String>) -> usize {
        let index = self.push(TranscriptEntry::speech(speaker, ""));
        self.open = Some(index);
        index
    }

    /// Overwrite the text of the open entry. No-op when nothing is open.
    pub(crate) fn set_open_text(&mut self, text: impl Into<String>) {
        if let Some(entry) = self.open.and_then(|i| self.entries.get_mut(i)) {
            entry.text = text.into();
            entry.timestamp = Local::now();
        }
    }

    /// Freeze the open entry, returning it.
    pub(crate) fn close(&mut self) -> Option<&TranscriptEntry> {
        self.open.take().and_then(|i| self.entries.get(i))
    }
}

/// Render a transcript as a Markdown document.
pub fn export_markdown(
    topic: &str,
    entries: &[TranscriptEntry],
    generated_at: DateTime<Local>,
) -> String {
    let mut export = format!("# Debate on: {}\n", topic);
    export.push_str(&format!(
        "> Generated on: {}\n\n---\n\n",
        generated_at.format("%b %-d, %Y at %H:%M")
    ));

    for entry in entries {
        match &entry.speaker {
            Some(speaker) => {
                export.push_str(&format!("**{}:**\n\n{}\n\n---\n\n", speaker, entry.text))
            }
            None => export.push_str(&format!("*{}*\n\n---\n\n", entry.text)),
        }
    }

    export
}
