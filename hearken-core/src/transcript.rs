//! Per-subscriber transcript accumulation.
//!
//! [`reduce`] is a pure function: every subscriber keeps its own
//! [`TranscriptState`] and folds [`TranscriptEvent`]s into it, so one
//! subscriber clearing its transcript never affects another.

use serde::{Deserialize, Serialize};

/// Interim and committed text for one subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptState {
    /// Provisional hypothesis for the utterance in progress.
    pub interim_transcript: String,
    /// Committed text accumulated since the last clear.
    pub final_transcript: String,
}

impl TranscriptState {
    /// Final text followed by interim text.
    pub fn transcript(&self) -> String {
        concat_transcripts(&[&self.final_transcript, &self.interim_transcript])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Clear,
    /// Replace the interim text and append to the final text.
    Append {
        interim_transcript: String,
        final_transcript: String,
    },
}

pub fn reduce(state: &TranscriptState, event: TranscriptEvent) -> TranscriptState {
    match event {
        TranscriptEvent::Clear => TranscriptState::default(),
        TranscriptEvent::Append {
            interim_transcript,
            final_transcript,
        } => TranscriptState {
            interim_transcript,
            final_transcript: concat_transcripts(&[&state.final_transcript, &final_transcript]),
        },
    }
}

/// Trim each part, drop empty parts, join with single spaces.
pub fn concat_transcripts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
