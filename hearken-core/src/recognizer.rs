//! `Recognizer`: one subscriber's view of a shared session.
//!
//! Each recognizer keeps its own transcript and command list. Transcript
//! updates from the session are folded into the transcript (when
//! transcribing) and then matched against the commands.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::commands::{dispatch, Command};
use crate::error::Result;
use crate::session::{Capabilities, SessionListener, SpeechSession, Subscription};
use crate::transcript::{reduce, TranscriptEvent, TranscriptState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerOptions {
    /// Accumulate transcript text. Commands are matched either way.
    /// Default: true.
    pub transcribing: bool,
    /// Empty the transcript when a discontinuous capture begins.
    /// Default: true.
    pub clear_transcript_on_listen: bool,
}

impl Default for RecognizerOptions {
    fn default() -> Self {
        Self {
            transcribing: true,
            clear_transcript_on_listen: true,
        }
    }
}

#[derive(Debug, Default)]
struct RecognizerState {
    transcript: TranscriptState,
    listening: bool,
    microphone_available: bool,
    capabilities: Capabilities,
}

struct RecognizerInner {
    session: SpeechSession,
    options: RecognizerOptions,
    state: Mutex<RecognizerState>,
    commands: RwLock<Arc<Vec<Command>>>,
}

impl RecognizerInner {
    fn reset_transcript(&self) -> Result<()> {
        self.state.lock().transcript = TranscriptState::default();
        self.session.reset_transcript()
    }
}

impl SessionListener for RecognizerInner {
    fn on_listening_changed(&self, listening: bool) {
        self.state.lock().listening = listening;
    }

    fn on_transcript_changed(&self, interim_transcript: &str, final_transcript: &str) {
        let commands = {
            let mut state = self.state.lock();
            if self.options.transcribing {
                state.transcript = reduce(
                    &state.transcript,
                    TranscriptEvent::Append {
                        interim_transcript: interim_transcript.to_string(),
                        final_transcript: final_transcript.to_string(),
                    },
                );
            }
            Arc::clone(&*self.commands.read())
        };

        // Callbacks run unlocked so they may reset this transcript.
        let reset = || {
            if let Err(err) = self.reset_transcript() {
                debug!(error = %err, "transcript reset from command ignored");
            }
        };
        dispatch(&commands, interim_transcript, final_transcript, &reset);
    }

    fn on_clear_transcript(&self) {
        if self.options.clear_transcript_on_listen {
            self.state.lock().transcript = TranscriptState::default();
        }
    }

    fn on_mic_availability_changed(&self, available: bool) {
        self.state.lock().microphone_available = available;
    }

    fn on_capability_changed(&self, capabilities: Capabilities) {
        self.state.lock().capabilities = capabilities;
    }
}

/// A subscriber with its own transcript and voice commands.
///
/// Dropping the recognizer unsubscribes it.
pub struct Recognizer {
    inner: Arc<RecognizerInner>,
    _subscription: Subscription,
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("options", &self.inner.options)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

impl Recognizer {
    pub fn new(session: &SpeechSession, options: RecognizerOptions, commands: Vec<Command>) -> Self {
        let snapshot = session.snapshot();
        let inner = Arc::new(RecognizerInner {
            session: session.clone(),
            options,
            state: Mutex::new(RecognizerState {
                transcript: TranscriptState::default(),
                listening: snapshot.listening,
                microphone_available: snapshot.microphone_available,
                capabilities: snapshot.capabilities,
            }),
            commands: RwLock::new(Arc::new(commands)),
        });
        let subscription = session.subscribe(Arc::clone(&inner) as Arc<dyn SessionListener>);
        Self {
            inner,
            _subscription: subscription,
        }
    }

    /// Final text followed by interim text.
    pub fn transcript(&self) -> String {
        self.inner.state.lock().transcript.transcript()
    }

    pub fn interim_transcript(&self) -> String {
        self.inner.state.lock().transcript.interim_transcript.clone()
    }

    pub fn final_transcript(&self) -> String {
        self.inner.state.lock().transcript.final_transcript.clone()
    }

    pub fn transcript_state(&self) -> TranscriptState {
        self.inner.state.lock().transcript.clone()
    }

    pub fn listening(&self) -> bool {
        self.inner.state.lock().listening
    }

    pub fn is_microphone_available(&self) -> bool {
        self.inner.state.lock().microphone_available
    }

    pub fn supports_speech_recognition(&self) -> bool {
        self.inner.state.lock().capabilities.speech_recognition
    }

    pub fn supports_continuous_listening(&self) -> bool {
        self.inner.state.lock().capabilities.continuous_listening
    }

    /// Clear this recognizer's transcript and drop the engine's in-flight
    /// results. Other subscribers keep their text.
    ///
    /// # Errors
    /// `HearkenError::SessionClosed` if the session has exited. The local
    /// transcript is cleared regardless.
    pub fn reset_transcript(&self) -> Result<()> {
        self.inner.reset_transcript()
    }

    /// Replace the command list used for subsequent transcript updates.
    pub fn set_commands(&self, commands: Vec<Command>) {
        *self.inner.commands.write() = Arc::new(commands);
    }

    pub fn session(&self) -> &SpeechSession {
        &self.inner.session
    }
}
