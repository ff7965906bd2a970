//! Speech engine abstraction.
//!
//! The `SpeechEngine` trait is the narrow capability the session drives. The
//! acoustic recognition itself happens behind it (a platform recognizer, a
//! cloud client, the [`stub::StubEngine`] used in tests).
//!
//! ## Notification contract
//!
//! ```text
//! session ──attach(EngineSink)──► engine
//! session ──start/stop/abort────► engine
//! engine  ──sink.result(..)─────► session queue
//! engine  ──sink.disconnected()─► session queue   (after stop/abort, or silently)
//! engine  ──sink.error(..)──────► session queue
//! ```
//!
//! Every sink is tagged with the generation of the engine it was issued to.
//! Once the session swaps or disables an engine, anything still sent through
//! an old sink is discarded.

pub mod stub;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::WeakUnboundedSender;

use crate::error::StartError;
use crate::session::SessionMsg;

/// One recognition hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub transcript: String,
    /// Engine confidence. Some mobile engines report `0.0` on results they
    /// wrongly flag as final.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// One utterance segment, best alternative first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self::single(transcript, false, 1.0)
    }

    pub fn final_result(transcript: impl Into<String>) -> Self {
        Self::single(transcript, true, 1.0)
    }

    pub fn single(transcript: impl Into<String>, is_final: bool, confidence: f32) -> Self {
        Self {
            alternatives: vec![Alternative {
                transcript: transcript.into(),
                confidence,
            }],
            is_final,
        }
    }

    /// The best alternative, if the engine supplied any.
    pub fn best(&self) -> Option<&Alternative> {
        self.alternatives.first()
    }
}

/// A result notification: the engine's result list plus the index of the
/// first entry that changed. Without an index only the last entry is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
    pub results: Vec<RecognitionResult>,
    #[serde(default)]
    pub result_index: Option<usize>,
}

impl ResultEvent {
    pub fn new(results: Vec<RecognitionResult>) -> Self {
        Self {
            results,
            result_index: Some(0),
        }
    }
}

/// Engine-reported failure kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineErrorKind {
    /// Microphone permission refused by the user or host policy.
    NotAllowed,
    /// No usable audio input.
    AudioCapture,
    Network,
    Other(String),
}

/// Notifications an engine delivers to its session.
#[derive(Debug, Clone)]
pub(crate) enum EngineNotification {
    Result(ResultEvent),
    Disconnected,
    Error(EngineErrorKind),
}

/// Generation-tagged handle an engine uses to notify its session.
///
/// Holds only a weak reference to the session queue: an engine never keeps a
/// session alive, and sends after the session is gone are dropped.
#[derive(Debug, Clone)]
pub struct EngineSink {
    generation: u64,
    tx: WeakUnboundedSender<SessionMsg>,
}

impl EngineSink {
    pub(crate) fn new(generation: u64, tx: WeakUnboundedSender<SessionMsg>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn result(&self, event: ResultEvent) {
        self.send(EngineNotification::Result(event));
    }

    pub fn disconnected(&self) {
        self.send(EngineNotification::Disconnected);
    }

    pub fn error(&self, kind: EngineErrorKind) {
        self.send(EngineNotification::Error(kind));
    }

    fn send(&self, notification: EngineNotification) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(SessionMsg::Engine {
                generation: self.generation,
                notification,
            });
        }
    }
}

/// Contract for speech capture backends.
///
/// `start`, `stop` and `abort` only *issue* the transition; the engine
/// confirms the end of capture through [`EngineSink::disconnected`].
pub trait SpeechEngine: Send + 'static {
    fn lang(&self) -> String;
    fn set_lang(&mut self, lang: &str);

    fn continuous(&self) -> bool;
    fn set_continuous(&mut self, continuous: bool);

    fn set_interim_results(&mut self, interim_results: bool);

    /// Whether this engine can keep capturing across utterances.
    fn supports_continuous(&self) -> bool {
        true
    }

    /// Register the sink for all further notifications, replacing any other.
    fn attach(&mut self, sink: EngineSink);

    /// Drop the registered sink. No notifications are sent afterwards.
    fn detach(&mut self);

    /// Begin capture.
    ///
    /// # Errors
    /// - `StartError::AlreadyStarted` if capture is already running.
    /// - `StartError::Failed` for any other refusal.
    fn start(&mut self) -> Result<(), StartError>;

    /// Finish capture, flushing pending final results.
    fn stop(&mut self);

    /// End capture immediately, discarding pending results.
    fn abort(&mut self);
}

/// Produces engines for a session. `None` means the host offers no speech
/// recognition.
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self) -> Option<Box<dyn SpeechEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Option<Box<dyn SpeechEngine>> + Send + Sync + 'static,
{
    fn create(&self) -> Option<Box<dyn SpeechEngine>> {
        self()
    }
}
