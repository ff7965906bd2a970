//! # hearken-core
//!
//! Voice command SDK: a shared speech capture session plus per-subscriber
//! transcripts and command matching.
//!
//! ## Architecture
//!
//! ```text
//! SpeechEngine ──EngineSink──► SpeechSession actor (one tokio task)
//!                                    │
//!                        result pass, burst de-duplication
//!                                    │
//!                    SessionListener (per subscriber, registration order)
//!                                    │
//!                   Recognizer: transcript::reduce + commands::dispatch
//! ```
//!
//! The engine never calls subscribers directly. Every notification goes
//! through the session queue and is discarded once its engine is replaced.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod clock;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod recognizer;
pub mod session;
pub mod transcript;

// Convenience re-exports for downstream crates
pub use commands::{
    compile, dispatch, similarity, Command, CommandMatch, CommandOptions, MatchContext, Phrase,
    PhraseSpec,
};
pub use config::{Platform, SessionConfig};
pub use engine::{
    EngineErrorKind, EngineFactory, EngineSink, RecognitionResult, ResultEvent, SpeechEngine,
};
pub use error::{HearkenError, Result, StartError};
pub use recognizer::{Recognizer, RecognizerOptions};
pub use session::{
    Capabilities, ListeningOptions, SessionListener, SessionSnapshot, SessionState, SpeechSession,
    SubscriberId, Subscription,
};
pub use transcript::{reduce, TranscriptEvent, TranscriptState};
