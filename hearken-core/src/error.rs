use thiserror::Error;

/// All errors produced by hearken-core.
#[derive(Debug, Error)]
pub enum HearkenError {
    #[error("invalid command pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("speech session has shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, HearkenError>;

/// Rejection returned by [`SpeechEngine::start`](crate::engine::SpeechEngine::start).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// The engine is already capturing. Redundant starts are swallowed.
    #[error("recognition has already started")]
    AlreadyStarted,

    /// Any other refusal (device busy, host policy, ...). Retryable.
    #[error("recognition failed to start: {0}")]
    Failed(String),
}
