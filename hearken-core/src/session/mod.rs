//! `SpeechSession`: the shared speech capture session.
//!
//! ## Lifecycle
//!
//! ```text
//!            start_listening()             stop/abort_listening()
//!   Idle ───────────────────────► Listening ─────────────────────► StoppingPendingIdle
//!    ▲                              │  ▲                                   │
//!    │                              │  └── auto-restart (continuous) ◄─────┤ disconnected
//!    │        "not-allowed"         │                                      │
//!    ├──────────────────────────────┘                                      │
//!    └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One actor task owns the engine and every piece of session state. Public
//! calls and engine notifications are messages on a single queue, handled
//! strictly in order. `start_listening`, `stop_listening`, `abort_listening`
//! and `set_engine` resolve when the actor has settled them; the snapshot
//! queries never wait.
//!
//! Subscribers implement [`SessionListener`] and are called on the actor task
//! in registration order.

mod actor;
mod results;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::engine::{EngineFactory, EngineNotification};
use crate::error::{HearkenError, Result};

use actor::SessionActor;

/// What the host can offer, recomputed whenever the engine is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub speech_recognition: bool,
    pub continuous_listening: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    StoppingPendingIdle,
}

/// Point-in-time view of the session, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Last value broadcast through `on_listening_changed`.
    pub listening: bool,
    pub microphone_available: bool,
    pub capabilities: Capabilities,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            listening: false,
            microphone_available: true,
            capabilities: Capabilities::default(),
        }
    }
}

/// Options for [`SpeechSession::start_listening`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ListeningOptions {
    /// Keep capturing across utterances. `None` means `false`.
    pub continuous: Option<bool>,
    /// Language tag. `None` keeps the engine's current language.
    pub language: Option<String>,
}

impl ListeningOptions {
    pub fn continuous() -> Self {
        Self {
            continuous: Some(true),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub(crate) fn is_continuous(&self) -> bool {
        self.continuous.unwrap_or(false)
    }
}

/// Session notifications. Every method defaults to a no-op.
pub trait SessionListener: Send + Sync + 'static {
    fn on_listening_changed(&self, _listening: bool) {}
    fn on_transcript_changed(&self, _interim_transcript: &str, _final_transcript: &str) {}
    /// A discontinuous capture is about to begin.
    fn on_clear_transcript(&self) {}
    fn on_mic_availability_changed(&self, _available: bool) {}
    fn on_capability_changed(&self, _capabilities: Capabilities) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

/// Keeps a listener registered. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    tx: mpsc::WeakUnboundedSender<SessionMsg>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(SessionMsg::Unsubscribe(self.id));
        }
    }
}

pub(crate) enum SessionMsg {
    Engine {
        generation: u64,
        notification: EngineNotification,
    },
    Subscribe {
        id: SubscriberId,
        listener: Arc<dyn SessionListener>,
    },
    Unsubscribe(SubscriberId),
    Start {
        options: ListeningOptions,
        done: oneshot::Sender<()>,
    },
    Stop {
        done: oneshot::Sender<()>,
    },
    Abort {
        done: oneshot::Sender<()>,
    },
    ResetTranscript,
    SetEngine {
        factory: Option<Arc<dyn EngineFactory>>,
        done: oneshot::Sender<()>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

struct SessionShared {
    tx: mpsc::UnboundedSender<SessionMsg>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    next_subscriber: AtomicU64,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SpeechSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SpeechSession {
    /// Create a session and spawn its actor on the current tokio runtime.
    ///
    /// The first engine comes from `default_factory`, which is also used by
    /// `set_engine(None)`. Without a factory the session reports no speech
    /// recognition support and every operation is a no-op.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn spawn(config: SessionConfig, default_factory: Option<Arc<dyn EngineFactory>>) -> Self {
        Self::spawn_with_clock(config, default_factory, Arc::new(SystemClock))
    }

    /// [`SpeechSession::spawn`] with an explicit time source for final-result
    /// coalescing.
    pub fn spawn_with_clock(
        mut config: SessionConfig,
        default_factory: Option<Arc<dyn EngineFactory>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        config.normalize();
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));

        let actor = SessionActor::new(
            config,
            clock,
            tx.downgrade(),
            default_factory,
            Arc::clone(&snapshot),
        );
        tokio::spawn(actor.run(rx));

        Self {
            shared: Arc::new(SessionShared {
                tx,
                snapshot,
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. It receives notifications until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> Subscription {
        let id = SubscriberId(self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed));
        // A closed session simply never calls the listener.
        let _ = self.send(SessionMsg::Subscribe { id, listener });
        Subscription {
            id,
            tx: self.shared.tx.downgrade(),
        }
    }

    /// Begin capturing.
    ///
    /// A no-op without a usable engine. If the requested configuration
    /// differs from a capture in progress, that capture is stopped first and
    /// the new one begins once it has ended.
    ///
    /// # Errors
    /// `HearkenError::SessionClosed` if the actor has exited.
    pub async fn start_listening(&self, options: ListeningOptions) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::Start { options, done })?;
        rx.await.map_err(|_| HearkenError::SessionClosed)
    }

    /// Finish capturing, keeping results the engine flushes on the way out.
    /// Resolves once the engine has disconnected.
    pub async fn stop_listening(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::Stop { done })?;
        rx.await.map_err(|_| HearkenError::SessionClosed)
    }

    /// End capture immediately, discarding pending results.
    pub async fn abort_listening(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::Abort { done })?;
        rx.await.map_err(|_| HearkenError::SessionClosed)
    }

    /// Drop in-flight engine results. A continuous capture restarts by
    /// itself; subscriber transcripts are cleared by the subscribers.
    pub fn reset_transcript(&self) -> Result<()> {
        self.send(SessionMsg::ResetTranscript)
    }

    /// Replace the engine. `None` reinstalls one from the default factory.
    ///
    /// Once this resolves, no notification from the replaced engine reaches
    /// subscribers.
    pub async fn set_engine(&self, factory: Option<Arc<dyn EngineFactory>>) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::SetEngine { factory, done })?;
        rx.await.map_err(|_| HearkenError::SessionClosed)
    }

    /// Resolves once every message queued before this call, engine
    /// notifications included, has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::Flush { done })?;
        rx.await.map_err(|_| HearkenError::SessionClosed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.shared.snapshot.read()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.snapshot.read().capabilities
    }

    pub fn is_listening(&self) -> bool {
        self.shared.snapshot.read().listening
    }

    pub fn is_microphone_available(&self) -> bool {
        self.shared.snapshot.read().microphone_available
    }

    fn send(&self, msg: SessionMsg) -> Result<()> {
        self.shared
            .tx
            .send(msg)
            .map_err(|_| HearkenError::SessionClosed)
    }
}
