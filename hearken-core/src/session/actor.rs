//! The session actor: sole owner of the engine and the session state.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::results::{ResultAssembler, TranscriptPass};
use super::{
    Capabilities, ListeningOptions, SessionListener, SessionMsg, SessionSnapshot, SessionState,
    SubscriberId,
};
use crate::clock::Clock;
use crate::config::{Platform, SessionConfig};
use crate::engine::{
    EngineErrorKind, EngineFactory, EngineNotification, EngineSink, ResultEvent, SpeechEngine,
};
use crate::error::StartError;

/// Why the current capture is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Stop, keep flushed finals, stay idle.
    Stop,
    /// Abort, discard results, stay idle.
    Abort,
    /// Abort to drop in-flight results; restart if continuous.
    Reset,
}

impl Disconnect {
    fn pauses(self) -> bool {
        matches!(self, Disconnect::Stop | Disconnect::Abort)
    }
}

/// A start that waits for the in-flight disconnect to settle. Later starts
/// coalesce into it; the last options win.
struct DeferredStart {
    options: ListeningOptions,
    waiters: Vec<oneshot::Sender<()>>,
}

pub(super) struct SessionActor {
    config: SessionConfig,
    tx: mpsc::WeakUnboundedSender<SessionMsg>,
    default_factory: Option<Arc<dyn EngineFactory>>,

    engine: Option<Box<dyn SpeechEngine>>,
    /// Generation of the only sink whose notifications are honoured.
    generation: u64,
    /// `false` after a permission refusal until the next start re-attaches.
    attached: bool,

    state: SessionState,
    listening: bool,
    microphone_available: bool,
    capabilities: Capabilities,
    pending: Option<Disconnect>,
    stop_waiters: Vec<oneshot::Sender<()>>,
    deferred: Option<DeferredStart>,

    assembler: ResultAssembler,
    listeners: BTreeMap<SubscriberId, Arc<dyn SessionListener>>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    /// Callers to release once the snapshot reflects the current message.
    settled: Vec<oneshot::Sender<()>>,
}

impl SessionActor {
    pub(super) fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        tx: mpsc::WeakUnboundedSender<SessionMsg>,
        default_factory: Option<Arc<dyn EngineFactory>>,
        snapshot: Arc<RwLock<SessionSnapshot>>,
    ) -> Self {
        let assembler = ResultAssembler::new(&config, clock);
        let mut actor = Self {
            config,
            tx,
            default_factory,
            engine: None,
            generation: 0,
            attached: false,
            state: SessionState::Idle,
            listening: false,
            microphone_available: true,
            capabilities: Capabilities::default(),
            pending: None,
            stop_waiters: Vec::new(),
            deferred: None,
            assembler,
            listeners: BTreeMap::new(),
            snapshot,
            settled: Vec::new(),
        };
        let engine = actor.default_factory.as_ref().and_then(|f| f.create());
        actor.install(engine, true);
        actor.publish();
        actor
    }

    pub(super) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        info!(
            speech_recognition = self.capabilities.speech_recognition,
            "speech session started"
        );
        loop {
            let msg = match self.assembler.time_until_release() {
                Some(wait) => tokio::select! {
                    msg = rx.recv() => msg,
                    () = tokio::time::sleep(wait) => {
                        self.release_due_final();
                        self.publish();
                        continue;
                    }
                },
                None => rx.recv().await,
            };
            let Some(msg) = msg else {
                break;
            };
            self.release_due_final();
            self.handle(msg);
            self.publish();
            for done in self.settled.drain(..) {
                let _ = done.send(());
            }
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.detach();
            if self.state != SessionState::Idle {
                engine.abort();
            }
        }
        info!("speech session closed");
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Engine {
                generation,
                notification,
            } => {
                if generation != self.generation || !self.attached {
                    debug!(generation, current = self.generation, "dropped stale engine notification");
                    return;
                }
                match notification {
                    EngineNotification::Result(event) => self.on_result(&event),
                    EngineNotification::Disconnected => self.on_disconnected(),
                    EngineNotification::Error(kind) => self.on_error(kind),
                }
            }
            SessionMsg::Subscribe { id, listener } => {
                debug!(?id, "subscriber added");
                self.listeners.insert(id, listener);
            }
            SessionMsg::Unsubscribe(id) => {
                debug!(?id, "subscriber removed");
                self.listeners.remove(&id);
            }
            SessionMsg::Start { options, done } => self.handle_start(options, done),
            SessionMsg::Stop { done } => self.handle_disconnect_request(Disconnect::Stop, done),
            SessionMsg::Abort { done } => self.handle_disconnect_request(Disconnect::Abort, done),
            SessionMsg::ResetTranscript => {
                if self.state == SessionState::Listening {
                    self.begin_disconnect(Disconnect::Reset);
                }
            }
            SessionMsg::SetEngine { factory, done } => {
                self.replace_engine(factory);
                self.settled.push(done);
            }
            SessionMsg::Flush { done } => self.settled.push(done),
        }
    }

    // ── Public operations ─────────────────────────────────────────────────

    fn handle_start(&mut self, options: ListeningOptions, done: oneshot::Sender<()>) {
        if self.engine.is_none() {
            debug!("start ignored, no speech engine");
            self.settled.push(done);
            return;
        }

        if let Some(deferred) = self.deferred.as_mut() {
            deferred.options = options;
            deferred.waiters.push(done);
            return;
        }

        match self.state {
            SessionState::StoppingPendingIdle => {
                debug!("start deferred until the engine disconnects");
                self.deferred = Some(DeferredStart {
                    options,
                    waiters: vec![done],
                });
            }
            SessionState::Listening if self.needs_reconfigure(&options) => {
                info!(
                    continuous = options.is_continuous(),
                    language = options.language.as_deref().unwrap_or_default(),
                    "restarting capture with new configuration"
                );
                self.deferred = Some(DeferredStart {
                    options,
                    waiters: vec![done],
                });
                self.begin_disconnect(Disconnect::Stop);
            }
            _ => {
                self.start_now(options);
                self.settled.push(done);
            }
        }
    }

    fn handle_disconnect_request(&mut self, kind: Disconnect, done: oneshot::Sender<()>) {
        match self.state {
            SessionState::Idle => self.settled.push(done),
            SessionState::Listening => {
                self.begin_disconnect(kind);
                self.stop_waiters.push(done);
            }
            SessionState::StoppingPendingIdle => {
                self.cancel_deferred();
                match self.pending {
                    Some(Disconnect::Stop) if kind == Disconnect::Abort => {
                        self.pending = Some(Disconnect::Abort);
                        self.assembler.reset();
                        if let Some(engine) = self.engine.as_mut() {
                            engine.abort();
                        }
                    }
                    Some(Disconnect::Reset) | None => {
                        self.pending = Some(kind);
                        self.set_listening(false);
                    }
                    _ => {}
                }
                self.stop_waiters.push(done);
            }
        }
    }

    fn replace_engine(&mut self, factory: Option<Arc<dyn EngineFactory>>) {
        if let Some(mut old) = self.engine.take() {
            old.detach();
            if self.state != SessionState::Idle {
                old.abort();
            }
        }
        self.force_idle();

        let from_default = factory.is_none();
        let factory = factory.or_else(|| self.default_factory.clone());
        let engine = factory.and_then(|f| f.create());
        self.install(engine, from_default);
        info!(
            generation = self.generation,
            speech_recognition = self.capabilities.speech_recognition,
            continuous_listening = self.capabilities.continuous_listening,
            "speech engine replaced"
        );

        self.set_microphone_available(true);
        let capabilities = self.capabilities;
        for listener in self.listeners.values() {
            listener.on_capability_changed(capabilities);
        }
    }

    // ── Engine notifications ──────────────────────────────────────────────

    fn on_result(&mut self, event: &ResultEvent) {
        let accepted = match self.state {
            SessionState::Listening => true,
            SessionState::StoppingPendingIdle => self.pending == Some(Disconnect::Stop),
            SessionState::Idle => false,
        };
        if !accepted {
            debug!(state = ?self.state, pending = ?self.pending, "dropped engine result");
            return;
        }

        if let Some(pass) = self.assembler.assemble(event) {
            self.broadcast_pass(&pass);
        }
    }

    fn release_due_final(&mut self) {
        if let Some(pass) = self.assembler.release_due() {
            self.broadcast_pass(&pass);
        }
    }

    fn broadcast_pass(&self, pass: &TranscriptPass) {
        debug!(
            interim = %pass.interim_transcript,
            final_transcript = %pass.final_transcript,
            "transcript pass"
        );
        for listener in self.listeners.values() {
            listener.on_transcript_changed(&pass.interim_transcript, &pass.final_transcript);
        }
    }

    fn on_disconnected(&mut self) {
        if self.state == SessionState::Idle {
            debug!("spurious disconnect while idle");
            return;
        }

        if let Some(pass) = self.assembler.release() {
            self.broadcast_pass(&pass);
        }
        let pending = self.pending.take();
        self.state = SessionState::Idle;
        self.settle_stop_waiters();

        if !pending.is_some_and(Disconnect::pauses) {
            let continuous = self.engine.as_ref().is_some_and(|e| e.continuous());
            if !continuous {
                self.set_listening(false);
            } else if self.deferred.is_none() {
                info!("engine ended continuous capture, restarting");
                self.start_now(ListeningOptions::continuous());
                return;
            }
        }

        if let Some(deferred) = self.deferred.take() {
            self.start_now(deferred.options);
            self.settled.extend(deferred.waiters);
        }
    }

    fn on_error(&mut self, kind: EngineErrorKind) {
        if kind != EngineErrorKind::NotAllowed {
            warn!(?kind, "speech engine error");
            return;
        }

        warn!("microphone permission denied, engine notifications detached");
        self.set_microphone_available(false);

        self.generation += 1;
        self.attached = false;
        if let Some(engine) = self.engine.as_mut() {
            engine.detach();
            if self.state != SessionState::Idle {
                engine.stop();
            }
        }
        // No disconnect can arrive once detached.
        self.force_idle();
    }

    // ── Transitions ───────────────────────────────────────────────────────

    fn start_now(&mut self, options: ListeningOptions) {
        let continuous = options.is_continuous();
        let generation = self.generation;
        let reattach = !self.attached;
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if engine.continuous() != continuous {
            engine.set_continuous(continuous);
        }
        if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty()) {
            if engine.lang() != language {
                engine.set_lang(language);
            }
        }
        if self.state == SessionState::Listening {
            return;
        }

        if !continuous {
            for listener in self.listeners.values() {
                listener.on_clear_transcript();
            }
        }

        if reattach {
            if let Some(tx) = self.tx.upgrade() {
                engine.attach(EngineSink::new(generation, tx.downgrade()));
                self.attached = true;
            }
        }

        let lang = engine.lang();
        match engine.start() {
            Ok(()) => {}
            Err(StartError::AlreadyStarted) => {
                debug!("engine already capturing, treating start as redundant");
            }
            Err(StartError::Failed(reason)) => {
                warn!(%reason, "speech engine failed to start");
                self.set_microphone_available(false);
                if self.listening {
                    self.set_listening(false);
                }
                return;
            }
        }

        info!(continuous, lang = %lang, "listening");
        self.state = SessionState::Listening;
        self.assembler.reset();
        self.set_listening(true);
        self.set_microphone_available(true);
    }

    fn begin_disconnect(&mut self, kind: Disconnect) {
        debug!(?kind, "disconnecting engine");
        self.pending = Some(kind);
        if kind != Disconnect::Stop {
            self.assembler.reset();
        }
        if let Some(engine) = self.engine.as_mut() {
            match kind {
                Disconnect::Stop => engine.stop(),
                Disconnect::Abort | Disconnect::Reset => engine.abort(),
            }
        }
        self.state = SessionState::StoppingPendingIdle;
        if kind.pauses() {
            self.set_listening(false);
        }
    }

    /// Go idle without waiting for the engine, releasing everyone waiting on
    /// the capture.
    fn force_idle(&mut self) {
        self.state = SessionState::Idle;
        self.pending = None;
        self.assembler.reset();
        self.settle_stop_waiters();
        self.cancel_deferred();
        if self.listening {
            self.set_listening(false);
        }
    }

    fn cancel_deferred(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            debug!(waiters = deferred.waiters.len(), "deferred start cancelled");
            self.settled.extend(deferred.waiters);
        }
    }

    fn settle_stop_waiters(&mut self) {
        self.settled.append(&mut self.stop_waiters);
    }

    /// Configure and attach `engine`. Default-factory engines on mobile never
    /// report continuous listening; explicitly supplied engines speak for
    /// themselves.
    fn install(&mut self, engine: Option<Box<dyn SpeechEngine>>, from_default: bool) {
        self.generation += 1;
        self.assembler.reset();
        self.engine = engine.map(|mut engine| {
            engine.set_continuous(false);
            engine.set_interim_results(self.config.interim_results);
            if let Some(language) = &self.config.default_language {
                engine.set_lang(language);
            }
            engine.attach(EngineSink::new(self.generation, self.tx.clone()));
            engine
        });
        self.attached = self.engine.is_some();
        self.capabilities = Capabilities {
            speech_recognition: self.engine.is_some(),
            continuous_listening: !(from_default && self.config.platform == Platform::Mobile)
                && self.engine.as_ref().is_some_and(|e| e.supports_continuous()),
        };
    }

    fn needs_reconfigure(&self, options: &ListeningOptions) -> bool {
        let Some(engine) = self.engine.as_ref() else {
            return false;
        };
        let language_changed = options
            .language
            .as_deref()
            .is_some_and(|l| !l.is_empty() && l != engine.lang());
        engine.continuous() != options.is_continuous() || language_changed
    }

    // ── Broadcasts ────────────────────────────────────────────────────────

    fn set_listening(&mut self, listening: bool) {
        self.listening = listening;
        for listener in self.listeners.values() {
            listener.on_listening_changed(listening);
        }
    }

    fn set_microphone_available(&mut self, available: bool) {
        if self.microphone_available == available {
            return;
        }
        self.microphone_available = available;
        for listener in self.listeners.values() {
            listener.on_mic_availability_changed(available);
        }
    }

    fn publish(&self) {
        *self.snapshot.write() = SessionSnapshot {
            state: self.state,
            listening: self.listening,
            microphone_available: self.microphone_available,
            capabilities: self.capabilities,
        };
    }
}
