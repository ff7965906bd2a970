//! `StubEngine`: a scripted backend with no audio.
//!
//! A [`StubController`] drives every engine its factory creates: it "says"
//! sentences (word-by-word interim results, then a final), ends capture
//! silently, reports permission errors and injects start failures. Speech is
//! ignored while the engine is not capturing, and a non-continuous engine
//! ends capture after each sentence, as browser recognizers do.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{EngineErrorKind, EngineFactory, EngineSink, RecognitionResult, ResultEvent, SpeechEngine};
use crate::error::StartError;

#[derive(Debug, Default)]
struct StubState {
    sink: Option<EngineSink>,
    lang: String,
    continuous: bool,
    interim_results: bool,
    supports_continuous: bool,
    capturing: bool,
    fail_next_start: Option<StartError>,
    engines_created: usize,
    starts: usize,
    stops: usize,
    aborts: usize,
}

/// How [`StubController::say_with`] phrases its results.
#[derive(Debug, Clone, Copy, Default)]
pub struct SayOptions {
    /// Emit only the first word, as a single interim result.
    pub only_first_result: bool,
    /// Imitate mobile recognizers: interim results arrive flagged final with
    /// zero confidence, and the real final is delivered twice.
    pub mobile: bool,
}

/// Test/demo handle shared by every engine created from [`StubController::factory`].
#[derive(Debug, Clone)]
pub struct StubController {
    state: Arc<Mutex<StubState>>,
}

impl Default for StubController {
    fn default() -> Self {
        Self::new()
    }
}

impl StubController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState {
                supports_continuous: true,
                ..StubState::default()
            })),
        }
    }

    /// A controller whose engines report no continuous-listening support.
    pub fn without_continuous() -> Self {
        let controller = Self::new();
        controller.state.lock().supports_continuous = false;
        controller
    }

    /// Factory that hands out engines bound to this controller.
    pub fn factory(&self) -> Arc<dyn EngineFactory> {
        let controller = self.clone();
        Arc::new(move || -> Option<Box<dyn SpeechEngine>> {
            Some(Box::new(controller.engine()))
        })
    }

    /// A fresh engine bound to this controller.
    pub fn engine(&self) -> StubEngine {
        self.state.lock().engines_created += 1;
        StubEngine {
            state: Arc::clone(&self.state),
        }
    }

    /// Speak a sentence. Returns `false` if the engine was not capturing.
    pub fn say(&self, sentence: &str) -> bool {
        self.say_with(sentence, SayOptions::default())
    }

    pub fn say_with(&self, sentence: &str, options: SayOptions) -> bool {
        let mut state = self.state.lock();
        if !state.capturing {
            debug!(sentence, "stub engine not capturing, speech ignored");
            return false;
        }
        let Some(sink) = state.sink.clone() else {
            return true;
        };

        let words: Vec<&str> = sentence.split_whitespace().collect();
        if options.only_first_result {
            let first = words.first().copied().unwrap_or_default();
            sink.result(single(RecognitionResult::interim(first)));
        } else {
            if state.interim_results {
                for end in 1..=words.len() {
                    let text = words[..end].join(" ");
                    let result = if options.mobile {
                        RecognitionResult::single(text, true, 0.0)
                    } else {
                        RecognitionResult::interim(text)
                    };
                    sink.result(single(result));
                }
            }
            sink.result(single(RecognitionResult::final_result(sentence)));
            if options.mobile {
                sink.result(single(RecognitionResult::final_result(sentence)));
            }
        }

        if !state.continuous {
            state.capturing = false;
            sink.disconnected();
        }
        true
    }

    /// Deliver one interim hypothesis and keep capturing.
    pub fn say_interim(&self, text: &str) -> bool {
        self.emit(single(RecognitionResult::interim(text)))
    }

    /// Deliver a raw result event, regardless of wording helpers.
    pub fn emit(&self, event: ResultEvent) -> bool {
        let state = self.state.lock();
        if !state.capturing {
            return false;
        }
        if let Some(sink) = &state.sink {
            sink.result(event);
        }
        true
    }

    /// End capture without being asked (silence timeout).
    pub fn end_silently(&self) {
        let mut state = self.state.lock();
        if state.capturing {
            state.capturing = false;
            if let Some(sink) = &state.sink {
                sink.disconnected();
            }
        }
    }

    /// Report a permission refusal.
    pub fn deny_permission(&self) {
        self.report_error(EngineErrorKind::NotAllowed);
    }

    pub fn report_error(&self, kind: EngineErrorKind) {
        if let Some(sink) = &self.state.lock().sink {
            sink.error(kind);
        }
    }

    /// Make the next `start()` fail with `error`.
    pub fn fail_next_start(&self, error: StartError) {
        self.state.lock().fail_next_start = Some(error);
    }

    /// The sink currently attached, if any.
    pub fn sink(&self) -> Option<EngineSink> {
        self.state.lock().sink.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capturing
    }

    pub fn lang(&self) -> String {
        self.state.lock().lang.clone()
    }

    pub fn continuous(&self) -> bool {
        self.state.lock().continuous
    }

    pub fn engines_created(&self) -> usize {
        self.state.lock().engines_created
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().starts
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stops
    }

    pub fn abort_calls(&self) -> usize {
        self.state.lock().aborts
    }
}

fn single(result: RecognitionResult) -> ResultEvent {
    ResultEvent::new(vec![result])
}

/// Engine half of the stub; see [`StubController`].
#[derive(Debug)]
pub struct StubEngine {
    state: Arc<Mutex<StubState>>,
}

impl StubEngine {
    fn end_capture(&mut self) {
        let mut state = self.state.lock();
        if state.capturing {
            state.capturing = false;
            if let Some(sink) = &state.sink {
                sink.disconnected();
            }
        }
    }
}

impl SpeechEngine for StubEngine {
    fn lang(&self) -> String {
        self.state.lock().lang.clone()
    }

    fn set_lang(&mut self, lang: &str) {
        self.state.lock().lang = lang.to_string();
    }

    fn continuous(&self) -> bool {
        self.state.lock().continuous
    }

    fn set_continuous(&mut self, continuous: bool) {
        self.state.lock().continuous = continuous;
    }

    fn set_interim_results(&mut self, interim_results: bool) {
        self.state.lock().interim_results = interim_results;
    }

    fn supports_continuous(&self) -> bool {
        self.state.lock().supports_continuous
    }

    fn attach(&mut self, sink: EngineSink) {
        self.state.lock().sink = Some(sink);
    }

    fn detach(&mut self) {
        self.state.lock().sink = None;
    }

    fn start(&mut self) -> Result<(), StartError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_start.take() {
            return Err(error);
        }
        if state.capturing {
            return Err(StartError::AlreadyStarted);
        }
        state.capturing = true;
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().stops += 1;
        self.end_capture();
    }

    fn abort(&mut self) {
        self.state.lock().aborts += 1;
        self.end_capture();
    }
}
