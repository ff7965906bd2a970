//! Turns engine result notifications into the interim and final text of
//! transcript passes.
//!
//! With a non-zero coalescing window, finals are held back and only the last
//! one is released once the window has passed without another final.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::engine::ResultEvent;
use crate::transcript::concat_transcripts;

/// Text produced by one result notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TranscriptPass {
    pub interim_transcript: String,
    pub final_transcript: String,
}

/// A final waiting for its coalescing window to close.
#[derive(Debug)]
struct HeldFinal {
    transcript: String,
    release_at: Instant,
}

pub(crate) struct ResultAssembler {
    window: Duration,
    unconfident_finals_are_interim: bool,
    clock: Arc<dyn Clock>,
    held: Option<HeldFinal>,
    /// Text of the last pass if it carried only final text.
    previous_final_only: Option<String>,
}

impl ResultAssembler {
    pub fn new(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: config.final_coalesce_window(),
            unconfident_finals_are_interim: config.treats_unconfident_finals_as_interim(),
            clock,
            held: None,
            previous_final_only: None,
        }
    }

    /// Forget burst history and drop any held final. Called whenever a new
    /// capture begins or results must be discarded.
    pub fn reset(&mut self) {
        self.held = None;
        self.previous_final_only = None;
    }

    /// Build the pass for `event`, or `None` when nothing should reach
    /// subscribers yet.
    ///
    /// Known limitation: two genuinely identical final-only utterances in a
    /// row are indistinguishable from an engine burst, so the second is
    /// dropped too.
    pub fn assemble(&mut self, event: &ResultEvent) -> Option<TranscriptPass> {
        let start = event
            .result_index
            .unwrap_or_else(|| event.results.len().saturating_sub(1));

        let mut interim = String::new();
        let mut final_ = String::new();
        let mut held_any = false;
        for result in event.results.iter().skip(start) {
            let Some(best) = result.best() else {
                continue;
            };
            let is_final = result.is_final
                && !(self.unconfident_finals_are_interim && best.confidence <= 0.0);
            if !is_final {
                interim = concat_transcripts(&[&interim, &best.transcript]);
            } else if self.window.is_zero() {
                final_ = concat_transcripts(&[&final_, &best.transcript]);
            } else {
                self.hold(&best.transcript);
                held_any = true;
            }
        }

        if held_any && interim.is_empty() {
            return None;
        }
        self.deliver(TranscriptPass {
            interim_transcript: interim,
            final_transcript: final_,
        })
    }

    /// How long until the held final is due, if one is held.
    pub fn time_until_release(&self) -> Option<Duration> {
        let held = self.held.as_ref()?;
        Some(held.release_at.saturating_duration_since(self.clock.now()))
    }

    /// Release the held final if its window has closed.
    pub fn release_due(&mut self) -> Option<TranscriptPass> {
        let due = self
            .held
            .as_ref()
            .is_some_and(|held| self.clock.now() >= held.release_at);
        if due {
            self.release()
        } else {
            None
        }
    }

    /// Release the held final now, whatever the clock says.
    pub fn release(&mut self) -> Option<TranscriptPass> {
        let held = self.held.take()?;
        self.deliver(TranscriptPass {
            interim_transcript: String::new(),
            final_transcript: held.transcript,
        })
    }

    fn hold(&mut self, transcript: &str) {
        let release_at = self.clock.now() + self.window;
        if let Some(previous) = &self.held {
            debug!(replaced = %previous.transcript, "final replaced within coalescing window");
        }
        self.held = Some(HeldFinal {
            transcript: transcript.trim().to_string(),
            release_at,
        });
    }

    fn deliver(&mut self, pass: TranscriptPass) -> Option<TranscriptPass> {
        let final_only = pass.interim_transcript.is_empty() && !pass.final_transcript.is_empty();
        if !final_only {
            self.previous_final_only = None;
            return Some(pass);
        }
        if self.previous_final_only.as_deref() == Some(pass.final_transcript.as_str()) {
            debug!(final_transcript = %pass.final_transcript, "suppressed repeated final-only result");
            return None;
        }
        self.previous_final_only = Some(pass.final_transcript.clone());
        Some(pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Platform;
    use crate::engine::RecognitionResult;

    fn assembler(platform: Platform, window_ms: Option<u64>) -> (ResultAssembler, ManualClock) {
        let clock = ManualClock::new();
        let mut config = SessionConfig {
            platform,
            final_coalesce_window_ms: window_ms,
            ..SessionConfig::default()
        };
        config.normalize();
        (ResultAssembler::new(&config, Arc::new(clock.clone())), clock)
    }

    fn pass(interim: &str, final_: &str) -> Option<TranscriptPass> {
        Some(TranscriptPass {
            interim_transcript: interim.into(),
            final_transcript: final_.into(),
        })
    }

    fn final_only(text: &str) -> ResultEvent {
        ResultEvent::new(vec![RecognitionResult::final_result(text)])
    }

    #[test]
    fn reads_from_result_index() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        let event = ResultEvent {
            results: vec![
                RecognitionResult::final_result("already seen"),
                RecognitionResult::final_result("This is"),
                RecognitionResult::interim("a test"),
            ],
            result_index: Some(1),
        };
        assert_eq!(a.assemble(&event), pass("a test", "This is"));
    }

    #[test]
    fn missing_index_reads_only_the_last_result() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        let event = ResultEvent {
            results: vec![
                RecognitionResult::final_result("old"),
                RecognitionResult::interim("new"),
            ],
            result_index: None,
        };
        assert_eq!(a.assemble(&event), pass("new", ""));
    }

    #[test]
    fn repeated_final_only_update_is_suppressed() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        assert_eq!(a.assemble(&final_only("hello")), pass("", "hello"));
        assert_eq!(a.assemble(&final_only("hello")), None);

        let interim = ResultEvent::new(vec![RecognitionResult::interim("hi")]);
        assert!(a.assemble(&interim).is_some());
        assert_eq!(a.assemble(&final_only("hello")), pass("", "hello"));
    }

    #[test]
    fn distinct_final_only_updates_all_pass() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        assert_eq!(a.assemble(&final_only("turn on")), pass("", "turn on"));
        assert_eq!(a.assemble(&final_only("the lights")), pass("", "the lights"));
        assert_eq!(a.assemble(&final_only("turn on")), pass("", "turn on"));
    }

    #[test]
    fn reset_forgets_previous_final_only_update() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        assert!(a.assemble(&final_only("again")).is_some());
        a.reset();
        assert!(a.assemble(&final_only("again")).is_some());
    }

    #[test]
    fn mobile_treats_unconfident_final_as_interim() {
        let (mut a, _) = assembler(Platform::Mobile, None);
        let event = ResultEvent::new(vec![RecognitionResult::single("hel", true, 0.0)]);
        assert_eq!(a.assemble(&event), pass("hel", ""));

        let (mut desktop, _) = assembler(Platform::Desktop, None);
        assert_eq!(desktop.assemble(&event), pass("", "hel"));
    }

    #[test]
    fn held_final_waits_for_the_window() {
        let (mut a, clock) = assembler(Platform::Mobile, None);
        assert_eq!(a.assemble(&final_only("turn on")), None);
        assert_eq!(a.time_until_release(), Some(Duration::from_millis(250)));
        assert_eq!(a.release_due(), None);

        clock.advance(Duration::from_millis(250));
        assert_eq!(a.time_until_release(), Some(Duration::ZERO));
        assert_eq!(a.release_due(), pass("", "turn on"));
        assert_eq!(a.time_until_release(), None);
    }

    #[test]
    fn final_within_window_replaces_the_held_one() {
        let (mut a, clock) = assembler(Platform::Mobile, None);
        assert_eq!(a.assemble(&final_only("turn on")), None);
        clock.advance(Duration::from_millis(100));
        let interim = ResultEvent::new(vec![RecognitionResult::interim("the")]);
        assert_eq!(a.assemble(&interim), pass("the", ""));
        assert_eq!(a.assemble(&final_only("turn on the lights")), None);

        clock.advance(Duration::from_millis(200));
        assert_eq!(a.release_due(), None);
        clock.advance(Duration::from_millis(50));
        assert_eq!(a.release_due(), pass("", "turn on the lights"));
    }

    #[test]
    fn finals_in_one_event_keep_the_trailing_one() {
        let (mut a, _) = assembler(Platform::Mobile, None);
        let event = ResultEvent::new(vec![
            RecognitionResult::final_result("turn on"),
            RecognitionResult::final_result("turn on the lights"),
        ]);
        assert_eq!(a.assemble(&event), None);
        assert_eq!(a.release(), pass("", "turn on the lights"));
    }

    #[test]
    fn zero_window_appends_every_final() {
        let (mut a, _) = assembler(Platform::Mobile, Some(0));
        let event = ResultEvent::new(vec![
            RecognitionResult::final_result("turn on"),
            RecognitionResult::final_result("the lights"),
        ]);
        assert_eq!(a.assemble(&event), pass("", "turn on the lights"));
        assert_eq!(a.time_until_release(), None);
    }

    #[test]
    fn reset_drops_the_held_final() {
        let (mut a, _) = assembler(Platform::Desktop, Some(100));
        assert_eq!(a.assemble(&final_only("gone")), None);
        a.reset();
        assert_eq!(a.release(), None);
    }

    #[test]
    fn results_without_alternatives_are_skipped() {
        let (mut a, _) = assembler(Platform::Desktop, None);
        let event = ResultEvent::new(vec![
            RecognitionResult {
                alternatives: vec![],
                is_final: true,
            },
            RecognitionResult::interim("  spaced  "),
        ]);
        assert_eq!(a.assemble(&event), pass("spaced", ""));
    }
}
