//! Session configuration.
//!
//! Deserialised from the host's settings file (camelCase JSON, every field
//! optional) and normalised before use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound for the final-result coalescing window.
pub const MAX_COALESCE_WINDOW_MS: u64 = 5_000;

/// Coalescing window applied when a mobile platform does not set one.
pub const MOBILE_COALESCE_WINDOW_MS: u64 = 250;

/// Host platform family. Mobile recognizers flag some interim hypotheses as
/// final with zero confidence and repeat finals in quick bursts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SessionConfig {
    pub platform: Platform,
    /// Finals are held for this many milliseconds; a final arriving while
    /// one is held replaces it, and only the last is delivered. `None` picks the platform
    /// default (0 on desktop, 250 on mobile); `Some(0)` disables coalescing.
    pub final_coalesce_window_ms: Option<u64>,
    /// Language tag applied to every engine the session creates.
    pub default_language: Option<String>,
    /// Ask engines for interim hypotheses. Default: true.
    pub interim_results: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            final_coalesce_window_ms: None,
            default_language: None,
            interim_results: true,
        }
    }
}

impl SessionConfig {
    pub fn for_platform(platform: Platform) -> Self {
        let mut config = Self {
            platform,
            ..Self::default()
        };
        config.normalize();
        config
    }

    pub fn normalize(&mut self) {
        let window = self.final_coalesce_window_ms.unwrap_or(match self.platform {
            Platform::Desktop => 0,
            Platform::Mobile => MOBILE_COALESCE_WINDOW_MS,
        });
        self.final_coalesce_window_ms = Some(window.min(MAX_COALESCE_WINDOW_MS));
        self.default_language = self
            .default_language
            .as_ref()
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty());
    }

    /// Zero-confidence "final" results count as interim.
    pub fn treats_unconfident_finals_as_interim(&self) -> bool {
        self.platform == Platform::Mobile
    }

    pub fn final_coalesce_window(&self) -> Duration {
        Duration::from_millis(
            self.final_coalesce_window_ms
                .unwrap_or(0)
                .min(MAX_COALESCE_WINDOW_MS),
        )
    }
}
