//! Voice command registration and dispatch.
//!
//! A [`Command`] resolves its phrase(s) once at construction: pattern
//! phrases are compiled into anchored regexes, fuzzy phrases are reduced to
//! their plain words. [`dispatch`] then runs every command against one
//! transcript update and invokes callbacks for each qualifying match.
//!
//! ## Tie-break rules
//!
//! - Commands run in registration order; phrases in list order.
//! - Nothing short-circuits: every match fires its callback.
//! - Fuzzy commands with `best_match_only` and two or more qualifying phrases
//!   fire once, for the phrase with the highest similarity (earliest phrase
//!   wins ties).

pub mod pattern;
pub mod similarity;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use pattern::Matcher;

pub use pattern::compile;
pub use similarity::{normalize_phrase, similarity};

/// Default similarity a fuzzy phrase must reach.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// A single phrase: literal pattern syntax or a regex used as written.
#[derive(Debug, Clone)]
pub enum Phrase {
    Literal(String),
    Regex(Regex),
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phrase::Literal(text) => f.write_str(text),
            Phrase::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// What a command listens for.
#[derive(Debug, Clone)]
pub enum PhraseSpec {
    Literal(String),
    AnyOf(Vec<String>),
    Pattern(Regex),
}

impl PhraseSpec {
    fn into_phrases(self) -> Vec<Phrase> {
        match self {
            PhraseSpec::Literal(text) => vec![Phrase::Literal(text)],
            PhraseSpec::AnyOf(texts) => texts.into_iter().map(Phrase::Literal).collect(),
            PhraseSpec::Pattern(regex) => vec![Phrase::Regex(regex)],
        }
    }
}

impl From<&str> for PhraseSpec {
    fn from(text: &str) -> Self {
        PhraseSpec::Literal(text.to_string())
    }
}

impl From<String> for PhraseSpec {
    fn from(text: String) -> Self {
        PhraseSpec::Literal(text)
    }
}

impl From<Vec<String>> for PhraseSpec {
    fn from(texts: Vec<String>) -> Self {
        PhraseSpec::AnyOf(texts)
    }
}

impl From<Vec<&str>> for PhraseSpec {
    fn from(texts: Vec<&str>) -> Self {
        PhraseSpec::AnyOf(texts.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PhraseSpec {
    fn from(texts: [&str; N]) -> Self {
        PhraseSpec::AnyOf(texts.iter().map(|t| t.to_string()).collect())
    }
}

impl From<Regex> for PhraseSpec {
    fn from(regex: Regex) -> Self {
        PhraseSpec::Pattern(regex)
    }
}

/// Matching behaviour for a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandOptions {
    /// Match against interim text while no final text is available.
    pub match_interim: bool,
    /// Accept utterances by similarity instead of pattern equality.
    pub is_fuzzy_match: bool,
    /// Minimum similarity in [0, 1] for fuzzy acceptance. Default: 0.8.
    pub fuzzy_matching_threshold: f64,
    /// For fuzzy commands with several phrases, fire only for the best one.
    pub best_match_only: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            match_interim: false,
            is_fuzzy_match: false,
            fuzzy_matching_threshold: DEFAULT_FUZZY_THRESHOLD,
            best_match_only: false,
        }
    }
}

impl CommandOptions {
    pub fn fuzzy(threshold: f64) -> Self {
        Self {
            is_fuzzy_match: true,
            fuzzy_matching_threshold: threshold,
            ..Self::default()
        }
    }
}

/// Outcome of one phrase matching one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandMatch {
    /// Pattern match with captured parameters in pattern order.
    Pattern { parameters: Vec<String> },
    /// Fuzzy match with the normalized phrase and its similarity score.
    Fuzzy {
        normalized_phrase: String,
        similarity: f64,
    },
}

impl CommandMatch {
    fn similarity(&self) -> f64 {
        match self {
            CommandMatch::Fuzzy { similarity, .. } => *similarity,
            CommandMatch::Pattern { .. } => 1.0,
        }
    }
}

/// Extra information handed to a command callback.
pub struct MatchContext<'a> {
    /// The individual phrase that matched.
    pub matched_phrase: &'a Phrase,
    /// The trimmed utterance that was matched.
    pub input: &'a str,
    reset: &'a (dyn Fn() + 'a),
}

impl MatchContext<'_> {
    /// Clear the owning subscriber's transcript.
    pub fn reset_transcript(&self) {
        (self.reset)();
    }
}

pub type CommandCallback = Arc<dyn Fn(&CommandMatch, &MatchContext<'_>) + Send + Sync>;

#[derive(Debug, Clone)]
enum PhraseMatcher {
    Pattern(Matcher),
    Fuzzy(String),
}

#[derive(Debug, Clone)]
struct CompiledPhrase {
    phrase: Phrase,
    matcher: PhraseMatcher,
}

/// A registered voice command.
#[derive(Clone)]
pub struct Command {
    phrases: Vec<CompiledPhrase>,
    options: CommandOptions,
    callback: CommandCallback,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("phrases", &self.phrases)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Command {
    /// Build an exact-pattern command with default options.
    pub fn new<P, F>(phrase: P, callback: F) -> Result<Self>
    where
        P: Into<PhraseSpec>,
        F: Fn(&CommandMatch, &MatchContext<'_>) + Send + Sync + 'static,
    {
        Self::with_options(phrase, CommandOptions::default(), callback)
    }

    /// Build a command, resolving every phrase up front.
    ///
    /// The fuzzy threshold is clamped to [0, 1].
    pub fn with_options<P, F>(phrase: P, mut options: CommandOptions, callback: F) -> Result<Self>
    where
        P: Into<PhraseSpec>,
        F: Fn(&CommandMatch, &MatchContext<'_>) + Send + Sync + 'static,
    {
        options.fuzzy_matching_threshold = if options.fuzzy_matching_threshold.is_nan() {
            DEFAULT_FUZZY_THRESHOLD
        } else {
            options.fuzzy_matching_threshold.clamp(0.0, 1.0)
        };

        let phrases = phrase
            .into()
            .into_phrases()
            .into_iter()
            .map(|phrase| {
                let matcher = if options.is_fuzzy_match {
                    PhraseMatcher::Fuzzy(normalize_phrase(&phrase.to_string()))
                } else {
                    PhraseMatcher::Pattern(compile(&phrase)?)
                };
                Ok(CompiledPhrase { phrase, matcher })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            phrases,
            options,
            callback: Arc::new(callback),
        })
    }

    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// The phrases this command listens for, in list order.
    pub fn phrases(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.iter().map(|p| &p.phrase)
    }

    fn matches(&self, input: &str) -> Vec<(&Phrase, CommandMatch)> {
        self.phrases
            .iter()
            .filter_map(|compiled| {
                let result = match &compiled.matcher {
                    PhraseMatcher::Pattern(matcher) => matcher
                        .captures(input)
                        .map(|parameters| CommandMatch::Pattern { parameters }),
                    PhraseMatcher::Fuzzy(normalized) => {
                        let score = similarity(normalized, input);
                        (score >= self.options.fuzzy_matching_threshold).then(|| {
                            CommandMatch::Fuzzy {
                                normalized_phrase: normalized.clone(),
                                similarity: score,
                            }
                        })
                    }
                };
                result.map(|r| (&compiled.phrase, r))
            })
            .collect()
    }
}

/// Run every command against one transcript update.
///
/// Final text always wins; interim text is only considered by commands with
/// `match_interim` while `final_transcript` is empty. `reset` is exposed to
/// callbacks through [`MatchContext::reset_transcript`].
pub fn dispatch(
    commands: &[Command],
    interim_transcript: &str,
    final_transcript: &str,
    reset: &dyn Fn(),
) {
    for command in commands {
        let input = if final_transcript.is_empty() && command.options.match_interim {
            interim_transcript.trim()
        } else {
            final_transcript.trim()
        };

        let mut matched = command.matches(input);
        if matched.is_empty() {
            continue;
        }

        if command.options.is_fuzzy_match && command.options.best_match_only && matched.len() >= 2
        {
            matched.sort_by(|a, b| b.1.similarity().total_cmp(&a.1.similarity()));
            matched.truncate(1);
        }

        for (phrase, result) in &matched {
            debug!(phrase = %phrase, input, "command matched");
            let context = MatchContext {
                matched_phrase: phrase,
                input,
                reset,
            };
            (command.callback)(result, &context);
        }
    }
}
