//! Voice commands built from settings.
//!
//! Every match is turned into a [`MatchReport`] and handed to the host's
//! reporter, which prints it as one JSON line.

use std::sync::Arc;

use anyhow::{Context, Result};
use hearken_core::commands::DEFAULT_FUZZY_THRESHOLD;
use hearken_core::{Command, CommandMatch, CommandOptions, PhraseSpec};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::settings::CommandSettings;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub label: String,
    pub phrase: String,
    pub input: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

pub type Reporter = Arc<dyn Fn(MatchReport) + Send + Sync>;

/// Build every configured command. Regex entries yield one command per
/// pattern; literal entries yield one command for all their phrases.
pub fn build_commands(entries: &[CommandSettings], reporter: &Reporter) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for entry in entries {
        let phrases = entry.all_phrases();
        if phrases.is_empty() {
            warn!(label = %entry.label(), "command without phrases skipped");
            continue;
        }

        let specs: Vec<PhraseSpec> = if entry.regex {
            phrases
                .iter()
                .map(|source| {
                    Regex::new(source)
                        .map(PhraseSpec::Pattern)
                        .with_context(|| format!("invalid regex for command {:?}", entry.label()))
                })
                .collect::<Result<_>>()?
        } else if phrases.len() == 1 {
            vec![PhraseSpec::Literal(phrases[0].clone())]
        } else {
            vec![PhraseSpec::AnyOf(phrases)]
        };

        for spec in specs {
            commands.push(build_command(entry, spec, reporter)?);
        }
    }
    info!(count = commands.len(), "voice commands registered");
    Ok(commands)
}

fn build_command(entry: &CommandSettings, spec: PhraseSpec, reporter: &Reporter) -> Result<Command> {
    let mut options = if entry.fuzzy {
        CommandOptions::fuzzy(entry.threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD))
    } else {
        CommandOptions::default()
    };
    options.match_interim = entry.match_interim;
    options.best_match_only = entry.best_match_only;

    let label = entry.label();
    let reset = entry.reset_transcript;
    let reporter = Arc::clone(reporter);
    Command::with_options(spec, options, move |result, ctx| {
        let (parameters, similarity) = match result {
            CommandMatch::Pattern { parameters } => (parameters.clone(), None),
            CommandMatch::Fuzzy { similarity, .. } => (Vec::new(), Some(*similarity)),
        };
        reporter(MatchReport {
            label: label.clone(),
            phrase: ctx.matched_phrase.to_string(),
            input: ctx.input.to_string(),
            parameters,
            similarity,
        });
        if reset {
            ctx.reset_transcript();
        }
    })
    .with_context(|| format!("failed to build command {:?}", entry.label()))
}
