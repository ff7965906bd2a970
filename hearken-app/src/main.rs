//! `hearken`: a console host for a voice command session.
//!
//! Reads speech from stdin (or `--script`), runs it through a session backed
//! by the stub engine, and prints every command match as a JSON line on
//! stdout. Logs go to stderr.

mod commands;
mod driver;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hearken_core::engine::stub::StubController;
use hearken_core::{Recognizer, RecognizerOptions, SpeechSession};
use tokio::io::BufReader;
use tracing::info;

use crate::commands::{build_commands, MatchReport, Reporter};
use crate::settings::{default_settings_path, load_settings, save_settings};

#[derive(Debug, Parser)]
#[command(name = "hearken", version, about = "Voice command session driven from text input")]
struct Args {
    /// Settings file. Defaults to the per-user data directory.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Read input lines from this file instead of stdin.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Write the effective settings back to the settings file and exit.
    #[arg(long)]
    write_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hearken=info")),
        )
        .init();

    let args = Args::parse();
    let settings_path = args.settings.unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    info!(
        settings_path = ?settings_path,
        platform = ?settings.session.platform,
        continuous = settings.continuous,
        commands = settings.commands.len(),
        "settings loaded"
    );

    if args.write_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
        info!(settings_path = ?settings_path, "settings written");
        return Ok(());
    }

    // ── Session setup ─────────────────────────────────────────────────────
    let stub = StubController::new();
    let session = SpeechSession::spawn(settings.session.clone(), Some(stub.factory()));

    let reporter: Reporter = Arc::new(|report: MatchReport| match serde_json::to_string(&report) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::warn!(error = %err, "failed to serialize match"),
    });
    let commands = build_commands(&settings.commands, &reporter)?;
    let recognizer = Recognizer::new(
        &session,
        RecognizerOptions {
            transcribing: true,
            clear_transcript_on_listen: settings.clear_transcript_on_listen,
        },
        commands,
    );
    let options = settings.listening_options();

    // ── Input loop ────────────────────────────────────────────────────────
    match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            driver::drive(&session, &stub, &recognizer, &options, BufReader::new(file)).await?;
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            driver::drive(&session, &stub, &recognizer, &options, stdin).await?;
        }
    }

    session.stop_listening().await?;
    info!(transcript = %recognizer.transcript(), "session finished");
    Ok(())
}
