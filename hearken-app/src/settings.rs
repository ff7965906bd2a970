//! Host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use hearken_core::{ListeningOptions, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub session: SessionConfig,
    pub continuous: bool,
    pub language: Option<String>,
    pub clear_transcript_on_listen: bool,
    pub commands: Vec<CommandSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            continuous: true,
            language: None,
            clear_transcript_on_listen: true,
            commands: Vec::new(),
        }
    }
}

/// One voice command as written in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CommandSettings {
    /// Name printed with every match. Defaults to the first phrase.
    pub label: Option<String>,
    pub phrase: Option<String>,
    pub phrases: Vec<String>,
    /// Treat each phrase as a regular expression.
    pub regex: bool,
    pub fuzzy: bool,
    pub threshold: Option<f64>,
    pub match_interim: bool,
    pub best_match_only: bool,
    /// Clear the transcript after this command fires.
    pub reset_transcript: bool,
}

impl CommandSettings {
    /// `phrase` followed by `phrases`.
    pub fn all_phrases(&self) -> Vec<String> {
        self.phrase
            .iter()
            .chain(self.phrases.iter())
            .cloned()
            .collect()
    }

    pub fn label(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.all_phrases().into_iter().next())
            .unwrap_or_default()
    }

    fn normalize(&mut self) {
        self.label = trimmed(self.label.as_deref());
        self.phrase = trimmed(self.phrase.as_deref());
        self.phrases = self
            .phrases
            .iter()
            .filter_map(|p| trimmed(Some(p)))
            .collect();
        self.threshold = self
            .threshold
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(0.0, 1.0));
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.session.normalize();
        self.language = trimmed(self.language.as_deref());
        for command in &mut self.commands {
            command.normalize();
        }
        self.commands.retain(|c| !c.all_phrases().is_empty());
    }

    pub fn listening_options(&self) -> ListeningOptions {
        ListeningOptions {
            continuous: Some(self.continuous),
            language: self.language.clone(),
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Hearken")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("hearken")
            .join("settings.json")
    }
}

/// Read settings, falling back to defaults when the file is missing or
/// unreadable.
/// Missing files yield defaults. Invalid files are logged and replaced by
/// defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|err| {
            warn!(path = ?path, error = %err, "invalid settings file, using defaults");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
