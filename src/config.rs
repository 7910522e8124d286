//! Configuration management for autocommit
//!
//! Stores settings in ~/.config/autocommit/config.json

use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Policy ceilings for the agent loop and the inspection tools.
///
/// These bound token cost per round-trip, not correctness: the model can
/// always issue a follow-up call with a narrower range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Tool-call rounds before the model is forced to answer.
    pub step_ceiling: usize,
    /// Directory depth rendered in the repository layout.
    pub tree_depth: usize,
    /// Files rendered in the repository layout before truncation.
    pub tree_max_files: usize,
    /// Largest file `read_file` serves without an explicit line range.
    pub read_max_bytes: u64,
    /// Lines returned per `read_file` call.
    pub read_max_lines: usize,
    /// Lines returned per `get_file_outline` call.
    pub outline_max_lines: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_ceiling: 8,
            tree_depth: 4,
            tree_max_files: 200,
            read_max_bytes: 262_144,
            read_max_lines: 200,
            outline_max_lines: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider when the CLI flag is absent.
    pub provider: Option<String>,
    /// Model override applied to whichever provider runs.
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Base URL of the local Ollama daemon.
    pub ollama_host: Option<String>,
    pub limits: Limits,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autocommit"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir =
            Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;

        Ok(())
    }

    /// Resolve the credential for a provider.
    ///
    /// The environment variable takes precedence over the config file; the
    /// local provider has no credential.
    pub fn api_key_for(&self, kind: ProviderKind) -> Option<String> {
        if let Some(env) = kind.key_env() {
            if let Ok(key) = std::env::var(env) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
        match kind {
            ProviderKind::Gemini => self.gemini_api_key.clone(),
            ProviderKind::OpenAi => self.openai_api_key.clone(),
            ProviderKind::Anthropic => self.anthropic_api_key.clone(),
            ProviderKind::Ollama => None,
        }
    }

    /// Get the config file location for display
    pub fn location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/autocommit/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_no_keys() {
        let config = Config::default();
        assert!(config.gemini_api_key.is_none());
        assert!(config.openai_api_key.is_none());
        assert!(config.anthropic_api_key.is_none());
        assert!(config.provider.is_none());
    }

    #[test]
    fn limits_have_sane_defaults() {
        let limits = Limits::default();
        assert!(limits.step_ceiling > 0);
        assert!(limits.read_max_lines > 0);
        assert!(limits.tree_max_files > 0);
    }

    #[test]
    fn limits_deserialize_with_partial_fields() {
        let parsed: Limits = serde_json::from_str(r#"{"step_ceiling": 3}"#).unwrap();
        assert_eq!(parsed.step_ceiling, 3);
        assert_eq!(parsed.read_max_lines, Limits::default().read_max_lines);
    }
}
