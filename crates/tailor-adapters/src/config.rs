//! Configuration management for tailor
//!
//! Stores settings in ~/.config/tailor/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

const API_KEY_VARS: [&str; 2] = ["TAILOR_API_KEY", "OPENROUTER_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub model: String,
    /// Deadline for one reasoning-service call, retries included
    pub request_timeout_ms: u64,
    pub max_output_tokens: u32,
    pub classify_temperature: f32,
    pub scoring_temperature: f32,
    pub generation_temperature: f32,
    /// Minimum relevance score (0-100) for a file to be edited
    pub admission_threshold: u8,
    /// Heuristic confidence above which it stands in for a failed service reply
    pub heuristic_fallback_confidence: u8,
    /// Heuristic confidence above which a disagreement is noted in the reasoning
    pub heuristic_disagreement_confidence: u8,
    pub max_candidate_files: usize,
    pub cache_ttl_secs: u64,
    pub recent_changes_in_summary: usize,
    pub change_log_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_ms: 60_000,
            max_output_tokens: 4096,
            classify_temperature: 0.1,
            scoring_temperature: 0.1,
            generation_temperature: 0.2,
            admission_threshold: 70,
            heuristic_fallback_confidence: 60,
            heuristic_disagreement_confidence: 80,
            max_candidate_files: 12,
            cache_ttl_secs: 3600,
            recent_changes_in_summary: 5,
            change_log_retention: 200,
        }
    }
}

impl Config {
    fn sanitize(&mut self) {
        let defaults = Config::default();
        if self.api_url.trim().is_empty() {
            self.api_url = defaults.api_url;
        }
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
        self.request_timeout_ms = self.request_timeout_ms.clamp(1_000, 600_000);
        self.max_output_tokens = self.max_output_tokens.clamp(256, 32_768);
        self.classify_temperature = self.classify_temperature.clamp(0.0, 2.0);
        self.scoring_temperature = self.scoring_temperature.clamp(0.0, 2.0);
        self.generation_temperature = self.generation_temperature.clamp(0.0, 2.0);
        self.admission_threshold = self.admission_threshold.min(100);
        self.heuristic_fallback_confidence = self.heuristic_fallback_confidence.min(100);
        self.heuristic_disagreement_confidence = self.heuristic_disagreement_confidence.min(100);
        self.max_candidate_files = self.max_candidate_files.clamp(1, 64);
        self.cache_ttl_secs = self.cache_ttl_secs.max(1);
        self.recent_changes_in_summary = self.recent_changes_in_summary.clamp(1, 50);
        self.change_log_retention = self.change_log_retention.max(self.recent_changes_in_summary);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tailor"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default, then apply env overrides
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Load config from a specific file. A missing file yields defaults; a
    /// corrupt one is moved aside to `config.json.corrupt`.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Config>(&content) {
                Ok(mut config) => {
                    config.sanitize();
                    return config;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "config file was corrupted; a backup was saved and defaults were loaded"
                    );
                }
            }
        }
        Self::default()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(model) = non_empty_env("TAILOR_MODEL") {
            self.model = model;
        }
        if let Some(url) = non_empty_env("TAILOR_API_URL") {
            self.api_url = url;
        }
    }

    /// API key from the environment; never stored in the config file.
    pub fn api_key(&self) -> Option<String> {
        API_KEY_VARS.iter().find_map(|var| non_empty_env(var))
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/tailor/config.json".to_string())
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_policy_values() {
        let config = Config::default();
        assert_eq!(config.admission_threshold, 70);
        assert_eq!(config.heuristic_fallback_confidence, 60);
        assert_eq!(config.heuristic_disagreement_confidence, 80);
        assert_eq!(config.recent_changes_in_summary, 5);
    }

    #[test]
    fn test_config_partial_file_fills_defaults() {
        let partial = r#"{"admission_threshold": 90, "model": "openai/gpt-4o"}"#;
        let parsed: Config = serde_json::from_str(partial).unwrap();
        assert_eq!(parsed.admission_threshold, 90);
        assert_eq!(parsed.model, "openai/gpt-4o");
        assert_eq!(parsed.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_corrupt_config_is_preserved_and_defaults_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, Config::default());
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("config.json.corrupt")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_sanitize_clamps_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"admission_threshold": 250, "max_candidate_files": 0, "request_timeout_ms": 5}"#,
        )
        .unwrap();
        let loaded = Config::load_from(&path);
        assert_eq!(loaded.admission_threshold, 100);
        assert_eq!(loaded.max_candidate_files, 1);
        assert_eq!(loaded.request_timeout_ms, 1_000);
    }
}
