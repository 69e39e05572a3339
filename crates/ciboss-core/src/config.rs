//! Configuration parsing for the CI agent.
//!
//! Files use a key=value format (`#` comments, optional quotes).
//! Precedence: CLI flags > environment > `--config` file > `.ciboss/config`
//! > user config dir (`~/.config/ciboss/config`) > defaults.
//!
//! CLI flags are applied by the binary after `Config::load` returns.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Workspace-local config file, relative to the working directory.
pub const WORKSPACE_CONFIG_PATH: &str = ".ciboss/config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Agent configuration: collaborator endpoints, credentials, and loop limits.
///
/// Credentials are optional. A missing credential puts the matching
/// collaborator into degraded mode instead of failing the run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Code host
    pub github_api_base: String,
    pub github_token: Option<String>,

    // Issue tracker
    pub linear_api_url: String,
    pub linear_api_key: Option<String>,
    pub linear_team_id: Option<String>,
    pub linear_label_ids: Vec<String>,
    /// Workflow state an issue moves to once its tests pass again.
    pub linear_done_state: String,

    // Summarizer
    pub llm_api_base: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,

    // Test execution
    pub test_command: String,
    pub test_working_dir: Option<PathBuf>,
    pub test_timeout_sec: u64,

    // Limits
    pub http_timeout_sec: u64,
    /// Maximum decision steps per run.
    pub max_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_api_base: "https://api.github.com".to_string(),
            github_token: None,
            linear_api_url: "https://api.linear.app/graphql".to_string(),
            linear_api_key: None,
            linear_team_id: None,
            linear_label_ids: Vec::new(),
            linear_done_state: "Done".to_string(),
            llm_api_base: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            llm_model: "gpt-4o".to_string(),
            test_command: "npx playwright test".to_string(),
            test_working_dir: None,
            test_timeout_sec: 1800,
            http_timeout_sec: 30,
            max_iterations: 4,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Build the effective config from every layer below the CLI.
    ///
    /// Missing implicit files are skipped; an explicit `--config` path that
    /// cannot be read is an error.
    pub fn load(explicit: Option<&Path>, workspace_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(user_path) = user_config_path() {
            if user_path.is_file() {
                config.load_file(&user_path)?;
            }
        }

        let workspace_path = workspace_root.join(WORKSPACE_CONFIG_PATH);
        if workspace_path.is_file() {
            config.load_file(&workspace_path)?;
        }

        if let Some(path) = explicit {
            config.load_file(path)?;
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn optional(value: &str) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "github_api_base" => self.github_api_base = value.trim_end_matches('/').to_string(),
            "github_token" => self.github_token = Self::optional(value),
            "linear_api_url" => self.linear_api_url = value.to_string(),
            "linear_api_key" => self.linear_api_key = Self::optional(value),
            "linear_team_id" => self.linear_team_id = Self::optional(value),
            "linear_label_ids" => {
                self.linear_label_ids = value.split_whitespace().map(String::from).collect();
            }
            "linear_done_state" => self.linear_done_state = value.to_string(),
            "llm_api_base" => self.llm_api_base = value.trim_end_matches('/').to_string(),
            "llm_api_key" => self.llm_api_key = Self::optional(value),
            "llm_model" => self.llm_model = value.to_string(),
            "test_command" => {
                if value.is_empty() {
                    return Err(ConfigError::InvalidLine(
                        "test_command must not be empty".to_string(),
                    ));
                }
                self.test_command = value.to_string();
            }
            "test_working_dir" => {
                self.test_working_dir = Self::optional(value).map(PathBuf::from);
            }
            "test_timeout_sec" => self.test_timeout_sec = Self::parse_int(key, value)?,
            "http_timeout_sec" => self.http_timeout_sec = Self::parse_int(key, value)?,
            "max_iterations" => {
                let max: u32 = Self::parse_int(key, value)?;
                if max == 0 {
                    return Err(ConfigError::InvalidLine(
                        "max_iterations must be at least 1".to_string(),
                    ));
                }
                self.max_iterations = max;
            }
            _ => {
                // Warn but don't fail for unknown keys.
                eprintln!("Warning: unknown config key: {key}");
            }
        }
        Ok(())
    }

    /// Overlay values from environment variables.
    ///
    /// `lookup` is injected so tests don't depend on the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GITHUB_API_BASE") {
            self.github_api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github_token = Some(v);
        }
        if let Some(v) = get("LINEAR_API_URL") {
            self.linear_api_url = v;
        }
        if let Some(v) = get("LINEAR_API_KEY") {
            self.linear_api_key = Some(v);
        }
        if let Some(v) = get("LINEAR_TEAM_ID") {
            self.linear_team_id = Some(v);
        }

        let env_labels: Vec<String> = ["LINEAR_LABEL_ID_BUG", "LINEAR_LABEL_ID_TEST_FAILURE"]
            .iter()
            .filter_map(|key| get(key))
            .collect();
        if !env_labels.is_empty() {
            self.linear_label_ids = env_labels;
        }

        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm_api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = get("CIBOSS_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = get("PLAYWRIGHT_COMMAND") {
            self.test_command = v;
        }
        if let Some(v) = get("PLAYWRIGHT_WORKING_DIR") {
            self.test_working_dir = Some(PathBuf::from(v));
        }
    }

    /// Copy of the config with secrets masked, safe to log.
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| "***".to_string());
        Self {
            github_token: mask(&self.github_token),
            linear_api_key: mask(&self.linear_api_key),
            llm_api_key: mask(&self.llm_api_key),
            ..self.clone()
        }
    }

    /// Resolve a relative test working directory against a workspace root.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if let Some(ref dir) = self.test_working_dir {
            if dir.is_relative() {
                self.test_working_dir = Some(workspace_root.join(dir));
            }
        }
    }
}

/// `~/.config/ciboss/config` (platform equivalent), if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ciboss").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.test_command, "npx playwright test");
        assert_eq!(config.test_timeout_sec, 1800);
        assert_eq!(config.http_timeout_sec, 30);
        assert_eq!(config.llm_model, "gpt-4o");
        assert_eq!(config.linear_done_state, "Done");
        assert!(config.github_token.is_none());
        assert!(config.linear_label_ids.is_empty());
    }

    #[test]
    fn parse_simple_config() {
        let mut config = Config::default();
        let content = r#"
# CI settings
test_command="npm run e2e"
test_timeout_sec=600
linear_team_id='team-1'
linear_label_ids=lbl-bug lbl-e2e
max_iterations=6
"#;
        config.parse_content(content).unwrap();
        assert_eq!(config.test_command, "npm run e2e");
        assert_eq!(config.test_timeout_sec, 600);
        assert_eq!(config.linear_team_id.as_deref(), Some("team-1"));
        assert_eq!(config.linear_label_ids, vec!["lbl-bug", "lbl-e2e"]);
        assert_eq!(config.max_iterations, 6);
    }

    #[test]
    fn parse_rejects_line_without_equals() {
        let mut config = Config::default();
        let result = config.parse_content("test_command npm test");
        assert!(matches!(result, Err(ConfigError::InvalidLine(_))));
    }

    #[test]
    fn parse_rejects_bad_integer() {
        let mut config = Config::default();
        let result = config.parse_content("test_timeout_sec=soon");
        assert!(matches!(result, Err(ConfigError::InvalidInt { .. })));
    }

    #[test]
    fn parse_rejects_zero_iterations() {
        let mut config = Config::default();
        assert!(config.parse_content("max_iterations=0").is_err());
    }

    #[test]
    fn empty_secret_clears_value() {
        let mut config = Config::default();
        config.parse_content("github_token=abc").unwrap();
        assert_eq!(config.github_token.as_deref(), Some("abc"));
        config.parse_content("github_token=").unwrap();
        assert!(config.github_token.is_none());
    }

    #[test]
    fn unquote_removes_quotes() {
        assert_eq!(Config::unquote("\"hello\""), "hello");
        assert_eq!(Config::unquote("'world'"), "world");
        assert_eq!(Config::unquote("noquotes"), "noquotes");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .parse_content("test_command=make e2e\nllm_model=gpt-4o-mini")
            .unwrap();
        config.apply_env(env_from(&[
            ("PLAYWRIGHT_COMMAND", "npx playwright test --project=chromium"),
            ("GITHUB_TOKEN", "ghp_test"),
            ("LINEAR_LABEL_ID_TEST_FAILURE", "lbl-tf"),
            ("LINEAR_LABEL_ID_BUG", "lbl-bug"),
        ]));
        assert_eq!(
            config.test_command,
            "npx playwright test --project=chromium"
        );
        assert_eq!(config.llm_model, "gpt-4o-mini");
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert_eq!(config.linear_label_ids, vec!["lbl-bug", "lbl-tf"]);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env_from(&[("GITHUB_TOKEN", "  "), ("OPENAI_API_KEY", "")]));
        assert!(config.github_token.is_none());
        assert!(config.llm_api_key.is_none());
    }

    #[test]
    fn redacted_masks_secrets_only() {
        let mut config = Config::default();
        config.github_token = Some("ghp_secret".to_string());
        config.llm_api_key = Some("sk-secret".to_string());
        let redacted = config.redacted();
        assert_eq!(redacted.github_token.as_deref(), Some("***"));
        assert_eq!(redacted.llm_api_key.as_deref(), Some("***"));
        assert!(redacted.linear_api_key.is_none());
        assert_eq!(redacted.test_command, config.test_command);
    }

    #[test]
    fn from_file_reads_workspace_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "test_working_dir=e2e\nhttp_timeout_sec=10\n").unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.http_timeout_sec, 10);

        config.resolve_paths(dir.path());
        assert_eq!(config.test_working_dir, Some(dir.path().join("e2e")));
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_file(&dir.path().join("absent"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
