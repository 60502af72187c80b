use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::MODIFY_SCOPE;
use crate::error::{GmailError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub sort: SortConfig,
    #[serde(default)]
    pub spam: SpamConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_client_secret_file")]
    pub client_secret_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            client_secret_file: default_client_secret_file(),
            token_file: default_token_file(),
            scopes: default_scopes(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl GmailConfig {
    /// Add `scope` to the pre-authorised set unless it is already there
    pub fn require_scope(&mut self, scope: &str) {
        if !self.scopes.iter().any(|s| s == scope) {
            self.scopes.push(scope.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Labels created by `labels ensure`
    #[serde(default = "default_labels")]
    pub defaults: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            defaults: default_labels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
        }
    }
}

fn default_client_secret_file() -> PathBuf {
    PathBuf::from("secrets/oauth_client.json")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("secrets/token.json")
}

fn default_scopes() -> Vec<String> {
    vec![MODIFY_SCOPE.to_string()]
}

fn default_max_concurrent() -> usize {
    10
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("config/rules.yaml")
}

fn default_labels() -> Vec<String> {
    [
        "Newsletters",
        "Receipts",
        "Travel",
        "Personal",
        "Work",
        "Finance",
        "Promotions",
        "Notifications",
        "Family",
        "Urgent",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_limit() -> usize {
    100
}

fn default_dry_run() -> bool {
    true
}

/// Split a comma-separated list, trimming whitespace and surrounding quotes
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply `GMAIL_CLIENT_SECRET_FILE`, `GMAIL_TOKEN_FILE`, `GMAIL_SCOPES` and
    /// `DEFAULT_LABELS` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`Config::apply_env_overrides`] with an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GMAIL_CLIENT_SECRET_FILE").filter(|v| !v.trim().is_empty()) {
            self.gmail.client_secret_file = PathBuf::from(path.trim());
        }
        if let Some(path) = lookup("GMAIL_TOKEN_FILE").filter(|v| !v.trim().is_empty()) {
            self.gmail.token_file = PathBuf::from(path.trim());
        }
        if let Some(raw) = lookup("GMAIL_SCOPES") {
            let scopes = parse_list(&raw);
            if !scopes.is_empty() {
                self.gmail.scopes = scopes;
            }
        }
        if let Some(raw) = lookup("DEFAULT_LABELS") {
            let labels = parse_list(&raw);
            if !labels.is_empty() {
                self.labels.defaults = labels;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.gmail.scopes.is_empty() {
            return Err(GmailError::ConfigError(
                "gmail.scopes must list at least one scope".to_string(),
            ));
        }

        // Stay well under Gmail's per-user rate limits
        if self.gmail.max_concurrent_requests == 0 {
            return Err(GmailError::ConfigError(
                "gmail.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_concurrent_requests > 50 {
            return Err(GmailError::ConfigError(
                "gmail.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }

        if self.labels.defaults.iter().any(|l| l.trim().is_empty()) {
            return Err(GmailError::ConfigError(
                "labels.defaults cannot contain empty strings".to_string(),
            ));
        }

        if self.sort.limit == 0 {
            return Err(GmailError::ConfigError(
                "sort.limit must be greater than 0".to_string(),
            ));
        }
        if self.spam.limit == 0 {
            return Err(GmailError::ConfigError(
                "spam.limit must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
