use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Main configuration structure for RepoVault.
///
/// Access tokens and retention overrides are resolved from the environment
/// exactly once, while loading; nothing below the configuration layer reads
/// environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root directory where backup archives are written
    pub destination: String,

    /// Number of concurrent backup workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Repository names to skip (glob-style patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// GitLab provider settings; presence of the section enables the provider
    #[serde(default)]
    pub gitlab: Option<ProviderSettings>,

    /// GitHub provider settings; presence of the section enables the provider
    #[serde(default)]
    pub github: Option<ProviderSettings>,
}

/// Per-provider settings.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProviderSettings {
    /// API base URL override for self-hosted instances
    pub api_url: Option<String>,

    /// How many archives to keep per repository; 0 keeps all
    #[serde(default)]
    pub backups_to_keep: u32,

    /// Access token, resolved from the provider's environment variable at
    /// load time; never written back to the config file
    #[serde(skip)]
    pub token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_workers() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: "${HOME}/backups".to_string(),
            workers: default_workers(),
            exclude_patterns: Vec::new(),
            logging: LoggingConfig::default(),
            gitlab: None,
            github: None,
        }
    }
}

/// Parse a retention count leniently.
///
/// An absent or non-numeric value yields 0, the "keep all" sentinel; a
/// misconfigured retention must never make a backup run fail.
pub fn parse_retention(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

impl ProviderSettings {
    /// Pull the token and retention override for `prefix` (e.g. "GITLAB",
    /// read from `GITLAB_TOKEN` / `GITLAB_BACKUPS`) out of the environment.
    fn resolve_env(&mut self, prefix: &str) {
        if let Ok(token) = env::var(format!("{prefix}_TOKEN")) {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        if let Ok(raw) = env::var(format!("{prefix}_BACKUPS")) {
            self.backups_to_keep = parse_retention(Some(&raw));
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
            config.save(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);

            config.expand_paths()?;
            config.resolve_env();
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;
        config.resolve_env();

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repovault").join("config.yml"))
    }

    /// Expand environment variables and `~` in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.destination = shellexpand::full(&self.destination)
            .context("Failed to expand destination path")?
            .into_owned();

        Ok(())
    }

    /// Resolve tokens and retention overrides from the environment.
    fn resolve_env(&mut self) {
        if let Some(settings) = self.gitlab.as_mut() {
            settings.resolve_env("GITLAB");
        }
        if let Some(settings) = self.github.as_mut() {
            settings.resolve_env("GITHUB");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.destination, "${HOME}/backups");
        assert_eq!(config.workers, 5);
        assert!(config.exclude_patterns.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(config.gitlab.is_none());
        assert!(config.github.is_none());
    }

    #[test]
    fn test_parse_retention_lenient() {
        assert_eq!(parse_retention(Some("3")), 3);
        assert_eq!(parse_retention(Some(" 10 ")), 10);

        // Absent, empty or non-numeric values keep everything
        assert_eq!(parse_retention(None), 0);
        assert_eq!(parse_retention(Some("")), 0);
        assert_eq!(parse_retention(Some("many")), 0);
        assert_eq!(parse_retention(Some("-1")), 0);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
destination: "/var/backups/git"
workers: 3
exclude_patterns:
  - "archived-*"
gitlab:
  api_url: "https://code.corp.example/api/v4"
  backups_to_keep: 7
github:
  backups_to_keep: 2
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.destination, "/var/backups/git");
        assert_eq!(config.workers, 3);
        assert_eq!(config.exclude_patterns, vec!["archived-*".to_string()]);

        let gitlab = config.gitlab.expect("gitlab section");
        assert_eq!(
            gitlab.api_url.as_deref(),
            Some("https://code.corp.example/api/v4")
        );
        assert_eq!(gitlab.backups_to_keep, 7);
        assert!(gitlab.token.is_none());

        assert_eq!(config.github.expect("github section").backups_to_keep, 2);
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("TEST_REPOVAULT_HOME", "/test/home");

        let mut config = Config::default();
        config.destination = "${TEST_REPOVAULT_HOME}/backups".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.destination, "/test/home/backups");

        env::remove_var("TEST_REPOVAULT_HOME");
    }

    #[test]
    #[serial]
    fn test_load_resolves_tokens_and_retention_from_env() {
        env::set_var("GITLAB_TOKEN", "glpat-secret");
        env::set_var("GITLAB_BACKUPS", "4");

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(&config_path, "destination: \"/tmp/backups\"\ngitlab: {}\n")
            .expect("Failed to write test config");

        let config = Config::load(&config_path).expect("Failed to load config");
        let gitlab = config.gitlab.expect("gitlab section");

        assert_eq!(gitlab.token.as_deref(), Some("glpat-secret"));
        assert_eq!(gitlab.backups_to_keep, 4);

        env::remove_var("GITLAB_TOKEN");
        env::remove_var("GITLAB_BACKUPS");
    }

    #[test]
    #[serial]
    fn test_invalid_retention_env_keeps_all() {
        env::set_var("GITLAB_TOKEN", "glpat-secret");
        env::set_var("GITLAB_BACKUPS", "plenty");

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(&config_path, "destination: \"/tmp/backups\"\ngitlab: {}\n")
            .expect("Failed to write test config");

        let config = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(config.gitlab.expect("gitlab section").backups_to_keep, 0);

        env::remove_var("GITLAB_TOKEN");
        env::remove_var("GITLAB_BACKUPS");
    }

    #[test]
    #[serial]
    fn test_config_save_and_load() {
        env::remove_var("GITLAB_TOKEN");
        env::remove_var("GITLAB_BACKUPS");

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.destination = "/custom/path".to_string();
        config.workers = 8;
        config.gitlab = Some(ProviderSettings {
            api_url: None,
            backups_to_keep: 3,
            token: Some("never-persisted".to_string()),
        });

        config.save(&config_path).expect("Failed to save config");

        // Tokens must not leak into the file
        let written = std::fs::read_to_string(&config_path).expect("Failed to read config back");
        assert!(!written.contains("never-persisted"));

        let loaded = Config::load(&config_path).expect("Failed to load config");
        assert_eq!(loaded.destination, "/custom/path");
        assert_eq!(loaded.workers, 8);
        assert_eq!(loaded.gitlab.expect("gitlab section").backups_to_keep, 3);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("repovault"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }
}
