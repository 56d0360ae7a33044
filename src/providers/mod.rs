//! Provider implementations and registry
//!
//! One submodule per hosting service. `active_providers` turns the config
//! file's provider sections into ready-to-use clients.

pub mod github;
pub mod gitlab;

pub use github::GitHubHost;
pub use gitlab::GitLabHost;

use tracing::warn;

use crate::config::{Config, ProviderSettings};
use crate::provider::{Provider, ProviderError};

/// Build a client for every provider section present in the configuration.
///
/// A section without a resolvable token is an error: a half-configured
/// provider should fail loudly rather than be skipped.
pub fn active_providers(
    config: &Config,
) -> Result<Vec<(Box<dyn Provider>, ProviderSettings)>, ProviderError> {
    let mut providers: Vec<(Box<dyn Provider>, ProviderSettings)> = Vec::new();

    if let Some(settings) = &config.gitlab {
        let token = require_token(settings, "gitlab", "GITLAB_TOKEN")?;
        let api_url = settings.api_url.as_deref().unwrap_or(gitlab::DEFAULT_API_URL);
        let host = GitLabHost::new(api_url, &token)?;
        providers.push((Box::new(host), settings.clone()));
    }

    if let Some(settings) = &config.github {
        let token = require_token(settings, "github", "GITHUB_TOKEN")?;
        let host = GitHubHost::new(settings.api_url.as_deref(), &token)?;
        providers.push((Box::new(host), settings.clone()));
    }

    if providers.is_empty() {
        warn!("no providers configured");
    }

    Ok(providers)
}

fn require_token(
    settings: &ProviderSettings,
    provider: &str,
    env_var: &str,
) -> Result<String, ProviderError> {
    settings
        .token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ProviderError::MissingToken {
            provider: provider.to_string(),
            env_var: env_var.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_token(token: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            api_url: None,
            backups_to_keep: 0,
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_no_sections_yields_no_providers() {
        let config = Config::default();
        let providers = active_providers(&config).unwrap();
        assert!(providers.is_empty());
    }

    #[test]
    fn test_section_without_token_is_an_error() {
        let config = Config {
            gitlab: Some(settings_with_token(None)),
            ..Config::default()
        };

        let err = active_providers(&config).unwrap_err();
        assert!(matches!(err, ProviderError::MissingToken { .. }));
    }

    #[tokio::test]
    async fn test_configured_providers_are_built_in_order() {
        let config = Config {
            gitlab: Some(settings_with_token(Some("glpat-x"))),
            github: Some(settings_with_token(Some("ghp_y"))),
            ..Config::default()
        };

        let providers = active_providers(&config).unwrap();
        let names: Vec<_> = providers
            .iter()
            .map(|(provider, _)| provider.name())
            .collect();

        assert_eq!(names, vec!["gitlab", "github"]);
    }
}
