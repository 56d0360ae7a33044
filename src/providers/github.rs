//! GitHub provider
//!
//! Wraps octocrab: the identity lookup hits the authenticated-user endpoint
//! and enumeration pages through the user's owned repositories.

use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::{debug, info, warn};

use crate::provider::{Provider, ProviderError, UserId};
use crate::repository::{normalize_owner, Repository};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_DOMAIN: &str = "github.com";

/// GitHub host client.
#[derive(Debug)]
pub struct GitHubHost {
    client: Octocrab,
    api_url: String,
    domain: String,
}

impl GitHubHost {
    /// Create a client authenticated with a personal access token.
    ///
    /// `api_url` overrides the public endpoint for GitHub Enterprise
    /// installations.
    pub fn new(api_url: Option<&str>, token: &str) -> Result<Self, ProviderError> {
        let transport_err = |source: anyhow::Error| ProviderError::Transport {
            provider: "github".to_string(),
            source,
        };

        let mut builder = Octocrab::builder().personal_token(token.trim_end_matches('\n').to_string());
        if let Some(api_url) = api_url {
            builder = builder
                .base_uri(api_url)
                .map_err(|e| transport_err(anyhow::Error::new(e)))?;
        }
        let client = builder
            .build()
            .map_err(|e| transport_err(anyhow::Error::new(e)))?;

        let api_url = api_url.unwrap_or(DEFAULT_API_URL).trim_end_matches('/');

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            domain: domain_of(api_url),
        })
    }

    /// Map one octocrab repository into the canonical record.
    ///
    /// Repositories without an HTTPS clone endpoint are skipped; the API
    /// does not report one for some mirrored or disabled repositories.
    fn to_record(&self, repo: octocrab::models::Repository) -> Option<Repository> {
        let Some(https_url) = repo.clone_url.as_ref().map(|url| url.to_string()) else {
            warn!(repo = %repo.name, "skipping repository without an HTTPS clone URL");
            return None;
        };

        let name = repo.name.clone();
        let owner = repo
            .owner
            .as_ref()
            .map(|owner| normalize_owner(&owner.login))
            .or_else(|| {
                repo.full_name
                    .as_deref()
                    .and_then(|full| full.split_once('/'))
                    .map(|(owner, _)| normalize_owner(owner))
            })?;
        let name_with_owner = repo
            .full_name
            .clone()
            .unwrap_or_else(|| format!("{owner}/{name}"));

        Some(Repository {
            name,
            owner,
            name_with_owner,
            https_url,
            ssh_url: repo.ssh_url.clone().unwrap_or_default(),
            domain: self.domain.clone(),
            url_with_token: None,
        })
    }
}

fn domain_of(api_url: &str) -> String {
    // api.github.com backs repositories hosted on github.com
    if api_url == DEFAULT_API_URL {
        return DEFAULT_DOMAIN.to_string();
    }
    reqwest::Url::parse(api_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string())
}

#[async_trait]
impl Provider for GitHubHost {
    fn name(&self) -> &str {
        "github"
    }

    fn api_base_url(&self) -> &str {
        &self.api_url
    }

    async fn authenticate(&self) -> Result<UserId, ProviderError> {
        let user = self.client.current().user().await.map_err(|e| {
            ProviderError::Authentication {
                provider: "github".to_string(),
                source: anyhow::Error::new(e),
            }
        })?;

        debug!(login = %user.login, "authenticated against GitHub");
        Ok(UserId::Login(user.login))
    }

    async fn enumerate_repositories(
        &self,
        user: &UserId,
    ) -> Result<Vec<Repository>, ProviderError> {
        info!(user = %user, "listing GitHub repositories");

        let mut records = Vec::new();
        let mut page = 1u8;

        loop {
            let page_repos = self
                .client
                .current()
                .list_repos_for_authenticated_user()
                .type_("owner")
                .per_page(100)
                .page(page)
                .send()
                .await
                .map_err(|e| ProviderError::Enumeration {
                    provider: "github".to_string(),
                    source: anyhow::Error::new(e).context(format!("fetching page {page}")),
                })?;

            let items = page_repos.items;
            if items.is_empty() {
                break;
            }

            records.extend(items.into_iter().filter_map(|repo| self.to_record(repo)));

            // The pagination cursor is a u8
            if page == u8::MAX {
                warn!("reached maximum pagination limit ({} pages)", u8::MAX);
                break;
            }
            page += 1;
        }

        info!("found {} GitHub repositories", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host() -> GitHubHost {
        GitHubHost::new(None, "ghp_testtoken").unwrap()
    }

    fn model_repo(value: serde_json::Value) -> octocrab::models::Repository {
        serde_json::from_value(value).expect("repository fixture should deserialize")
    }

    #[test]
    fn test_to_record_maps_fields() {
        let repo = model_repo(json!({
            "id": 1,
            "name": "widget",
            "full_name": "acme/widget",
            "clone_url": "https://github.com/acme/widget.git",
            "ssh_url": "git@github.com:acme/widget.git",
        }));

        let record = host().to_record(repo).unwrap();

        assert_eq!(record.name, "widget");
        assert_eq!(record.owner, "acme");
        assert_eq!(record.name_with_owner, "acme/widget");
        assert_eq!(record.https_url, "https://github.com/acme/widget.git");
        assert_eq!(record.ssh_url, "git@github.com:acme/widget.git");
        assert_eq!(record.domain, "github.com");
        assert!(record.url_with_token.is_none());
    }

    #[test]
    fn test_to_record_skips_missing_clone_url() {
        let repo = model_repo(json!({
            "id": 2,
            "name": "ghost",
            "full_name": "acme/ghost",
        }));

        assert!(host().to_record(repo).is_none());
    }

    #[test]
    fn test_domain_for_enterprise_api() {
        assert_eq!(domain_of("https://api.github.com"), "github.com");
        assert_eq!(
            domain_of("https://github.corp.example/api/v3"),
            "github.corp.example"
        );
    }
}
