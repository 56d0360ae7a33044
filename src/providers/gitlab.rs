//! GitLab provider
//!
//! Talks to the GitLab REST API with a private token: one identity lookup
//! against `/user`, then a paginated walk of `/projects?owned=true`.

use anyhow::anyhow;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::provider::{Provider, ProviderError, UserId};
use crate::repository::{normalize_owner, Repository};

use async_trait::async_trait;

/// Public gitlab.com API base.
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

/// Ceiling for any single API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle-connection pool bounds; both calls of a describe pass share the pool.
const MAX_IDLE_CONNS: usize = 10;
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(60);
/// Repositories fetched per enumeration page.
const PAGE_SIZE: u32 = 100;
/// Hard stop for runaway pagination.
const MAX_PAGES: u32 = 255;

const JSON_CONTENT: &str = "application/json; charset=utf-8";

/// GitLab-flavored host client.
#[derive(Debug)]
pub struct GitLabHost {
    api_url: String,
    domain: String,
    token: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GitLabProjectOwner {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path: String,
    path_with_namespace: String,
    http_url_to_repo: String,
    ssh_url_to_repo: String,
    owner: Option<GitLabProjectOwner>,
}

impl GitLabHost {
    /// Create a client for `api_url` (e.g. `https://gitlab.com/api/v4`).
    ///
    /// The underlying transport reuses connections with a bounded idle pool
    /// and disables compression so response sizes stay deterministic.
    pub fn new(api_url: &str, token: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_CONNS)
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .no_gzip()
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: "gitlab".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            domain: domain_of(api_url),
            token: token.to_string(),
            client,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Private-Token", &self.token)
            .header(header::CONTENT_TYPE, JSON_CONTENT)
            .header(header::ACCEPT, JSON_CONTENT)
    }

    fn to_record(&self, project: GitLabProject) -> Repository {
        // Personal projects carry an owner object; group projects do not,
        // so fall back to the namespace prefix of the full path.
        let owner = match &project.owner {
            Some(owner) => normalize_owner(&owner.name),
            None => project
                .path_with_namespace
                .rsplit_once('/')
                .map(|(namespace, _)| normalize_owner(namespace))
                .unwrap_or_default(),
        };

        Repository {
            name: project.path,
            owner,
            name_with_owner: project.path_with_namespace,
            https_url: project.http_url_to_repo,
            ssh_url: project.ssh_url_to_repo,
            domain: self.domain.clone(),
            url_with_token: None,
        }
    }
}

/// Canonical domain for a provider API URL, e.g. "gitlab.com" for
/// "https://gitlab.com/api/v4".
fn domain_of(api_url: &str) -> String {
    Url::parse(api_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "gitlab.com".to_string())
}

#[async_trait]
impl Provider for GitLabHost {
    fn name(&self) -> &str {
        "gitlab"
    }

    fn api_base_url(&self) -> &str {
        &self.api_url
    }

    async fn authenticate(&self) -> Result<UserId, ProviderError> {
        let url = format!("{}/user", self.api_url);
        debug!(url, "looking up authenticated GitLab user");

        let auth_err = |source: anyhow::Error| ProviderError::Authentication {
            provider: "gitlab".to_string(),
            source,
        };

        let response = self
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| auth_err(e.into()))?;

        let user: GitLabUser = response
            .json()
            .await
            .map_err(|e| auth_err(anyhow!(e).context("decoding /user response")))?;

        debug!(user_id = user.id, "authenticated against GitLab");
        Ok(UserId::Numeric(user.id))
    }

    async fn enumerate_repositories(
        &self,
        user: &UserId,
    ) -> Result<Vec<Repository>, ProviderError> {
        info!(user = %user, "listing GitLab repositories");

        let enum_err = |source: anyhow::Error| ProviderError::Enumeration {
            provider: "gitlab".to_string(),
            source,
        };

        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = format!(
                "{}/projects?owned=true&per_page={PAGE_SIZE}&page={page}",
                self.api_url
            );
            debug!(url, page, "fetching projects page");

            let response = self
                .get(&url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|e| enum_err(anyhow!(e).context(format!("fetching page {page}"))))?;

            let projects: Vec<GitLabProject> = response
                .json()
                .await
                .map_err(|e| enum_err(anyhow!(e).context("decoding projects response")))?;

            if projects.is_empty() {
                break;
            }

            records.extend(projects.into_iter().map(|project| self.to_record(project)));

            if page >= MAX_PAGES {
                warn!("reached maximum pagination limit ({MAX_PAGES} pages)");
                break;
            }
            page += 1;
        }

        info!("found {} GitLab repositories", records.len());
        Ok(records)
    }
}
