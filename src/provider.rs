//! Hosting-provider abstraction layer
//!
//! This module defines the capability set every git-hosting service must
//! implement to plug into the backup engine: authenticate, enumerate the
//! user's repositories, and report the API base URL for diagnostics.
//!
//! Authentication and enumeration are split so providers with multi-step
//! auth flows can implement the same two-step contract without reshaping
//! the engine.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::repository::Repository;

/// Identity of the authenticated user, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserId {
    /// Numeric account id (GitLab)
    Numeric(u64),
    /// Account login name (GitHub)
    Login(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{id}"),
            UserId::Login(login) => write!(f, "{login}"),
        }
    }
}

/// Errors that abort a provider's whole batch before any backup starts.
///
/// Per-repository backup failures are not represented here; those flow
/// through the worker pool's result channel instead.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No access token available for the provider
    #[error("no access token configured for {provider} (set {env_var})")]
    MissingToken { provider: String, env_var: String },

    /// The HTTP client could not be constructed
    #[error("{provider} HTTP client setup failed")]
    Transport {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// Identity lookup failed (bad token, transport or decode error)
    #[error("{provider} authentication failed")]
    Authentication {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// Repository enumeration failed (transport or decode error)
    #[error("{provider} repository enumeration failed")]
    Enumeration {
        provider: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Result of a full describe pass over one provider.
#[derive(Debug, Default)]
pub struct DescribeOutput {
    pub repos: Vec<Repository>,
}

/// Capability set a hosting service exposes to the backup engine.
///
/// Implement this trait to add support for a new provider. Implementations
/// hold their own HTTP transport so `describe` reuses connections across the
/// identity and enumeration calls.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider name for display/logging (e.g. "gitlab")
    fn name(&self) -> &str;

    /// API base URL, used by diagnostics and logging only
    fn api_base_url(&self) -> &str;

    /// Look up the authenticated user's identity.
    async fn authenticate(&self) -> Result<UserId, ProviderError>;

    /// Fetch all repositories owned by `user` as canonical records.
    ///
    /// An empty list is a valid outcome, distinct from an enumeration
    /// failure.
    async fn enumerate_repositories(&self, user: &UserId)
        -> Result<Vec<Repository>, ProviderError>;

    /// Authenticate, then enumerate.
    async fn describe(&self) -> Result<DescribeOutput, ProviderError> {
        let user = self.authenticate().await?;
        let repos = self.enumerate_repositories(&user).await?;
        Ok(DescribeOutput { repos })
    }
}
