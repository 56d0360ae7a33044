//! RepoVault - Concurrent Git Repository Backup
//!
//! RepoVault discovers every repository the authenticated user owns on the
//! configured hosting providers and archives each one to local storage as
//! timestamped git bundles, keeping only the most recent N archives per
//! repository.
//!
//! ## Core Features
//!
//! - **Multi-provider discovery**: GitLab and GitHub behind one capability
//!   interface; new providers plug into the same engine
//! - **Bounded concurrency**: a fixed-size worker pool archives repositories
//!   in parallel
//! - **Retention policy**: per-provider archive retention, unlimited when
//!   unset
//! - **Configuration Management**: YAML-based configuration with XDG
//!   compliance and load-time token resolution
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`provider`]: Hosting-provider capability abstraction
//! - [`providers`]: GitLab and GitHub clients
//! - [`repository`]: Canonical repository records and credential injection
//! - [`backup`]: Archive step (mirror clone, bundle, retention pruning)
//! - [`engine`]: Worker pool and batch orchestration

pub mod backup;
pub mod config;
pub mod engine;
pub mod provider;
pub mod providers;
pub mod repository;

pub use backup::{BackupExecutor, GitBackup};
pub use config::Config;
pub use engine::{BackupEngine, BackupSummary};
pub use provider::{DescribeOutput, Provider, ProviderError, UserId};
pub use repository::Repository;
