//! Configuration for dirfeed.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DIRFEED_HOME, DIRFEED_CONFIG, DIRFEED_ACCESS_TOKEN)
//! 2. Config file (.dirfeed/config.yaml)
//! 3. Defaults (~/.dirfeed)
//!
//! Config file discovery:
//! - DIRFEED_CONFIG if set
//! - Otherwise searches current directory and parents for .dirfeed/config.yaml
//! - Relative paths in the config file are relative to its .dirfeed/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::MAX_PAGE_SIZE;
use crate::core::RecordErrorPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    pub customer_id: Option<String>,
    pub api_base: Option<String>,
    pub max_results_per_page: Option<u32>,
    pub record_error_policy: Option<RecordErrorPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PubSubConfig {
    pub api_base: Option<String>,
    pub member_topic: Option<String>,
    pub group_topic: Option<String>,
    pub group_query_topic: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    pub retry_timeout_seconds: Option<i64>,
    pub log_event_every_x_msg: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// SQLite file (relative to the config file)
    pub path: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to dirfeed home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub project_id: String,
    pub directory: DirectorySettings,
    pub pubsub: PubSubSettings,
    pub service: ServiceSettings,
    /// SQLite side-index file
    pub cache_path: PathBuf,
    /// Bearer token for the directory and the bus (never printed)
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub customer_id: String,
    pub api_base: String,
    /// Always within 1..=200
    pub max_results_per_page: u32,
    pub record_error_policy: RecordErrorPolicy,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            api_base: "https://admin.googleapis.com".to_string(),
            max_results_per_page: MAX_PAGE_SIZE,
            record_error_policy: RecordErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PubSubSettings {
    pub api_base: String,
    pub member_topic: String,
    pub group_topic: String,
    pub group_query_topic: String,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            api_base: "https://pubsub.googleapis.com".to_string(),
            member_topic: "gci-groupMembers".to_string(),
            group_topic: "gci-groups".to_string(),
            group_query_topic: "gci-groupQueries".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Retry horizon: events older than this are dropped
    pub retry_timeout_seconds: i64,
    /// Progress log cadence of the publisher
    pub log_event_every_x_msg: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            retry_timeout_seconds: 600,
            log_event_every_x_msg: 1000,
        }
    }
}

/// Clamp a configured page size to what the directory accepts
pub fn clamp_page_size(requested: u32) -> u32 {
    requested.clamp(1, MAX_PAGE_SIZE)
}

/// Find config file: DIRFEED_CONFIG, then current directory and parents
fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("DIRFEED_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".dirfeed").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Combine a parsed config file (if any) with the environment and defaults
fn resolve(config_file: Option<(PathBuf, ConfigFile)>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".dirfeed");

    let access_token = std::env::var("DIRFEED_ACCESS_TOKEN").ok();

    let Some((config_path, file)) = config_file else {
        let home = std::env::var("DIRFEED_HOME")
            .map(PathBuf::from)
            .unwrap_or(default_home);
        let cache_path = home.join("cache.sqlite");

        return Ok(ResolvedConfig {
            home,
            config_file: None,
            project_id: String::new(),
            directory: DirectorySettings::default(),
            pubsub: PubSubSettings::default(),
            service: ServiceSettings::default(),
            cache_path,
            access_token,
        });
    };

    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let home = if let Ok(env_home) = std::env::var("DIRFEED_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = file.home {
        resolve_path(&config_dir, home_path)
    } else {
        default_home
    };

    let directory_defaults = DirectorySettings::default();
    let directory = DirectorySettings {
        customer_id: file.directory.customer_id.unwrap_or_default(),
        api_base: file
            .directory
            .api_base
            .unwrap_or(directory_defaults.api_base),
        max_results_per_page: clamp_page_size(
            file.directory
                .max_results_per_page
                .unwrap_or(directory_defaults.max_results_per_page),
        ),
        record_error_policy: file
            .directory
            .record_error_policy
            .unwrap_or(directory_defaults.record_error_policy),
    };

    let pubsub_defaults = PubSubSettings::default();
    let pubsub = PubSubSettings {
        api_base: file.pubsub.api_base.unwrap_or(pubsub_defaults.api_base),
        member_topic: file.pubsub.member_topic.unwrap_or(pubsub_defaults.member_topic),
        group_topic: file.pubsub.group_topic.unwrap_or(pubsub_defaults.group_topic),
        group_query_topic: file
            .pubsub
            .group_query_topic
            .unwrap_or(pubsub_defaults.group_query_topic),
    };

    let service_defaults = ServiceSettings::default();
    let service = ServiceSettings {
        retry_timeout_seconds: file
            .service
            .retry_timeout_seconds
            .unwrap_or(service_defaults.retry_timeout_seconds),
        log_event_every_x_msg: file
            .service
            .log_event_every_x_msg
            .unwrap_or(service_defaults.log_event_every_x_msg),
    };

    let cache_path = match file.cache.path {
        Some(ref path) => resolve_path(&config_dir, path),
        None => home.join("cache.sqlite"),
    };

    Ok(ResolvedConfig {
        home,
        config_file: Some(config_path),
        project_id: file.project_id.unwrap_or_default(),
        directory,
        pubsub,
        service,
        cache_path,
        access_token,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    match find_config_file() {
        Some(path) => load_config_from(&path),
        None => resolve(None),
    }
}

/// Load configuration from an explicit file (plus environment overrides)
pub fn load_config_from(path: &Path) -> Result<ResolvedConfig> {
    let file = load_config_file(path)?;
    resolve(Some((path.to_path_buf(), file)))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
