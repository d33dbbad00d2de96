//! Configuration loading and the admission policy snapshot.
//!
//! This module is split into:
//! - [`types`]: root `Config`, `LocalConf`, `ClassBlock`, and the ambient knobs
//!   (listeners, rate limiting, timeouts) every node needs regardless of policy.
//! - [`conf_item`]: `ConfItem`/`ConfStatus`, the admission-walked policy object.
//! - [`deny`]: `DenyConf` (K-lines).
//! - [`crule`]: `CRuleConf` and its small boolean expression language.
//! - [`quarantine`]: `Quarantine` entries.
//! - [`oper`]: operator blocks and password verification.
//! - [`snapshot`]: builds a [`PolicySnapshot`] from a loaded [`Config`], and
//!   the rehash diff/reclaim logic described in §4.4.

pub mod conf_item;
pub mod crule;
pub mod defaults;
pub mod deny;
pub mod oper;
pub mod quarantine;
pub mod snapshot;
pub mod types;

pub use conf_item::{ConfItem, ConfItemBlock, ConfStatus};
pub use crule::{conf_eval_crule, CRuleConf, CRuleExpr, CRuleType, DirectoryTopology, TopologyQuery};
pub use deny::DenyConf;
pub use oper::{OperBlock, WebircBlock};
pub use quarantine::Quarantine;
pub use snapshot::PolicySnapshot;
pub use types::{
    ClassBlock, Config, IdleTimeoutsConfig, ListenBlock, LocalConf, RateLimitConfig, SecurityConfig,
};

use thiserror::Error;

/// Configuration errors (§7 "Configuration errors").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("connection class `{0}` is referenced but not defined")]
    UnknownClass(String),
    #[error("duplicate connection class name `{0}`")]
    DuplicateClass(String),
    #[error("invalid crule expression for `{server_mask}`: {source}")]
    InvalidCRule {
        server_mask: String,
        #[source]
        source: crule::CRuleParseError,
    },
}

/// Load and validate a configuration file from disk.
///
/// On success the returned [`Config`] has already been checked for
/// dangling class references and malformed crule expressions — everything
/// downstream (admission, rehash) can assume a validated `Config`.
pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&text)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for class in &config.class {
        if !seen.insert(class.name.as_str()) {
            return Err(ConfigError::DuplicateClass(class.name.clone()));
        }
    }
    let class_names: std::collections::HashSet<&str> =
        config.class.iter().map(|c| c.name.as_str()).collect();
    for item in config
        .client
        .iter()
        .chain(config.connect.iter())
        .chain(config.uworld.iter())
    {
        if !class_names.contains(item.class.as_str()) {
            return Err(ConfigError::UnknownClass(item.class.clone()));
        }
    }
    for rule in &config.crule {
        crule::CRuleExpr::parse(&rule.rule).map_err(|source| ConfigError::InvalidCRule {
            server_mask: rule.server_mask.clone(),
            source,
        })?;
    }
    Ok(())
}
