//! Root configuration and the ambient (non-admission) config blocks.
//!
//! The admission-relevant semantic objects (`ConfItem`, `DenyConf`, `CRuleConf`,
//! `Quarantine`) live in their own modules; this file holds the blocks that
//! exist once per server (`LocalConf`), the connection classes they reference,
//! and the ambient knobs (listeners, rate limiting, timeouts) that every
//! runnable node needs regardless of what the admission policy says.

use serde::Deserialize;
use std::net::SocketAddr;

use super::defaults::*;

/// Top-level configuration, deserialized from a single TOML document.
///
/// Unknown keys are rejected: a typo in an operator's config file should
/// surface as a `ConfigError::Parse` at load time, not be silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub local: LocalConf,
    #[serde(default)]
    pub listen: Vec<ListenBlock>,
    #[serde(default)]
    pub class: Vec<ClassBlock>,
    #[serde(default)]
    pub client: Vec<super::conf_item::ConfItemBlock>,
    #[serde(default)]
    pub connect: Vec<super::conf_item::ConfItemBlock>,
    #[serde(default)]
    pub uworld: Vec<super::conf_item::ConfItemBlock>,
    #[serde(default)]
    pub operator: Vec<super::oper::OperBlock>,
    #[serde(default)]
    pub deny: Vec<super::deny::DenyConf>,
    #[serde(default)]
    pub crule: Vec<super::crule::CRuleConf>,
    #[serde(default)]
    pub quarantine: Vec<super::quarantine::Quarantine>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub idle_timeouts: IdleTimeoutsConfig,
}

/// This server's own identity (the source spec's "LocalConf", unique per node).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConf {
    /// Server name as it appears in the directory and on the wire (e.g. `hub.example.net`).
    pub name: String,
    /// 2-character P10 server numeric (the server half of every numnick minted here).
    pub numeric: String,
    /// Free-text description shown in LINKS/server-intro.
    pub description: String,
    /// Network name advertised in 005/ISUPPORT.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// Administrative contact lines for ADMIN.
    #[serde(default)]
    pub admin: Vec<String>,
    /// Port the Prometheus `/metrics` endpoint listens on; `0` disables it.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_network_name() -> String {
    "StraylightNet".to_string()
}

/// One listening socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenBlock {
    pub bind: SocketAddr,
    #[serde(default)]
    pub tls: bool,
    /// Name of the connection class new clients on this listener are classified under
    /// before `check_client` walks the client ConfItems (purely a default hint).
    pub class: Option<String>,
}

/// A named connection class: `max_links`, `ping_freq`, `connect_freq`, `sendq_limit` (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassBlock {
    pub name: String,
    #[serde(default = "default_max_links")]
    pub max_links: u32,
    #[serde(default = "default_ping_freq")]
    pub ping_freq_secs: u64,
    #[serde(default = "default_connect_freq")]
    pub connect_freq_secs: u64,
    #[serde(default = "default_sendq_limit")]
    pub sendq_limit: usize,
}

/// Cloaking and related privacy knobs. Ambient (not functionality scoped out
/// by the Non-goals): every node needs *some* cloak secret to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SecurityConfig {
    #[serde(default = "default_cloak_secret")]
    pub cloak_secret: String,
    #[serde(default = "default_cloak_suffix")]
    pub cloak_suffix: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cloak_secret: default_cloak_secret(),
            cloak_suffix: default_cloak_suffix(),
        }
    }
}

/// Flood-protection quotas, and the target-change ratelimit constants flagged
/// as policy (not guessable) in the design notes: `NICK_DELAY`, `TARGET_DELAY`,
/// `STARTTARGETS`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    pub message_rate_per_second: u32,
    pub connection_burst_per_ip: u32,
    pub join_burst_per_client: u32,
    pub nick_delay_secs: u64,
    pub target_delay_secs: u64,
    pub start_targets: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            message_rate_per_second: default_message_rate(),
            connection_burst_per_ip: default_connection_burst(),
            join_burst_per_client: default_join_burst(),
            nick_delay_secs: default_nick_delay_secs(),
            target_delay_secs: default_target_delay_secs(),
            start_targets: default_start_targets(),
        }
    }
}

/// Ping/registration timeouts (§5 Cancellation and timeouts).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IdleTimeoutsConfig {
    pub ping_freq_secs: u64,
    pub ping_timeout_secs: u64,
    pub registration_timeout_secs: u64,
}

impl Default for IdleTimeoutsConfig {
    fn default() -> Self {
        Self {
            ping_freq_secs: default_ping_freq(),
            ping_timeout_secs: default_ping_timeout(),
            registration_timeout_secs: default_registration_timeout(),
        }
    }
}
