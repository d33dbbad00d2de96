//! Default value functions for configuration.

use rand::Rng;

pub fn default_true() -> bool {
    true
}

pub fn default_ping_freq() -> u64 {
    90
}

pub fn default_ping_timeout() -> u64 {
    120
}

pub fn default_registration_timeout() -> u64 {
    60
}

pub fn default_connect_freq() -> u64 {
    300
}

pub fn default_sendq_limit() -> usize {
    1_048_576
}

pub fn default_max_links() -> u32 {
    100
}

pub fn default_cloak_secret() -> String {
    let secret: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    tracing::warn!(
        "no cloak_secret configured - using ephemeral random secret; \
         cloaked hostnames will not be stable across restarts"
    );
    secret
}

pub fn default_cloak_suffix() -> String {
    "ip".to_string()
}

pub fn default_message_rate() -> u32 {
    2
}

pub fn default_connection_burst() -> u32 {
    3
}

pub fn default_join_burst() -> u32 {
    5
}

pub fn default_nick_delay_secs() -> u64 {
    30
}

pub fn default_target_delay_secs() -> u64 {
    10
}

pub fn default_start_targets() -> u32 {
    10
}

pub fn default_whowas_capacity() -> usize {
    5000
}

pub fn default_max_connections() -> u32 {
    4096
}

pub fn default_metrics_port() -> u16 {
    9090
}
