//! `ConfItem`: the policy object admission walks (§3 Data Model, §4.4).

use serde::Deserialize;
use std::net::IpAddr;

use super::defaults::{default_max_links, default_sendq_limit};

bitflags::bitflags! {
    /// Status mask a `ConfItem` carries; see §3 "ConfItem and friends".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfStatus: u8 {
        const CLIENT   = 0b0001;
        const CONNECT  = 0b0010;
        const OPERATOR = 0b0100;
        const UWORLD   = 0b1000;
    }
}

/// The on-disk (deserialized) shape of a client/connect/uworld block.
/// Kept distinct from the runtime `ConfItem` because the latter carries
/// mutable refcount/illegal bookkeeping that has no business being in config.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfItemBlock {
    /// Host mask (wildcard pattern) this item admits.
    pub host_mask: String,
    /// Username mask; empty/absent matches any username.
    #[serde(default)]
    pub user_mask: Option<String>,
    /// Shared secret for CONF_CONNECT (server link) blocks; unused for CONF_CLIENT.
    #[serde(default)]
    pub password: Option<String>,
    /// Connection class this item's attachments are quota-accounted under.
    pub class: String,
    /// For CONF_CONNECT: remote address/port to (auto)connect to.
    #[serde(default)]
    pub remote_addr: Option<String>,
    #[serde(default)]
    pub remote_port: Option<u16>,
    /// For CONF_CONNECT: mask restricting which server names this link may introduce.
    #[serde(default)]
    pub hub_limit: Option<String>,
    /// Per-IP simultaneous connection cap for CONF_CLIENT items (0 = unlimited).
    #[serde(default)]
    pub max_per_ip: u32,
    /// CIDR prefix length used when matching the client's IP (I4-adjacent: bounds the
    /// blast radius of a single host_mask entry). 32 (v4) / 128 (v6) if unset.
    #[serde(default)]
    pub cidr_bits: Option<u8>,
}

/// Runtime admission object: one per configured block, plus mutable
/// bookkeeping the admission/rehash subsystem owns.
#[derive(Debug, Clone)]
pub struct ConfItem {
    /// Stable identity, assigned at construction; survives rehash for
    /// structurally-identical entries (R2: rehash with unchanged config is a no-op).
    pub id: u64,
    pub status: ConfStatus,
    pub host_mask: String,
    pub user_mask: Option<String>,
    pub password: Option<String>,
    pub class: String,
    pub remote_addr: Option<(String, u16)>,
    pub hub_limit: Option<String>,
    pub max_per_ip: u32,
    pub cidr_bits: Option<u8>,
    pub bind_addr: Option<IpAddr>,
    /// I5: marked when a rehash drops this entry structurally; reclaimed once `clients == 0`.
    pub illegal: bool,
    /// I5 / P3: number of entities currently attached to this item.
    pub clients: u32,
}

impl ConfItem {
    pub fn from_block(id: u64, status: ConfStatus, block: &ConfItemBlock) -> Self {
        Self {
            id,
            status,
            host_mask: block.host_mask.clone(),
            user_mask: block.user_mask.clone(),
            password: block.password.clone(),
            class: block.class.clone(),
            remote_addr: block
                .remote_addr
                .clone()
                .zip(block.remote_port)
                .map(|(a, p)| (a, p)),
            hub_limit: block.hub_limit.clone(),
            max_per_ip: block.max_per_ip,
            cidr_bits: block.cidr_bits,
            bind_addr: None,
            illegal: false,
            clients: 0,
        }
    }

    /// Structural identity used by rehash's "not structurally identical" comparison (§4.4).
    /// Deliberately excludes `id`/`illegal`/`clients`: those are bookkeeping, not policy.
    pub fn structurally_eq(&self, other: &ConfItem) -> bool {
        self.status == other.status
            && self.host_mask == other.host_mask
            && self.user_mask == other.user_mask
            && self.password == other.password
            && self.class == other.class
            && self.remote_addr == other.remote_addr
            && self.hub_limit == other.hub_limit
            && self.max_per_ip == other.max_per_ip
            && self.cidr_bits == other.cidr_bits
    }

    /// I5: eligible for reclamation.
    pub fn reclaimable(&self) -> bool {
        self.illegal && self.clients == 0
    }

    pub fn matches_host(&self, host: &str) -> bool {
        slirc_proto::wildcard_match(&self.host_mask, host)
    }

    pub fn matches_user(&self, user: &str) -> bool {
        match &self.user_mask {
            None => true,
            Some(mask) => slirc_proto::wildcard_match(mask, user),
        }
    }

    /// Parses the `hub_limit` mask's numeric suffix (`*.3` style: "up to 3
    /// matching children"), if present, for `check_server`'s hub-limit check.
    pub fn hub_limit_count(&self) -> Option<u32> {
        self.hub_limit.as_ref().and_then(|mask| {
            mask.rsplit_once('.')
                .and_then(|(_, n)| n.parse::<u32>().ok())
        })
    }
}

/// Operator connection-class quota defaults when a class block is missing
/// (config validation normally rejects this; kept as a last-resort fallback
/// so a malformed rehash degrades instead of panicking).
pub fn fallback_class() -> super::types::ClassBlock {
    super::types::ClassBlock {
        name: "default".to_string(),
        max_links: default_max_links(),
        ping_freq_secs: super::defaults::default_ping_freq(),
        connect_freq_secs: super::defaults::default_connect_freq(),
        sendq_limit: default_sendq_limit(),
    }
}
