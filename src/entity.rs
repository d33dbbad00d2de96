//! Entity: the polymorphic per-participant record (§3 Data Model).
//!
//! Per §9 "Cross-linked graph": the directory exclusively owns `Entity`
//! records; every other reference (channel membership, server child lists,
//! `upstream` pointers) is a stable identifier resolved via lookup, never an
//! owning reference. `EntityId` is that identifier.

use std::collections::HashSet;
use std::time::SystemTime;

use crate::numnick::UserNumnick;

/// Stable identifier for an entity, resolved through the [`crate::directory::Directory`].
/// For a user this is its 5-char numnick; for a server, its 2-char numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    User(String),
    Server(String),
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        match self {
            EntityId::User(s) | EntityId::Server(s) => s,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status tag, §3: `{Unregistered, Unknown, HandshakingServer, User, LocalUser,
/// Server, LocalServer, Service, Me, Killed}`. Collapsed here to the axis that
/// actually drives behavior (local vs remote, user vs server); unregistered
/// connection phases are modeled by [`crate::connection::Connection`] instead
/// of as directory entities, since they are not yet named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    LocalUser,
    RemoteUser,
    LocalServer,
    RemoteServer,
    /// The local server's own entity, root of the upstream chain.
    Me,
    Service,
}

impl Status {
    pub fn is_local(self) -> bool {
        matches!(self, Status::LocalUser | Status::LocalServer | Status::Me)
    }

    pub fn is_server(self) -> bool {
        matches!(
            self,
            Status::LocalServer | Status::RemoteServer | Status::Me
        )
    }
}

bitflags::bitflags! {
    /// User mode bits (§3 "User-specific attributes").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserModes: u16 {
        const INVISIBLE      = 1 << 0; // +i
        const WALLOPS        = 1 << 1; // +w
        const DEBUG          = 1 << 2; // +g
        const DEAF           = 1 << 3; // +d
        const OPER           = 1 << 4; // +o
        const LOCAL_OPER     = 1 << 5; // +O
        const SERVER_NOTICES = 1 << 6; // +s
    }
}

bitflags::bitflags! {
    /// Server-specific mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ServerModes: u8 {
        const HUB     = 1 << 0;
        const SERVICE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// SNO_* server-notice subscription categories an operator may subscribe to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SnoMask: u32 {
        const OLD     = 1 << 0; // rehash deopered this operator
        const CONNECT = 1 << 1; // server link up/down
        const KILL    = 1 << 2;
        const DENY    = 1 << 3; // K-line match
        const REHASH  = 1 << 4;
        const CLIENT  = 1 << 5; // client connect/disconnect
    }
}

/// Per-entity target-change ratelimit state (§9 "policy, not guessable"
/// constants: `NICK_DELAY`, `TARGET_DELAY`, `STARTTARGETS`).
///
/// Carried on every `UserData` and defaulted at construction, but never read
/// or mutated beyond that: enforcing it is per-message/target flow control,
/// out of scope per §1 Non-goals ("No flow control beyond per-link output
/// queues and a slow-client disconnect threshold"), the same carve-out that
/// leaves `RateLimitConfig` (`config/types.rs`) parsed but unenforced (see
/// `security/mod.rs`). The struct itself stays because §9 resolves
/// `NICK_DELAY`/`TARGET_DELAY`/`STARTTARGETS` as "policy: treat as
/// configuration with explicit defaults" — `RateLimitConfig` already holds
/// those defaults; this is the per-entity state an enforcing implementation
/// would consult.
#[derive(Debug, Clone, Default)]
pub struct TargetRatelimit {
    pub last_nick_change: Option<SystemTime>,
    pub recent_targets: Vec<(String, SystemTime)>,
    pub targets_remaining: u32,
}

#[derive(Debug, Clone)]
pub struct UserData {
    pub username: String,
    pub realname: String,
    pub host: String,
    pub ip: std::net::IpAddr,
    pub modes: UserModes,
    pub channels: HashSet<String>,
    pub ratelimit: TargetRatelimit,
    pub account: Option<String>,
    /// Set once OPER succeeds against a `ConfItem` with status OPERATOR; cleared
    /// (without killing the user) when rehash removes that ConfItem (§8 S4).
    pub oper_conf_id: Option<u64>,
    pub sno_mask: SnoMask,
}

#[derive(Debug, Clone)]
pub struct ServerData {
    pub hopcount: u32,
    pub description: String,
    pub modes: ServerModes,
    pub conf_id: Option<u64>,
    pub children: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub enum Kind {
    User(UserData),
    Server(ServerData),
}

/// A single entity record, owned exclusively by the [`crate::directory::Directory`].
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub status: Status,
    /// I1: reference to the directly-attached neighbor through which this
    /// entity is reachable; `None` only for `Me`.
    pub upstream: Option<EntityId>,
    pub first_seen: SystemTime,
    pub last_activity: SystemTime,
    pub kind: Kind,
    /// Present only for locally-attached entities (I3).
    pub connection: Option<crate::pool::Handle<crate::connection::Connection>>,
}

impl Entity {
    pub fn new_local_user(
        numnick: UserNumnick,
        name: String,
        upstream_me: EntityId,
        data: UserData,
        connection: crate::pool::Handle<crate::connection::Connection>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: EntityId::User(numnick.as_str()),
            name,
            status: Status::LocalUser,
            upstream: Some(upstream_me),
            first_seen: now,
            last_activity: now,
            kind: Kind::User(data),
            connection: Some(connection),
        }
    }

    pub fn new_me(server_id: String, name: String) -> Self {
        let now = SystemTime::now();
        Self {
            id: EntityId::Server(server_id),
            name,
            status: Status::Me,
            upstream: None,
            first_seen: now,
            last_activity: now,
            kind: Kind::Server(ServerData {
                hopcount: 0,
                description: String::new(),
                modes: ServerModes::HUB,
                conf_id: None,
                children: Vec::new(),
            }),
            connection: None,
        }
    }

    pub fn user_data(&self) -> Option<&UserData> {
        match &self.kind {
            Kind::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn user_data_mut(&mut self) -> Option<&mut UserData> {
        match &mut self.kind {
            Kind::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn server_data(&self) -> Option<&ServerData> {
        match &self.kind {
            Kind::Server(s) => Some(s),
            _ => None,
        }
    }

    pub fn server_data_mut(&mut self) -> Option<&mut ServerData> {
        match &mut self.kind {
            Kind::Server(s) => Some(s),
            _ => None,
        }
    }
}
