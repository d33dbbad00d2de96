//! Admission (§4.4): `check_client`/`check_server`, the policy gate every new
//! connection passes through before it becomes a directory entity.

use std::net::IpAddr;

use thiserror::Error;
use tracing::warn;

use crate::config::{ConfItem, ConfStatus, PolicySnapshot, TopologyQuery};

/// ACR enum (§4.4, §7 "Admission failures"). Propagates to the caller of
/// `check_client`/`check_server` as a typed `Result` — the send engine never
/// sees this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("no authorization block matches this connection")]
    NoAuthorization,
    #[error("too many clients in connection class `{0}`")]
    TooManyInClass(String),
    #[error("too many clients from this IP")]
    TooManyFromIP,
    #[error("already authorized")]
    AlreadyAuthorized,
    #[error("bad socket")]
    BadSocket,
    #[error("rejected: {0}")]
    Denied(String),
}

impl AdmissionError {
    /// Stable label for the `ircd_admission_rejected_total` counter (§10.1).
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoAuthorization => "no_authorization",
            Self::TooManyInClass(_) => "too_many_in_class",
            Self::TooManyFromIP => "too_many_from_ip",
            Self::AlreadyAuthorized => "already_authorized",
            Self::BadSocket => "bad_socket",
            Self::Denied(_) => "denied",
        }
    }

    /// Human-facing reason for the `ERROR :Closing Link:` line sent on
    /// rejection (S5). Separate from the `Display` impl, which is meant for
    /// logs and carries the variant's own framing ("rejected: ...").
    pub fn close_reason(&self) -> String {
        match self {
            Self::NoAuthorization => "No authorization".to_string(),
            Self::TooManyInClass(class) => format!("Too many connections in class {class}"),
            Self::TooManyFromIP => "Too many connections from your host".to_string(),
            Self::AlreadyAuthorized => "Already registered".to_string(),
            Self::BadSocket => "Bad socket".to_string(),
            Self::Denied(message) => message.clone(),
        }
    }
}

pub struct ClientCandidate<'a> {
    pub username: &'a str,
    pub host: &'a str,
    pub ip: IpAddr,
    pub realname: &'a str,
}

/// §4.4 `check_client`: deny-list first, then walk `CONF_CLIENT` items in
/// config order, attaching to the first that matches and has room. Returns
/// the id of the `ConfItem` now attached, for later detach on disconnect.
pub fn check_client(
    policy: &mut PolicySnapshot,
    candidate: &ClientCandidate<'_>,
    clients_from_ip: u32,
) -> Result<u64, AdmissionError> {
    for deny in &policy.deny {
        if deny.matches(candidate.username, candidate.host, candidate.ip, candidate.realname) {
            warn!(
                reason = "kline_match",
                addr = %candidate.ip,
                message = %deny.message,
                "client rejected by deny list"
            );
            return Err(AdmissionError::Denied(deny.message.clone()));
        }
    }

    let mut attempted: Option<usize> = None;
    for (idx, item) in policy.conf_items.iter().enumerate() {
        if item.illegal || !item.status.contains(ConfStatus::CLIENT) {
            continue;
        }
        if !item.matches_host(candidate.host) {
            continue;
        }
        if !item.matches_user(candidate.username) {
            continue;
        }
        attempted = Some(idx);
        break;
    }

    let Some(idx) = attempted else {
        warn!(reason = "no_authorization", addr = %candidate.ip, "client rejected: no matching client block");
        return Err(AdmissionError::NoAuthorization);
    };

    let max_per_ip = policy.conf_items[idx].max_per_ip;
    if max_per_ip > 0 && clients_from_ip >= max_per_ip {
        warn!(reason = "too_many_from_ip", addr = %candidate.ip, "client rejected");
        return Err(AdmissionError::TooManyFromIP);
    }

    let class_name = policy.conf_items[idx].class.clone();
    let max_links = policy
        .class(&class_name)
        .map(|c| c.max_links)
        .unwrap_or(u32::MAX);
    let current_in_class: u32 = policy
        .conf_items
        .iter()
        .filter(|c| c.class == class_name)
        .map(|c| c.clients)
        .sum();
    if current_in_class >= max_links {
        warn!(reason = "too_many_in_class", class = %class_name, addr = %candidate.ip, "client rejected");
        return Err(AdmissionError::TooManyInClass(class_name));
    }

    let item = &mut policy.conf_items[idx];
    item.clients += 1;
    Ok(item.id)
}

pub struct ServerCandidate<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub ip: IpAddr,
    pub introduced_children: u32,
}

/// §4.4 `check_server`: the `CONF_CONNECT` counterpart of `check_client`,
/// additionally verifying the server name, password, hub-limit, and any
/// matching `CRuleType::All` connection rule (`conf_eval_crule`).
pub fn check_server(
    policy: &mut PolicySnapshot,
    candidate: &ServerCandidate<'_>,
    topo: &dyn TopologyQuery,
) -> Result<u64, AdmissionError> {
    if let Some(rule) = crate::config::conf_eval_crule(&policy.crule, topo, candidate.name) {
        warn!(server = %candidate.name, rule = %rule, "server link rejected by connection rule");
        return Err(AdmissionError::Denied(format!("Connection rule blocked: {rule}")));
    }

    let mut attempted: Option<usize> = None;
    for (idx, item) in policy.conf_items.iter().enumerate() {
        if item.illegal || !item.status.contains(ConfStatus::CONNECT) {
            continue;
        }
        if !item.matches_host(candidate.name) {
            continue;
        }
        if item.password != candidate.password {
            continue;
        }
        attempted = Some(idx);
        break;
    }

    let Some(idx) = attempted else {
        warn!(reason = "no_authorization", server = %candidate.name, addr = %candidate.ip, "server link rejected");
        return Err(AdmissionError::NoAuthorization);
    };

    let item: &ConfItem = &policy.conf_items[idx];
    if let Some(limit) = item.hub_limit_count() {
        if candidate.introduced_children > limit {
            warn!(reason = "hub_limit_exceeded", server = %candidate.name, "server link rejected");
            return Err(AdmissionError::TooManyInClass("hub-limit".to_string()));
        }
    }

    let item = &mut policy.conf_items[idx];
    item.clients += 1;
    Ok(item.id)
}

/// Decrement the attach count on disconnect (the complement of the `Attach`
/// step in `check_client`/`check_server`).
pub fn detach(policy: &mut PolicySnapshot, conf_id: u64) {
    if let Some(item) = policy.conf_items.iter_mut().find(|c| c.id == conf_id) {
        item.clients = item.clients.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoTopology;
    impl TopologyQuery for NoTopology {
        fn connected(&self, _mask: &str) -> bool {
            false
        }
        fn directcon(&self, _mask: &str) -> bool {
            false
        }
    }
    struct AllConnectedTopology;
    impl TopologyQuery for AllConnectedTopology {
        fn connected(&self, _mask: &str) -> bool {
            true
        }
        fn directcon(&self, _mask: &str) -> bool {
            true
        }
    }

    fn policy_with_connect_block(host_mask: &str, password: &str, crule: &str) -> PolicySnapshot {
        let config: crate::config::Config = toml::from_str(&format!(
            r#"
            [local]
            name = "hub.example.net"
            numeric = "AA"
            description = "test"

            [[class]]
            name = "servers"
            max_links = 10

            [[connect]]
            host_mask = "{host_mask}"
            password = "{password}"
            class = "servers"
            {crule}
            "#
        ))
        .unwrap();
        PolicySnapshot::from_config(&config)
    }

    #[test]
    fn check_server_accepts_with_no_matching_crule() {
        let mut policy = policy_with_connect_block("leaf.example.net", "hunter2", "");
        let candidate = ServerCandidate {
            name: "leaf.example.net",
            password: "hunter2",
            ip: "127.0.0.1".parse().unwrap(),
            introduced_children: 0,
        };
        assert!(check_server(&mut policy, &candidate, &NoTopology).is_ok());
    }

    #[test]
    fn check_server_rejects_when_crule_blocks() {
        let mut policy = policy_with_connect_block(
            "leaf.example.net",
            "hunter2",
            r#"
            [[crule]]
            server_mask = "leaf.*"
            rule_type = "all"
            rule = "connected(hub*)"
            "#,
        );
        let candidate = ServerCandidate {
            name: "leaf.example.net",
            password: "hunter2",
            ip: "127.0.0.1".parse().unwrap(),
            introduced_children: 0,
        };
        assert_eq!(
            check_server(&mut policy, &candidate, &AllConnectedTopology),
            Err(AdmissionError::Denied("Connection rule blocked: connected(hub*)".to_string()))
        );
    }

    fn policy_with_client_block(host_mask: &str, max_links: u32) -> PolicySnapshot {
        let config: crate::config::Config = toml::from_str(&format!(
            r#"
            [local]
            name = "hub.example.net"
            numeric = "AA"
            description = "test"

            [[class]]
            name = "default"
            max_links = {max_links}

            [[client]]
            host_mask = "{host_mask}"
            class = "default"
            "#
        ))
        .unwrap();
        PolicySnapshot::from_config(&config)
    }

    #[test]
    fn accepts_matching_client() {
        let mut policy = policy_with_client_block("*", 10);
        let candidate = ClientCandidate {
            username: "alice",
            host: "host.example",
            ip: "127.0.0.1".parse().unwrap(),
            realname: "Alice",
        };
        assert!(check_client(&mut policy, &candidate, 0).is_ok());
        assert_eq!(policy.conf_items[0].clients, 1);
    }

    #[test]
    fn rejects_with_no_matching_block() {
        let mut policy = policy_with_client_block("*.nomatch.example", 10);
        let candidate = ClientCandidate {
            username: "alice",
            host: "host.example",
            ip: "127.0.0.1".parse().unwrap(),
            realname: "Alice",
        };
        assert_eq!(
            check_client(&mut policy, &candidate, 0),
            Err(AdmissionError::NoAuthorization)
        );
    }

    #[test]
    fn rejects_once_class_is_full() {
        let mut policy = policy_with_client_block("*", 1);
        let candidate = ClientCandidate {
            username: "alice",
            host: "host.example",
            ip: "127.0.0.1".parse().unwrap(),
            realname: "Alice",
        };
        assert!(check_client(&mut policy, &candidate, 0).is_ok());
        assert_eq!(
            check_client(&mut policy, &candidate, 0),
            Err(AdmissionError::TooManyInClass("default".to_string()))
        );
    }

    #[test]
    fn detach_decrements_clients() {
        let mut policy = policy_with_client_block("*", 10);
        let candidate = ClientCandidate {
            username: "alice",
            host: "host.example",
            ip: "127.0.0.1".parse().unwrap(),
            realname: "Alice",
        };
        let id = check_client(&mut policy, &candidate, 0).unwrap();
        detach(&mut policy, id);
        assert_eq!(policy.conf_items[0].clients, 0);
    }
}
