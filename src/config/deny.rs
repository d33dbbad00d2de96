//! K-line style deny rules (`DenyConf`, §3, §4.4 step 2).

use serde::Deserialize;

/// A deny rule evaluated before any `ConfItem` is walked. First match wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenyConf {
    #[serde(default)]
    pub user_mask: Option<String>,
    #[serde(default)]
    pub host_mask: Option<String>,
    /// CIDR notation, e.g. `10.0.0.0/8`; matched against the client's IP independent
    /// of `host_mask` (reverse-DNS may be absent or untrusted).
    #[serde(default)]
    pub ip_cidr: Option<String>,
    #[serde(default)]
    pub realname_mask: Option<String>,
    /// Message relayed to the client on match (§8 S5).
    pub message: String,
}

impl DenyConf {
    /// (usermask ∧ hostmask) OR ip/cidr OR realname-mask, per §4.4 step 2.
    pub fn matches(&self, user: &str, host: &str, ip: std::net::IpAddr, realname: &str) -> bool {
        let user_host_match = match (&self.user_mask, &self.host_mask) {
            (Some(u), Some(h)) => {
                slirc_proto::wildcard_match(u, user) && slirc_proto::wildcard_match(h, host)
            }
            (None, Some(h)) => slirc_proto::wildcard_match(h, host),
            (Some(u), None) => slirc_proto::wildcard_match(u, user),
            (None, None) => false,
        };
        if user_host_match {
            return true;
        }
        if let Some(cidr) = &self.ip_cidr {
            if let Ok(net) = cidr.parse::<ipnet::IpNet>() {
                if net.contains(&ip) {
                    return true;
                }
            }
        }
        if let Some(mask) = &self.realname_mask {
            if slirc_proto::wildcard_match(mask, realname) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn matches_on_host_and_user_mask() {
        let deny = DenyConf {
            user_mask: Some("*".into()),
            host_mask: Some("*.spam.example".into()),
            ip_cidr: None,
            realname_mask: None,
            message: "banned".into(),
        };
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        assert!(deny.matches("evil", "host.spam.example", ip, "Evil User"));
        assert!(!deny.matches("evil", "host.example.net", ip, "Evil User"));
    }

    #[test]
    fn matches_on_cidr() {
        let deny = DenyConf {
            user_mask: None,
            host_mask: None,
            ip_cidr: Some("10.0.0.0/8".into()),
            realname_mask: None,
            message: "banned net".into(),
        };
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        let other: IpAddr = "192.168.1.1".parse().unwrap();
        assert!(deny.matches("x", "y", ip, "z"));
        assert!(!deny.matches("x", "y", other, "z"));
    }
}
