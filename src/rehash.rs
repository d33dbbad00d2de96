//! Rehash orchestration (§4.4 "Rehash", S4): loads a new config, swaps the
//! policy snapshot, and reconciles already-attached entities against it.

use tracing::{info, warn};

use crate::config::{Config, ConfigError, PolicySnapshot};
use crate::directory::Directory;
use crate::entity::EntityId;

pub struct RehashSummary {
    pub added: usize,
    pub removed: usize,
    pub reattached: usize,
    pub deopered: Vec<EntityId>,
}

/// Loads and validates `path`, diffs it against `current`, and reconciles
/// connected operators whose O-line vanished (S4: deopered, not killed).
///
/// On a load/validate failure the caller must retain `current` and report
/// via server-notice (§7 "Configuration errors ... the daemon does not
/// exit"); this function never mutates `current` itself.
pub fn rehash(
    current: &PolicySnapshot,
    directory: &mut Directory,
    path: &std::path::Path,
) -> Result<(PolicySnapshot, RehashSummary), ConfigError> {
    let new_config: Config = crate::config::load(path)?;
    let mut new_policy = current.rehash(&new_config);

    let old_ids: std::collections::HashSet<u64> =
        current.conf_items.iter().map(|c| c.id).collect();
    let new_ids: std::collections::HashSet<u64> =
        new_policy.conf_items.iter().map(|c| c.id).collect();
    let added = new_ids.difference(&old_ids).count();
    let removed = old_ids.difference(&new_ids).count();

    let mut deopered = Vec::new();
    let surviving_oper_ids: std::collections::HashSet<u64> = new_policy
        .conf_items
        .iter()
        .filter(|c| !c.illegal && c.status.contains(crate::config::ConfStatus::OPERATOR))
        .map(|c| c.id)
        .collect();

    // Collect ids first to avoid holding a borrow across the mutation loop.
    let to_deoper: Vec<EntityId> = directory
        .iterate_local_users()
        .filter_map(|e| {
            let data = e.user_data()?;
            let conf_id = data.oper_conf_id?;
            (!surviving_oper_ids.contains(&conf_id)).then(|| e.id.clone())
        })
        .collect();

    for id in &to_deoper {
        if let Some(entity) = directory.lookup_by_numnick_mut(id) {
            if let Some(data) = entity.user_data_mut() {
                data.modes.remove(crate::entity::UserModes::OPER);
                data.oper_conf_id = None;
            }
        }
        warn!(entity = %id, sno = "SNO_OLD", "operator deopered by rehash");
        deopered.push(id.clone());
    }

    let reclaimed = new_policy.reclaim_illegal();

    info!(
        added,
        removed,
        reattached = deopered.len(),
        reclaimed,
        "rehash complete"
    );

    Ok((
        new_policy,
        RehashSummary {
            added,
            removed,
            reattached: deopered.len(),
            deopered,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Kind, Status, TargetRatelimit, UserData, UserModes};
    use std::collections::HashSet;
    use std::time::SystemTime;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [local]
            name = "hub.example.net"
            numeric = "AA"
            description = "test"

            [[class]]
            name = "default"
            max_links = 10

            [[client]]
            host_mask = "*"
            class = "default"
            "#,
        )
        .unwrap()
    }

    fn oper_user(conf_id: u64) -> crate::entity::Entity {
        let now = SystemTime::now();
        crate::entity::Entity {
            id: EntityId::User("AAAAA".to_string()),
            name: "bob".to_string(),
            status: Status::LocalUser,
            upstream: None,
            first_seen: now,
            last_activity: now,
            kind: Kind::User(UserData {
                username: "bob".to_string(),
                realname: "Bob".to_string(),
                host: "host.example".to_string(),
                ip: "127.0.0.1".parse().unwrap(),
                modes: UserModes::OPER,
                channels: HashSet::new(),
                ratelimit: TargetRatelimit::default(),
                account: None,
                oper_conf_id: Some(conf_id),
                sno_mask: crate::entity::SnoMask::empty(),
            }),
            connection: None,
        }
    }

    #[test]
    fn rehash_deopers_when_oline_removed() {
        let mut snap = PolicySnapshot::from_config(&base_config());
        // Simulate an O-line: a ConfItem with OPERATOR status that bob attached to.
        let oper_item = crate::config::ConfItem::from_block(
            999,
            crate::config::ConfStatus::OPERATOR,
            &crate::config::ConfItemBlock {
                host_mask: "*".to_string(),
                user_mask: None,
                password: None,
                class: "default".to_string(),
                remote_addr: None,
                remote_port: None,
                hub_limit: None,
                max_per_ip: 0,
                cidr_bits: None,
            },
        );
        snap.conf_items.push(oper_item);

        let mut dir = Directory::new(10);
        dir.register(oper_user(999)).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"
            [local]
            name = "hub.example.net"
            numeric = "AA"
            description = "test"

            [[class]]
            name = "default"
            max_links = 10

            [[client]]
            host_mask = "*"
            class = "default"
            "#,
        )
        .unwrap();

        let (_new_policy, summary) = rehash(&snap, &mut dir, file.path()).unwrap();
        assert_eq!(summary.deopered.len(), 1);
        let bob = dir.lookup_by_numnick(&EntityId::User("AAAAA".to_string())).unwrap();
        assert!(!bob.user_data().unwrap().modes.contains(UserModes::OPER));
    }
}
