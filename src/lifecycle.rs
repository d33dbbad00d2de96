//! Lifecycle controller (§4.7): `exit_client`/`exit_server` and the
//! `remove_from_list` teardown sequence (§3 "Lifecycle").

use tracing::info;

use crate::admission;
use crate::channel::ChannelTable;
use crate::config::PolicySnapshot;
use crate::connection::Connection;
use crate::dialect::Arg;
use crate::directory::Directory;
use crate::entity::{Entity, EntityId, Kind};
use crate::pool::Pool;
use crate::send::SendEngine;

/// Runs the fixed teardown order from §3: announce, detach from channels,
/// unlink from the directory (which also records whowas), detach ConfItems,
/// release the pool slot. Must tolerate re-entry (§4.7): this function
/// itself never closes another connection mid-iteration — fanout only marks
/// peers dead, the post-tick reaper closes them (see `gateway::reap_dead`).
pub fn exit_client(
    pool: &mut Pool<Connection>,
    directory: &mut Directory,
    channels: &mut ChannelTable,
    policy: &mut PolicySnapshot,
    send: &mut SendEngine,
    victim: &EntityId,
    reason: &str,
) {
    let Some(entity) = directory.lookup_by_numnick(victim) else {
        return;
    };
    let display_name = entity.name.clone();
    let conf_id = entity.user_data().and_then(|d| d.oper_conf_id);
    let member_channels: Vec<String> = entity
        .user_data()
        .map(|d| d.channels.iter().cloned().collect())
        .unwrap_or_default();
    let connection_handle = entity.connection;

    // 1. Announce to peers before any state mutation, per §5 ordering
    //    guarantees ("broadcast of an event enqueued before processing the
    //    next line from any link").
    send.send_to_servers_but(pool, directory, victim, "QUIT", "Q", None, &[Arg::Str(reason.to_string())]);
    send.send_to_common_channels(pool, directory, channels, victim, "QUIT", "Q", &[Arg::Str(reason.to_string())]);

    // 2. Detach from channels, destroying empties lazily (handled by the
    //    gateway's per-tick sweep, not here).
    for chan_name in &member_channels {
        if let Some(channel) = channels.get_mut(chan_name) {
            channel.part(victim);
        }
    }

    // 3. Unlink from directory (records whowas for users).
    directory.unregister(victim);

    // 4. Detach ConfItem attachment.
    if let Some(conf_id) = conf_id {
        admission::detach(policy, conf_id);
    }

    // 5. Release the Connection slot back to the pool.
    if let Some(handle) = connection_handle {
        pool.release(handle);
    }

    info!(entity = %victim, name = %display_name, reason, "client exited");
}

/// §4.7 `exit_client`'s server counterpart: fans out SQUIT, then performs a
/// netsplit removing every transitively-downstream entity.
pub fn exit_server(
    pool: &mut Pool<Connection>,
    directory: &mut Directory,
    channels: &mut ChannelTable,
    policy: &mut PolicySnapshot,
    send: &mut SendEngine,
    victim: &EntityId,
    reason: &str,
) -> Vec<Entity> {
    let Some(entity) = directory.lookup_by_numnick(victim) else {
        return Vec::new();
    };
    let display_name = entity.name.clone();
    let connection_handle = entity.connection;

    send.send_to_servers_but(pool, directory, victim, "SQUIT", "SQ", None, &[Arg::Str(reason.to_string())]);

    let removed = directory.netsplit(victim);
    for victim_entity in &removed {
        for chan_name in victim_entity
            .user_data()
            .map(|d| d.channels.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
        {
            if let Some(channel) = channels.get_mut(&chan_name) {
                channel.part(&victim_entity.id);
            }
        }
        if let Some(conf_id) = victim_entity.user_data().and_then(|d| d.oper_conf_id) {
            admission::detach(policy, conf_id);
        }
        if let Some(conf_id) = victim_entity.server_data().and_then(|s| s.conf_id) {
            admission::detach(policy, conf_id);
        }
        if let Some(handle) = victim_entity.connection {
            pool.release(handle);
        }
    }

    if let Some(handle) = connection_handle {
        pool.release(handle);
    }

    info!(entity = %victim, name = %display_name, affected = removed.len(), reason, "server link exited");
    removed
}

/// Announces a netsplit-driven QUIT for every removed user to each remaining
/// local user who shared a channel with them (S3). Called after
/// `exit_server`'s directory mutation, before its `removed` vec is dropped.
pub fn announce_netsplit_quits(
    pool: &mut Pool<Connection>,
    directory: &Directory,
    channels: &ChannelTable,
    send: &mut SendEngine,
    removed: &[Entity],
    split_reason: &str,
) {
    for entity in removed {
        if !matches!(entity.kind, Kind::User(_)) {
            continue;
        }
        send.send_to_common_channels_for_departed(
            pool,
            directory,
            channels,
            entity,
            "QUIT",
            "Q",
            &[Arg::Str(split_reason.to_string())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ServerData, ServerModes, Status};
    use std::time::SystemTime;

    fn make_policy() -> PolicySnapshot {
        let config: crate::config::Config = toml::from_str(
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
        PolicySnapshot::from_config(&config)
    }

    fn server_entity(id: &str, name: &str, upstream: Option<EntityId>) -> Entity {
        let now = SystemTime::now();
        Entity {
            id: EntityId::Server(id.to_string()),
            name: name.to_string(),
            status: if upstream.is_none() {
                Status::Me
            } else {
                Status::RemoteServer
            },
            upstream,
            first_seen: now,
            last_activity: now,
            kind: Kind::Server(ServerData {
                hopcount: 0,
                description: String::new(),
                modes: ServerModes::empty(),
                conf_id: None,
                children: Vec::new(),
            }),
            connection: None,
        }
    }

    #[test]
    fn exit_server_removes_downstream_entities() {
        let mut pool = Pool::new();
        let mut dir = Directory::new(10);
        let me = EntityId::Server("AA".to_string());
        dir.register(server_entity("AA", "me.example.net", None))
            .unwrap();
        dir.register(server_entity("AB", "leaf.example.net", Some(me)))
            .unwrap();
        let mut channels = ChannelTable::new();
        let mut policy = make_policy();
        let mut send = SendEngine::new();

        let removed = exit_server(
            &mut pool,
            &mut dir,
            &mut channels,
            &mut policy,
            &mut send,
            &EntityId::Server("AB".to_string()),
            "*.net *.split",
        );
        assert_eq!(removed.len(), 1);
        assert!(dir
            .lookup_by_numnick(&EntityId::Server("AB".to_string()))
            .is_none());
    }
}
