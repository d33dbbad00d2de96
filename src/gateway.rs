//! The Gateway actor (§5 "Rust realization of single-threaded cooperative"):
//! one Tokio task owns every piece of shared core state — [`Directory`],
//! [`Pool<Connection>`], [`ChannelTable`], [`PolicySnapshot`], [`SendEngine`]
//! — and processes inbound events one at a time from an mpsc channel fed by
//! per-connection reader tasks. Per-connection tasks never touch core state
//! directly; they pass parsed lines in and drain queued `Bytes` out.
//!
//! Per-command business logic (NICK/JOIN/PRIVMSG semantics beyond what the
//! router needs) is out of scope (§1); this module wires together the three
//! in-scope subsystems — directory/lifecycle, admission, and the send
//! engine — around the scoped set of events: admission, registration,
//! channel membership changes, message fanout, disconnects, netsplits, and
//! rehash.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::admission::{self, AdmissionError, ClientCandidate};
use crate::channel::{ChannelTable, MemberFlags};
use crate::config::PolicySnapshot;
use crate::connection::Connection;
use crate::dialect::Arg;
use crate::directory::Directory;
use crate::entity::{Entity, EntityId, UserData, UserModes};
use crate::lifecycle;
use crate::numnick::UserNumnick;
use crate::pool::{Handle, Pool};
use crate::send::SendEngine;

/// Events the per-connection reader tasks and the listener feed into the
/// Gateway's single inbound channel. Each variant is one unit of work
/// processed to completion before the next is dequeued (§5 "one logical
/// execution context").
pub enum GatewayCommand {
    /// A new TCP connection completed its handshake's transport-level setup
    /// and is ready for admission.
    NewConnection {
        peer_addr: std::net::SocketAddr,
        sendq_limit: usize,
        reply: oneshot::Sender<Handle<Connection>>,
    },
    Join {
        who: EntityId,
        channel: String,
    },
    Part {
        who: EntityId,
        channel: String,
        reason: String,
    },
    Privmsg {
        from: EntityId,
        channel: String,
        text: String,
    },
    Quit {
        who: EntityId,
        reason: String,
    },
    Squit {
        server: EntityId,
        reason: String,
    },
    Rehash {
        path: PathBuf,
    },
    /// Bytes freshly read off the socket by a connection's reader task.
    /// Line-splitting and oversize rejection stay centralized in
    /// [`Connection::consume_line`] rather than duplicated per task.
    Inbound {
        handle: Handle<Connection>,
        bytes: Vec<u8>,
    },
    /// The reader task's socket read returned EOF or an error.
    Disconnected {
        handle: Handle<Connection>,
    },
    /// The DNS collaborator's reverse lookup for this connection's peer
    /// address completed (§5 "suspension points"); `None` on timeout or
    /// failure, in which case the IP literal stays the placeholder host.
    DnsResolved {
        handle: Handle<Connection>,
        host: Option<String>,
    },
    /// The writer task is ready to write; returns every chunk queued for
    /// `handle` at the moment of the call, in priority order, plus whether
    /// the connection is gone or marked dead (the writer's cue to shut down
    /// the socket after writing any final chunk, e.g. an `ERROR` line).
    DrainReady {
        handle: Handle<Connection>,
        reply: oneshot::Sender<DrainReply>,
    },
    /// Fired periodically by a ticker task; drives the lazy channel sweep,
    /// the mark-dead reaper, and ping-timeout checks (§4.6, §5).
    Tick,
}

/// Reply to [`GatewayCommand::DrainReady`].
pub struct DrainReply {
    pub chunks: Vec<Bytes>,
    /// The socket should be shut down after `chunks` is written: either the
    /// pool slot is already gone, or the connection was just marked dead
    /// (e.g. an admission-rejection `ERROR` line, or a sendq overflow).
    pub closed: bool,
}

/// Handshake state for a connection that has not yet completed NICK+USER
/// (§3 "Unregistered"). Connections are not directory entities until both
/// are present and admission succeeds.
#[derive(Default)]
struct PendingRegistration {
    nick: Option<String>,
    user: Option<(String, String)>, // (username, realname)
    /// Result of the ident lookup started on accept (§6 "Authentication");
    /// `None` under the default no-op collaborator.
    ident: Option<String>,
    /// Reverse-DNS hostname, if the lookup completed before registration did
    /// (§6 "DNS resolver"); `None` falls back to the IP literal.
    host: Option<String>,
}

/// Owns every piece of shared core state and drains [`GatewayCommand`]s
/// one at a time.
pub struct Gateway {
    pub directory: Directory,
    pub channels: ChannelTable,
    pub connections: Pool<Connection>,
    pub policy: PolicySnapshot,
    pub send: SendEngine,
    pub server_name: String,
    pub server_numeric: String,
    config_path: PathBuf,
    next_user_seq: u32,
    ping_timeout: Duration,
    registration_timeout: Duration,
    /// Reverse index from a locally-attached connection to the entity it
    /// belongs to, so inbound lines can be routed without a directory scan.
    conn_index: HashMap<Handle<Connection>, EntityId>,
    pending: HashMap<Handle<Connection>, PendingRegistration>,
    /// Every acquired handle not yet promoted into `conn_index` (§3
    /// "Unregistered"), whether or not it has sent a NICK/USER line yet.
    /// Reaped by `reap_pending` on registration timeout or admission
    /// rejection — `pending`'s keys are a subset of this set.
    unregistered: std::collections::HashSet<Handle<Connection>>,
    ident: Box<dyn crate::ident::IdentLookup>,
}

impl Gateway {
    pub fn new(
        policy: PolicySnapshot,
        config_path: PathBuf,
        server_name: String,
        server_numeric: String,
        ping_timeout: Duration,
        registration_timeout: Duration,
    ) -> Self {
        let mut directory = Directory::new(1024);
        directory
            .register(Entity::new_me(server_numeric.clone(), server_name.clone()))
            .expect("local server entity registers uniquely at startup");
        Self {
            directory,
            channels: ChannelTable::new(),
            connections: Pool::new(),
            policy,
            send: SendEngine::new(),
            server_name,
            server_numeric,
            config_path,
            next_user_seq: 0,
            ping_timeout,
            registration_timeout,
            conn_index: HashMap::new(),
            pending: HashMap::new(),
            unregistered: std::collections::HashSet::new(),
            ident: Box::new(crate::ident::NoopIdentLookup),
        }
    }

    /// Drains `rx` until the channel closes (every sender dropped, i.e. the
    /// listener and all reader tasks have gone away).
    pub async fn run(mut self, mut rx: mpsc::Receiver<GatewayCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        info!("gateway command channel closed, shutting down");
    }

    fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::NewConnection { peer_addr, sendq_limit, reply } => {
                let handle = self.connections.acquire(Connection::new(peer_addr, sendq_limit));
                self.unregistered.insert(handle);
                let ident = self.ident.auth_start(peer_addr);
                self.pending.entry(handle).or_default().ident = ident;
                let _ = reply.send(handle);
            }
            GatewayCommand::Join { who, channel } => self.join(&who, &channel),
            GatewayCommand::Part { who, channel, reason } => self.part(&who, &channel, &reason),
            GatewayCommand::Privmsg { from, channel, text } => self.privmsg_channel(&from, &channel, &text),
            GatewayCommand::Quit { who, reason } => self.quit(&who, &reason),
            GatewayCommand::Squit { server, reason } => self.squit(&server, &reason),
            GatewayCommand::Rehash { path } => self.rehash(&path),
            GatewayCommand::Inbound { handle, bytes } => self.inbound(handle, &bytes),
            GatewayCommand::Disconnected { handle } => self.disconnected(handle),
            GatewayCommand::DnsResolved { handle, host } => {
                if let Some(pending) = self.pending.get_mut(&handle) {
                    pending.host = host;
                }
            }
            GatewayCommand::DrainReady { handle, reply } => {
                let result = self.drain_ready(handle);
                let _ = reply.send(result);
            }
            GatewayCommand::Tick => self.tick(),
        }
    }

    /// Feeds freshly-read bytes into `handle`'s receive buffer and processes
    /// every complete line now available.
    fn inbound(&mut self, handle: Handle<Connection>, bytes: &[u8]) {
        if let Some(conn) = self.connections.get_mut(handle) {
            conn.feed(bytes);
        } else {
            return;
        }
        loop {
            let Some(conn) = self.connections.get_mut(handle) else { return };
            let Some(result) = conn.consume_line() else { break };
            match result {
                Ok(line) => self.dispatch_line(handle, &line),
                Err(reason) => {
                    if let Some(conn) = self.connections.get_mut(handle) {
                        conn.mark_dead(reason);
                    }
                    break;
                }
            }
        }
    }

    /// Parses one raw line and routes it to the scoped operation it names.
    /// Only the commands this core actually implements end-to-end are
    /// dispatched; anything else is silently ignored rather than growing a
    /// full per-command handler table (out of scope, §1).
    fn dispatch_line(&mut self, handle: Handle<Connection>, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            return;
        };
        let Ok(message) = text.parse::<slirc_proto::Message>() else {
            return;
        };

        if let Some(id) = self.conn_index.get(&handle).cloned() {
            self.dispatch_registered(&id, message.command);
            return;
        }

        self.dispatch_handshake(handle, message.command);
    }

    fn dispatch_registered(&mut self, from: &EntityId, command: slirc_proto::Command) {
        use slirc_proto::Command;
        match command {
            Command::JOIN(channels, _, _) => {
                for channel in channels.split(',') {
                    self.join(from, channel);
                }
            }
            Command::PART(channels, reason) => {
                let reason = reason.unwrap_or_default();
                for channel in channels.split(',') {
                    self.part(from, channel, &reason);
                }
            }
            Command::PRIVMSG(target, text) => {
                if target.starts_with('#') || target.starts_with('&') {
                    self.privmsg_channel(from, &target, &text);
                }
            }
            Command::QUIT(reason) => {
                self.quit(from, &reason.unwrap_or_else(|| "Client Quit".to_string()));
            }
            Command::PING(token, _) => {
                self.send.send_prio_to_one(
                    &mut self.connections,
                    &self.directory,
                    &EntityId::Server(self.server_numeric.clone()),
                    "PONG",
                    "Z",
                    from,
                    &[Arg::Str(self.server_name.clone()), Arg::Str(token)],
                );
            }
            _ => {}
        }
    }

    fn dispatch_handshake(&mut self, handle: Handle<Connection>, command: slirc_proto::Command) {
        use slirc_proto::Command;
        let entry = self.pending.entry(handle).or_default();
        match command {
            Command::NICK(nick) => entry.nick = Some(nick),
            Command::USER(username, _mode, realname) => entry.user = Some((username, realname)),
            _ => return,
        }

        let Some(pending) = self.pending.get(&handle) else { return };
        let (Some(nick), Some((username, realname))) = (pending.nick.clone(), pending.user.clone()) else {
            return;
        };
        // A resolved ident overrides the client-supplied username, same as
        // every other ircd that speaks ident (§6 "Authentication").
        let username = pending.ident.clone().unwrap_or(username);
        // Reverse-DNS hostname if the lookup finished in time, else the IP
        // literal placeholder (§5 "Cancellation and timeouts").
        let host = pending.host.clone();
        let Some(conn) = self.connections.get(handle) else { return };
        let peer_addr = conn.peer_addr;
        let ip = peer_addr.ip();
        let host = host.unwrap_or_else(|| ip.to_string());

        match self.register_client(handle, &nick, &username, &host, ip, &realname) {
            Ok(id) => {
                self.conn_index.insert(handle, id);
                self.pending.remove(&handle);
                self.unregistered.remove(&handle);
                self.ident.destroy_auth(peer_addr);
            }
            Err(err) => {
                debug!(%nick, error = %err, "registration rejected");
                if let Some(conn) = self.connections.get_mut(handle) {
                    let reason = err.close_reason();
                    let line = format!("ERROR :Closing Link: {nick}[{host}] ({reason})\r\n");
                    conn.enqueue(Bytes::from(line), true);
                    conn.mark_dead(reason);
                }
                self.pending.remove(&handle);
                self.ident.destroy_auth(peer_addr);
            }
        }
    }

    fn disconnected(&mut self, handle: Handle<Connection>) {
        if self.pending.remove(&handle).is_some() {
            if let Some(conn) = self.connections.get(handle) {
                self.ident.destroy_auth(conn.peer_addr);
            }
        }
        if let Some(id) = self.conn_index.remove(&handle) {
            if matches!(id, EntityId::Server(_)) {
                self.squit(&id, "Connection closed");
            } else {
                self.quit(&id, "Connection closed");
            }
        } else if let Some(conn) = self.connections.get_mut(handle) {
            conn.mark_dead("Connection closed");
        }
    }

    fn drain_ready(&mut self, handle: Handle<Connection>) -> DrainReply {
        let Some(conn) = self.connections.get_mut(handle) else {
            return DrainReply { chunks: Vec::new(), closed: true };
        };
        let mut chunks = Vec::new();
        while let Some(chunk) = conn.pop_ready() {
            chunks.push(chunk);
        }
        let closed = conn.is_dead();
        DrainReply { chunks, closed }
    }

    fn clients_from_ip(&self, ip: IpAddr) -> u32 {
        self.directory
            .iterate_local_users()
            .filter(|e| e.user_data().is_some_and(|d| d.ip == ip))
            .count() as u32
    }

    /// Runs `check_client` (§4.4), and on success mints a numnick, builds
    /// the `UserData`, and registers the new entity (§3 Lifecycle:
    /// Unregistered → User on successful admission).
    fn register_client(
        &mut self,
        handle: Handle<Connection>,
        nick: &str,
        username: &str,
        host: &str,
        ip: IpAddr,
        realname: &str,
    ) -> Result<EntityId, AdmissionError> {
        let candidate = ClientCandidate {
            username,
            host,
            ip,
            realname,
        };
        let from_ip = self.clients_from_ip(ip);
        let conf_id = admission::check_client(&mut self.policy, &candidate, from_ip).map_err(|err| {
            crate::metrics::ADMISSION_REJECTED.with_label_values(&[err.label()]).inc();
            err
        })?;

        let numnick = UserNumnick::new(&self.server_numeric, self.next_user_seq)
            .unwrap_or_else(|_| panic!("user id space exhausted for server {}", self.server_numeric));
        self.next_user_seq += 1;

        let me = EntityId::Server(self.server_numeric.clone());
        let cloaked_host = crate::security::cloaking::cloak_ip_hmac_with_suffix(
            &ip,
            &self.policy.security.cloak_secret,
            &self.policy.security.cloak_suffix,
        );
        let data = UserData {
            username: username.to_string(),
            realname: realname.to_string(),
            host: cloaked_host,
            ip,
            modes: UserModes::empty(),
            channels: std::collections::HashSet::new(),
            ratelimit: crate::entity::TargetRatelimit::default(),
            account: None,
            oper_conf_id: Some(conf_id),
            sno_mask: crate::entity::SnoMask::empty(),
        };
        let entity = Entity::new_local_user(numnick, nick.to_string(), me, data, handle);
        let id = entity.id.clone();
        if let Err(err) = self.directory.register(entity) {
            admission::detach(&mut self.policy, conf_id);
            warn!(nick, error = %err, "registration failed after admission succeeded");
            return Err(AdmissionError::AlreadyAuthorized);
        }

        self.send.send_reply(
            &mut self.connections,
            &self.directory,
            &self.server_name,
            &id,
            1,
            &[Arg::Str(nick.to_string())],
        );
        info!(entity = %id, nick, "client registered");
        Ok(id)
    }

    fn join(&mut self, who: &EntityId, channel_name: &str) {
        let Some(entity) = self.directory.lookup_by_numnick(who) else {
            return;
        };
        if entity.user_data().is_none() {
            return;
        }
        self.channels.get_or_create(channel_name).join(who.clone(), MemberFlags::empty());
        if let Some(e) = self.directory.lookup_by_numnick_mut(who) {
            if let Some(data) = e.user_data_mut() {
                data.channels.insert(slirc_proto::irc_to_lower(channel_name));
            }
        }
        self.send.send_to_servers_but(
            &mut self.connections,
            &self.directory,
            who,
            "JOIN",
            "J",
            None,
            &[Arg::Channel(channel_name.to_string())],
        );
        self.send.send_to_channel_but_one(
            &mut self.connections,
            &self.directory,
            &self.channels,
            who,
            "JOIN",
            "J",
            channel_name,
            None,
            crate::send::SkipFlags::empty(),
            &[Arg::Channel(channel_name.to_string())],
        );
    }

    fn part(&mut self, who: &EntityId, channel_name: &str, reason: &str) {
        self.send.send_to_channel_but_one(
            &mut self.connections,
            &self.directory,
            &self.channels,
            who,
            "PART",
            "L",
            channel_name,
            None,
            crate::send::SkipFlags::empty(),
            &[Arg::Channel(channel_name.to_string()), Arg::Str(reason.to_string())],
        );
        self.send.send_to_servers_but(
            &mut self.connections,
            &self.directory,
            who,
            "PART",
            "L",
            None,
            &[Arg::Channel(channel_name.to_string()), Arg::Str(reason.to_string())],
        );
        if let Some(channel) = self.channels.get_mut(channel_name) {
            channel.part(who);
        }
        if let Some(e) = self.directory.lookup_by_numnick_mut(who) {
            if let Some(data) = e.user_data_mut() {
                data.channels.remove(&slirc_proto::irc_to_lower(channel_name));
            }
        }
    }

    fn privmsg_channel(&mut self, from: &EntityId, channel_name: &str, text: &str) {
        self.send.send_to_channel_but_one(
            &mut self.connections,
            &self.directory,
            &self.channels,
            from,
            "PRIVMSG",
            "P",
            channel_name,
            Some(from),
            crate::send::SkipFlags::empty(),
            &[Arg::Channel(channel_name.to_string()), Arg::Str(text.to_string())],
        );
    }

    fn quit(&mut self, who: &EntityId, reason: &str) {
        lifecycle::exit_client(
            &mut self.connections,
            &mut self.directory,
            &mut self.channels,
            &mut self.policy,
            &mut self.send,
            who,
            reason,
        );
        self.conn_index.retain(|_, id| *id != *who);
    }

    fn squit(&mut self, server: &EntityId, reason: &str) {
        let removed = lifecycle::exit_server(
            &mut self.connections,
            &mut self.directory,
            &mut self.channels,
            &mut self.policy,
            &mut self.send,
            server,
            reason,
        );
        lifecycle::announce_netsplit_quits(
            &mut self.connections,
            &self.directory,
            &self.channels,
            &mut self.send,
            &removed,
            reason,
        );
        crate::metrics::NETSPLIT_QUITS.inc_by(removed.len() as u64);
        let removed_ids: std::collections::HashSet<&EntityId> = removed.iter().map(|e| &e.id).collect();
        self.conn_index.retain(|_, id| !removed_ids.contains(&*id) && *id != *server);
    }

    fn rehash(&mut self, path: &std::path::Path) {
        match crate::rehash::rehash(&self.policy, &mut self.directory, path) {
            Ok((new_policy, summary)) => {
                self.policy = new_policy;
                crate::metrics::REHASH_SUCCESS.inc();
                crate::metrics::REHASH_DEOPERED.inc_by(summary.deopered.len() as u64);
                for id in &summary.deopered {
                    self.send.send_opmask_notice(
                        &mut self.connections,
                        &self.directory,
                        &self.server_name,
                        None,
                        crate::entity::SnoMask::OLD,
                        &format!("{id} deopered by rehash"),
                    );
                }
                info!(
                    added = summary.added,
                    removed = summary.removed,
                    deopered = summary.deopered.len(),
                    "rehash applied"
                );
            }
            Err(err) => {
                crate::metrics::REHASH_FAILURE.inc();
                warn!(error = %err, "rehash failed, retaining previous snapshot");
                self.send.send_opmask_notice(
                    &mut self.connections,
                    &self.directory,
                    &self.server_name,
                    None,
                    crate::entity::SnoMask::REHASH,
                    &format!("rehash failed: {err}"),
                );
            }
        }
    }

    /// §4.6 / §5: lazy empty-channel sweep, mark-dead reap, and idle/ping
    /// timeout enforcement, run once per tick rather than inline at the
    /// mutation site that might have caused them.
    fn tick(&mut self) {
        let swept = self.channels.sweep_empty();
        if swept > 0 {
            info!(swept, "channel sweep reclaimed empty channels");
        }
        self.reap_dead();
        self.reap_pending();
        self.check_timeouts();
        self.report_gauges();
    }

    /// Releases pool slots for connections that never completed registration:
    /// admission-rejected (already marked dead by `dispatch_handshake`), past
    /// `registration_timeout`, or orphaned (pool slot already gone). Run
    /// after `reap_dead` so a client's final `ERROR` line has had at least
    /// one writer-poll interval to drain before its slot is released (§4.3,
    /// §5 "post-tick reaper").
    fn reap_pending(&mut self) {
        let now = Instant::now();
        let registration_timeout = self.registration_timeout;
        let mut to_remove = Vec::new();
        for &handle in &self.unregistered {
            let Some(conn) = self.connections.get_mut(handle) else {
                to_remove.push(handle);
                continue;
            };
            if !conn.is_dead() && now.duration_since(conn.registration_started) > registration_timeout {
                conn.mark_dead("Registration timeout");
            }
            if conn.is_dead() {
                to_remove.push(handle);
            }
        }
        for handle in to_remove {
            self.unregistered.remove(&handle);
            if self.pending.remove(&handle).is_some() {
                if let Some(conn) = self.connections.get(handle) {
                    self.ident.destroy_auth(conn.peer_addr);
                }
            }
            self.connections.release(handle);
        }
    }

    fn report_gauges(&self) {
        let local_users = self.directory.iterate_local_users().count() as i64;
        let linked_servers = self
            .directory
            .iterate_all()
            .filter(|e| e.status.is_server() && !matches!(e.status, crate::entity::Status::Me))
            .count() as i64;
        crate::metrics::LOCAL_USERS.set(local_users);
        crate::metrics::LINKED_SERVERS.set(linked_servers);
        crate::metrics::ACTIVE_CHANNELS.set(self.channels.len() as i64);
    }

    fn reap_dead(&mut self) {
        let dead: Vec<(EntityId, bool, String)> = self
            .directory
            .iterate_all()
            .filter_map(|e| {
                let handle = e.connection?;
                let conn = self.connections.get(handle)?;
                let reason = conn.dead.clone()?;
                Some((e.id.clone(), e.status.is_server(), reason))
            })
            .collect();

        for (id, is_server, reason) in dead {
            if reason == "SendQ exceeded" {
                crate::metrics::SENDQ_EXCEEDED.inc();
            }
            if is_server {
                self.squit(&id, &reason);
            } else {
                self.quit(&id, &reason);
            }
        }
    }

    fn check_timeouts(&mut self) {
        let now = Instant::now();
        let ping_timeout = self.ping_timeout;
        let timed_out: Vec<EntityId> = self
            .directory
            .iterate_local_users()
            .filter_map(|e| {
                let handle = e.connection?;
                let conn = self.connections.get(handle)?;
                (now.duration_since(conn.last_activity) > ping_timeout).then(|| e.id.clone())
            })
            .collect();

        for id in &timed_out {
            if let Some(handle) = self.directory.lookup_by_numnick(id).and_then(|e| e.connection) {
                if let Some(conn) = self.connections.get_mut(handle) {
                    conn.mark_dead("Ping timeout");
                }
            }
        }
        if !timed_out.is_empty() {
            self.reap_dead();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn test_gateway() -> Gateway {
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
        let policy = PolicySnapshot::from_config(&config);
        Gateway::new(
            policy,
            PathBuf::from("test.toml"),
            "hub.example.net".to_string(),
            "AA".to_string(),
            Duration::from_secs(180),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn register_client_succeeds_and_assigns_numnick() {
        let mut gw = test_gateway();
        let addr: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let handle = gw.connections.acquire(Connection::new(addr, 65536));
        let id = gw
            .register_client(handle, "alice", "a", "host.example", "127.0.0.1".parse().unwrap(), "Alice")
            .unwrap();
        assert!(matches!(id, EntityId::User(_)));
        assert!(gw.directory.lookup_by_numnick(&id).is_some());
    }

    #[test]
    fn join_then_part_updates_both_sides() {
        let mut gw = test_gateway();
        let addr: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let handle = gw.connections.acquire(Connection::new(addr, 65536));
        let id = gw
            .register_client(handle, "alice", "a", "host.example", "127.0.0.1".parse().unwrap(), "Alice")
            .unwrap();

        gw.join(&id, "#ops");
        assert!(gw.channels.get("#ops").unwrap().is_member(&id));
        assert!(gw.directory.lookup_by_numnick(&id).unwrap().user_data().unwrap().channels.contains("#ops"));

        gw.part(&id, "#ops", "bye");
        assert!(!gw.channels.get("#ops").unwrap().is_member(&id));
    }

    #[test]
    fn tick_sweeps_empty_channel_after_part() {
        let mut gw = test_gateway();
        let addr: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let handle = gw.connections.acquire(Connection::new(addr, 65536));
        let id = gw
            .register_client(handle, "alice", "a", "host.example", "127.0.0.1".parse().unwrap(), "Alice")
            .unwrap();
        gw.join(&id, "#ops");
        gw.part(&id, "#ops", "bye");
        gw.tick();
        assert!(gw.channels.get("#ops").is_none());
    }

    #[test]
    fn quit_removes_entity_from_directory() {
        let mut gw = test_gateway();
        let addr: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let handle = gw.connections.acquire(Connection::new(addr, 65536));
        let id = gw
            .register_client(handle, "alice", "a", "host.example", "127.0.0.1".parse().unwrap(), "Alice")
            .unwrap();
        gw.quit(&id, "bye");
        assert!(gw.directory.lookup_by_numnick(&id).is_none());
    }
}
