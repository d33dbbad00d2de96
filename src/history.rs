//! Bounded WHOWAS ring (§4.2, §4.6): recently-departed users, evicted by
//! insertion order once the ring fills.

use std::collections::VecDeque;
use std::time::SystemTime;

use crate::entity::Entity;

#[derive(Debug, Clone)]
pub struct WhowasEntry {
    pub nick: String,
    pub username: String,
    pub host: String,
    pub realname: String,
    pub departed_at: SystemTime,
}

/// A fixed-capacity ring, oldest entry evicted first. Visible to WHOWAS
/// queries only after the unregister that produced it completes (§5
/// "Whowas entries become visible only after unregister completes" — trivially
/// true here since `record` is only called from `Directory::unregister`).
pub struct WhowasHistory {
    capacity: usize,
    entries: VecDeque<WhowasEntry>,
}

impl WhowasHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, entity: &Entity) {
        let Some(data) = entity.user_data() else {
            return;
        };
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WhowasEntry {
            nick: entity.name.clone(),
            username: data.username.clone(),
            host: data.host.clone(),
            realname: data.realname.clone(),
            departed_at: SystemTime::now(),
        });
    }

    /// Most recent entries for `nick` first, case-folded match, capped at `count`
    /// (0 means "all available", per WHOWAS's optional count argument).
    pub fn query(&self, nick: &str, count: usize) -> Vec<&WhowasEntry> {
        let key = slirc_proto::irc_to_lower(nick);
        let limit = if count == 0 { usize::MAX } else { count };
        self.entries
            .iter()
            .rev()
            .filter(|e| slirc_proto::irc_to_lower(&e.nick) == key)
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
