//! `PolicySnapshot`: the live, atomically-swappable policy (§4.4 Rehash, §5).

use std::collections::HashMap;

use super::conf_item::{ConfItem, ConfStatus};
use super::{ClassBlock, Config, CRuleConf, DenyConf, OperBlock, Quarantine, SecurityConfig};

/// The full admission policy in force at this moment. Built fresh on load
/// and on each rehash; never mutated in place except for the `clients`
/// refcount and `illegal` bit that admission/rehash maintain per §4.4/§9.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub local_name: String,
    pub local_numeric: String,
    pub local_description: String,
    pub classes: HashMap<String, ClassBlock>,
    pub conf_items: Vec<ConfItem>,
    pub opers: Vec<OperBlock>,
    pub deny: Vec<DenyConf>,
    pub crule: Vec<CRuleConf>,
    pub quarantine: Vec<Quarantine>,
    pub security: SecurityConfig,
    /// Monotonic id source for newly-minted `ConfItem`s; carried across rehashes
    /// so identity is stable for structurally-unchanged entries (R2).
    next_id: u64,
}

impl PolicySnapshot {
    /// Build the very first snapshot from a freshly-loaded config.
    pub fn from_config(config: &Config) -> Self {
        let mut next_id = 0u64;
        let mut conf_items = Vec::new();
        for block in &config.client {
            conf_items.push(ConfItem::from_block(next_id, ConfStatus::CLIENT, block));
            next_id += 1;
        }
        for block in &config.connect {
            conf_items.push(ConfItem::from_block(next_id, ConfStatus::CONNECT, block));
            next_id += 1;
        }
        for block in &config.uworld {
            conf_items.push(ConfItem::from_block(next_id, ConfStatus::UWORLD, block));
            next_id += 1;
        }

        Self {
            local_name: config.local.name.clone(),
            local_numeric: config.local.numeric.clone(),
            local_description: config.local.description.clone(),
            classes: config
                .class
                .iter()
                .map(|c| (c.name.clone(), c.clone()))
                .collect(),
            conf_items,
            opers: config.operator.clone(),
            deny: config.deny.clone(),
            crule: config.crule.clone(),
            quarantine: config.quarantine.clone(),
            security: config.security.clone(),
            next_id,
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassBlock> {
        self.classes.get(name)
    }

    /// Rehash diff per §4.4: mark every old entry with no structurally-identical
    /// counterpart in `new_config` as `CONF_ILLEGAL`, carry over live attachment
    /// counts for entries that *do* survive, then fold in any genuinely new
    /// entries. Returns the rehashed snapshot; the caller (rehash.rs) is
    /// responsible for detaching/reattaching already-connected clients against
    /// the result.
    pub fn rehash(&self, new_config: &Config) -> PolicySnapshot {
        let mut next_id = self.next_id;
        let mut merged = Vec::new();

        let mut fresh_id = |status, block: &super::ConfItemBlock| {
            let candidate = ConfItem::from_block(0, status, block);
            if let Some(existing) = self
                .conf_items
                .iter()
                .find(|old| !old.illegal && old.structurally_eq(&candidate))
            {
                let mut carried = candidate;
                carried.id = existing.id;
                carried.clients = existing.clients;
                carried
            } else {
                let id = next_id;
                next_id += 1;
                let mut fresh = candidate;
                fresh.id = id;
                fresh
            }
        };

        for block in &new_config.client {
            merged.push(fresh_id(ConfStatus::CLIENT, block));
        }
        for block in &new_config.connect {
            merged.push(fresh_id(ConfStatus::CONNECT, block));
        }
        for block in &new_config.uworld {
            merged.push(fresh_id(ConfStatus::UWORLD, block));
        }

        // Anything in the old snapshot with no counterpart above survives as
        // CONF_ILLEGAL until its last attached client departs (I5).
        for old in &self.conf_items {
            if !merged.iter().any(|m| m.id == old.id) {
                let mut dying = old.clone();
                dying.illegal = true;
                merged.push(dying);
            }
        }

        PolicySnapshot {
            local_name: new_config.local.name.clone(),
            local_numeric: new_config.local.numeric.clone(),
            local_description: new_config.local.description.clone(),
            classes: new_config
                .class
                .iter()
                .map(|c| (c.name.clone(), c.clone()))
                .collect(),
            conf_items: merged,
            opers: new_config.operator.clone(),
            deny: new_config.deny.clone(),
            crule: new_config.crule.clone(),
            quarantine: new_config.quarantine.clone(),
            security: new_config.security.clone(),
            next_id,
        }
    }

    /// Sweep `CONF_ILLEGAL` entries with zero attached clients (I5).
    pub fn reclaim_illegal(&mut self) -> usize {
        let before = self.conf_items.len();
        self.conf_items.retain(|item| !item.reclaimable());
        before - self.conf_items.len()
    }
}
