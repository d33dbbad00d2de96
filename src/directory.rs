//! Directory: global name → entity mapping (§4.2).
//!
//! The directory is the sole owner of [`Entity`] records (§9 "Cross-linked
//! graph"); every cross-reference elsewhere in the core is an [`EntityId`]
//! resolved back through here, never a borrowed or owning pointer.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::entity::{Entity, EntityId, Status};
use crate::history::WhowasHistory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("name `{0}` is already registered")]
    NameCollision(String),
}

/// Case-folded name → entity id index, plus the numnick index and the backing
/// entity store. Operations are O(1) expected (`HashMap`), matching §4.2.
pub struct Directory {
    by_name: HashMap<String, EntityId>,
    by_numnick: HashMap<EntityId, EntityId>,
    entities: HashMap<EntityId, Entity>,
    pub whowas: WhowasHistory,
}

fn casefold(name: &str) -> String {
    slirc_proto::irc_to_lower(name)
}

impl Directory {
    pub fn new(whowas_capacity: usize) -> Self {
        Self {
            by_name: HashMap::new(),
            by_numnick: HashMap::new(),
            entities: HashMap::new(),
            whowas: WhowasHistory::new(whowas_capacity),
        }
    }

    /// I2: at most one live entity per case-folded name, and per numnick.
    /// Identical-timestamp nick collisions (B3) are the caller's
    /// responsibility to detect before calling register — this just refuses
    /// the second registration.
    pub fn register(&mut self, entity: Entity) -> Result<(), DirectoryError> {
        let key = casefold(&entity.name);
        if self.by_name.contains_key(&key) {
            return Err(DirectoryError::NameCollision(entity.name.clone()));
        }
        if self.by_numnick.contains_key(&entity.id) {
            return Err(DirectoryError::NameCollision(entity.id.to_string()));
        }
        self.by_name.insert(key, entity.id.clone());
        self.by_numnick.insert(entity.id.clone(), entity.id.clone());
        info!(name = %entity.name, id = %entity.id, "entity registered");
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Remove `id` from every index. Users are appended to whowas (§4.2).
    pub fn unregister(&mut self, id: &EntityId) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.by_name.remove(&casefold(&entity.name));
        self.by_numnick.remove(id);
        if matches!(entity.status, Status::LocalUser | Status::RemoteUser) {
            self.whowas.record(&entity);
        }
        info!(name = %entity.name, id = %id, "entity unregistered");
        Some(entity)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Entity> {
        let key = casefold(name);
        self.by_name.get(&key).and_then(|id| self.entities.get(id))
    }

    pub fn lookup_by_numnick(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn lookup_by_numnick_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn iterate_servers(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.status.is_server())
    }

    pub fn iterate_local_users(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(|e| matches!(e.status, Status::LocalUser))
    }

    pub fn iterate_all(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// §4.2 "Topology maintenance": when an SQUIT removes the link through
    /// `departed`, every entity whose upstream chain traverses it is removed
    /// in one pass (S3). Returns the ids of every entity removed, in
    /// unspecified order — the caller fans out QUITs/SQUITs for each.
    pub fn netsplit(&mut self, departed: &EntityId) -> Vec<Entity> {
        let mut victims = Vec::new();
        loop {
            let next: Option<EntityId> = self
                .entities
                .iter()
                .find(|(id, e)| {
                    *id != departed
                        && e.upstream
                            .as_ref()
                            .is_some_and(|up| up == departed || victims.iter().any(|v: &Entity| &v.id == up))
                })
                .map(|(id, _)| id.clone());
            match next {
                Some(id) => {
                    if let Some(entity) = self.unregister(&id) {
                        victims.push(entity);
                    }
                }
                None => break,
            }
        }
        if let Some(root) = self.unregister(departed) {
            warn!(server = %root.name, affected = victims.len(), "netsplit");
            victims.push(root);
        }
        victims
    }

    /// I1: following `upstream` from `id` terminates at Me in ≤ `max_hops` steps.
    pub fn path_to_me(&self, id: &EntityId, max_hops: usize) -> Option<Vec<EntityId>> {
        let mut path = vec![id.clone()];
        let mut current = id.clone();
        for _ in 0..max_hops {
            let entity = self.entities.get(&current)?;
            match &entity.upstream {
                None => return Some(path),
                Some(up) => {
                    current = up.clone();
                    path.push(current.clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Kind, ServerData, ServerModes, Status};
    use std::time::SystemTime;

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
    fn register_then_lookup_by_name_and_numnick() {
        let mut dir = Directory::new(10);
        let me = server_entity("AA", "hub.example.net", None);
        dir.register(me).unwrap();
        assert!(dir.lookup_by_name("HUB.EXAMPLE.NET").is_some());
        assert!(dir
            .lookup_by_numnick(&EntityId::Server("AA".to_string()))
            .is_some());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut dir = Directory::new(10);
        dir.register(server_entity("AA", "hub.example.net", None))
            .unwrap();
        let err = dir.register(server_entity("AB", "HUB.example.net", None));
        assert_eq!(
            err,
            Err(DirectoryError::NameCollision("HUB.example.net".to_string()))
        );
    }

    #[test]
    fn netsplit_removes_transitive_children() {
        let mut dir = Directory::new(10);
        let me = EntityId::Server("AA".to_string());
        dir.register(server_entity("AA", "me.example.net", None))
            .unwrap();
        dir.register(server_entity("AB", "leaf1.example.net", Some(me.clone())))
            .unwrap();
        dir.register(server_entity(
            "AC",
            "leaf2.example.net",
            Some(EntityId::Server("AB".to_string())),
        ))
        .unwrap();

        let victims = dir.netsplit(&EntityId::Server("AB".to_string()));
        assert_eq!(victims.len(), 2);
        assert!(dir
            .lookup_by_numnick(&EntityId::Server("AC".to_string()))
            .is_none());
        assert!(dir.lookup_by_numnick(&me).is_some());
    }

    #[test]
    fn path_to_me_terminates() {
        let mut dir = Directory::new(10);
        let me = EntityId::Server("AA".to_string());
        dir.register(server_entity("AA", "me.example.net", None))
            .unwrap();
        dir.register(server_entity("AB", "leaf.example.net", Some(me)))
            .unwrap();
        let path = dir.path_to_me(&EntityId::Server("AB".to_string()), 8);
        assert_eq!(path.unwrap().len(), 2);
    }
}
