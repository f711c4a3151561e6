//! Process-wide registry of live match sessions.
//!
//! Maps opaque match ids to session handles so inbound match-scoped packets
//! can be routed to the owning task. Sessions are inserted on pairing and
//! removed once their `Ended` outcome is processed; a message referencing an
//! unknown or already-ended id is simply dropped by the caller.

use crate::session::SessionHandle;
use log::{debug, info};
use std::collections::HashMap;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<u64, SessionHandle>,
    next_match_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_match_id: 1,
        }
    }

    /// Reserves the next opaque match id. Ids are unique for the lifetime
    /// of the process.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_match_id;
        self.next_match_id += 1;
        id
    }

    pub fn insert(&mut self, handle: SessionHandle) {
        info!("Registered match {}", handle.match_id);
        self.sessions.insert(handle.match_id, handle);
    }

    pub fn remove(&mut self, match_id: u64) -> Option<SessionHandle> {
        let removed = self.sessions.remove(&match_id);
        if removed.is_some() {
            info!("Deregistered match {}", match_id);
        } else {
            debug!("Match {} already deregistered", match_id);
        }
        removed
    }

    pub fn get(&self, match_id: u64) -> Option<&SessionHandle> {
        self.sessions.get(&match_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
