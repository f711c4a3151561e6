//! FIFO matchmaking queue.
//!
//! Pure arrival-order pairing: as soon as two clients are waiting, the two
//! oldest entries are popped and handed back to the caller to become a match.
//! No skill, region or priority matching.

use log::info;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

/// A client waiting to be paired.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub addr: SocketAddr,
    pub display_name: String,
    pub username: Option<String>,
    pub queued_at: Instant,
}

#[derive(Default)]
pub struct MatchQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Appends a waiting client. If the queue then holds two or more
    /// entries, removes and returns the two oldest for pairing; the first
    /// of the pair is the one that queued earlier.
    ///
    /// Re-joining while already waiting refreshes the entry's name without
    /// granting a second queue slot.
    pub fn enqueue(
        &mut self,
        addr: SocketAddr,
        display_name: String,
        username: Option<String>,
    ) -> Option<(QueueEntry, QueueEntry)> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.addr == addr) {
            existing.display_name = display_name;
            existing.username = username;
            return None;
        }

        info!("{} ({}) joined the queue", display_name, addr);
        self.entries.push_back(QueueEntry {
            addr,
            display_name,
            username,
            queued_at: Instant::now(),
        });

        if self.entries.len() >= 2 {
            let first = self.entries.pop_front()?;
            let second = self.entries.pop_front()?;
            Some((first, second))
        } else {
            None
        }
    }

    /// Removes a waiting client, normally because the connection dropped
    /// before pairing. Returns false if the client was not waiting.
    pub fn dequeue(&mut self, addr: SocketAddr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.addr != addr);
        if self.entries.len() < before {
            info!("{} left the queue", addr);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        self.entries.iter().any(|e| e.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
