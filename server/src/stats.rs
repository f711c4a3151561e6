//! Player stats and achievement tracking.
//!
//! The match layer only reports "match ended, this player won/lost"; this
//! module folds those reports into per-user counters and unlocks
//! achievements when their thresholds are crossed. How (or whether) the data
//! is persisted is the auth service's concern, not the core's; this store
//! keeps everything in memory.

use log::info;
use std::collections::{HashMap, HashSet};

pub const ACHIEVEMENT_FIRST_GAME: &str = "first_game";
pub const ACHIEVEMENT_FIRST_WIN: &str = "first_win";
pub const ACHIEVEMENT_MULTIPLAYER_MASTER: &str = "multiplayer_master";

/// Online wins required for `multiplayer_master`.
pub const MULTIPLAYER_MASTER_TARGET: u32 = 10;

fn achievement_points(id: &str) -> u32 {
    match id {
        ACHIEVEMENT_FIRST_GAME => 10,
        ACHIEVEMENT_FIRST_WIN => 50,
        ACHIEVEMENT_MULTIPLAYER_MASTER => 100,
        _ => 0,
    }
}

#[derive(Debug, Default, Clone)]
pub struct UserStats {
    pub games_played: u32,
    pub games_won: u32,
    pub multiplayer_wins: u32,
    pub achievement_points: u32,
    pub unlocked: HashSet<String>,
}

/// In-memory per-user stats, keyed by authenticated username.
#[derive(Default)]
pub struct StatsStore {
    users: HashMap<String, UserStats>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    /// Folds one finished match into a user's stats and returns any
    /// achievements newly unlocked by it.
    pub fn record_match_result(&mut self, username: &str, won: bool) -> Vec<&'static str> {
        let stats = self.users.entry(username.to_string()).or_default();

        stats.games_played += 1;
        if won {
            stats.games_won += 1;
            // Every match routed through here is an online match.
            stats.multiplayer_wins += 1;
        }

        let thresholds = [
            (ACHIEVEMENT_FIRST_GAME, stats.games_played >= 1),
            (ACHIEVEMENT_FIRST_WIN, stats.games_won >= 1),
            (
                ACHIEVEMENT_MULTIPLAYER_MASTER,
                stats.multiplayer_wins >= MULTIPLAYER_MASTER_TARGET,
            ),
        ];

        let mut unlocked = Vec::new();
        for (id, earned) in thresholds {
            if earned && !stats.unlocked.contains(id) {
                stats.unlocked.insert(id.to_string());
                stats.achievement_points += achievement_points(id);
                unlocked.push(id);
            }
        }

        for id in &unlocked {
            info!("{} unlocked achievement '{}'", username, id);
        }

        unlocked
    }

    pub fn get(&self, username: &str) -> Option<&UserStats> {
        self.users.get(username)
    }
}
