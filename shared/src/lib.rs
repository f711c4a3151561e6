//! Wire protocol and playing-field definitions shared between the pong
//! server and its clients.
//!
//! Everything here is plain data: the packet enum exchanged over the wire,
//! the per-tick snapshot payload, and the field geometry the authoritative
//! simulation is defined against. No I/O lives in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Playing field width in world units. A ball at or beyond the horizontal
/// edge counts as out.
pub const FIELD_WIDTH: f32 = 800.0;
/// Playing field height in world units.
pub const FIELD_HEIGHT: f32 = 400.0;
/// Horizontal thickness of the paddle contact band at each edge.
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 60.0;

/// Serve velocity components before difficulty scaling.
pub const SERVE_SPEED_X: f32 = 5.0;
pub const SERVE_SPEED_Y: f32 = 3.0;
/// Horizontal speed amplification applied on every paddle contact.
pub const RALLY_SPEEDUP: f32 = 1.05;
/// Scale of the angle-control mechanic: vertical velocity leaving a paddle
/// is `(hit_pos - 0.5) * PADDLE_DEFLECT` for `hit_pos` in `[0, 1]`.
pub const PADDLE_DEFLECT: f32 = 8.0;

pub const DEFAULT_MAX_SCORE: u32 = 11;
pub const DEFAULT_WIN_MARGIN: u32 = 2;

/// One of the two paddle-owning participants in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Array index for per-side state (`Left` first).
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Serve-speed difficulty setting. Scales only the serve velocity; rally
/// speed-up and paddle deflection are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn speed_multiplier(self) -> f32 {
        match self {
            Difficulty::Easy => 0.8,
            Difficulty::Medium => 1.0,
            Difficulty::Hard => 1.2,
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// Immutable per-tick state broadcast to both participants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub paddle1_y: f32,
    pub paddle2_y: f32,
    pub ball_x: f32,
    pub ball_y: f32,
    pub score1: u32,
    pub score2: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    JoinQueue {
        display_name: String,
        /// Opaque identity token for achievement tracking. Absent for
        /// guest players; token validation is handled by the auth service.
        auth_token: Option<String>,
    },
    PaddleMove {
        match_id: u64,
        y: f32,
    },
    PauseToggle {
        match_id: u64,
    },
    Leave {
        match_id: u64,
    },
    Disconnect,
    /// Periodic liveness signal. Any packet counts as traffic; this one is
    /// for clients with nothing else to send (queued, or paused mid-match).
    Heartbeat {
        timestamp: u64,
    },

    // Server -> client
    Queued,
    MatchFound {
        match_id: u64,
        opponent_name: String,
        side: Side,
    },
    Snapshot(Snapshot),
    MatchEnded {
        winner: Side,
    },
    OpponentDisconnected,
    InvalidMessage {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::Left.opponent(), Side::Right);
        assert_eq!(Side::Right.opponent(), Side::Left);
        assert_eq!(Side::Left.index(), 0);
        assert_eq!(Side::Right.index(), 1);
    }

    #[test]
    fn test_difficulty_parsing() {
        assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("Medium".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_difficulty_multipliers() {
        assert_approx_eq!(Difficulty::Easy.speed_multiplier(), 0.8);
        assert_approx_eq!(Difficulty::Medium.speed_multiplier(), 1.0);
        assert_approx_eq!(Difficulty::Hard.speed_multiplier(), 1.2);
    }

    #[test]
    fn test_packet_serialization_join_queue() {
        let packet = Packet::JoinQueue {
            display_name: "alice".to_string(),
            auth_token: Some("token-1".to_string()),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::JoinQueue {
                display_name,
                auth_token,
            } => {
                assert_eq!(display_name, "alice");
                assert_eq!(auth_token.as_deref(), Some("token-1"));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_snapshot() {
        let packet = Packet::Snapshot(Snapshot {
            paddle1_y: 170.0,
            paddle2_y: 120.5,
            ball_x: 400.0,
            ball_y: 200.0,
            score1: 3,
            score2: 7,
        });

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Snapshot(snapshot) => {
                assert_approx_eq!(snapshot.paddle2_y, 120.5);
                assert_approx_eq!(snapshot.ball_x, 400.0);
                assert_eq!(snapshot.score1, 3);
                assert_eq!(snapshot.score2, 7);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_match_found() {
        let packet = Packet::MatchFound {
            match_id: 42,
            opponent_name: "bob".to_string(),
            side: Side::Right,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::MatchFound {
                match_id,
                opponent_name,
                side,
            } => {
                assert_eq!(match_id, 42);
                assert_eq!(opponent_name, "bob");
                assert_eq!(side, Side::Right);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_malformed_bytes_fail_decode() {
        let result: Result<Packet, _> = bincode::deserialize(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());

        let result: Result<Packet, _> = bincode::deserialize(&[]);
        assert!(result.is_err());
    }
}
