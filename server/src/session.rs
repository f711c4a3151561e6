//! Match session actor.
//!
//! Each live match is owned by exactly one tokio task. The task is the only
//! writer of the match's simulation state: paddle updates, pause toggles and
//! disconnect signals arrive as messages on the session's command channel and
//! are folded into the next fixed-cadence tick. Outbound traffic goes through
//! the network sender queue, so the tick loop never blocks on I/O.
//!
//! Paddle updates use a single slot per side with last-write-wins semantics:
//! the slot is overwritten on receipt and read once per tick, so no ordering
//! or locking beyond the channel itself is needed.

use crate::network::GameMessage;
use crate::simulation::{clamp_paddle, SimConfig, SimEvent, SimState};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Packet, Side};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// One connected player in a match.
#[derive(Debug, Clone)]
pub struct Participant {
    pub addr: SocketAddr,
    pub display_name: String,
    /// Authenticated identity, if any. Guests play without one and are
    /// excluded from stats recording.
    pub username: Option<String>,
}

/// Session lifecycle. `Ended` is terminal; the task exits and the session
/// object is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    Active,
    Paused,
    Ended,
}

/// Messages accepted by a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Latest requested paddle position for a side. Out-of-range values are
    /// clamped, not rejected.
    PaddleMove { side: Side, y: f32 },
    PauseToggle,
    /// Explicit abandon by a participant.
    Leave { side: Side },
    /// Network-level connection loss for a participant.
    ConnectionLost { side: Side },
}

/// Terminal report sent to the server loop when a session ends, used to
/// deregister the match and fold results into player stats.
#[derive(Debug)]
pub struct SessionOutcome {
    pub match_id: u64,
    pub participants: [Participant; 2],
    /// `None` when the match ended without a winner (disconnect/abandon).
    pub winner: Option<Side>,
}

/// Cheap handle for routing inbound messages to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub match_id: u64,
    participants: [Participant; 2],
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Queues a command for the session task. Returns false if the task has
    /// already exited.
    pub fn send(&self, cmd: SessionCommand) -> bool {
        if self.tx.send(cmd).is_err() {
            debug!("Match {} no longer accepting commands", self.match_id);
            false
        } else {
            true
        }
    }

    /// Resolves which side of the match a connection controls, if any.
    pub fn side_of(&self, addr: SocketAddr) -> Option<Side> {
        if self.participants[Side::Left.index()].addr == addr {
            Some(Side::Left)
        } else if self.participants[Side::Right.index()].addr == addr {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn participant(&self, side: Side) -> &Participant {
        &self.participants[side.index()]
    }
}

/// Authoritative owner of one live match.
pub struct MatchSession {
    match_id: u64,
    config: SimConfig,
    participants: [Participant; 2],
    state: SimState,
    status: SessionStatus,
    /// Latest requested paddle position per side, applied at the next tick.
    requested_paddles: [f32; 2],
    tick: u64,
    tick_duration: Duration,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
    out_tx: mpsc::UnboundedSender<GameMessage>,
    done_tx: mpsc::UnboundedSender<SessionOutcome>,
    rng: StdRng,
}

impl MatchSession {
    /// Builds a session and its routing handle without starting the tick
    /// loop. Both participants must be known up front; the session starts
    /// in `Waiting` and activates when the loop begins.
    pub fn new(
        match_id: u64,
        participants: [Participant; 2],
        config: SimConfig,
        tick_duration: Duration,
        out_tx: mpsc::UnboundedSender<GameMessage>,
        done_tx: mpsc::UnboundedSender<SessionOutcome>,
    ) -> (MatchSession, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rng = StdRng::from_entropy();
        let state = SimState::new(&config, &mut rng);

        let handle = SessionHandle {
            match_id,
            participants: participants.clone(),
            tx,
        };

        let session = MatchSession {
            match_id,
            config,
            participants,
            requested_paddles: state.paddles,
            state,
            status: SessionStatus::Waiting,
            tick: 0,
            tick_duration,
            rx,
            out_tx,
            done_tx,
            rng,
        };

        (session, handle)
    }

    /// Builds a session and runs its tick loop on a fresh task.
    pub fn spawn(
        match_id: u64,
        participants: [Participant; 2],
        config: SimConfig,
        tick_duration: Duration,
        out_tx: mpsc::UnboundedSender<GameMessage>,
        done_tx: mpsc::UnboundedSender<SessionOutcome>,
    ) -> SessionHandle {
        let (session, handle) = MatchSession::new(
            match_id,
            participants,
            config,
            tick_duration,
            out_tx,
            done_tx,
        );
        tokio::spawn(session.run());
        handle
    }

    /// Tick loop. Exits when the session reaches `Ended`, which also drops
    /// the interval timer; nothing outlives the task.
    pub async fn run(mut self) {
        info!(
            "Match {} starting: {} (left) vs {} (right)",
            self.match_id,
            self.participants[Side::Left.index()].display_name,
            self.participants[Side::Right.index()].display_name
        );
        self.status = SessionStatus::Active;

        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            // Registry dropped the handle; nobody can reach
                            // this match anymore.
                            warn!("Match {} command channel closed", self.match_id);
                            self.finish(None);
                        }
                    }
                },
                _ = ticker.tick() => {
                    self.advance_tick();
                },
            }

            if self.status == SessionStatus::Ended {
                break;
            }
        }

        debug!("Match {} task exiting", self.match_id);
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        if self.status == SessionStatus::Ended {
            return;
        }

        match cmd {
            SessionCommand::PaddleMove { side, y } => {
                self.requested_paddles[side.index()] = clamp_paddle(y);
            }
            SessionCommand::PauseToggle => match self.status {
                SessionStatus::Active => {
                    info!("Match {} paused", self.match_id);
                    self.status = SessionStatus::Paused;
                }
                SessionStatus::Paused => {
                    info!("Match {} resumed", self.match_id);
                    self.status = SessionStatus::Active;
                }
                SessionStatus::Waiting | SessionStatus::Ended => {}
            },
            SessionCommand::Leave { side } => {
                info!(
                    "Match {}: {} left the match",
                    self.match_id,
                    self.participants[side.index()].display_name
                );
                self.send_to(side.opponent(), &Packet::OpponentDisconnected);
                self.finish(None);
            }
            SessionCommand::ConnectionLost { side } => {
                info!(
                    "Match {}: connection to {} lost",
                    self.match_id,
                    self.participants[side.index()].display_name
                );
                self.send_to(side.opponent(), &Packet::OpponentDisconnected);
                self.finish(None);
            }
        }
    }

    /// One fixed step: apply the latest paddle slots, advance the
    /// simulation, then broadcast the post-step snapshot to both sides
    /// before the next tick can start. While paused the simulation is
    /// skipped but the unchanged snapshot is still re-sent, keeping both
    /// connections fed and avoiding drift on resume.
    fn advance_tick(&mut self) {
        match self.status {
            SessionStatus::Waiting | SessionStatus::Ended => return,
            SessionStatus::Paused => {
                self.tick += 1;
                self.broadcast(&Packet::Snapshot(self.state.snapshot()));
                return;
            }
            SessionStatus::Active => {}
        }

        self.tick += 1;

        let (next, events) = self
            .state
            .step(self.requested_paddles, 1.0, &self.config, &mut self.rng);
        self.state = next;

        let mut winner = None;
        for event in events {
            match event {
                SimEvent::PaddleHit(side) => {
                    debug!("Match {}: paddle hit on {} side", self.match_id, side);
                }
                SimEvent::BallLost(side) => {
                    info!(
                        "Match {}: point against {} ({}-{})",
                        self.match_id,
                        side,
                        self.state.scores[0],
                        self.state.scores[1]
                    );
                }
                SimEvent::MatchEnded { winner: w } => {
                    winner = Some(w);
                }
            }
        }

        self.broadcast(&Packet::Snapshot(self.state.snapshot()));

        if let Some(winner) = winner {
            info!(
                "Match {} won by {} ({}-{})",
                self.match_id, winner, self.state.scores[0], self.state.scores[1]
            );
            self.broadcast(&Packet::MatchEnded { winner });
            self.finish(Some(winner));
        } else if self.tick % 600 == 0 {
            debug!(
                "Match {}: tick {}, score {}-{}",
                self.match_id, self.tick, self.state.scores[0], self.state.scores[1]
            );
        }
    }

    fn broadcast(&self, packet: &Packet) {
        for side in [Side::Left, Side::Right] {
            self.send_to(side, packet);
        }
    }

    fn send_to(&self, side: Side, packet: &Packet) {
        let addr = self.participants[side.index()].addr;
        if self
            .out_tx
            .send(GameMessage::SendPacket {
                packet: packet.clone(),
                addr,
            })
            .is_err()
        {
            warn!("Match {}: outbound queue closed", self.match_id);
        }
    }

    /// Transitions to `Ended` and reports the outcome upstream exactly once.
    fn finish(&mut self, winner: Option<Side>) {
        if self.status == SessionStatus::Ended {
            return;
        }
        self.status = SessionStatus::Ended;

        let outcome = SessionOutcome {
            match_id: self.match_id,
            participants: self.participants.clone(),
            winner,
        };
        if self.done_tx.send(outcome).is_err() {
            warn!("Match {}: outcome receiver dropped", self.match_id);
        }
    }
}
