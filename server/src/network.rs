//! Server network layer handling UDP communications and packet routing.
//!
//! The main loop owns the matchmaking queue, the session registry and the
//! stats store; match simulation itself runs on per-session tasks. Network
//! receive/send and timeout sweeping run on their own tasks and talk to the
//! main loop over channels, so no session can stall another or the queue.

use crate::connections::{ClientLocation, Connection, ConnectionTable};
use crate::matchmaking::{MatchQueue, QueueEntry};
use crate::registry::SessionRegistry;
use crate::session::{MatchSession, Participant, SessionCommand, SessionOutcome};
use crate::simulation::SimConfig;
use crate::stats::StatsStore;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Side};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// How long a connection may stay silent before it is treated as lost.
/// Disconnect is the only failure signal the server detects.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages sent from network tasks to the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        connection: Connection,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Outbound traffic queued for the network sender task.
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Main server coordinating matchmaking, session routing and networking.
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionTable>>,
    queue: MatchQueue,
    registry: SessionRegistry,
    stats: StatsStore,
    config: SimConfig,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    done_tx: mpsc::UnboundedSender<SessionOutcome>,
    done_rx: mpsc::UnboundedReceiver<SessionOutcome>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        config: SimConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionTable::new())),
            queue: MatchQueue::new(),
            registry: SessionRegistry::new(),
            stats: StatsStore::new(),
            config,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            done_tx,
            done_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams.
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();
        let game_tx = self.game_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            // The sender gets an error ack; nothing else is
                            // affected by a bad datagram.
                            warn!("Failed to deserialize packet from {}", addr);
                            let ack = Packet::InvalidMessage {
                                reason: "malformed packet".to_string(),
                            };
                            let _ = game_tx.send(GameMessage::SendPacket { packet: ack, addr });
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue.
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { packet, addr }) = game_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that sweeps for silent connections.
    async fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut connections_guard = connections.write().await;
                    connections_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for connection in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { connection }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes one inbound packet on the main loop.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::JoinQueue {
                display_name,
                auth_token,
            } => {
                self.handle_join_queue(addr, display_name, auth_token).await;
            }

            Packet::PaddleMove { match_id, y } => {
                self.connections.write().await.touch(addr);
                self.route_to_session(match_id, addr, |side| SessionCommand::PaddleMove {
                    side,
                    y,
                });
            }

            Packet::PauseToggle { match_id } => {
                self.connections.write().await.touch(addr);
                self.route_to_session(match_id, addr, |_| SessionCommand::PauseToggle);
            }

            Packet::Leave { match_id } => {
                self.connections.write().await.touch(addr);
                self.route_to_session(match_id, addr, |side| SessionCommand::Leave { side });
            }

            Packet::Heartbeat { .. } => {
                self.connections.write().await.touch(addr);
            }

            Packet::Disconnect => {
                let removed = self.connections.write().await.remove(addr);
                if let Some(connection) = removed {
                    self.release_connection(&connection);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join_queue(
        &mut self,
        addr: SocketAddr,
        display_name: String,
        auth_token: Option<String>,
    ) {
        let display_name = if display_name.trim().is_empty() {
            format!("guest-{}", addr.port())
        } else {
            display_name
        };

        {
            let mut connections = self.connections.write().await;
            connections.upsert(addr, display_name.clone(), auth_token.clone());
            if let Some(conn) = connections.get(addr) {
                if let ClientLocation::InMatch(match_id) = conn.location {
                    warn!("{} tried to queue while in match {}", addr, match_id);
                    return;
                }
            }
        }

        match self.queue.enqueue(addr, display_name, auth_token) {
            Some((first, second)) => {
                self.start_match(first, second).await;
            }
            None => {
                self.connections
                    .write()
                    .await
                    .set_location(addr, ClientLocation::Queued);
                self.send_packet(&Packet::Queued, addr);
            }
        }
    }

    /// Creates a session for a freshly paired couple: the earlier entrant
    /// takes the left side.
    async fn start_match(&mut self, first: QueueEntry, second: QueueEntry) {
        let match_id = self.registry.allocate_id();
        let participants = [
            Participant {
                addr: first.addr,
                display_name: first.display_name.clone(),
                username: first.username.clone(),
            },
            Participant {
                addr: second.addr,
                display_name: second.display_name.clone(),
                username: second.username.clone(),
            },
        ];

        let handle = MatchSession::spawn(
            match_id,
            participants,
            self.config,
            self.tick_duration,
            self.game_tx.clone(),
            self.done_tx.clone(),
        );
        self.registry.insert(handle);

        {
            let mut connections = self.connections.write().await;
            connections.set_location(first.addr, ClientLocation::InMatch(match_id));
            connections.set_location(second.addr, ClientLocation::InMatch(match_id));
        }

        info!(
            "Paired {} and {} into match {}",
            first.display_name, second.display_name, match_id
        );

        self.send_packet(
            &Packet::MatchFound {
                match_id,
                opponent_name: second.display_name,
                side: Side::Left,
            },
            first.addr,
        );
        self.send_packet(
            &Packet::MatchFound {
                match_id,
                opponent_name: first.display_name,
                side: Side::Right,
            },
            second.addr,
        );
    }

    /// Validates a match-scoped packet against the registry and forwards it
    /// to the owning session. Unknown ids and non-participants are dropped.
    fn route_to_session<F>(&self, match_id: u64, addr: SocketAddr, build: F)
    where
        F: FnOnce(Side) -> SessionCommand,
    {
        match self.registry.get(match_id) {
            Some(handle) => match handle.side_of(addr) {
                Some(side) => {
                    handle.send(build(side));
                }
                None => {
                    warn!(
                        "Dropping message for match {} from non-participant {}",
                        match_id, addr
                    );
                }
            },
            None => {
                debug!(
                    "Dropping message for unknown or ended match {} from {}",
                    match_id, addr
                );
            }
        }
    }

    /// Frees whatever the connection was occupying: its queue slot, or its
    /// side of a running match.
    fn release_connection(&mut self, connection: &Connection) {
        match connection.location {
            ClientLocation::Idle => {}
            ClientLocation::Queued => {
                self.queue.dequeue(connection.addr);
            }
            ClientLocation::InMatch(match_id) => {
                if let Some(handle) = self.registry.get(match_id) {
                    if let Some(side) = handle.side_of(connection.addr) {
                        handle.send(SessionCommand::ConnectionLost { side });
                    }
                }
            }
        }
    }

    /// Tears down a finished session and folds the result into stats for
    /// authenticated participants. Matches that ended without a winner
    /// (disconnect/abandon) are not recorded.
    async fn handle_session_outcome(&mut self, outcome: SessionOutcome) {
        self.registry.remove(outcome.match_id);

        {
            let mut connections = self.connections.write().await;
            for participant in &outcome.participants {
                if let Some(conn) = connections.get(participant.addr) {
                    if conn.location == ClientLocation::InMatch(outcome.match_id) {
                        connections.set_location(participant.addr, ClientLocation::Idle);
                    }
                }
            }
        }

        if let Some(winner) = outcome.winner {
            for (index, participant) in outcome.participants.iter().enumerate() {
                if let Some(username) = &participant.username {
                    self.stats
                        .record_match_result(username, index == winner.index());
                }
            }
        }
    }

    /// Main server loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { connection }) => {
                            self.release_connection(&connection);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                outcome = self.done_rx.recv() => {
                    if let Some(outcome) = outcome {
                        self.handle_session_outcome(outcome).await;
                    }
                },
            }
        }

        Ok(())
    }
}
