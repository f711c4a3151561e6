//! Integration tests for the multiplayer match server.
//!
//! These tests validate cross-component interactions and real network behavior.

use bincode::{deserialize, serialize};
use server::matchmaking::MatchQueue;
use server::network::{GameMessage, Server};
use server::registry::SessionRegistry;
use server::session::{MatchSession, Participant, SessionCommand};
use server::simulation::{SimConfig, SimState};
use server::stats::{
    StatsStore, ACHIEVEMENT_FIRST_GAME, ACHIEVEMENT_FIRST_WIN, ACHIEVEMENT_MULTIPLAYER_MASTER,
    MULTIPLAYER_MASTER_TARGET,
};
use shared::{Packet, Side};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const TICK: Duration = Duration::from_millis(16);
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests packet serialization round-trip for every protocol message
    #[test]
    fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::JoinQueue {
                display_name: "alice".to_string(),
                auth_token: Some("token".to_string()),
            },
            Packet::PaddleMove {
                match_id: 7,
                y: 123.5,
            },
            Packet::PauseToggle { match_id: 7 },
            Packet::Leave { match_id: 7 },
            Packet::Disconnect,
            Packet::Heartbeat { timestamp: 123456789 },
            Packet::Queued,
            Packet::MatchFound {
                match_id: 7,
                opponent_name: "bob".to_string(),
                side: Side::Right,
            },
            Packet::MatchEnded { winner: Side::Left },
            Packet::OpponentDisconnected,
            Packet::InvalidMessage {
                reason: "malformed packet".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();
            assert_eq!(packet, deserialized);
        }
    }

    /// Tests that damaged datagrams fail to deserialize rather than
    /// producing a bogus packet
    #[test]
    fn malformed_packet_handling() {
        let valid_packet = Packet::JoinQueue {
            display_name: "alice".to_string(),
            auth_token: None,
        };
        let valid_data = serialize(&valid_packet).unwrap();

        // Truncated packet
        let truncated_data = &valid_data[..valid_data.len() / 2];
        let result: Result<Packet, _> = deserialize(truncated_data);
        assert!(
            result.is_err(),
            "Should fail to deserialize truncated packet"
        );

        // Corrupted discriminant
        let mut corrupted_data = valid_data.clone();
        corrupted_data[0] = 0xFF;
        let result: Result<Packet, _> = deserialize(&corrupted_data);
        assert!(
            result.is_err(),
            "Should fail to deserialize corrupted packet"
        );

        // Empty packet
        let result: Result<Packet, _> = deserialize(&[]);
        assert!(result.is_err(), "Should fail to deserialize empty packet");
    }
}

/// MATCHMAKING AND REGISTRY TESTS
mod matchmaking_tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("10.2.0.1:{}", port).parse().unwrap()
    }

    /// Tests strict arrival-order pairing across several entrants
    #[test]
    fn queue_pairs_in_arrival_order() {
        let mut queue = MatchQueue::new();

        assert!(queue.enqueue(addr(1), "a".to_string(), None).is_none());
        let (first, second) = queue
            .enqueue(addr(2), "b".to_string(), None)
            .expect("second entrant should complete a pair");
        assert_eq!(first.addr, addr(1));
        assert_eq!(second.addr, addr(2));
        assert!(queue.is_empty());

        // The next arrivals form their own pair, again oldest first.
        assert!(queue.enqueue(addr(3), "c".to_string(), None).is_none());
        let (first, second) = queue.enqueue(addr(4), "d".to_string(), None).unwrap();
        assert_eq!(first.addr, addr(3));
        assert_eq!(second.addr, addr(4));
    }

    /// Tests that abandoning the queue frees the slot without disturbing
    /// other waiters
    #[test]
    fn queue_dequeue_preserves_order() {
        let mut queue = MatchQueue::new();
        queue.enqueue(addr(1), "a".to_string(), None);
        assert!(queue.dequeue(addr(1)));
        assert!(!queue.dequeue(addr(1)));

        queue.enqueue(addr(2), "b".to_string(), None);
        let (first, _) = queue.enqueue(addr(3), "c".to_string(), None).unwrap();
        assert_eq!(first.addr, addr(2));
    }

    /// Tests registry id allocation and handle lifecycle
    #[test]
    fn registry_allocates_unique_ids() {
        let mut registry = SessionRegistry::new();
        let first_id = registry.allocate_id();
        let second_id = registry.allocate_id();
        assert_ne!(first_id, second_id);

        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (done_tx, _done_rx) = mpsc::unbounded_channel();
        let (_session, handle) = MatchSession::new(
            first_id,
            participants(7001, 7002),
            SimConfig::default(),
            TICK,
            out_tx,
            done_tx,
        );
        registry.insert(handle);

        assert!(registry.get(first_id).is_some());
        assert!(registry.get(second_id).is_none());
        assert!(registry.remove(first_id).is_some());
        assert!(registry.is_empty());
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Tests that two concurrent sessions never leak traffic into each
    /// other, and that killing one leaves the other's snapshot stream
    /// flowing
    #[tokio::test]
    async fn concurrent_sessions_are_isolated() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let (out_tx_a, mut out_rx_a) = mpsc::unbounded_channel();
        let handle_a = MatchSession::spawn(
            1,
            participants(7001, 7002),
            SimConfig::default(),
            Duration::from_millis(5),
            out_tx_a,
            done_tx.clone(),
        );

        let (out_tx_b, mut out_rx_b) = mpsc::unbounded_channel();
        let handle_b = MatchSession::spawn(
            2,
            participants(7003, 7004),
            SimConfig::default(),
            Duration::from_millis(5),
            out_tx_b,
            done_tx,
        );

        handle_a.send(SessionCommand::PaddleMove {
            side: Side::Left,
            y: 10.0,
        });
        handle_b.send(SessionCommand::PaddleMove {
            side: Side::Left,
            y: 300.0,
        });

        for _ in 0..20 {
            let GameMessage::SendPacket { addr, .. } = timeout(RECV_TIMEOUT, out_rx_a.recv())
                .await
                .expect("timed out")
                .expect("session a closed");
            assert!(handle_a.side_of(addr).is_some());
            assert!(handle_b.side_of(addr).is_none());

            let GameMessage::SendPacket { addr, .. } = timeout(RECV_TIMEOUT, out_rx_b.recv())
                .await
                .expect("timed out")
                .expect("session b closed");
            assert!(handle_b.side_of(addr).is_some());
            assert!(handle_a.side_of(addr).is_none());
        }

        // Force a disconnect into session A and wait for it to end.
        handle_a.send(SessionCommand::ConnectionLost { side: Side::Right });
        let outcome = timeout(RECV_TIMEOUT, done_rx.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("outcome channel closed");
        assert_eq!(outcome.match_id, 1);
        assert_eq!(outcome.winner, None);

        // Session B's stream must keep flowing after A's death: drain the
        // backlog, then demand fresh snapshots.
        while out_rx_b.try_recv().is_ok() {}
        for _ in 0..5 {
            let GameMessage::SendPacket { packet, addr } = timeout(RECV_TIMEOUT, out_rx_b.recv())
                .await
                .expect("session b stalled after session a ended")
                .expect("session b closed");
            assert!(handle_b.side_of(addr).is_some());
            assert!(matches!(packet, Packet::Snapshot(_)));
        }
    }

    /// Tests that rapid paddle updates collapse to the most recent one by
    /// the time a tick is simulated
    #[tokio::test]
    async fn paddle_updates_last_write_wins() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (done_tx, _done_rx) = mpsc::unbounded_channel();

        let handle = MatchSession::spawn(
            3,
            participants(7001, 7002),
            SimConfig::default(),
            Duration::from_millis(5),
            out_tx,
            done_tx,
        );

        for y in [20.0, 90.0, 150.0] {
            handle.send(SessionCommand::PaddleMove { side: Side::Right, y });
        }

        // Skip snapshots from ticks that raced the updates; the final
        // position must eventually stick.
        let mut last_seen = f32::NAN;
        for _ in 0..50 {
            let GameMessage::SendPacket { packet, .. } = timeout(RECV_TIMEOUT, out_rx.recv())
                .await
                .expect("timed out")
                .expect("session closed");
            if let Packet::Snapshot(snapshot) = packet {
                last_seen = snapshot.paddle2_y;
                if last_seen == 150.0 {
                    break;
                }
            }
        }
        assert_eq!(last_seen, 150.0);

        handle.send(SessionCommand::Leave { side: Side::Left });
    }

    /// Tests the deuce rule: reaching the score limit is not enough
    /// without the required lead
    #[test]
    fn win_requires_margin() {
        let config = SimConfig::default();
        let mut state = SimState {
            ball_x: 400.0,
            ball_y: 200.0,
            ball_vx: 5.0,
            ball_vy: 3.0,
            paddles: [170.0, 170.0],
            scores: [11, 10],
        };

        assert_eq!(state.winner(&config), None, "one-point lead is not a win");

        state.scores = [12, 10];
        assert_eq!(state.winner(&config), Some(Side::Left));

        state.scores = [14, 15];
        assert_eq!(state.winner(&config), None);
        state.scores = [14, 16];
        assert_eq!(state.winner(&config), Some(Side::Right));
    }
}

/// PLAYER STATS TESTS
mod stats_tests {
    use super::*;

    /// Tests achievement progression across a full run of online wins
    #[test]
    fn achievements_unlock_in_sequence() {
        let mut store = StatsStore::new();

        let unlocked = store.record_match_result("alice", true);
        assert!(unlocked.contains(&ACHIEVEMENT_FIRST_GAME));
        assert!(unlocked.contains(&ACHIEVEMENT_FIRST_WIN));
        assert!(!unlocked.contains(&ACHIEVEMENT_MULTIPLAYER_MASTER));

        for _ in 1..MULTIPLAYER_MASTER_TARGET - 1 {
            let unlocked = store.record_match_result("alice", true);
            assert!(unlocked.is_empty(), "no repeat unlocks");
        }

        let unlocked = store.record_match_result("alice", true);
        assert_eq!(unlocked, vec![ACHIEVEMENT_MULTIPLAYER_MASTER]);

        let stats = store.get("alice").unwrap();
        assert_eq!(stats.games_played, MULTIPLAYER_MASTER_TARGET);
        assert_eq!(stats.games_won, MULTIPLAYER_MASTER_TARGET);
        assert_eq!(stats.achievement_points, 10 + 50 + 100);
    }

    /// Tests that losses count as played games without win achievements
    #[test]
    fn losses_grant_only_first_game() {
        let mut store = StatsStore::new();

        let unlocked = store.record_match_result("bob", false);
        assert_eq!(unlocked, vec![ACHIEVEMENT_FIRST_GAME]);

        let stats = store.get("bob").unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_won, 0);
        assert_eq!(stats.achievement_points, 10);
    }
}

/// END-TO-END SERVER TESTS
mod server_tests {
    use super::*;

    /// Runs a full server on its own thread and returns its bound address.
    fn start_server() -> SocketAddr {
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("failed to build runtime");
            runtime.block_on(async move {
                let mut server = Server::new("127.0.0.1:0", TICK, SimConfig::default())
                    .await
                    .expect("failed to bind server");
                addr_tx
                    .send(server.local_addr().expect("no local addr"))
                    .expect("address receiver dropped");
                let _ = server.run().await;
            });
        });

        addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server failed to start")
    }

    async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) {
        socket
            .send_to(&serialize(packet).unwrap(), server)
            .await
            .unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for packet")
            .unwrap();
        deserialize(&buf[0..len]).expect("undecodable packet from server")
    }

    /// Receives packets until one matches, skipping per-tick snapshots.
    async fn recv_until(socket: &UdpSocket, mut pred: impl FnMut(&Packet) -> bool) -> Packet {
        for _ in 0..500 {
            let packet = recv(socket).await;
            if pred(&packet) {
                return packet;
            }
        }
        panic!("expected packet never arrived");
    }

    /// Tests the full happy path over real UDP: queue, pair, receive
    /// snapshots, move a paddle, and observe the opponent leaving
    #[tokio::test]
    async fn full_match_lifecycle_over_udp() {
        let server = start_server();

        let client1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &client1,
            server,
            &Packet::JoinQueue {
                display_name: "alice".to_string(),
                auth_token: None,
            },
        )
        .await;
        assert_eq!(recv(&client1).await, Packet::Queued);

        send(
            &client2,
            server,
            &Packet::JoinQueue {
                display_name: "bob".to_string(),
                auth_token: None,
            },
        )
        .await;

        let found1 = recv_until(&client1, |p| matches!(p, Packet::MatchFound { .. })).await;
        let match_id = match found1 {
            Packet::MatchFound {
                match_id,
                opponent_name,
                side,
            } => {
                assert_eq!(opponent_name, "bob");
                assert_eq!(side, Side::Left);
                match_id
            }
            other => panic!("Unexpected packet {:?}", other),
        };

        match recv_until(&client2, |p| matches!(p, Packet::MatchFound { .. })).await {
            Packet::MatchFound {
                match_id: id,
                opponent_name,
                side,
            } => {
                assert_eq!(id, match_id);
                assert_eq!(opponent_name, "alice");
                assert_eq!(side, Side::Right);
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        // Both sides get fed by the tick loop.
        recv_until(&client1, |p| matches!(p, Packet::Snapshot(_))).await;
        recv_until(&client2, |p| matches!(p, Packet::Snapshot(_))).await;

        // A paddle move shows up in subsequent snapshots.
        send(&client1, server, &Packet::PaddleMove { match_id, y: 120.0 }).await;
        recv_until(&client1, |p| {
            matches!(p, Packet::Snapshot(s) if s.paddle1_y == 120.0)
        })
        .await;

        // Opponent abandons; we hear about it.
        send(&client2, server, &Packet::Leave { match_id }).await;
        recv_until(&client1, |p| matches!(p, Packet::OpponentDisconnected)).await;
    }

    /// Tests that a garbage datagram earns an error ack and nothing else
    #[tokio::test]
    async fn malformed_datagram_gets_error_ack() {
        let server = start_server();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&[0xFF, 0xFE, 0xFD], server).await.unwrap();

        match recv(&client).await {
            Packet::InvalidMessage { reason } => assert!(!reason.is_empty()),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    /// Tests that leaving the queue before pairing lets later clients
    /// keep waiting instead of matching a ghost
    #[tokio::test]
    async fn disconnect_while_queued_is_clean() {
        let server = start_server();

        let quitter = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(
            &quitter,
            server,
            &Packet::JoinQueue {
                display_name: "quitter".to_string(),
                auth_token: None,
            },
        )
        .await;
        assert_eq!(recv(&quitter).await, Packet::Queued);
        send(&quitter, server, &Packet::Disconnect).await;

        // Give the server a moment to process the disconnect.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(
            &client1,
            server,
            &Packet::JoinQueue {
                display_name: "carol".to_string(),
                auth_token: None,
            },
        )
        .await;

        // The quitter is gone, so carol waits instead of being paired.
        assert_eq!(recv(&client1).await, Packet::Queued);
    }
}

// HELPER FUNCTIONS

fn participants(port_left: u16, port_right: u16) -> [Participant; 2] {
    [
        Participant {
            addr: format!("127.0.0.1:{}", port_left).parse().unwrap(),
            display_name: "alice".to_string(),
            username: Some("alice".to_string()),
        },
        Participant {
            addr: format!("127.0.0.1:{}", port_right).parse().unwrap(),
            display_name: "bob".to_string(),
            username: None,
        },
    ]
}
