//! Minimal command-line client for exercising a running match server.
//!
//! Joins the queue, waits to be paired, then sweeps its paddle up and down
//! while printing incoming snapshots. Run two of these against one server
//! to see a full match play out.

use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{Packet, FIELD_HEIGHT, PADDLE_HEIGHT};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::sleep;

fn heartbeat() -> Packet {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Packet::Heartbeat { timestamp }
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Display name to queue under
    #[clap(short, long, default_value = "test-client")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let server_addr = args.server.parse::<SocketAddr>()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let join_packet = Packet::JoinQueue {
        display_name: args.name.clone(),
        auth_token: None,
    };
    println!("Joining queue at {} as '{}'", server_addr, args.name);
    socket.send_to(&serialize(&join_packet)?, server_addr).await?;

    let mut buf = [0u8; 2048];

    // Wait to be paired, heartbeating so the silence timeout does not
    // evict us before an opponent shows up.
    let match_id = loop {
        match tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
                Ok(Packet::Queued) => println!("Waiting for an opponent..."),
                Ok(Packet::MatchFound {
                    match_id,
                    opponent_name,
                    side,
                }) => {
                    println!("Matched against '{}' playing {}", opponent_name, side);
                    break match_id;
                }
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize packet: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving packet: {}", e),
            Err(_) => {
                socket.send_to(&serialize(&heartbeat())?, server_addr).await?;
            }
        }
    };

    // Sweep the paddle while printing snapshots for a while.
    let mut paddle_y: f32 = 0.0;
    let mut direction = 1.0f32;

    for _ in 0..600 {
        paddle_y += direction * 4.0;
        if paddle_y <= 0.0 || paddle_y >= FIELD_HEIGHT - PADDLE_HEIGHT {
            direction = -direction;
        }

        let move_packet = Packet::PaddleMove {
            match_id,
            y: paddle_y,
        };
        socket.send_to(&serialize(&move_packet)?, server_addr).await?;

        match tokio::time::timeout(Duration::from_millis(250), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
                Ok(Packet::Snapshot(s)) => {
                    println!(
                        "ball=({:.1},{:.1}) paddles=({:.1},{:.1}) score={}-{}",
                        s.ball_x, s.ball_y, s.paddle1_y, s.paddle2_y, s.score1, s.score2
                    );
                }
                Ok(Packet::MatchEnded { winner }) => {
                    println!("Match over, winner: {}", winner);
                    return Ok(());
                }
                Ok(Packet::OpponentDisconnected) => {
                    println!("Opponent disconnected");
                    return Ok(());
                }
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize packet: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving snapshot: {}", e),
            Err(_) => println!("No snapshot within 250ms"),
        }

        sleep(Duration::from_millis(16)).await;
    }

    println!("Leaving match");
    socket
        .send_to(&serialize(&Packet::Leave { match_id })?, server_addr)
        .await?;

    Ok(())
}
