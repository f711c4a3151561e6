//! # Pong Match Server Library
//!
//! Authoritative server for networked two-player pong. The server owns the
//! canonical simulation for every live match, accepts asynchronous paddle
//! updates from both participants, advances the physics on a fixed tick
//! cadence and broadcasts consistent snapshots to both clients.
//!
//! ## Architecture
//!
//! ### Per-Session Actors
//! Each match runs on its own tokio task ([`session::MatchSession`]) that is
//! the sole writer of its simulation state. Inbound messages are routed to
//! the owning task over a channel; paddle updates land in a single
//! last-write-wins slot per side, so the tick loop never waits on a lock and
//! a fault in one session can never stall another.
//!
//! ### Main Loop
//! A single routing loop ([`network::Server`]) owns the matchmaking queue,
//! the session registry and the stats store. It pairs waiting clients in
//! strict arrival order, registers the resulting sessions and tears them
//! down again when they report an outcome.
//!
//! ### Simulation
//! The physics itself ([`simulation`]) is a pure step function: previous
//! state plus paddle inputs in, next state plus events out. Collision,
//! rally speed-up, scoring and the deuce-rule win check all live there,
//! which keeps the interesting behavior unit-testable without any
//! networking.
//!
//! ## Module Organization
//!
//! - [`simulation`] — deterministic pong physics and win conditions
//! - [`session`] — per-match actor: tick loop, pause, disconnect, broadcast
//! - [`matchmaking`] — FIFO queue pairing waiting clients
//! - [`registry`] — match id to session handle mapping
//! - [`connections`] — per-address connection records and timeout sweeps
//! - [`stats`] — match-result folding and achievement unlocks
//! - [`network`] — UDP front end and the main routing loop

pub mod connections;
pub mod matchmaking;
pub mod network;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod stats;
