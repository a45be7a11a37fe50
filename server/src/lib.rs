//! # Gecko Sprint Server Library
//!
//! This library provides the authoritative server for Gecko Sprint, a
//! multiplayer tap-racing game. Players back one of five geckos during the
//! lobby, tap as fast as they can during a short click window, then watch the
//! race their taps decided. Winning backers split a prize pool minted from
//! the round's taps.
//!
//! ## Core Responsibilities
//!
//! ### Round State Machine
//! The server cycles through `LOBBY → CLICK_WINDOW → RACING → RESULTS` on a
//! fixed timeline. Every phase change, every accepted tap and every race tick
//! produces a full state snapshot for connected clients.
//!
//! ### Tap Admission
//! Humans and bots share a single boost path. A tap is accepted only during
//! the click window, only for a known racer and only within the per-player
//! rate ceiling.
//!
//! ### Economy
//! Each player carries a wallet of coins and tickets, can claim free tickets
//! once per calendar day, buy tickets with coins, and redeem one referral
//! code for a bonus paid to both sides.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Engine
//! All game state is owned by [`game::GameLoop`] and mutated from one task.
//! Time comes from an injected [`clock::Clock`] and pending work lives in
//! three [`scheduler::TimerSlot`]s, so tests can drive whole rounds with a
//! virtual clock.
//!
//! ### UDP-Based Communication
//! Clients speak bincode-encoded [`shared::Packet`]s over UDP. Inbound packets
//! are turned into engine calls; engine events are broadcast back out.
//!
//! ## Module Organization
//!
//! - `game`: phase scheduling, boost admission, race and payout orchestration
//! - `race`: lane speeds, tick integration, slow-mo and ranking
//! - `racers`: the racer roster and the per-round tap ledger
//! - `lobby`: player records, selections, wallets and referrals
//! - `prize`: prize pool arithmetic and payouts
//! - `bots`: synthetic players that keep rounds populated
//! - `rate_limiter`: per-player boost windows
//! - `scheduler` and `clock`: timers and time sources
//! - `config`: tunable parameters and their validation
//! - `client_manager` and `network`: UDP connections and packet routing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::default();
//!     config.validate()?;
//!
//!     // Bind to an address with room for 64 concurrent connections
//!     let mut server = Server::new("127.0.0.1:8080", config, 64).await?;
//!
//!     // Runs the round loop, packet handling and heartbeat checks
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bots;
pub mod client_manager;
pub mod clock;
pub mod config;
pub mod game;
pub mod lobby;
pub mod network;
pub mod prize;
pub mod race;
pub mod racers;
pub mod rate_limiter;
pub mod scheduler;
pub mod utils;
