//! Lost & Found game server: a multi-tenant, road-constrained top-down
//! multiplayer game behind an HTTP+JSON API.
//!
//! The binary in `main.rs` wires these modules together:
//! - world simulation under [`game`] and [`players`],
//! - the serialized application core under [`app`],
//! - the HTTP surface under [`http`],
//! - snapshots and the SQL leaderboard under [`store`].

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod players;
pub mod store;
