//! Skull soul-collector server library.
//!
//! This module exposes the simulation core, its collaborators and the host
//! for use in tests and binaries.

pub mod avatar;
pub mod bot;
pub mod collision;
pub mod config;
pub mod game_loop;
pub mod input;
pub mod leaderboard;
pub mod pool;
pub mod soul;
pub mod soul_manager;
pub mod state;
pub mod ui;
pub mod ws;
