//! An http client for holgithub-server, along with a view model of the game.

mod client;
mod game;

pub use client::*;
pub use game::*;
