//! Serf state handlers, grouped by what the serf is doing.
//!
//! Each module adds `impl Game` blocks; [`dispatch`] holds the state switch
//! that routes a serf to its handler.

pub mod buildings;
pub mod combat;
pub mod dispatch;
pub mod free_walking;
pub mod logistics;
pub mod production;
pub mod professions;
pub mod transport;
pub mod walking;

pub use combat::{attacker_wins, knight_morale};
