//! # Serf Simulation Core
//!
//! Deterministic serf state machine for a freeserf-style settlement game.
//!
//! Every serf carries a state, a per-state payload and a countdown counter.
//! Each tick the engine subtracts the elapsed ticks from the counter and runs
//! the handler for the serf's state, which may move it on the map, touch
//! flags, buildings and inventories, and switch it into another state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Game::update │────▶│ update_serf  │────▶│ state handler│
//! │ (tick loop)  │     │ (dispatch)   │     │ (systems/*)  │
//! └──────┬───────┘     └──────────────┘     └──────┬───────┘
//!        │                                         │
//! ┌──────▼───────┐                          ┌──────▼───────┐
//! │update_requests│                         │ Map / Flags /│
//! │ (logistics)  │─────────────────────────▶│ Buildings /  │
//! └──────────────┘                          │ Inventories  │
//!                                           └──────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Game`] | Complete simulation state: map, players, entity arenas, RNG |
//! | [`Serf`] | One serf: type, owner, position, state, payload, counter |
//! | [`State`] | The serf state enumeration |
//! | [`StateData`] | Per-state payload, always matching the current state |
//! | [`SimConfig`] | Tunable constants (wait limits, tick step, checksums) |
//! | [`SimError`] | Modelling bugs that abort a serf's update |
//!
//! ## Persistence
//!
//! [`persist`] reads and writes the fixed 32-byte binary serf record and the
//! sectioned text save format.

pub mod arena;
pub mod building;
pub mod config;
pub mod error;
pub mod flag;
pub mod game;
pub mod inventory;
pub mod map;
pub mod metrics;
pub mod persist;
pub mod player;
pub mod profiling;
pub mod resource;
pub mod rng;
pub mod serf;
pub mod step;
pub mod systems;
pub mod testing;
pub mod world;

pub use arena::{Arena, BuildingId, FlagId, InventoryId, SerfId};
pub use building::{Building, BuildingType};
pub use config::SimConfig;
pub use error::SimError;
pub use flag::Flag;
pub use game::Game;
pub use inventory::Inventory;
pub use map::{Direction, Map, MapObject, MapPos};
pub use metrics::SimMetrics;
pub use player::{Notification, NotificationKind, Player};
pub use resource::Resource;
pub use rng::GameRng;
pub use serf::{Serf, SerfType, State, StateData};
