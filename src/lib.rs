//! Predator-prey-resource ecosystem simulation with heritable traits.
//!
//! [`Engine`] owns the world and advances it one tick per [`Engine::update`]
//! call; [`Manager`] drives it in day-long segments, writing JSON reports
//! and MessagePack checkpoints into a simulation directory.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod manager;
pub mod model;
pub mod predator;
pub mod prey;
pub mod spawn;
pub mod stats;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use manager::Manager;
