pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod host;
pub mod navigation;
pub mod orchestrator;
pub mod scheduler;
pub mod scoreboard;
pub mod sim;
pub mod status;
pub mod store;
pub mod trace;
