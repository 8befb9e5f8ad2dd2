//! Franz engine - visual control loop with a blocking annotation handshake
//!
//! The engine drives an external executor that acts on a display and
//! captures it, waits for an annotator to mark the captured frame up, asks a
//! vision model for the next actions and broadcasts every turn to operators.

pub mod actions;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod event_bus;
pub mod handshake;
pub mod orchestrator;
pub mod pause;
pub mod session;
pub mod state;
pub mod tools;

pub use state::AppState;
