//! Skylos API Library Crate
//!
//! Application state, REST handlers, the websocket relay and routing for the
//! live voice agent demo. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
