//! WebSocket Session Management
//!
//! - `protocol`: the JSON frames exchanged with the browser.
//! - `relay`: the two pumps moving frames between the browser and the agent.
//! - `session`: connection lifecycle, from upgrade to termination.

pub mod protocol;
pub mod relay;
pub mod session;

pub use session::ws_handler;
