//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the agent catalog,
//! the file-backed context store and the services built on top of them.

use crate::config::Config;
use skylos_core::{
    agents::AgentRegistry, analyzer::ObjectiveAnalyzer, context::ContextStore,
    session::SessionBootstrapper,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<AgentRegistry>,
    pub store: ContextStore,
    pub analyzer: Arc<ObjectiveAnalyzer>,
    pub bootstrapper: SessionBootstrapper,
}
