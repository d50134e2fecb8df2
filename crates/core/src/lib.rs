//! Skylos Core
//!
//! Domain logic for the live voice agents demo: the agent catalog, the
//! file-backed context store, the note-taking tool, the objective analyzer and
//! the provider-independent seam to the live agent runtime.

pub mod agents;
pub mod analyzer;
pub mod context;
pub mod error;
pub mod live;
pub mod notes;
pub mod session;
