use thiserror::Error;

/// Errors raised while resolving agents, contexts and session state.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent configuration not found for ID: {0}")]
    UnknownAgent(String),
    #[error("Missing prompt file for agent '{0}'")]
    MissingPrompt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
