//! Session Bootstrapper
//!
//! Resolves an agent, prepares its instruction and modality configuration,
//! and starts the runtime's live loop for one connected user.

use crate::{
    agents::{AgentConfig, AgentRegistry},
    context::{AgentContext, ContextStore},
    live::{LiveEventStream, LiveRequestQueue, LiveRuntime, LiveSession, RunConfig},
    notes::{NoteTaker, NotesClient, NotesService},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const APP_NAME: &str = "Interviewer";

/// Parameters of a new live session, as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub user_id: String,
    pub is_audio: bool,
    pub agent_id: String,
    pub voice_name: Option<String>,
    pub language_code: Option<String>,
}

/// Everything needed to start live sessions. Shared across connections.
#[derive(Clone)]
pub struct SessionBootstrapper {
    registry: Arc<AgentRegistry>,
    store: ContextStore,
    note_taker: NoteTaker,
    runtime: Arc<dyn LiveRuntime>,
}

impl SessionBootstrapper {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: ContextStore,
        note_taker: NoteTaker,
        runtime: Arc<dyn LiveRuntime>,
    ) -> Self {
        Self {
            registry,
            store,
            note_taker,
            runtime,
        }
    }

    /// Starts a live session and returns the runtime's event stream together
    /// with the queue feeding it. Unknown agent ids fail before anything is
    /// started.
    pub async fn start(
        &self,
        request: &SessionRequest,
    ) -> Result<(LiveEventStream, LiveRequestQueue)> {
        let agent = self.registry.resolve(&request.agent_id)?;
        let context = self
            .store
            .load_agent_context(&self.registry, &agent.id)
            .await?;

        let tools = Arc::new(
            NotesClient::connect(NotesService::new(
                Some(agent.id.clone()),
                self.note_taker.clone(),
            ))
            .await?,
        );
        let session = LiveSession {
            id: Uuid::new_v4(),
            app_name: APP_NAME.to_string(),
            user_id: request.user_id.clone(),
            agent_id: agent.id.clone(),
            instruction: build_instruction(agent, &context),
            tools,
        };
        let run_config = build_run_config(&self.registry, request);

        if let Some(speech) = &run_config.speech {
            info!(voice = %speech.voice_name, language = %speech.language_code, "Audio config");
        }
        info!(session_id = %session.id, user_id = %session.user_id, agent_id = %session.agent_id, "Starting live session");

        let (queue, requests) = LiveRequestQueue::new();
        let events = self.runtime.run_live(session, requests, run_config).await?;
        Ok((events, queue))
    }
}

/// Persona prompt followed by the lead profile and the note-taking reminder.
pub fn build_instruction(agent: &AgentConfig, context: &AgentContext) -> String {
    format!(
        "{}\n\n## Perfil del Lead\n{}\n\nRecuerda tomar notas de la conversación usando la herramienta tool_take_notes después de cada intercambio importante.",
        agent.prompt, context.lead_profile
    )
}

/// Text-only, or audio with the requested (or the agent's) voice and language.
pub fn build_run_config(registry: &AgentRegistry, request: &SessionRequest) -> RunConfig {
    if !request.is_audio {
        return RunConfig::text();
    }
    let voice = request
        .voice_name
        .clone()
        .unwrap_or_else(|| registry.voice_for(&request.agent_id).to_string());
    let language = request
        .language_code
        .clone()
        .unwrap_or_else(|| registry.language_for(&request.agent_id).to_string());
    RunConfig::audio(voice, language)
}
