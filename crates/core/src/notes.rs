//! Note-Taking Tool
//!
//! The live agent calls `tool_take_notes` after each meaningful exchange. Each
//! call appends a timestamped markdown section to the agent's notes file.
//!
//! The target agent is fixed when a [`NotesService`] is built for a session, so
//! concurrent sessions for different agents never write into each other's file.

use crate::{
    agents::DEFAULT_AGENT_ID,
    context::{ContextStore, INTERVIEW_NOTES_FILE},
    error::AgentError,
    live::ToolDeclaration,
};
use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolRequestParam, RawContent, ServerCapabilities, ServerInfo, Tool},
    service::{RoleClient, RunningService},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};

pub const TAKE_NOTES_TOOL: &str = "tool_take_notes";
pub const TAKE_INTERVIEW_NOTES_TOOL: &str = "tool_take_interview_notes";

/// Appends timestamped sections to note files in the data directory.
///
/// Writes go through a process-wide lock, so serialized callers always observe
/// every previous section.
#[derive(Debug, Clone)]
pub struct NoteTaker {
    store: ContextStore,
    write_lock: Arc<Mutex<()>>,
}

impl NoteTaker {
    pub fn new(store: ContextStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends `text` to `conversation_notes_{agent_id}.md`, creating the file
    /// with a header on first use.
    pub async fn append_conversation_notes(
        &self,
        agent_id: &str,
        text: &str,
    ) -> Result<PathBuf, AgentError> {
        let path = self.store.notes_path(agent_id);
        let header = format!("# Notas de Conversación - {}\n\n", agent_id.to_uppercase());
        self.append_section(&path, &header, text).await?;
        Ok(path)
    }

    /// Legacy interviewer variant writing to `interview_note.md`.
    pub async fn append_interview_notes(&self, text: &str) -> Result<PathBuf, AgentError> {
        let path = self.store.data_dir().join(INTERVIEW_NOTES_FILE);
        self.append_section(&path, "# Notas de Entrevista\n\n", text)
            .await?;
        Ok(path)
    }

    async fn append_section(&self, path: &Path, header: &str, text: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(self.store.data_dir()).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let mut section = String::new();
        if file.metadata().await?.len() == 0 {
            section.push_str(header);
        }
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        section.push_str(&format!("\n## {}\n\n{}\n\n", timestamp, text));

        file.write_all(section.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Arguments of the `tool_take_notes` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct TakeNotesArgs {
    /// The exchange between agent and lead, formatted as plain text.
    #[schemars(
        description = "The conversation exchange between agent and lead formatted as a string."
    )]
    pub conversation_exchange: String,
}

/// Arguments of the legacy `tool_take_interview_notes` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct TakeInterviewNotesArgs {
    #[schemars(description = "The interview question and the candidate's answer.")]
    pub question_and_answer: String,
}

/// Session-scoped note-taking tool, exposed to the runtime as `tool_take_notes`.
pub struct NotesService {
    agent_id: String,
    note_taker: NoteTaker,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for NotesService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl NotesService {
    /// Binds the tool to `agent_id`, falling back to the default agent.
    pub fn new(agent_id: Option<String>, note_taker: NoteTaker) -> Self {
        Self {
            agent_id: agent_id.unwrap_or_else(|| DEFAULT_AGENT_ID.to_string()),
            note_taker,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "tool_take_notes",
        description = "Update the conversation notes file with a new exchange between the agent and the lead."
    )]
    pub async fn take_notes(&self, args: Parameters<TakeNotesArgs>) -> Result<String, String> {
        info!(agent_id = %self.agent_id, "Executing tool 'tool_take_notes'");
        let path = self
            .note_taker
            .append_conversation_notes(&self.agent_id, &args.0.conversation_exchange)
            .await
            .map_err(|e| format!("Failed to write notes: {}", e))?;
        Ok(format!(
            "Notas actualizadas correctamente en {}",
            path.display()
        ))
    }

    #[tool(
        name = "tool_take_interview_notes",
        description = "Append a question and answer to the interview notes."
    )]
    pub async fn take_interview_notes(
        &self,
        args: Parameters<TakeInterviewNotesArgs>,
    ) -> Result<String, String> {
        info!("Executing tool 'tool_take_interview_notes'");
        self.note_taker
            .append_interview_notes(&args.0.question_and_answer)
            .await
            .map_err(|e| format!("Failed to write interview notes: {}", e))?;
        Ok("Notas de entrevista actualizadas".to_string())
    }
}

impl NotesService {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

/// In-process MCP client for one session's [`NotesService`].
///
/// The service runs on its own task behind a duplex pipe; dropping the client
/// shuts it down.
pub struct NotesClient {
    client: RunningService<RoleClient, ()>,
    tools: Vec<Tool>,
}

impl NotesClient {
    pub async fn connect(service: NotesService) -> anyhow::Result<Self> {
        let agent_id = service.agent_id.clone();
        let (server_transport, client_transport) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            match service.serve(server_transport).await {
                Ok(running) => {
                    let _ = running.waiting().await;
                }
                Err(e) => warn!(error = %e, "Notes tool service failed to start"),
            }
        });
        let client = ().serve(client_transport).await?;
        let mut tools = client.list_all_tools().await?;
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        info!(agent_id = %agent_id, tools = tools.len(), "Notes tools ready");

        Ok(Self { client, tools })
    }

    /// Declarations advertised to the live runtime at session setup.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .iter()
            .map(|t| ToolDeclaration {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or_default().to_string(),
                parameters: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect()
    }

    /// Routes a function call coming from the runtime to the matching tool.
    pub async fn dispatch(&self, name: &str, args: serde_json::Value) -> Result<String, String> {
        if !self.tools.iter().any(|t| t.name == name) {
            warn!(tool = %name, "Runtime requested an unknown tool");
            return Err(format!("Unknown tool: '{}'", name));
        }
        let arguments = match args {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(format!(
                    "Invalid arguments for '{}': expected an object, got {}",
                    name, other
                ));
            }
        };

        let result = self
            .client
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| format!("Tool '{}' failed: {}", name, e))?;

        let text = result
            .content
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if result.is_error == Some(true) {
            Err(text)
        } else {
            Ok(text)
        }
    }
}
