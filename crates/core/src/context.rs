//! Agent Context Store
//!
//! Reads and writes the plain-text artifacts that make up an agent's context:
//! the shared lead profile, per-agent conversation notes and analysis reports.
//! Everything lives flat in one data directory; nothing is cached.

use crate::{agents::AgentRegistry, error::AgentError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

pub const LEAD_PROFILE_FILE: &str = "lead_profile.md";
pub const INTERVIEW_NOTES_FILE: &str = "interview_note.md";
pub const INTERVIEW_ANALYSIS_FILE: &str = "interview_analysis.md";

pub const DEFAULT_LEAD_PROFILE: &str = "# Perfil del Lead\n\nEl agente debe descubrir la información del lead durante la conversación. No hay información predefinida.";
const DEFAULT_RESUME: &str = "# CV del Candidato\n\nInformación no disponible";
const DEFAULT_JOB_DESCRIPTION: &str = "# Descripción del Trabajo\n\nInformación no disponible";
const DEFAULT_ROLE_DESCRIPTION: &str = "# Descripción del Rol\n\nInformación no disponible";

/// Everything an agent knows about the lead and the conversation so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub agent_name: String,
    pub lead_profile: String,
    pub conversation_notes: String,
    /// Never populated from disk; only the analyzer fills it transiently.
    #[serde(default)]
    pub objectives_completed: HashMap<String, String>,
}

/// Context for the legacy interviewer flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewerContext {
    pub role_description: String,
    pub job_description: String,
    pub resume: String,
    pub interview_notes: String,
}

/// File-backed store rooted at the data directory.
#[derive(Debug, Clone)]
pub struct ContextStore {
    data_dir: PathBuf,
}

impl ContextStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn notes_path(&self, agent_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("conversation_notes_{}.md", agent_id))
    }

    pub fn analysis_path(&self, agent_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("conversation_analysis_{}.md", agent_id))
    }

    /// Loads the context for `agent_id`. Missing files resolve to default text;
    /// any other I/O failure is returned.
    pub async fn load_agent_context(
        &self,
        registry: &AgentRegistry,
        agent_id: &str,
    ) -> Result<AgentContext, AgentError> {
        let lead_profile =
            read_or_default(&self.data_dir.join(LEAD_PROFILE_FILE), DEFAULT_LEAD_PROFILE).await?;
        let conversation_notes = read_or_default(&self.notes_path(agent_id), "").await?;

        Ok(AgentContext {
            agent_id: agent_id.to_string(),
            agent_name: registry.name_for(agent_id).to_string(),
            lead_profile,
            conversation_notes,
            objectives_completed: HashMap::new(),
        })
    }

    pub async fn load_interviewer_context(&self) -> Result<InterviewerContext, AgentError> {
        Ok(InterviewerContext {
            resume: read_or_default(&self.data_dir.join("cv.md"), DEFAULT_RESUME).await?,
            job_description: read_or_default(
                &self.data_dir.join("job_description.md"),
                DEFAULT_JOB_DESCRIPTION,
            )
            .await?,
            role_description: read_or_default(
                &self.data_dir.join("role_description.md"),
                DEFAULT_ROLE_DESCRIPTION,
            )
            .await?,
            interview_notes: read_or_default(&self.data_dir.join(INTERVIEW_NOTES_FILE), "")
                .await?,
        })
    }

    /// Overwrites the analysis report for `agent_id` and returns its path.
    pub async fn save_analysis(&self, agent_id: &str, report: &str) -> Result<PathBuf, AgentError> {
        let path = self.analysis_path(agent_id);
        self.write_file(&path, report).await?;
        Ok(path)
    }

    pub async fn save_interview_analysis(&self, report: &str) -> Result<PathBuf, AgentError> {
        let path = self.data_dir.join(INTERVIEW_ANALYSIS_FILE);
        self.write_file(&path, report).await?;
        Ok(path)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::write(path, contents).await
    }
}

async fn read_or_default(path: &Path, default: &str) -> io::Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default.to_string()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests::test_registry;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_files_resolve_to_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path());

        let ctx = store
            .load_agent_context(&test_registry(), "sdr")
            .await
            .unwrap();

        assert_eq!(ctx.agent_id, "sdr");
        assert_eq!(ctx.agent_name, "Agente SDR");
        assert_eq!(ctx.lead_profile, DEFAULT_LEAD_PROFILE);
        assert_eq!(ctx.conversation_notes, "");
        assert!(ctx.objectives_completed.is_empty());
    }

    #[tokio::test]
    async fn test_reads_existing_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lead_profile.md"), "# TechCorp").unwrap();
        std::fs::write(dir.path().join("conversation_notes_cs.md"), "notas").unwrap();
        let store = ContextStore::new(dir.path());

        let ctx = store
            .load_agent_context(&test_registry(), "cs")
            .await
            .unwrap();

        assert_eq!(ctx.lead_profile, "# TechCorp");
        assert_eq!(ctx.conversation_notes, "notas");
        assert_eq!(ctx.agent_name, "Agente de Servicio al Cliente");
    }

    #[tokio::test]
    async fn test_unknown_agent_gets_placeholder_name() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path());

        let ctx = store
            .load_agent_context(&test_registry(), "ghost")
            .await
            .unwrap();
        assert_eq!(ctx.agent_name, "Agente Desconocido");
    }

    #[tokio::test]
    async fn test_non_not_found_errors_propagate() {
        let dir = TempDir::new().unwrap();
        // A directory where a file is expected cannot be read as a string.
        std::fs::create_dir(dir.path().join("lead_profile.md")).unwrap();
        let store = ContextStore::new(dir.path());

        let result = store.load_agent_context(&test_registry(), "sdr").await;
        assert!(matches!(result, Err(AgentError::Io(_))));
    }

    #[tokio::test]
    async fn test_interviewer_context_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path());

        let ctx = store.load_interviewer_context().await.unwrap();
        assert_eq!(ctx.resume, DEFAULT_RESUME);
        assert_eq!(ctx.job_description, DEFAULT_JOB_DESCRIPTION);
        assert_eq!(ctx.role_description, DEFAULT_ROLE_DESCRIPTION);
        assert_eq!(ctx.interview_notes, "");
    }

    #[tokio::test]
    async fn test_save_analysis_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path().join("nested"));

        store.save_analysis("sdr", "first").await.unwrap();
        let path = store.save_analysis("sdr", "second").await.unwrap();

        assert_eq!(path, store.analysis_path("sdr"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
    }
}
