//! Objective-Progress and Conversation Analyzer
//!
//! Asks a text-generation model to judge how far a conversation got with each
//! of an agent's objectives, or to write a qualitative report about it.
//!
//! Model output is treated as untrusted: status lines are decoded leniently and
//! anything unrecognised is dropped.

use crate::{
    agents::{AgentConfig, Objective},
    context::{AgentContext, InterviewerContext},
};
use anyhow::anyhow;
use async_openai::{
    config::{Config, OpenAIConfig},
    types::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const PROGRESS_TEMPLATE: &str = "objectives_progress";
pub const REPORT_TEMPLATE: &str = "conversation_analysis";
pub const INTERVIEW_TEMPLATE: &str = "interview_analysis";

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The upstream service refused the call for quota reasons.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Missing prompt template: '{0}'")]
    MissingTemplate(String),
    #[error("Text generation failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Anything that can turn a prompt into a completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: String) -> Result<String, GenerationError>;
}

/// A `TextGenerator` for any OpenAI-compatible chat completion API.
///
/// Requests are built with `async-openai` types and sent once, without
/// retries, so a quota refusal reaches the caller immediately together with
/// the HTTP status and body it came with.
pub struct OpenAICompatibleGenerator {
    http: reqwest::Client,
    config: OpenAIConfig,
    model: String,
}

impl OpenAICompatibleGenerator {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAICompatibleGenerator {
    async fn generate(&self, prompt: String) -> Result<String, GenerationError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(anyhow::Error::from)?
                    .into(),
            ])
            .build()
            .map_err(anyhow::Error::from)?;

        let response = self
            .http
            .post(self.config.url("/chat/completions"))
            .query(&self.config.query())
            .headers(self.config.headers())
            .json(&request)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        let status = response.status();
        let body = response.bytes().await.map_err(anyhow::Error::from)?;

        if !status.is_success() {
            return Err(classify_failure(
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            ));
        }

        let completion: CreateChatCompletionResponse = serde_json::from_slice(&body)
            .map_err(|e| anyhow!("Unexpected chat completion response: {}", e))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Upstream(anyhow!("No content in LLM response")))
    }
}

/// Separates quota exhaustion from every other upstream failure.
pub fn classify_failure(status: u16, body: &str) -> GenerationError {
    let message = upstream_message(body);
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        GenerationError::RateLimited(message)
    } else {
        GenerationError::Upstream(anyhow!("HTTP {}: {}", status, message))
    }
}

/// `error.message` from an OpenAI-style object or a Gemini-style array body,
/// or the raw body when neither shape matches.
fn upstream_message(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let error = match &value {
        serde_json::Value::Array(items) => items.first().map(|item| &item["error"]),
        other => Some(&other["error"]),
    };
    error
        .and_then(|e| e["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Tri-state completion of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Pending,
    InProgress,
    Completed,
}

impl FromStr for ObjectiveStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(()),
        }
    }
}

/// Where a progress report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// No notes yet; the model was not consulted.
    NoNotes,
    Model,
    /// The model call failed and every objective was reported as pending.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveProgress {
    pub statuses: BTreeMap<String, ObjectiveStatus>,
    pub source: ProgressSource,
}

impl ObjectiveProgress {
    pub fn all_pending(objectives: &[Objective], source: ProgressSource) -> Self {
        Self {
            statuses: objectives
                .iter()
                .map(|o| (o.id.clone(), ObjectiveStatus::Pending))
                .collect(),
            source,
        }
    }
}

/// Decodes `id:status` lines from a free-form model response.
///
/// Only ids from `objectives` and the three known statuses are accepted; any
/// other line is skipped. Objectives the model did not mention stay pending.
pub fn parse_statuses(
    response: &str,
    objectives: &[Objective],
) -> BTreeMap<String, ObjectiveStatus> {
    let mut statuses: BTreeMap<String, ObjectiveStatus> = objectives
        .iter()
        .map(|o| (o.id.clone(), ObjectiveStatus::Pending))
        .collect();

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((id, status)) = line.split_once(':') else {
            continue;
        };
        let id = id.trim();
        let Ok(status) = status.trim().to_lowercase().parse::<ObjectiveStatus>() else {
            continue;
        };
        if let Some(slot) = statuses.get_mut(id) {
            *slot = status;
        }
    }
    statuses
}

pub struct ObjectiveAnalyzer {
    generator: Arc<dyn TextGenerator>,
    prompts: HashMap<String, String>,
}

impl ObjectiveAnalyzer {
    /// `prompts` must contain the `objectives_progress`, `conversation_analysis`
    /// and `interview_analysis` templates.
    pub fn new(generator: Arc<dyn TextGenerator>, prompts: HashMap<String, String>) -> Self {
        Self { generator, prompts }
    }

    /// Classifies each objective of `agent` from the conversation notes.
    ///
    /// Only a rate-limited upstream is returned as an error; other failures
    /// degrade to all-pending with [`ProgressSource::Fallback`].
    pub async fn objectives_progress(
        &self,
        agent: &AgentConfig,
        context: &AgentContext,
    ) -> Result<ObjectiveProgress, GenerationError> {
        if context.conversation_notes.trim().is_empty() {
            return Ok(ObjectiveProgress::all_pending(
                &agent.objectives,
                ProgressSource::NoNotes,
            ));
        }

        let objectives = agent
            .objectives
            .iter()
            .map(|o| format!("- {}: {} - {}", o.id, o.label, o.description))
            .collect::<Vec<_>>()
            .join("\n");

        let result = match self.render(
            PROGRESS_TEMPLATE,
            &[
                ("objectives", objectives.as_str()),
                ("notes", context.conversation_notes.as_str()),
            ],
        ) {
            Ok(prompt) => self.generator.generate(prompt).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => Ok(ObjectiveProgress {
                statuses: parse_statuses(&response, &agent.objectives),
                source: ProgressSource::Model,
            }),
            Err(GenerationError::RateLimited(msg)) => {
                warn!(agent_id = %agent.id, "Objective analysis rate limited");
                Err(GenerationError::RateLimited(msg))
            }
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Error analyzing objectives progress; reporting all pending");
                Ok(ObjectiveProgress::all_pending(
                    &agent.objectives,
                    ProgressSource::Fallback,
                ))
            }
        }
    }

    /// Produces a markdown report of how the conversation went.
    pub async fn analyse_conversation(
        &self,
        agent: &AgentConfig,
        context: &AgentContext,
    ) -> Result<String, GenerationError> {
        let objectives = agent
            .objectives
            .iter()
            .map(|o| format!("- {}: {}", o.label, o.description))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = self.render(
            REPORT_TEMPLATE,
            &[
                ("agent_name", agent.name.as_str()),
                ("objectives", objectives.as_str()),
                ("lead_profile", context.lead_profile.as_str()),
                ("notes", context.conversation_notes.as_str()),
            ],
        )?;
        info!(agent_id = %agent.id, "Requesting conversation analysis");
        self.generator.generate(prompt).await
    }

    /// Legacy interview evaluation.
    pub async fn analyse_interview(
        &self,
        context: &InterviewerContext,
    ) -> Result<String, GenerationError> {
        let prompt = self.render(
            INTERVIEW_TEMPLATE,
            &[
                ("role_description", context.role_description.as_str()),
                ("job_description", context.job_description.as_str()),
                ("resume", context.resume.as_str()),
                ("interview_notes", context.interview_notes.as_str()),
            ],
        )?;
        self.generator.generate(prompt).await
    }

    fn render(&self, key: &str, vars: &[(&str, &str)]) -> Result<String, GenerationError> {
        let template = self
            .prompts
            .get(key)
            .ok_or_else(|| GenerationError::MissingTemplate(key.to_string()))?;
        Ok(vars.iter().fold(template.clone(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        }))
    }
}
