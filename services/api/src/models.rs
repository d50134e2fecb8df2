//! API Models
//!
//! Request and response bodies of the REST API, annotated for `utoipa`.

use serde::{Deserialize, Serialize};
use skylos_core::{agents::AgentConfig, analyzer::ObjectiveStatus};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AgentsResponse {
    /// Agent configurations in catalog order.
    #[schema(value_type = Vec<Object>)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ApiKeyStatus {
    pub configured: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ProgressResponse {
    /// Objective id to one of `pending`, `in_progress` or `completed`.
    #[schema(value_type = Object)]
    pub statuses: BTreeMap<String, ObjectiveStatus>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct AnalysisResponse {
    #[schema(example = "Analysis complete")]
    pub message: String,
    /// The markdown report, also written to the data directory.
    pub analysis: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
