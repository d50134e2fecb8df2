//! Agent Configuration Registry
//!
//! The catalog of conversational personas offered by the demo. Display metadata
//! and objectives are compiled in; the persona prompt text is loaded from the
//! prompts directory at startup and keyed by agent id.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_AGENT_ID: &str = "sdr";
pub const DEFAULT_VOICE: &str = "Aoede";
pub const DEFAULT_LANGUAGE: &str = "es-ES";
pub const UNKNOWN_AGENT_NAME: &str = "Agente Desconocido";

/// A tracked goal the conversation should achieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub label: String,
    pub description: String,
}

impl Objective {
    fn new(id: &str, label: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        }
    }
}

/// A configured persona: prompt, voice and the objectives it pursues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub prompt: String,
    pub objectives: Vec<Objective>,
    pub voice_name: String,
    pub language_code: String,
}

/// Immutable, ordered catalog of agents.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentConfig>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self { agents }
    }

    /// Builds the built-in catalog, taking each persona prompt from `prompts`
    /// under the agent's id (e.g. `prompts/sdr.md` → key `"sdr"`).
    pub fn builtin(prompts: &HashMap<String, String>) -> Result<Self, AgentError> {
        let prompt = |id: &str| {
            prompts
                .get(id)
                .cloned()
                .ok_or_else(|| AgentError::MissingPrompt(id.to_string()))
        };

        let agents = vec![
            AgentConfig {
                id: "sdr".to_string(),
                name: "Agente SDR".to_string(),
                description: "Especialista en prospección y desarrollo de leads".to_string(),
                icon: "🎯".to_string(),
                color: "#1e40af".to_string(),
                prompt: prompt("sdr")?,
                voice_name: "Kore".to_string(),
                language_code: "es-ES".to_string(),
                objectives: vec![
                    Objective::new("1", "Información empresarial", "Obtener datos clave de la empresa y sector"),
                    Objective::new("2", "Desafíos actuales", "Identificar principales desafíos empresariales"),
                    Objective::new("3", "Objetivos estratégicos", "Entender metas y objetivos a largo plazo"),
                    Objective::new("4", "Stakeholders clave", "Identificar decisores y personas influyentes"),
                    Objective::new("5", "Procesos actuales", "Comprender flujos de trabajo existentes"),
                    Objective::new("6", "Criterios de éxito", "Definir métricas de éxito y ROI esperado"),
                    Objective::new("7", "Timeline estratégico", "Planificación temporal para implementación"),
                    Objective::new("8", "Oportunidades de valor", "Identificar áreas de mayor impacto potencial"),
                ],
            },
            AgentConfig {
                id: "cs".to_string(),
                name: "Agente de Servicio al Cliente".to_string(),
                description: "Especialista en atención al cliente y soporte técnico".to_string(),
                icon: "🎧".to_string(),
                color: "#059669".to_string(),
                prompt: prompt("cs")?,
                voice_name: "Leda".to_string(),
                language_code: "es-ES".to_string(),
                objectives: vec![
                    Objective::new("1", "Situación actual", "Entender el estado actual del cliente"),
                    Objective::new("2", "Necesidad específica", "Identificar la consulta o problema específico"),
                    Objective::new("3", "Impacto del problema", "Evaluar cómo afecta al negocio del cliente"),
                    Objective::new("4", "Soluciones intentadas", "Conocer qué han probado anteriormente"),
                    Objective::new("5", "Urgencia y prioridad", "Determinar nivel de urgencia de la consulta"),
                    Objective::new("6", "Recursos disponibles", "Identificar recursos y herramientas disponibles"),
                    Objective::new("7", "Expectativas de resolución", "Clarificar expectativas y timeline"),
                    Objective::new("8", "Feedback y mejoras", "Recopilar sugerencias para mejorar el servicio"),
                ],
            },
        ];

        Ok(Self::new(agents))
    }

    /// All agents in catalog order.
    pub fn agents(&self) -> &[AgentConfig] {
        &self.agents
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    /// Like [`AgentRegistry::get`], but an unknown id is an error.
    pub fn resolve(&self, agent_id: &str) -> Result<&AgentConfig, AgentError> {
        self.get(agent_id)
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))
    }

    pub fn voice_for(&self, agent_id: &str) -> &str {
        self.get(agent_id)
            .map(|a| a.voice_name.as_str())
            .unwrap_or(DEFAULT_VOICE)
    }

    pub fn language_for(&self, agent_id: &str) -> &str {
        self.get(agent_id)
            .map(|a| a.language_code.as_str())
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn name_for(&self, agent_id: &str) -> &str {
        self.get(agent_id)
            .map(|a| a.name.as_str())
            .unwrap_or(UNKNOWN_AGENT_NAME)
    }
}
