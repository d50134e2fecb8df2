//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, OpenAPI documentation and the
//! static frontend.

use crate::{
    handlers,
    models::{AgentsResponse, AnalysisResponse, ApiKeyStatus, ErrorResponse, ProgressResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_agents,
        handlers::api_key_status,
        handlers::objectives_progress,
        handlers::analyse_agent,
        handlers::analyse_interview,
    ),
    components(
        schemas(AgentsResponse, ApiKeyStatus, ProgressResponse, AnalysisResponse, ErrorResponse)
    ),
    tags(
        (name = "Skylos API", description = "Agent catalog, objective tracking and conversation analysis")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&app_state.config.static_dir);

    let api_router = Router::new()
        .route("/api/agents", get(handlers::list_agents))
        .route("/api/api_key_status", get(handlers::api_key_status))
        .route(
            "/api/objectives_progress/{agent_id}",
            get(handlers::objectives_progress),
        )
        .route("/api/analyse", post(handlers::analyse_interview))
        .route("/api/analyse/{agent_id}", post(handlers::analyse_agent))
        .route("/ws/{user_id}", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .fallback_service(static_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use skylos_core::{
        agents::AgentRegistry,
        analyzer::{GenerationError, ObjectiveAnalyzer, TextGenerator},
        context::ContextStore,
        live::{LiveEventStream, LiveRequest, LiveRuntime, LiveSession, RunConfig},
        notes::NoteTaker,
        session::SessionBootstrapper,
    };
    use std::{
        collections::HashMap,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// Replies with a canned result and counts how often it was asked.
    struct CannedGenerator {
        reply: Result<String, fn() -> GenerationError>,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(err: fn() -> GenerationError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: String) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct OfflineRuntime;

    #[async_trait]
    impl LiveRuntime for OfflineRuntime {
        async fn run_live(
            &self,
            _session: LiveSession,
            _requests: mpsc::UnboundedReceiver<LiveRequest>,
            _run_config: RunConfig,
        ) -> anyhow::Result<LiveEventStream> {
            anyhow::bail!("no live runtime in tests")
        }
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: None,
            chat_model: "gemini-2.0-flash".to_string(),
            live_model: gemini_live::DEFAULT_MODEL.to_string(),
            data_path: dir.path().join("data"),
            prompts_path: PathBuf::from("./prompts"),
            static_dir: dir.path().join("static"),
            log_level: tracing::Level::INFO,
        }
    }

    fn app(dir: &TempDir, generator: Arc<CannedGenerator>) -> Router {
        let prompts = HashMap::from([
            ("sdr".to_string(), "Eres Elena, SDR.".to_string()),
            ("cs".to_string(), "Eres Elena, soporte.".to_string()),
            (
                "objectives_progress".to_string(),
                "{objectives}\n---\n{notes}".to_string(),
            ),
            (
                "conversation_analysis".to_string(),
                "Analiza a {agent_name}: {notes}".to_string(),
            ),
            (
                "interview_analysis".to_string(),
                "Evalúa: {interview_notes}".to_string(),
            ),
        ]);
        let config = config(dir);
        let registry = Arc::new(AgentRegistry::builtin(&prompts).unwrap());
        let store = ContextStore::new(&config.data_path);
        let bootstrapper = SessionBootstrapper::new(
            registry.clone(),
            store.clone(),
            NoteTaker::new(store.clone()),
            Arc::new(OfflineRuntime),
        );

        create_router(Arc::new(AppState {
            config: Arc::new(config),
            registry,
            store,
            analyzer: Arc::new(ObjectiveAnalyzer::new(generator, prompts)),
            bootstrapper,
        }))
    }

    fn write_notes(dir: &TempDir, agent_id: &str, notes: &str) {
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join(format!("conversation_notes_{}.md", agent_id)), notes).unwrap();
    }

    async fn send(app: Router, method: &str, uri: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_list_agents_in_catalog_order() {
        let dir = TempDir::new().unwrap();
        let response = send(app(&dir, CannedGenerator::ok("")), "GET", "/api/agents").await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let agents = json["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0]["id"], "sdr");
        assert_eq!(agents[0]["voice_name"], "Kore");
        assert_eq!(agents[1]["id"], "cs");
        assert_eq!(agents[1]["objectives"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_api_key_status() {
        let dir = TempDir::new().unwrap();
        let response = send(
            app(&dir, CannedGenerator::ok("")),
            "GET",
            "/api/api_key_status",
        )
        .await;

        assert_eq!(body_json(response).await, json!({"configured": false}));
    }

    #[tokio::test]
    async fn test_progress_for_unknown_agent_is_empty() {
        let dir = TempDir::new().unwrap();
        let generator = CannedGenerator::ok("1:completed");
        let response = send(
            app(&dir, generator.clone()),
            "GET",
            "/api/objectives_progress/ghost",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"statuses": {}}));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_without_notes_skips_the_model() {
        let dir = TempDir::new().unwrap();
        let generator = CannedGenerator::ok("1:completed");
        let response = send(
            app(&dir, generator.clone()),
            "GET",
            "/api/objectives_progress/sdr",
        )
        .await;

        let json = body_json(response).await;
        let statuses = json["statuses"].as_object().unwrap();
        assert_eq!(statuses.len(), 8);
        assert!(statuses.values().all(|s| s == "pending"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_from_model_reply() {
        let dir = TempDir::new().unwrap();
        write_notes(&dir, "cs", "Cliente: la factura falla desde ayer");
        let generator = CannedGenerator::ok("1:completed\n2: in_progress\n99:completed\nbasura");
        let response = send(
            app(&dir, generator.clone()),
            "GET",
            "/api/objectives_progress/cs",
        )
        .await;

        let json = body_json(response).await;
        assert_eq!(json["statuses"]["1"], "completed");
        assert_eq!(json["statuses"]["2"], "in_progress");
        assert_eq!(json["statuses"]["3"], "pending");
        assert!(json["statuses"].get("99").is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_rate_limit_is_429() {
        let dir = TempDir::new().unwrap();
        write_notes(&dir, "sdr", "Lead: somos TechCorp");
        let generator =
            CannedGenerator::failing(|| GenerationError::RateLimited("429 Too Many Requests".into()));
        let response = send(app(&dir, generator), "GET", "/api/objectives_progress/sdr").await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_progress_other_failures_degrade_to_pending() {
        let dir = TempDir::new().unwrap();
        write_notes(&dir, "sdr", "Lead: somos TechCorp");
        let generator = CannedGenerator::failing(|| {
            GenerationError::Upstream(anyhow::anyhow!("connection reset"))
        });
        let response = send(app(&dir, generator), "GET", "/api/objectives_progress/sdr").await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(
            json["statuses"]
                .as_object()
                .unwrap()
                .values()
                .all(|s| s == "pending")
        );
    }

    #[tokio::test]
    async fn test_analyse_unknown_agent_is_404() {
        let dir = TempDir::new().unwrap();
        let response = send(app(&dir, CannedGenerator::ok("")), "POST", "/api/analyse/ghost").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"message": "Agent not found"}));
    }

    #[tokio::test]
    async fn test_analyse_agent_writes_report() {
        let dir = TempDir::new().unwrap();
        write_notes(&dir, "sdr", "Lead: necesitamos automatizar");
        let response = send(
            app(&dir, CannedGenerator::ok("# Informe\n\nBuena llamada.")),
            "POST",
            "/api/analyse/sdr",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"message": "Analysis complete", "analysis": "# Informe\n\nBuena llamada."})
        );
        let saved =
            std::fs::read_to_string(dir.path().join("data/conversation_analysis_sdr.md")).unwrap();
        assert_eq!(saved, "# Informe\n\nBuena llamada.");
    }

    #[tokio::test]
    async fn test_legacy_analyse_writes_interview_report() {
        let dir = TempDir::new().unwrap();
        let response = send(
            app(&dir, CannedGenerator::ok("Candidato sólido.")),
            "POST",
            "/api/analyse",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let saved = std::fs::read_to_string(dir.path().join("data/interview_analysis.md")).unwrap();
        assert_eq!(saved, "Candidato sólido.");
    }

    #[tokio::test]
    async fn test_unmatched_paths_serve_the_frontend() {
        let dir = TempDir::new().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<h1>Skylos</h1>").unwrap();

        let response = send(app(&dir, CannedGenerator::ok("")), "GET", "/").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>Skylos</h1>");
    }
}
