//! Main Entrypoint for the Skylos API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading persona prompts and analysis templates.
//! 3. Initializing shared services (agent registry, analyzer, live runtime).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use gemini_live::GeminiLiveRuntime;
use skylos_api::{config::Config, router::create_router, state::AppState};
use skylos_core::{
    agents::AgentRegistry,
    analyzer::{ObjectiveAnalyzer, OpenAICompatibleGenerator},
    context::ContextStore,
    notes::NoteTaker,
    session::SessionBootstrapper,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Prompts and Agent Catalog ---
    let prompts = load_prompts(&config.prompts_path)?;
    let registry = Arc::new(
        AgentRegistry::builtin(&prompts).context("Failed to build the agent catalog")?,
    );
    info!(agents = registry.agents().len(), "Agent catalog loaded.");

    // --- 3. Initialize Shared Services ---
    let api_key = config.gemini_api_key.clone().unwrap_or_else(|| {
        warn!("GEMINI_API_KEY is not set. Live sessions and analysis will fail.");
        String::new()
    });

    let openai_config = OpenAIConfig::new()
        .with_api_key(&api_key)
        .with_api_base(GEMINI_OPENAI_BASE);
    let generator = Arc::new(OpenAICompatibleGenerator::new(
        openai_config,
        config.chat_model.clone(),
    ));
    let analyzer = Arc::new(ObjectiveAnalyzer::new(generator, prompts));

    let store = ContextStore::new(&config.data_path);
    let runtime = Arc::new(GeminiLiveRuntime::new(api_key, config.live_model.clone()));
    let bootstrapper = SessionBootstrapper::new(
        registry.clone(),
        store.clone(),
        NoteTaker::new(store.clone()),
        runtime,
    );

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        registry,
        store,
        analyzer,
        bootstrapper,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        chat_model = %config.chat_model,
        live_model = %config.live_model,
        data_path = %config.data_path.display(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
