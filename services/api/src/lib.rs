pub mod config;
pub mod error;
pub mod routes;
pub mod ws;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use punchout_core::Trainer;
use punchout_core::coach::{Coach, OpenAiChatClient};
use punchout_core::session_state::SessionRegistry;
use punchout_core::speech::{ElevenLabsClient, SpeechClient};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub trainer: Trainer,
}

impl AppState {
    pub fn new(trainer: Trainer) -> Self {
        Self { trainer }
    }

    /// Wires the real provider clients from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = OpenAiChatClient::new(
            config.openai_api_key.clone(),
            config.chat_model.clone(),
            config.collaborator_timeout,
        )?;
        let tts = ElevenLabsClient::new(
            config.elevenlabs_api_key.clone(),
            config.collaborator_timeout,
        )?;
        let trainer = Trainer::new(
            Arc::new(SessionRegistry::new()),
            Coach::new(Arc::new(llm), config.coach_max_tokens),
            SpeechClient::new(Arc::new(tts)),
        );
        Ok(Self::new(trainer))
    }
}

/// Builds the CORS policy for the configured browser origin.
pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::exact(HeaderValue::from_str(origin.trim())?)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Creates the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-sequence", get(routes::generate_sequence))
        .route("/submit-result", post(routes::submit_scored_result))
        .route("/submit-result/{num_correct}", post(routes::submit_result))
        .route("/start-script", get(routes::start_script))
        .route("/start", get(ws::start_ws))
        .route("/state", get(routes::get_state))
        .route("/reset-state", post(routes::reset_state))
        .route("/health", get(routes::health))
        .with_state(state)
}
