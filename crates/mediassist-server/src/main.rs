//! MediAssist: streaming chat relay between a web frontend and an LLM provider.

use std::sync::Arc;

use mediassist_chat::config::api_key_var;
use mediassist_chat::{build_provider, ProviderConfig};
use mediassist_core::{format_megabytes, RelayConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod routes;
mod state;
mod uploads;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--help" | "-h" | "help" => {
                println!("MediAssist: medical assistant chat relay");
                println!();
                println!("Usage: mediassist");
                println!();
                println!("Configured through environment variables:");
                println!("  PORT, MAX_FILE_SIZE, FRONTEND_URL, UPLOAD_DIR, REQUEST_TIMEOUT_SECS");
                println!("  AI_PROVIDER (openai | anthropic | deepseek | grok), AI_MODEL, AI_BASE_URL");
                println!("  OPENAI_API_KEY, ANTHROPIC_API_KEY, DEEPSEEK_API_KEY, GROK_API_KEY");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}. Use 'mediassist help' for usage.", arg);
                std::process::exit(1);
            }
        }
    }

    let config = RelayConfig::from_env()?;
    let port = config.port;

    let provider_config = ProviderConfig::from_env();
    if !provider_config.has_api_key() {
        warn!(
            "{} is not set; requests to {} will fail",
            api_key_var(provider_config.kind),
            provider_config.kind
        );
    }

    let provider = build_provider(&provider_config, config.request_timeout)?;
    info!("Using {} provider with model {}", provider.kind(), provider.model_name());
    info!("Maximum file size: {} MB", format_megabytes(config.max_file_size));
    info!("Upload directory: {}", config.upload_dir.display());

    let state = Arc::new(AppState::new(config, provider));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("MediAssist server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
