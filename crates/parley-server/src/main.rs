//! Parley Server
//!
//! Serves the chat relay, conversation history and knowledge file over HTTP.

use std::sync::Arc;

use parley_client::RelayClient;
use parley_server::{router, AppState, KnowledgeStore, Settings, SqlxDb};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main server struct
pub struct ParleyServer {
    settings: Settings,
}

impl ParleyServer {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Opens storage, builds the relay and serves until Ctrl+C.
    pub async fn start(&self) -> Result<(), BoxError> {
        let db = SqlxDb::connect(&self.settings.database_url).await?;
        db.migrate().await?;

        let relay = RelayClient::new(self.settings.relay_config())?;
        let knowledge = Arc::new(KnowledgeStore::new(&self.settings.knowledge_file));
        info!("Knowledge file: {}", knowledge.path().display());

        let state = AppState::new(relay, Arc::new(db), knowledge);
        let app = router(state);

        let listener = tokio::net::TcpListener::bind(self.settings.bind).await?;
        info!("Parley server listening on http://{}", self.settings.bind);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => {
                        error!("Failed to listen for Ctrl+C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            })
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ParleyServer::new(settings).start().await
}
