// crates/server/src/main.rs
//! Server entrypoint: configuration, wiring, and ordered shutdown.

use anyhow::{bail, Context};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zixue_core::{BatchConfig, EngineConfig};
use zixue_db::Database;
use zixue_llm::{AiQuestionGenerator, AiRequestManager, GeneratorClient, GeneratorConfig};
use zixue_server::collaborators::{
    HttpBlobStore, HttpDictionaryScraper, HttpHandwritingRecognizer,
};
use zixue_server::routes::app_router;
use zixue_server::AppState;

/// Grace period the pool gets to finish in-flight work on shutdown.
const DB_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Parser)]
#[command(name = "zixue", about = "Adaptive Chinese-character practice backend")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ZIXUE_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Base URL of the blob-store collaborator.
    #[arg(long, env = "BLOB_STORE_URL")]
    blob_store_url: String,

    /// Base URL of the dictionary-scraper collaborator.
    #[arg(long, env = "DICTIONARY_URL")]
    dictionary_url: String,

    /// Base URL of the handwriting-recognition collaborator.
    #[arg(long, env = "RECOGNIZER_URL")]
    recognizer_url: String,

    /// Development mode relaxes secret requirements.
    #[arg(long, env = "ZIXUE_DEV", default_value_t = false)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // The pepper cannot change at runtime without invalidating every stored
    // hash, so its absence outside development is a startup failure.
    match std::env::var("PASSWORD_PEPPER") {
        Ok(pepper) if !pepper.is_empty() => {}
        _ if args.dev => warn!("PASSWORD_PEPPER unset, continuing in development mode"),
        _ => bail!("PASSWORD_PEPPER must be set outside development mode"),
    }

    let db = Database::connect(&args.database_url)
        .await
        .context("connecting to the database")?;

    let generator_client = Arc::new(
        GeneratorClient::new(GeneratorConfig::from_env().context("generator configuration")?)
            .context("building generator client")?,
    );
    let ai = Arc::new(
        AiRequestManager::new(
            Arc::new(AiQuestionGenerator::new(generator_client)),
            BatchConfig::from_env(),
        )
        .await,
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building collaborator http client")?;
    let state = AppState::new(
        db.clone(),
        Arc::clone(&ai),
        Arc::new(HttpDictionaryScraper::new(http.clone(), args.dictionary_url)),
        Arc::new(HttpHandwritingRecognizer::new(
            http.clone(),
            args.recognizer_url,
        )),
        Arc::new(HttpBlobStore::new(http, args.blob_store_url)),
        EngineConfig::from_env(),
    );

    let job_token = CancellationToken::new();
    let job_handles = zixue_server::jobs::spawn_jobs(db.clone(), job_token.clone());

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(addr = %args.bind, "listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Reverse dependency order: queue manager, then jobs, then the store.
    info!("shutting down");
    ai.shutdown().await;
    job_token.cancel();
    for handle in job_handles {
        let _ = handle.await;
    }
    db.prepare_for_shutdown(DB_SHUTDOWN_GRACE).await;
    db.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
