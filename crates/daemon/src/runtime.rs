// Runtime wiring: configuration → store → gateway → provider →
// scheduler → API server, with graceful shutdown on ctrl-c.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::{self, AppState, RepoFacts};
use crate::config::{self, DaemonConfig};
use crate::credentials;
use crate::git::worker::{CommitAuthor, GitWorker};
use crate::message::ollama::OllamaClient;
use crate::message::{MessageClient, MessageProvider};
use crate::scheduler::attempt::CommitOrchestrator;
use crate::scheduler::SchedulerCore;
use crate::store::HistoryStore;

/// Load configuration and run the daemon until shutdown. Configuration
/// problems are fatal here: a scheduler pointed at a bad repository
/// must not start retrying.
pub async fn run() -> Result<()> {
    let config = DaemonConfig::load().context("failed to load configuration")?;
    config.validate().context("configuration rejected at startup")?;
    let db_path = config::history_db_path().context("could not determine home directory")?;
    run_with_config(config, &db_path).await
}

pub async fn run_with_config(config: DaemonConfig, db_path: &std::path::Path) -> Result<()> {
    let store = Arc::new(HistoryStore::open(db_path)?);
    info!(path = %db_path.display(), "history store opened");

    let push_token = credentials::push_token().unwrap_or_else(|error| {
        warn!(error = %error, "push token lookup failed, pushing without credentials");
        None
    });

    let worker = GitWorker::new(&config.repository.path, config.repository.branch.clone())
        .with_remote(config.push.remote.clone())
        .with_author(CommitAuthor {
            name: config.commit.author_name.clone(),
            email: config.commit.author_email.clone(),
        })
        .with_push_token(push_token);

    match worker.current_branch() {
        Ok(branch) => {
            info!(repo = %config.repository.path.display(), %branch, "git repository initialized")
        }
        Err(error) => warn!(error = %error, "could not read current branch"),
    }

    let client = build_message_client(&config).await;
    let provider = MessageProvider::new(client);

    let settings = Arc::new(RwLock::new(api::settings_from_config(&config)));
    let orchestrator = CommitOrchestrator::new(
        worker,
        provider,
        store.clone(),
        settings.clone(),
        config.ai.theme.clone(),
    );
    let scheduler = SchedulerCore::new(orchestrator, settings.clone());

    if config.schedule.autostart {
        scheduler.start();
    } else {
        info!("autostart disabled, waiting for a start control action");
    }

    let facts = Arc::new(RepoFacts {
        repository: config.repository.path.display().to_string(),
        branch: config.repository.branch.clone(),
        ai_enabled: config.ai.enabled,
        ai_model: Some(config.ai.model.clone()),
        theme: config.ai.theme.clone(),
    });

    let state =
        AppState { scheduler: Arc::new(scheduler.clone()), store, settings, facts };
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind API listener on {}", config.server.bind))?;
    info!(addr = %config.server.bind, "api server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("api server exited with error")?;

    scheduler.stop();
    Ok(())
}

/// Build the Ollama client, mirroring the configured policy: disabled
/// in config means no client at all; a failed health check also demotes
/// to the template fallback for the life of the process.
async fn build_message_client(config: &DaemonConfig) -> Option<Box<dyn MessageClient>> {
    if !config.ai.enabled {
        info!("ai message generation disabled in configuration");
        return None;
    }

    let client = match OllamaClient::new(
        &config.ai.url,
        &config.ai.model,
        Duration::from_secs(config.ai.timeout_secs),
        config.ai.max_tokens,
    ) {
        Ok(client) => client,
        Err(error) => {
            warn!(error = %error, "failed to build ollama client, using template fallback");
            return None;
        }
    };

    if client.health_check().await {
        info!(url = %config.ai.url, model = %config.ai.model, "ollama client initialized");
        Some(Box::new(client))
    } else {
        warn!(url = %config.ai.url, "ollama health check failed, using template fallback");
        None
    }
}
