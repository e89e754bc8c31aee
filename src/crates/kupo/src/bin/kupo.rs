//! Kupo daemon binary
//!
//! Wires configuration, storage, the chain consumer, the garbage collector,
//! and the HTTP server together, and tears them down in reverse order on
//! shutdown.

use anyhow::Context;
use clap::Parser;
use kupo::api::routes::{create_router, AppState};
use kupo::cli::{Cli, Command, RunArgs};
use kupo::config::{Config, DatabaseLocation, ProducerConfig};
use kupo::consumer::{ChainConsumer, OgmiosBlockFetcher, OgmiosProducer};
use kupo::db::repositories::{CheckpointRepository, PatternRepository};
use kupo::db::Database;
use kupo::gc::GarbageCollector;
use kupo::health::Health;
use kupo::registry::PatternRegistry;
use kupo::version;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Some(Command::Version) => {
            println!("{} {}", version::PKG_NAME, version::VERSION);
            Ok(())
        }
        Some(Command::HealthCheck { host, port }) => runtime.block_on(health_check(&host, port)),
        None => runtime.block_on(run(cli.run)),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let directives = args.tracing_directives();
    let config = args.into_config()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .init();
    tracing::info!("{} {}", version::PKG_NAME, version::VERSION);

    let db = open_database(&config).await?;
    tracing::info!("running database migrations");
    db.run_migrations().await?;
    if config.defer_indexes {
        tracing::info!("secondary index installation deferred");
    } else {
        db.install_indexes().await?;
    }

    // Patterns survive restarts: the live set is the union of what was
    // persisted and what the command line adds.
    let mut tx = db.begin_write().await?;
    for pattern in &config.patterns {
        PatternRepository::insert(tx.conn(), pattern).await?;
    }
    let patterns = PatternRepository::list(tx.conn()).await?;
    tx.commit().await?;
    tracing::info!(count = patterns.len(), "patterns registered");
    let registry = PatternRegistry::with_patterns(patterns);

    let health = Health::new(config.input_management, config.defer_indexes);
    let mut tx = db.begin_read().await?;
    if let Some(checkpoint) = CheckpointRepository::latest(tx.conn()).await? {
        health.set_checkpoint(checkpoint.point());
    }
    tx.commit().await?;

    let ProducerConfig::Ogmios { host, port } = &config.producer;
    let producer = OgmiosProducer::new(host, *port);
    let fetcher = Arc::new(OgmiosBlockFetcher::new(host, *port));

    let (rollback_tx, rollback_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = ChainConsumer::new(
        producer,
        db.clone(),
        registry.clone(),
        health.clone(),
        rollback_rx,
        config.since.clone(),
        config.longest_rollback,
    );
    let mut consumer_handle = tokio::spawn(consumer.run(shutdown_rx.clone()));

    let collector = GarbageCollector::new(
        db.clone(),
        config.gc_interval,
        config.input_management,
        config.longest_rollback,
    );
    let gc_handle = tokio::spawn(collector.run(shutdown_rx.clone()));

    let state = AppState {
        db: db.clone(),
        registry,
        health,
        rollback_tx,
        fetcher,
        longest_rollback: config.longest_rollback,
    };
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind((config.host, config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    tracing::info!("server listening on {}:{}", config.host, config.port);

    let server = async {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = server => result.context("http server failed")?,
        result = &mut consumer_handle => {
            let _ = shutdown_tx.send(true);
            result?.context("chain consumer failed")?;
        }
    }

    let _ = shutdown_tx.send(true);
    if !consumer_handle.is_finished() {
        consumer_handle.await?.context("chain consumer failed")?;
    }
    let _ = gc_handle.await;
    db.close().await;
    tracing::info!("shut down gracefully");
    Ok(())
}

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    match &config.database {
        DatabaseLocation::Dir(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create workdir {}", dir.display()))?;
            tracing::info!(workdir = %dir.display(), "opening database");
            Ok(Database::open(dir, config.max_concurrency).await?)
        }
        DatabaseLocation::InMemory => {
            tracing::info!("opening in-memory database");
            Ok(Database::in_memory().await?)
        }
    }
}

/// Probe a running daemon; exit 0 iff it is connected with a fresh
/// checkpoint.
async fn health_check(host: &str, port: u16) -> anyhow::Result<()> {
    let url = format!("http://{}:{}/health", host, port);
    let response = reqwest::Client::new()
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    if !response.status().is_success() {
        eprintln!("unhealthy: {} returned {}", url, response.status());
        std::process::exit(1);
    }
    let body: serde_json::Value = response.json().await.context("invalid health body")?;
    let connected = body["connection_status"] == "connected";
    let has_checkpoint = !body["most_recent_checkpoint"].is_null();
    if connected && has_checkpoint {
        println!("healthy");
        Ok(())
    } else {
        eprintln!("unhealthy: {}", body);
        std::process::exit(1);
    }
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM signal, shutting down");
        }
    }
}
