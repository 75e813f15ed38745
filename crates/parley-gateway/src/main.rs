//! parley server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `PARLEY_`-prefixed environment variables, opens the SQLite store, wires
//! the pipeline to the HTTP inference and Cloud API delivery clients, and
//! serves webhooks plus the `/api` surface.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use parley_engine::{Pipeline, WorkerPool};
use parley_gateway::{AppState, ServerConfig};
use parley_http::{CloudApiDelivery, HttpInference};
use parley_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Parley engagement gateway")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PARLEY").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if server_cfg.channels.is_empty() {
    tracing::warn!("no channels configured; every webhook will be rejected");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  let inference = Arc::new(
    HttpInference::new(server_cfg.inference.clone()).context("failed to set up inference")?,
  );
  let credentials: HashMap<_, _> = server_cfg
    .channels
    .iter()
    .map(|c| (c.id.clone(), c.credentials()))
    .collect();
  let delivery = Arc::new(
    CloudApiDelivery::new(
      server_cfg.graph_base_url.clone(),
      credentials,
      server_cfg.pipeline.delivery_timeout(),
    )
    .context("failed to set up delivery")?,
  );

  let pool = Arc::new(WorkerPool::start(
    store.clone(),
    delivery.clone(),
    &server_cfg.pipeline,
  ));
  let pipeline = Arc::new(Pipeline::new(
    store.clone(),
    inference,
    delivery,
    pool.clone(),
    server_cfg.pipeline.clone(),
  ));

  let state = AppState::new(pipeline.clone(), server_cfg.channels.clone());
  let app = parley_gateway::app(state, store);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(channels = server_cfg.channels.len(), "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("server error")?;

  tracing::info!("waiting for assistant replies");
  pipeline.settle().await;
  tracing::info!("draining automation queue");
  pool.shutdown().await;
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
