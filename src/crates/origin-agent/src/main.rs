use anyhow::Context;
use clap::Parser;
use llm::ProviderManager;
use notegraph_checkpoint::FileSaver;
use origin_agent::config::Settings;
use origin_agent::store::{JsonNoteStore, KeywordSearchIndex};
use origin_agent::supervisor::AgentService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "origin-agent", about = "Origin notes agent backend")]
struct Args {
    /// Bind address.
    #[arg(long, env = "ORIGIN_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP port.
    #[arg(long, env = "ORIGIN_PORT", default_value_t = 8765)]
    port: u16,

    /// Data directory (notes, checkpoints, provider config).
    #[arg(long, env = "ORIGIN_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("origin_agent=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let settings = Arc::new(Settings {
        host: args.host.clone(),
        port: args.port,
        providers_path: args.data_dir.join("providers.json"),
        data_dir: args.data_dir,
        ..Settings::default()
    });
    tracing::info!(data_dir = %settings.data_dir.display(), "origin-agent starting");

    let providers = Arc::new(
        ProviderManager::load(&settings.providers_path)
            .await
            .context("loading provider config")?,
    );
    let saver = Arc::new(FileSaver::new(settings.checkpoints_dir()));
    let store = Arc::new(
        JsonNoteStore::open(settings.notes_path())
            .await
            .context("opening note store")?,
    );
    let index = Arc::new(KeywordSearchIndex::new(store.clone()));

    let service = Arc::new(AgentService::new(
        providers,
        saver,
        store,
        index,
        settings.clone(),
    ));

    let app = origin_agent::api::router(service);
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .context("invalid bind address")?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
