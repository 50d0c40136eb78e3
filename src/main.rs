use anyhow::{Context, Result};
use clap::Parser;
use live_minutes::config::DocumentBackend;
use live_minutes::{
    create_router, AppState, Config, DocumentCreator, DocumentIo, MemoryDocuments,
    NatsRecognizer, SessionServices, SheetsDocuments, TranscriptWriter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(name = "live-minutes", about = "Live meeting transcription into spreadsheets")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/live-minutes")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    let level: Level = cfg.service.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Live Minutes v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let (documents, io): (Arc<dyn DocumentCreator>, Arc<dyn DocumentIo>) = match cfg.document.backend {
        DocumentBackend::Memory => {
            info!("Document backend: in-memory");
            let store = Arc::new(MemoryDocuments::new());
            let documents: Arc<dyn DocumentCreator> = store.clone();
            let io: Arc<dyn DocumentIo> = store;
            (documents, io)
        }
        DocumentBackend::Sheets => {
            info!("Document backend: Google Sheets (template {})", cfg.document.template_sheet_id);
            let store = Arc::new(SheetsDocuments::new(
                cfg.document.access_token.clone(),
                cfg.document.template_sheet_id.clone(),
                cfg.document.drive_folder_id.clone(),
            )?);
            let documents: Arc<dyn DocumentCreator> = store.clone();
            let io: Arc<dyn DocumentIo> = store;
            (documents, io)
        }
    };

    let engine = NatsRecognizer::connect(
        &cfg.recognition.nats_url,
        Duration::from_millis(cfg.recognition.drain_timeout_ms),
    )
    .await
    .context("Failed to connect to the speech recognition service")?;

    let services = SessionServices {
        documents,
        writer: TranscriptWriter::new(io, cfg.document.layout()),
        engine: Arc::new(engine),
        settings: cfg.session_settings(),
    };

    let app = create_router(AppState::new(services));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
