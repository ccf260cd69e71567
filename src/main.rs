#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use videotext_rs::dispatch::{Dispatcher, DispatcherConfig};
use videotext_rs::media::FfmpegExtractor;
use videotext_rs::pipeline::Orchestrator;
use videotext_rs::progress::ProgressHub;
use videotext_rs::recognize::{EmbeddedRecognizer, ProcessRecognizer};
use videotext_rs::subtitle::SubtitleAssembler;
use videotext_rs::utils::logger;
use videotext_rs::{AppContext, MODEL_PATH, OUTPUT_DIR, PYTHON_BIN, WHISPER_SCRIPT};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logger::init("./logs".to_string())?;
    videotext_rs::init_env();

    info!("Starting video transcription service...");

    info!("Loading embedded recognition model...");
    let english = Arc::new(EmbeddedRecognizer::new(MODEL_PATH.as_str())?);
    let whisper = Arc::new(ProcessRecognizer::new(
        PYTHON_BIN.as_str(),
        PathBuf::from(WHISPER_SCRIPT.as_str()),
    ));

    info!("Initializing progress hub and pipeline...");
    let hub = Arc::new(ProgressHub::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(FfmpegExtractor::new()),
        whisper,
        english,
        SubtitleAssembler::new(),
        hub.clone(),
        PathBuf::from(OUTPUT_DIR.as_str()),
    ));

    info!("Starting worker pool...");
    let dispatcher = Arc::new(Dispatcher::start(DispatcherConfig::default(), orchestrator));

    let ctx = Arc::new(AppContext { dispatcher, hub });

    let addr = SocketAddr::from(([127, 0, 0, 1], 7200));
    info!("Starting HTTP server at http://{}", addr);

    match videotext_rs::web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    info!("Shutting down...");
    Ok(())
}
