pub mod dispatch;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod recognize;
pub mod subtitle;
pub mod utils;
pub mod web;

use std::{env, sync::Arc};
use dispatch::Dispatcher;
use once_cell::sync::Lazy;
use progress::ProgressHub;

pub struct AppContext {
    pub dispatcher: Arc<Dispatcher>,
    pub hub: Arc<ProgressHub>,
}

const VT_STAGING_DIR: &str = "./vt_data/staging/";
const VT_OUTPUT_DIR: &str = "./vt_data/output/";
const VT_WHISPER_SCRIPT: &str = "./scripts/faster_whisper.py";
const VT_PYTHON_BIN: &str = "python3";
const VT_MODEL_PATH: &str = "./models/ggml-base.en.bin";

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => dotenv::var(key).unwrap_or_else(|_| default.to_string()),
    }
}

/// Staging directory for uploaded/downloaded videos and intermediate audio.
pub static STAGING_DIR: Lazy<String> = Lazy::new(|| env_or("VT_STAGING_DIR", VT_STAGING_DIR));

/// Directory where finished subtitle/text files are written.
pub static OUTPUT_DIR: Lazy<String> = Lazy::new(|| env_or("VT_OUTPUT_DIR", VT_OUTPUT_DIR));

/// faster-whisper driver script invoked by the external-process recognizer.
pub static WHISPER_SCRIPT: Lazy<String> = Lazy::new(|| env_or("VT_WHISPER_SCRIPT", VT_WHISPER_SCRIPT));

pub static PYTHON_BIN: Lazy<String> = Lazy::new(|| env_or("VT_PYTHON_BIN", VT_PYTHON_BIN));

/// ggml model for the embedded English recognizer.
pub static MODEL_PATH: Lazy<String> = Lazy::new(|| env_or("VT_MODEL_PATH", VT_MODEL_PATH));

pub fn init_env() {
    dotenv::dotenv().ok();

    for dir in [STAGING_DIR.as_str(), OUTPUT_DIR.as_str()] {
        std::fs::create_dir_all(dir).unwrap_or_else(|e| {
            eprintln!("Failed to create directory {}: {}", dir, e);
        });
    }
}
