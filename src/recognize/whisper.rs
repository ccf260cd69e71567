use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::PipelineError;
use crate::media::read_pcm_samples;
use crate::progress::TaskProgress;

use super::{SpeechRecognizer, Transcript, TranscriptSegment};

/// Embedded recognition backend: a whisper model loaded in-process,
/// used for the English plain-text path. The model set is fixed at
/// construction; audio streams through the engine and the recognized
/// hypotheses are concatenated into the transcript.
///
/// The decode itself is CPU-bound and runs on a blocking thread, so the
/// runtime keeps serving other tasks and the stage deadline stays armed.
pub struct EmbeddedRecognizer {
    whisper_ctx: Arc<WhisperContext>,
    language: String,
}

impl EmbeddedRecognizer {
    pub fn new(model_path: &str) -> Result<Self, PipelineError> {
        match WhisperContext::new_with_params(model_path, WhisperContextParameters::default()) {
            Ok(whisper_ctx) => Ok(Self {
                whisper_ctx: Arc::new(whisper_ctx),
                language: "en".to_string(),
            }),
            Err(e) => Err(PipelineError::RecognitionEngine(format!(
                "failed to open whisper model: {}",
                e
            ))),
        }
    }
}

fn build_params(language: &str) -> FullParams {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

    params.set_temperature(0.3);
    params.set_n_threads(4);
    params.set_translate(false);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_no_context(false);
    params.set_single_segment(false);
    params.set_suppress_blank(true);
    params.set_suppress_non_speech_tokens(true);
    params.set_language(Some(language));

    params
}

fn decode(
    ctx: &WhisperContext,
    language: &str,
    samples: &[f32],
) -> Result<(String, Vec<TranscriptSegment>), PipelineError> {
    let mut state = ctx
        .create_state()
        .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;

    state
        .full(build_params(language), samples)
        .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;

    let num_segments = state
        .full_n_segments()
        .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;

    let mut segments = Vec::new();
    let mut full_text = String::new();

    for i in 0..num_segments {
        let text = state
            .full_get_segment_text(i)
            .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;
        let start = state
            .full_get_segment_t0(i)
            .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;
        let end = state
            .full_get_segment_t1(i)
            .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;

        if !full_text.is_empty() {
            full_text.push(' ');
        }
        full_text.push_str(text.trim());

        // whisper timestamps are centiseconds
        segments.push(TranscriptSegment {
            index: i as usize + 1,
            start: start as f64 / 100.0,
            end: end as f64 / 100.0,
            text: text.trim().to_string(),
        });
    }

    Ok((full_text, segments))
}

#[async_trait]
impl SpeechRecognizer for EmbeddedRecognizer {
    async fn transcribe(&self, audio: &Path, progress: &TaskProgress) -> Result<Transcript, PipelineError> {
        progress.send("running embedded recognition engine...");
        let samples = read_pcm_samples(audio)?;

        let ctx = self.whisper_ctx.clone();
        let language = self.language.clone();
        let (full_text, segments) =
            tokio::task::spawn_blocking(move || decode(&ctx, &language, &samples))
                .await
                .map_err(|e| PipelineError::RecognitionEngine(format!("decode task failed: {}", e)))??;

        info!("Embedded engine recognized {} segment(s)", segments.len());
        progress.send(format!("recognition finished, {} segment(s)", segments.len()));

        Ok(Transcript {
            text: full_text,
            segments,
        })
    }
}
