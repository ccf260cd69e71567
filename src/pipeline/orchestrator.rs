use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::media::MediaExtractor;
use crate::progress::{ProgressHub, TaskProgress};
use crate::recognize::SpeechRecognizer;
use crate::subtitle::SubtitleAssembler;

use super::{ModelSelector, Task, TaskStage, TempArtifacts};

/// Runs one task end to end: extract -> transcribe -> assemble, publishing
/// a progress event at every stage boundary and on failure. Every stage is
/// terminal on error; nothing is retried.
pub struct Orchestrator {
    extractor: Arc<dyn MediaExtractor>,
    whisper: Arc<dyn SpeechRecognizer>,
    english: Arc<dyn SpeechRecognizer>,
    assembler: SubtitleAssembler,
    hub: Arc<ProgressHub>,
    output_dir: PathBuf,
    stage_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        whisper: Arc<dyn SpeechRecognizer>,
        english: Arc<dyn SpeechRecognizer>,
        assembler: SubtitleAssembler,
        hub: Arc<ProgressHub>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            whisper,
            english,
            assembler,
            hub,
            output_dir,
            stage_timeout: Duration::from_secs(30 * 60),
        }
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    /// Drives the task to Completed or Failed. The result path is returned
    /// to the worker, which only logs it; the submitter already got its
    /// acknowledgment and learns the outcome through the progress topic.
    pub async fn run(&self, mut task: Task) -> Result<PathBuf, PipelineError> {
        let progress = TaskProgress::new(self.hub.clone(), &task.id);
        progress.send(format!(
            "start processing uploaded video (model: {}, {} MB)",
            task.model,
            task.input.size_bytes / 1024 / 1024
        ));

        // staged video and extracted audio are removed on every exit path
        let mut artifacts = TempArtifacts::new();
        artifacts.track(task.input.path.clone());

        match self.run_stages(&mut task, &progress, &mut artifacts).await {
            Ok(path) => {
                task.advance(TaskStage::Completed);
                task.result_path = Some(path.clone());
                info!("Task {} completed, output: {}", task.id, path.display());
                progress.send(format!("video processing completed! output file: {}", path.display()));
                Ok(path)
            }
            Err(e) => {
                error!("Task {} failed: {}", task.id, e);
                progress.send(format!("processing failed: {}", e));
                task.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        task: &mut Task,
        progress: &TaskProgress,
        artifacts: &mut TempArtifacts,
    ) -> Result<PathBuf, PipelineError> {
        task.advance(TaskStage::Extracting);
        progress.send("step 1/3: extracting audio...");
        let audio = self
            .with_deadline("extract", self.extractor.extract(&task.input.path, progress))
            .await?;
        artifacts.track(audio.clone());

        task.advance(TaskStage::Transcribing);
        progress.send("step 2/3: transcribing speech...");
        let recognizer = match &task.model {
            ModelSelector::Whisper { .. } => &self.whisper,
            ModelSelector::English => &self.english,
        };
        let transcript = self
            .with_deadline("transcribe", recognizer.transcribe(&audio, progress))
            .await?;

        task.advance(TaskStage::Assembling);
        progress.send("step 3/3: assembling output file...");
        let output = match &task.model {
            ModelSelector::Whisper { .. } => {
                let path = self.output_dir.join(format!("{}.vtt", task.id));
                self.assembler.assemble(&transcript.text, &path, progress)?
            }
            ModelSelector::English => {
                let path = self.output_dir.join(format!("{}.txt", task.id));
                std::fs::write(&path, &transcript.text)?;
                progress.send(format!("transcription text written: {}", path.display()));
                path
            }
        };

        Ok(output)
    }

    async fn with_deadline<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        match timeout(self.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::StageTimeout {
                stage,
                secs: self.stage_timeout.as_secs(),
            }),
        }
    }
}
