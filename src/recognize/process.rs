use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::progress::TaskProgress;

use super::{segments_from_blocks, SpeechRecognizer, Transcript};

/// Recognition backend that shells out to a faster-whisper driver script.
///
/// The subprocess gets the audio path as its sole argument and writes the
/// transcript to stdout. Engine chatter is translated into user-facing
/// progress by matching known textual markers; the marker set lives here so
/// a backend swap never touches the orchestrator.
pub struct ProcessRecognizer {
    program: String,
    script: PathBuf,
    /// Heartbeat cadence when no marker matched, in output lines.
    heartbeat_every: usize,
}

impl ProcessRecognizer {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            heartbeat_every: 10,
        }
    }

    fn relay_marker(&self, line: &str, line_count: usize, progress: &TaskProgress) {
        if line.contains("Loading model") {
            progress.send("loading whisper model...");
        } else if line.contains("Transcribing") {
            progress.send("transcribing audio content...");
        } else if line.contains("Processing") {
            progress.send("processing audio segment...");
        } else if line.contains("Detected language") {
            progress.send(format!("detected language: {}", line));
        } else if line.contains("Transcription completed") {
            progress.send("transcription completed");
        } else if line_count % self.heartbeat_every == 0 {
            progress.send(format!("transcription in progress... ({} lines of output)", line_count));
        }
    }
}

#[async_trait]
impl SpeechRecognizer for ProcessRecognizer {
    async fn transcribe(&self, audio: &Path, progress: &TaskProgress) -> Result<Transcript, PipelineError> {
        info!("Launching recognition process: {} {}", self.program, self.script.display());
        progress.send("starting whisper recognition engine...");

        // kill_on_drop lets the orchestrator's stage deadline reap a hung engine
        let mut child = Command::new(&self.program)
            .arg(&self.script)
            .arg(audio)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::RecognitionEngine("failed to capture engine stdout".to_string()))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut output = String::new();
        let mut line_count = 0usize;

        while let Some(line) = lines.next_line().await? {
            output.push_str(&line);
            output.push('\n');
            line_count += 1;
            self.relay_marker(&line, line_count, progress);
        }

        let status = child.wait().await?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            error!("Recognition process failed with exit code {}", code);
            return Err(PipelineError::RecognitionProcess { code });
        }

        info!("Recognition process finished, {} line(s) of output", line_count);
        progress.send(format!("speech-to-text finished, {} line(s) of engine output", line_count));

        let segments = segments_from_blocks(&output);
        Ok(Transcript { text: output, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressHub;
    use std::sync::Arc;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("engine.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_captures_stdout_and_relays_markers() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            concat!(
                "echo 'Loading model whisper-large'\n",
                "echo 'Detected language: en'\n",
                "echo '1'\n",
                "echo '00:00:01,000 --> 00:00:02,000'\n",
                "echo 'hello world'\n",
                "echo ''\n",
                "echo 'Transcription completed'\n",
            ),
        );

        let hub = Arc::new(ProgressHub::new());
        let mut session = hub.subscribe("task-test");
        let progress = TaskProgress::new(hub.clone(), "task-test");

        let recognizer = ProcessRecognizer::new("sh", script);
        let transcript = recognizer
            .transcribe(Path::new("/tmp/audio.wav"), &progress)
            .await
            .unwrap();

        assert!(transcript.text.contains("hello world"));
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].index, 1);

        let mut messages = Vec::new();
        while let Ok(event) = session.receiver.try_recv() {
            messages.push(event.text);
        }
        assert!(messages.iter().any(|m| m.contains("loading whisper model")));
        assert!(messages.iter().any(|m| m.contains("detected language")));
        assert!(messages.iter().any(|m| m.contains("transcription completed")));
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo 'partial output'\nexit 3\n");

        let hub = Arc::new(ProgressHub::new());
        let progress = TaskProgress::new(hub, "task-test");

        let recognizer = ProcessRecognizer::new("sh", script);
        let err = recognizer
            .transcribe(Path::new("/tmp/audio.wav"), &progress)
            .await
            .unwrap_err();

        match err {
            PipelineError::RecognitionProcess { code } => assert_eq!(code, 3),
            other => panic!("expected RecognitionProcess, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_an_io_error() {
        let hub = Arc::new(ProgressHub::new());
        let progress = TaskProgress::new(hub, "task-test");

        let recognizer = ProcessRecognizer::new("definitely-not-a-real-binary", "/tmp/nope.py");
        let err = recognizer
            .transcribe(Path::new("/tmp/audio.wav"), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
