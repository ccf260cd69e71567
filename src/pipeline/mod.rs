use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub mod orchestrator;

pub use orchestrator::Orchestrator;

/// Which recognition backend a task runs through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSelector {
    /// External faster-whisper subprocess with a named model (the default path).
    Whisper { model: String },
    /// Embedded English acoustic model, plain-text output.
    English,
}

impl ModelSelector {
    pub fn default_whisper() -> Self {
        Self::Whisper {
            model: "whisper-large".to_string(),
        }
    }
}

impl Display for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whisper { model } => write!(f, "{}", model),
            Self::English => write!(f, "english"),
        }
    }
}

/// A video payload already staged on local disk, plus the metadata the
/// dispatcher validates against.
#[derive(Debug, Clone)]
pub struct StagedMedia {
    pub path: PathBuf,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStage {
    Created,
    Extracting,
    Transcribing,
    Assembling,
    Completed,
    Failed,
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal transitions: the linear happy path, plus Failed from any
    /// non-terminal stage.
    pub fn can_advance(&self, next: &TaskStage) -> bool {
        use TaskStage::*;
        matches!(
            (self, next),
            (Created, Extracting)
                | (Extracting, Transcribing)
                | (Transcribing, Assembling)
                | (Assembling, Completed)
        ) || (!self.is_terminal() && *next == Failed)
    }
}

impl Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One end-to-end submission. Owned exclusively by the worker executing it
/// and discarded when the worker finishes; nothing persists it.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub input: StagedMedia,
    pub model: ModelSelector,
    pub stage: TaskStage,
    pub result_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(input: StagedMedia, model: ModelSelector) -> Self {
        Self {
            id: format!("task-{}", Uuid::new_v4()),
            input,
            model,
            stage: TaskStage::Created,
            result_path: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn advance(&mut self, next: TaskStage) {
        if !self.stage.can_advance(&next) {
            warn!("Task {}: illegal transition {} -> {}, ignoring", self.id, self.stage, next);
            return;
        }
        info!("Task {}: {} -> {}", self.id, self.stage, next);
        self.stage = next;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = TaskStage::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

/// Removes tracked intermediate files when dropped, so staged videos and
/// extracted audio disappear on every exit path, not just the happy one.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if path.exists() {
                match std::fs::remove_file(&path) {
                    Ok(_) => info!("Removed temporary file: {}", path.display()),
                    Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged() -> StagedMedia {
        StagedMedia {
            path: PathBuf::from("/tmp/video.mp4"),
            content_type: "video/mp4".to_string(),
            size_bytes: 1024,
        }
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new(staged(), ModelSelector::default_whisper());
        let b = Task::new(staged(), ModelSelector::default_whisper());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("task-"));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = Task::new(staged(), ModelSelector::default_whisper());
        for stage in [
            TaskStage::Extracting,
            TaskStage::Transcribing,
            TaskStage::Assembling,
            TaskStage::Completed,
        ] {
            task.advance(stage.clone());
            assert_eq!(task.stage, stage);
        }
    }

    #[test]
    fn test_failed_is_reachable_from_any_non_terminal_stage() {
        for stage in [
            TaskStage::Created,
            TaskStage::Extracting,
            TaskStage::Transcribing,
            TaskStage::Assembling,
        ] {
            assert!(stage.can_advance(&TaskStage::Failed));
        }
        assert!(!TaskStage::Completed.can_advance(&TaskStage::Failed));
        assert!(!TaskStage::Failed.can_advance(&TaskStage::Failed));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut task = Task::new(staged(), ModelSelector::default_whisper());
        task.advance(TaskStage::Assembling);
        assert_eq!(task.stage, TaskStage::Created);
    }

    #[test]
    fn test_fail_is_sticky_in_terminal_states() {
        let mut task = Task::new(staged(), ModelSelector::default_whisper());
        task.advance(TaskStage::Extracting);
        task.fail("decoder exploded");
        assert_eq!(task.stage, TaskStage::Failed);
        assert_eq!(task.error.as_deref(), Some("decoder exploded"));

        task.fail("second error");
        assert_eq!(task.error.as_deref(), Some("decoder exploded"));
    }

    #[test]
    fn test_temp_artifacts_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("staged.mp4");
        std::fs::write(&file, b"data").unwrap();

        {
            let mut artifacts = TempArtifacts::new();
            artifacts.track(file.clone());
        }
        assert!(!file.exists());
    }
}
