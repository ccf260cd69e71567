use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::progress::TaskProgress;

pub mod process;
pub mod whisper;

pub use process::ProcessRecognizer;
pub use whisper::EmbeddedRecognizer;

/// One timed piece of a transcript. Indexes are 1-based, strictly
/// increasing and gapless; start never exceeds end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Result of one recognition run: the raw text payload the assembler
/// consumes, plus timed segments where the backend provides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Boundary over interchangeable transcription backends. Implementations
/// translate whatever the engine emits into progress messages and a final
/// transcript; any failure discards partial output.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &Path, progress: &TaskProgress) -> Result<Transcript, PipelineError>;
}

/// Parses cue-shaped engine output (blank-line-separated blocks of
/// index / timecode / text) into validated segments, renumbering from 1.
/// Blocks that do not parse cleanly are skipped.
pub fn segments_from_blocks(raw: &str) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();

    for block in raw.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }
        let Some((start, end)) = parse_timecode_line(lines[1]) else {
            continue;
        };
        if start > end {
            continue;
        }
        segments.push(TranscriptSegment {
            index: segments.len() + 1,
            start,
            end,
            text: lines[2].to_string(),
        });
    }

    segments
}

/// Parses `HH:MM:SS,mmm --> HH:MM:SS,mmm` (either `,` or `.` as the
/// sub-second delimiter) into start/end seconds.
fn parse_timecode_line(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end.trim())?))
}

fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.replace(',', ".").parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "1\n00:00:01,000 --> 00:00:02,500\nhello there\n\n2\n00:00:03,000 --> 00:00:04,000\nsecond line\n";

    #[test]
    fn test_segments_are_gapless_from_one_with_ordered_times() {
        let segments = segments_from_blocks(RAW);
        assert_eq!(segments.len(), 2);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i + 1);
            assert!(segment.start <= segment.end);
        }
        assert_eq!(segments[0].text, "hello there");
        assert!((segments[1].start - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_blocks_are_skipped_and_numbering_stays_gapless() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\njust one line\n\n3\nnot a timecode\ntext\n\n4\n00:00:05,000 --> 00:00:06,000\nlast\n";
        let segments = segments_from_blocks(raw);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[1].index, 2);
        assert_eq!(segments[1].text, "last");
    }

    #[test]
    fn test_reversed_timecode_is_rejected() {
        let raw = "1\n00:00:05,000 --> 00:00:01,000\nbackwards\n";
        assert!(segments_from_blocks(raw).is_empty());
    }

    #[test]
    fn test_timestamp_accepts_both_delimiters() {
        assert_eq!(parse_timestamp("00:00:01,500"), Some(1.5));
        assert_eq!(parse_timestamp("00:00:01.500"), Some(1.5));
        assert_eq!(parse_timestamp("01:02:03,000"), Some(3723.0));
        assert_eq!(parse_timestamp("garbage"), None);
    }
}
