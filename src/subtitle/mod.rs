use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PipelineError;
use crate::progress::TaskProgress;

/// Converts raw cue-shaped transcript text into a WebVTT document.
///
/// Blocks are separated by blank lines; only blocks with at least three
/// lines (index, timecode, text) become cues, the rest are skipped without
/// error. Valid cues are renumbered 1..N so skipped blocks never leave
/// gaps in the sequence.
pub struct SubtitleAssembler {
    text_prefix: &'static str,
    milestone_every: usize,
}

impl SubtitleAssembler {
    pub fn new() -> Self {
        Self {
            text_prefix: "=== ",
            milestone_every: 10,
        }
    }

    pub fn assemble(&self, raw: &str, output: &Path, progress: &TaskProgress) -> Result<PathBuf, PipelineError> {
        info!("Generating subtitle file: {}", output.display());
        progress.send("generating WebVTT subtitle file...");

        // plain UTF-8 writes: downstream consumers assume no byte-order marker
        let file = File::create(output)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "WEBVTT")?;
        writeln!(writer)?;

        let blocks: Vec<&str> = raw.split("\n\n").collect();
        let total = blocks.len();
        progress.send(format!("{} transcript block(s) to process", total));

        let mut cue_number = 0usize;
        for (i, block) in blocks.iter().enumerate() {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }

            progress.send(format!(
                "processing transcript block {}/{} ({:.1}%)",
                i + 1,
                total,
                (i + 1) as f64 * 100.0 / total as f64
            ));

            let lines: Vec<&str> = block.lines().collect();
            if lines.len() < 3 {
                // malformed block, not an error
                continue;
            }

            cue_number += 1;
            writeln!(writer, "{}", cue_number)?;
            // VTT uses '.' as the millisecond delimiter where SRT uses ','
            writeln!(writer, "{}", lines[1].replace(',', "."))?;
            writeln!(writer, "{}{}", self.text_prefix, lines[2])?;
            writeln!(writer)?;

            if cue_number % self.milestone_every == 0 {
                progress.send(format!("{} cue(s) written so far", cue_number));
            }
        }

        writer.flush()?;
        progress.send(format!(
            "subtitle file generated ({} cue(s), UTF-8 no BOM): {}",
            cue_number,
            output.display()
        ));

        Ok(output.to_path_buf())
    }
}

impl Default for SubtitleAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressHub;
    use std::sync::Arc;

    fn progress() -> TaskProgress {
        TaskProgress::new(Arc::new(ProgressHub::new()), "task-test")
    }

    fn assemble(raw: &str) -> String {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.vtt");
        SubtitleAssembler::new().assemble(raw, &output, &progress()).unwrap();
        std::fs::read_to_string(&output).unwrap()
    }

    #[test]
    fn test_valid_blocks_become_renumbered_cues() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\n2\n00:00:03,000 --> 00:00:04,000\nsecond\n";
        let vtt = assemble(raw);

        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("1\n00:00:01.000 --> 00:00:02.000\n=== first\n"));
        assert!(vtt.contains("2\n00:00:03.000 --> 00:00:04.000\n=== second\n"));
    }

    #[test]
    fn test_short_blocks_are_skipped_without_gaps() {
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\nstray line\n\n3\n00:00:05,000 --> 00:00:06,000\nthird\n";
        let vtt = assemble(raw);

        assert!(!vtt.contains("stray line"));
        // the second valid cue is numbered 2 even though its source block was third
        assert!(vtt.contains("\n2\n00:00:05.000 --> 00:00:06.000\n=== third\n"));
    }

    #[test]
    fn test_timecode_substitution_is_idempotent() {
        let srt_line = "00:00:01,000 --> 00:00:02,000";
        let once = srt_line.replace(',', ".");
        assert_eq!(once, "00:00:01.000 --> 00:00:02.000");
        assert_eq!(once.replace(',', "."), once);
    }

    #[test]
    fn test_output_has_no_byte_order_marker() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.vtt");
        let raw = "1\n00:00:01,000 --> 00:00:02,000\nhello\n";
        SubtitleAssembler::new().assemble(raw, &output, &progress()).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[..6], b"WEBVTT");
        assert_ne!(&bytes[..3], b"\xef\xbb\xbf");
    }

    #[test]
    fn test_empty_transcript_yields_header_only() {
        let vtt = assemble("");
        assert_eq!(vtt, "WEBVTT\n\n");
    }

    #[test]
    fn test_milestone_progress_every_ten_cues() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.vtt");

        let mut raw = String::new();
        for i in 1..=12 {
            raw.push_str(&format!("{}\n00:00:0{},000 --> 00:00:0{},500\nline {}\n\n", i, i % 10, i % 10, i));
        }

        let hub = Arc::new(ProgressHub::new());
        let mut session = hub.subscribe("task-test");
        let progress = TaskProgress::new(hub.clone(), "task-test");
        SubtitleAssembler::new().assemble(&raw, &output, &progress).unwrap();

        let mut saw_milestone = false;
        while let Ok(event) = session.receiver.try_recv() {
            if event.text.contains("10 cue(s) written") {
                saw_milestone = true;
            }
        }
        assert!(saw_milestone);
    }
}
