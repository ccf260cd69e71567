use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rayon::prelude::*;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::progress::TaskProgress;

pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Sample frames per decode block; progress is reported in blocks.
const BLOCK_FRAMES: u64 = 1024;

/// Demuxes a video container into the mono 16 kHz PCM audio the
/// recognizers consume.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(&self, video: &Path, progress: &TaskProgress) -> Result<PathBuf, PipelineError>;
}

/// ffmpeg-backed extractor. The container demux runs through an external
/// ffmpeg process; the decode-and-resample pass runs in-process over the
/// intermediate WAV so frame-level progress can be reported.
pub struct FfmpegExtractor {
    /// Emit a progress message every this many decode blocks.
    progress_every: u64,
}

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self { progress_every: 50 }
    }

    pub fn with_progress_every(mut self, progress_every: u64) -> Self {
        self.progress_every = progress_every.max(1);
        self
    }

    fn resample_pass(&self, wav_in: &Path, wav_out: &Path, progress: &TaskProgress) -> Result<(), PipelineError> {
        // pass one: count decodable frames so progress can be a percentage
        let reader = open_wav(wav_in)?;
        let total_frames = reader.duration() as u64;
        if total_frames == 0 {
            return Err(PipelineError::MediaDecode("audio stream contains no samples".to_string()));
        }
        let channels = reader.spec().channels as usize;
        let sample_rate = reader.spec().sample_rate;
        drop(reader);
        progress.send(format!("{} audio frames to process", total_frames));

        // pass two: decode, downmix, resample, write
        let reader = open_wav(wav_in)?;
        let mono = self.decode_to_mono(reader, channels, total_frames, progress)?;
        let normalized = normalize(&mono);
        let samples = if sample_rate == TARGET_SAMPLE_RATE {
            info!("Sample rate is already {} Hz, no resampling needed", TARGET_SAMPLE_RATE);
            normalized
        } else {
            resample_to_16k(&normalized, sample_rate)?
        };
        write_pcm_wav(wav_out, &samples)
    }

    fn decode_to_mono(
        &self,
        mut reader: WavReader<std::io::BufReader<std::fs::File>>,
        channels: usize,
        total_frames: u64,
        progress: &TaskProgress,
    ) -> Result<Vec<f32>, PipelineError> {
        let mut mono = Vec::with_capacity(total_frames as usize);
        let mut frame: Vec<f32> = Vec::with_capacity(channels);
        let mut frames_done: u64 = 0;

        for sample in reader.samples::<i16>() {
            let s = sample.map_err(|e| PipelineError::MediaDecode(format!("failed to read samples: {}", e)))? as f32
                / 32768.0;
            frame.push(s);
            if frame.len() == channels {
                mono.push(frame.iter().sum::<f32>() / channels as f32);
                frame.clear();
                frames_done += 1;

                if frames_done % (BLOCK_FRAMES * self.progress_every) == 0 {
                    let pct = frames_done * 100 / total_frames;
                    progress.send(format!(
                        "audio extract progress: {}% ({}/{} frames)",
                        pct, frames_done, total_frames
                    ));
                }
            }
        }

        Ok(mono)
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, progress: &TaskProgress) -> Result<PathBuf, PipelineError> {
        progress.send("starting audio extraction from video...");

        let demuxed = demux_to_wav(video).await?;
        progress.send("audio stream demuxed, starting decode pass...");

        let out = sibling(video, "_audio.wav");
        let result = self.resample_pass(&demuxed, &out, progress);
        if let Err(e) = std::fs::remove_file(&demuxed) {
            warn!("Failed to remove intermediate WAV {}: {}", demuxed.display(), e);
        }
        result?;

        progress.send(format!("audio extraction completed: {}", out.display()));
        Ok(out)
    }
}

/// Runs ffmpeg to pull the first audio stream out of the container as
/// 16-bit PCM WAV at the source sample rate.
async fn demux_to_wav(video: &Path) -> Result<PathBuf, PipelineError> {
    let out = sibling(video, "_demux.wav");

    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-vn")
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg(&out)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().last().unwrap_or("unknown ffmpeg error");
        return Err(PipelineError::MediaDecode(format!(
            "cannot open source or no audio stream: {}",
            detail
        )));
    }

    Ok(out)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("media");
    path.with_file_name(format!("{}{}", stem, suffix))
}

fn open_wav(path: &Path) -> Result<WavReader<std::io::BufReader<std::fs::File>>, PipelineError> {
    let reader =
        WavReader::open(path).map_err(|e| PipelineError::MediaDecode(format!("failed to read WAV file: {}", e)))?;

    if reader.spec().sample_format != SampleFormat::Int {
        return Err(PipelineError::MediaDecode(
            "unsupported sample format: expected integer format".to_string(),
        ));
    }
    if reader.spec().bits_per_sample != 16 {
        return Err(PipelineError::MediaDecode(
            "unsupported bits per sample: expected 16 bits".to_string(),
        ));
    }

    Ok(reader)
}

fn normalize(samples: &[f32]) -> Vec<f32> {
    let max_abs = samples.par_iter().map(|&s| s.abs()).reduce(|| 0.0, f32::max);
    if max_abs == 0.0 {
        return samples.to_vec();
    }
    samples.par_iter().map(|&s| s / max_abs).collect()
}

fn resample_to_16k(samples: &[f32], original_rate: u32) -> Result<Vec<f32>, PipelineError> {
    info!("Resampling from {} Hz to {} Hz", original_rate, TARGET_SAMPLE_RATE);

    let params = SincInterpolationParameters {
        sinc_len: 512,
        f_cutoff: 0.98,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 512,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        TARGET_SAMPLE_RATE as f64 / original_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| PipelineError::MediaDecode(format!("failed to create resampler: {}", e)))?;

    let resampled = resampler
        .process(&[samples.to_vec()], None)
        .map_err(|e| PipelineError::MediaDecode(format!("resampling failed: {}", e)))?;

    Ok(resampled.into_iter().next().unwrap_or_default())
}

fn write_pcm_wav(path: &Path, samples: &[f32]) -> Result<(), PipelineError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer =
        WavWriter::create(path, spec).map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;

    Ok(())
}

/// Reads an extracted (mono or multi-channel, 16-bit) WAV back as
/// normalized f32 mono samples for the embedded recognizer.
pub fn read_pcm_samples(path: &Path) -> Result<Vec<f32>, PipelineError> {
    let mut reader = open_wav(path)?;
    let channels = reader.spec().channels as usize;

    let samples: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| s.map(|v| v as f32 / 32768.0))
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| PipelineError::MediaDecode(format!("failed to read samples: {}", e)))?;

    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .par_chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect())
}
