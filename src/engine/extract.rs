//! Audio extraction and frame sampling via ffmpeg

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::caption::{CaptionError, Result};

/// Fail with [`CaptionError::MissingDependency`] when `tool` is not on PATH.
pub fn require_tool(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|_| CaptionError::MissingDependency(format!("{tool} not found in PATH")))
}

pub(crate) fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        CaptionError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("non UTF-8 path: {}", path.display()),
        ))
    })
}

/// Run ffmpeg with `args`, mapping a non-zero exit to an engine error.
///
/// Returns ffmpeg's log (stderr), where filters such as `silencedetect`
/// report their findings.
pub(crate) async fn run_ffmpeg(args: &[&str], what: &str) -> Result<String> {
    let ffmpeg = require_tool("ffmpeg")?;
    let output = Command::new(ffmpeg)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last = stderr.lines().last().unwrap_or("unknown error");
        return Err(CaptionError::engine("ffmpeg", format!("{what} failed: {last}")));
    }
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

/// Audio extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioExtractor;

impl AudioExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract audio track as WAV (16kHz mono for Whisper and pyannote)
    pub async fn extract(&self, video_path: &Path, output_path: &Path) -> Result<()> {
        run_ffmpeg(
            &[
                "-i",
                path_arg(video_path)?,
                "-vn", // No video
                "-acodec",
                "pcm_s16le",
                "-ar",
                "16000",
                "-ac",
                "1",
                path_arg(output_path)?,
                "-y",
            ],
            "audio extraction",
        )
        .await?;
        Ok(())
    }
}

/// A still frame written to disk by [`FrameSampler`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledFrame {
    pub path: PathBuf,
    /// Seconds from the start of the video
    pub timestamp: f64,
}

/// Samples frames at a fixed rate
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    rate: f64,
}

impl FrameSampler {
    /// `rate` is in frames per second.
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Write frames of `video_path` into `output_dir`, returned in time order.
    ///
    /// Frame `n` (1-based, as ffmpeg numbers its output) covers
    /// `[(n - 1) / rate, n / rate)`; its start is used as the timestamp.
    pub async fn sample(&self, video_path: &Path, output_dir: &Path) -> Result<Vec<SampledFrame>> {
        tokio::fs::create_dir_all(output_dir).await?;
        let pattern = output_dir.join("frame_%06d.jpg");

        run_ffmpeg(
            &[
                "-i",
                path_arg(video_path)?,
                "-vf",
                &format!("fps={}", self.rate),
                "-q:v",
                "2",
                path_arg(&pattern)?,
                "-y",
            ],
            "frame sampling",
        )
        .await?;

        self.collect(output_dir)
    }

    fn collect(&self, output_dir: &Path) -> Result<Vec<SampledFrame>> {
        let mut frames: Vec<SampledFrame> = std::fs::read_dir(output_dir)?
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let index = frame_index(&path)?;
                Some(SampledFrame {
                    timestamp: (index.saturating_sub(1)) as f64 / self.rate,
                    path,
                })
            })
            .collect();

        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(frames)
    }
}

/// Parse `frame_000012.jpg` into 12.
fn frame_index(path: &Path) -> Option<u64> {
    if path.extension()? != "jpg" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix("frame_")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index() {
        assert_eq!(frame_index(Path::new("/tmp/frame_000012.jpg")), Some(12));
        assert_eq!(frame_index(Path::new("/tmp/frame_000012.png")), None);
        assert_eq!(frame_index(Path::new("/tmp/audio.wav")), None);
    }

    #[test]
    fn test_collect_orders_frames_by_time() {
        let dir = std::env::temp_dir().join(format!("captionfuse-frames-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for n in [3, 1, 2] {
            std::fs::write(dir.join(format!("frame_{n:06}.jpg")), b"").unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"").unwrap();

        let frames = FrameSampler::new(2.0).collect(&dir).unwrap();

        let times: Vec<f64> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_tool() {
        let err = require_tool("captionfuse-no-such-tool").unwrap_err();
        assert!(matches!(err, CaptionError::MissingDependency(_)));
    }
}
