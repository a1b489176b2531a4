//! Silence detection with ffmpeg's `silencedetect` filter

use async_trait::async_trait;
use tracing::debug;

use super::extract::{path_arg, run_ffmpeg};
use super::{AudioEventDetector, MediaJob, RawAudioEvent};
use crate::caption::Result;
use crate::config::EngineConfig;

/// Reports stretches of the extracted audio quieter than a noise floor
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    noise_db: f64,
    min_seconds: f64,
}

impl SilenceDetector {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            noise_db: config.silence_noise_db,
            min_seconds: config.min_silence_seconds,
        }
    }

    fn filter(&self) -> String {
        format!("silencedetect=noise={}dB:d={}", self.noise_db, self.min_seconds)
    }
}

#[async_trait]
impl AudioEventDetector for SilenceDetector {
    fn name(&self) -> &str {
        "silencedetect"
    }

    async fn detect(&self, job: &MediaJob) -> Result<Vec<RawAudioEvent>> {
        let filter = self.filter();
        let log = run_ffmpeg(
            &[
                "-hide_banner",
                "-nostats",
                "-i",
                path_arg(&job.audio)?,
                "-af",
                &filter,
                "-f",
                "null",
                "-",
            ],
            "silence detection",
        )
        .await?;

        let events = parse_silencedetect(&log);
        debug!(events = events.len(), "silence detection finished");
        Ok(events)
    }
}

/// Pair up `silence_start` / `silence_end` lines from ffmpeg's log.
///
/// A start with no matching end is dropped.
fn parse_silencedetect(log: &str) -> Vec<RawAudioEvent> {
    let mut events = Vec::new();
    let mut open = None;

    for line in log.lines() {
        if let Some(start) = value_after(line, "silence_start:") {
            open = Some(start);
        } else if let Some(end) = value_after(line, "silence_end:") {
            if let Some(start) = open.take() {
                events.push(RawAudioEvent {
                    kind: "silence".to_string(),
                    start,
                    end,
                    confidence: None,
                });
            }
        }
    }

    events
}

fn value_after(line: &str, key: &str) -> Option<f64> {
    let rest = &line[line.find(key)? + key.len()..];
    rest.split_whitespace().next()?.parse().ok()
}
