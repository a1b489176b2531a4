//! Recorded engines
//!
//! Replay engine output saved as JSON next to each other in one directory:
//! `<id>.transcript.json`, `<id>.turns.json`, `<id>.faces.json` and the
//! optional `<id>.events.json`, where `<id>` is the media file stem. Lets
//! captions be rebuilt without running any model.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    AudioEventDetector, FaceRecognizer, MediaJob, RawAudioEvent, RawFrame, RawTranscriptSegment,
    RawTurn, SpeakerDiarizer, SpeechRecognizer,
};
use crate::caption::{CaptionError, Result};

fn recorded_path(dir: &Path, job: &MediaJob, suffix: &str) -> PathBuf {
    dir.join(format!("{}.{suffix}.json", job.id))
}

async fn read_recorded<T: DeserializeOwned>(engine: &str, path: &Path) -> Result<T> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        CaptionError::engine(engine, format!("cannot read {}: {e}", path.display()))
    })?;
    debug!("replaying {}", path.display());
    serde_json::from_slice(&content)
        .map_err(|e| CaptionError::engine(engine, format!("invalid {}: {e}", path.display())))
}

/// Replays `<id>.transcript.json`
#[derive(Debug, Clone)]
pub struct RecordedTranscriber {
    dir: PathBuf,
}

impl RecordedTranscriber {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SpeechRecognizer for RecordedTranscriber {
    fn name(&self) -> &str {
        "recorded-transcript"
    }

    fn needs_audio(&self) -> bool {
        false
    }

    async fn transcribe(&self, job: &MediaJob) -> Result<Vec<RawTranscriptSegment>> {
        read_recorded(self.name(), &recorded_path(&self.dir, job, "transcript")).await
    }
}

/// Replays `<id>.turns.json`
#[derive(Debug, Clone)]
pub struct RecordedDiarizer {
    dir: PathBuf,
}

impl RecordedDiarizer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SpeakerDiarizer for RecordedDiarizer {
    fn name(&self) -> &str {
        "recorded-turns"
    }

    fn needs_audio(&self) -> bool {
        false
    }

    async fn diarize(&self, job: &MediaJob) -> Result<Vec<RawTurn>> {
        read_recorded(self.name(), &recorded_path(&self.dir, job, "turns")).await
    }
}

/// Replays `<id>.faces.json`; a missing file means no faces were seen.
#[derive(Debug, Clone)]
pub struct RecordedFaces {
    dir: PathBuf,
}

impl RecordedFaces {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FaceRecognizer for RecordedFaces {
    fn name(&self) -> &str {
        "recorded-faces"
    }

    async fn analyze(&self, job: &MediaJob) -> Result<Vec<RawFrame>> {
        let path = recorded_path(&self.dir, job, "faces");
        if !path.exists() {
            warn!("{} not found, captioning without faces", path.display());
            return Ok(Vec::new());
        }
        read_recorded(self.name(), &path).await
    }
}

/// Replays `<id>.events.json`; a missing file means no sound events.
#[derive(Debug, Clone)]
pub struct RecordedEvents {
    dir: PathBuf,
}

impl RecordedEvents {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AudioEventDetector for RecordedEvents {
    fn name(&self) -> &str {
        "recorded-events"
    }

    fn needs_audio(&self) -> bool {
        false
    }

    async fn detect(&self, job: &MediaJob) -> Result<Vec<RawAudioEvent>> {
        let path = recorded_path(&self.dir, job, "events");
        if !path.exists() {
            debug!("{} not found, no sound events", path.display());
            return Ok(Vec::new());
        }
        read_recorded(self.name(), &path).await
    }
}
