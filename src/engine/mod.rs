//! Perception engine contracts
//!
//! The caption core never talks to a model directly. Each engine is a
//! capability trait producing raw, engine-shaped output that the
//! normalizer turns into the shared data model:
//! - [`SpeechRecognizer`] produces transcript segments with word timings
//! - [`SpeakerDiarizer`] produces speaker turns
//! - [`FaceRecognizer`] produces per-frame face detections
//! - [`IdentityGallery`] maps a face embedding to a known name
//! - [`AudioEventDetector`] optionally reports music, silence and other sounds
//!
//! Engines are long-lived context objects: construct them once and share
//! them across every file in a batch.

pub mod extract;
pub mod faces;
pub mod gallery;
pub mod pyannote;
pub mod recorded;
pub mod silence;
pub mod whisper;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::caption::Result;

pub use extract::{require_tool, AudioExtractor, FrameSampler, SampledFrame};
pub use faces::InsightFaceRecognizer;
pub use gallery::{cosine_similarity, FaceGallery, GalleryEntry, KnownFace};
pub use pyannote::PyannoteDiarizer;
pub use recorded::{RecordedDiarizer, RecordedEvents, RecordedFaces, RecordedTranscriber};
pub use silence::SilenceDetector;
pub use whisper::WhisperTranscriber;

/// Word timing as emitted by the ASR engine (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Transcript segment as emitted by the ASR engine (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<RawWord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Speaker turn as emitted by the diarization engine (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTurn {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// One face found in a frame, after gallery lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFaceDetection {
    /// x, y, width, height (normalized 0-1)
    pub bbox: [f32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub similarity: f32,
}

/// Face detections for one sampled frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub timestamp: f64,
    #[serde(default)]
    pub faces: Vec<RawFaceDetection>,
}

/// Non-speech audio event as emitted by an event detector (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAudioEvent {
    /// `music`, `silence`, `speech`, or any other sound label
    pub kind: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Everything the engines produced for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutputs {
    pub transcript: Vec<RawTranscriptSegment>,
    pub turns: Vec<RawTurn>,
    pub frames: Vec<RawFrame>,
    /// Empty when no event detector ran
    #[serde(default)]
    pub events: Vec<RawAudioEvent>,
}

/// One media file scheduled for captioning
#[derive(Debug, Clone)]
pub struct MediaJob {
    /// Stable identifier, used for work files and recorded engine lookups
    pub id: String,
    pub video: PathBuf,
    /// Mono 16 kHz WAV extracted from `video`
    pub audio: PathBuf,
    /// Scratch directory private to this job
    pub work_dir: PathBuf,
}

impl MediaJob {
    /// Create a job for `video`, placing work files under `work_root`.
    pub fn new(video: impl AsRef<Path>, work_root: impl AsRef<Path>) -> Self {
        let video = video.as_ref().to_path_buf();
        let id = video
            .file_stem()
            .map_or_else(|| "media".to_string(), |s| s.to_string_lossy().into_owned());
        let work_dir = work_root
            .as_ref()
            .join(format!("{id}-{}", uuid::Uuid::new_v4().simple()));
        let audio = work_dir.join("audio.wav");

        Self {
            id,
            video,
            audio,
            work_dir,
        }
    }
}

/// Produces timed transcript segments
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Engine name for logs and errors
    fn name(&self) -> &str;

    /// Whether [`MediaJob::audio`] must exist before `transcribe` runs
    fn needs_audio(&self) -> bool {
        true
    }

    async fn transcribe(&self, job: &MediaJob) -> Result<Vec<RawTranscriptSegment>>;
}

/// Produces speaker turns
#[async_trait]
pub trait SpeakerDiarizer: Send + Sync {
    fn name(&self) -> &str;

    fn needs_audio(&self) -> bool {
        true
    }

    async fn diarize(&self, job: &MediaJob) -> Result<Vec<RawTurn>>;
}

/// Produces per-frame face detections with identities
#[async_trait]
pub trait FaceRecognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, job: &MediaJob) -> Result<Vec<RawFrame>>;
}

/// Reports non-speech audio: music, silence, other sounds
#[async_trait]
pub trait AudioEventDetector: Send + Sync {
    fn name(&self) -> &str;

    fn needs_audio(&self) -> bool {
        true
    }

    async fn detect(&self, job: &MediaJob) -> Result<Vec<RawAudioEvent>>;
}

/// Maps a face embedding to a known name
pub trait IdentityGallery: Send + Sync {
    /// Best match at or above the gallery threshold, if any
    fn lookup(&self, embedding: &[f32]) -> Option<(String, f32)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_job_paths() {
        let job = MediaJob::new("/videos/interview.mp4", "/tmp/work");
        assert_eq!(job.id, "interview");
        assert!(job.work_dir.starts_with("/tmp/work"));
        assert!(job.audio.starts_with(&job.work_dir));
    }

    #[test]
    fn test_raw_frame_defaults() {
        let frame: RawFrame = serde_json::from_str(r#"{"timestamp": 1.5}"#).unwrap();
        assert!(frame.faces.is_empty());

        let face: RawFaceDetection =
            serde_json::from_str(r#"{"bbox": [0.1, 0.1, 0.2, 0.2]}"#).unwrap();
        assert_eq!(face.name, None);
        assert_eq!(face.similarity, 0.0);
    }

    #[test]
    fn test_engine_outputs_without_events() {
        let outputs: EngineOutputs =
            serde_json::from_str(r#"{"transcript": [], "turns": [], "frames": []}"#).unwrap();
        assert!(outputs.events.is_empty());
    }
}
