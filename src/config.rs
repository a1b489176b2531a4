//! Caption configuration loaded from `~/.config/captionfuse/config.toml`.
//!
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! min_overlap_fraction = 0.3
//! min_cluster_overlap_seconds = 2.0
//! max_chars_per_line = 42
//! sound_captions = ["music", "other_sound"]
//!
//! [engines]
//! whisper_model = "small"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::caption::types::{secs_to_millis, Millis, SoundKind};
use crate::caption::CaptionError;

/// Alignment, binding and cue-shaping options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Fraction of a turn a face track must cover to become a candidate
    pub min_overlap_fraction: f64,
    /// Pooled overlap a cluster's best face needs before it is named
    pub min_cluster_overlap_seconds: f64,
    pub max_cue_duration_seconds: f64,
    pub min_cue_duration_seconds: f64,
    /// Same-speaker cues closer than this are merged
    pub cue_merge_gap_seconds: f64,
    pub max_chars_per_line: usize,
    /// Longest gap between observations of one face track
    pub face_track_gap_seconds: f64,
    /// Minimum box IoU for two observations to be the same appearance
    pub face_track_min_iou: f32,
    /// Frames sampled per second for face recognition
    pub frame_sample_rate: f64,
    /// Non-speech events that get a caption between speech cues
    pub sound_captions: Vec<SoundKind>,
    pub engines: EngineConfig,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            min_overlap_fraction: 0.30,
            min_cluster_overlap_seconds: 2.0,
            max_cue_duration_seconds: 7.0,
            min_cue_duration_seconds: 1.0,
            cue_merge_gap_seconds: 0.3,
            max_chars_per_line: 42,
            face_track_gap_seconds: 1.0,
            face_track_min_iou: 0.3,
            frame_sample_rate: 2.0,
            sound_captions: vec![SoundKind::Music, SoundKind::OtherSound, SoundKind::Silence],
            engines: EngineConfig::default(),
        }
    }
}

/// External engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Python interpreter with whisper / pyannote / insightface installed
    pub python: String,
    /// Whisper model size (tiny, base, small, medium, large)
    pub whisper_model: String,
    /// Language code, or "auto" for detection
    pub language: String,
    /// Cosine similarity a face needs to match a gallery entry
    pub recognition_threshold: f32,
    /// Environment variable holding the `HuggingFace` token for pyannote
    pub hf_token_env: String,
    /// Level below which audio counts as silent
    pub silence_noise_db: f64,
    /// Shortest silence the silence detector reports
    pub min_silence_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            whisper_model: "base".to_string(),
            language: "auto".to_string(),
            recognition_threshold: 0.45,
            hf_token_env: "HF_TOKEN".to_string(),
            silence_noise_db: -35.0,
            min_silence_seconds: 2.0,
        }
    }
}

fn millis(secs: f64) -> Millis {
    secs_to_millis(secs).unwrap_or(0)
}

impl CaptionConfig {
    /// Reject settings the core cannot honor.
    pub fn validate(&self) -> std::result::Result<(), CaptionError> {
        let invalid = |msg: String| Err(CaptionError::Config(msg));

        if !(0.0..=1.0).contains(&self.min_overlap_fraction) {
            return invalid(format!(
                "min_overlap_fraction must be within 0..=1, got {}",
                self.min_overlap_fraction
            ));
        }
        if !(0.0..=1.0).contains(&self.face_track_min_iou) {
            return invalid(format!(
                "face_track_min_iou must be within 0..=1, got {}",
                self.face_track_min_iou
            ));
        }
        for (key, value) in [
            ("min_cluster_overlap_seconds", self.min_cluster_overlap_seconds),
            ("cue_merge_gap_seconds", self.cue_merge_gap_seconds),
            ("face_track_gap_seconds", self.face_track_gap_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{key} must be a non-negative number, got {value}"));
            }
        }
        for (key, value) in [
            ("max_cue_duration_seconds", self.max_cue_duration_seconds),
            ("min_cue_duration_seconds", self.min_cue_duration_seconds),
            ("frame_sample_rate", self.frame_sample_rate),
            ("engines.min_silence_seconds", self.engines.min_silence_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{key} must be positive, got {value}"));
            }
        }
        if self.min_cue_duration_seconds > self.max_cue_duration_seconds {
            return invalid(format!(
                "min_cue_duration_seconds ({}) exceeds max_cue_duration_seconds ({})",
                self.min_cue_duration_seconds, self.max_cue_duration_seconds
            ));
        }
        if !self.engines.silence_noise_db.is_finite() {
            return invalid(format!(
                "engines.silence_noise_db must be a number, got {}",
                self.engines.silence_noise_db
            ));
        }
        if self.max_chars_per_line == 0 {
            return invalid("max_chars_per_line must be at least 1".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn min_cluster_overlap(&self) -> Millis {
        millis(self.min_cluster_overlap_seconds)
    }

    #[must_use]
    pub fn max_cue_duration(&self) -> Millis {
        millis(self.max_cue_duration_seconds)
    }

    #[must_use]
    pub fn min_cue_duration(&self) -> Millis {
        millis(self.min_cue_duration_seconds)
    }

    #[must_use]
    pub fn cue_merge_gap(&self) -> Millis {
        millis(self.cue_merge_gap_seconds)
    }

    #[must_use]
    pub fn face_track_gap(&self) -> Millis {
        millis(self.face_track_gap_seconds)
    }

    /// Time one sampled frame stands for.
    #[must_use]
    pub fn frame_interval(&self) -> Millis {
        millis(1.0 / self.frame_sample_rate).max(1)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("invalid caption configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing default file yields the built-in defaults; a missing
/// explicit file is an error.
pub fn load(path: Option<&Path>) -> Result<CaptionConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };

    if !explicit && !path.exists() {
        return Ok(CaptionConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    CaptionConfig::from_toml(&content).with_context(|| format!("in {}", path.display()))
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("captionfuse")
        .join("config.toml")
}
