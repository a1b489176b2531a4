//! Normalized data model shared by every stage of the caption engine.
//!
//! All times are integer milliseconds on the media timeline and every
//! interval is closed-open.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds from the start of the media file.
pub type Millis = u64;

/// Convert fractional seconds to milliseconds, rounding to nearest.
///
/// Negative values clamp to zero. Returns `None` for non-finite input.
#[must_use]
pub fn secs_to_millis(secs: f64) -> Option<Millis> {
    if !secs.is_finite() {
        return None;
    }
    Some((secs.max(0.0) * 1000.0).round() as Millis)
}

/// Convert milliseconds back to fractional seconds.
#[must_use]
pub fn millis_to_secs(ms: Millis) -> f64 {
    ms as f64 / 1000.0
}

/// Closed-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Millis,
    pub end: Millis,
}

impl Span {
    #[must_use]
    pub fn new(start: Millis, end: Millis) -> Self {
        Self { start, end }
    }

    /// Build a span from seconds, `None` if either bound is non-finite.
    #[must_use]
    pub fn from_secs(start: f64, end: f64) -> Option<Self> {
        Some(Self::new(secs_to_millis(start)?, secs_to_millis(end)?))
    }

    #[must_use]
    pub fn duration(&self) -> Millis {
        self.end.saturating_sub(self.start)
    }

    /// Zero-length or inverted.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    /// Length of the intersection with `other` (zero when disjoint).
    #[must_use]
    pub fn overlap(&self, other: &Span) -> Millis {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    #[must_use]
    pub fn intersects(&self, other: &Span) -> bool {
        self.overlap(other) > 0
    }

    #[must_use]
    pub fn contains(&self, at: Millis) -> bool {
        at >= self.start && at < self.end
    }

    #[must_use]
    pub fn midpoint(&self) -> Millis {
        self.start + self.duration() / 2
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3}s-{:.3}s",
            millis_to_secs(self.start),
            millis_to_secs(self.end)
        )
    }
}

/// Word-level timing inside a transcript segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub span: Span,
}

/// One ASR segment after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub span: Span,
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
}

/// Opaque diarization cluster label, stable only within one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who speaks when, as reported by the diarization engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiarizationTurn {
    pub span: Span,
    pub cluster: ClusterId,
}

/// Face bounding box, normalized to 0-1 frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxRegion {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    #[must_use]
    pub fn iou(&self, other: &BoxRegion) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// A gallery match for one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub name: String,
    pub similarity: f32,
}

/// One detected face in one sampled frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub at: Millis,
    pub region: BoxRegion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<FaceMatch>,
}

/// A run of observations judged to be the same on-screen appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceTrack {
    pub span: Span,
    /// Winning name vote, `None` when no observation was recognized
    pub identity: Option<String>,
    /// Mean similarity of the observations that voted for `identity`
    pub mean_similarity: f32,
    pub observations: usize,
}

impl FaceTrack {
    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.identity.is_some()
    }
}

/// Non-speech audio worth a caption of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Music,
    OtherSound,
    Silence,
}

impl SoundKind {
    /// Map a detector label. Speech is not a sound event; labels we do
    /// not know (applause, laughter, ...) count as other sounds.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "speech" => None,
            "music" => Some(Self::Music),
            "silence" => Some(Self::Silence),
            _ => Some(Self::OtherSound),
        }
    }
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Music => "[music]",
            Self::OtherSound => "[sound]",
            Self::Silence => "[silence]",
        })
    }
}

/// A detected stretch of non-speech audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEvent {
    pub span: Span,
    pub kind: SoundKind,
}

/// Display identity of a caption speaker
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identity {
    /// Resolved from a recognized face
    Name(String),
    /// `SpeakerN` placeholder for a cluster with no confident face
    Anonymous(u32),
    /// No diarization turn covers the speech at all
    Unknown,
    /// Not speech: a music, silence or sound event cue
    Sound(SoundKind),
}

impl Identity {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Name(_))
    }

    /// Label shown in front of the caption text.
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Anonymous(n) => write!(f, "Speaker{n}"),
            Self::Unknown => f.write_str("Unknown"),
            Self::Sound(kind) => write!(f, "{kind}"),
        }
    }
}

/// Final output unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub span: Span,
    pub speaker: Identity,
    pub text: String,
}
