//! Per-file diagnostics and non-fatal warnings

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{ClusterId, Millis, Span};

/// Which engine an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Transcript,
    Diarization,
    Faces,
    Events,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transcript => "transcript",
            Self::Diarization => "diarization",
            Self::Faces => "faces",
            Self::Events => "audio events",
        })
    }
}

/// Why a cluster or segment fell back to a placeholder identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EvidenceReason {
    /// No face track overlapped any turn of the cluster enough
    NoFaceCandidates,
    /// Best candidate pooled less overlap than the configured minimum
    BelowThreshold { weight_ms: Millis },
    /// Best candidate was a face nobody recognized
    UnidentifiedFace { weight_ms: Millis },
    /// Another cluster claimed the same name with more evidence
    LostNameConflict { name: String, winner: ClusterId },
    /// No diarization turn overlaps the transcript segment
    NoOverlappingTurn,
}

/// Non-fatal condition recorded while captioning one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A degenerate engine entry was discarded during normalization
    DroppedEntry {
        modality: Modality,
        index: usize,
        reason: String,
    },
    /// A speaker cluster could not be bound to a name
    ClusterEvidence {
        cluster: ClusterId,
        #[serde(flatten)]
        reason: EvidenceReason,
    },
    /// A transcript segment could not be attributed to any speaker
    SegmentEvidence {
        span: Span,
        #[serde(flatten)]
        reason: EvidenceReason,
    },
    /// A cue still exceeds the maximum duration because its text has too
    /// few words to split further
    OverlongCue { span: Span, max_ms: Millis },
}

impl Warning {
    /// Whether this is an insufficient-evidence warning (as opposed to a drop)
    #[must_use]
    pub fn is_insufficient_evidence(&self) -> bool {
        matches!(
            self,
            Self::ClusterEvidence { .. } | Self::SegmentEvidence { .. }
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DroppedEntry {
                modality,
                index,
                reason,
            } => write!(f, "dropped {modality} entry #{index}: {reason}"),
            Self::ClusterEvidence { cluster, reason } => {
                write!(f, "insufficient evidence for cluster {cluster}: {reason:?}")
            }
            Self::SegmentEvidence { span, reason } => {
                write!(f, "insufficient evidence for segment {span}: {reason:?}")
            }
            Self::OverlongCue { span, max_ms } => {
                write!(f, "cue {span} is longer than {max_ms} ms and cannot be split")
            }
        }
    }
}

/// Observability counters for one captioned file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub clusters: usize,
    pub named_speakers: usize,
    pub anonymous_speakers: usize,
    pub unresolved_segments: usize,
    pub face_tracks: usize,
    pub dropped_entries: usize,
    pub cues: usize,
    /// Cues that caption music, silence or other sounds
    #[serde(default)]
    pub sound_cues: usize,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, keeping counters in sync.
    pub fn push(&mut self, warning: Warning) {
        if matches!(warning, Warning::DroppedEntry { .. }) {
            self.dropped_entries += 1;
        }
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        for warning in warnings {
            self.push(warning);
        }
    }

    /// Number of insufficient-evidence warnings
    #[must_use]
    pub fn insufficient_evidence(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.is_insufficient_evidence())
            .count()
    }
}
