//! Speaker-attributed caption engine
//!
//! Fuses three independent perception streams for one media file into a
//! single ordered cue stream:
//! - Normalization of raw engine output into the shared data model
//! - Temporal alignment of face tracks against diarization turns
//! - Binding of diarization clusters to recognized names
//! - Composition of speaker-labelled, non-overlapping caption cues
//! - Sound cues (`[music]`, `[silence]`, ...) in the gaps between speech
//!
//! The core ([`run_core`]) is pure and deterministic. Engine invocation,
//! batching and cancellation live in [`pipeline`].

pub mod align;
pub mod bind;
pub mod compose;
pub mod diagnostics;
pub mod normalize;
pub mod pipeline;
pub mod types;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::CaptionConfig;
use crate::engine::EngineOutputs;

pub use align::{align, Alignment, Candidate};
pub use bind::{bind, ClusterBinding, SpeakerBindings};
pub use compose::{add_sound_cues, compose, wrap_text, Composition};
pub use diagnostics::{Diagnostics, EvidenceReason, Modality, Warning};
pub use normalize::{normalize, NormalizedInput};
pub use pipeline::{BatchItem, CancellationToken, CaptionPipeline, Engines, FileOutcome};
pub use types::{
    AudioEvent, BoxRegion, CaptionCue, ClusterId, DiarizationTurn, FaceMatch, FaceObservation,
    FaceTrack, Identity, Millis, SoundKind, Span, TranscriptSegment, Word,
};

/// Caption engine errors
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("{modality} entries #{first} and #{second} overlap or are out of order")]
    MalformedSegment {
        modality: Modality,
        first: usize,
        second: usize,
    },

    #[error("{engine} failed: {message}")]
    EngineInvocation { engine: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),
}

impl CaptionError {
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EngineInvocation {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptionError>;

/// Captions and diagnostics for one media file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionOutput {
    pub cues: Vec<CaptionCue>,
    /// Final identity of every diarization cluster, in order of appearance
    pub speakers: Vec<ClusterBinding>,
    pub diagnostics: Diagnostics,
}

/// Run normalize, align, bind and compose over one file's engine output.
///
/// Fails only when an engine broke its ordering contract; every other
/// problem degrades to a warning in the returned diagnostics.
pub fn run_core(outputs: &EngineOutputs, config: &CaptionConfig) -> Result<CaptionOutput> {
    let mut warnings = Vec::new();

    let input = normalize(outputs, &mut warnings)?;
    let alignment = align(&input, config);
    let bindings = bind(&input.turns, &alignment, config, &mut warnings);
    let composition = compose(
        &input.transcript,
        &input.turns,
        &bindings,
        config,
        &mut warnings,
    );
    let mut cues = composition.cues;
    let sound_cues = add_sound_cues(&mut cues, &input.events, config);

    let mut diagnostics = Diagnostics {
        clusters: bindings.clusters.len(),
        named_speakers: bindings.named(),
        anonymous_speakers: bindings.anonymous(),
        unresolved_segments: composition.unresolved_segments,
        face_tracks: alignment.tracks.len(),
        cues: cues.len(),
        sound_cues,
        ..Diagnostics::default()
    };
    diagnostics.extend(warnings);

    info!(
        cues = diagnostics.cues,
        named = diagnostics.named_speakers,
        anonymous = diagnostics.anonymous_speakers,
        unresolved = diagnostics.unresolved_segments,
        "captioned"
    );

    Ok(CaptionOutput {
        cues,
        speakers: bindings.clusters,
        diagnostics,
    })
}
