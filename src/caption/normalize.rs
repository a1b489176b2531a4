//! Segment normalizer
//!
//! Converts raw engine output into the shared data model: millisecond
//! timestamps, closed-open spans, sorted by start then end. Degenerate
//! entries are dropped with a warning; disjointness violations are an
//! upstream contract breach and fail the file.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::diagnostics::{Modality, Warning};
use super::types::{
    secs_to_millis, AudioEvent, BoxRegion, ClusterId, DiarizationTurn, FaceMatch,
    FaceObservation, SoundKind, Span, TranscriptSegment, Word,
};
use super::{CaptionError, Result};
use crate::engine::{
    EngineOutputs, RawAudioEvent, RawFrame, RawTranscriptSegment, RawTurn, RawWord,
};

/// The canonical sequences for one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedInput {
    pub transcript: Vec<TranscriptSegment>,
    pub turns: Vec<DiarizationTurn>,
    pub faces: Vec<FaceObservation>,
    /// Non-speech events, empty when no detector ran
    pub events: Vec<AudioEvent>,
}

/// Normalize every engine output, appending drop warnings to `warnings`.
pub fn normalize(outputs: &EngineOutputs, warnings: &mut Vec<Warning>) -> Result<NormalizedInput> {
    let transcript = normalize_transcript(&outputs.transcript, warnings)?;
    let turns = normalize_turns(&outputs.turns, warnings)?;
    let faces = normalize_faces(&outputs.frames, warnings);
    let events = normalize_events(&outputs.events, warnings);

    debug!(
        segments = transcript.len(),
        turns = turns.len(),
        faces = faces.len(),
        events = events.len(),
        "normalized engine output"
    );

    Ok(NormalizedInput {
        transcript,
        turns,
        faces,
        events,
    })
}

fn drop_entry(warnings: &mut Vec<Warning>, modality: Modality, index: usize, reason: &str) {
    warn!(%modality, index, reason, "dropping degenerate entry");
    warnings.push(Warning::DroppedEntry {
        modality,
        index,
        reason: reason.to_string(),
    });
}

/// Collapse whitespace runs (including newlines) into single spaces.
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize ASR output. Segments must be pairwise disjoint.
pub fn normalize_transcript(
    raw: &[RawTranscriptSegment],
    warnings: &mut Vec<Warning>,
) -> Result<Vec<TranscriptSegment>> {
    let mut indexed: Vec<(usize, TranscriptSegment)> = Vec::with_capacity(raw.len());

    for (index, seg) in raw.iter().enumerate() {
        let Some(span) = Span::from_secs(seg.start, seg.end) else {
            drop_entry(warnings, Modality::Transcript, index, "non-finite timestamp");
            continue;
        };
        if span.is_degenerate() {
            drop_entry(warnings, Modality::Transcript, index, "zero or negative duration");
            continue;
        }
        let text = clean_text(&seg.text);
        if text.is_empty() {
            drop_entry(warnings, Modality::Transcript, index, "empty text");
            continue;
        }

        indexed.push((
            index,
            TranscriptSegment {
                span,
                text,
                words: normalize_words(&seg.words, span, index, warnings),
            },
        ));
    }

    indexed.sort_by_key(|(_, seg)| seg.span);

    for pair in indexed.windows(2) {
        let (first, a) = &pair[0];
        let (second, b) = &pair[1];
        if a.span.end > b.span.start {
            return Err(CaptionError::MalformedSegment {
                modality: Modality::Transcript,
                first: *first,
                second: *second,
            });
        }
    }

    Ok(indexed.into_iter().map(|(_, seg)| seg).collect())
}

/// Words are clamped into their segment; they only guide splitting.
///
/// A word with unusable timing is dropped with a warning against its
/// segment; the segment text still carries it.
fn normalize_words(
    raw: &[RawWord],
    segment: Span,
    index: usize,
    warnings: &mut Vec<Warning>,
) -> Vec<Word> {
    let mut words = Vec::with_capacity(raw.len());

    for w in raw {
        let text = w.word.trim();
        if text.is_empty() {
            continue;
        }
        let Some(span) = Span::from_secs(w.start, w.end) else {
            let reason = format!("word {text:?} has a non-finite timestamp");
            drop_entry(warnings, Modality::Transcript, index, &reason);
            continue;
        };
        let start = span.start.clamp(segment.start, segment.end);
        let end = span.end.clamp(start, segment.end);
        words.push(Word {
            text: text.to_string(),
            span: Span::new(start, end),
        });
    }

    words.sort_by_key(|w| w.span);
    words
}

/// Normalize diarization output.
///
/// Turns from different clusters may overlap; turns of the same cluster
/// must not.
pub fn normalize_turns(raw: &[RawTurn], warnings: &mut Vec<Warning>) -> Result<Vec<DiarizationTurn>> {
    let mut indexed: Vec<(usize, DiarizationTurn)> = Vec::with_capacity(raw.len());

    for (index, turn) in raw.iter().enumerate() {
        let Some(span) = Span::from_secs(turn.start, turn.end) else {
            drop_entry(warnings, Modality::Diarization, index, "non-finite timestamp");
            continue;
        };
        if span.is_degenerate() {
            drop_entry(warnings, Modality::Diarization, index, "zero or negative duration");
            continue;
        }
        indexed.push((
            index,
            DiarizationTurn {
                span,
                cluster: ClusterId::new(turn.speaker.trim()),
            },
        ));
    }

    indexed.sort_by(|(_, a), (_, b)| a.span.cmp(&b.span).then_with(|| a.cluster.cmp(&b.cluster)));

    let mut last_by_cluster: BTreeMap<&ClusterId, (usize, Span)> = BTreeMap::new();
    for (index, turn) in &indexed {
        if let Some((prev_index, prev_span)) = last_by_cluster.get(&turn.cluster) {
            if prev_span.end > turn.span.start {
                return Err(CaptionError::MalformedSegment {
                    modality: Modality::Diarization,
                    first: *prev_index,
                    second: *index,
                });
            }
        }
        last_by_cluster.insert(&turn.cluster, (*index, turn.span));
    }

    Ok(indexed.into_iter().map(|(_, turn)| turn).collect())
}

/// Flatten per-frame detections into time-ordered observations.
///
/// Frames with unusable timestamps are dropped; detections with a
/// non-finite or empty match lose their identity but are kept.
pub fn normalize_faces(frames: &[RawFrame], warnings: &mut Vec<Warning>) -> Vec<FaceObservation> {
    let mut observations = Vec::new();

    for (index, frame) in frames.iter().enumerate() {
        let Some(at) = secs_to_millis(frame.timestamp) else {
            drop_entry(warnings, Modality::Faces, index, "non-finite timestamp");
            continue;
        };

        for face in &frame.faces {
            let [x, y, width, height] = face.bbox;
            if ![x, y, width, height].iter().all(|v| v.is_finite()) || width <= 0.0 || height <= 0.0 {
                drop_entry(warnings, Modality::Faces, index, "degenerate bounding box");
                continue;
            }

            let identity = face
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty() && face.similarity.is_finite())
                .map(|name| FaceMatch {
                    name: name.to_string(),
                    similarity: face.similarity,
                });

            observations.push(FaceObservation {
                at,
                region: BoxRegion::new(x, y, width, height),
                identity,
            });
        }
    }

    observations.sort_by(|a, b| {
        a.at.cmp(&b.at)
            .then_with(|| a.region.x.total_cmp(&b.region.x))
            .then_with(|| a.region.y.total_cmp(&b.region.y))
            .then_with(|| a.region.width.total_cmp(&b.region.width))
            .then_with(|| a.region.height.total_cmp(&b.region.height))
    });
    observations
}

/// Normalize detector output into time-ordered sound events.
///
/// Speech events are skipped: the transcript already covers speech.
/// Events may overlap one another.
pub fn normalize_events(raw: &[RawAudioEvent], warnings: &mut Vec<Warning>) -> Vec<AudioEvent> {
    let mut events = Vec::with_capacity(raw.len());

    for (index, event) in raw.iter().enumerate() {
        let Some(kind) = SoundKind::from_label(&event.kind) else {
            continue;
        };
        let Some(span) = Span::from_secs(event.start, event.end) else {
            drop_entry(warnings, Modality::Events, index, "non-finite timestamp");
            continue;
        };
        if span.is_degenerate() {
            drop_entry(warnings, Modality::Events, index, "zero or negative duration");
            continue;
        }
        events.push(AudioEvent { span, kind });
    }

    events.sort_by_key(|e| (e.span, e.kind));
    events
}
