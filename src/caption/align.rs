//! Temporal aligner
//!
//! Groups face observations into tracks and lists, for every diarization
//! turn, the tracks that overlap it enough to be considered as the
//! speaker's face. No decision is made here: the binder picks winners.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use super::normalize::NormalizedInput;
use super::types::{BoxRegion, DiarizationTurn, FaceObservation, FaceTrack, Millis, Span};
use crate::config::CaptionConfig;

/// A face track nominated for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Index into [`Alignment::tracks`]
    pub track: usize,
    /// Intersection of the turn and the track
    pub overlap: Millis,
}

/// Output of the aligner for one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub tracks: Vec<FaceTrack>,
    /// Parallel to the normalized turns; best overlap first
    pub candidates: Vec<Vec<Candidate>>,
}

/// Build face tracks and per-turn candidate lists.
pub fn align(input: &NormalizedInput, config: &CaptionConfig) -> Alignment {
    let tracks = build_tracks(&input.faces, config);
    let candidates = candidates_for_turns(&input.turns, &tracks, config.min_overlap_fraction);

    debug!(
        tracks = tracks.len(),
        turns = input.turns.len(),
        uncovered = candidates.iter().filter(|c| c.is_empty()).count(),
        "aligned face tracks to turns"
    );

    Alignment { tracks, candidates }
}

/// Accumulates observations for one track while it is open
#[derive(Debug)]
struct TrackBuilder {
    first: Millis,
    last: Millis,
    region: BoxRegion,
    last_name: Option<String>,
    observations: usize,
    /// name -> (count, similarity sum)
    votes: BTreeMap<String, (usize, f32)>,
}

impl TrackBuilder {
    fn start(obs: &FaceObservation) -> Self {
        let mut builder = Self {
            first: obs.at,
            last: obs.at,
            region: obs.region,
            last_name: None,
            observations: 0,
            votes: BTreeMap::new(),
        };
        builder.add(obs);
        builder
    }

    fn add(&mut self, obs: &FaceObservation) {
        self.last = obs.at;
        self.region = obs.region;
        self.observations += 1;
        if let Some(ref m) = obs.identity {
            let entry = self.votes.entry(m.name.clone()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += m.similarity;
            self.last_name = Some(m.name.clone());
        }
    }

    /// Either side unnamed, or the same name.
    fn accepts_identity(&self, obs: &FaceObservation) -> bool {
        match (&self.last_name, &obs.identity) {
            (Some(name), Some(m)) => *name == m.name,
            _ => true,
        }
    }

    fn finish(self, frame_interval: Millis) -> FaceTrack {
        let mut winner: Option<(&String, usize, f32)> = None;
        for (name, &(count, sum)) in &self.votes {
            let mean = sum / count as f32;
            let better = match winner {
                None => true,
                Some((_, best_count, best_mean)) => match count.cmp(&best_count) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    // names iterate in order, so the earlier name keeps exact ties
                    Ordering::Equal => mean > best_mean,
                },
            };
            if better {
                winner = Some((name, count, mean));
            }
        }

        FaceTrack {
            span: Span::new(self.first, self.last.saturating_add(frame_interval)),
            identity: winner.map(|(name, _, _)| name.clone()),
            mean_similarity: winner.map_or(0.0, |(_, _, mean)| mean),
            observations: self.observations,
        }
    }
}

/// Merge time-ordered observations into face tracks.
///
/// An observation extends the open track whose last box it overlaps most
/// (IoU at least `face_track_min_iou`), provided that track was seen within
/// `face_track_gap_seconds`, has no observation at the same instant, and
/// does not carry a different name. Otherwise it starts a new track.
/// Tracks come back ordered by start time.
pub fn build_tracks(observations: &[FaceObservation], config: &CaptionConfig) -> Vec<FaceTrack> {
    let gap = config.face_track_gap();
    let min_iou = config.face_track_min_iou;
    let frame_interval = config.frame_interval();

    let mut builders: Vec<TrackBuilder> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for obs in observations {
        open.retain(|&i| obs.at.saturating_sub(builders[i].last) <= gap);

        let mut best: Option<(usize, f32)> = None;
        for &i in &open {
            let track = &builders[i];
            if track.last >= obs.at || !track.accepts_identity(obs) {
                continue;
            }
            let iou = track.region.iou(&obs.region);
            if iou < min_iou {
                continue;
            }
            if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                best = Some((i, iou));
            }
        }

        match best {
            Some((i, _)) => builders[i].add(obs),
            None => {
                open.push(builders.len());
                builders.push(TrackBuilder::start(obs));
            }
        }
    }

    builders
        .into_iter()
        .map(|b| b.finish(frame_interval))
        .collect()
}

/// For each turn, the tracks covering more than `min_fraction` of it.
///
/// `tracks` must be sorted by start time.
pub fn candidates_for_turns(
    turns: &[DiarizationTurn],
    tracks: &[FaceTrack],
    min_fraction: f64,
) -> Vec<Vec<Candidate>> {
    turns
        .iter()
        .map(|turn| {
            let required = min_fraction * turn.span.duration() as f64;
            let mut candidates: Vec<Candidate> = tracks
                .iter()
                .enumerate()
                .take_while(|(_, track)| track.span.start < turn.span.end)
                .filter_map(|(i, track)| {
                    let overlap = turn.span.overlap(&track.span);
                    (overlap > 0 && overlap as f64 > required).then_some(Candidate {
                        track: i,
                        overlap,
                    })
                })
                .collect();

            candidates.sort_by(|a, b| b.overlap.cmp(&a.overlap).then(a.track.cmp(&b.track)));
            candidates
        })
        .collect()
}
