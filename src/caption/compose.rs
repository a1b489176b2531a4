//! Caption composer
//!
//! Walks transcript segments in order, attributes each to the identity of
//! the turns it overlaps and shapes the result into cues: one speaker per
//! cue, bounded duration, no overlap, wrapped text. Sound events are
//! captioned afterwards in whatever time speech leaves free.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::bind::SpeakerBindings;
use super::diagnostics::{EvidenceReason, Warning};
use super::types::{
    AudioEvent, CaptionCue, DiarizationTurn, Identity, Millis, Span, TranscriptSegment, Word,
};
use crate::config::CaptionConfig;

/// Cues for one file plus how many segments had no speaker at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composition {
    pub cues: Vec<CaptionCue>,
    pub unresolved_segments: usize,
}

/// A cue before merging, still carrying its word timings
#[derive(Debug, Clone)]
struct Draft {
    span: Span,
    speaker: Identity,
    text: String,
    words: Vec<Word>,
}

/// Build the cue stream for one file.
pub fn compose(
    transcript: &[TranscriptSegment],
    turns: &[DiarizationTurn],
    bindings: &SpeakerBindings,
    config: &CaptionConfig,
    warnings: &mut Vec<Warning>,
) -> Composition {
    let max = config.max_cue_duration();
    let mut unresolved_segments = 0;
    let mut drafts = Vec::with_capacity(transcript.len());

    for segment in transcript {
        let active: Vec<(Span, &Identity)> = turns
            .iter()
            .zip(&bindings.turns)
            .take_while(|(turn, _)| turn.span.start < segment.span.end)
            .filter(|(turn, _)| turn.span.intersects(&segment.span))
            .map(|(turn, identity)| (turn.span, identity))
            .collect();

        if active.is_empty() {
            unresolved_segments += 1;
            warnings.push(Warning::SegmentEvidence {
                span: segment.span,
                reason: EvidenceReason::NoOverlappingTurn,
            });
            drafts.push(Draft {
                span: segment.span,
                speaker: Identity::Unknown,
                text: segment.text.clone(),
                words: segment.words.clone(),
            });
            continue;
        }

        drafts.extend(attribute_segment(segment, &active));
    }

    let gap = config.cue_merge_gap();
    let drafts: Vec<Draft> = drafts
        .into_iter()
        .flat_map(|draft| split_long(draft, max, gap))
        .collect();
    for draft in drafts.iter().filter(|d| d.span.duration() > max) {
        warn!(span = %draft.span, max_ms = max, "cue text cannot be split below the maximum duration");
        warnings.push(Warning::OverlongCue {
            span: draft.span,
            max_ms: max,
        });
    }

    let mut cues = merge_adjacent(drafts, gap, max);
    clip_overlaps(&mut cues);
    extend_short(&mut cues, config.min_cue_duration());
    for cue in &mut cues {
        cue.text = wrap_text(&cue.text, config.max_chars_per_line);
    }

    debug!(
        cues = cues.len(),
        unresolved = unresolved_segments,
        "composed captions"
    );

    Composition {
        cues,
        unresolved_segments,
    }
}

/// Split one segment at turn boundaries so each piece has one speaker.
///
/// While several identities speak at once, the one with the most overlap
/// across the whole segment holds the interval.
fn attribute_segment(segment: &TranscriptSegment, active: &[(Span, &Identity)]) -> Vec<Draft> {
    let mut totals: BTreeMap<&Identity, Millis> = BTreeMap::new();
    for (span, identity) in active {
        *totals.entry(*identity).or_insert(0) += span.overlap(&segment.span);
    }

    let whole = |speaker: &Identity| Draft {
        span: segment.span,
        speaker: speaker.clone(),
        text: segment.text.clone(),
        words: segment.words.clone(),
    };

    let mut ranking: Vec<(&Identity, Millis)> = totals.into_iter().collect();
    ranking.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    if ranking.len() == 1 {
        return vec![whole(ranking[0].0)];
    }
    let rank = |identity: &Identity| {
        ranking
            .iter()
            .position(|(r, _)| *r == identity)
            .unwrap_or(usize::MAX)
    };

    let mut points = vec![segment.span.start, segment.span.end];
    for (span, _) in active {
        for p in [span.start, span.end] {
            if p > segment.span.start && p < segment.span.end {
                points.push(p);
            }
        }
    }
    points.sort_unstable();
    points.dedup();

    let mut slots: Vec<(Span, Option<&Identity>)> = points
        .windows(2)
        .map(|w| {
            let slot = Span::new(w[0], w[1]);
            let holder = active
                .iter()
                .filter(|(span, _)| span.start <= slot.start && span.end >= slot.end)
                .map(|(_, identity)| *identity)
                .min_by_key(|identity| rank(*identity));
            (slot, holder)
        })
        .collect();

    // Silent gaps inside the segment go to the preceding speaker.
    let mut previous = None;
    for slot in &mut slots {
        match slot.1 {
            Some(identity) => previous = Some(identity),
            None => slot.1 = previous,
        }
    }
    let mut following = None;
    for slot in slots.iter_mut().rev() {
        match slot.1 {
            Some(identity) => following = Some(identity),
            None => slot.1 = following,
        }
    }

    let mut pieces: Vec<(Span, &Identity)> = Vec::new();
    for (slot, holder) in slots {
        let Some(identity) = holder else { continue };
        match pieces.last_mut() {
            Some((span, last)) if *last == identity => span.end = slot.end,
            _ => pieces.push((slot, identity)),
        }
    }
    if pieces.len() <= 1 {
        return pieces.first().map(|(_, id)| whole(*id)).into_iter().collect();
    }

    let texts: Vec<(String, Vec<Word>)> = if !words_cover(&segment.words, &segment.text) {
        let weights: Vec<Millis> = pieces.iter().map(|(span, _)| span.duration()).collect();
        split_text_by_weights(&segment.text, &weights)
            .into_iter()
            .map(|text| (text, Vec::new()))
            .collect()
    } else {
        let mut buckets: Vec<Vec<Word>> = vec![Vec::new(); pieces.len()];
        for word in &segment.words {
            let mid = word.span.midpoint();
            let k = pieces
                .iter()
                .rposition(|(span, _)| span.start <= mid)
                .unwrap_or(0);
            buckets[k].push(word.clone());
        }
        buckets
            .into_iter()
            .map(|words| (join_words(&words), words))
            .collect()
    };

    pieces
        .into_iter()
        .zip(texts)
        .filter(|(_, (text, _))| !text.is_empty())
        .map(|((span, identity), (text, words))| Draft {
            span,
            speaker: identity.clone(),
            text,
            words,
        })
        .collect()
}

/// Whether the word timings account for every character of `text`.
fn words_cover(words: &[Word], text: &str) -> bool {
    let spoken = words
        .iter()
        .flat_map(|w| w.text.chars())
        .filter(|c| !c.is_whitespace());
    let written = text.chars().filter(|c| !c.is_whitespace());
    !words.is_empty() && spoken.eq(written)
}

fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distribute whitespace-separated tokens over pieces in proportion to
/// `weights`, keeping token order. Some pieces may come back empty.
fn split_text_by_weights(text: &str, weights: &[Millis]) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<Vec<&str>> = vec![Vec::new(); weights.len()];
    let total_weight: Millis = weights.iter().sum();

    if out.is_empty() {
        return Vec::new();
    }
    if total_weight == 0 {
        out[0] = tokens;
        return out.into_iter().map(|t| t.join(" ")).collect();
    }

    let total_chars: usize = tokens.iter().map(|t| t.chars().count() + 1).sum();
    let mut offset = 0usize;
    for token in tokens {
        let len = token.chars().count() + 1;
        let mid = offset as f64 + len as f64 / 2.0;
        offset += len;
        let position = mid / total_chars as f64 * total_weight as f64;

        let mut cumulative = 0;
        let mut k = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if position < cumulative as f64 {
                k = i;
                break;
            }
        }
        out[k].push(token);
    }

    out.into_iter().map(|t| t.join(" ")).collect()
}

/// Break a draft longer than `max` into consecutive same-speaker drafts.
fn split_long(draft: Draft, max: Millis, gap: Millis) -> Vec<Draft> {
    let max = max.max(1);
    if draft.span.duration() <= max {
        return vec![draft];
    }
    if let Some(chunks) = split_by_words(&draft, max, gap) {
        return chunks;
    }
    split_evenly(draft, max)
}

/// Greedy split at word boundaries; `None` when timings cannot support it.
///
/// A chunk runs on to the next chunk's first word unless a pause of at
/// least `gap` follows its last word, and never lasts longer than `max`.
fn split_by_words(draft: &Draft, max: Millis, gap: Millis) -> Option<Vec<Draft>> {
    if draft.words.len() < 2 || !words_cover(&draft.words, &draft.text) {
        return None;
    }

    let mut groups: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    let mut chunk_start = draft.span.start;
    for word in &draft.words {
        if !current.is_empty() && word.span.end.saturating_sub(chunk_start) > max {
            groups.push(std::mem::take(&mut current));
            chunk_start = word.span.start;
        }
        current.push(word.clone());
    }
    groups.push(current);
    if groups.len() < 2 {
        return None;
    }

    let starts: Vec<Millis> = groups
        .iter()
        .enumerate()
        .map(|(k, g)| if k == 0 { draft.span.start } else { g[0].span.start })
        .collect();
    let strictly_increasing = starts.windows(2).all(|w| w[0] < w[1]);
    if !strictly_increasing || starts.last().is_some_and(|&s| s >= draft.span.end) {
        return None;
    }

    Some(
        groups
            .into_iter()
            .enumerate()
            .map(|(k, words)| {
                let start = starts[k];
                let bound = starts.get(k + 1).copied().unwrap_or(draft.span.end);
                let spoken_until = words.last().map_or(bound, |w| w.span.end);
                let end = if bound.saturating_sub(spoken_until) < gap {
                    bound
                } else {
                    spoken_until
                };
                let end = end.min(bound).min(start.saturating_add(max)).max(start + 1);
                Draft {
                    span: Span::new(start, end),
                    speaker: draft.speaker.clone(),
                    text: join_words(&words),
                    words,
                }
            })
            .collect(),
    )
}

/// Equal-length split with text spread by character count.
fn split_evenly(draft: Draft, max: Millis) -> Vec<Draft> {
    let duration = draft.span.duration();
    let tokens = draft.text.split_whitespace().count();
    let n = (duration.div_ceil(max.max(1)) as usize).min(tokens);
    if n <= 1 {
        return vec![draft];
    }

    let step = duration / n as Millis;
    let spans: Vec<Span> = (0..n)
        .map(|k| {
            let start = draft.span.start + step * k as Millis;
            let end = if k == n - 1 {
                draft.span.end
            } else {
                start + step
            };
            Span::new(start, end)
        })
        .collect();
    let weights: Vec<Millis> = spans.iter().map(Span::duration).collect();
    let texts = split_text_by_weights(&draft.text, &weights);

    let mut out: Vec<Draft> = Vec::with_capacity(n);
    let mut pending_start = None;
    for (span, text) in spans.into_iter().zip(texts) {
        if text.is_empty() {
            match out.last_mut() {
                Some(last) => last.span.end = span.end,
                None => pending_start = pending_start.or(Some(span.start)),
            }
            continue;
        }
        out.push(Draft {
            span: Span::new(pending_start.take().unwrap_or(span.start), span.end),
            speaker: draft.speaker.clone(),
            text,
            words: Vec::new(),
        });
    }
    out
}

/// Merge same-speaker neighbours separated by less than `gap` while the
/// result stays within `max`.
fn merge_adjacent(drafts: Vec<Draft>, gap: Millis, max: Millis) -> Vec<CaptionCue> {
    let mut cues: Vec<CaptionCue> = Vec::with_capacity(drafts.len());

    for draft in drafts {
        if let Some(last) = cues.last_mut() {
            let close = draft.span.start >= last.span.end && draft.span.start - last.span.end < gap;
            let fits = draft.span.end.saturating_sub(last.span.start) <= max;
            if last.speaker == draft.speaker && close && fits {
                last.span.end = draft.span.end;
                last.text.push(' ');
                last.text.push_str(&draft.text);
                continue;
            }
        }
        cues.push(CaptionCue {
            span: draft.span,
            speaker: draft.speaker,
            text: draft.text,
        });
    }

    cues
}

/// Guarantee `cue[i].end <= cue[i + 1].start`.
fn clip_overlaps(cues: &mut [CaptionCue]) {
    for i in 1..cues.len() {
        let next_start = cues[i].span.start;
        let prev = &mut cues[i - 1].span;
        if prev.end > next_start {
            prev.end = next_start;
        }
    }
}

/// Stretch cues shorter than `min` forward, never past the next cue.
fn extend_short(cues: &mut [CaptionCue], min: Millis) {
    for i in 0..cues.len() {
        let span = cues[i].span;
        if span.duration() >= min {
            continue;
        }
        let target = span.start.saturating_add(min);
        let limit = cues.get(i + 1).map_or(target, |next| next.span.start);
        cues[i].span.end = span.end.max(target.min(limit));
    }
}

/// Caption sound events in the time no other cue holds.
///
/// Only kinds listed in `sound_captions` are used. Where events overlap,
/// the earlier one keeps the time. Free stretches shorter than the minimum
/// cue duration stay empty; longer ones are cut into equal cues within the
/// maximum. Returns how many cues were added.
pub fn add_sound_cues(
    cues: &mut Vec<CaptionCue>,
    events: &[AudioEvent],
    config: &CaptionConfig,
) -> usize {
    let min = config.min_cue_duration();
    let max = config.max_cue_duration().max(1);
    let mut taken: Vec<Span> = cues.iter().map(|c| c.span).collect();
    taken.sort_unstable();
    let mut added = Vec::new();

    for event in events
        .iter()
        .filter(|e| config.sound_captions.contains(&e.kind))
    {
        for free in free_spans(event.span, &taken) {
            if free.duration() < min.max(1) {
                continue;
            }
            let n = free.duration().div_ceil(max);
            let step = free.duration() / n;
            for k in 0..n {
                let start = free.start + step * k;
                let end = if k == n - 1 { free.end } else { start + step };
                added.push(CaptionCue {
                    span: Span::new(start, end),
                    speaker: Identity::Sound(event.kind),
                    text: String::new(),
                });
            }
            taken.push(free);
        }
        taken.sort_unstable();
    }

    let count = added.len();
    if count > 0 {
        debug!(cues = count, "added sound cues");
        cues.extend(added);
        cues.sort_by_key(|c| c.span);
    }
    count
}

/// Parts of `span` not covered by any of the sorted `taken` spans.
fn free_spans(span: Span, taken: &[Span]) -> Vec<Span> {
    let mut free = Vec::new();
    let mut cursor = span.start;

    for t in taken.iter().filter(|t| t.intersects(&span)) {
        if t.start > cursor {
            free.push(Span::new(cursor, t.start));
        }
        cursor = cursor.max(t.end);
    }
    if cursor < span.end {
        free.push(Span::new(cursor, span.end));
    }
    free
}

/// Greedy word wrap to `width` characters per line. Words longer than a
/// line stay whole on their own line; nothing is dropped.
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let len = word.chars().count();
        if line_len > 0 && line_len + 1 + len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += len;
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}
