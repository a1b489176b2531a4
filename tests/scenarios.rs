//! End-to-end checks of the caption core through the public API.

use captionfuse::caption::{CaptionError, EvidenceReason, Modality, Warning};
use captionfuse::engine::{
    RawAudioEvent, RawFaceDetection, RawFrame, RawTranscriptSegment, RawTurn, RawWord,
};
use captionfuse::format::SrtWriter;
use captionfuse::{run_core, CaptionConfig, CaptionOutput, CaptionWriter, EngineOutputs, Identity};

// ─── Builders ───────────────────────────────────────────────────────────────

fn segment(start: f64, end: f64, text: &str) -> RawTranscriptSegment {
    RawTranscriptSegment {
        start,
        end,
        text: text.to_string(),
        words: vec![],
        language: None,
    }
}

fn turn(speaker: &str, start: f64, end: f64) -> RawTurn {
    RawTurn {
        speaker: speaker.to_string(),
        start,
        end,
        confidence: None,
    }
}

/// One face of `name` in the same spot, sampled every 0.5 s over `[from, to)`.
fn face_frames(from: f64, to: f64, name: &str) -> Vec<RawFrame> {
    let mut frames = Vec::new();
    let mut t = from;
    while t < to - 1e-9 {
        frames.push(RawFrame {
            timestamp: t,
            faces: vec![RawFaceDetection {
                bbox: [0.4, 0.2, 0.2, 0.3],
                name: Some(name.to_string()),
                similarity: 0.8,
            }],
        });
        t += 0.5;
    }
    frames
}

fn word(text: &str, start: f64, end: f64) -> RawWord {
    RawWord {
        word: text.to_string(),
        start,
        end,
        confidence: None,
    }
}

fn event(kind: &str, start: f64, end: f64) -> RawAudioEvent {
    RawAudioEvent {
        kind: kind.to_string(),
        start,
        end,
        confidence: None,
    }
}

fn caption(outputs: &EngineOutputs) -> CaptionOutput {
    run_core(outputs, &CaptionConfig::default()).expect("core should succeed")
}

fn speakers(output: &CaptionOutput) -> Vec<String> {
    output.cues.iter().map(|c| c.speaker.label()).collect()
}

fn assert_well_formed(output: &CaptionOutput) {
    for cue in &output.cues {
        assert!(cue.span.start < cue.span.end, "empty cue {cue:?}");
    }
    for pair in output.cues.windows(2) {
        assert!(
            pair[0].span.start <= pair[1].span.start,
            "cues out of order: {pair:?}"
        );
        assert!(
            pair[0].span.end <= pair[1].span.start,
            "cues overlap: {pair:?}"
        );
    }
}

// ─── Reference scenarios ────────────────────────────────────────────────────

#[test]
fn face_covering_whole_turn_names_the_speaker() {
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 2.0, "hello there")],
        turns: vec![turn("SPEAKER_00", 0.0, 2.0)],
        frames: face_frames(0.0, 2.0, "Alice"),
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert_eq!(output.cues.len(), 1);
    let cue = &output.cues[0];
    assert_eq!((cue.span.start, cue.span.end), (0, 2000));
    assert_eq!(cue.speaker, Identity::Name("Alice".into()));
    assert_eq!(cue.text, "hello there");
}

#[test]
fn brief_face_overlap_falls_back_to_numbered_speaker() {
    // A single frame at 1.7 s covers [1.7, 2.2): 0.3 s of the turn.
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 2.0, "hello there")],
        turns: vec![turn("SPEAKER_00", 0.0, 2.0)],
        frames: face_frames(1.7, 2.0, "Alice"),
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert_eq!(output.cues.len(), 1);
    assert_eq!(output.cues[0].speaker, Identity::Anonymous(1));
    assert_eq!(output.cues[0].speaker.label(), "Speaker1");
    assert_eq!(output.diagnostics.named_speakers, 0);
}

#[test]
fn weaker_cluster_loses_contested_name() {
    // Bob is on screen for the first 6 s: 5 s of cluster A and 1 s of cluster B.
    // With a 0.5 s threshold both clusters propose Bob and the conflict decides.
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 5.0, "first part"), segment(5.0, 8.0, "second part")],
        turns: vec![turn("A", 0.0, 5.0), turn("B", 5.0, 7.0)],
        frames: face_frames(0.0, 6.0, "Bob"),
        ..EngineOutputs::default()
    };
    let config = CaptionConfig {
        min_cluster_overlap_seconds: 0.5,
        ..CaptionConfig::default()
    };

    let output = run_core(&outputs, &config).expect("core should succeed");

    assert_eq!(output.speakers[0].identity, Identity::Name("Bob".into()));
    assert_eq!(output.speakers[1].identity, Identity::Anonymous(2));
    assert_eq!(speakers(&output), vec!["Bob", "Speaker2"]);
    assert!(output.diagnostics.warnings.iter().any(|w| matches!(
        w,
        Warning::ClusterEvidence {
            reason: EvidenceReason::LostNameConflict { name, winner },
            ..
        } if name == "Bob" && winner.to_string() == "A"
    )));
}

#[test]
fn brief_face_evidence_leaves_cluster_numbered() {
    // Same footage at the default 2 s threshold: B's 1 s never proposes a name.
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 5.0, "first part"), segment(5.0, 8.0, "second part")],
        turns: vec![turn("A", 0.0, 5.0), turn("B", 5.0, 7.0)],
        frames: face_frames(0.0, 6.0, "Bob"),
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert_eq!(speakers(&output), vec!["Bob", "Speaker2"]);
    assert!(output.diagnostics.warnings.iter().any(|w| matches!(
        w,
        Warning::ClusterEvidence {
            reason: EvidenceReason::BelowThreshold { .. },
            ..
        }
    )));
}

#[test]
fn name_conflict_above_threshold_keeps_stronger_cluster() {
    // Both clusters clear the 2 s threshold; A has 5 s, B has 3 s.
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 5.0, "first part"), segment(5.0, 8.0, "second part")],
        turns: vec![turn("A", 0.0, 5.0), turn("B", 5.0, 8.0)],
        frames: face_frames(0.0, 8.0, "Bob"),
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    let named: Vec<_> = output
        .speakers
        .iter()
        .filter(|s| s.identity == Identity::Name("Bob".into()))
        .collect();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].cluster.to_string(), "A");
    assert_eq!(output.speakers[1].identity, Identity::Anonymous(2));
}

// ─── Invariants ─────────────────────────────────────────────────────────────

#[test]
fn turn_without_video_gets_numbered_speaker() {
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 3.0, "off screen narration")],
        turns: vec![turn("NARRATOR", 0.0, 3.0)],
        frames: vec![],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert_eq!(speakers(&output), vec!["Speaker1"]);
    assert_eq!(output.diagnostics.face_tracks, 0);
}

#[test]
fn simultaneous_speech_still_yields_disjoint_cues() {
    let words = ["we", "both", "talk", "at", "once", "here"]
        .iter()
        .enumerate()
        .map(|(i, w)| RawWord {
            word: (*w).to_string(),
            start: i as f64 * 0.6,
            end: i as f64 * 0.6 + 0.5,
            confidence: None,
        })
        .collect();
    let outputs = EngineOutputs {
        transcript: vec![RawTranscriptSegment {
            words,
            ..segment(0.0, 4.0, "we both talk at once here")
        }],
        turns: vec![turn("A", 0.0, 4.0), turn("B", 0.0, 4.0)],
        frames: vec![],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert!(!output.cues.is_empty());
    assert_well_formed(&output);
}

#[test]
fn names_are_never_shared_between_clusters() {
    let mut frames = face_frames(0.0, 12.0, "Carol");
    frames.extend(face_frames(12.0, 18.0, "Dan"));
    let outputs = EngineOutputs {
        transcript: vec![
            segment(0.0, 4.0, "one"),
            segment(4.0, 8.0, "two"),
            segment(8.0, 12.0, "three"),
            segment(12.0, 18.0, "four"),
        ],
        turns: vec![
            turn("A", 0.0, 4.0),
            turn("B", 4.0, 8.0),
            turn("C", 8.0, 12.0),
            turn("D", 12.0, 18.0),
        ],
        frames,
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    let mut names: Vec<_> = output
        .speakers
        .iter()
        .filter_map(|s| match &s.identity {
            Identity::Name(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
    assert!(names.contains(&"Dan".to_string()));
    assert_well_formed(&output);
}

#[test]
fn long_speech_is_split_into_ordered_cues() {
    let outputs = EngineOutputs {
        transcript: vec![segment(
            0.0,
            20.0,
            "a fairly long monologue that keeps going well past the longest cue we allow",
        )],
        turns: vec![turn("A", 0.0, 20.0)],
        frames: face_frames(0.0, 20.0, "Erin"),
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert!(output.cues.len() >= 3);
    assert!(output.cues.iter().all(|c| c.span.duration() <= 7000));
    assert!(output.cues.iter().all(|c| c.speaker == Identity::Name("Erin".into())));
    assert_well_formed(&output);
}

#[test]
fn pause_inside_long_segment_keeps_cues_short() {
    let outputs = EngineOutputs {
        transcript: vec![RawTranscriptSegment {
            words: vec![word("alpha", 0.0, 1.0), word("beta", 9.0, 9.5)],
            ..segment(0.0, 9.5, "alpha beta")
        }],
        turns: vec![turn("A", 0.0, 9.5)],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert!(output.cues.iter().all(|c| c.span.duration() <= 7000), "{:?}", output.cues);
    let text: Vec<&str> = output.cues.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text.join(" "), "alpha beta");
    assert_well_formed(&output);
}

#[test]
fn words_missing_from_timings_stay_in_captions() {
    let outputs = EngineOutputs {
        transcript: vec![RawTranscriptSegment {
            words: vec![word("hello", 0.0, 0.5), word("there", 8.0, 8.5)],
            ..segment(0.0, 9.0, "hello there friend")
        }],
        turns: vec![turn("A", 0.0, 9.0)],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    let text: Vec<&str> = output.cues.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text.join(" "), "hello there friend");
    assert_well_formed(&output);
}

#[test]
fn music_between_speech_gets_its_own_cue() {
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 3.0, "and now a song"), segment(12.0, 14.0, "that was lovely")],
        turns: vec![turn("HOST", 0.0, 3.0), turn("HOST", 12.0, 14.0)],
        events: vec![
            event("speech", 0.0, 3.0),
            event("music", 2.5, 12.5),
            event("silence", 14.0, 14.3),
        ],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    let labels = speakers(&output);
    assert_eq!(labels, vec!["Speaker1", "[music]", "[music]", "Speaker1"]);
    assert_eq!(output.cues[1].span.start, 3000);
    assert_eq!(output.cues[2].span.end, 12_000);
    assert_eq!(output.diagnostics.sound_cues, 2);
    assert_well_formed(&output);

    let srt = SrtWriter.render(&output).unwrap();
    assert!(srt.contains("\n[music]\n"));
    assert!(srt.contains("Speaker1: that was lovely"));
}

#[test]
fn identical_input_renders_identical_captions() {
    let mut frames = face_frames(0.0, 4.0, "Alice");
    frames.extend(face_frames(6.0, 10.0, "Bob"));
    let outputs = EngineOutputs {
        transcript: vec![
            segment(0.0, 4.0, "hi bob"),
            segment(4.5, 10.0, "hello alice, how was the trip"),
        ],
        turns: vec![turn("S0", 0.0, 4.2), turn("S1", 4.4, 10.0)],
        frames,
        ..EngineOutputs::default()
    };

    let first = SrtWriter.render(&caption(&outputs)).unwrap();
    let second = SrtWriter.render(&caption(&outputs)).unwrap();

    assert_eq!(first, second);
    assert!(first.contains("Alice: hi bob"));
}

// ─── Failures ───────────────────────────────────────────────────────────────

#[test]
fn overlapping_turns_of_one_cluster_are_rejected() {
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 4.0, "text")],
        turns: vec![turn("A", 0.0, 3.0), turn("A", 2.0, 4.0)],
        frames: vec![],
        ..EngineOutputs::default()
    };

    let err = run_core(&outputs, &CaptionConfig::default()).unwrap_err();

    assert!(matches!(
        err,
        CaptionError::MalformedSegment {
            modality: Modality::Diarization,
            ..
        }
    ));
}

#[test]
fn degenerate_entries_become_warnings() {
    let outputs = EngineOutputs {
        transcript: vec![segment(0.0, 2.0, "kept"), segment(3.0, 3.0, "dropped")],
        turns: vec![turn("A", 0.0, 2.0)],
        frames: vec![],
        ..EngineOutputs::default()
    };

    let output = caption(&outputs);

    assert_eq!(output.cues.len(), 1);
    assert_eq!(output.diagnostics.dropped_entries, 1);
}
