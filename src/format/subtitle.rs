//! SRT and `WebVTT` writers
//!
//! Every speech cue renders as `Speaker: text`; wrapped lines stay as the
//! composer broke them. Sound cues carry no text and render as their
//! label alone, e.g. `[music]`.

use std::fmt::Write as FmtWrite;

use super::{CaptionFormat, CaptionWriter};
use crate::caption::{CaptionCue, CaptionOutput, Millis, Result};

/// Format time as SRT timestamp (HH:MM:SS,mmm)
#[must_use]
pub fn format_srt_time(ms: Millis) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Format time as VTT timestamp (HH:MM:SS.mmm)
#[must_use]
pub fn format_vtt_time(ms: Millis) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

fn labelled(cue: &CaptionCue) -> String {
    if cue.text.is_empty() {
        return cue.speaker.label();
    }
    format!("{}: {}", cue.speaker.label(), cue.text)
}

/// SRT caption writer
#[derive(Debug, Clone, Copy, Default)]
pub struct SrtWriter;

impl CaptionWriter for SrtWriter {
    fn format(&self) -> CaptionFormat {
        CaptionFormat::Srt
    }

    fn render(&self, output: &CaptionOutput) -> Result<String> {
        let mut out = String::new();

        for (i, cue) in output.cues.iter().enumerate() {
            // Sequence number (1-indexed)
            writeln!(out, "{}", i + 1)?;
            writeln!(
                out,
                "{} --> {}",
                format_srt_time(cue.span.start),
                format_srt_time(cue.span.end)
            )?;
            writeln!(out, "{}", labelled(cue))?;
            writeln!(out)?;
        }

        Ok(out)
    }
}

/// `WebVTT` caption writer
#[derive(Debug, Clone, Copy, Default)]
pub struct VttWriter;

impl CaptionWriter for VttWriter {
    fn format(&self) -> CaptionFormat {
        CaptionFormat::Vtt
    }

    fn render(&self, output: &CaptionOutput) -> Result<String> {
        let mut out = String::from("WEBVTT\n\n");

        for cue in &output.cues {
            writeln!(
                out,
                "{} --> {}",
                format_vtt_time(cue.span.start),
                format_vtt_time(cue.span.end)
            )?;
            // `-->` may not appear inside cue text
            writeln!(out, "{}", labelled(cue).replace("-->", "->"))?;
            writeln!(out)?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::{Identity, SoundKind, Span};

    fn output() -> CaptionOutput {
        CaptionOutput {
            cues: vec![
                CaptionCue {
                    span: Span::new(0, 2000),
                    speaker: Identity::Name("Alice".into()),
                    text: "hello there".into(),
                },
                CaptionCue {
                    span: Span::new(2500, 4000),
                    speaker: Identity::Anonymous(2),
                    text: "who are you\nand why".into(),
                },
            ],
            ..CaptionOutput::default()
        }
    }

    #[test]
    fn test_srt_time_format() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(1000), "00:00:01,000");
        assert_eq!(format_srt_time(61000), "00:01:01,000");
        assert_eq!(format_srt_time(3661500), "01:01:01,500");
    }

    #[test]
    fn test_vtt_time_format() {
        assert_eq!(format_vtt_time(3661500), "01:01:01.500");
    }

    #[test]
    fn test_srt_render() {
        let rendered = SrtWriter.render(&output()).unwrap();

        assert_eq!(
            rendered,
            "1\n00:00:00,000 --> 00:00:02,000\nAlice: hello there\n\n\
             2\n00:00:02,500 --> 00:00:04,000\nSpeaker2: who are you\nand why\n\n"
        );
    }

    #[test]
    fn test_vtt_render() {
        let rendered = VttWriter.render(&output()).unwrap();

        assert!(rendered.starts_with("WEBVTT\n\n"));
        assert!(rendered.contains("00:00:02.500 --> 00:00:04.000\nSpeaker2: who are you"));
    }

    #[test]
    fn test_sound_cue_renders_label_only() {
        let mut output = output();
        output.cues.push(CaptionCue {
            span: Span::new(4000, 9000),
            speaker: Identity::Sound(SoundKind::Music),
            text: String::new(),
        });

        let srt = SrtWriter.render(&output).unwrap();
        let vtt = VttWriter.render(&output).unwrap();

        assert!(srt.ends_with("3\n00:00:04,000 --> 00:00:09,000\n[music]\n\n"));
        assert!(vtt.contains("00:00:04.000 --> 00:00:09.000\n[music]\n"));
    }

    #[test]
    fn test_empty_output_renders() {
        let empty = CaptionOutput::default();
        assert_eq!(SrtWriter.render(&empty).unwrap(), "");
        assert_eq!(VttWriter.render(&empty).unwrap(), "WEBVTT\n\n");
    }
}
