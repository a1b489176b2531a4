//! JSON writer: cues, speaker bindings and diagnostics in one document

use serde::Serialize;

use super::{CaptionFormat, CaptionWriter};
use crate::caption::{CaptionOutput, ClusterBinding, Diagnostics, Identity, Millis, Result};

#[derive(Serialize)]
struct JsonCue<'a> {
    start_ms: Millis,
    end_ms: Millis,
    /// Display label, e.g. `Alice` or `Speaker2`
    speaker: String,
    identity: &'a Identity,
    text: &'a str,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    cues: Vec<JsonCue<'a>>,
    speakers: &'a [ClusterBinding],
    diagnostics: &'a Diagnostics,
}

/// JSON caption writer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWriter;

impl CaptionWriter for JsonWriter {
    fn format(&self) -> CaptionFormat {
        CaptionFormat::Json
    }

    fn render(&self, output: &CaptionOutput) -> Result<String> {
        let document = JsonDocument {
            cues: output
                .cues
                .iter()
                .map(|cue| JsonCue {
                    start_ms: cue.span.start,
                    end_ms: cue.span.end,
                    speaker: cue.speaker.label(),
                    identity: &cue.speaker,
                    text: &cue.text,
                })
                .collect(),
            speakers: &output.speakers,
            diagnostics: &output.diagnostics,
        };

        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');
        Ok(json)
    }
}
