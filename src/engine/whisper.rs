//! Audio transcription via Whisper
//!
//! Runs openai-whisper in a Python subprocess and reads its segments, with
//! word-level timestamps, back as JSON.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{MediaJob, RawTranscriptSegment, SpeechRecognizer};
use crate::caption::{CaptionError, Result};
use crate::config::EngineConfig;

const SCRIPT: &str = r#"
import json
import sys
import whisper

audio_path, model_name, language = sys.argv[1], sys.argv[2], sys.argv[3]
model = whisper.load_model(model_name)
result = model.transcribe(
    audio_path,
    word_timestamps=True,
    language=None if language == "auto" else language,
    verbose=False,
)

segments = []
for seg in result["segments"]:
    segment = {
        "start": seg["start"],
        "end": seg["end"],
        "text": seg["text"].strip(),
        "language": result.get("language"),
        "words": [
            {
                "word": w["word"].strip(),
                "start": w["start"],
                "end": w["end"],
                "confidence": w.get("probability"),
            }
            for w in seg.get("words", [])
        ],
    }
    segments.append(segment)

print(json.dumps(segments))
"#;

/// Whisper transcription engine
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    python: String,
    model: String,
    language: String,
}

impl WhisperTranscriber {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            python: config.python.clone(),
            model: config.whisper_model.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, job: &MediaJob) -> Result<Vec<RawTranscriptSegment>> {
        debug!(model = %self.model, "running whisper on {}", job.audio.display());

        let output = Command::new(&self.python)
            .arg("-c")
            .arg(SCRIPT)
            .arg(&job.audio)
            .arg(&self.model)
            .arg(&self.language)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptionError::engine(self.name(), format!("failed to start {}: {e}", self.python)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptionError::engine(self.name(), stderr.trim().to_string()));
        }

        let segments: Vec<RawTranscriptSegment> = serde_json::from_slice(&output.stdout)?;
        Ok(segments)
    }
}
