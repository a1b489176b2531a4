//! Speaker diarization via pyannote
//!
//! Identifies who speaks when in the audio track.
//! Requires the pyannote.audio Python package and a `HuggingFace` token.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{MediaJob, RawTurn, SpeakerDiarizer};
use crate::caption::{CaptionError, Result};
use crate::config::EngineConfig;

const PIPELINE: &str = "pyannote/speaker-diarization-3.1";

const SCRIPT: &str = r#"
import json
import os
import sys
from pyannote.audio import Pipeline

audio_path, pipeline_name = sys.argv[1], sys.argv[2]
token = os.environ.get("CAPTIONFUSE_HF_TOKEN", "")
pipeline = Pipeline.from_pretrained(pipeline_name, use_auth_token=token or None)
diarization = pipeline(audio_path)

turns = []
for turn, _, speaker in diarization.itertracks(yield_label=True):
    turns.append({
        "speaker": speaker,
        "start": turn.start,
        "end": turn.end,
    })

print(json.dumps(turns))
"#;

/// Speaker diarization engine using pyannote
#[derive(Debug, Clone)]
pub struct PyannoteDiarizer {
    python: String,
    token_env: String,
}

impl PyannoteDiarizer {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            python: config.python.clone(),
            token_env: config.hf_token_env.clone(),
        }
    }

    fn token(&self) -> String {
        std::env::var(&self.token_env).unwrap_or_else(|_| {
            warn!("{} is not set; pyannote may refuse to load", self.token_env);
            String::new()
        })
    }
}

#[async_trait]
impl SpeakerDiarizer for PyannoteDiarizer {
    fn name(&self) -> &str {
        "pyannote"
    }

    async fn diarize(&self, job: &MediaJob) -> Result<Vec<RawTurn>> {
        debug!("running pyannote on {}", job.audio.display());

        // The token travels through the environment, never on the command line.
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(SCRIPT)
            .arg(&job.audio)
            .arg(PIPELINE)
            .env("CAPTIONFUSE_HF_TOKEN", self.token())
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

        let turns: Vec<RawTurn> = serde_json::from_slice(&output.stdout)?;
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pyannote_output() {
        let json = r#"[{"speaker": "SPEAKER_00", "start": 0.03, "end": 4.2},
                       {"speaker": "SPEAKER_01", "start": 3.9, "end": 7.5}]"#;

        let turns: Vec<RawTurn> = serde_json::from_str(json).unwrap();

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].speaker, "SPEAKER_01");
        assert_eq!(turns[0].confidence, None);
    }

    #[test]
    fn test_diarizer_from_config() {
        let diarizer = PyannoteDiarizer::new(&EngineConfig::default());
        assert_eq!(diarizer.token_env, "HF_TOKEN");
        assert!(diarizer.needs_audio());
    }
}
