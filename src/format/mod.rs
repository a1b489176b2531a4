//! Caption output formats
//!
//! Renders a finished cue stream as SRT, `WebVTT` or JSON. Files are
//! written next to their destination first and renamed into place, so a
//! reader never sees partial captions.

pub mod json;
pub mod subtitle;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

use crate::caption::{CaptionOutput, Result};

pub use json::JsonWriter;
pub use subtitle::{format_srt_time, format_vtt_time, SrtWriter, VttWriter};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionFormat {
    /// `SubRip` format (.srt) - simple, widely compatible
    #[default]
    Srt,
    /// `WebVTT` format (.vtt) - web standard
    Vtt,
    /// Cues plus speakers and diagnostics (.json)
    Json,
}

impl CaptionFormat {
    /// Get file extension for this format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
            Self::Json => "json",
        }
    }

    #[must_use]
    pub fn writer(&self) -> Box<dyn CaptionWriter> {
        match self {
            Self::Srt => Box::new(SrtWriter),
            Self::Vtt => Box::new(VttWriter),
            Self::Json => Box::new(JsonWriter),
        }
    }
}

impl fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for CaptionFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "srt" => Ok(Self::Srt),
            "vtt" | "webvtt" => Ok(Self::Vtt),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown caption format '{other}' (expected srt, vtt or json)")),
        }
    }
}

/// Renders captions for one file
pub trait CaptionWriter: Send + Sync {
    /// Get the format this writer produces
    fn format(&self) -> CaptionFormat;

    /// Render the whole document
    fn render(&self, output: &CaptionOutput) -> Result<String>;
}

/// Output path for `video` inside `dir` (or beside the video when `None`).
#[must_use]
pub fn output_path(video: &Path, dir: Option<&Path>, format: CaptionFormat) -> PathBuf {
    let stem = video
        .file_stem()
        .map_or_else(|| "captions".into(), |s| s.to_os_string());
    let mut name = stem;
    name.push(".");
    name.push(format.extension());

    match dir {
        Some(dir) => dir.join(name),
        None => video.with_file_name(name),
    }
}

/// Render and commit captions to `path` atomically.
pub async fn write_captions(
    writer: &dyn CaptionWriter,
    output: &CaptionOutput,
    path: &Path,
) -> Result<()> {
    let content = writer.render(output)?;

    let mut tmp_name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::{CaptionCue, Identity, Span};

    #[test]
    fn test_format_parse() {
        assert_eq!("SRT".parse::<CaptionFormat>(), Ok(CaptionFormat::Srt));
        assert_eq!("webvtt".parse::<CaptionFormat>(), Ok(CaptionFormat::Vtt));
        assert_eq!("json".parse::<CaptionFormat>(), Ok(CaptionFormat::Json));
        assert!("ass".parse::<CaptionFormat>().is_err());
    }

    #[test]
    fn test_output_path() {
        let video = Path::new("/media/talk.mp4");
        assert_eq!(
            output_path(video, None, CaptionFormat::Srt),
            PathBuf::from("/media/talk.srt")
        );
        assert_eq!(
            output_path(video, Some(Path::new("/out")), CaptionFormat::Vtt),
            PathBuf::from("/out/talk.vtt")
        );
    }

    #[tokio::test]
    async fn test_write_captions_leaves_no_temp_file() {
        let dir = std::env::temp_dir().join(format!("captionfuse-format-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("talk.srt");
        let output = CaptionOutput {
            cues: vec![CaptionCue {
                span: Span::new(0, 2000),
                speaker: Identity::Name("Alice".into()),
                text: "hello there".into(),
            }],
            ..CaptionOutput::default()
        };

        write_captions(&SrtWriter, &output, &path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Alice: hello there"));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
