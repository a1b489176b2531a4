//! `captionfuse` - speaker-attributed closed captions
//!
//! # Features
//!
//! - **Transcription**: Whisper segments with word-level timing
//! - **Diarization**: pyannote speaker turns, overlapping speech preserved
//! - **Face identity**: InsightFace detection matched against a known-faces gallery
//! - **Fusion**: face tracks bound to speaker clusters, one name per cluster
//! - **Sound cues**: `[music]`, `[silence]` and `[sound]` between speech
//! - **Output**: SRT, `WebVTT` or JSON with per-file diagnostics
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use captionfuse::caption::{CaptionPipeline, Engines};
//! use captionfuse::engine::{RecordedDiarizer, RecordedEvents, RecordedFaces, RecordedTranscriber};
//! use captionfuse::CaptionConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engines = Engines {
//!         transcriber: Arc::new(RecordedTranscriber::new("recorded")),
//!         diarizer: Arc::new(RecordedDiarizer::new("recorded")),
//!         faces: Arc::new(RecordedFaces::new("recorded")),
//!         events: Some(Arc::new(RecordedEvents::new("recorded"))),
//!     };
//!     let pipeline = CaptionPipeline::new(engines, CaptionConfig::default())?;
//!     let output = pipeline.caption_file("interview.mp4".as_ref()).await?;
//!     println!("{} cues", output.cues.len());
//!     Ok(())
//! }
//! ```

pub mod caption;
pub mod config;
pub mod engine;
pub mod format;

pub use caption::{run_core, CaptionCue, CaptionError, CaptionOutput, Diagnostics, Identity};
pub use config::CaptionConfig;
pub use engine::EngineOutputs;
pub use format::{CaptionFormat, CaptionWriter};

/// Version of captionfuse
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
