use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use captionfuse::caption::{CancellationToken, CaptionPipeline, Engines, FileOutcome};
use captionfuse::engine::{
    require_tool, FaceGallery, InsightFaceRecognizer, PyannoteDiarizer, RecordedDiarizer,
    RecordedEvents, RecordedFaces, RecordedTranscriber, SilenceDetector, WhisperTranscriber,
};
use captionfuse::format::{output_path, write_captions};
use captionfuse::{CaptionConfig, CaptionFormat, CaptionOutput};

/// Command-line overrides applied on top of the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub min_overlap_fraction: Option<f64>,
    pub min_cluster_overlap: Option<f64>,
    pub max_chars_per_line: Option<usize>,
    pub whisper_model: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut CaptionConfig) {
        if let Some(v) = self.min_overlap_fraction {
            config.min_overlap_fraction = v;
        }
        if let Some(v) = self.min_cluster_overlap {
            config.min_cluster_overlap_seconds = v;
        }
        if let Some(v) = self.max_chars_per_line {
            config.max_chars_per_line = v;
        }
        if let Some(v) = self.whisper_model {
            config.engines.whisper_model = v;
        }
    }
}

pub struct CaptionArgs {
    pub media: Vec<PathBuf>,
    pub recorded: Option<PathBuf>,
    pub gallery: Option<PathBuf>,
    pub format: CaptionFormat,
    pub output_dir: Option<PathBuf>,
    pub concurrency: usize,
    /// Caption long silences found by ffmpeg (live engines only)
    pub detect_silence: bool,
    pub overrides: Overrides,
}

fn build_engines(args: &CaptionArgs, config: &CaptionConfig) -> Result<Engines> {
    if let Some(dir) = &args.recorded {
        eprintln!("   Engines: recorded output in {}", dir.display());
        return Ok(Engines {
            transcriber: Arc::new(RecordedTranscriber::new(dir)),
            diarizer: Arc::new(RecordedDiarizer::new(dir)),
            faces: Arc::new(RecordedFaces::new(dir)),
            events: Some(Arc::new(RecordedEvents::new(dir))),
        });
    }

    require_tool("ffmpeg")?;
    require_tool(&config.engines.python)?;

    let mut faces = InsightFaceRecognizer::new(config);
    match &args.gallery {
        Some(path) => {
            let gallery = FaceGallery::load(path, config.engines.recognition_threshold)
                .with_context(|| format!("failed to load gallery {}", path.display()))?;
            eprintln!("   Gallery: {} known faces", gallery.len());
            faces = faces.with_gallery(Arc::new(gallery));
        }
        None => eprintln!("   Gallery: none (speakers will be numbered)"),
    }
    eprintln!(
        "   Engines: whisper ({}), pyannote, insightface @ {} fps",
        config.engines.whisper_model, config.frame_sample_rate
    );

    let mut engines = Engines {
        transcriber: Arc::new(WhisperTranscriber::new(&config.engines)),
        diarizer: Arc::new(PyannoteDiarizer::new(&config.engines)),
        faces: Arc::new(faces),
        events: None,
    };
    if args.detect_silence {
        eprintln!(
            "   Events: silences of {}s or more below {} dB",
            config.engines.min_silence_seconds, config.engines.silence_noise_db
        );
        engines = engines.with_events(Arc::new(SilenceDetector::new(&config.engines)));
    }
    Ok(engines)
}

fn report(video: &Path, path: &Path, output: &CaptionOutput) {
    let diag = &output.diagnostics;
    eprintln!(
        "✅ {} → {} ({} cues, {} named, {} numbered)",
        video.display(),
        path.display(),
        diag.cues,
        diag.named_speakers,
        diag.anonymous_speakers
    );
    if diag.sound_cues > 0 {
        eprintln!("   {} sound cues", diag.sound_cues);
    }
    if diag.unresolved_segments > 0 {
        eprintln!("   {} segments without a speaker", diag.unresolved_segments);
    }
    if !diag.warnings.is_empty() {
        eprintln!(
            "   {} warnings ({} dropped entries, {} insufficient evidence)",
            diag.warnings.len(),
            diag.dropped_entries,
            diag.insufficient_evidence()
        );
    }
}

pub async fn cmd_caption(mut args: CaptionArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = captionfuse::config::load(config_path)?;
    std::mem::take(&mut args.overrides).apply(&mut config);
    config.validate()?;

    eprintln!(
        "🎬 Captioning {} file(s) (concurrency: {})",
        args.media.len(),
        args.concurrency.max(1)
    );

    let engines = build_engines(&args, &config)?;
    let pipeline = Arc::new(CaptionPipeline::new(engines, config)?);

    if let Some(dir) = &args.output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupted, cancelling remaining files");
            trigger.cancel();
        }
    });

    let start = std::time::Instant::now();
    let total = args.media.len();
    let items = pipeline
        .caption_batch(args.media.clone(), args.concurrency, cancel)
        .await;

    let writer = args.format.writer();
    let mut failed = 0;
    let mut cancelled = 0;
    for item in items {
        match item.outcome {
            FileOutcome::Captioned(output) => {
                let path = output_path(&item.video, args.output_dir.as_deref(), args.format);
                match write_captions(writer.as_ref(), &output, &path).await {
                    Ok(()) => report(&item.video, &path, &output),
                    Err(e) => {
                        failed += 1;
                        eprintln!("❌ {}: cannot write {}: {e}", item.video.display(), path.display());
                    }
                }
            }
            FileOutcome::Failed(e) => {
                failed += 1;
                eprintln!("❌ {}: {e}", item.video.display());
            }
            FileOutcome::Cancelled => {
                cancelled += 1;
                eprintln!("⏹  {}: cancelled", item.video.display());
            }
        }
    }

    eprintln!(
        "\n📊 {} of {total} captioned in {:.1}s",
        total - failed - cancelled,
        start.elapsed().as_secs_f64()
    );

    if failed + cancelled > 0 {
        anyhow::bail!("{failed} failed, {cancelled} cancelled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let mut config = CaptionConfig::default();
        Overrides {
            min_overlap_fraction: Some(0.5),
            max_chars_per_line: Some(32),
            ..Overrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.min_overlap_fraction, 0.5);
        assert_eq!(config.max_chars_per_line, 32);
        assert_eq!(config.min_cluster_overlap_seconds, 2.0);
    }
}
