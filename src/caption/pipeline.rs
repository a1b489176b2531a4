//! Whole-file orchestration
//!
//! Runs the perception engines concurrently for each file, waits for all
//! of them, then hands their output to the pure core. A batch processes
//! files with bounded concurrency; a failure or cancellation only affects
//! the file it happens to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub use tokio_util::sync::CancellationToken;

use super::{run_core, CaptionError, CaptionOutput, Result};
use crate::config::CaptionConfig;
use crate::engine::{
    AudioEventDetector, AudioExtractor, EngineOutputs, FaceRecognizer, MediaJob, RawAudioEvent,
    SpeakerDiarizer, SpeechRecognizer,
};

/// Long-lived engine instances shared by every file in a run
#[derive(Clone)]
pub struct Engines {
    pub transcriber: Arc<dyn SpeechRecognizer>,
    pub diarizer: Arc<dyn SpeakerDiarizer>,
    pub faces: Arc<dyn FaceRecognizer>,
    /// Without a detector no sound cues are produced
    pub events: Option<Arc<dyn AudioEventDetector>>,
}

impl Engines {
    /// Add a non-speech event detector.
    #[must_use]
    pub fn with_events(mut self, detector: Arc<dyn AudioEventDetector>) -> Self {
        self.events = Some(detector);
        self
    }

    fn needs_audio(&self) -> bool {
        self.transcriber.needs_audio()
            || self.diarizer.needs_audio()
            || self.events.as_ref().is_some_and(|d| d.needs_audio())
    }

    async fn detect_events(&self, job: &MediaJob) -> Result<Vec<RawAudioEvent>> {
        match &self.events {
            Some(detector) => detector.detect(job).await,
            None => Ok(Vec::new()),
        }
    }
}

/// How one file of a batch ended
#[derive(Debug)]
pub enum FileOutcome {
    Captioned(CaptionOutput),
    Failed(CaptionError),
    Cancelled,
}

impl From<Result<CaptionOutput>> for FileOutcome {
    fn from(result: Result<CaptionOutput>) -> Self {
        match result {
            Ok(output) => Self::Captioned(output),
            Err(CaptionError::Cancelled) => Self::Cancelled,
            Err(e) => Self::Failed(e),
        }
    }
}

/// One entry of a batch result, in input order
#[derive(Debug)]
pub struct BatchItem {
    pub video: PathBuf,
    pub outcome: FileOutcome,
}

/// Caption pipeline bound to a set of engines and one configuration
pub struct CaptionPipeline {
    engines: Engines,
    config: CaptionConfig,
    audio: AudioExtractor,
    work_root: PathBuf,
}

impl CaptionPipeline {
    /// Create a pipeline; fails when `config` does not validate.
    pub fn new(engines: Engines, config: CaptionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engines,
            config,
            audio: AudioExtractor::new(),
            work_root: std::env::temp_dir().join("captionfuse"),
        })
    }

    /// Place per-file scratch directories under `root`.
    #[must_use]
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    /// Caption one file.
    pub async fn caption_file(&self, video: &Path) -> Result<CaptionOutput> {
        self.caption_file_until(video, &CancellationToken::new())
            .await
    }

    /// Caption one file, abandoning it as soon as `cancel` fires.
    pub async fn caption_file_until(
        &self,
        video: &Path,
        cancel: &CancellationToken,
    ) -> Result<CaptionOutput> {
        let job = MediaJob::new(video, &self.work_root);
        info!("Captioning {}", video.display());

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CaptionError::Cancelled),
            result = self.run_job(&job) => result,
        };

        if let Err(e) = tokio::fs::remove_dir_all(&job.work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove {}: {e}", job.work_dir.display());
            }
        }

        result
    }

    async fn run_job(&self, job: &MediaJob) -> Result<CaptionOutput> {
        tokio::fs::create_dir_all(&job.work_dir).await?;

        if self.engines.needs_audio() {
            self.audio.extract(&job.video, &job.audio).await?;
            debug!("extracted audio to {}", job.audio.display());
        }

        let (transcript, turns, frames, events) = tokio::try_join!(
            self.engines.transcriber.transcribe(job),
            self.engines.diarizer.diarize(job),
            self.engines.faces.analyze(job),
            self.engines.detect_events(job),
        )?;
        info!(
            segments = transcript.len(),
            turns = turns.len(),
            frames = frames.len(),
            events = events.len(),
            "engines finished"
        );

        let outputs = EngineOutputs {
            transcript,
            turns,
            frames,
            events,
        };
        run_core(&outputs, &self.config)
    }

    /// Caption many files, at most `concurrency` at a time.
    ///
    /// Results come back in input order. Once `cancel` fires, files in
    /// flight are abandoned and queued files are never started; both report
    /// [`FileOutcome::Cancelled`].
    pub async fn caption_batch(
        self: Arc<Self>,
        videos: Vec<PathBuf>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Vec<BatchItem> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        info!(
            files = videos.len(),
            concurrency = concurrency.max(1),
            "starting batch"
        );

        let handles: Vec<_> = videos
            .iter()
            .cloned()
            .map(|video| {
                let pipeline = Arc::clone(&self);
                let sem = Arc::clone(&semaphore);
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    let permit = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        permit = sem.acquire_owned() => permit.ok(),
                    };
                    let outcome = match permit {
                        Some(_permit) if !cancel.is_cancelled() => {
                            pipeline.caption_file_until(&video, &cancel).await.into()
                        }
                        _ => FileOutcome::Cancelled,
                    };
                    BatchItem { video, outcome }
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        videos
            .into_iter()
            .zip(joined)
            .map(|(video, joined)| match joined {
                Ok(item) => item,
                Err(e) => BatchItem {
                    outcome: FileOutcome::Failed(CaptionError::engine(
                        "pipeline",
                        format!("worker task failed: {e}"),
                    )),
                    video,
                },
            })
            .collect()
    }
}
