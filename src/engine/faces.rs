//! Face detection and recognition via InsightFace
//!
//! Frames are sampled with ffmpeg, a Python subprocess detects faces and
//! computes normalized embeddings, and the gallery turns each embedding
//! into a name (or nothing).

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::extract::FrameSampler;
use super::gallery::{GalleryEntry, KnownFace};
use super::{FaceRecognizer, IdentityGallery, MediaJob, RawFaceDetection, RawFrame};
use crate::caption::{CaptionError, Result};
use crate::config::CaptionConfig;

const MODEL: &str = "buffalo_l";

const SCRIPT: &str = r#"
import json
import sys
import cv2
from insightface.app import FaceAnalysis

with open(sys.argv[1]) as f:
    request = json.load(f)

app = FaceAnalysis(name=request["model"])
app.prepare(ctx_id=0, det_size=(640, 640))

results = []
for path in request["images"]:
    img = cv2.imread(path)
    if img is None:
        results.append([])
        continue
    h, w = img.shape[:2]
    faces = []
    for face in app.get(img):
        x1, y1, x2, y2 = [float(v) for v in face.bbox]
        faces.append({
            "bbox": [x1 / w, y1 / h, (x2 - x1) / w, (y2 - y1) / h],
            "embedding": face.normed_embedding.tolist(),
        })
    results.append(faces)

print(json.dumps(results))
"#;

/// One face as reported by the detection script
#[derive(Debug, Clone, Deserialize)]
struct DetectedFace {
    bbox: [f32; 4],
    embedding: Vec<f32>,
}

impl DetectedFace {
    fn area(&self) -> f32 {
        self.bbox[2].max(0.0) * self.bbox[3].max(0.0)
    }
}

/// Face engine backed by InsightFace
pub struct InsightFaceRecognizer {
    python: String,
    sampler: FrameSampler,
    gallery: Option<Arc<dyn IdentityGallery>>,
}

impl InsightFaceRecognizer {
    #[must_use]
    pub fn new(config: &CaptionConfig) -> Self {
        Self {
            python: config.engines.python.clone(),
            sampler: FrameSampler::new(config.frame_sample_rate),
            gallery: None,
        }
    }

    /// Identify faces against `gallery`; without one every face is unidentified.
    #[must_use]
    pub fn with_gallery(mut self, gallery: Arc<dyn IdentityGallery>) -> Self {
        self.gallery = Some(gallery);
        self
    }

    /// Run detection over `images`, one result list per image.
    async fn detect(&self, images: &[PathBuf], scratch: &Path) -> Result<Vec<Vec<DetectedFace>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(scratch).await?;
        let request_path = scratch.join("faces_request.json");
        let request = serde_json::json!({ "model": MODEL, "images": images });
        tokio::fs::write(&request_path, serde_json::to_vec(&request)?).await?;

        let output = Command::new(&self.python)
            .arg("-c")
            .arg(SCRIPT)
            .arg(&request_path)
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

        let results: Vec<Vec<DetectedFace>> = serde_json::from_slice(&output.stdout)?;
        if results.len() != images.len() {
            return Err(CaptionError::engine(
                self.name(),
                format!("expected {} results, got {}", images.len(), results.len()),
            ));
        }
        Ok(results)
    }

    fn identify(&self, face: DetectedFace) -> RawFaceDetection {
        let matched = self.gallery.as_ref().and_then(|g| g.lookup(&face.embedding));
        RawFaceDetection {
            bbox: face.bbox,
            similarity: matched.as_ref().map_or(0.0, |(_, s)| *s),
            name: matched.map(|(name, _)| name),
        }
    }

    /// Embed the largest face of each reference photo.
    ///
    /// Photos without a detectable face are skipped with a warning.
    pub async fn embed_known_faces(&self, known: &[KnownFace], scratch: &Path) -> Result<Vec<GalleryEntry>> {
        let images: Vec<PathBuf> = known.iter().map(|k| k.image_path.clone()).collect();
        let results = self.detect(&images, scratch).await?;

        let mut entries = Vec::with_capacity(known.len());
        for (person, faces) in known.iter().zip(results) {
            let largest = faces
                .into_iter()
                .max_by(|a, b| a.area().total_cmp(&b.area()));
            match largest {
                Some(face) => entries.push(GalleryEntry {
                    name: person.name.clone(),
                    embedding: face.embedding,
                }),
                None => warn!("no face found in {}", person.image_path.display()),
            }
        }

        info!(embedded = entries.len(), requested = known.len(), "embedded known faces");
        Ok(entries)
    }
}

#[async_trait]
impl FaceRecognizer for InsightFaceRecognizer {
    fn name(&self) -> &str {
        "insightface"
    }

    async fn analyze(&self, job: &MediaJob) -> Result<Vec<RawFrame>> {
        let frames_dir = job.work_dir.join("frames");
        let sampled = self.sampler.sample(&job.video, &frames_dir).await?;
        debug!(frames = sampled.len(), "sampled frames");

        let images: Vec<PathBuf> = sampled.iter().map(|f| f.path.clone()).collect();
        let results = self.detect(&images, &job.work_dir).await?;

        Ok(sampled
            .into_iter()
            .zip(results)
            .map(|(frame, faces)| RawFrame {
                timestamp: frame.timestamp,
                faces: faces.into_iter().map(|face| self.identify(face)).collect(),
            })
            .collect())
    }
}
