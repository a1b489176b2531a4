//! Known-faces gallery
//!
//! A JSON list of `{name, embedding}` entries. Lookup returns the most
//! similar entry by cosine similarity, or nothing below the threshold.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::IdentityGallery;
use crate::caption::Result;

/// One reference embedding for a known person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Vec<f32>,
}

/// Input row for building a gallery: one reference photo per entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    pub image_path: PathBuf,
}

/// In-memory gallery of known faces
#[derive(Debug, Clone, Default)]
pub struct FaceGallery {
    entries: Vec<GalleryEntry>,
    threshold: f32,
}

impl FaceGallery {
    #[must_use]
    pub fn new(entries: Vec<GalleryEntry>, threshold: f32) -> Self {
        Self { entries, threshold }
    }

    /// Load a gallery written by `embed-faces`.
    pub fn load(path: &Path, threshold: f32) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<GalleryEntry> = serde_json::from_str(&content)?;
        debug!(entries = entries.len(), "loaded face gallery from {}", path.display());
        Ok(Self::new(entries, threshold))
    }

    /// Write entries as pretty JSON, replacing `path` atomically.
    pub fn save(entries: &[GalleryEntry], path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityGallery for FaceGallery {
    fn lookup(&self, embedding: &[f32]) -> Option<(String, f32)> {
        let mut best: Option<(&GalleryEntry, f32)> = None;
        for entry in &self.entries {
            let similarity = cosine_similarity(embedding, &entry.embedding);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((entry, similarity));
            }
        }

        best.filter(|(_, similarity)| *similarity >= self.threshold)
            .map(|(entry, similarity)| (entry.name.clone(), similarity))
    }
}

/// Cosine similarity between two embeddings; 0 for mismatched or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, embedding: &[f32]) -> GalleryEntry {
        GalleryEntry {
            name: name.to_string(),
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);

        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_lookup_best_above_threshold() {
        let gallery = FaceGallery::new(
            vec![entry("Alice", &[1.0, 0.0]), entry("Bob", &[0.6, 0.8])],
            0.5,
        );

        let (name, similarity) = gallery.lookup(&[0.5, 0.9]).unwrap();
        assert_eq!(name, "Bob");
        assert!(similarity > 0.9);

        // orthogonal to both
        assert_eq!(gallery.lookup(&[-0.8, 0.6]), None);
    }

    #[test]
    fn test_empty_gallery_matches_nothing() {
        let gallery = FaceGallery::default();
        assert!(gallery.is_empty());
        assert_eq!(gallery.lookup(&[1.0, 0.0]), None);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("captionfuse-gallery-{}.json", uuid::Uuid::new_v4()));
        let entries = vec![entry("Alice", &[0.1, 0.2, 0.3])];

        FaceGallery::save(&entries, &path).unwrap();
        let gallery = FaceGallery::load(&path, 0.45).unwrap();

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.lookup(&[0.1, 0.2, 0.3]).unwrap().0, "Alice");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_known_faces_format() {
        let json = r#"[{"name": "Alice", "image_path": "faces/alice.jpg"}]"#;
        let known: Vec<KnownFace> = serde_json::from_str(json).unwrap();
        assert_eq!(known[0].image_path, PathBuf::from("faces/alice.jpg"));
    }
}
