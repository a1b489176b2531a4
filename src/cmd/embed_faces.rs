use std::path::Path;

use anyhow::{Context, Result};

use captionfuse::engine::{require_tool, FaceGallery, InsightFaceRecognizer, KnownFace};

pub async fn cmd_embed_faces(input: &Path, output: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = captionfuse::config::load(config_path)?;
    require_tool(&config.engines.python)?;

    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let mut known: Vec<KnownFace> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a list of {{name, image_path}}", input.display()))?;

    // Relative photo paths are relative to the list itself.
    let base = input.parent().unwrap_or_else(|| Path::new("."));
    for face in &mut known {
        if face.image_path.is_relative() {
            face.image_path = base.join(&face.image_path);
        }
    }

    eprintln!("🧑 Embedding {} reference photos", known.len());

    let scratch = std::env::temp_dir().join(format!("captionfuse-embed-{}", uuid::Uuid::new_v4().simple()));
    let recognizer = InsightFaceRecognizer::new(&config);
    let result = recognizer.embed_known_faces(&known, &scratch).await;
    let _ = tokio::fs::remove_dir_all(&scratch).await;
    let entries = result?;

    if entries.is_empty() {
        anyhow::bail!("no faces found in any reference photo");
    }

    FaceGallery::save(&entries, output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    eprintln!("📄 Saved {} embeddings to: {}", entries.len(), output.display());

    Ok(())
}
