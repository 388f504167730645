//! Artifact hashing utility for Thyrocase model directories.
//!
//! Writes `manifest.json` binding `model.json` (and `scaler.json` when
//! present) by SHA-256, so the service can verify artifacts at load time.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin hash_artifacts -- <model_dir>
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use thyrocase::adapters::json_model::{ArtifactManifest, MANIFEST_FILE};

fn usage() -> String {
    "Usage: hash_artifacts <model_dir>".to_string()
}

fn parse_args() -> Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    let model_dir = match (args.next(), args.next()) {
        (Some(arg), None) if arg != "-h" && arg != "--help" => PathBuf::from(arg),
        _ => bail!(usage()),
    };

    // Accept a path to model.json as well as its directory.
    if model_dir.is_file() {
        return model_dir
            .parent()
            .map(PathBuf::from)
            .context("Model path has no parent directory");
    }
    Ok(model_dir)
}

fn main() -> Result<()> {
    let model_dir = parse_args()?;

    let manifest = ArtifactManifest::generate(&model_dir)?;
    let bytes = serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = model_dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, bytes)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    println!("Wrote manifest: {}", manifest_path.display());
    for (name, hash) in &manifest.files {
        println!("  {name} sha256={hash}");
    }
    Ok(())
}
