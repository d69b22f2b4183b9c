use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use super::error::{ModelError, ModelResult};
use super::features::FeatureSchema;
use super::model::SolarModel;

/// Bumped whenever the serialized layout of `SolarModel` changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    model: &'a SolarModel,
}

#[derive(Deserialize)]
struct ArtifactHeader {
    format_version: u32,
}

#[derive(Deserialize)]
struct Artifact {
    model: SolarModel,
}

/// Single-file model artifact shared by the trainer and the dashboard
pub struct ModelArtifact {
    path: PathBuf,
}

impl ModelArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the model to a temp file in the target directory and rename it into place.
    /// The temp file is removed if any step fails.
    pub fn save(&self, model: &SolarModel) -> ModelResult<()> {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| ModelError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ModelError::io(dir, e))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(
                &mut writer,
                &ArtifactRef {
                    format_version: FORMAT_VERSION,
                    model,
                },
            )?;
            writer.flush().map_err(|e| ModelError::io(&tmp_path, e))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| ModelError::io(&self.path, e.error))?;

        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        info!(
            "Saved model ({} trees, {:.1} MB) to {}",
            model.forest().n_trees(),
            size as f64 / 1_048_576.0,
            self.path.display()
        );
        Ok(())
    }

    /// Read and validate the artifact against the compiled feature schema.
    pub fn load(&self) -> ModelResult<SolarModel> {
        let bytes = fs::read(&self.path).map_err(|e| ModelError::io(&self.path, e))?;

        let header: ArtifactHeader = serde_json::from_slice(&bytes)?;
        if header.format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedFormat {
                found: header.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let artifact: Artifact = serde_json::from_slice(&bytes)?;
        FeatureSchema::current().verify(&artifact.model.schema)?;
        artifact.model.validate()?;

        info!(
            "Loaded model trained at {} ({} trees) from {}",
            artifact.model.trained_at.format("%Y-%m-%d %H:%M:%S UTC"),
            artifact.model.forest().n_trees(),
            self.path.display()
        );
        Ok(artifact.model)
    }
}
