//! Precomputed descriptor files, produced by an external extractor.
//!
//! `.json`: an array of numbers. Anything else: raw little-endian `f32` bytes,
//! the same layout the store uses. An empty file or empty array means the
//! extractor found no face.

use std::path::{Path, PathBuf};

use roster_core::{Descriptor, DescriptorError, Extractor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorFileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: invalid JSON descriptor: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Encoding {
        path: PathBuf,
        source: DescriptorError,
    },
}

/// Reads descriptors that were extracted ahead of time.
pub struct PrecomputedExtractor {
    model: String,
}

impl PrecomputedExtractor {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Extractor for PrecomputedExtractor {
    type Input = Path;
    type Error = DescriptorFileError;

    fn extract(&mut self, path: &Path) -> Result<Option<Descriptor>, Self::Error> {
        let bytes = std::fs::read(path).map_err(|source| DescriptorFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let descriptor = if is_json {
            let values: Vec<f32> =
                serde_json::from_slice(&bytes).map_err(|source| DescriptorFileError::Json {
                    path: path.to_path_buf(),
                    source,
                })?;
            Descriptor::new(values)
        } else {
            Descriptor::from_bytes(&bytes).map_err(|source| DescriptorFileError::Encoding {
                path: path.to_path_buf(),
                source,
            })?
        };

        if descriptor.dim() == 0 {
            tracing::debug!(path = %path.display(), "descriptor file is empty: no face");
            return Ok(None);
        }
        Ok(Some(descriptor))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
