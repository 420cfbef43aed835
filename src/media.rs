use crate::error::OrchestratorError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const SUPPORTED_MIME: &str = "video/mp4";
pub const SUPPORTED_EXTENSION: &str = "mp4";

/// A file the user picked. The orchestrator only looks at its metadata; the
/// bytes are read when the upload is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub name: String,
    pub declared_type: Option<String>,
    pub size_bytes: u64,
}

impl VideoFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed to read metadata for {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            declared_type: None,
            size_bytes: metadata.len(),
        })
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    pub fn size_mb(&self) -> f64 {
        const MB: f64 = 1024.0 * 1024.0;
        self.size_bytes as f64 / MB
    }

    /// Either the declared content type or the extension has to mark the file
    /// as MP4.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let declared_ok = self
            .declared_type
            .as_deref()
            .is_some_and(|mime| mime.eq_ignore_ascii_case(SUPPORTED_MIME));
        let extension_ok = Path::new(&self.name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SUPPORTED_EXTENSION));

        if declared_ok || extension_ok {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidInput {
                name: self.name.clone(),
                reason: "Please upload a valid MP4 video.".to_string(),
            })
        }
    }
}
