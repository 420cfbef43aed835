use crate::analysis::AnalysisResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Printable markdown copy of one result, for editing without guidance.
#[derive(Debug, Clone)]
pub struct ResultReport {
    path: PathBuf,
}

impl ResultReport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, result: &AnalysisResult, exported_at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create report parent directory {}",
                    parent.display()
                )
            })?;
        }

        let mut file = File::create(&self.path)
            .with_context(|| format!("failed to create report {}", self.path.display()))?;

        writeln!(file, "# Analysis Results: {}", result.source_name)?;
        writeln!(file)?;
        writeln!(
            file,
            "- Analysis: {} at {}",
            result.id, result.created_at
        )?;
        writeln!(file, "- Exported: {}", exported_at.to_rfc3339())?;
        writeln!(file, "- Language: {}", result.detected_language)?;
        writeln!(file, "- Duration: {}", result.duration_label())?;
        writeln!(file, "- Highlights: {}", result.summary.total_highlights)?;
        writeln!(file, "- Silences: {}", result.summary.total_silences)?;
        writeln!(file)?;
        writeln!(file, "## Editing Suggestions")?;
        writeln!(file)?;

        if result.suggestions.is_empty() {
            writeln!(file, "No edits suggested.")?;
        }
        for suggestion in &result.suggestions {
            writeln!(
                file,
                "- **{}** {} ({}% confidence): {}",
                suggestion.kind(),
                suggestion.span_label(),
                suggestion.confidence_percent(),
                suggestion.reason().replace('\n', " ")
            )?;
        }
        Ok(())
    }
}
