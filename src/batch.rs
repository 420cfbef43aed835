use crate::analysis::{AnalysisResult, AnalysisService};
use crate::error::OrchestratorError;
use crate::media::VideoFile;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        accepted: usize,
        rejected: usize,
    },
    Rejected {
        name: String,
        reason: String,
    },
    Analyzing {
        position: usize,
        total: usize,
        name: String,
        size_mb: f64,
    },
    Succeeded {
        position: usize,
        name: String,
        analysis_id: String,
    },
    Failed {
        position: usize,
        name: String,
        message: String,
    },
    Completed {
        succeeded: usize,
        failed: usize,
        rejected: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Successful results in input order.
    pub results: Vec<AnalysisResult>,
    pub rejected: Vec<OrchestratorError>,
    pub failures: Vec<OrchestratorError>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }
}

/// Drains a file queue against the analysis service, one request at a time.
pub struct BatchOrchestrator {
    service: Arc<dyn AnalysisService>,
    request_timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(service: Arc<dyn AnalysisService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    /// Splits out files that fail the format check, then analyzes the rest in
    /// input order. A failed file is reported and skipped; it never stops the
    /// batch. `known_ids` are ids already in history; a response reusing one of
    /// them, or an id seen earlier in this batch, counts as a failed file.
    pub async fn run(
        &self,
        files: Vec<VideoFile>,
        mut known_ids: HashSet<String>,
        notify: impl Fn(BatchEvent),
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut accepted = Vec::with_capacity(files.len());

        for file in files {
            match file.validate() {
                Ok(()) => accepted.push(file),
                Err(err) => {
                    log::warn!("rejected {}: {err}", file.name);
                    if let OrchestratorError::InvalidInput { name, reason } = &err {
                        notify(BatchEvent::Rejected {
                            name: name.clone(),
                            reason: reason.clone(),
                        });
                    }
                    report.rejected.push(err);
                }
            }
        }

        let total = accepted.len();
        notify(BatchEvent::Started {
            accepted: total,
            rejected: report.rejected.len(),
        });

        for (offset, file) in accepted.iter().enumerate() {
            let position = offset + 1;
            notify(BatchEvent::Analyzing {
                position,
                total,
                name: file.name.clone(),
                size_mb: file.size_mb(),
            });
            log::info!("analyzing {} ({position}/{total})", file.name);

            let outcome = self.analyze_one(file).await.and_then(|result| {
                if known_ids.insert(result.id.clone()) {
                    Ok(result)
                } else {
                    Err(OrchestratorError::AnalysisRequestFailed {
                        name: file.name.clone(),
                        message: format!("service returned duplicate analysis id {}", result.id),
                    })
                }
            });

            match outcome {
                Ok(result) => {
                    notify(BatchEvent::Succeeded {
                        position,
                        name: file.name.clone(),
                        analysis_id: result.id.clone(),
                    });
                    report.results.push(result);
                }
                Err(err) => {
                    log::warn!("{err}");
                    if let OrchestratorError::AnalysisRequestFailed { name, message } = &err {
                        notify(BatchEvent::Failed {
                            position,
                            name: name.clone(),
                            message: message.clone(),
                        });
                    }
                    report.failures.push(err);
                }
            }
        }

        notify(BatchEvent::Completed {
            succeeded: report.results.len(),
            failed: report.failures.len(),
            rejected: report.rejected.len(),
        });
        report
    }

    async fn analyze_one(&self, file: &VideoFile) -> Result<AnalysisResult, OrchestratorError> {
        let failed = |message: String| OrchestratorError::AnalysisRequestFailed {
            name: file.name.clone(),
            message,
        };

        let response = timeout(self.request_timeout, self.service.analyze(file))
            .await
            .map_err(|_| {
                failed(format!(
                    "no response after {}",
                    humantime::format_duration(self.request_timeout)
                ))
            })?
            .map_err(|err| failed(format!("{err:#}")))?;

        Ok(AnalysisResult::from_response(&file.name, response))
    }
}
