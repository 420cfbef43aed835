use crate::media::{SUPPORTED_MIME, VideoFile};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Raw `POST /analyze` body.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis_id: String,
    pub timestamp: String,
    pub summary: Value,
    #[serde(default)]
    pub suggestions: Vec<RawSuggestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSuggestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SummaryFields {
    #[serde(default)]
    detected_language: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    total_highlights: u64,
    #[serde(default)]
    total_silences: u64,
    #[serde(default)]
    total_suggestions: u64,
}

fn summary_fields(raw: &Value) -> SummaryFields {
    SummaryFields::deserialize(raw).unwrap_or_default()
}

/// The service summary, kept verbatim for chat requests. Only the counts are
/// read out for display.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    raw: Value,
    pub total_highlights: u64,
    pub total_silences: u64,
    pub total_suggestions: u64,
}

impl AnalysisSummary {
    pub fn from_raw(raw: Value) -> Self {
        let fields = summary_fields(&raw);
        Self {
            raw,
            total_highlights: fields.total_highlights,
            total_silences: fields.total_silences,
            total_suggestions: fields.total_suggestions,
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionKind {
    Highlight,
    Cut,
    Transition,
    Other(String),
}

impl SuggestionKind {
    pub fn parse(raw: &str) -> Self {
        let label = capitalize(raw.trim());
        match label.as_str() {
            "Highlight" => SuggestionKind::Highlight,
            "Cut" => SuggestionKind::Cut,
            "Transition" => SuggestionKind::Transition,
            _ => SuggestionKind::Other(label),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SuggestionKind::Highlight => "Highlight",
            SuggestionKind::Cut => "Cut",
            SuggestionKind::Transition => "Transition",
            SuggestionKind::Other(label) => label,
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    kind: SuggestionKind,
    start_seconds: f64,
    end_seconds: f64,
    reason: String,
    confidence_percent: u8,
}

impl Suggestion {
    pub fn from_raw(raw: &RawSuggestion) -> Self {
        let start = raw.start.min(raw.end);
        let end = raw.start.max(raw.end);
        Self {
            kind: SuggestionKind::parse(&raw.kind),
            start_seconds: start,
            end_seconds: end,
            reason: raw.reason.clone(),
            confidence_percent: confidence_percent(raw.confidence),
        }
    }

    pub fn kind(&self) -> &SuggestionKind {
        &self.kind
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_seconds
    }

    pub fn end_seconds(&self) -> f64 {
        self.end_seconds
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn confidence_percent(&self) -> u8 {
        self.confidence_percent
    }

    /// `start - end` with one decimal, the way the results list shows it.
    pub fn span_label(&self) -> String {
        format!("{:.1} - {:.1}", self.start_seconds, self.end_seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub id: String,
    pub source_name: String,
    pub created_at: String,
    pub detected_language: String,
    pub duration_seconds: f64,
    pub summary: AnalysisSummary,
    pub suggestions: Vec<Suggestion>,
}

impl AnalysisResult {
    pub fn from_response(source_name: &str, response: AnalyzeResponse) -> Self {
        let fields = summary_fields(&response.summary);
        let suggestions = response.suggestions.iter().map(Suggestion::from_raw).collect();

        Self {
            id: response.analysis_id,
            source_name: source_name.to_string(),
            created_at: response.timestamp,
            detected_language: fields.detected_language,
            duration_seconds: fields.duration,
            summary: AnalysisSummary::from_raw(response.summary),
            suggestions,
        }
    }

    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// Rounds a `[0, 1]` fraction to an integer percent. Out-of-range input is
/// clamped first.
pub fn confidence_percent(fraction: f64) -> u8 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, file: &VideoFile) -> Result<AnalyzeResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpAnalysisService {
    client: Client,
    base_url: String,
}

impl HttpAnalysisService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build analysis HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, file: &VideoFile) -> Result<AnalyzeResponse> {
        let form = Form::new().part("video", video_part(file).await?);

        let response = self
            .client
            .post(endpoint(&self.base_url, "analyze"))
            .multipart(form)
            .send()
            .await
            .context("failed to call analysis service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("analysis service error {status}: {body}");
        }

        response
            .json()
            .await
            .context("failed to decode analysis response JSON")
    }
}

/// Streams the file from disk instead of loading it whole.
async fn video_part(file: &VideoFile) -> Result<Part> {
    let handle = tokio::fs::File::open(&file.path)
        .await
        .with_context(|| format!("failed to open video {}", file.path.display()))?;
    let length = handle
        .metadata()
        .await
        .with_context(|| format!("failed to read metadata for {}", file.path.display()))?
        .len();

    Part::stream_with_length(Body::wrap_stream(ReaderStream::new(handle)), length)
        .file_name(file.name.clone())
        .mime_str(SUPPORTED_MIME)
        .context("invalid upload content type")
}

/// `GET /` on the service; returns its greeting message.
pub async fn fetch_greeting(base_url: &str, timeout: Duration) -> Result<String> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    let response = client
        .get(endpoint(base_url, ""))
        .send()
        .await
        .with_context(|| format!("failed to reach {base_url}"))?;

    if !response.status().is_success() {
        bail!("service returned {}", response.status());
    }

    let json: Value = response
        .json()
        .await
        .context("failed to decode greeting JSON")?;
    Ok(json
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("service is up")
        .to_string())
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
