//! Render jobs: the unit of work handed to the dispatch router.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Display name used when a submission does not carry one.
pub const DEFAULT_FILENAME: &str = "document.pdf";

/// One request to turn a document into a PDF.
///
/// The `id` exists for log correlation only and never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    id: Uuid,
    document: String,
    filename: String,
}

impl RenderJob {
    /// Build a job, rejecting an empty or whitespace-only document.
    pub fn new(document: impl Into<String>, filename: Option<String>) -> Result<Self, DomainError> {
        let document = document.into();
        if document.trim().is_empty() {
            return Err(DomainError::validation("HTML content is required"));
        }

        let filename = filename
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        Ok(Self {
            id: Uuid::new_v4(),
            document,
            filename,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Wire representation sent to peer renderers.
    pub fn payload(&self) -> JobPayload<'_> {
        JobPayload {
            document: &self.document,
            filename: &self.filename,
        }
    }
}

/// JSON body exchanged with peers: `{ "document": ..., "filename": ... }`.
#[derive(Debug, Serialize)]
pub struct JobPayload<'a> {
    pub document: &'a str,
    pub filename: &'a str,
}

/// Structured envelope accepted from clients.
///
/// Older clients send the markup under `html`; both spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobEnvelope {
    #[serde(alias = "html")]
    pub document: Option<String>,
    pub filename: Option<String>,
}

/// Inbound job description before validation.
#[derive(Debug, Clone)]
pub enum JobSubmission {
    /// Raw markup body, with an optional out-of-band filename.
    Text {
        document: String,
        filename: Option<String>,
    },
    Envelope(JobEnvelope),
}

impl TryFrom<JobSubmission> for RenderJob {
    type Error = DomainError;

    fn try_from(submission: JobSubmission) -> Result<Self, Self::Error> {
        match submission {
            JobSubmission::Text { document, filename } => RenderJob::new(document, filename),
            JobSubmission::Envelope(envelope) => {
                let document = envelope
                    .document
                    .ok_or_else(|| DomainError::validation("HTML content is required"))?;
                RenderJob::new(document, envelope.filename)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_defaults_when_absent_or_blank() {
        let job = RenderJob::new("<p>x</p>", None).expect("job");
        assert_eq!(job.filename(), DEFAULT_FILENAME);

        let job = RenderJob::new("<p>x</p>", Some("   ".into())).expect("job");
        assert_eq!(job.filename(), DEFAULT_FILENAME);
    }

    #[test]
    fn blank_document_is_rejected() {
        let err = RenderJob::new(" \n ", None).expect_err("blank document");
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn envelope_accepts_legacy_html_key() {
        let envelope: JobEnvelope =
            serde_json::from_str(r#"{"html":"<h1>Hi</h1>","filename":"a.pdf"}"#).expect("json");
        let job = RenderJob::try_from(JobSubmission::Envelope(envelope)).expect("job");
        assert_eq!(job.document(), "<h1>Hi</h1>");
        assert_eq!(job.filename(), "a.pdf");
    }

    #[test]
    fn envelope_without_document_is_rejected() {
        let envelope: JobEnvelope = serde_json::from_str(r#"{"filename":"a.pdf"}"#).expect("json");
        let err = RenderJob::try_from(JobSubmission::Envelope(envelope)).expect_err("missing");
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn payload_serializes_document_and_filename() {
        let job = RenderJob::new("<p>x</p>", Some("r.pdf".into())).expect("job");
        let value = serde_json::to_value(job.payload()).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({ "document": "<p>x</p>", "filename": "r.pdf" })
        );
    }
}
