use serde::Serialize;

use super::StructuredRecord;

/// Outcome of an auto-ingest call
///
/// Built only through [`IngestResult::archived`] and
/// [`IngestResult::failed`] so a success always carries both the record and
/// its identifier.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<StructuredRecord>,
    /// Offending model output when the failure came from parsing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl IngestResult {
    pub fn archived(record_id: String, record: StructuredRecord) -> Self {
        Self {
            success: true,
            message: format!("已归档到 [{}] 品类", record.category),
            record_id: Some(record_id),
            record: Some(record),
            raw_response: None,
        }
    }

    pub fn failed(message: impl Into<String>, raw_response: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            record_id: None,
            record: None,
            raw_response,
        }
    }
}
