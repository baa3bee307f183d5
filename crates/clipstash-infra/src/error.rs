//! Structured error reports
//!
//! [`ErrorReport`] is the serialisable view of an [`AppError`] built from its
//! [`ErrorMetadata`]. Sensitive details are withheld in production.

use clipstash_core::{AppError, ErrorMetadata};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorReport {
    pub fn from_app_error(err: &AppError, is_production: bool) -> Self {
        let details = if is_production && err.is_sensitive() {
            None
        } else {
            Some(err.detailed_message())
        };

        Self {
            error: err.client_message(),
            code: err.error_code(),
            status: err.http_status_code(),
            recoverable: err.is_recoverable(),
            storage_kind: err.storage_kind().map(|k| k.as_str().to_string()),
            suggested_action: err.suggested_action(),
            details,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", self.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipstash_core::StorageErrorKind;

    #[test]
    fn test_storage_report_hides_details_in_production() {
        let err = AppError::Storage {
            kind: StorageErrorKind::NotMounted,
            message: "/srv/media/videos does not exist".to_string(),
        };

        let report = ErrorReport::from_app_error(&err, true);
        assert_eq!(report.code, "STORAGE_UNAVAILABLE");
        assert_eq!(report.storage_kind.as_deref(), Some("not_mounted"));
        assert!(report.details.is_none());
        assert!(!report.to_json().contains("/srv/media"));

        let report = ErrorReport::from_app_error(&err, false);
        assert!(report.details.unwrap().contains("/srv/media/videos"));
    }

    #[test]
    fn test_validation_report() {
        let err = AppError::Validation("Unsupported content type".to_string());
        let report = ErrorReport::from_app_error(&err, true);
        assert_eq!(report.status, 400);
        assert_eq!(report.error, "Unsupported content type");
        assert!(report.details.is_some());
        assert!(report.to_json().contains("VALIDATION_ERROR"));
    }
}
