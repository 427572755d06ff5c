use serde::Serialize;

use crate::types::ProcessingResult;

/// JSON body returned by a service wrapping the processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResponse {
    pub result: bool,
    pub is_background_removed: bool,
    pub is_image_wrapped: bool,
    pub error_message: String,
    /// Seconds.
    pub duration: f64,
    /// Base64 encoded image, empty on failure.
    pub processed_image: String,
}

impl ProcessingResponse {
    /// A successful run has both separated the document from its background and rectified it.
    pub fn from_result(result: &ProcessingResult<String>) -> Self {
        Self {
            result: result.success,
            is_background_removed: result.success,
            is_image_wrapped: result.success,
            error_message: result.error_message.clone(),
            duration: result.duration_secs(),
            processed_image: result.image.clone().unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PerspectraError;
    use crate::types::Stage;
    use std::time::Duration;

    #[test]
    fn test_success_response_fields() {
        let result =
            ProcessingResult::succeeded("aGVsbG8=".to_string(), Stage::Encoded, Duration::from_millis(250));
        let json: serde_json::Value =
            serde_json::from_str(&ProcessingResponse::from_result(&result).to_json().unwrap())
                .unwrap();
        assert_eq!(json["result"], true);
        assert_eq!(json["is_background_removed"], true);
        assert_eq!(json["is_image_wrapped"], true);
        assert_eq!(json["error_message"], "");
        assert_eq!(json["duration"], 0.25);
        assert_eq!(json["processed_image"], "aGVsbG8=");
    }

    #[test]
    fn test_failure_response_has_no_image() {
        let err = PerspectraError::NoContourFound { min_area: 1.0 };
        let result: ProcessingResult<String> =
            ProcessingResult::failed(&err, Stage::Segmented, Duration::from_millis(2));
        let response = ProcessingResponse::from_result(&result);
        assert!(!response.result);
        assert!(!response.is_image_wrapped);
        assert!(response.processed_image.is_empty());
        assert!(response.error_message.contains("No contour found"));
    }
}
