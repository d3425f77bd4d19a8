//! API request and response types for the HTTP layer.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /launch/fire` and `POST /launch/load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TubeIdsRequest {
    /// Tube ids, fired together.
    #[serde(rename = "tubeIds")]
    pub tube_ids: Vec<u32>,
}

// ============================================================================
// Response Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Command result response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Human-readable outcome
    pub result: String,
    /// Tubes fired, for launch commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tubes: Option<Vec<u32>>,
}

impl CommandResponse {
    /// A completed command
    pub fn done(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            tubes: None,
        }
    }

    /// A completed launch
    pub fn fired(result: impl Into<String>, tubes: Vec<u32>) -> Self {
        Self {
            result: result.into(),
            tubes: Some(tubes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tube_ids_request_uses_camel_case() {
        let req: TubeIdsRequest = serde_json::from_str(r#"{"tubeIds": [3, 5, 9]}"#).unwrap();
        assert_eq!(req.tube_ids, vec![3, 5, 9]);
        assert!(serde_json::from_str::<TubeIdsRequest>(r#"{"tube_ids": [1]}"#).is_err());
    }

    #[test]
    fn api_response_ok() {
        let response = ApiResponse::ok(CommandResponse::done("System armed"));
        assert!(response.success);
        assert_eq!(response.error, None);
        assert_eq!(response.data.unwrap().result, "System armed");
    }

    #[test]
    fn api_response_err() {
        let response: ApiResponse<()> = ApiResponse::err("System is not armed!");
        assert!(!response.success);
        assert_eq!(response.data, None);
        assert_eq!(response.error.as_deref(), Some("System is not armed!"));
    }

    #[test]
    fn api_response_skip_serializing_none() {
        let json = serde_json::to_string(&ApiResponse::ok(CommandResponse::done("ok"))).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("tubes"));

        let json = serde_json::to_string(&ApiResponse::<()>::err("nope")).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn fired_response_lists_tubes() {
        let json = serde_json::to_value(CommandResponse::fired("launched", vec![1, 2])).unwrap();
        assert_eq!(json["tubes"], serde_json::json!([1, 2]));
    }

    #[test]
    fn motion_state_serializes_as_four_booleans() {
        let json = serde_json::to_value(crate::MotionSnapshot {
            up: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"up": true, "down": false, "cw": false, "ccw": false})
        );
    }
}
