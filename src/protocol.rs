//! Wire envelope types (spec.md §4.8/§6).
//!
//! One `WireRequest` is parsed per connection; the server always answers
//! with exactly one `WireResponse`, serialized with `serde_json` and
//! terminated by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OfsError, OfsErrorCode};

#[derive(Debug, Clone, Deserialize)]
pub struct WireRequest {
    pub operation: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireResponse {
    pub operation: String,
    pub request_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WireResponse {
    pub fn success(operation: &str, request_id: &str, data: Option<Value>) -> Self {
        WireResponse {
            operation: operation.to_string(),
            request_id: request_id.to_string(),
            status: "success",
            error_code: None,
            error_message: None,
            data,
        }
    }

    pub fn from_error(operation: &str, request_id: &str, err: &OfsError) -> Self {
        let code = OfsErrorCode::from(err);
        WireResponse {
            operation: operation.to_string(),
            request_id: request_id.to_string(),
            status: "error",
            error_code: Some(code as i32),
            error_message: Some(err.to_string()),
            data: None,
        }
    }

    /// Used for malformed JSON and unknown-exception fallbacks, which have
    /// no well-formed `OfsError` to report (spec.md §7).
    pub fn plain_error(operation: &str, request_id: &str, message: &str) -> Self {
        WireResponse {
            operation: operation.to_string(),
            request_id: request_id.to_string(),
            status: "error",
            error_code: None,
            error_message: Some(message.to_string()),
            data: None,
        }
    }
}

/// `"admin"` / `"normal"` as they appear on the wire (spec.md §6).
pub fn role_str(is_admin: bool) -> &'static str {
    if is_admin {
        "admin"
    } else {
        "normal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_default_parameters() {
        let text = r#"{"operation":"get_stats","session_id":"s","request_id":"1"}"#;
        let req: WireRequest = serde_json::from_str(text).unwrap();
        assert_eq!(req.operation, "get_stats");
        assert!(req.parameters.is_null());
    }

    #[test]
    fn success_response_omits_error_fields() {
        let resp = WireResponse::success("get_stats", "1", None);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error_code"));
    }
}
