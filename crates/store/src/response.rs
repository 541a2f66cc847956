//! Structured success and failure payloads returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModuleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse {
    Success {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Error {
        message: String,
        error: ErrorDetail,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_code: String,
    pub short: String,
    pub details: String,
    pub reason: String,
    pub recommendation: String,
    #[serde(default)]
    pub context: Value,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        ApiResponse::Success {
            message: message.into(),
            data: None,
        }
    }

    pub fn success_with(message: impl Into<String>, data: impl Serialize) -> Self {
        ApiResponse::Success {
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        }
    }

    /// Build the failure payload for `err`.
    ///
    /// `details` is the top-level message, or the whole source chain when
    /// `debug` is set. `reason` is always the innermost cause.
    pub fn from_error(err: &ModuleError, context: Value, debug: bool) -> Self {
        let chain = error_chain(err);
        let reason = chain.last().cloned().unwrap_or_else(|| err.to_string());
        let details = if debug {
            chain.join(": ")
        } else {
            err.to_string()
        };

        ApiResponse::Error {
            message: err.short().to_string(),
            error: ErrorDetail {
                error_code: err.code().to_string(),
                short: err.short().to_string(),
                details,
                reason,
                recommendation: err.recommendation().to_string(),
                context,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }
}

fn error_chain(err: &ModuleError) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut current = std::error::Error::source(err);
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let response = ApiResponse::success_with("installed", json!({"slug": "widgets"}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "installed");
        assert_eq!(value["data"]["slug"], "widgets");

        let bare = serde_json::to_value(ApiResponse::success("ok")).unwrap();
        assert!(bare.get("data").is_none());
    }

    #[test]
    fn error_shape_carries_code_and_hint() {
        let err = ModuleError::AlreadyInstalled {
            slug: "widgets".into(),
            path: "/m/widgets".into(),
        };
        let value =
            serde_json::to_value(ApiResponse::from_error(&err, json!({"slug": "widgets"}), false))
                .unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["error_code"], "MODHOST_INSTALL_03");
        assert_eq!(value["error"]["short"], "Already installed");
        assert_eq!(value["error"]["context"]["slug"], "widgets");
        assert!(!value["error"]["recommendation"].as_str().unwrap().is_empty());
    }

    #[test]
    fn debug_includes_source_chain() {
        let err = ModuleError::DownloadFailed {
            url: "https://x/a.zip".into(),
            reason: "transport".into(),
            source: Some(eyre::eyre!("connection reset")),
        };

        let ApiResponse::Error { error, .. } = ApiResponse::from_error(&err, Value::Null, true)
        else {
            panic!("expected an error payload");
        };
        assert!(error.details.ends_with("connection reset"));
        assert_eq!(error.reason, "connection reset");

        let ApiResponse::Error { error, .. } = ApiResponse::from_error(&err, Value::Null, false)
        else {
            panic!("expected an error payload");
        };
        assert!(!error.details.contains("connection reset"));
    }
}
