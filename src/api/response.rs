//! Tool call responses

use serde::Serialize;
use serde_json::Value;

use crate::error::LedgerError;

/// Machine-readable error of a failed call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

/// `{"ok": true, "version": n, "data": ...}` or `{"ok": false, "error": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    /// Logical version of the user's book the data reflects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn success(version: u64, data: Value) -> Self {
        Self {
            ok: true,
            version: Some(version),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            version: None,
            data: None,
            error: Some(ToolError {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    /// Error kind, `None` on success
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }

    /// Serialize for output; falls back to a fixed error document
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"ok":false,"error":{{"kind":"json","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

impl From<LedgerError> for ToolResponse {
    fn from(err: LedgerError) -> Self {
        Self::failure(err.kind(), err.to_string())
    }
}
