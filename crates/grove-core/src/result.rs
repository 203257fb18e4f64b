//! Non-throwing result wrapper for callers that cannot propagate errors

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// `{ success: true, data }` or `{ success: false, message }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> SafeResult<T> {
    pub fn ok(data: T) -> Self {
        SafeResult {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        SafeResult {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self.message.unwrap_or_else(|| "unknown failure".to_string())),
        }
    }
}

impl<T> From<Result<T, GraphError>> for SafeResult<T> {
    fn from(result: Result<T, GraphError>) -> Self {
        match result {
            Ok(data) => SafeResult::ok(data),
            Err(err) => SafeResult::failure(err.to_string()),
        }
    }
}
