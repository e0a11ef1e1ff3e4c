//! The uniform response shape of every operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sharplens_core::{Error, ErrorCode, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// `{success, data, error}`; exactly one of `data` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody::from(error)),
        }
    }

    /// The single translation from handler outcomes to responses
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|data| {
            serde_json::to_value(data)
                .map_err(|e| Error::internal(format!("Failed to serialize result: {}", e)))
        }) {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(&error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|error| error.code)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "success": self.success,
            "data": self.data,
            "error": self.error,
        })
    }
}
