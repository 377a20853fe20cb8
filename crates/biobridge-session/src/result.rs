use serde::Serialize;

use biobridge_core::{Error, ErrorKind};

/// Error half of an [`OperationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for OperationError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<Error> for OperationError {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

/// Outcome of a session operation as reported to the boundary layer.
///
/// Serializes to `{"success": true, "data": ...}` or
/// `{"success": false, "error": {"kind": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<OperationError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    ///
    /// # Errors
    /// Returns the operation error when the operation failed.
    pub fn into_result(self) -> Result<T, OperationError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(OperationError {
                kind: ErrorKind::Protocol,
                message: "operation returned no data".to_string(),
            }),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl<T> From<Result<T, Error>> for OperationResult<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failed(error),
        }
    }
}
