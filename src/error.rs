//! The closed error taxonomy surfaced on the wire (spec.md §7).

use thiserror::Error;

/// Engine-level error. Carries enough context for a human-readable message;
/// maps onto the wire's integer `OfsErrorCode` via `From`.
#[derive(Debug, Error)]
pub enum OfsError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    FileExists(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("no space left on device")]
    NoSpace,
    #[error("invalid or unknown session")]
    InvalidSession,
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl From<std::io::Error> for OfsError {
    fn from(err: std::io::Error) -> Self {
        OfsError::Io(err.to_string())
    }
}

/// The closed integer enumeration placed in `error_code` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OfsErrorCode {
    Success = 0,
    InvalidConfig = 1,
    IoError = 2,
    NotFound = 3,
    FileExists = 4,
    PermissionDenied = 5,
    InvalidOperation = 6,
    DirectoryNotEmpty = 7,
    NoSpace = 8,
    InvalidSession = 9,
    NotImplemented = 10,
}

impl OfsErrorCode {
    /// Fixed human-readable message for each code, answering the
    /// `get_error_message` wire operation. The original C++ left this as a
    /// hardcoded `"Error"` stub; a real implementation fills it in.
    pub fn message(self) -> &'static str {
        match self {
            OfsErrorCode::Success => "success",
            OfsErrorCode::InvalidConfig => "invalid configuration",
            OfsErrorCode::IoError => "I/O error",
            OfsErrorCode::NotFound => "not found",
            OfsErrorCode::FileExists => "already exists",
            OfsErrorCode::PermissionDenied => "permission denied",
            OfsErrorCode::InvalidOperation => "invalid operation",
            OfsErrorCode::DirectoryNotEmpty => "directory not empty",
            OfsErrorCode::NoSpace => "no space left on device",
            OfsErrorCode::InvalidSession => "invalid session",
            OfsErrorCode::NotImplemented => "not implemented",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => OfsErrorCode::Success,
            1 => OfsErrorCode::InvalidConfig,
            2 => OfsErrorCode::IoError,
            3 => OfsErrorCode::NotFound,
            4 => OfsErrorCode::FileExists,
            5 => OfsErrorCode::PermissionDenied,
            6 => OfsErrorCode::InvalidOperation,
            7 => OfsErrorCode::DirectoryNotEmpty,
            8 => OfsErrorCode::NoSpace,
            9 => OfsErrorCode::InvalidSession,
            10 => OfsErrorCode::NotImplemented,
            _ => return None,
        })
    }
}

impl From<&OfsError> for OfsErrorCode {
    fn from(err: &OfsError) -> Self {
        match err {
            OfsError::InvalidConfig(_) => OfsErrorCode::InvalidConfig,
            OfsError::Io(_) => OfsErrorCode::IoError,
            OfsError::NotFound(_) => OfsErrorCode::NotFound,
            OfsError::FileExists(_) => OfsErrorCode::FileExists,
            OfsError::PermissionDenied => OfsErrorCode::PermissionDenied,
            OfsError::InvalidOperation(_) => OfsErrorCode::InvalidOperation,
            OfsError::DirectoryNotEmpty(_) => OfsErrorCode::DirectoryNotEmpty,
            OfsError::NoSpace => OfsErrorCode::NoSpace,
            OfsError::InvalidSession => OfsErrorCode::InvalidSession,
            OfsError::NotImplemented(_) => OfsErrorCode::NotImplemented,
        }
    }
}

pub type OfsResult<T> = Result<T, OfsError>;
