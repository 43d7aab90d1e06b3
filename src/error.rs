//! Error types for media-dl
//!
//! This module provides the error taxonomy for the library:
//! - Transfer errors (HTTP status, connection, truncated bodies)
//! - Storage errors (directory creation, writes, invalid file names)
//! - Scheduling errors (duplicate in-flight URLs, shutdown)
//! - Post-processing errors (conversion, transcription, missing tools)
//! - HTTP status code mapping and structured error bodies for the API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::TaskStatus;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "library_dir")
        key: Option<String>,
    },

    /// Network or HTTP failure while fetching a resource
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Failure writing to local storage
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Queue request could not be accepted
    #[error("scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Post-processing (conversion, transcription) failed
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// Path supplied by a caller is outside the library or malformed
    #[error("invalid path {}: {reason}", .path.display())]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// External tool execution failed (ffmpeg, ffprobe, transcriber)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Network and protocol level failures
#[derive(Debug, Error)]
pub enum TransferError {
    /// URL could not be parsed or has no usable host
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as submitted
        url: String,
        /// Parser message
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Numeric HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Connection, DNS, TLS or body-read failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Stream ended before the advertised content-length was received
    #[error("connection closed after {received} of {expected} bytes")]
    Incomplete {
        /// Content-length announced by the server
        expected: u64,
        /// Bytes actually written
        received: u64,
    },

    /// Transfer was cancelled between chunks
    #[error("transfer cancelled")]
    Cancelled,
}

/// Local filesystem failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Destination directory could not be created
    #[error("cannot create directory {}: {}", .path.display(), describe_io(.source))]
    CreateDir {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Destination file could not be opened or written
    #[error("cannot write {}: {}", .path.display(), describe_io(.source))]
    Write {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Existence of a path could not be determined
    #[error("cannot inspect {}: {}", .path.display(), describe_io(.source))]
    Inspect {
        /// Path being checked
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Sanitizing the name left nothing usable
    #[error("no usable file name could be derived from '{name}'")]
    InvalidFileName {
        /// Raw name before sanitizing
        name: String,
    },
}

/// Reasons a queue request is refused
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The URL already has a queued or running task
    #[error("download already in progress for {url} (status: {status})")]
    AlreadyActive {
        /// Source URL
        url: String,
        /// Current status of the existing task
        status: TaskStatus,
    },

    /// Target file is already present in the destination directory
    #[error("file '{}' already exists at the chosen location", .path.display())]
    FileExists {
        /// Expected output path
        path: PathBuf,
    },

    /// Downloader is shutting down
    #[error("not accepting new downloads during shutdown")]
    ShuttingDown,
}

/// Post-processing failures
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Container conversion failed
    #[error("conversion failed for {}: {reason}", .path.display())]
    ConversionFailed {
        /// Input file
        path: PathBuf,
        /// Tool output or reason
        reason: String,
    },

    /// Transcription failed
    #[error("transcription failed for {}: {reason}", .path.display())]
    TranscriptionFailed {
        /// Input file
        path: PathBuf,
        /// Tool output or reason
        reason: String,
    },

    /// Required external binary is not installed
    #[error("{tool} not found; install it or configure its path")]
    ToolMissing {
        /// Binary name
        tool: String,
    },

    /// The job was replaced or the downloader shut down mid-step
    #[error("post-processing cancelled")]
    Cancelled,
}

/// Human-readable I/O cause, calling out disk-full and permission problems.
fn describe_io(err: &std::io::Error) -> String {
    // ENOSPC on Linux and macOS
    const ENOSPC: i32 = 28;

    if err.kind() == std::io::ErrorKind::PermissionDenied {
        format!("permission denied ({err})")
    } else if err.raw_os_error() == Some(ENOSPC) {
        format!("disk full ({err})")
    } else {
        err.to_string()
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "already_active",
///     "message": "download already in progress for https://...",
///     "details": { "url": "https://..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "already_active", "invalid_path")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidPath { .. } => 403,

            Error::Scheduling(SchedulingError::AlreadyActive { .. }) => 409,
            Error::Scheduling(SchedulingError::FileExists { .. }) => 409,
            Error::Scheduling(SchedulingError::ShuttingDown) => 503,

            Error::PostProcess(_) => 422,
            Error::Storage(StorageError::InvalidFileName { .. }) => 422,

            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            Error::Transfer(TransferError::InvalidUrl { .. }) => 400,
            Error::Transfer(_) => 502,

            Error::ExternalTool(_) => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transfer(e) => match e {
                TransferError::InvalidUrl { .. } => "invalid_url",
                TransferError::HttpStatus { .. } => "http_status",
                TransferError::Request(_) => "network_error",
                TransferError::Incomplete { .. } => "incomplete_transfer",
                TransferError::Cancelled => "cancelled",
            },
            Error::Storage(e) => match e {
                StorageError::CreateDir { .. } => "create_dir_failed",
                StorageError::Write { .. } => "write_failed",
                StorageError::Inspect { .. } => "inspect_failed",
                StorageError::InvalidFileName { .. } => "invalid_file_name",
            },
            Error::Scheduling(e) => match e {
                SchedulingError::AlreadyActive { .. } => "already_active",
                SchedulingError::FileExists { .. } => "file_exists",
                SchedulingError::ShuttingDown => "shutting_down",
            },
            Error::PostProcess(e) => match e {
                PostProcessError::ConversionFailed { .. } => "conversion_failed",
                PostProcessError::TranscriptionFailed { .. } => "transcription_failed",
                PostProcessError::ToolMissing { .. } => "tool_missing",
                PostProcessError::Cancelled => "cancelled",
            },
            Error::InvalidPath { .. } => "invalid_path",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Scheduling(SchedulingError::AlreadyActive { url, status }) => {
                Some(serde_json::json!({
                    "url": url,
                    "status": status,
                }))
            }
            Error::Scheduling(SchedulingError::FileExists { path }) => Some(serde_json::json!({
                "path": path,
            })),
            Error::Transfer(TransferError::HttpStatus { status, url }) => {
                Some(serde_json::json!({
                    "status": status,
                    "url": url,
                }))
            }
            Error::InvalidPath { path, .. } => Some(serde_json::json!({
                "path": path,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
