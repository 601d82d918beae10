use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    #[error("Bluetooth error [{operation}]: {reason}")]
    Bluetooth { operation: String, reason: String },

    #[error("Channel error [{channel}]: {reason} (code: {error_code})")]
    Channel {
        channel: String,
        reason: String,
        error_code: String,
    },

    #[error("Invalid report layout: {0}")]
    InvalidLayout(String),

    #[error("Value {value} of {item} does not fit a 4-byte descriptor item")]
    EncodingRange { item: &'static str, value: i64 },

    #[error("Invalid SDP attribute: {0}")]
    InvalidAttribute(String),

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a failed daemon/adapter operation
    pub fn bluetooth(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Bluetooth {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Convert a socket I/O error on a report channel, keeping a short errno code
    pub fn channel_io(channel: &str, operation: &str, e: std::io::Error) -> Self {
        let error_code = match e.raw_os_error() {
            Some(libc::EPIPE) => "epipe",
            Some(libc::ECONNRESET) => "econnreset",
            Some(libc::ENOTCONN) => "enotconn",
            Some(libc::ETIMEDOUT) => "etimedout",
            Some(libc::EHOSTDOWN) => "ehostdown",
            Some(libc::EAGAIN) => "eagain",
            Some(libc::EADDRINUSE) => "eaddrinuse",
            Some(libc::EACCES) => "eacces",
            _ => "io_error",
        };

        Self::Channel {
            channel: channel.to_string(),
            reason: format!("{}: {}", operation, e),
            error_code: error_code.to_string(),
        }
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
