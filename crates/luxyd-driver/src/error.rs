//! Error types for LUXYD driver operations

use thiserror::Error;

/// Result type alias for LUXYD operations
pub type Result<T> = std::result::Result<T, LuxydError>;

/// Errors that can occur during LUXYD operations
///
/// Every variant maps to a stable negative errno through [`LuxydError::code`],
/// which is what a command-line client reports as its exit status.
#[derive(Debug, Error)]
pub enum LuxydError {
    /// An argument was out of range (dimension, mapping length, configuration)
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: String,
    },

    /// The requested layout does not fit in the memory window
    #[error("Buffer of {required} bytes exceeds window capacity of {capacity} bytes")]
    OutOfCapacity {
        /// Bytes the layout needs (saturated on overflow)
        required: usize,
        /// Window capacity in bytes
        capacity: usize,
    },

    /// `MATRIX_MULTIPLY` was issued before any successful `MATRIX_LOAD`
    #[error("No matrix layout loaded (send MATRIX_LOAD first)")]
    NotLoaded,

    /// The command payload could not be read from or written to
    #[error("Bad payload address: {reason}")]
    BadAddress {
        /// Why marshaling failed
        reason: String,
    },

    /// Unknown command code
    #[error("Unsupported command {code:#010x}")]
    UnsupportedCommand {
        /// The rejected code
        code: u32,
    },

    /// Mapping request runs past the end of the window
    #[error("Mapping [{offset:#x}, +{length:#x}) exceeds window capacity {capacity:#x}")]
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Requested length
        length: usize,
        /// Window capacity
        capacity: usize,
    },

    /// Address translation for a mapping failed
    #[error("Mapping failed: {reason}")]
    MapFailed {
        /// Why translation failed
        reason: String,
    },

    /// Hardware never raised the ready bit
    #[error("Device timeout after {duration_ms}ms waiting for ready")]
    DeviceTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Hardware raised the error bit
    #[error("Device error: status={status:#010x}")]
    DeviceError {
        /// Status word at the time of failure
        status: u32,
    },

    /// Waiting for the control lock was cancelled
    #[error("Interrupted while waiting for the control lock")]
    Interrupted,

    /// The device could not be attached
    #[error("Attach failed: {reason}")]
    Attach {
        /// Reason for failure
        reason: String,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl LuxydError {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a bad address error
    pub fn bad_address(reason: impl Into<String>) -> Self {
        Self::BadAddress {
            reason: reason.into(),
        }
    }

    /// Create a mapping failure
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create an attach failure
    pub fn attach(reason: impl Into<String>) -> Self {
        Self::Attach {
            reason: reason.into(),
        }
    }

    /// Positive errno for this error
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::OutOfBounds { .. } => libc::EINVAL,
            Self::OutOfCapacity { .. } => libc::ENOMEM,
            Self::NotLoaded => libc::ENODATA,
            Self::BadAddress { .. } => libc::EFAULT,
            Self::UnsupportedCommand { .. } => libc::ENOTTY,
            Self::MapFailed { .. } => libc::EAGAIN,
            Self::DeviceTimeout { .. } => libc::ETIMEDOUT,
            Self::DeviceError { .. } => libc::EIO,
            Self::Interrupted => libc::EINTR,
            Self::Attach { .. } => libc::ENODEV,
            Self::Io { source } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Negative error code, as a kernel driver would return it
    pub fn code(&self) -> i32 {
        -self.errno()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_errnos() {
        assert_eq!(LuxydError::NotLoaded.code(), -libc::ENODATA);
        assert_eq!(
            LuxydError::UnsupportedCommand { code: 0 }.code(),
            -libc::ENOTTY
        );
        assert_eq!(LuxydError::Interrupted.code(), -libc::EINTR);
    }

    #[test]
    fn io_errors_keep_os_errno() {
        let err = LuxydError::from(std::io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.errno(), libc::EACCES);
    }
}
