//! Error types for the binding core.

use thiserror::Error;

use crate::ports::TransportError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by [`crate::Connection`] operations.
///
/// Every variant names the address or path involved and, for transport
/// failures, keeps the transport's message and code as its source.
#[derive(Debug, Error)]
pub enum Error {
    /// Mounting the address failed.
    #[error("could not open ixp connection to {address}: {source}")]
    Connect {
        /// Address passed to `connect`.
        address: String,
        /// Transport failure.
        source: TransportError,
    },

    /// Opening a file failed.
    #[error("could not open p9 file {path}: {source}")]
    Open {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },

    /// A read returned an error.
    #[error("failed to read from p9 file {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },

    /// A write returned an error.
    #[error("failed to write to p9 file {path}: {source}")]
    Write {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },

    /// A buffer could not be allocated.
    #[error("could not allocate {size} bytes for {path}")]
    Alloc {
        /// File path the buffer was for.
        path: String,
        /// Requested size.
        size: usize,
    },

    /// The transport broke its contract or returned undecodable data.
    #[error("protocol violation on {path}: {detail}")]
    Protocol {
        /// File path.
        path: String,
        /// What went wrong.
        detail: String,
    },

    /// Creating a file failed.
    #[error("could not create file {path}: {source}")]
    Create {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },

    /// Removing a file failed.
    #[error("failed to remove p9 file {path}: {source}")]
    Remove {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },

    /// Stat failed.
    #[error("cannot stat file {path}: {source}")]
    Stat {
        /// File path.
        path: String,
        /// Transport failure.
        source: TransportError,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Mount failed.
    ConnectFailure,
    /// Open failed.
    OpenFailure,
    /// Read failed.
    ReadFailure,
    /// Write failed.
    WriteFailure,
    /// Allocation failed.
    AllocFailure,
    /// Transport contract broken or record overrun.
    ProtocolViolation,
    /// Create failed.
    CreateFailure,
    /// Remove failed.
    RemoveFailure,
    /// Stat failed.
    StatFailure,
}

impl Error {
    /// Which operation failed.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } => ErrorKind::ConnectFailure,
            Self::Open { .. } => ErrorKind::OpenFailure,
            Self::Read { .. } => ErrorKind::ReadFailure,
            Self::Write { .. } => ErrorKind::WriteFailure,
            Self::Alloc { .. } => ErrorKind::AllocFailure,
            Self::Protocol { .. } => ErrorKind::ProtocolViolation,
            Self::Create { .. } => ErrorKind::CreateFailure,
            Self::Remove { .. } => ErrorKind::RemoveFailure,
            Self::Stat { .. } => ErrorKind::StatFailure,
        }
    }

    /// The transport's errno-style code, when it supplied one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.transport().and_then(TransportError::code)
    }

    /// The underlying transport failure, if this error wraps one.
    #[must_use]
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Connect { source, .. }
            | Self::Open { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Create { source, .. }
            | Self::Remove { source, .. }
            | Self::Stat { source, .. } => Some(source),
            Self::Alloc { .. } | Self::Protocol { .. } => None,
        }
    }

    pub(crate) fn protocol(path: &str, detail: impl Into<String>) -> Self {
        Self::Protocol { path: path.to_string(), detail: detail.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_keeps_transport_code_and_message() {
        let err = Error::Open {
            path: "/ctl".into(),
            source: TransportError::with_code("file not found", 2),
        };
        assert_eq!(err.kind(), ErrorKind::OpenFailure);
        assert_eq!(err.code(), Some(2));
        assert_eq!(err.to_string(), "could not open p9 file /ctl: file not found");
    }

    #[test]
    fn protocol_errors_have_no_code() {
        let err = Error::protocol("/event", "server wrote 9 bytes of 4");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(err.code(), None);
        assert!(err.transport().is_none());
    }
}
