//! Transport port: the 9P client primitives the binding core consumes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stat::QTDIR;

/// Transfer size assumed when a server advertises an iounit of zero
/// (`msize` 8192 minus the 24-byte Rread/Twrite header).
pub const DEFAULT_IOUNIT: u32 = 8168;

/// Largest iounit honored when sizing buffers: the biggest 9P message a
/// client negotiates (`msize` 65536) minus the same header.
pub const MAX_IOUNIT: u32 = 65512;

/// Access mode requested when opening or creating a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// `OREAD`
    Read,
    /// `OWRITE`
    Write,
    /// `ORDWR`
    ReadWrite,
}

impl OpenMode {
    /// The 9P mode byte for this access mode.
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::ReadWrite => 2,
        }
    }

    /// Whether the mode permits reading.
    #[must_use]
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether the mode permits writing.
    #[must_use]
    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// An open file on the server, as returned by `open` or `create`.
///
/// The handle is plain data; closing it exactly once is the caller's job.
/// Inside this crate that is enforced by [`crate::connection::Connection`]'s
/// file guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    /// Server-side fid.
    pub fid: u32,
    /// Advisory maximum bytes per read or write; zero means "use the default".
    pub iounit: u32,
    /// Qid type bits of the opened file.
    pub qid_type: u8,
}

impl FileHandle {
    /// Whether the handle refers to a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.qid_type & QTDIR != 0
    }

    /// The iounit as a buffer size, substituting [`DEFAULT_IOUNIT`] for zero
    /// and clamping anything larger than [`MAX_IOUNIT`].
    #[must_use]
    pub fn io_size(&self) -> usize {
        let iounit = if self.iounit == 0 { DEFAULT_IOUNIT } else { self.iounit.min(MAX_IOUNIT) };
        usize::try_from(iounit).unwrap_or(usize::MAX)
    }
}

/// Failure reported by a transport primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportError {
    /// The server or the link rejected the request.
    #[error("{message}")]
    Failed {
        /// Server error string (`Rerror.ename`) or local description.
        message: String,
        /// errno-style code when one is known.
        code: Option<i32>,
    },
    /// A bounded read saw its deadline pass before any data arrived.
    #[error("read timed out")]
    TimedOut,
}

impl TransportError {
    /// A failure with only a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into(), code: None }
    }

    /// A failure carrying an errno-style code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self::Failed { message: message.into(), code: Some(code) }
    }

    /// The errno-style code, if any.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            Self::TimedOut => None,
        }
    }
}

/// A mounted 9P client.
///
/// Implementations are the external collaborator: a wire client over a
/// Unix-domain or TCP socket, an in-memory tree, or a cassette replayer.
/// Every method maps onto one libixp-style primitive.
pub trait Transport {
    /// Walks to `path` and opens it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or the mode is refused.
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, TransportError>;

    /// Creates `path` with permission bits `perm` and opens it.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is missing or the server refuses.
    fn create(
        &mut self,
        path: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<FileHandle, TransportError>;

    /// Reads up to `buf.len()` bytes. `Ok(0)` is end of file.
    ///
    /// With a `timeout`, the call gives up with [`TransportError::TimedOut`]
    /// once the deadline passes without data.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or times out.
    fn read(
        &mut self,
        file: &FileHandle,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    /// Writes from `data`, returning how many bytes the server accepted.
    /// Short writes are allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, TransportError>;

    /// Removes `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be removed.
    fn remove(&mut self, path: &str) -> Result<(), TransportError>;

    /// Returns the raw stat record for `path`, in directory-entry encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist.
    fn stat(&mut self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Clunks an open file.
    fn close(&mut self, file: FileHandle);

    /// Tears down the session.
    fn unmount(&mut self);
}

/// Turns an address string into a mounted transport.
pub trait Mounter {
    /// Mounts `address`, of the form `<transport>!<locator>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be reached.
    fn mount(&self, address: &str) -> Result<Box<dyn Transport>, TransportError>;
}
