//! A mounted file server and the operations scripts run against it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapters::DefaultMounter;
use crate::error::{Error, Result};
use crate::io::{self, DirIter, LineIter};
use crate::ports::{FileHandle, Mounter, OpenMode, Transport, TransportError};
use crate::stat::Stat;

/// Permission bits `create` asks for; the server masks them.
pub const CREATE_PERM: u32 = 0o777;

/// The mounted transport. Shared by a [`Connection`] and every iterator
/// opened from it; unmounted when the last of them goes away.
pub(crate) struct Client {
    address: String,
    transport: RefCell<Box<dyn Transport>>,
    buffer_limit: Cell<usize>,
}

impl Client {
    fn open(&self, path: &str, mode: OpenMode) -> Result<FileHandle, TransportError> {
        self.transport.borrow_mut().open(path, mode)
    }

    fn create(&self, path: &str, perm: u32, mode: OpenMode) -> Result<FileHandle, TransportError> {
        self.transport.borrow_mut().create(path, perm, mode)
    }

    fn read(
        &self,
        file: &FileHandle,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.transport.borrow_mut().read(file, buf, timeout)
    }

    fn write(&self, file: &FileHandle, data: &[u8]) -> Result<usize, TransportError> {
        self.transport.borrow_mut().write(file, data)
    }

    fn close(&self, file: FileHandle) {
        self.transport.borrow_mut().close(file);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        debug!(address = %self.address, "unmount");
        self.transport.get_mut().unmount();
    }
}

/// An open file that is clunked exactly once: by [`OpenFile::close`] or
/// on drop, whichever comes first.
pub(crate) struct OpenFile {
    client: Rc<Client>,
    handle: FileHandle,
    closed: bool,
}

impl OpenFile {
    fn new(client: &Rc<Client>, handle: FileHandle) -> Self {
        Self { client: Rc::clone(client), handle, closed: false }
    }

    pub(crate) fn handle(&self) -> &FileHandle {
        &self.handle
    }

    pub(crate) fn buffer_limit(&self) -> usize {
        self.client.buffer_limit.get()
    }

    pub(crate) fn read(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.client.read(&self.handle, buf, timeout)
    }

    pub(crate) fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.client.write(&self.handle, data)
    }

    pub(crate) fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.client.close(self.handle);
        }
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// A mounted 9P file tree.
///
/// Dropping the connection unmounts the transport once no iterator opened
/// from it is still alive. A connection is confined to one thread.
pub struct Connection {
    client: Rc<Client>,
}

impl Connection {
    /// Mounts `address` with the built-in mounter (`mem!` fixtures and
    /// `replay!` cassettes).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the address cannot be mounted.
    pub fn connect(address: &str) -> Result<Self> {
        Self::connect_with(address, &DefaultMounter)
    }

    /// Mounts `address` through `mounter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] carrying the mounter's message and code.
    pub fn connect_with(address: &str, mounter: &dyn Mounter) -> Result<Self> {
        debug!(address, "mount");
        let transport = mounter
            .mount(address)
            .map_err(|source| Error::Connect { address: address.to_string(), source })?;
        Ok(Self::from_transport(address, transport))
    }

    /// Wraps an already mounted transport.
    #[must_use]
    pub fn from_transport(address: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            client: Rc::new(Client {
                address: address.to_string(),
                transport: RefCell::new(transport),
                buffer_limit: Cell::new(usize::MAX),
            }),
        }
    }

    /// Caps the size of any single buffer this connection allocates. Reads
    /// and iterators that would need more fail with [`Error::Alloc`].
    ///
    /// There is no cap by default; buffers are still bounded by
    /// [`crate::ports::MAX_IOUNIT`] and [`io::READ_LIMIT`].
    #[must_use]
    pub fn with_buffer_limit(self, bytes: usize) -> Self {
        self.client.buffer_limit.set(bytes);
        self
    }

    /// The address this connection was mounted from.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.client.address
    }

    /// Releases the connection. Equivalent to dropping it.
    pub fn disconnect(self) {
        drop(self);
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<OpenFile> {
        let handle = self
            .client
            .open(path, mode)
            .map_err(|source| Error::Open { path: path.to_string(), source })?;
        Ok(OpenFile::new(&self.client, handle))
    }

    /// Writes all of `data` to `path`, retrying short writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`], [`Error::Write`], or [`Error::Protocol`] if
    /// the server claims to have written more than it was given.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        debug!(path, len = data.len(), "write");
        let file = self.open(path, OpenMode::Write)?;
        let result = io::write_all(&file, path, data);
        file.close();
        result
    }

    /// Reads the contents of `path`, up to [`io::READ_LIMIT`] bytes.
    ///
    /// Longer files are truncated, not rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`], [`Error::Read`] or [`Error::Alloc`].
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        debug!(path, "read");
        let file = self.open(path, OpenMode::Read)?;
        let result = io::read_capped(&file, path);
        file.close();
        result
    }

    /// Creates `path`, writing `data` into it unless it came out a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Create`], or a write error from the data.
    pub fn create(&self, path: &str, data: Option<&[u8]>) -> Result<()> {
        debug!(path, "create");
        let handle = self
            .client
            .create(path, CREATE_PERM, OpenMode::Write)
            .map_err(|source| Error::Create { path: path.to_string(), source })?;
        let file = OpenFile::new(&self.client, handle);

        let result = match data {
            Some(data) if !data.is_empty() && !file.handle().is_dir() => {
                io::write_all(&file, path, data)
            }
            _ => Ok(()),
        };
        file.close();
        result
    }

    /// Removes `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remove`].
    pub fn remove(&self, path: &str) -> Result<()> {
        debug!(path, "remove");
        self.client
            .transport
            .borrow_mut()
            .remove(path)
            .map_err(|source| Error::Remove { path: path.to_string(), source })
    }

    /// Stats `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stat`], or [`Error::Protocol`] if the record is
    /// malformed.
    pub fn stat(&self, path: &str) -> Result<Stat> {
        debug!(path, "stat");
        let raw = self
            .client
            .transport
            .borrow_mut()
            .stat(path)
            .map_err(|source| Error::Stat { path: path.to_string(), source })?;
        Stat::decode(&raw).map_err(|err| {
            warn!(path, error = %err, "undecodable stat record");
            Error::protocol(path, err.to_string())
        })
    }

    /// Opens `path` for line-by-line reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] or [`Error::Alloc`].
    pub fn iterate_lines(&self, path: &str) -> Result<LineIter> {
        debug!(path, "iterate lines");
        LineIter::new(self.open(path, OpenMode::Read)?, path)
    }

    /// Opens the directory `path` for entry-by-entry reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] or [`Error::Alloc`].
    pub fn iterate_directory(&self, path: &str) -> Result<DirIter> {
        debug!(path, "iterate directory");
        DirIter::new(self.open(path, OpenMode::Read)?, path)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ixp instance {}", self.client.address)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("address", &self.client.address).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryFs;
    use crate::error::ErrorKind;

    fn mounted(fs: &MemoryFs) -> Connection {
        Connection::connect_with("mem!test", fs).unwrap()
    }

    #[test]
    fn unknown_transport_is_a_connect_failure() {
        let err = Connection::connect("9p!nowhere").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectFailure);
        assert!(err.to_string().contains("9p!nowhere"));
    }

    #[test]
    fn display_names_the_address() {
        let fs = MemoryFs::new();
        let conn = mounted(&fs);
        assert_eq!(conn.address(), "mem!test");
        assert_eq!(conn.to_string(), "ixp instance mem!test");
    }

    #[test]
    fn unmounts_once_after_last_iterator_is_dropped() {
        let fs = MemoryFs::new();
        fs.add_file("/event", "Start wmiirc\n");
        let conn = mounted(&fs);
        let lines = conn.iterate_lines("/event").unwrap();

        conn.disconnect();
        assert_eq!(fs.ledger().unmounts, 0);

        drop(lines);
        assert_eq!(fs.ledger().mounts, 1);
        assert_eq!(fs.ledger().unmounts, 1);
    }

    #[test]
    fn write_then_read_back() {
        let fs = MemoryFs::new();
        fs.add_file("/ctl", "");
        let conn = mounted(&fs);

        conn.write("/ctl", b"view 1\n").unwrap();
        assert_eq!(conn.read("/ctl").unwrap(), b"view 1\n");
        assert_eq!(fs.ledger().opens, fs.ledger().closes);
    }

    #[test]
    fn open_failure_opens_nothing() {
        let fs = MemoryFs::new();
        let conn = mounted(&fs);

        let err = conn.read("/missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OpenFailure);
        assert_eq!(err.code(), Some(crate::adapters::memory::ENOENT));
        assert_eq!(fs.ledger().opens, 0);
        assert_eq!(fs.ledger().closes, 0);
    }

    #[test]
    fn create_writes_initial_data() {
        let fs = MemoryFs::new();
        fs.add_dir("/lbar");
        let conn = mounted(&fs);

        conn.create("/lbar/1", Some(b"#000000 #ffffff #333333 1")).unwrap();
        assert_eq!(fs.contents("/lbar/1").unwrap(), b"#000000 #ffffff #333333 1");
        assert_eq!(fs.ledger().opens, 1);
        assert_eq!(fs.ledger().closes, 1);
    }

    #[test]
    fn create_of_a_directory_skips_the_write() {
        let fs = MemoryFs::new();
        fs.create_directories(true);
        let conn = mounted(&fs);

        conn.create("/tag", Some(b"ignored")).unwrap();
        assert!(fs.stat_of("/tag").unwrap().is_dir());
        assert_eq!(fs.ledger().writes, 0);
        assert_eq!(fs.ledger().opens, fs.ledger().closes);
    }

    #[test]
    fn create_of_an_existing_name_fails() {
        let fs = MemoryFs::new();
        fs.add_dir("/tag");
        let conn = mounted(&fs);

        let err = conn.create("/tag", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CreateFailure);
        assert_eq!(err.code(), Some(crate::adapters::memory::EEXIST));
    }

    #[test]
    fn create_without_data_only_creates() {
        let fs = MemoryFs::new();
        let conn = mounted(&fs);
        conn.create("/note", None).unwrap();
        conn.create("/empty", Some(b"")).unwrap();
        assert_eq!(fs.contents("/note").unwrap(), b"");
        assert_eq!(fs.ledger().writes, 0);
    }

    #[test]
    fn remove_and_remove_again() {
        let fs = MemoryFs::new();
        fs.add_file("/rbar/status", "ok");
        let conn = mounted(&fs);

        conn.remove("/rbar/status").unwrap();
        assert!(!fs.exists("/rbar/status"));

        let err = conn.remove("/rbar/status").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoveFailure);
    }

    #[test]
    fn stat_decodes_the_record() {
        let fs = MemoryFs::new();
        fs.add_file("/client/sel/label", "xterm");
        let conn = mounted(&fs);

        let stat = conn.stat("/client/sel/label").unwrap();
        assert_eq!(stat.name, "label");
        assert_eq!(stat.length, 5);
        assert!(!stat.is_dir());
        assert!(conn.stat("/client").unwrap().is_dir());

        let err = conn.stat("/nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatFailure);
    }
}
