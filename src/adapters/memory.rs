//! In-memory file tree served through the [`Transport`] port.
//!
//! Stands in for a window manager's 9P server in tests and in `mem!`
//! fixtures. Besides plain files and directories it has *streams*, files
//! like wmii's `/event` whose reads drain a queue of chunks. A
//! [`Chunk::Stall`] in the queue behaves like a read that produces nothing
//! before its deadline.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{trace, warn};

use crate::ports::{
    FileHandle, Mounter, OpenMode, Transport, TransportError, DEFAULT_IOUNIT,
};
use crate::stat::{Qid, Stat, DMDIR, QTDIR, QTFILE};

/// No such file.
pub const ENOENT: i32 = 2;
/// I/O error.
pub const EIO: i32 = 5;
/// Fid not open, or not open in a suitable mode.
pub const EBADF: i32 = 9;
/// Operation not permitted on this file.
pub const EACCES: i32 = 13;
/// Name already taken.
pub const EEXIST: i32 = 17;
/// A path element is not a directory.
pub const ENOTDIR: i32 = 20;
/// Directory where a file was needed.
pub const EISDIR: i32 = 21;
/// Bad argument.
pub const EINVAL: i32 = 22;
/// Directory still has entries.
pub const ENOTEMPTY: i32 = 39;

/// Shape of the server's I/O, plus fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// iounit advertised on every open.
    pub iounit: u32,
    /// Most bytes a single read returns. Directory reads still return at
    /// least one whole record.
    pub max_read: Option<usize>,
    /// Most bytes a single write accepts.
    pub max_write: Option<usize>,
    /// Reads beyond this many fail with `EIO`.
    pub fail_after_reads: Option<usize>,
    /// Writes beyond this many fail with `EIO`.
    pub fail_after_writes: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            iounit: DEFAULT_IOUNIT,
            max_read: None,
            max_write: None,
            fail_after_reads: None,
            fail_after_writes: None,
        }
    }
}

/// Calls the tree has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ledger {
    /// Mounts through [`Mounter`].
    pub mounts: usize,
    /// Unmounts.
    pub unmounts: usize,
    /// Successful opens and creates.
    pub opens: usize,
    /// Closes of open fids.
    pub closes: usize,
    /// Read calls.
    pub reads: usize,
    /// Write calls.
    pub writes: usize,
}

/// One queued piece of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Bytes handed to the next read.
    Data(Vec<u8>),
    /// Nothing arrives: a read with a deadline times out, one without
    /// waits past it.
    Stall,
}

impl Chunk {
    /// A data chunk.
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data(bytes.into())
    }
}

/// YAML description of a tree, as loaded by `mem!<file>` addresses.
///
/// ```yaml
/// iounit: 64
/// dirs: [/lbar, /rbar]
/// files:
///   /ctl: "view 1\n"
///   /client/sel/label: xterm
/// streams:
///   /event: ["CreateTag 1\n", ~, "FocusTag 1\n"]
/// ```
///
/// A `~` stream entry is a [`Chunk::Stall`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fixture {
    /// Advertised iounit.
    pub iounit: Option<u32>,
    /// Per-read byte cap.
    pub max_read: Option<usize>,
    /// Per-write byte cap.
    pub max_write: Option<usize>,
    /// uid, gid and muid of every entry.
    pub owner: Option<String>,
    /// Modification time of every entry.
    pub mtime: Option<u32>,
    /// Empty directories.
    pub dirs: Vec<String>,
    /// Plain files and their contents.
    pub files: BTreeMap<String, String>,
    /// Streams and their queued chunks.
    pub streams: BTreeMap<String, Vec<Option<String>>>,
}

#[derive(Debug)]
enum Content {
    Dir,
    File(Vec<u8>),
    Stream(VecDeque<Chunk>),
}

#[derive(Debug)]
struct Node {
    qid_path: u64,
    mode: u32,
    mtime: u32,
    content: Content,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Dir)
    }
}

#[derive(Debug)]
struct OpenFid {
    path: String,
    mode: OpenMode,
    offset: usize,
    /// Encoded entries, snapshotted at open for directories.
    listing: Vec<u8>,
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    fids: BTreeMap<u32, OpenFid>,
    next_fid: u32,
    next_qid: u64,
    limits: Limits,
    ledger: Ledger,
    owner: String,
    now: u32,
    create_dirs: bool,
}

/// Shared handle to an in-memory tree. Clones see the same tree.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    tree: Rc<RefCell<Tree>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty tree with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// An empty tree with the given limits.
    #[must_use]
    pub fn with_limits(limits: Limits) -> Self {
        let now = u32::try_from(Utc::now().timestamp()).unwrap_or(0);
        let mut tree = Tree {
            nodes: BTreeMap::new(),
            fids: BTreeMap::new(),
            next_fid: 1,
            next_qid: 0,
            limits,
            ledger: Ledger::default(),
            owner: "none".to_string(),
            now,
            create_dirs: false,
        };
        tree.insert("/", DMDIR | 0o755, Content::Dir);
        Self { tree: Rc::new(RefCell::new(tree)) }
    }

    /// Builds a tree from a parsed fixture.
    #[must_use]
    pub fn from_fixture(fixture: &Fixture) -> Self {
        let limits = Limits {
            iounit: fixture.iounit.unwrap_or(DEFAULT_IOUNIT),
            max_read: fixture.max_read,
            max_write: fixture.max_write,
            ..Limits::default()
        };
        let fs = Self::with_limits(limits);
        {
            let mut tree = fs.tree.borrow_mut();
            if let Some(owner) = &fixture.owner {
                tree.owner.clone_from(owner);
            }
            if let Some(mtime) = fixture.mtime {
                tree.now = mtime;
                if let Some(root) = tree.nodes.get_mut("/") {
                    root.mtime = mtime;
                }
            }
        }
        for dir in &fixture.dirs {
            fs.add_dir(dir);
        }
        for (path, contents) in &fixture.files {
            fs.add_file(path, contents.as_bytes());
        }
        for (path, chunks) in &fixture.streams {
            let chunks = chunks.iter().map(|chunk| match chunk {
                Some(data) => Chunk::data(data.as_bytes()),
                None => Chunk::Stall,
            });
            fs.add_stream(path, chunks);
        }
        fs
    }

    /// Parses a YAML [`Fixture`].
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a fixture.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let fixture: Fixture = serde_yaml::from_str(yaml)?;
        Ok(Self::from_fixture(&fixture))
    }

    /// Loads a YAML fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            let message = format!("failed to read fixture {}: {e}", path.display());
            match e.raw_os_error() {
                Some(code) => TransportError::with_code(message, code),
                None => TransportError::failed(message),
            }
        })?;
        Self::from_yaml(&yaml).map_err(|e| {
            TransportError::with_code(
                format!("failed to parse fixture {}: {e}", path.display()),
                EINVAL,
            )
        })
    }

    /// A transport over this tree. Does not count as a mount.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { fs: self.clone() }
    }

    /// Adds a directory and any missing parents.
    pub fn add_dir(&self, path: &str) {
        self.tree.borrow_mut().insert(path, DMDIR | 0o755, Content::Dir);
    }

    /// Adds or replaces a file, creating missing parents.
    pub fn add_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.tree.borrow_mut().insert(path, 0o644, Content::File(contents.into()));
    }

    /// Adds or replaces a stream with the given queue.
    pub fn add_stream(&self, path: &str, chunks: impl IntoIterator<Item = Chunk>) {
        let queue = chunks.into_iter().collect();
        self.tree.borrow_mut().insert(path, 0o444, Content::Stream(queue));
    }

    /// Appends a chunk to an existing stream. Returns `false` if `path` is
    /// not a stream.
    pub fn push_chunk(&self, path: &str, chunk: Chunk) -> bool {
        let mut tree = self.tree.borrow_mut();
        match tree.nodes.get_mut(&normalize(path)).map(|node| &mut node.content) {
            Some(Content::Stream(queue)) => {
                queue.push_back(chunk);
                true
            }
            _ => false,
        }
    }

    /// Current contents of a plain file.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match &self.tree.borrow().nodes.get(&normalize(path))?.content {
            Content::File(data) => Some(data.clone()),
            Content::Dir | Content::Stream(_) => None,
        }
    }

    /// Whether `path` exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.tree.borrow().nodes.contains_key(&normalize(path))
    }

    /// The stat record the tree would serve for `path`.
    #[must_use]
    pub fn stat_of(&self, path: &str) -> Option<Stat> {
        let tree = self.tree.borrow();
        let path = normalize(path);
        tree.nodes.get(&path).map(|node| tree.stat(&path, node))
    }

    /// Calls served so far.
    #[must_use]
    pub fn ledger(&self) -> Ledger {
        self.tree.borrow().ledger
    }

    /// Fids currently open.
    #[must_use]
    pub fn open_fids(&self) -> usize {
        self.tree.borrow().fids.len()
    }

    /// Timestamp for entries added or modified from now on.
    pub fn set_time(&self, secs: u32) {
        self.tree.borrow_mut().now = secs;
    }

    /// Make every `create` produce a directory, whatever its permissions.
    pub fn create_directories(&self, on: bool) {
        self.tree.borrow_mut().create_dirs = on;
    }
}

impl Mounter for MemoryFs {
    fn mount(&self, address: &str) -> Result<Box<dyn Transport>, TransportError> {
        trace!(address, "memory mount");
        self.tree.borrow_mut().ledger.mounts += 1;
        Ok(Box::new(self.transport()))
    }
}

/// [`Transport`] over a [`MemoryFs`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    fs: MemoryFs,
}

impl Transport for MemoryTransport {
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, TransportError> {
        self.fs.tree.borrow_mut().open(&normalize(path), mode)
    }

    fn create(
        &mut self,
        path: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<FileHandle, TransportError> {
        self.fs.tree.borrow_mut().create(&normalize(path), perm, mode)
    }

    fn read(
        &mut self,
        file: &FileHandle,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.fs.tree.borrow_mut().read(file.fid, buf, timeout)
    }

    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, TransportError> {
        self.fs.tree.borrow_mut().write(file.fid, data)
    }

    fn remove(&mut self, path: &str) -> Result<(), TransportError> {
        self.fs.tree.borrow_mut().remove(&normalize(path))
    }

    fn stat(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let tree = self.fs.tree.borrow();
        let path = normalize(path);
        let node = tree.nodes.get(&path).ok_or_else(not_found)?;
        Ok(tree.stat(&path, node).encode())
    }

    fn close(&mut self, file: FileHandle) {
        let mut tree = self.fs.tree.borrow_mut();
        if tree.fids.remove(&file.fid).is_some() {
            tree.ledger.closes += 1;
        } else {
            warn!(fid = file.fid, "close of unknown fid");
        }
    }

    fn unmount(&mut self) {
        self.fs.tree.borrow_mut().ledger.unmounts += 1;
    }
}

impl Tree {
    fn insert(&mut self, path: &str, mode: u32, content: Content) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            if !self.nodes.get(parent).is_some_and(Node::is_dir) {
                let parent = parent.to_string();
                self.insert(&parent, DMDIR | 0o755, Content::Dir);
            }
        }
        let qid_path = match self.nodes.get(&path) {
            Some(existing) => existing.qid_path,
            None => {
                self.next_qid += 1;
                self.next_qid
            }
        };
        self.nodes.insert(path, Node { qid_path, mode, mtime: self.now, content });
    }

    fn stat(&self, path: &str, node: &Node) -> Stat {
        let length = match &node.content {
            Content::File(data) => data.len() as u64,
            Content::Dir | Content::Stream(_) => 0,
        };
        Stat {
            kind: 0,
            dev: 0,
            qid: Qid {
                qtype: if node.is_dir() { QTDIR } else { QTFILE },
                version: 0,
                path: node.qid_path,
            },
            mode: node.mode,
            atime: node.mtime,
            mtime: node.mtime,
            length,
            name: base_name(path).to_string(),
            uid: self.owner.clone(),
            gid: self.owner.clone(),
            muid: self.owner.clone(),
        }
    }

    fn listing(&self, dir: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        for (path, node) in &self.nodes {
            if parent_of(path) == Some(dir) {
                self.stat(path, node).encode_into(&mut buf);
            }
        }
        buf
    }

    fn handle_for(&mut self, path: &str, mode: OpenMode) -> FileHandle {
        let is_dir = self.nodes.get(path).is_some_and(Node::is_dir);
        let listing = if is_dir { self.listing(path) } else { Vec::new() };

        let fid = self.next_fid;
        self.next_fid += 1;
        self.fids.insert(fid, OpenFid { path: path.to_string(), mode, offset: 0, listing });
        self.ledger.opens += 1;

        FileHandle { fid, iounit: self.limits.iounit, qid_type: if is_dir { QTDIR } else { QTFILE } }
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, TransportError> {
        let node = self.nodes.get(path).ok_or_else(not_found)?;
        if node.is_dir() && mode.writable() {
            return Err(TransportError::with_code("is a directory", EISDIR));
        }
        Ok(self.handle_for(path, mode))
    }

    fn create(
        &mut self,
        path: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<FileHandle, TransportError> {
        if self.nodes.contains_key(path) {
            return Err(TransportError::with_code("file exists", EEXIST));
        }
        let parent = parent_of(path).ok_or_else(|| {
            TransportError::with_code("cannot create the root", EEXIST)
        })?;
        match self.nodes.get(parent) {
            None => return Err(not_found()),
            Some(node) if !node.is_dir() => {
                return Err(TransportError::with_code("not a directory", ENOTDIR));
            }
            Some(_) => {}
        }

        if perm & DMDIR != 0 || self.create_dirs {
            self.insert(path, DMDIR | (perm & 0o777), Content::Dir);
        } else {
            self.insert(path, perm & 0o777, Content::File(Vec::new()));
        }
        Ok(self.handle_for(path, mode))
    }

    fn read(
        &mut self,
        fid: u32,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.ledger.reads += 1;
        if self.limits.fail_after_reads.is_some_and(|n| self.ledger.reads > n) {
            return Err(TransportError::with_code("i/o error", EIO));
        }

        let max_read = self.limits.max_read.unwrap_or(usize::MAX);
        let open = self.fids.get_mut(&fid).ok_or_else(unknown_fid)?;
        if !open.mode.readable() {
            return Err(TransportError::with_code("file not open for reading", EBADF));
        }
        let node = self.nodes.get_mut(&open.path).ok_or_else(not_found)?;

        match &mut node.content {
            Content::Dir => {
                let n = pack_records(&open.listing[open.offset..], buf.len(), max_read)?;
                buf[..n].copy_from_slice(&open.listing[open.offset..open.offset + n]);
                open.offset += n;
                Ok(n)
            }
            Content::File(data) => {
                let remaining = data.get(open.offset..).unwrap_or_default();
                let n = remaining.len().min(buf.len()).min(max_read);
                buf[..n].copy_from_slice(&remaining[..n]);
                open.offset += n;
                Ok(n)
            }
            Content::Stream(queue) => loop {
                match queue.pop_front() {
                    None => return Ok(0),
                    Some(Chunk::Stall) => {
                        if timeout.is_some() {
                            return Err(TransportError::TimedOut);
                        }
                    }
                    Some(Chunk::Data(bytes)) if bytes.is_empty() => {}
                    Some(Chunk::Data(mut bytes)) => {
                        let n = bytes.len().min(buf.len()).min(max_read);
                        buf[..n].copy_from_slice(&bytes[..n]);
                        if n < bytes.len() {
                            queue.push_front(Chunk::Data(bytes.split_off(n)));
                        }
                        return Ok(n);
                    }
                }
            },
        }
    }

    fn write(&mut self, fid: u32, data: &[u8]) -> Result<usize, TransportError> {
        self.ledger.writes += 1;
        if self.limits.fail_after_writes.is_some_and(|n| self.ledger.writes > n) {
            return Err(TransportError::with_code("i/o error", EIO));
        }

        let n = data.len().min(self.limits.max_write.unwrap_or(usize::MAX));
        let now = self.now;
        let open = self.fids.get_mut(&fid).ok_or_else(unknown_fid)?;
        if !open.mode.writable() {
            return Err(TransportError::with_code("file not open for writing", EBADF));
        }
        let node = self.nodes.get_mut(&open.path).ok_or_else(not_found)?;

        match &mut node.content {
            Content::Dir => return Err(TransportError::with_code("is a directory", EISDIR)),
            Content::File(contents) => {
                let end = open.offset + n;
                if contents.len() < end {
                    contents.resize(end, 0);
                }
                contents[open.offset..end].copy_from_slice(&data[..n]);
                open.offset = end;
            }
            Content::Stream(queue) => queue.push_back(Chunk::data(&data[..n])),
        }
        node.mtime = now;
        Ok(n)
    }

    fn remove(&mut self, path: &str) -> Result<(), TransportError> {
        if path == "/" {
            return Err(TransportError::with_code("cannot remove the root", EACCES));
        }
        let node = self.nodes.get(path).ok_or_else(not_found)?;
        if node.is_dir() && self.nodes.keys().any(|p| parent_of(p) == Some(path)) {
            return Err(TransportError::with_code("directory not empty", ENOTEMPTY));
        }
        self.nodes.remove(path);
        Ok(())
    }
}

/// Bytes of whole records from the front of `listing` that fit in `room`,
/// stopping at `max_read` once at least one record is in.
fn pack_records(listing: &[u8], room: usize, max_read: usize) -> Result<usize, TransportError> {
    let mut n = 0;
    while n + 2 <= listing.len() {
        let size = 2 + usize::from(u16::from_le_bytes([listing[n], listing[n + 1]]));
        if n + size > room {
            break;
        }
        if n > 0 && n + size > max_read {
            break;
        }
        n += size;
    }
    if n == 0 && !listing.is_empty() {
        return Err(TransportError::with_code("read count too small for a directory entry", EINVAL));
    }
    Ok(n)
}

fn not_found() -> TransportError {
    TransportError::with_code("file not found", ENOENT)
}

fn unknown_fid() -> TransportError {
    TransportError::with_code("unknown fid", EBADF)
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

fn base_name(path: &str) -> &str {
    if path == "/" {
        return path;
    }
    path.rsplit('/').next().unwrap_or(path)
}
