use std::fmt;

use tracing::{debug, trace};

use super::alloc_buffer;
use crate::connection::OpenFile;
use crate::error::{Error, Result};
use crate::stat::Stat;

/// Entry-at-a-time reader over an open directory.
///
/// Each transport read returns whole stat records; they are decoded one per
/// call to `next` before the next read is issued.
pub struct DirIter {
    file: OpenFile,
    path: String,
    buf: Vec<u8>,
    cursor: usize,
    end: usize,
    done: bool,
}

impl DirIter {
    pub(crate) fn new(file: OpenFile, path: &str) -> Result<Self> {
        let buf = alloc_buffer(path, file.handle().io_size(), file.buffer_limit())?;
        Ok(Self { file, path: path.to_string(), buf, cursor: 0, end: 0, done: false })
    }

    fn refill(&mut self) -> Option<Result<()>> {
        match self.file.read(&mut self.buf, None) {
            Ok(0) => None,
            Ok(n) if n > self.buf.len() => Some(Err(Error::protocol(
                &self.path,
                format!("server returned {n} bytes for {}", self.buf.len()),
            ))),
            Ok(n) => {
                trace!(path = %self.path, n, "directory chunk");
                self.cursor = 0;
                self.end = n;
                Some(Ok(()))
            }
            Err(err) => {
                debug!(path = %self.path, error = %err, "directory read failed");
                None
            }
        }
    }
}

impl Iterator for DirIter {
    type Item = Result<Stat>;

    fn next(&mut self) -> Option<Result<Stat>> {
        if self.done {
            return None;
        }
        if self.cursor >= self.end {
            match self.refill() {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }

        match Stat::decode_at(&self.buf[..self.end], &mut self.cursor) {
            Ok(stat) => Some(Ok(stat)),
            Err(err) => {
                self.done = true;
                Some(Err(Error::protocol(&self.path, err.to_string())))
            }
        }
    }
}

impl fmt::Debug for DirIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirIter")
            .field("path", &self.path)
            .field("cursor", &self.cursor)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}
