use std::fmt;
use std::time::Duration;

use tracing::{debug, trace};

use super::alloc_buffer;
use crate::connection::OpenFile;
use crate::error::Result;
use crate::ports::TransportError;

/// Deadline for one [`LineIter::advance`] call.
///
/// When the deadline passes with no data, the `extend` callback (if any) is
/// asked for another wait. A non-zero answer reissues the read bounded by
/// that duration; zero lets the timeout stand.
pub struct ReadTimeout<'a> {
    after: Duration,
    extend: Option<Box<dyn FnMut() -> Duration + 'a>>,
}

impl<'a> ReadTimeout<'a> {
    /// Give up after `after`. A zero duration means no deadline.
    #[must_use]
    pub fn after(after: Duration) -> Self {
        Self { after, extend: None }
    }

    /// Give up after `secs` seconds.
    #[must_use]
    pub fn seconds(secs: u64) -> Self {
        Self::after(Duration::from_secs(secs))
    }

    /// Consult `extend` each time the deadline passes.
    #[must_use]
    pub fn with_extension(mut self, extend: impl FnMut() -> Duration + 'a) -> Self {
        self.extend = Some(Box::new(extend));
        self
    }
}

impl fmt::Debug for ReadTimeout<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTimeout")
            .field("after", &self.after)
            .field("extend", &self.extend.is_some())
            .finish()
    }
}

/// One step of a [`LineIter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A line, without its newline.
    Line(String),
    /// The deadline passed before data arrived. The iterator is still live.
    Timeout,
}

enum Refill {
    Data,
    TimedOut,
    End,
}

/// Line-at-a-time reader over an open file.
///
/// Lines are split inside each transport read; a read that ends without a
/// newline is handed back whole, so a line spanning two reads arrives as
/// two items.
pub struct LineIter {
    file: OpenFile,
    path: String,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    done: bool,
}

impl LineIter {
    pub(crate) fn new(file: OpenFile, path: &str) -> Result<Self> {
        let buf = alloc_buffer(path, file.handle().io_size(), file.buffer_limit())?;
        Ok(Self { file, path: path.to_string(), buf, pos: 0, len: 0, done: false })
    }

    /// Returns the next line, a [`LineEvent::Timeout`], or `None` at end of
    /// file. A failed read also ends the sequence.
    pub fn advance(&mut self, timeout: Option<ReadTimeout<'_>>) -> Option<LineEvent> {
        if self.done {
            return None;
        }
        if self.pos == self.len {
            match self.refill(timeout) {
                Refill::Data => {}
                Refill::TimedOut => return Some(LineEvent::Timeout),
                Refill::End => {
                    self.done = true;
                    return None;
                }
            }
        }
        Some(LineEvent::Line(self.take_line()))
    }

    fn refill(&mut self, timeout: Option<ReadTimeout<'_>>) -> Refill {
        self.pos = 0;
        self.len = 0;

        let (mut wait, mut extend) = match timeout {
            Some(t) if !t.after.is_zero() => (Some(t.after), t.extend),
            _ => (None, None),
        };

        loop {
            match self.file.read(&mut self.buf, wait) {
                Ok(0) => {
                    debug!(path = %self.path, "end of file");
                    return Refill::End;
                }
                Ok(n) if n > self.buf.len() => {
                    debug!(path = %self.path, n, "server overran the read buffer");
                    return Refill::End;
                }
                Ok(n) => {
                    trace!(path = %self.path, n, "refilled");
                    self.len = n;
                    return Refill::Data;
                }
                Err(TransportError::TimedOut) => {
                    let next = extend.as_mut().map_or(Duration::ZERO, |extend| extend());
                    if next.is_zero() {
                        trace!(path = %self.path, "read timed out");
                        return Refill::TimedOut;
                    }
                    trace!(path = %self.path, ?next, "timeout extended");
                    wait = Some(next);
                }
                Err(err) => {
                    debug!(path = %self.path, error = %err, "read failed");
                    return Refill::End;
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        let window = &self.buf[self.pos..self.len];
        match window.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                let line = String::from_utf8_lossy(&window[..nl]).into_owned();
                self.pos += nl + 1;
                line
            }
            None => {
                let line = String::from_utf8_lossy(window).into_owned();
                self.pos = self.len;
                line
            }
        }
    }
}

impl Iterator for LineIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.advance(None)? {
            LineEvent::Line(line) => Some(line),
            LineEvent::Timeout => None,
        }
    }
}

impl fmt::Debug for LineIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineIter")
            .field("path", &self.path)
            .field("pos", &self.pos)
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .finish_non_exhaustive()
    }
}
