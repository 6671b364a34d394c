//! Buffer management between the connection and the transport: the
//! short-write loop, the capped one-shot read, and the two iterators.

mod dir;
mod lines;
mod reader;
mod writer;

pub use dir::DirIter;
pub use lines::{LineEvent, LineIter, ReadTimeout};
pub use reader::READ_LIMIT;

pub(crate) use reader::read_capped;
pub(crate) use writer::write_all;

use tracing::debug;

use crate::error::{Error, Result};

/// A zeroed buffer of `len` bytes, reporting allocation failure as an error
/// rather than aborting. `limit` is the connection's buffer budget.
pub(crate) fn alloc_buffer(path: &str, len: usize, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    grow_buffer(&mut buf, path, len, limit)?;
    Ok(buf)
}

/// Grows `buf` with zeroes to exactly `len` bytes.
pub(crate) fn grow_buffer(
    buf: &mut Vec<u8>,
    path: &str,
    len: usize,
    limit: usize,
) -> Result<()> {
    let alloc_error = || Error::Alloc { path: path.to_string(), size: len };
    if len > limit {
        debug!(path, len, limit, "buffer over budget");
        return Err(alloc_error());
    }
    let extra = len.saturating_sub(buf.len());
    buf.try_reserve_exact(extra).map_err(|_| alloc_error())?;
    buf.resize(len, 0);
    Ok(())
}
