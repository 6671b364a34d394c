use tracing::trace;

use super::{alloc_buffer, grow_buffer};
use crate::connection::OpenFile;
use crate::error::{Error, Result};

/// Most bytes a one-shot read returns. Anything past it is dropped.
pub const READ_LIMIT: usize = 4096;

/// Reads from `file` until end of file or until [`READ_LIMIT`] bytes have
/// been collected. The buffer starts at the file's iounit and is grown once,
/// straight to the limit, when a smaller iounit fills it.
pub(crate) fn read_capped(file: &OpenFile, path: &str) -> Result<Vec<u8>> {
    let io_size = file.handle().io_size();
    let limit = file.buffer_limit();
    let mut capacity = io_size.min(READ_LIMIT);
    let mut buf = alloc_buffer(path, capacity, limit)?;
    let mut filled = 0;

    loop {
        let want = (capacity - filled).min(io_size);
        let n = file
            .read(&mut buf[filled..filled + want], None)
            .map_err(|source| Error::Read { path: path.to_string(), source })?;
        if n == 0 {
            break;
        }
        if n > want {
            return Err(Error::protocol(path, format!("server returned {n} bytes for {want}")));
        }

        filled += n;
        trace!(path, filled, capacity, "read chunk");

        if filled == capacity {
            if capacity >= READ_LIMIT {
                break;
            }
            capacity = READ_LIMIT;
            grow_buffer(&mut buf, path, capacity, limit)?;
        }
    }

    buf.truncate(filled);
    Ok(buf)
}
