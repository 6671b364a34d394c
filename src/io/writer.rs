use tracing::trace;

use crate::connection::OpenFile;
use crate::error::{Error, Result};
use crate::ports::TransportError;

/// Sends all of `data`, reissuing the write for whatever the server did not
/// take. The caller owns closing `file`.
pub(crate) fn write_all(file: &OpenFile, path: &str, data: &[u8]) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        let remaining = &data[offset..];
        let written = file
            .write(remaining)
            .map_err(|source| Error::Write { path: path.to_string(), source })?;

        if written > remaining.len() {
            return Err(Error::protocol(
                path,
                format!("server wrote {written} bytes of {}", remaining.len()),
            ));
        }
        if written == 0 {
            return Err(Error::Write {
                path: path.to_string(),
                source: TransportError::failed("server accepted no bytes"),
            });
        }

        trace!(path, offset, written, "partial write");
        offset += written;
    }
    Ok(())
}
