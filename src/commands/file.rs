//! `ixp read`, `write`, `create` and `remove`.

use std::io::Write;

use super::{failure, output_error};
use crate::connection::Connection;

/// Copies the file's contents to `out`.
///
/// # Errors
///
/// Returns an error string if the read or the output fails.
pub fn read(connection: &Connection, path: &str, out: &mut dyn Write) -> Result<(), String> {
    let data = connection.read(path).map_err(failure)?;
    out.write_all(&data).map_err(|e| output_error(&e))
}

/// Writes `data` to an existing file.
///
/// # Errors
///
/// Returns an error string if the write fails.
pub fn write(connection: &Connection, path: &str, data: &[u8]) -> Result<(), String> {
    connection.write(path, data).map_err(failure)
}

/// Creates `path`, writing `data` when given.
///
/// # Errors
///
/// Returns an error string if the create or the write fails.
pub fn create(connection: &Connection, path: &str, data: Option<&[u8]>) -> Result<(), String> {
    connection.create(path, data).map_err(failure)
}

/// Removes `path`.
///
/// # Errors
///
/// Returns an error string if the remove fails.
pub fn remove(connection: &Connection, path: &str) -> Result<(), String> {
    connection.remove(path).map_err(failure)
}
