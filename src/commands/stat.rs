//! `ixp stat` and `ixp ls`.

use std::io::Write;

use super::{failure, output_error};
use crate::connection::Connection;
use crate::stat::Stat;

/// Prints one file's metadata as a long listing line, or as JSON.
///
/// # Errors
///
/// Returns an error string if the stat or the output fails.
pub fn stat(
    connection: &Connection,
    path: &str,
    json: bool,
    out: &mut dyn Write,
) -> Result<(), String> {
    let stat = connection.stat(path).map_err(failure)?;
    if json {
        let text = serde_json::to_string_pretty(&stat.to_record())
            .map_err(|e| format!("failed to encode stat record: {e}"))?;
        writeln!(out, "{text}").map_err(|e| output_error(&e))
    } else {
        writeln!(out, "{}", long_line(&stat)).map_err(|e| output_error(&e))
    }
}

/// Lists a directory, sorted by name. Directories get a trailing `/`.
///
/// # Errors
///
/// Returns an error string if the listing or the output fails.
pub fn ls(
    connection: &Connection,
    path: &str,
    long: bool,
    out: &mut dyn Write,
) -> Result<(), String> {
    let mut entries = connection
        .iterate_directory(path)
        .map_err(failure)?
        .collect::<crate::Result<Vec<Stat>>>()
        .map_err(failure)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    for entry in &entries {
        let line = if long { long_line(entry) } else { display_name(entry) };
        writeln!(out, "{line}").map_err(|e| output_error(&e))?;
    }
    Ok(())
}

fn display_name(stat: &Stat) -> String {
    if stat.is_dir() {
        format!("{}/", stat.name)
    } else {
        stat.name.clone()
    }
}

fn long_line(stat: &Stat) -> String {
    format!(
        "{} {} {} {:>5} {} {}",
        stat.mode_string(),
        stat.uid,
        stat.gid,
        stat.length,
        stat.time_string(),
        display_name(stat)
    )
}
