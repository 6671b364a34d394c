//! `ixp lines`.

use std::io::Write;
use std::time::Duration;

use super::{failure, output_error};
use crate::connection::Connection;
use crate::io::{LineEvent, ReadTimeout};

/// Prints `path` line by line until end of file or, with `timeout`, until
/// no line arrives in time. `extend` grants one extra wait per line.
///
/// # Errors
///
/// Returns an error string if the file cannot be opened or output fails.
pub fn follow(
    connection: &Connection,
    path: &str,
    timeout: Option<u64>,
    extend: Option<u64>,
    out: &mut dyn Write,
) -> Result<(), String> {
    let mut lines = connection.iterate_lines(path).map_err(failure)?;

    loop {
        let deadline = timeout.map(|secs| {
            let mut extension = extend.map(Duration::from_secs);
            ReadTimeout::seconds(secs)
                .with_extension(move || extension.take().unwrap_or(Duration::ZERO))
        });

        match lines.advance(deadline) {
            Some(LineEvent::Line(line)) => {
                writeln!(out, "{line}").and_then(|()| out.flush()).map_err(|e| output_error(&e))?;
            }
            Some(LineEvent::Timeout) => {
                eprintln!("ixp: nothing read from {path} in time");
                return Ok(());
            }
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{Chunk, MemoryFs};

    fn follow_events(chunks: Vec<Chunk>, timeout: Option<u64>, extend: Option<u64>) -> String {
        let fs = MemoryFs::new();
        fs.add_stream("/event", chunks);
        let conn = Connection::connect_with("mem!test", &fs).unwrap();

        let mut out = Vec::new();
        follow(&conn, "/event", timeout, extend, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_every_line_until_end_of_file() {
        let text = follow_events(
            vec![Chunk::data("CreateTag 1\n"), Chunk::Stall, Chunk::data("FocusTag 1\n")],
            None,
            None,
        );
        assert_eq!(text, "CreateTag 1\nFocusTag 1\n");
    }

    #[test]
    fn timeout_stops_following() {
        let text = follow_events(
            vec![Chunk::data("CreateTag 1\n"), Chunk::Stall, Chunk::data("FocusTag 1\n")],
            Some(1),
            None,
        );
        assert_eq!(text, "CreateTag 1\n");
    }

    #[test]
    fn one_extension_per_line() {
        let chunks = vec![
            Chunk::Stall,
            Chunk::data("a\n"),
            Chunk::Stall,
            Chunk::data("b\n"),
            Chunk::Stall,
            Chunk::Stall,
            Chunk::data("c\n"),
        ];
        let text = follow_events(chunks, Some(1), Some(5));
        assert_eq!(text, "a\nb\n");
    }
}
