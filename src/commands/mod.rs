//! Command dispatch and handlers.

pub mod file;
pub mod lines;
pub mod stat;

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use crate::adapters::{DefaultMounter, RecordingMounter};
use crate::cassette::CassetteRecorder;
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::connection::Connection;
use crate::script::Failure;

/// Dispatch a parsed command line to its handler.
///
/// When `IXP_RECORD` names a file, every transport call is recorded and the
/// cassette is written there once the command finishes, even on error.
///
/// # Errors
///
/// Returns an error string if mounting or the command fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let settings = Settings::from_env(cli.address.as_deref());
    debug!(address = %settings.address, "settings resolved");

    let recorder = settings
        .record
        .as_ref()
        .map(|path| Rc::new(RefCell::new(CassetteRecorder::new(path, "ixp-session"))));

    let result = {
        let connection = match &recorder {
            Some(recorder) => {
                let mounter = RecordingMounter::new(&DefaultMounter, Rc::clone(recorder));
                Connection::connect_with(&settings.address, &mounter)
            }
            None => Connection::connect(&settings.address),
        };
        connection.map_err(|err| Failure::from(err).to_string()).and_then(|connection| {
            let mut out = io::stdout().lock();
            let mut input = io::stdin().lock();
            run(&connection, &cli.command, &mut out, &mut input)
        })
    };

    if let Some(recorder) = recorder {
        finish_recording(recorder)?;
    }

    result
}

/// Run one command against an open connection.
///
/// # Errors
///
/// Returns the failure text of the first operation that fails.
pub fn run(
    connection: &Connection,
    command: &Command,
    out: &mut dyn Write,
    input: &mut dyn Read,
) -> Result<(), String> {
    match command {
        Command::Read { path } => file::read(connection, path, out),
        Command::Write { path, data } => {
            let data = match words(data) {
                Some(data) => data,
                None => read_input(input)?,
            };
            file::write(connection, path, &data)
        }
        Command::Create { path, data } => file::create(connection, path, words(data).as_deref()),
        Command::Remove { path } => file::remove(connection, path),
        Command::Stat { path, json } => stat::stat(connection, path, *json, out),
        Command::Ls { path, long } => stat::ls(connection, path, *long, out),
        Command::Lines { path, timeout, extend } => {
            lines::follow(connection, path, *timeout, *extend, out)
        }
    }
}

/// Joins argument words the way `wmiir` does; `None` when there are none.
fn words(data: &[String]) -> Option<Vec<u8>> {
    if data.is_empty() {
        None
    } else {
        Some(data.join(" ").into_bytes())
    }
}

fn read_input(input: &mut dyn Read) -> Result<Vec<u8>, String> {
    let mut data = Vec::new();
    input.read_to_end(&mut data).map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(data)
}

fn finish_recording(recorder: Rc<RefCell<CassetteRecorder>>) -> Result<(), String> {
    let recorder = Rc::try_unwrap(recorder)
        .map_err(|_| "recording still in use when the command finished".to_string())?
        .into_inner();
    let path: PathBuf =
        recorder.finish().map_err(|e| format!("failed to write cassette: {e}"))?;
    eprintln!("Recording saved to: {}", path.display());
    Ok(())
}

/// Converts a core error into the CLI's error text.
pub(crate) fn failure(err: crate::Error) -> String {
    Failure::from(err).to_string()
}

/// Maps an output error to the CLI's error text.
pub(crate) fn output_error(err: &io::Error) -> String {
    format!("failed to write output: {err}")
}
