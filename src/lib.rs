//! Scripting binding core for driving a window manager over 9P.
//!
//! A [`Connection`] mounts a file server through a [`ports::Transport`] and
//! exposes the handful of operations a configuration script needs: one-shot
//! reads and writes, create, remove, stat, and iterators over lines and
//! directory entries. Failures come back as [`Error`]; at the scripting
//! boundary they become a [`Failure`].

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod io;
pub mod logging;
pub mod ports;
pub mod script;
pub mod stat;

use clap::Parser;

pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use io::{DirIter, LineEvent, LineIter, ReadTimeout};
pub use script::{Failure, IntoScript, ScriptResult};
pub use stat::Stat;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> std::result::Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}
