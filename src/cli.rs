//! CLI argument definitions.

use clap::{Parser, Subcommand};

/// Top-level CLI parser for `ixp`.
#[derive(Debug, Parser)]
#[command(name = "ixp", version, about = "Read and write a window manager's 9P file tree")]
pub struct Cli {
    /// Server address, `<transport>!<locator>`. Defaults to `$WMII_ADDRESS`,
    /// then to the wmii socket in the user's namespace directory.
    ///
    /// Only `mem!<fixture.yaml>` and `replay!<cassette.yaml>` can be
    /// mounted; a `unix!` or `tcp!` address needs an external 9P client.
    #[arg(short, long, global = true)]
    pub address: Option<String>,
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the contents of a file (at most 4096 bytes).
    Read {
        /// File to read.
        path: String,
    },
    /// Write to an existing file.
    Write {
        /// File to write.
        path: String,
        /// Words to write, joined by spaces. Read from stdin when absent.
        data: Vec<String>,
    },
    /// Create a file, optionally writing to it.
    Create {
        /// File to create.
        path: String,
        /// Words to write, joined by spaces.
        data: Vec<String>,
    },
    /// Remove a file.
    Remove {
        /// File to remove.
        path: String,
    },
    /// Show a file's metadata.
    Stat {
        /// File to stat.
        path: String,
        /// Print the record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List a directory.
    Ls {
        /// Directory to list.
        path: String,
        /// Long listing: mode, owner, group, size, time, name.
        #[arg(short, long)]
        long: bool,
    },
    /// Print a file line by line as it is read.
    Lines {
        /// File to follow, such as `/event`.
        path: String,
        /// Stop when no data arrives for this many seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// On the first timeout of each wait, keep waiting this many more
        /// seconds.
        #[arg(long, value_name = "SECS", requires = "timeout")]
        extend: Option<u64>,
    },
}
