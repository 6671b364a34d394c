//! Binary entrypoint for the `ixp` CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    ixp_script::logging::set_up_logging();

    // Recording is handled in commands::dispatch via IXP_RECORD=<file>.
    match ixp_script::run(std::env::args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
