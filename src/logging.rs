//! Diagnostic logging for the `ixp` binary.

use std::io::IsTerminal;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a stderr subscriber filtered by `$RUST_LOG`. Without it only
/// warnings are shown. Calling this twice is harmless.
pub fn set_up_logging() {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(should_emit_colors())
        .with_writer(std::io::stderr)
        .compact();

    let filter_layer =
        EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy();

    let _ = tracing_subscriber::registry().with(filter_layer).with(fmt_layer).try_init();
}

fn should_emit_colors() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}
