//! Cassette format for recording and replaying transport sessions.

pub mod format;
pub mod recorder;
pub mod replayer;

pub use format::{Bytes, Cassette, Interaction};
pub use recorder::CassetteRecorder;
pub use replayer::{CassetteReplayer, ReplayError};
