//! Transport adapters and the address dispatch that picks one.
//!
//! Addresses have the form `<transport>!<locator>`:
//!
//! - `mem!<fixture.yaml>` mounts an in-memory tree described by a YAML
//!   fixture ([`memory::Fixture`]).
//! - `replay!<cassette.yaml>` replays a recorded session.
//!
//! Anything else fails to mount.

pub mod memory;
pub mod recording;
pub mod replaying;

use std::path::Path;

use tracing::debug;

use crate::ports::{Mounter, Transport, TransportError};

pub use memory::{MemoryFs, MemoryTransport};
pub use recording::{RecordingMounter, RecordingTransport};
pub use replaying::ReplayingTransport;

/// Mounts the transports this crate ships.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMounter;

impl Mounter for DefaultMounter {
    fn mount(&self, address: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (transport, locator) = address.split_once('!').ok_or_else(|| {
            TransportError::with_code(
                format!("malformed address {address:?}, expected <transport>!<locator>"),
                memory::EINVAL,
            )
        })?;
        debug!(transport, locator, "dispatch");

        match transport {
            "mem" => Ok(Box::new(MemoryFs::load(Path::new(locator))?.transport())),
            "replay" => Ok(Box::new(ReplayingTransport::load(Path::new(locator))?)),
            other => Err(TransportError::failed(format!(
                "no client for transport {other:?}; use a mem!<fixture.yaml> or \
                 replay!<cassette.yaml> address"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::OpenMode;

    #[test]
    fn unknown_transport_is_refused() {
        let err = DefaultMounter.mount("tcp!localhost!564").err().unwrap();
        assert!(err.to_string().contains("no client for transport \"tcp\""));
        assert!(err.to_string().contains("use a mem!<fixture.yaml> or replay!<cassette.yaml>"));
    }

    #[test]
    fn default_namespace_address_explains_itself() {
        let err = DefaultMounter.mount("unix!/tmp/ns.bart.:0/wmii").err().unwrap();
        assert!(err.to_string().starts_with("no client for transport \"unix\"; use a mem!"));
    }

    #[test]
    fn address_without_separator_is_malformed() {
        let err = DefaultMounter.mount("/tmp/ns.bart.:0/wmii").err().unwrap();
        assert_eq!(err.code(), Some(memory::EINVAL));
    }

    #[test]
    fn mem_address_loads_a_fixture() {
        let dir = std::env::temp_dir().join("ixp_default_mounter");
        std::fs::create_dir_all(&dir).unwrap();
        let fixture = dir.join("wmii.yaml");
        std::fs::write(&fixture, "files:\n  /ctl: \"view 1\\n\"\n").unwrap();

        let mut t = DefaultMounter.mount(&format!("mem!{}", fixture.display())).unwrap();
        let h = t.open("/ctl", OpenMode::Read).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(t.read(&h, &mut buf, None).unwrap(), 7);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_fixture_fails_to_mount() {
        let err = DefaultMounter.mount("mem!/nonexistent/fixture.yaml").err().unwrap();
        assert_eq!(err.code(), Some(memory::ENOENT));
    }
}
