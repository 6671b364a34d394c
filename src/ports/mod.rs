//! Port traits defining external boundaries.
//!
//! The binding core talks to the file server only through these traits.
//! Implementations live in `src/adapters/`.

pub mod transport;

pub use transport::{
    FileHandle, Mounter, OpenMode, Transport, TransportError, DEFAULT_IOUNIT, MAX_IOUNIT,
};
