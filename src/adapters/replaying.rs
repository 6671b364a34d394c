//! Replaying adapter for the [`Transport`] port.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use super::recording::PORT;
use crate::cassette::{Bytes, Cassette, CassetteReplayer};
use crate::ports::{FileHandle, OpenMode, Transport, TransportError};

/// Serves transport calls from a recorded cassette.
///
/// Calls are answered in recorded order per method; arguments are not
/// compared. A call the cassette cannot answer fails instead of panicking.
#[derive(Debug)]
pub struct ReplayingTransport {
    replayer: CassetteReplayer,
}

impl ReplayingTransport {
    /// Creates a replaying transport from a cassette replayer.
    #[must_use]
    pub fn new(replayer: CassetteReplayer) -> Self {
        Self { replayer }
    }

    /// Loads a YAML cassette file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let cassette = Cassette::load(path).map_err(|e| {
            let message = format!("failed to load cassette {}: {e}", path.display());
            match e.raw_os_error() {
                Some(code) => TransportError::with_code(message, code),
                None => TransportError::failed(message),
            }
        })?;
        trace!(name = %cassette.name, calls = cassette.interactions.len(), "cassette loaded");
        Ok(Self::new(CassetteReplayer::new(&cassette)))
    }

    /// Interactions not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replayer.remaining()
    }

    fn next_output(&mut self, method: &str) -> Result<Value, TransportError> {
        self.replayer
            .next_interaction(PORT, method)
            .map(|interaction| interaction.output.clone())
            .map_err(|e| TransportError::failed(e.to_string()))
    }

    /// Replays a `Result` recorded as `{"Ok": v}` or `{"Err": e}`.
    fn replay_result<T: DeserializeOwned>(&mut self, method: &str) -> Result<T, TransportError> {
        let output = self.next_output(method)?;
        if let Some(err) = output.get("Err") {
            let err: TransportError = serde_json::from_value(err.clone())
                .map_err(|e| corrupt(method, &e))?;
            return Err(err);
        }
        let value = output.get("Ok").cloned().unwrap_or(output);
        serde_json::from_value(value).map_err(|e| corrupt(method, &e))
    }

    fn replay_unit(&mut self, method: &str) {
        if let Err(err) = self.next_output(method) {
            warn!(method, error = %err, "unrecorded call");
        }
    }
}

fn corrupt(method: &str, err: &serde_json::Error) -> TransportError {
    TransportError::failed(format!("ixp::{method}: unreadable recorded output: {err}"))
}

impl Transport for ReplayingTransport {
    fn open(&mut self, _path: &str, _mode: OpenMode) -> Result<FileHandle, TransportError> {
        self.replay_result("open")
    }

    fn create(
        &mut self,
        _path: &str,
        _perm: u32,
        _mode: OpenMode,
    ) -> Result<FileHandle, TransportError> {
        self.replay_result("create")
    }

    fn read(
        &mut self,
        _file: &FileHandle,
        buf: &mut [u8],
        _timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let data: Bytes = self.replay_result("read")?;
        let data = data.as_slice();
        if data.len() > buf.len() {
            return Err(TransportError::failed(format!(
                "recorded read of {} bytes does not fit a {}-byte buffer",
                data.len(),
                buf.len()
            )));
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, _file: &FileHandle, _data: &[u8]) -> Result<usize, TransportError> {
        self.replay_result("write")
    }

    fn remove(&mut self, _path: &str) -> Result<(), TransportError> {
        self.replay_result("remove")
    }

    fn stat(&mut self, _path: &str) -> Result<Vec<u8>, TransportError> {
        let raw: Bytes = self.replay_result("stat")?;
        Ok(raw.as_slice().to_vec())
    }

    fn close(&mut self, _file: FileHandle) {
        self.replay_unit("close");
    }

    fn unmount(&mut self) {
        self.replay_unit("unmount");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::Interaction;
    use chrono::Utc;
    use serde_json::json;

    fn replaying(calls: Vec<(&str, Value)>) -> ReplayingTransport {
        let interactions = calls
            .into_iter()
            .zip(0..)
            .map(|((method, output), seq)| Interaction {
                seq,
                port: PORT.into(),
                method: method.into(),
                input: json!({}),
                output,
            })
            .collect();
        let cassette = Cassette {
            name: "test".into(),
            recorded_at: Utc::now(),
            address: "mem!test".into(),
            interactions,
        };
        ReplayingTransport::new(CassetteReplayer::new(&cassette))
    }

    #[test]
    fn replays_recorded_results() {
        let mut t = replaying(vec![
            ("open", json!({"Ok": {"fid": 3, "iounit": 64, "qid_type": 0}})),
            ("read", json!({"Ok": "view 1\n"})),
            ("read", json!({"Ok": ""})),
            ("close", Value::Null),
        ]);

        let h = t.open("/ctl", OpenMode::Read).unwrap();
        assert_eq!(h, FileHandle { fid: 3, iounit: 64, qid_type: 0 });
        let mut buf = [0u8; 64];
        assert_eq!(t.read(&h, &mut buf, None).unwrap(), 7);
        assert_eq!(&buf[..7], b"view 1\n");
        assert_eq!(t.read(&h, &mut buf, None).unwrap(), 0);
        t.close(h);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn replays_recorded_errors() {
        let mut t = replaying(vec![
            ("open", json!({"Err": {"failed": {"message": "file not found", "code": 2}}})),
            ("read", json!({"Err": "timed_out"})),
        ]);

        let err = t.open("/missing", OpenMode::Read).unwrap_err();
        assert_eq!(err, TransportError::with_code("file not found", 2));
        let h = FileHandle { fid: 1, iounit: 0, qid_type: 0 };
        let err = t.read(&h, &mut [0u8; 8], Some(Duration::from_secs(1))).unwrap_err();
        assert_eq!(err, TransportError::TimedOut);
    }

    #[test]
    fn binary_reads_come_back_byte_for_byte() {
        let mut t = replaying(vec![("read", json!({"Ok": [0, 255, 10]}))]);
        let h = FileHandle { fid: 1, iounit: 0, qid_type: 0 };
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&h, &mut buf, None).unwrap(), 3);
        assert_eq!(buf[..3], [0, 255, 10]);
    }

    #[test]
    fn oversized_recorded_read_is_an_error() {
        let mut t = replaying(vec![("read", json!({"Ok": "too long"}))]);
        let h = FileHandle { fid: 1, iounit: 0, qid_type: 0 };
        assert!(t.read(&h, &mut [0u8; 2], None).is_err());
    }

    #[test]
    fn exhausted_cassette_fails_the_call() {
        let mut t = replaying(vec![]);
        let err = t.remove("/tag/1").unwrap_err();
        assert!(err.to_string().contains("cassette exhausted"));
        t.unmount();
    }

    #[test]
    fn missing_cassette_file_carries_the_os_code() {
        let err = ReplayingTransport::load(Path::new("/nonexistent/ixp.cassette.yaml"))
            .unwrap_err();
        assert_eq!(err.code(), Some(2));
    }
}
