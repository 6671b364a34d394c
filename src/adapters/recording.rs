//! Recording adapter for the [`Transport`] port.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::cassette::{Bytes, CassetteRecorder};
use crate::ports::{FileHandle, Mounter, OpenMode, Transport, TransportError};

/// Port name under which transport calls are recorded.
pub const PORT: &str = "ixp";

/// Records transport calls while delegating to an inner transport.
pub struct RecordingTransport {
    inner: Box<dyn Transport>,
    recorder: Rc<RefCell<CassetteRecorder>>,
}

impl RecordingTransport {
    /// Wraps `inner`, appending every call to `recorder`.
    pub fn new(inner: Box<dyn Transport>, recorder: Rc<RefCell<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }

    fn record(&self, method: &str, input: Value, output: Value) {
        self.recorder.borrow_mut().record(PORT, method, input, output);
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(error = %err, "unrecordable value");
        Value::Null
    })
}

/// Serializes a `Result` with the `{"Ok": v}` / `{"Err": e}` convention.
fn result_value<T: Serialize>(result: &Result<T, TransportError>) -> Value {
    match result {
        Ok(v) => json!({ "Ok": to_json(v) }),
        Err(e) => json!({ "Err": to_json(e) }),
    }
}

#[derive(Serialize)]
struct PathInput<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct OpenInput<'a> {
    path: &'a str,
    mode: OpenMode,
}

#[derive(Serialize)]
struct CreateInput<'a> {
    path: &'a str,
    perm: u32,
    mode: OpenMode,
}

#[derive(Serialize)]
struct ReadInput {
    fid: u32,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct WriteInput {
    fid: u32,
    data: Bytes,
}

impl Transport for RecordingTransport {
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, TransportError> {
        let result = self.inner.open(path, mode);
        let input = to_json(&OpenInput { path, mode });
        self.record("open", input, result_value(&result));
        result
    }

    fn create(
        &mut self,
        path: &str,
        perm: u32,
        mode: OpenMode,
    ) -> Result<FileHandle, TransportError> {
        let result = self.inner.create(path, perm, mode);
        let input = to_json(&CreateInput { path, perm, mode });
        self.record("create", input, result_value(&result));
        result
    }

    fn read(
        &mut self,
        file: &FileHandle,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let result = self.inner.read(file, buf, timeout);
        let input = to_json(&ReadInput {
            fid: file.fid,
            count: buf.len(),
            timeout_ms: timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        });
        let output = result.as_ref().map(|&n| Bytes::new(&buf[..n])).map_err(Clone::clone);
        self.record("read", input, result_value(&output));
        result
    }

    fn write(&mut self, file: &FileHandle, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.inner.write(file, data);
        let input = to_json(&WriteInput { fid: file.fid, data: Bytes::new(data) });
        self.record("write", input, result_value(&result));
        result
    }

    fn remove(&mut self, path: &str) -> Result<(), TransportError> {
        let result = self.inner.remove(path);
        self.record("remove", to_json(&PathInput { path }), result_value(&result));
        result
    }

    fn stat(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let result = self.inner.stat(path);
        let output = result.as_ref().map(|raw| Bytes::new(raw)).map_err(Clone::clone);
        self.record("stat", to_json(&PathInput { path }), result_value(&output));
        result
    }

    fn close(&mut self, file: FileHandle) {
        self.inner.close(file);
        self.record("close", json!({ "fid": file.fid }), Value::Null);
    }

    fn unmount(&mut self) {
        self.inner.unmount();
        self.record("unmount", json!({}), Value::Null);
    }
}

/// Mounts through another mounter and wraps the result in a
/// [`RecordingTransport`].
pub struct RecordingMounter<'a> {
    inner: &'a dyn Mounter,
    recorder: Rc<RefCell<CassetteRecorder>>,
}

impl<'a> RecordingMounter<'a> {
    /// Records sessions mounted by `inner` into `recorder`.
    pub fn new(inner: &'a dyn Mounter, recorder: Rc<RefCell<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl Mounter for RecordingMounter<'_> {
    fn mount(&self, address: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.recorder.borrow_mut().mounted(address);
        let transport = self.inner.mount(address)?;
        Ok(Box::new(RecordingTransport::new(transport, Rc::clone(&self.recorder))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{Chunk, MemoryFs, ENOENT};
    use crate::cassette::Cassette;

    fn recorder(name: &str) -> (std::path::PathBuf, Rc<RefCell<CassetteRecorder>>) {
        let dir = std::env::temp_dir().join(format!("ixp_recording_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.cassette.yaml");
        let recorder = CassetteRecorder::new(&path, name);
        (path, Rc::new(RefCell::new(recorder)))
    }

    #[test]
    fn records_calls_and_their_results() {
        let (path, recorder) = recorder("calls");
        let fs = MemoryFs::new();
        fs.add_file("/ctl", "view 1\n");

        {
            let mounter = RecordingMounter::new(&fs, Rc::clone(&recorder));
            let mut t = mounter.mount("mem!test").unwrap();
            let h = t.open("/ctl", OpenMode::Read).unwrap();
            let mut buf = [0u8; 16];
            assert_eq!(t.read(&h, &mut buf, None).unwrap(), 7);
            t.close(h);
            assert!(t.open("/missing", OpenMode::Read).is_err());
            t.unmount();
        }

        let recorder = Rc::try_unwrap(recorder).unwrap().into_inner();
        assert_eq!(recorder.len(), 5);
        assert_eq!(recorder.address(), Some("mem!test"));
        assert!(recorder.open_fids().is_empty());
        recorder.finish().unwrap();

        let cassette = Cassette::load(&path).unwrap();
        let methods: Vec<&str> =
            cassette.interactions.iter().map(|i| i.method.as_str()).collect();
        assert_eq!(methods, ["open", "read", "close", "open", "unmount"]);
        assert_eq!(cassette.interactions[1].output, json!({"Ok": "view 1\n"}));
        assert_eq!(
            cassette.interactions[3].output,
            json!({"Err": {"failed": {"message": "file not found", "code": ENOENT}}})
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn timed_out_reads_are_recorded() {
        let (_path, recorder) = recorder("timeouts");
        let fs = MemoryFs::new();
        fs.add_stream("/event", [Chunk::Stall]);

        let mut t = RecordingTransport::new(Box::new(fs.transport()), Rc::clone(&recorder));
        let h = t.open("/event", OpenMode::Read).unwrap();
        let err = t.read(&h, &mut [0u8; 8], Some(Duration::from_millis(1500))).unwrap_err();
        assert_eq!(err, TransportError::TimedOut);

        let recorder = recorder.borrow();
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.open_fids(), [u64::from(h.fid)]);
    }
}
