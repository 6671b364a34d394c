//! Records one 9P session into a cassette file.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use super::format::{Cassette, Interaction};

/// Collects the transport calls of one mounted session and writes them as a
/// YAML cassette.
///
/// The session's address is taken from the first mount. Fids are tracked
/// from `open`/`create` results and `close` calls so a session that leaks
/// one is reported when the cassette is written.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    address: Option<String>,
    interactions: Vec<Interaction>,
    open_fids: BTreeSet<u64>,
}

impl CassetteRecorder {
    /// Create a recorder that will write to `path`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            address: None,
            interactions: Vec::new(),
            open_fids: BTreeSet::new(),
        }
    }

    /// Notes that `address` is being mounted. Only the first address is
    /// kept; a cassette replays a single server.
    pub fn mounted(&mut self, address: &str) {
        match &self.address {
            None => self.address = Some(address.to_string()),
            Some(first) if first != address => {
                warn!(first = %first, ignored = address, "second address in one recording");
            }
            Some(_) => {}
        }
    }

    /// Address of the recorded session, once something was mounted.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Appends one call. Sequence numbers are assigned in call order.
    pub fn record(&mut self, port: impl Into<String>, method: &str, input: Value, output: Value) {
        match method {
            "open" | "create" => {
                if let Some(fid) = output.pointer("/Ok/fid").and_then(Value::as_u64) {
                    self.open_fids.insert(fid);
                }
            }
            "close" => {
                if let Some(fid) = input.get("fid").and_then(Value::as_u64) {
                    self.open_fids.remove(&fid);
                }
            }
            _ => {}
        }

        let seq = u64::try_from(self.interactions.len()).unwrap_or(u64::MAX);
        self.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.to_string(),
            input,
            output,
        });
    }

    /// Fids opened during the session and not closed yet.
    #[must_use]
    pub fn open_fids(&self) -> Vec<u64> {
        self.open_fids.iter().copied().collect()
    }

    /// Number of interactions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Writes the cassette and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        if !self.open_fids.is_empty() {
            warn!(fids = ?self.open_fids, "recording ends with fids still open");
        }
        let cassette = Cassette {
            name: self.name,
            recorded_at: Utc::now(),
            address: self.address.unwrap_or_default(),
            interactions: self.interactions,
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, yaml)?;
        Ok(self.path)
    }
}
