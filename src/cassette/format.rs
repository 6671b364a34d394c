//! Cassette data structures for recording and replaying a 9P session.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded call on a transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    /// Sequence number (assigned automatically by the recorder).
    pub seq: u64,
    /// Port name; `ixp` for transport calls.
    pub port: String,
    /// Transport method invoked.
    pub method: String,
    /// Arguments of the call.
    pub input: serde_json::Value,
    /// What the call returned.
    pub output: serde_json::Value,
}

/// A cassette containing a sequence of recorded interactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cassette {
    /// Human-readable name for this cassette.
    pub name: String,
    /// When this cassette was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Address of the server the session was mounted from.
    pub address: String,
    /// Ordered list of interactions.
    pub interactions: Vec<Interaction>,
}

impl Cassette {
    /// Reads a cassette from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a cassette.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let yaml = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&yaml).map_err(std::io::Error::other)
    }
}

/// Byte payload stored as text when it is UTF-8, so cassettes stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Bytes {
    /// UTF-8 payload.
    Text(String),
    /// Anything else, such as packed stat records.
    Raw(Vec<u8>),
}

impl Bytes {
    /// Wraps `data`, choosing the text form for UTF-8 without control
    /// characters other than newline and tab.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        match std::str::from_utf8(data) {
            Ok(text) if text.chars().all(|c| !c.is_control() || c == '\n' || c == '\t') => {
                Self::Text(text.to_string())
            }
            _ => Self::Raw(data.to_vec()),
        }
    }

    /// The payload bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw(raw) => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_cassette() -> Cassette {
        Cassette {
            name: "wmii-session".into(),
            recorded_at: Utc::now(),
            address: "unix!/tmp/ns.bart.:0/wmii".into(),
            interactions: vec![
                Interaction {
                    seq: 0,
                    port: "ixp".into(),
                    method: "open".into(),
                    input: json!({"path": "/ctl", "mode": "write"}),
                    output: json!({"Ok": {"fid": 1, "iounit": 8168, "qid_type": 0}}),
                },
                Interaction {
                    seq: 1,
                    port: "ixp".into(),
                    method: "write".into(),
                    input: json!({"fid": 1, "data": "view 2\n"}),
                    output: json!({"Ok": 7}),
                },
            ],
        }
    }

    #[test]
    fn yaml_round_trip() {
        let cassette = sample_cassette();
        let yaml = serde_yaml::to_string(&cassette).expect("serialize");
        let deserialized: Cassette = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(cassette, deserialized);
    }

    #[test]
    fn bytes_prefer_text() {
        assert_eq!(Bytes::new(b"view 1\n"), Bytes::Text("view 1\n".into()));
        assert_eq!(Bytes::new(&[0xff, 0x00]), Bytes::Raw(vec![0xff, 0x00]));
        assert_eq!(Bytes::new(&[0xff, 0x00]).as_slice(), [0xff, 0x00]);
        assert_eq!(Bytes::new(&[0x41, 0x00]), Bytes::Raw(vec![0x41, 0x00]));

        let raw: Bytes = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert_eq!(raw.as_slice(), [1, 2, 3]);
    }
}
