//! 9P2000 stat records: wire decoding and the human-readable presentation.
//!
//! A stat record is `size[2]` followed by `size` bytes:
//! `type[2] dev[4] qid[13] mode[4] atime[4] mtime[4] length[8]
//! name[s] uid[s] gid[s] muid[s]`, all little-endian. Strings are
//! `len[2]` plus UTF-8 bytes. Directory reads return these records
//! back to back.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mode bit marking a directory.
pub const DMDIR: u32 = 0x8000_0000;
/// Qid type bit marking a directory.
pub const QTDIR: u8 = 0x80;
/// Qid type of a plain file.
pub const QTFILE: u8 = 0x00;

/// Fixed part of a record after the size prefix, with all four strings empty.
const FIXED_LEN: usize = 2 + 4 + 13 + 4 + 4 + 4 + 8 + 4 * 2;

const RWX: [&str; 8] = ["---", "--x", "-w-", "-wx", "r--", "r-x", "rw-", "rwx"];

/// `ctime(3)` layout without the trailing newline.
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Server-unique identity of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qid {
    /// `QTDIR`, `QTFILE`, ...
    pub qtype: u8,
    /// Bumped by the server on every modification.
    pub version: u32,
    /// Unique path number.
    pub path: u64,
}

impl Qid {
    /// Serialize to 13 bytes (wire format).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.qtype);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.path.to_le_bytes());
    }
}

/// One decoded directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Server type.
    #[serde(rename = "type")]
    pub kind: u16,
    /// Server subtype.
    pub dev: u32,
    /// File identity.
    pub qid: Qid,
    /// Permission bits and `DM*` flags.
    pub mode: u32,
    /// Last access, seconds since the epoch.
    pub atime: u32,
    /// Last modification, seconds since the epoch.
    pub mtime: u32,
    /// Length in bytes.
    pub length: u64,
    /// Last path element.
    pub name: String,
    /// Owner.
    pub uid: String,
    /// Group.
    pub gid: String,
    /// Last modifier.
    pub muid: String,
}

/// A stat record that does not fit the bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stat record truncated: needed {needed} bytes at offset {offset}, {available} available")]
pub struct DecodeError {
    /// Offset where the short field starts.
    pub offset: usize,
    /// Bytes the field needed.
    pub needed: usize,
    /// Bytes left in the message.
    pub available: usize,
}

impl Stat {
    /// Whether the `DMDIR` bit is set.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & DMDIR != 0
    }

    /// `ls -l` style permission string, e.g. `drwxr-xr-x`.
    ///
    /// Ten characters. wmii's Lua binding printed eleven, with a fixed `-`
    /// after the type character (`d-rwxr-xr-x`); scripts comparing against
    /// that layout need to drop the second character first.
    #[must_use]
    pub fn mode_string(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(if self.is_dir() { 'd' } else { '-' });
        for shift in [6, 3, 0] {
            out.push_str(RWX[((self.mode >> shift) & 7) as usize]);
        }
        out
    }

    /// Modification time as `ctime(3)` prints it in local time, without
    /// the trailing newline.
    #[must_use]
    pub fn time_string(&self) -> String {
        self.time_string_in(&Local)
    }

    /// Modification time in `ctime(3)` layout for the given zone.
    #[must_use]
    pub fn time_string_in<Tz>(&self, zone: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        DateTime::<Utc>::from_timestamp(i64::from(self.mtime), 0)
            .unwrap_or_default()
            .with_timezone(zone)
            .format(CTIME_FORMAT)
            .to_string()
    }

    /// The record plus its derived presentation strings.
    #[must_use]
    pub fn to_record(&self) -> StatRecord<'_> {
        StatRecord { stat: self, modestr: self.mode_string(), timestr: self.time_string() }
    }

    /// Decodes the single record at the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if `buf` is shorter than the record claims.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0;
        Self::decode_at(buf, &mut pos)
    }

    /// Decodes the record starting at `*pos` and advances `*pos` past it.
    ///
    /// Bytes inside the record beyond the fields above (9P2000.u
    /// extensions) are skipped. On error `*pos` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the record overruns `buf`.
    pub fn decode_at(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        let mut outer = Unpacker { buf, pos: *pos };
        let size = usize::from(outer.u16()?);
        let body = outer.take(size)?;

        let mut inner = Unpacker { buf: body, pos: 0 };
        let stat = Self {
            kind: inner.u16()?,
            dev: inner.u32()?,
            qid: Qid { qtype: inner.u8()?, version: inner.u32()?, path: inner.u64()? },
            mode: inner.u32()?,
            atime: inner.u32()?,
            mtime: inner.u32()?,
            length: inner.u64()?,
            name: inner.string()?,
            uid: inner.string()?,
            gid: inner.string()?,
            muid: inner.string()?,
        };

        *pos = outer.pos;
        Ok(stat)
    }

    /// Appends the wire encoding of this record to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let size_pos = buf.len();
        buf.extend_from_slice(&[0u8; 2]);

        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(&self.dev.to_le_bytes());
        self.qid.encode(buf);
        buf.extend_from_slice(&self.mode.to_le_bytes());
        buf.extend_from_slice(&self.atime.to_le_bytes());
        buf.extend_from_slice(&self.mtime.to_le_bytes());
        buf.extend_from_slice(&self.length.to_le_bytes());
        for s in [&self.name, &self.uid, &self.gid, &self.muid] {
            write_string(buf, s);
        }

        let stat_size = u16::try_from(buf.len() - size_pos - 2).unwrap_or(u16::MAX);
        buf[size_pos..size_pos + 2].copy_from_slice(&stat_size.to_le_bytes());
    }

    /// Wire encoding of this record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + FIXED_LEN + self.name.len());
        self.encode_into(&mut buf);
        buf
    }
}

/// A [`Stat`] with `modestr` and `timestr`, the shape script callers see.
#[derive(Debug, Serialize)]
pub struct StatRecord<'a> {
    #[serde(flatten)]
    stat: &'a Stat,
    /// Permission string.
    pub modestr: String,
    /// Modification time string.
    pub timestr: String,
}

/// Bounds-checked little-endian reader over one message.
struct Unpacker<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len().saturating_sub(self.pos);
        if n > available {
            return Err(DecodeError { offset: self.pos, needed: n, available });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = usize::from(self.u16()?);
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    let len = u16::try_from(s.len()).unwrap_or(u16::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&s.as_bytes()[..usize::from(len)]);
}
