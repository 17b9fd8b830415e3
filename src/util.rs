//! Small helpers shared by the store and catalog binary codecs.

use std::convert::TryInto;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

pub(crate) fn write_u32(buf: &mut Vec<u8>, n: u32) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub(crate) fn write_u64(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub(crate) fn write_i64(buf: &mut Vec<u8>, n: i64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub(crate) fn write_u8(buf: &mut Vec<u8>, n: u8) {
    buf.push(n);
}

pub(crate) fn write_utf8(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    write_u32(buf, bytes.len().try_into().unwrap());
    buf.extend_from_slice(bytes);
}

/// A cursor over an in-memory byte slice used while decoding the
/// depth-first catalog record and the index-value sections.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Cursor<'a> {
        Cursor { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.pos + n > self.buf.len() {
            Err(Error::invalid_argument(format!(
                "truncated record: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len()
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let v = u64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        self.need(8)?;
        let v = i64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    pub(crate) fn read_utf8(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        self.need(len)?;
        let s = String::from_utf8(self.buf[self.pos..self.pos + len].to_vec())
            .map_err(|e| Error::invalid_argument(e.to_string()))?;
        self.pos += len;
        Ok(s)
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Write `contents` to `path` via a temp file in the same directory
/// followed by a rename, so a reader never observes a half-written
/// file. Used for `metadata.dbx`, `collections.dbx` and `indices.dbx`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::invalid_argument(format!("no parent directory for {}", path.display()))
    })?;
    let tmp_name = format!(
        ".{}.tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("xantippe")
    );
    let tmp_path = dir.join(tmp_name);
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Split an absolute URI (`/db/data/foo`) into segments: leading `/`
/// required, empty segments forbidden except for the root itself
/// (`"/"`).
pub(crate) fn split_uri(uri: &str) -> Result<Vec<&str>> {
    if !uri.starts_with('/') {
        return Err(Error::invalid_argument(format!(
            "uri must be absolute: {}",
            uri
        )));
    }
    if uri == "/" {
        return Ok(vec![]);
    }
    let trimmed = &uri[1..];
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::invalid_argument(format!(
            "empty path segment in uri: {}",
            uri
        )));
    }
    Ok(segments)
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
