use std::fs::OpenOptions;
use std::io::{Read, Write};

use super::*;

fn fixture(bytes: &[u8]) -> File {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contents.dbx");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .unwrap();
        f.write_all(bytes).unwrap();
    }
    // leak the tempdir so the file stays valid for the test's lifetime
    std::mem::forget(dir);
    OpenOptions::new().read(true).write(true).open(&path).unwrap()
}

#[test]
fn test_reads_exact_range() {
    let file = fixture(b"0123456789");
    let mut stream = RetrieveStream::new(file, 3, 4);
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"3456");
}

#[test]
fn test_read_zero_len_does_not_advance() {
    let file = fixture(b"abcdef");
    let mut stream = RetrieveStream::new(file, 0, 6);
    let mut buf = [0u8; 0];
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert_eq!(stream.available(), 6);
}

#[test]
fn test_read_at_eof_returns_zero() {
    let file = fixture(b"ab");
    let mut stream = RetrieveStream::new(file, 0, 2);
    let mut buf = [0u8; 2];
    assert_eq!(stream.read(&mut buf).unwrap(), 2);
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_skip_and_available() {
    let file = fixture(b"0123456789");
    let mut stream = RetrieveStream::new(file, 0, 10);
    assert_eq!(stream.skip(4), 4);
    assert_eq!(stream.available(), 6);
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"456789");
}

#[test]
fn test_skip_clamps_to_length() {
    let file = fixture(b"01234");
    let mut stream = RetrieveStream::new(file, 0, 5);
    assert_eq!(stream.skip(100), 5);
    assert_eq!(stream.available(), 0);
}

#[test]
fn test_independent_cursors_over_shared_file() {
    let file = fixture(b"0123456789");
    let mut a = RetrieveStream::new(file.try_clone().unwrap(), 0, 5);
    let mut b = RetrieveStream::new(file, 5, 5);
    let (mut oa, mut ob) = (Vec::new(), Vec::new());
    a.read_to_end(&mut oa).unwrap();
    b.read_to_end(&mut ob).unwrap();
    assert_eq!(oa, b"01234");
    assert_eq!(ob, b"56789");
}
