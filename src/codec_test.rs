use std::io::Read;

use super::*;

#[test]
fn test_none_is_passthrough() {
    let out = encode(CompressionMode::None, b"hello").unwrap();
    assert_eq!(out, b"hello");
}

#[test]
fn test_deflate_roundtrip() {
    let original = vec![b'a'; 10_000]; // highly compressible
    let compressed = encode(CompressionMode::Deflate, &original).unwrap();
    assert!(compressed.len() < original.len());

    let mut decoded = Vec::new();
    let reader: Box<dyn Read> = Box::new(compressed.as_slice());
    decode_reader(CompressionMode::Deflate, reader)
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_none_decode_is_passthrough() {
    let mut decoded = Vec::new();
    let reader: Box<dyn Read> = Box::new(b"raw".as_ref());
    decode_reader(CompressionMode::None, reader)
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, b"raw");
}
