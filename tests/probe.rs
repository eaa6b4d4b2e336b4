use std::io::{Cursor, Write};
use vidmeta::{probe_path, probe_reader};

/// Minimal but complete ASF file: a header object carrying file
/// properties and one video stream.
fn asf_bytes() -> Vec<u8> {
    fn guid(time_low: u32, mid: u16, hi: u16, clock_hi: u8, clock_lo: u8, node: u64) -> Vec<u8> {
        let mut v = Vec::with_capacity(16);
        v.extend_from_slice(&time_low.to_le_bytes());
        v.extend_from_slice(&mid.to_le_bytes());
        v.extend_from_slice(&hi.to_le_bytes());
        v.push(clock_hi);
        v.push(clock_lo);
        v.extend_from_slice(&node.to_be_bytes()[2..]);
        v
    }
    fn object(guid_bytes: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(guid_bytes);
        v.extend_from_slice(&(payload.len() as u64 + 24).to_le_bytes());
        v.extend_from_slice(payload);
        v
    }

    let mut file_properties = Vec::new();
    file_properties.extend_from_slice(&guid(0, 0, 0, 0, 0, 0)); // file id
    file_properties.extend_from_slice(&1_000u64.to_le_bytes()); // file size
    file_properties.extend_from_slice(&0u64.to_le_bytes()); // creation date
    file_properties.extend_from_slice(&1u64.to_le_bytes()); // packet count
    file_properties.extend_from_slice(&150_000_000u64.to_le_bytes()); // 15 s
    file_properties.extend_from_slice(&150_000_000u64.to_le_bytes());
    file_properties.extend_from_slice(&0u64.to_le_bytes()); // preroll
    file_properties.extend_from_slice(&0x02u32.to_le_bytes()); // seekable
    file_properties.extend_from_slice(&8000u32.to_le_bytes());
    file_properties.extend_from_slice(&8000u32.to_le_bytes());
    file_properties.extend_from_slice(&628_000u32.to_le_bytes());

    let mut bih = Vec::new();
    bih.extend_from_slice(&40u32.to_le_bytes());
    bih.extend_from_slice(&640u32.to_le_bytes());
    bih.extend_from_slice(&480u32.to_le_bytes());
    bih.extend_from_slice(&1u16.to_le_bytes());
    bih.extend_from_slice(&24u16.to_le_bytes());
    bih.extend_from_slice(b"WMV3");
    bih.extend_from_slice(&[0u8; 20]);

    let mut type_data = Vec::new();
    type_data.extend_from_slice(&640u32.to_le_bytes());
    type_data.extend_from_slice(&480u32.to_le_bytes());
    type_data.push(0);
    type_data.extend_from_slice(&40u16.to_le_bytes());
    type_data.extend_from_slice(&bih);

    let mut stream_properties = Vec::new();
    stream_properties.extend_from_slice(&guid(
        0xBC19EFC0, 0x5B4D, 0x11CF, 0xA8, 0xFD, 0x00805F5C442B,
    )); // video media
    stream_properties.extend_from_slice(&guid(
        0x20FB5700, 0x5B55, 0x11CF, 0xA8, 0xFD, 0x00805F5C442B,
    )); // no error correction
    stream_properties.extend_from_slice(&0u64.to_le_bytes());
    stream_properties.extend_from_slice(&(type_data.len() as u32).to_le_bytes());
    stream_properties.extend_from_slice(&0u32.to_le_bytes());
    stream_properties.extend_from_slice(&1u16.to_le_bytes()); // stream 1
    stream_properties.extend_from_slice(&0u32.to_le_bytes());
    stream_properties.extend_from_slice(&type_data);

    let body = [
        object(
            &guid(0x8CABDCA1, 0xA947, 0x11CF, 0x8E, 0xE4, 0x00C00C205365),
            &file_properties,
        ),
        object(
            &guid(0xB7DC0791, 0xA9B7, 0x11CF, 0x8E, 0xE6, 0x00C00C205365),
            &stream_properties,
        ),
    ]
    .concat();

    let mut v = Vec::new();
    v.extend_from_slice(&guid(0x75B22630, 0x668E, 0x11CF, 0xA6, 0xD9, 0x00AA0062CE6C));
    v.extend_from_slice(&(body.len() as u64 + 30).to_le_bytes());
    v.extend_from_slice(&2u32.to_le_bytes());
    v.push(0x01);
    v.push(0x02);
    v.extend_from_slice(&body);
    v
}

fn avi_bytes() -> Vec<u8> {
    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(id);
        v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        v.extend_from_slice(payload);
        v
    }
    fn list(list_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"LIST");
        v.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
        v.extend_from_slice(list_type);
        v.extend_from_slice(body);
        v
    }

    let mut strh = Vec::new();
    strh.extend_from_slice(b"vids");
    strh.extend_from_slice(&[0u8; 16]); // handler, flags, priority, language, initial frames
    strh.extend_from_slice(&1u32.to_le_bytes()); // scale
    strh.extend_from_slice(&25u32.to_le_bytes()); // rate
    strh.extend_from_slice(&0u32.to_le_bytes()); // start
    strh.extend_from_slice(&250u32.to_le_bytes()); // length
    strh.extend_from_slice(&[0u8; 20]); // buffer, quality, sample size, rect

    let mut strf = Vec::new();
    strf.extend_from_slice(&40u32.to_le_bytes());
    strf.extend_from_slice(&640u32.to_le_bytes());
    strf.extend_from_slice(&480u32.to_le_bytes());
    strf.extend_from_slice(&1u16.to_le_bytes());
    strf.extend_from_slice(&24u16.to_le_bytes());
    strf.extend_from_slice(b"MP42");
    strf.extend_from_slice(&[0u8; 20]);

    let strl = list(b"strl", &[chunk(b"strh", &strh), chunk(b"strf", &strf)].concat());
    let hdrl = list(b"hdrl", &strl);

    let mut v = Vec::new();
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&(hdrl.len() as u32 + 4).to_le_bytes());
    v.extend_from_slice(b"AVI ");
    v.extend_from_slice(&hdrl);
    v
}

#[test]
fn extension_is_a_hint_not_authoritative() {
    // The name says AVI, the bytes say ASF; the content wins.
    let bytes = asf_bytes();
    let len = bytes.len() as u64;
    let media = probe_reader(Cursor::new(bytes), len, Some("avi"))
        .unwrap()
        .expect("ASF content should be recognized");
    assert_eq!(media.container, "ASF");
    assert_eq!(media.stream_count(), 1);
}

#[test]
fn matching_extension_parses_directly() {
    let bytes = avi_bytes();
    let len = bytes.len() as u64;
    let media = probe_reader(Cursor::new(bytes), len, Some("avi"))
        .unwrap()
        .expect("AVI content should be recognized");
    assert_eq!(media.container, "AVI RIFF");
}

#[test]
fn no_extension_falls_back_to_the_scan_order() {
    let bytes = avi_bytes();
    let len = bytes.len() as u64;
    let media = probe_reader(Cursor::new(bytes), len, None)
        .unwrap()
        .expect("AVI content should be recognized without a hint");
    assert_eq!(media.container, "AVI RIFF");
}

#[test]
fn unrecognized_content_is_none_not_an_error() {
    let bytes = vec![0x42u8; 256];
    let len = bytes.len() as u64;
    assert!(probe_reader(Cursor::new(bytes), len, Some("wmv"))
        .unwrap()
        .is_none());
}

#[test]
fn parsing_is_idempotent() {
    let bytes = asf_bytes();
    let len = bytes.len() as u64;
    let first = probe_reader(Cursor::new(bytes.clone()), len, Some("wmv")).unwrap();
    let second = probe_reader(Cursor::new(bytes), len, Some("wmv")).unwrap();
    assert_eq!(first, second);
    assert!(first.is_some());
}

#[test]
fn probe_path_uses_the_file_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.avi");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&avi_bytes())
        .unwrap();

    let media = probe_path(&path).unwrap().expect("file should parse");
    assert_eq!(media.container, "AVI RIFF");
}

#[test]
fn probe_path_propagates_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.wmv");
    assert!(probe_path(&missing).is_err());
}
