use std::io::Cursor;
use vidmeta::model::{ParseOutcome, StreamDescriptor};
use vidmeta::{ByteCursor, ByteOrder, ParseError, asf};

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

fn header_object_guid() -> Vec<u8> {
    guid(0x75B22630, 0x668E, 0x11CF, 0xA6, 0xD9, 0x00AA0062CE6C)
}

fn file_properties_guid() -> Vec<u8> {
    guid(0x8CABDCA1, 0xA947, 0x11CF, 0x8E, 0xE4, 0x00C00C205365)
}

fn stream_properties_guid() -> Vec<u8> {
    guid(0xB7DC0791, 0xA9B7, 0x11CF, 0x8E, 0xE6, 0x00C00C205365)
}

fn audio_media_guid() -> Vec<u8> {
    guid(0xF8699E40, 0x5B4D, 0x11CF, 0xA8, 0xFD, 0x00805F5C442B)
}

fn video_media_guid() -> Vec<u8> {
    guid(0xBC19EFC0, 0x5B4D, 0x11CF, 0xA8, 0xFD, 0x00805F5C442B)
}

fn no_error_correction_guid() -> Vec<u8> {
    guid(0x20FB5700, 0x5B55, 0x11CF, 0xA8, 0xFD, 0x00805F5C442B)
}

fn header_extension_guid() -> Vec<u8> {
    guid(0x5FBF03B5, 0xA92E, 0x11CF, 0x8E, 0xE3, 0x00C00C205365)
}

fn reserved1_guid() -> Vec<u8> {
    guid(0xABD3D211, 0xA9BA, 0x11CF, 0x8E, 0xE6, 0x00C00C205365)
}

fn extended_stream_properties_guid() -> Vec<u8> {
    guid(0x14E6A5CB, 0xC672, 0x4332, 0x83, 0x99, 0xA96952065B5A)
}

/// GUID-tagged object: guid + declared size (payload + 24-byte header).
fn object(guid_bytes: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(guid_bytes);
    v.extend_from_slice(&(payload.len() as u64 + 24).to_le_bytes());
    v.extend_from_slice(payload);
    v
}

fn file_properties_payload(play_duration_secs: u64) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&guid(0, 0, 0, 0, 0, 0)); // file id
    v.extend_from_slice(&1_000_000u64.to_le_bytes()); // file size
    v.extend_from_slice(&0u64.to_le_bytes()); // creation date
    v.extend_from_slice(&10u64.to_le_bytes()); // packet count
    v.extend_from_slice(&(play_duration_secs * 10_000_000).to_le_bytes());
    v.extend_from_slice(&(play_duration_secs * 10_000_000).to_le_bytes()); // send duration
    v.extend_from_slice(&0u64.to_le_bytes()); // preroll
    v.extend_from_slice(&0x02u32.to_le_bytes()); // flags: seekable
    v.extend_from_slice(&8000u32.to_le_bytes()); // min packet size
    v.extend_from_slice(&8000u32.to_le_bytes()); // max packet size
    v.extend_from_slice(&628_000u32.to_le_bytes()); // max bitrate
    v
}

fn bitmapinfoheader(width: u32, height: u32, compression: &[u8; 4]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&40u32.to_le_bytes()); // header size, no extra data
    v.extend_from_slice(&width.to_le_bytes());
    v.extend_from_slice(&height.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes()); // planes
    v.extend_from_slice(&24u16.to_le_bytes()); // bits per pixel
    v.extend_from_slice(compression);
    v.extend_from_slice(&(width * height * 3).to_le_bytes()); // image size
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v
}

fn video_stream_payload(index: u16, width: u32, height: u32) -> Vec<u8> {
    // width + height + reserved + format size + BITMAPINFOHEADER
    let mut type_data = Vec::new();
    type_data.extend_from_slice(&width.to_le_bytes());
    type_data.extend_from_slice(&height.to_le_bytes());
    type_data.push(0); // reserved flags
    type_data.extend_from_slice(&40u16.to_le_bytes()); // format data size
    type_data.extend_from_slice(&bitmapinfoheader(width, height, b"WMV3"));

    let mut v = Vec::new();
    v.extend_from_slice(&video_media_guid());
    v.extend_from_slice(&no_error_correction_guid());
    v.extend_from_slice(&0u64.to_le_bytes()); // time offset
    v.extend_from_slice(&(type_data.len() as u32).to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes()); // ecc length
    v.extend_from_slice(&index.to_le_bytes()); // flags: stream number
    v.extend_from_slice(&0u32.to_le_bytes()); // reserved
    v.extend_from_slice(&type_data);
    v
}

fn audio_stream_payload(index: u16) -> Vec<u8> {
    // WAVEFORMATEX with no codec-specific data
    let mut type_data = Vec::new();
    type_data.extend_from_slice(&0x0161u16.to_le_bytes()); // codec id: WMA2
    type_data.extend_from_slice(&2u16.to_le_bytes()); // channels
    type_data.extend_from_slice(&44100u32.to_le_bytes()); // sample rate
    type_data.extend_from_slice(&16000u32.to_le_bytes()); // bytes/sec
    type_data.extend_from_slice(&1u16.to_le_bytes()); // block align
    type_data.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    type_data.extend_from_slice(&0u16.to_le_bytes()); // codec data size

    let mut v = Vec::new();
    v.extend_from_slice(&audio_media_guid());
    v.extend_from_slice(&no_error_correction_guid());
    v.extend_from_slice(&0u64.to_le_bytes());
    v.extend_from_slice(&(type_data.len() as u32).to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&index.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&type_data);
    v
}

fn extended_stream_properties_payload(
    stream_number: u16,
    data_bitrate: u32,
    avg_time_per_frame: u64,
) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&0u64.to_le_bytes()); // start time
    v.extend_from_slice(&0u64.to_le_bytes()); // end time
    v.extend_from_slice(&data_bitrate.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes()); // buffer size
    v.extend_from_slice(&0u32.to_le_bytes()); // initial buffer fullness
    v.extend_from_slice(&0u32.to_le_bytes()); // alternate data bitrate
    v.extend_from_slice(&0u32.to_le_bytes()); // alternate buffer size
    v.extend_from_slice(&0u32.to_le_bytes()); // alternate initial fullness
    v.extend_from_slice(&0u32.to_le_bytes()); // max object size
    v.extend_from_slice(&0x02u32.to_le_bytes()); // flags: seekable
    v.extend_from_slice(&stream_number.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes()); // language id
    v.extend_from_slice(&avg_time_per_frame.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes()); // stream name count
    v.extend_from_slice(&0u16.to_le_bytes()); // payload extension count
    v
}

fn header_extension_payload(sub_objects: &[Vec<u8>]) -> Vec<u8> {
    let data: Vec<u8> = sub_objects.concat();
    let mut v = Vec::new();
    v.extend_from_slice(&reserved1_guid());
    v.extend_from_slice(&6u16.to_le_bytes());
    v.extend_from_slice(&(data.len() as u32).to_le_bytes());
    v.extend_from_slice(&data);
    v
}

fn asf_file(reserved2: u8, objects: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = objects.concat();
    let mut v = Vec::new();
    v.extend_from_slice(&header_object_guid());
    v.extend_from_slice(&(body.len() as u64 + 30).to_le_bytes());
    v.extend_from_slice(&(objects.len() as u32).to_le_bytes());
    v.push(0x01); // reserved1
    v.push(reserved2);
    v.extend_from_slice(&body);
    v
}

fn parse(bytes: Vec<u8>) -> Result<ParseOutcome, ParseError> {
    let len = bytes.len() as u64;
    let mut cur = ByteCursor::new(Cursor::new(bytes), len, ByteOrder::Little);
    asf::parse(&mut cur)
}

fn full_fixture(reserved2: u8) -> Vec<u8> {
    asf_file(
        reserved2,
        &[
            object(&file_properties_guid(), &file_properties_payload(30)),
            object(&stream_properties_guid(), &video_stream_payload(1, 1280, 720)),
            object(&stream_properties_guid(), &audio_stream_payload(2)),
            object(
                &header_extension_guid(),
                &header_extension_payload(&[
                    // 400_000 ticks/frame = 25 fps
                    object(
                        &extended_stream_properties_guid(),
                        &extended_stream_properties_payload(1, 500_000, 400_000),
                    ),
                    object(
                        &extended_stream_properties_guid(),
                        &extended_stream_properties_payload(2, 128_000, 0),
                    ),
                ]),
            ),
        ],
    )
}

#[test]
fn parses_one_video_and_one_audio_stream() {
    let media = match parse(full_fixture(0x02)).unwrap() {
        ParseOutcome::Parsed(media) => media,
        ParseOutcome::NotThisFormat => panic!("fixture not recognized as ASF"),
    };

    assert_eq!(media.container, "ASF");
    assert_eq!(media.stream_count(), 2);

    match media.stream(1).unwrap() {
        StreamDescriptor::Video(v) => {
            assert_eq!(v.width, 1280);
            assert_eq!(v.height, 720);
            assert_eq!(v.framerate, 25.0);
            assert_eq!(v.duration, Some(30.0));
            assert_eq!(v.codec, "WMV3");
        }
        other => panic!("stream 1 should be video, got {other:?}"),
    }
    match media.stream(2).unwrap() {
        StreamDescriptor::Audio(a) => {
            assert_eq!(a.channels, 2);
            assert_eq!(a.sample_rate, 44100.0);
            assert_eq!(a.bits_per_sample, 16);
            assert_eq!(a.duration, None);
            assert_eq!(a.codec, "WMA2");
        }
        other => panic!("stream 2 should be audio, got {other:?}"),
    }

    assert_eq!(media.data_bitrates, vec![500_000, 128_000]);
}

#[test]
fn reserved2_mismatch_is_an_invariant_violation() {
    match parse(full_fixture(0x03)) {
        Err(ParseError::Invariant(reason)) => assert!(reason.contains("reserved2")),
        other => panic!("expected invariant violation, got {other:?}"),
    }
}

#[test]
fn unknown_header_object_is_skipped() {
    let junk = object(&guid(0xDEADBEEF, 0x1234, 0x5678, 0x9A, 0xBC, 0xDEF012345678), &[0xFF; 32]);
    let fixture = asf_file(
        0x02,
        &[
            object(&file_properties_guid(), &file_properties_payload(30)),
            junk,
            object(&stream_properties_guid(), &video_stream_payload(1, 1280, 720)),
        ],
    );
    let media = match parse(fixture).unwrap() {
        ParseOutcome::Parsed(media) => media,
        ParseOutcome::NotThisFormat => panic!("fixture not recognized as ASF"),
    };
    assert_eq!(media.stream_count(), 1);
}

#[test]
fn non_asf_bytes_are_not_this_format() {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&[0u8; 20]);
    match parse(bytes).unwrap() {
        ParseOutcome::NotThisFormat => {}
        ParseOutcome::Parsed(_) => panic!("RIFF bytes must not parse as ASF"),
    }
}
