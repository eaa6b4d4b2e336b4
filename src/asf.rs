//! ASF/WMV header parsing.
//!
//! An ASF file opens with a Header Object that carries a count of
//! GUID-tagged sub-objects, each with its own declared byte length. Every
//! sub-object payload is parsed from a bounded subsegment so an unknown or
//! miscounted object cannot desynchronize its siblings.

use crate::cursor::{ByteCursor, ByteOrder, MemCursor, ParseError, Result};
use crate::model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
use crate::waveformat::{
    BitmapInfoHeader, WaveFormatEx, read_bitmapinfoheader, read_waveformatex,
};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::{Read, Seek};

pub const FILE_EXTENSIONS: &[&str] = &["wmv", "asf"];

/// 100-nanosecond ticks per second, the ASF time unit.
const TICKS_PER_SECOND: f64 = 1e7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Header,
    ContentDescription,
    ExtendedContentDescription,
    FileProperties,
    HeaderExtension,
    CodecList,
    StreamProperties,
    StreamBitrateProperties,
    AudioMedia,
    VideoMedia,
    AudioSpread,
    NoErrorCorrection,
    LanguageList,
    Reserved1,
    Metadata,
    ExtendedStreamProperties,
    IndexParameters,
    StreamPrioritization,
    Padding,
}

const GUID_TABLE: &[(&str, ObjectKind)] = &[
    ("75B22630-668E-11CF-A6D9-00AA0062CE6C", ObjectKind::Header),
    ("75B22633-668E-11CF-A6D9-00AA0062CE6C", ObjectKind::ContentDescription),
    (
        "D2D0A440-E307-11D2-97F0-00A0C95EA850",
        ObjectKind::ExtendedContentDescription,
    ),
    ("8CABDCA1-A947-11CF-8EE4-00C00C205365", ObjectKind::FileProperties),
    ("5FBF03B5-A92E-11CF-8EE3-00C00C205365", ObjectKind::HeaderExtension),
    ("86D15240-311D-11D0-A3A4-00A0C90348F6", ObjectKind::CodecList),
    ("B7DC0791-A9B7-11CF-8EE6-00C00C205365", ObjectKind::StreamProperties),
    (
        "7BF875CE-468D-11D1-8D82-006097C9A2B2",
        ObjectKind::StreamBitrateProperties,
    ),
    ("F8699E40-5B4D-11CF-A8FD-00805F5C442B", ObjectKind::AudioMedia),
    ("BC19EFC0-5B4D-11CF-A8FD-00805F5C442B", ObjectKind::VideoMedia),
    ("BFC3CD50-618F-11CF-8BB2-00AA00B4E220", ObjectKind::AudioSpread),
    ("20FB5700-5B55-11CF-A8FD-00805F5C442B", ObjectKind::NoErrorCorrection),
    ("7C4346A9-EFE0-4BFC-B229-393EDE415C85", ObjectKind::LanguageList),
    ("ABD3D211-A9BA-11CF-8EE6-00C00C205365", ObjectKind::Reserved1),
    ("C5F8CBEA-5BAF-4877-8467-AA8C44FA4CCA", ObjectKind::Metadata),
    (
        "14E6A5CB-C672-4332-8399-A96952065B5A",
        ObjectKind::ExtendedStreamProperties,
    ),
    ("D6E229DF-35DA-11D1-9034-00A0C90349BE", ObjectKind::IndexParameters),
    (
        "D4FED15B-88D3-454F-81F0-ED5C45999E24",
        ObjectKind::StreamPrioritization,
    ),
    ("1806D474-CADF-4509-A4BA-9AABCB96AAE8", ObjectKind::Padding),
];

fn lookup_guid(guid: &str) -> Option<ObjectKind> {
    GUID_TABLE
        .iter()
        .find(|(g, _)| *g == guid)
        .map(|(_, kind)| *kind)
}

#[derive(Debug)]
pub struct Header {
    pub objects: Vec<HeaderObject>,
}

#[derive(Debug)]
pub enum HeaderObject {
    FileProperties(FileProperties),
    StreamProperties(StreamProperties),
    HeaderExtension(HeaderExtension),
    CodecList(CodecList),
    StreamBitrates(Vec<StreamBitrateRecord>),
    /// Recognized object whose payload carries nothing this parser needs.
    Unparsed(ObjectKind),
}

#[derive(Debug)]
pub struct FileProperties {
    pub file_id: String,
    pub file_size: u64,
    pub created: NaiveDateTime,
    pub packet_count: u64,
    /// Seconds.
    pub play_duration: f64,
    pub send_duration: f64,
    pub preroll_ms: u64,
    pub broadcast: bool,
    pub seekable: bool,
    pub min_packet_size: u32,
    pub max_packet_size: u32,
    pub max_bitrate: u32,
}

#[derive(Debug)]
pub struct StreamProperties {
    /// Low 7 bits of the flags field; the container's stream number.
    pub index: u8,
    pub media: StreamMedia,
}

#[derive(Debug)]
pub enum StreamMedia {
    Audio(WaveFormatEx),
    Video(VideoMedia),
    Other,
}

#[derive(Debug)]
pub struct VideoMedia {
    pub width: u32,
    pub height: u32,
    pub format: BitmapInfoHeader,
}

#[derive(Debug)]
pub struct HeaderExtension {
    pub objects: Vec<ExtensionObject>,
}

#[derive(Debug)]
pub enum ExtensionObject {
    ExtendedStreamProperties(ExtendedStreamProperties),
    LanguageList(Vec<String>),
    Unparsed(ObjectKind),
}

#[derive(Debug)]
pub struct ExtendedStreamProperties {
    pub start_time: u64,
    pub end_time: u64,
    pub data_bitrate: u32,
    pub buffer_size: u32,
    pub initial_buffer_fullness: u32,
    pub alt_data_bitrate: u32,
    pub alt_buffer_size: u32,
    pub alt_initial_buffer_fullness: u32,
    pub max_object_size: u32,
    pub reliable: bool,
    pub seekable: bool,
    pub no_cleanpoints: bool,
    pub resend_live_cleanpoints: bool,
    pub stream_number: u16,
    pub stream_language_id: u16,
    /// 100-nanosecond ticks.
    pub avg_time_per_frame: u64,
    pub stream_name_count: u16,
    pub payload_extension_count: u16,
}

#[derive(Debug)]
pub struct CodecList {
    pub entries: Vec<CodecEntry>,
}

#[derive(Debug)]
pub struct CodecEntry {
    pub codec_type: u16,
    pub name: String,
    pub description: String,
    pub information: Vec<u8>,
}

#[derive(Debug)]
pub struct StreamBitrateRecord {
    pub stream_index: u8,
    pub avg_bitrate: u32,
}

pub fn parse<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
    cur.set_order(ByteOrder::Little);
    let object_id = cur.read_guid()?;
    if lookup_guid(&object_id) != Some(ObjectKind::Header) {
        return Ok(ParseOutcome::NotThisFormat);
    }
    let header = parse_header(cur)?;
    Ok(ParseOutcome::Parsed(project(&header)))
}

pub fn parse_header<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<Header> {
    let _header_size = cur.read_u64()?;
    let num_objects = cur.read_u32()?;
    let _reserved1 = cur.read_u8()?;
    let reserved2 = cur.read_u8()?;
    if reserved2 != 0x02 {
        return Err(ParseError::Invariant(format!(
            "ASF header reserved2 is {reserved2:#04x}, expected 0x02"
        )));
    }

    let mut objects = Vec::new();
    for _ in 0..num_objects {
        let guid = cur.read_guid()?;
        let size = cur.read_u64()?;
        if size < 24 {
            return Err(ParseError::Invariant(format!(
                "ASF object {guid} declares size {size}, below the 24-byte header"
            )));
        }
        let mut data = cur.read_subsegment(size - 24)?;
        let Some(kind) = lookup_guid(&guid) else {
            tracing::debug!(%guid, size, "skipping unrecognized ASF header object");
            continue;
        };
        let object = match kind {
            ObjectKind::FileProperties => {
                HeaderObject::FileProperties(parse_file_properties(&mut data)?)
            }
            ObjectKind::StreamProperties => {
                HeaderObject::StreamProperties(parse_stream_properties(&mut data)?)
            }
            ObjectKind::HeaderExtension => {
                HeaderObject::HeaderExtension(parse_header_extension(&mut data)?)
            }
            ObjectKind::CodecList => HeaderObject::CodecList(parse_codec_list(&mut data)?),
            ObjectKind::StreamBitrateProperties => {
                HeaderObject::StreamBitrates(parse_stream_bitrates(&mut data)?)
            }
            other => HeaderObject::Unparsed(other),
        };
        objects.push(object);
    }
    Ok(Header { objects })
}

pub fn parse_file_properties(data: &mut MemCursor) -> Result<FileProperties> {
    let file_id = data.read_guid()?;
    let file_size = data.read_u64()?;
    let created = data.read_windows_timestamp()?;
    let packet_count = data.read_u64()?;
    let play_duration = data.read_u64()? as f64 / TICKS_PER_SECOND;
    let send_duration = data.read_u64()? as f64 / TICKS_PER_SECOND;
    let preroll_ms = data.read_u64()?;
    let flags = data.read_u32()?;
    let min_packet_size = data.read_u32()?;
    let max_packet_size = data.read_u32()?;
    let max_bitrate = data.read_u32()?;
    Ok(FileProperties {
        file_id,
        file_size,
        created,
        packet_count,
        play_duration,
        send_duration,
        preroll_ms,
        broadcast: flags & 0x01 != 0,
        seekable: flags >> 1 & 0x01 != 0,
        min_packet_size,
        max_packet_size,
        max_bitrate,
    })
}

pub fn parse_stream_properties(data: &mut MemCursor) -> Result<StreamProperties> {
    let stream_type = data.read_guid()?;
    let _ecc_type = data.read_guid()?;
    let _time_offset = data.read_u64()?;
    let type_length = data.read_u32()?;
    let ecc_length = data.read_u32()?;
    let flags = data.read_u16()?;
    let index = (flags & 0x7f) as u8;
    let _reserved = data.read_u32()?;
    let mut type_data = data.read_subsegment(u64::from(type_length))?;

    let media = match lookup_guid(&stream_type) {
        Some(ObjectKind::AudioMedia) => StreamMedia::Audio(read_waveformatex(&mut type_data)?),
        Some(ObjectKind::VideoMedia) => {
            let width = type_data.read_u32()?;
            let height = type_data.read_u32()?;
            let _reserved_flags = type_data.read_u8()?;
            let _format_data_size = type_data.read_u16()?;
            let format = read_bitmapinfoheader(&mut type_data)?;
            StreamMedia::Video(VideoMedia {
                width,
                height,
                format,
            })
        }
        _ => StreamMedia::Other,
    };
    data.skip(u64::from(ecc_length))?;
    Ok(StreamProperties { index, media })
}

pub fn parse_header_extension(data: &mut MemCursor) -> Result<HeaderExtension> {
    let _reserved1 = data.read_guid()?;
    let _reserved2 = data.read_u16()?;
    let data_size = data.read_u32()?;

    let mut remaining = i64::from(data_size);
    let mut objects = Vec::new();
    while remaining > 0 {
        let guid = data.read_guid()?;
        let size = data.read_u64()?;
        if size == 0 {
            break;
        }
        if size < 24 {
            return Err(ParseError::Invariant(format!(
                "ASF extension object {guid} declares size {size}, below the 24-byte header"
            )));
        }
        remaining -= size as i64;
        let mut sub = data.read_subsegment(size - 24)?;
        let Some(kind) = lookup_guid(&guid) else {
            // Authors may define their own extension GUIDs; skip them.
            tracing::debug!(%guid, size, "skipping unrecognized ASF extension object");
            continue;
        };
        let object = match kind {
            ObjectKind::ExtendedStreamProperties => ExtensionObject::ExtendedStreamProperties(
                parse_extended_stream_properties(&mut sub)?,
            ),
            ObjectKind::LanguageList => {
                ExtensionObject::LanguageList(parse_language_list(&mut sub)?)
            }
            ObjectKind::Padding => continue,
            other => ExtensionObject::Unparsed(other),
        };
        objects.push(object);
    }
    Ok(HeaderExtension { objects })
}

pub fn parse_extended_stream_properties(data: &mut MemCursor) -> Result<ExtendedStreamProperties> {
    let start_time = data.read_u64()?;
    let end_time = data.read_u64()?;
    let data_bitrate = data.read_u32()?;
    let buffer_size = data.read_u32()?;
    let initial_buffer_fullness = data.read_u32()?;
    let alt_data_bitrate = data.read_u32()?;
    let alt_buffer_size = data.read_u32()?;
    let alt_initial_buffer_fullness = data.read_u32()?;
    let max_object_size = data.read_u32()?;
    let flags = data.read_u32()?;
    let stream_number = data.read_u16()?;
    let stream_language_id = data.read_u16()?;
    let avg_time_per_frame = data.read_u64()?;
    let stream_name_count = data.read_u16()?;
    let payload_extension_count = data.read_u16()?;
    Ok(ExtendedStreamProperties {
        start_time,
        end_time,
        data_bitrate,
        buffer_size,
        initial_buffer_fullness,
        alt_data_bitrate,
        alt_buffer_size,
        alt_initial_buffer_fullness,
        max_object_size,
        reliable: flags & 0x01 != 0,
        seekable: flags >> 1 & 0x01 != 0,
        no_cleanpoints: flags >> 2 & 0x01 != 0,
        resend_live_cleanpoints: flags >> 3 & 0x01 != 0,
        stream_number,
        stream_language_id,
        avg_time_per_frame,
        stream_name_count,
        payload_extension_count,
    })
}

pub fn parse_language_list(data: &mut MemCursor) -> Result<Vec<String>> {
    let num_records = data.read_u16()?;
    let mut records = Vec::with_capacity(usize::from(num_records));
    for _ in 0..num_records {
        let id_length = data.read_u8()?;
        records.push(data.read_utf16(u64::from(id_length) / 2, false)?);
    }
    Ok(records)
}

pub fn parse_codec_list(data: &mut MemCursor) -> Result<CodecList> {
    let _reserved = data.read_guid()?;
    let num_codecs = data.read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..num_codecs {
        let codec_type = data.read_u16()?;
        let name_length = data.read_u16()?;
        let name = data.read_utf16(u64::from(name_length), true)?;
        let description_length = data.read_u16()?;
        let description = data.read_utf16(u64::from(description_length), true)?;
        let information_length = data.read_u16()?;
        let information = data.read_bytes(u64::from(information_length))?;
        entries.push(CodecEntry {
            codec_type,
            name,
            description,
            information,
        });
    }
    Ok(CodecList { entries })
}

pub fn parse_stream_bitrates(data: &mut MemCursor) -> Result<Vec<StreamBitrateRecord>> {
    let num_records = data.read_u16()?;
    let mut records = Vec::with_capacity(usize::from(num_records));
    for _ in 0..num_records {
        let flags = data.read_u16()?;
        let avg_bitrate = data.read_u32()?;
        records.push(StreamBitrateRecord {
            stream_index: (flags & 0x7f) as u8,
            avg_bitrate,
        });
    }
    Ok(records)
}

/// Project the decoded header objects into the container-agnostic model.
fn project(header: &Header) -> MediaFile {
    let mut media = MediaFile::new("ASF");

    let duration = header.objects.iter().find_map(|o| match o {
        HeaderObject::FileProperties(p) => Some(p.play_duration),
        _ => None,
    });

    // Framerates arrive separately, in the header extension, keyed by
    // stream number.
    let mut framerates: HashMap<u16, f64> = HashMap::new();
    for object in &header.objects {
        let HeaderObject::HeaderExtension(ext) = object else {
            continue;
        };
        for sub in &ext.objects {
            if let ExtensionObject::ExtendedStreamProperties(esp) = sub {
                media.data_bitrates.push(esp.data_bitrate);
                if esp.avg_time_per_frame > 0 {
                    framerates.insert(
                        esp.stream_number,
                        TICKS_PER_SECOND / esp.avg_time_per_frame as f64,
                    );
                }
            }
        }
    }

    for object in &header.objects {
        let HeaderObject::StreamProperties(props) = object else {
            continue;
        };
        let index = u32::from(props.index);
        match &props.media {
            StreamMedia::Audio(wf) => {
                media.insert_stream(
                    Some(index),
                    StreamDescriptor::Audio(AudioStream {
                        channels: u32::from(wf.channels),
                        sample_rate: f64::from(wf.sample_rate),
                        bits_per_sample: u32::from(wf.bits_per_sample),
                        duration: None,
                        codec: wf.codec_name(),
                    }),
                );
            }
            StreamMedia::Video(vm) => {
                media.insert_stream(
                    Some(index),
                    StreamDescriptor::Video(VideoStream {
                        width: vm.width,
                        height: vm.height,
                        framerate: framerates
                            .get(&u16::from(props.index))
                            .copied()
                            .unwrap_or(0.0),
                        duration,
                        codec: vm.format.codec_name(),
                    }),
                );
            }
            StreamMedia::Other => {}
        }
    }

    media
}
