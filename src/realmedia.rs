//! RealMedia (.rm) parsing.
//!
//! A RealMedia file is a flat sequence of (fourcc, size, payload) objects.
//! Only `.RMF`, `PROP`, `MDPR`, and `CONT` carry information this parser
//! needs; everything else is skipped over. Each `MDPR` describes one
//! elementary stream whose MIME type selects how its embedded
//! type-specific blob is decoded.

use crate::cursor::{ByteCursor, ByteOrder, MemCursor, ParseError, Result};
use crate::model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
use crate::waveformat::fourcc_to_string;
use std::io::{Read, Seek};

pub const FILE_EXTENSIONS: &[&str] = &["rm", "rmvb"];

const MIME_VIDEO: &str = "video/x-pn-realvideo";
const MIME_AUDIO: &str = "audio/x-pn-realaudio";

#[derive(Debug)]
pub enum RmObject {
    FileHeader(FileHeader),
    FileProperties(FileProperties),
    MediaProperties(MediaProperties),
    ContentDescription(ContentDescription),
}

/// `.RMF`
#[derive(Debug)]
pub struct FileHeader {
    pub file_version: u32,
    pub num_headers: u32,
}

/// `PROP`, format version 0.
#[derive(Debug)]
pub struct FileProperties {
    pub max_bit_rate: u32,
    pub avg_bit_rate: u32,
    pub max_packet_size: u32,
    pub avg_packet_size: u32,
    pub num_packets: u32,
    pub duration_ms: u32,
    pub preroll_ms: u32,
    pub index_offset: u32,
    pub data_offset: u32,
    pub num_streams: u16,
    pub flags: u16,
}

/// `MDPR`, format version 0; one per elementary stream.
#[derive(Debug)]
pub struct MediaProperties {
    pub stream_number: u16,
    pub max_bit_rate: u32,
    pub avg_bit_rate: u32,
    pub max_packet_size: u32,
    pub avg_packet_size: u32,
    pub start_time_ms: u32,
    pub preroll_ms: u32,
    pub duration_ms: u32,
    pub stream_name: String,
    pub mime_type: String,
    pub type_specific: TypeSpecific,
}

#[derive(Debug)]
pub enum TypeSpecific {
    Video(RealVideoProperties),
    Audio(RealAudioProperties),
    /// Anything else, including `logical-fileinfo` bookkeeping streams.
    Opaque(Vec<u8>),
}

#[derive(Debug)]
pub struct RealVideoProperties {
    pub version: u16,
    pub size: u16,
    pub tag: [u8; 4],
    pub codec: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub fps: f64,
}

/// RealAudio type-specific record. Version 3 carries none of these
/// fields; versions 4 and 5 differ in how the interleaver and codec
/// fourcc are stored.
#[derive(Debug, Default)]
pub struct RealAudioProperties {
    pub version: u16,
    pub sample_rate: u16,
    pub sample_size: u16,
    pub channels: u16,
    pub codec: String,
}

/// `CONT`
#[derive(Debug)]
pub struct ContentDescription {
    pub title: String,
    pub author: String,
    pub copyright: String,
    pub comment: String,
}

pub fn parse<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
    cur.set_order(ByteOrder::Big);
    if &cur.read_fourcc()? != b".RMF" {
        return Ok(ParseOutcome::NotThisFormat);
    }
    cur.seek(0)?;
    let objects = parse_objects(cur)?;
    Ok(ParseOutcome::Parsed(project(&objects)))
}

pub fn parse_objects<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<Vec<RmObject>> {
    let mut objects = Vec::new();
    while cur.bytes_left() {
        let id = cur.read_fourcc()?;
        // Some files carry junk after the INDX object.
        if id == [0u8; 4] {
            break;
        }
        let size = u64::from(cur.read_u32()?);
        if size < 8 {
            return Err(ParseError::Invariant(format!(
                "RealMedia object {} declares size {size}, below its 8-byte header",
                fourcc_to_string(&id)
            )));
        }
        if !matches!(&id, b".RMF" | b"PROP" | b"MDPR" | b"CONT") {
            cur.skip((size - 8).min(cur.remaining()))?;
            continue;
        }
        let mut data = cur.read_subsegment(size - 8)?;
        let object = match &id {
            b".RMF" => Some(RmObject::FileHeader(parse_file_header(&mut data)?)),
            b"PROP" => parse_file_properties(&mut data)?.map(RmObject::FileProperties),
            b"MDPR" => parse_media_properties(&mut data)?.map(RmObject::MediaProperties),
            _ => Some(RmObject::ContentDescription(parse_content_description(
                &mut data,
            )?)),
        };
        match object {
            Some(object) => objects.push(object),
            None => tracing::debug!(
                id = %fourcc_to_string(&id),
                "skipping RealMedia object with unsupported format version"
            ),
        }
    }
    Ok(objects)
}

pub fn parse_file_header(data: &mut MemCursor) -> Result<FileHeader> {
    let _object_version = data.read_u16()?;
    Ok(FileHeader {
        file_version: data.read_u32()?,
        num_headers: data.read_u32()?,
    })
}

pub fn parse_file_properties(data: &mut MemCursor) -> Result<Option<FileProperties>> {
    let version = data.read_u16()?;
    if version != 0 {
        return Ok(None);
    }
    Ok(Some(FileProperties {
        max_bit_rate: data.read_u32()?,
        avg_bit_rate: data.read_u32()?,
        max_packet_size: data.read_u32()?,
        avg_packet_size: data.read_u32()?,
        num_packets: data.read_u32()?,
        duration_ms: data.read_u32()?,
        preroll_ms: data.read_u32()?,
        index_offset: data.read_u32()?,
        data_offset: data.read_u32()?,
        num_streams: data.read_u16()?,
        flags: data.read_u16()?,
    }))
}

pub fn parse_media_properties(data: &mut MemCursor) -> Result<Option<MediaProperties>> {
    let version = data.read_u16()?;
    if version != 0 {
        return Ok(None);
    }
    let stream_number = data.read_u16()?;
    let max_bit_rate = data.read_u32()?;
    let avg_bit_rate = data.read_u32()?;
    let max_packet_size = data.read_u32()?;
    let avg_packet_size = data.read_u32()?;
    let start_time_ms = data.read_u32()?;
    let preroll_ms = data.read_u32()?;
    let duration_ms = data.read_u32()?;

    let name_size = data.read_u8()?;
    let stream_name = String::from_utf8_lossy(&data.read_bytes(u64::from(name_size))?).into_owned();
    let mime_size = data.read_u8()?;
    let mime_type = String::from_utf8_lossy(&data.read_bytes(u64::from(mime_size))?).into_owned();

    let type_specific_len = data.read_u32()?;
    let mut type_data = data.read_subsegment(u64::from(type_specific_len))?;
    let type_specific = match mime_type.as_str() {
        MIME_VIDEO => TypeSpecific::Video(parse_realvideo(&mut type_data)?),
        MIME_AUDIO => TypeSpecific::Audio(parse_realaudio(&mut type_data)?),
        _ => TypeSpecific::Opaque(type_data.read_bytes(type_data.remaining())?),
    };

    Ok(Some(MediaProperties {
        stream_number,
        max_bit_rate,
        avg_bit_rate,
        max_packet_size,
        avg_packet_size,
        start_time_ms,
        preroll_ms,
        duration_ms,
        stream_name,
        mime_type,
        type_specific,
    }))
}

pub fn parse_realvideo(data: &mut MemCursor) -> Result<RealVideoProperties> {
    let version = data.read_u16()?;
    let size = data.read_u16()?;
    let tag = data.read_fourcc()?;
    let codec = data.read_fourcc()?;
    let width = data.read_u16()?;
    let height = data.read_u16()?;
    data.skip(6)?;
    let fps = data.read_fixed_16_16()?;
    Ok(RealVideoProperties {
        version,
        size,
        tag,
        codec,
        width,
        height,
        fps,
    })
}

pub fn parse_realaudio(data: &mut MemCursor) -> Result<RealAudioProperties> {
    let _tag = data.read_fourcc()?;
    let version = data.read_u16()?;
    let mut audio = RealAudioProperties {
        version,
        ..RealAudioProperties::default()
    };
    if !matches!(version, 4 | 5) {
        // Version 3 declares nothing beyond the header fields.
        return Ok(audio);
    }

    let _unused = data.read_u16()?;
    let _signature = data.read_fourcc()?;
    let _unknown = data.read_u32()?;
    let _version2 = data.read_u16()?;
    let _header_size = data.read_u32()?;
    let _codec_flavor = data.read_u16()?;
    let _codec_frame_size = data.read_u32()?;
    data.skip(12)?;
    let _sub_packet = data.read_u16()?;
    let _frame_size = data.read_u16()?;
    let _sub_packet_size = data.read_u16()?;
    let _unknown = data.read_u16()?;
    if version == 5 {
        data.skip(6)?;
    }
    audio.sample_rate = data.read_u16()?;
    let _unknown = data.read_u16()?;
    audio.sample_size = data.read_u16()?;
    audio.channels = data.read_u16()?;

    if version == 4 {
        let interleaver_len = data.read_u8()?;
        let _interleaver = data.read_bytes(u64::from(interleaver_len))?;
        let codec_len = data.read_u8()?;
        let codec = data.read_bytes(u64::from(codec_len))?;
        audio.codec = String::from_utf8_lossy(&codec).into_owned();
    } else {
        let _interleaver = data.read_fourcc()?;
        let codec = data.read_fourcc()?;
        audio.codec = fourcc_to_string(&codec);
    }

    data.skip(3)?;
    if version == 5 {
        data.skip(1)?;
    }
    let extra_len = data.read_u32()?;
    let _extra = data.read_bytes(u64::from(extra_len).min(data.remaining()))?;
    Ok(audio)
}

pub fn parse_content_description(data: &mut MemCursor) -> Result<ContentDescription> {
    let _object_version = data.read_u16()?;
    let read_field = |data: &mut MemCursor| -> Result<String> {
        let len = data.read_u16()?;
        Ok(String::from_utf8_lossy(&data.read_bytes(u64::from(len))?).into_owned())
    };
    Ok(ContentDescription {
        title: read_field(data)?,
        author: read_field(data)?,
        copyright: read_field(data)?,
        comment: read_field(data)?,
    })
}

fn project(objects: &[RmObject]) -> MediaFile {
    let mut media = MediaFile::new("RealMedia");
    for object in objects {
        match object {
            RmObject::FileProperties(props) => {
                media.data_bitrates.push(props.avg_bit_rate);
            }
            RmObject::MediaProperties(props) => {
                let duration = Some(f64::from(props.duration_ms) / 1000.0);
                match &props.type_specific {
                    TypeSpecific::Video(video) => {
                        media.insert_stream(
                            None,
                            StreamDescriptor::Video(VideoStream {
                                width: u32::from(video.width),
                                height: u32::from(video.height),
                                framerate: video.fps,
                                duration,
                                codec: fourcc_to_string(&video.codec),
                            }),
                        );
                    }
                    TypeSpecific::Audio(audio) => {
                        media.insert_stream(
                            None,
                            StreamDescriptor::Audio(AudioStream {
                                channels: u32::from(audio.channels),
                                sample_rate: f64::from(audio.sample_rate),
                                bits_per_sample: u32::from(audio.sample_size),
                                duration,
                                codec: audio.codec.clone(),
                            }),
                        );
                    }
                    TypeSpecific::Opaque(_) => {}
                }
            }
            RmObject::FileHeader(_) | RmObject::ContentDescription(_) => {}
        }
    }
    media
}
