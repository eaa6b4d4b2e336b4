//! RIFF/AVI parsing.
//!
//! An AVI file is a RIFF form whose first element, the `hdrl` LIST,
//! carries everything this parser needs: the main header plus one `strl`
//! LIST per stream, each pairing a stream header chunk (`strh`) with a
//! stream format chunk (`strf`). Chunk payloads are word-aligned, so an
//! odd declared size is followed by one padding byte.

use crate::cursor::{ByteCursor, ByteOrder, ParseError, Result};
use crate::model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
use crate::waveformat::{
    BitmapInfoHeader, WaveFormatEx, fourcc_to_string, read_bitmapinfoheader, read_waveformatex,
    wave_codec_name,
};
use std::io::{Read, Seek};

pub const FILE_EXTENSIONS: &[&str] = &["avi"];

#[derive(Debug)]
pub enum AviNode {
    List(AviList),
    MainHeader(MainHeader),
    StreamHeader(StreamHeader),
    VideoFormat(BitmapInfoHeader),
    AudioFormat(WaveFormatEx),
    Skipped([u8; 4]),
}

#[derive(Debug)]
pub struct AviList {
    pub list_type: [u8; 4],
    pub children: Vec<AviNode>,
}

/// AVIMAINHEADER (`avih`).
#[derive(Debug)]
pub struct MainHeader {
    pub micros_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: u32,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

/// AVISTREAMHEADER (`strh`).
#[derive(Debug)]
pub struct StreamHeader {
    pub stream_type: [u8; 4],
    pub handler: [u8; 4],
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: u32,
    pub sample_size: u32,
}

pub fn parse<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
    cur.set_order(ByteOrder::Little);
    if &cur.read_fourcc()? != b"RIFF" {
        return Ok(ParseOutcome::NotThisFormat);
    }
    let _file_size = cur.read_u32()?;
    let _form_type = cur.read_fourcc()?;

    // The first element is the hdrl LIST; nothing after it is needed.
    let mut preceding_stream_type = None;
    let header = parse_element(cur, &mut preceding_stream_type)?;
    Ok(ParseOutcome::Parsed(project(&header)))
}

/// Parse one element: either a LIST or a leaf chunk.
///
/// `preceding_stream_type` threads the type tag of the most recent `strh`
/// chunk to its sibling `strf`, whose shape depends on it. The value is
/// scoped to a single LIST's children.
pub fn parse_element<R: Read + Seek>(
    cur: &mut ByteCursor<R>,
    preceding_stream_type: &mut Option<[u8; 4]>,
) -> Result<AviNode> {
    let id = cur.read_fourcc()?;
    if &id == b"LIST" {
        parse_list(cur)
    } else {
        parse_chunk(cur, id, preceding_stream_type)
    }
}

fn parse_list<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<AviNode> {
    let size = u64::from(cur.read_u32()?);
    if size < 4 {
        return Err(ParseError::Invariant(format!(
            "LIST declares size {size}, below the 4-byte type code"
        )));
    }
    let list_type = cur.read_fourcc()?;
    let mut data = cur.read_subsegment(size - 4)?;
    if size % 2 == 1 && cur.bytes_left() {
        cur.skip(1)?;
    }

    let mut children = Vec::new();
    let mut preceding_stream_type = None;
    while data.bytes_left() {
        children.push(parse_element(&mut data, &mut preceding_stream_type)?);
    }
    Ok(AviNode::List(AviList {
        list_type,
        children,
    }))
}

fn parse_chunk<R: Read + Seek>(
    cur: &mut ByteCursor<R>,
    id: [u8; 4],
    preceding_stream_type: &mut Option<[u8; 4]>,
) -> Result<AviNode> {
    let size = u64::from(cur.read_u32()?);
    let node = match &id {
        b"avih" => {
            let mut data = cur.read_subsegment(size)?;
            AviNode::MainHeader(parse_main_header(&mut data)?)
        }
        b"strh" => {
            let mut data = cur.read_subsegment(size)?;
            let header = parse_stream_header(&mut data)?;
            *preceding_stream_type = Some(header.stream_type);
            AviNode::StreamHeader(header)
        }
        b"strf" => {
            let mut data = cur.read_subsegment(size)?;
            match preceding_stream_type {
                Some(t) if t == b"vids" => AviNode::VideoFormat(read_bitmapinfoheader(&mut data)?),
                Some(t) if t == b"auds" => AviNode::AudioFormat(read_waveformatex(&mut data)?),
                Some(t) => {
                    return Err(ParseError::Invariant(format!(
                        "strf chunk follows a strh of unsupported type {}",
                        fourcc_to_string(t)
                    )));
                }
                None => {
                    return Err(ParseError::Invariant(
                        "strf chunk without a preceding strh".into(),
                    ));
                }
            }
        }
        _ => {
            cur.skip(size)?;
            AviNode::Skipped(id)
        }
    };
    // Word alignment: an odd payload is followed by one padding byte.
    if size % 2 == 1 && cur.bytes_left() {
        cur.skip(1)?;
    }
    Ok(node)
}

pub fn parse_main_header<R: Read + Seek>(data: &mut ByteCursor<R>) -> Result<MainHeader> {
    Ok(MainHeader {
        micros_per_frame: data.read_u32()?,
        max_bytes_per_sec: data.read_u32()?,
        padding_granularity: data.read_u32()?,
        flags: data.read_u32()?,
        total_frames: data.read_u32()?,
        initial_frames: data.read_u32()?,
        streams: data.read_u32()?,
        suggested_buffer_size: data.read_u32()?,
        width: data.read_u32()?,
        height: data.read_u32()?,
    })
}

pub fn parse_stream_header<R: Read + Seek>(data: &mut ByteCursor<R>) -> Result<StreamHeader> {
    let header = StreamHeader {
        stream_type: data.read_fourcc()?,
        handler: data.read_fourcc()?,
        flags: data.read_u32()?,
        priority: data.read_u16()?,
        language: data.read_u16()?,
        initial_frames: data.read_u32()?,
        scale: data.read_u32()?,
        rate: data.read_u32()?,
        start: data.read_u32()?,
        length: data.read_u32()?,
        suggested_buffer_size: data.read_u32()?,
        quality: data.read_u32()?,
        sample_size: data.read_u32()?,
    };
    // Destination rectangle, unused.
    for _ in 0..4 {
        let _ = data.read_u16()?;
    }
    Ok(header)
}

fn project(header: &AviNode) -> MediaFile {
    let mut media = MediaFile::new("AVI RIFF");
    let AviNode::List(hdrl) = header else {
        return media;
    };

    for child in &hdrl.children {
        let AviNode::List(strl) = child else {
            continue;
        };
        if &strl.list_type != b"strl" {
            continue;
        }
        let stream_header = strl.children.iter().find_map(|n| match n {
            AviNode::StreamHeader(h) => Some(h),
            _ => None,
        });
        let Some(stream_header) = stream_header else {
            continue;
        };

        match &stream_header.stream_type {
            b"vids" => {
                let Some(format) = strl.children.iter().find_map(|n| match n {
                    AviNode::VideoFormat(f) => Some(f),
                    _ => None,
                }) else {
                    continue;
                };
                let framerate = if stream_header.scale > 0 {
                    f64::from(stream_header.rate) / f64::from(stream_header.scale)
                } else {
                    0.0
                };
                let duration = if framerate > 0.0 {
                    Some(f64::from(stream_header.length) / framerate)
                } else {
                    None
                };
                media.insert_stream(
                    None,
                    StreamDescriptor::Video(VideoStream {
                        width: format.width,
                        height: format.height,
                        framerate,
                        duration,
                        codec: format.codec_name(),
                    }),
                );
            }
            b"auds" => {
                let Some(format) = strl.children.iter().find_map(|n| match n {
                    AviNode::AudioFormat(f) => Some(f),
                    _ => None,
                }) else {
                    continue;
                };
                media.insert_stream(
                    None,
                    StreamDescriptor::Audio(AudioStream {
                        channels: u32::from(format.channels),
                        sample_rate: f64::from(format.sample_rate),
                        bits_per_sample: u32::from(format.bits_per_sample),
                        duration: None,
                        codec: wave_codec_name(format.codec_id)
                            .unwrap_or("Unknown")
                            .to_string(),
                    }),
                );
            }
            _ => {}
        }
    }

    if let Some(main) = hdrl.children.iter().find_map(|n| match n {
        AviNode::MainHeader(h) => Some(h),
        _ => None,
    }) && main.streams as usize != media.stream_count()
    {
        tracing::debug!(
            declared = main.streams,
            found = media.stream_count(),
            "AVI main header stream count disagrees with strl lists"
        );
    }

    media
}
