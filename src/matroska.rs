//! EBML / Matroska header parsing.
//!
//! EBML elements are (class-id, size, payload) where both the class-id and
//! the size use the same variable-length encoding: the number of leading
//! zero bits in the first byte determines the field's total width, and the
//! marker bit is masked out of the size's first byte before the remaining
//! bytes are combined big-endian. Class-ids keep their marker bits, as the
//! published id values include them.

use crate::cursor::{ByteCursor, ByteOrder, ParseError, Result, decode_uint_var};
use crate::model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
use std::io::{Read, Seek};

pub const FILE_EXTENSIONS: &[&str] = &["mkv"];

const EBML_MAGIC: u32 = 0x1A45_DFA3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    String,
    Utf8,
    Uint,
    Float,
    Binary,
    Master,
}

/// (class-id, element name, payload kind, nesting level)
const CLASS_IDS: &[(u64, &str, Payload, i32)] = &[
    // EBML header
    (0x1A45DFA3, "EBML", Payload::Master, 0),
    (0x4282, "DocType", Payload::String, 1),
    (0x4287, "DocTypeVersion", Payload::Uint, 1),
    (0x4285, "DocTypeReadVersion", Payload::Uint, 1),
    // Global
    (0xEC, "Void", Payload::Binary, 1),
    // Segment and its level-1 children
    (0x18538067, "Segment", Payload::Master, 0),
    (0x114D9B74, "SeekHead", Payload::Master, 1),
    (0x1549A966, "Info", Payload::Master, 1),
    (0x1F43B675, "Cluster", Payload::Master, 1),
    (0x1C53BB6B, "Cues", Payload::Master, 1),
    // Tracks, the container of interest
    (0x1654AE6B, "Tracks", Payload::Master, 1),
    (0xAE, "TrackEntry", Payload::Master, 2),
    (0xD7, "TrackNumber", Payload::Uint, 3),
    (0x73C5, "TrackUID", Payload::Uint, 3),
    (0x83, "TrackType", Payload::Uint, 3),
    (0xB9, "FlagEnabled", Payload::Uint, 3),
    (0x88, "FlagDefault", Payload::Uint, 3),
    (0x55AA, "FlagForced", Payload::Uint, 3),
    (0x9C, "FlagLacing", Payload::Uint, 3),
    (0x6DE7, "MinCache", Payload::Uint, 3),
    (0x6DF8, "MaxCache", Payload::Uint, 3),
    (0x23E383, "DefaultDuration", Payload::Uint, 3),
    (0x23314F, "TrackTimecodeScale", Payload::Float, 3),
    (0x55EE, "MaxBlockAdditionID", Payload::Uint, 3),
    (0x536E, "Name", Payload::Utf8, 3),
    (0x22B59C, "Language", Payload::String, 3),
    (0x86, "CodecID", Payload::String, 3),
    (0x63A2, "CodecPrivate", Payload::Binary, 3),
    (0x258688, "CodecName", Payload::Utf8, 3),
    (0x7446, "AttachmentLink", Payload::Uint, 3),
    (0xAA, "CodecDecodeAll", Payload::Uint, 3),
    // Video
    (0xE0, "Video", Payload::Master, 3),
    (0x1A, "FlagInterlaced", Payload::Uint, 4),
    (0xB0, "PixelWidth", Payload::Uint, 4),
    (0xBA, "PixelHeight", Payload::Uint, 4),
    (0x54B0, "DisplayWidth", Payload::Uint, 4),
    (0x54BA, "DisplayHeight", Payload::Uint, 4),
    (0x9A, "Unknown", Payload::Uint, 4),
    // Audio
    (0xE1, "Audio", Payload::Master, 3),
    (0xB5, "SamplingFrequency", Payload::Float, 4),
    (0x9F, "Channels", Payload::Uint, 4),
    (0x6264, "BitDepth", Payload::Uint, 4),
];

/// Containers holding only bulk or irrelevant data; skipped wholesale so
/// parse time stays bounded on files with large cluster payloads.
const SKIP_CONTAINERS: &[&str] = &["Info", "SeekHead", "Cluster", "Cues"];

fn class_info(class_id: u64) -> Option<(&'static str, Payload, i32)> {
    CLASS_IDS
        .iter()
        .find(|(id, _, _, _)| *id == class_id)
        .map(|(_, name, kind, level)| (*name, *kind, *level))
}

/// Total byte width of a variable-length field, from its first byte:
/// the number of leading zero bits plus one. `None` for 0x00, which
/// encodes no valid width.
pub fn vint_width(first: u8) -> Option<usize> {
    if first == 0 {
        return None;
    }
    Some(first.leading_zeros() as usize + 1)
}

/// Decode a size field: marker bit masked out of the first byte, the
/// remaining bytes appended big-endian.
pub fn decode_vint(first: u8, rest: &[u8]) -> u64 {
    let width = first.leading_zeros() as usize + 1;
    let lead = first ^ (1 << (8 - width));
    let mut bytes = Vec::with_capacity(1 + rest.len());
    bytes.push(lead);
    bytes.extend_from_slice(rest);
    decode_uint_var(&bytes, ByteOrder::Big)
}

/// A decoded EBML element with its reconstructed children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: &'static str,
    pub value: Value,
    pub level: i32,
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Uint(u64),
    Float(f64),
    Text(String),
}

impl Element {
    fn new(name: &'static str, value: Value, level: i32) -> Self {
        Self {
            name,
            value,
            level,
            children: Vec::new(),
        }
    }

    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a Element> + use<'a, 'b> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn first(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    pub fn uint(&self, name: &str) -> Option<u64> {
        match self.first(name)?.value {
            Value::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.first(name)?.value {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match &self.first(name)?.value {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

pub fn parse<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
    cur.set_order(ByteOrder::Big);
    if cur.read_u32()? != EBML_MAGIC {
        return Ok(ParseOutcome::NotThisFormat);
    }
    cur.seek(0)?;
    let root = build_tree(cur)?;
    Ok(ParseOutcome::Parsed(project(&root)))
}

/// Read the (class-id, declared length) pair of the next element.
fn read_element_header<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<(u64, u64)> {
    let first = cur.read_u8()?;
    let Some(id_width) = vint_width(first) else {
        return Err(ParseError::Invariant(
            "EBML class-id lead byte is 0x00".into(),
        ));
    };
    let mut id_bytes = vec![first];
    id_bytes.extend(cur.read_bytes(id_width as u64 - 1)?);
    let class_id = decode_uint_var(&id_bytes, ByteOrder::Big);

    let first = cur.read_u8()?;
    let Some(len_width) = vint_width(first) else {
        return Err(ParseError::Invariant(
            "EBML size lead byte is 0x00".into(),
        ));
    };
    let rest = cur.read_bytes(len_width as u64 - 1)?;
    let length = decode_vint(first, &rest);
    Ok((class_id, length))
}

/// Walk the flat element sequence and reconstruct the tree, stopping as
/// soon as the Tracks container's declared extent has been consumed.
fn build_tree<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<Element> {
    let mut stack = vec![Element::new("Root", Value::None, -1)];
    let mut tracks_end: Option<u64> = None;

    while cur.bytes_left() {
        if let Some(end) = tracks_end
            && cur.tell() >= end
        {
            break;
        }
        let (class_id, length) = read_element_header(cur)?;
        let Some((name, kind, level)) = class_info(class_id) else {
            tracing::debug!(class_id = %format_args!("{class_id:#x}"), "skipping unhandled EBML element");
            cur.skip(length.min(cur.remaining()))?;
            continue;
        };

        let value = match kind {
            Payload::Master => {
                if SKIP_CONTAINERS.contains(&name) {
                    cur.skip(length.min(cur.remaining()))?;
                    continue;
                }
                if name == "Tracks" {
                    tracks_end = Some(cur.tell().saturating_add(length));
                }
                Value::None
            }
            Payload::Uint => {
                if length > 8 {
                    return Err(ParseError::Invariant(format!(
                        "EBML unsigned integer element {name} has length {length}"
                    )));
                }
                Value::Uint(decode_uint_var(&cur.read_bytes(length)?, ByteOrder::Big))
            }
            Payload::Float => match length {
                0 => Value::Float(0.0),
                4 => Value::Float(f64::from(cur.read_f32()?)),
                8 => Value::Float(cur.read_f64()?),
                other => {
                    return Err(ParseError::Invariant(format!(
                        "EBML float element {name} has length {other}"
                    )));
                }
            },
            Payload::String | Payload::Utf8 => Value::Text(
                String::from_utf8_lossy(&cur.read_bytes(length)?).into_owned(),
            ),
            Payload::Binary => {
                cur.skip(length)?;
                Value::None
            }
        };

        let element = Element::new(name, value, level);
        // Attach by level: pop finished elements until the top of the
        // stack is a shallower ancestor, which becomes the parent.
        while stack.len() > 1 && stack[stack.len() - 1].level >= element.level {
            pop_into_parent(&mut stack);
        }
        stack.push(element);
    }

    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    Ok(stack
        .pop()
        .unwrap_or_else(|| Element::new("Root", Value::None, -1)))
}

fn pop_into_parent(stack: &mut Vec<Element>) {
    if let Some(done) = stack.pop()
        && let Some(parent) = stack.last_mut()
    {
        parent.children.push(done);
    }
}

fn project(root: &Element) -> MediaFile {
    let mut media = MediaFile::new("matroska");

    for segment in root.children_named("Segment") {
        for tracks in segment.children_named("Tracks") {
            for track in tracks.children_named("TrackEntry") {
                match track.uint("TrackType") {
                    Some(1) => {
                        let video = track.first("Video");
                        let timecode_scale = track.float("TrackTimecodeScale").unwrap_or(1.0);
                        // TODO: derive the framerate from DefaultDuration
                        // the way the duration is derived, once a file
                        // exists to validate the change against.
                        let framerate = 23.976 * timecode_scale;
                        let duration = track
                            .uint("DefaultDuration")
                            .map(|d| d as f64 / (1_000_000.0 * timecode_scale));
                        media.insert_stream(
                            None,
                            StreamDescriptor::Video(VideoStream {
                                width: video.and_then(|v| v.uint("PixelWidth")).unwrap_or(0)
                                    as u32,
                                height: video.and_then(|v| v.uint("PixelHeight")).unwrap_or(0)
                                    as u32,
                                framerate,
                                duration,
                                codec: track.text("CodecID").unwrap_or_default().to_string(),
                            }),
                        );
                    }
                    Some(2) => {
                        let audio = track.first("Audio");
                        media.insert_stream(
                            None,
                            StreamDescriptor::Audio(AudioStream {
                                channels: audio.and_then(|a| a.uint("Channels")).unwrap_or(0)
                                    as u32,
                                sample_rate: audio
                                    .and_then(|a| a.float("SamplingFrequency"))
                                    .unwrap_or(0.0),
                                bits_per_sample: audio
                                    .and_then(|a| a.uint("BitDepth"))
                                    .unwrap_or(0) as u32,
                                duration: None,
                                codec: track.text("CodecID").unwrap_or_default().to_string(),
                            }),
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    media
}
