//! QuickTime / MP4 atom parsing.
//!
//! Atoms are (size, fourcc, payload). A static schema tree drives the
//! descent: each recognized fourcc at each nesting position maps either to
//! a nested schema (container, recursed into a bounded subsegment) or to a
//! leaf decoder. The schema is keyed per-parent because the same fourcc
//! (`hdlr`, `meta`) means different things at different depths.

use crate::cursor::{ByteCursor, ByteOrder, MemCursor, ParseError, Result};
use crate::model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
use crate::waveformat::fourcc_to_string;
use chrono::NaiveDateTime;
use std::io::{Read, Seek};

pub const FILE_EXTENSIONS: &[&str] = &["mov", "mp4"];

const QT_BRAND: [u8; 4] = *b"qt  ";

#[derive(Debug, Clone, Copy)]
pub enum AtomKind {
    /// Container atom parsed recursively with the given child schema.
    Tree(Schema),
    /// Leaf atom handed to a decode routine.
    Leaf(LeafDecoder),
    /// Recognized but irrelevant; payload skipped.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafDecoder {
    FileType,
    MovieHeader,
    TrackHeader,
    HandlerReference,
    SampleDescription,
    TimeToSample,
}

#[derive(Debug)]
pub struct SchemaEntry {
    pub fourcc: [u8; 4],
    pub name: &'static str,
    pub kind: AtomKind,
}

pub type Schema = &'static [SchemaEntry];

const fn entry(fourcc: [u8; 4], name: &'static str, kind: AtomKind) -> SchemaEntry {
    SchemaEntry { fourcc, name, kind }
}

pub const ATOM_SCHEMA: Schema = &[
    entry(*b"ftyp", "File type atom", AtomKind::Leaf(LeafDecoder::FileType)),
    entry(*b"moov", "Movie atom", AtomKind::Tree(MOOV)),
    entry(*b"free", "Free space atom", AtomKind::Skip),
    entry(*b"wide", "Wide atom", AtomKind::Skip),
    entry(*b"mdat", "Media data atom", AtomKind::Skip),
];

const MOOV: Schema = &[
    entry(*b"mvhd", "Movie header atom", AtomKind::Leaf(LeafDecoder::MovieHeader)),
    entry(*b"trak", "Track atom", AtomKind::Tree(TRAK)),
    entry(*b"udta", "User data atom", AtomKind::Skip),
    entry(*b"meta", "Metadata atom", AtomKind::Tree(META)),
    entry(*b"cmov", "Compressed movie atom", AtomKind::Skip),
    entry(*b"rmra", "Reference movie atom", AtomKind::Skip),
];

const TRAK: Schema = &[
    entry(*b"tkhd", "Track header atom", AtomKind::Leaf(LeafDecoder::TrackHeader)),
    entry(*b"clip", "Track clipping atom", AtomKind::Tree(CLIP)),
    entry(*b"matt", "Track matte atom", AtomKind::Tree(MATT)),
    entry(*b"edts", "Edit atom", AtomKind::Tree(EDTS)),
    entry(*b"tref", "Track reference atom", AtomKind::Tree(TREF)),
    entry(*b"mdia", "Media atom", AtomKind::Tree(MDIA)),
    entry(*b"udta", "User data atom", AtomKind::Skip),
    entry(*b"meta", "Metadata atom", AtomKind::Tree(META)),
];

const CLIP: Schema = &[entry(*b"crgn", "Clipping region atom", AtomKind::Skip)];

const MATT: Schema = &[entry(*b"kmat", "Compressed matte atom", AtomKind::Skip)];

const EDTS: Schema = &[entry(*b"elst", "Edit list atom", AtomKind::Skip)];

const TREF: Schema = &[entry(*b"tmcd", "Timecode reference atom", AtomKind::Skip)];

const MDIA: Schema = &[
    entry(*b"mdhd", "Media header atom", AtomKind::Skip),
    entry(
        *b"hdlr",
        "Media handler reference atom",
        AtomKind::Leaf(LeafDecoder::HandlerReference),
    ),
    entry(*b"minf", "Media information atom", AtomKind::Tree(MINF)),
];

const MINF: Schema = &[
    entry(*b"smhd", "Sound media information header atom", AtomKind::Skip),
    entry(*b"gmhd", "Base media information header atom", AtomKind::Skip),
    entry(*b"vmhd", "Video media information header atom", AtomKind::Skip),
    entry(*b"hdlr", "Data handler reference atom", AtomKind::Skip),
    entry(*b"dinf", "Data information atom", AtomKind::Tree(DINF)),
    entry(*b"stbl", "Sample table atom", AtomKind::Tree(STBL)),
];

const DINF: Schema = &[entry(*b"dref", "Data reference atom", AtomKind::Skip)];

const STBL: Schema = &[
    entry(
        *b"stsd",
        "Sample description atom",
        AtomKind::Leaf(LeafDecoder::SampleDescription),
    ),
    entry(
        *b"stts",
        "Time-to-sample atom",
        AtomKind::Leaf(LeafDecoder::TimeToSample),
    ),
    entry(*b"stsc", "Sample-to-chunk atom", AtomKind::Skip),
    entry(*b"stsz", "Sample size atom", AtomKind::Skip),
    entry(*b"stco", "Chunk offset atom", AtomKind::Skip),
];

const META: Schema = &[
    entry(*b"hdlr", "Metadata handler atom", AtomKind::Skip),
    entry(*b"keys", "Metadata keys atom", AtomKind::Skip),
    entry(*b"ilst", "Metadata item list atom", AtomKind::Skip),
];

fn schema_lookup(schema: Schema, fourcc: [u8; 4]) -> Option<&'static SchemaEntry> {
    schema.iter().find(|e| e.fourcc == fourcc)
}

#[derive(Debug, Default)]
pub struct Movie {
    pub file_type: Option<FileType>,
    pub header: Option<MovieHeader>,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Default)]
pub struct Track {
    pub header: Option<TrackHeader>,
    pub handler: Option<HandlerReference>,
    pub sample_description: Option<SampleDescription>,
    pub time_to_sample: Option<TimeToSample>,
}

#[derive(Debug)]
pub struct FileType {
    pub major_brand: [u8; 4],
    pub minor_version: u32,
    pub compatible_brands: Vec<[u8; 4]>,
}

impl FileType {
    pub fn is_quicktime(&self) -> bool {
        self.major_brand == QT_BRAND || self.compatible_brands.contains(&QT_BRAND)
    }
}

#[derive(Debug)]
pub struct MovieHeader {
    pub version: u8,
    pub creation_time: NaiveDateTime,
    pub modification_time: NaiveDateTime,
    pub timescale: u32,
    pub duration: u32,
    pub preferred_rate: u32,
    pub preferred_volume: u16,
    pub next_track_id: u32,
}

#[derive(Debug)]
pub struct TrackHeader {
    pub version: u8,
    pub creation_time: NaiveDateTime,
    pub modification_time: NaiveDateTime,
    pub track_id: u32,
    pub duration: u32,
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: u16,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug)]
pub struct HandlerReference {
    pub component_type: [u8; 4],
    pub subtype: [u8; 4],
    pub manufacturer: u32,
    pub component_flags: u32,
    pub component_flags_mask: u32,
    pub name: String,
}

#[derive(Debug)]
pub struct TimeToSample {
    /// (sample count, sample duration) runs.
    pub entries: Vec<(u32, u32)>,
}

#[derive(Debug)]
pub struct SampleDescription {
    pub entries: Vec<SampleEntry>,
}

#[derive(Debug)]
pub struct SampleEntry {
    pub size: u32,
    pub format: [u8; 4],
    pub data_reference_index: u16,
    pub media: SampleMedia,
}

#[derive(Debug, Clone, Copy)]
pub enum SampleMedia {
    Video {
        width: i16,
        height: i16,
        frame_count: i16,
        compressor: [u8; 4],
        depth: u16,
    },
    Audio {
        channels: u16,
        bits_per_sample: u16,
        compression_id: i16,
        packet_size: u16,
        sample_rate: f64,
    },
    Other,
}

pub fn parse<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
    cur.set_order(ByteOrder::Big);

    // Canonical QuickTime files open with a 0x20-byte ftyp whose major
    // brand is "qt  "; older ones put the movie atom first.
    let signature = cur.read_bytes(12)?;
    if signature != *b"\x00\x00\x00\x20ftypqt  " {
        cur.seek(4)?;
        if &cur.read_fourcc()? != b"moov" {
            return Ok(ParseOutcome::NotThisFormat);
        }
    }
    cur.seek(0)?;

    let mut movie = Movie::default();
    parse_atoms(cur, ATOM_SCHEMA, &mut movie)?;

    if let Some(file_type) = &movie.file_type
        && !file_type.is_quicktime()
    {
        return Ok(ParseOutcome::NotThisFormat);
    }
    let media = project(&movie)?;
    Ok(ParseOutcome::Parsed(media))
}

pub fn parse_atoms<R: Read + Seek>(
    cur: &mut ByteCursor<R>,
    schema: Schema,
    movie: &mut Movie,
) -> Result<()> {
    while cur.bytes_left() {
        let size = u64::from(cur.read_u32()?);
        let fourcc = cur.read_fourcc()?;
        if size < 8 {
            return Err(ParseError::Invariant(format!(
                "atom {} declares size {size}, below its 8-byte header",
                fourcc_to_string(&fourcc)
            )));
        }
        let payload = size - 8;

        let Some(entry) = schema_lookup(schema, fourcc) else {
            cur.skip(payload)?;
            continue;
        };
        match entry.kind {
            AtomKind::Skip => cur.skip(payload)?,
            AtomKind::Tree(children) => {
                if fourcc == *b"trak" {
                    movie.tracks.push(Track::default());
                }
                let mut data = cur.read_subsegment(payload)?;
                parse_atoms(&mut data, children, movie)?;
            }
            AtomKind::Leaf(decoder) => {
                let mut data = cur.read_subsegment(payload)?;
                decode_leaf(decoder, &mut data, movie)?;
            }
        }
    }
    Ok(())
}

fn current_track<'a>(movie: &'a mut Movie, atom: &str) -> Result<&'a mut Track> {
    movie.tracks.last_mut().ok_or_else(|| {
        ParseError::Invariant(format!("{atom} atom encountered outside a track atom"))
    })
}

fn decode_leaf(decoder: LeafDecoder, data: &mut MemCursor, movie: &mut Movie) -> Result<()> {
    match decoder {
        LeafDecoder::FileType => movie.file_type = Some(parse_file_type(data)?),
        LeafDecoder::MovieHeader => movie.header = Some(parse_movie_header(data)?),
        LeafDecoder::TrackHeader => {
            let header = parse_track_header(data)?;
            current_track(movie, "tkhd")?.header = Some(header);
        }
        LeafDecoder::HandlerReference => {
            let handler = parse_handler_reference(data)?;
            current_track(movie, "hdlr")?.handler = Some(handler);
        }
        LeafDecoder::TimeToSample => {
            let table = parse_time_to_sample(data)?;
            current_track(movie, "stts")?.time_to_sample = Some(table);
        }
        LeafDecoder::SampleDescription => {
            // The sample-description layout depends on the media type,
            // which only the sibling handler atom names; it must already
            // have been decoded for this track.
            let track = current_track(movie, "stsd")?;
            let subtype = track
                .handler
                .as_ref()
                .map(|h| h.subtype)
                .ok_or_else(|| {
                    ParseError::Invariant(
                        "stsd atom decoded before its track's hdlr atom".into(),
                    )
                })?;
            track.sample_description = Some(parse_sample_description(data, subtype)?);
        }
    }
    Ok(())
}

pub fn parse_file_type(data: &mut MemCursor) -> Result<FileType> {
    let major_brand = data.read_fourcc()?;
    let minor_version = data.read_u32()?;
    let mut compatible_brands = Vec::new();
    while data.remaining() >= 4 {
        compatible_brands.push(data.read_fourcc()?);
    }
    Ok(FileType {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

pub fn parse_movie_header(data: &mut MemCursor) -> Result<MovieHeader> {
    let version = data.read_u8()?;
    let _flags = data.read_bytes(3)?;
    let creation_time = data.read_mac_timestamp()?;
    let modification_time = data.read_mac_timestamp()?;
    let timescale = data.read_u32()?;
    let duration = data.read_u32()?;
    let preferred_rate = data.read_u32()?;
    let preferred_volume = data.read_u16()?;
    let _reserved = data.read_bytes(10)?;
    let _matrix = data.read_bytes(36)?;
    let _preview_time = data.read_u32()?;
    let _preview_duration = data.read_u32()?;
    let _poster_time = data.read_u32()?;
    let _selection_time = data.read_u32()?;
    let _selection_duration = data.read_u32()?;
    let _current_time = data.read_u32()?;
    let next_track_id = data.read_u32()?;
    Ok(MovieHeader {
        version,
        creation_time,
        modification_time,
        timescale,
        duration,
        preferred_rate,
        preferred_volume,
        next_track_id,
    })
}

pub fn parse_track_header(data: &mut MemCursor) -> Result<TrackHeader> {
    let version = data.read_u8()?;
    let _flags = data.read_bytes(3)?;
    let creation_time = data.read_mac_timestamp()?;
    let modification_time = data.read_mac_timestamp()?;
    let track_id = data.read_u32()?;
    let _reserved = data.read_u32()?;
    let duration = data.read_u32()?;
    let _reserved = data.read_bytes(8)?;
    let layer = data.read_u16()?;
    let alternate_group = data.read_u16()?;
    let volume = data.read_u16()?;
    let _reserved = data.read_u16()?;
    let _matrix = data.read_bytes(36)?;
    let width = data.read_fixed_16_16()?;
    let height = data.read_fixed_16_16()?;
    Ok(TrackHeader {
        version,
        creation_time,
        modification_time,
        track_id,
        duration,
        layer,
        alternate_group,
        volume,
        width,
        height,
    })
}

pub fn parse_handler_reference(data: &mut MemCursor) -> Result<HandlerReference> {
    let _version = data.read_u8()?;
    let _flags = data.read_bytes(3)?;
    let component_type = data.read_fourcc()?;
    let subtype = data.read_fourcc()?;
    let manufacturer = data.read_u32()?;
    let component_flags = data.read_u32()?;
    let component_flags_mask = data.read_u32()?;
    let name_bytes = data.read_bytes(data.remaining())?;
    Ok(HandlerReference {
        component_type,
        subtype,
        manufacturer,
        component_flags,
        component_flags_mask,
        name: String::from_utf8_lossy(&name_bytes)
            .trim_end_matches('\0')
            .to_string(),
    })
}

pub fn parse_time_to_sample(data: &mut MemCursor) -> Result<TimeToSample> {
    let _version = data.read_u8()?;
    let _flags = data.read_bytes(3)?;
    let num_entries = data.read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..num_entries {
        entries.push((data.read_u32()?, data.read_u32()?));
    }
    Ok(TimeToSample { entries })
}

pub fn parse_sample_description(data: &mut MemCursor, subtype: [u8; 4]) -> Result<SampleDescription> {
    let _version = data.read_u8()?;
    let _flags = data.read_bytes(3)?;
    let num_entries = data.read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..num_entries {
        let size = data.read_u32()?;
        let format = data.read_fourcc()?;
        let _reserved = data.read_bytes(6)?;
        let data_reference_index = data.read_u16()?;
        let _version = data.read_u16()?;
        let _revision = data.read_u16()?;

        let media = match &subtype {
            b"vide" => {
                let _vendor = data.read_fourcc()?;
                let _temporal_quality = data.read_i32()?;
                let _spatial_quality = data.read_i32()?;
                let width = data.read_i16()?;
                let height = data.read_i16()?;
                let _horizontal_resolution = data.read_fixed_16_16()?;
                let _vertical_resolution = data.read_fixed_16_16()?;
                let _data_size = data.read_i32()?;
                let frame_count = data.read_i16()?;
                let compressor = data.read_fourcc()?;
                let depth = data.read_u16()?;
                let _color_table_id = data.read_i16()?;
                SampleMedia::Video {
                    width,
                    height,
                    frame_count,
                    compressor,
                    depth,
                }
            }
            b"soun" => {
                let _vendor = data.read_u32()?;
                let channels = data.read_u16()?;
                let bits_per_sample = data.read_u16()?;
                let compression_id = data.read_i16()?;
                let packet_size = data.read_u16()?;
                let sample_rate = data.read_ufixed_16_16()?;
                SampleMedia::Audio {
                    channels,
                    bits_per_sample,
                    compression_id,
                    packet_size,
                    sample_rate,
                }
            }
            _ => SampleMedia::Other,
        };
        entries.push(SampleEntry {
            size,
            format,
            data_reference_index,
            media,
        });
    }
    Ok(SampleDescription { entries })
}

fn project(movie: &Movie) -> Result<MediaFile> {
    let header = movie
        .header
        .as_ref()
        .ok_or_else(|| ParseError::Invariant("QuickTime movie has no mvhd atom".into()))?;
    let timescale = f64::from(header.timescale);

    let mut media = MediaFile::new("QuickTime");
    for track in &movie.tracks {
        let Some(handler) = &track.handler else {
            continue;
        };
        let Some(sample_entry) = track
            .sample_description
            .as_ref()
            .and_then(|d| d.entries.first())
        else {
            continue;
        };
        match &handler.subtype {
            b"vide" => {
                let SampleMedia::Video { width, height, .. } = sample_entry.media else {
                    continue;
                };
                // Framerate from the run-length time-to-sample table:
                // timescale over the mean sample duration.
                let mut total_duration = 0u64;
                let mut frames = 0u64;
                if let Some(stts) = &track.time_to_sample {
                    for (count, duration) in &stts.entries {
                        total_duration += u64::from(*count) * u64::from(*duration);
                        frames += u64::from(*count);
                    }
                }
                let (framerate, duration) = if frames > 0 && timescale > 0.0 {
                    (
                        timescale / (total_duration as f64 / frames as f64),
                        Some(total_duration as f64 / timescale),
                    )
                } else {
                    (0.0, None)
                };
                media.insert_stream(
                    None,
                    StreamDescriptor::Video(VideoStream {
                        width: width.max(0) as u32,
                        height: height.max(0) as u32,
                        framerate,
                        duration,
                        codec: fourcc_to_string(&sample_entry.format),
                    }),
                );
            }
            b"soun" => {
                let SampleMedia::Audio {
                    channels,
                    bits_per_sample,
                    sample_rate,
                    ..
                } = sample_entry.media
                else {
                    continue;
                };
                media.insert_stream(
                    None,
                    StreamDescriptor::Audio(AudioStream {
                        channels: u32::from(channels),
                        sample_rate,
                        bits_per_sample: u32::from(bits_per_sample),
                        duration: None,
                        codec: fourcc_to_string(&sample_entry.format),
                    }),
                );
            }
            _ => {}
        }
    }
    Ok(media)
}
