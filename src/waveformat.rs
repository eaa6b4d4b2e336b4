//! WAVEFORMATEX / BITMAPINFOHEADER records and the codec-id table shared
//! by the ASF and AVI parsers.

use crate::cursor::{ByteCursor, Result};
use std::io::{Read, Seek};

/// WAVEFORMATEX codec-id tag to codec name.
pub const WAVE_CODEC_IDS: &[(u16, &str)] = &[
    (0x0001, "A_PCM/INT/LIT"),
    (0x0050, "MP2"),
    (0x0055, "MP3"),
    (0x0130, "A_REAL/SIPR"),
    (0x0160, "WMA2"),
    (0x0161, "WMA2"),
    (0x0162, "WMAP"),
    (0x0270, "A_REAL/ATRC"),
    (0x2000, "A_AC3"),
    (0x2001, "A_DTS"),
    (0x2002, "A_REAL/14_4"),
    (0x2003, "A_REAL/28_8"),
    (0x2004, "A_REAL/COOK"),
];

pub fn wave_codec_name(codec_id: u16) -> Option<&'static str> {
    WAVE_CODEC_IDS
        .iter()
        .find(|(id, _)| *id == codec_id)
        .map(|(_, name)| *name)
}

/// Printable rendition of a four-character code; non-ASCII bytes become `.`.
pub fn fourcc_to_string(fourcc: &[u8; 4]) -> String {
    fourcc
        .iter()
        .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
        .collect()
}

/// Fixed-layout audio format descriptor.
#[derive(Debug, Clone)]
pub struct WaveFormatEx {
    pub codec_id: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub codec_data: Vec<u8>,
}

impl WaveFormatEx {
    /// Mapped codec name, falling back to the raw format tag in hex.
    pub fn codec_name(&self) -> String {
        match wave_codec_name(self.codec_id) {
            Some(name) => name.to_string(),
            None => format!("{:#06x}", self.codec_id),
        }
    }
}

pub fn read_waveformatex<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<WaveFormatEx> {
    let codec_id = cur.read_u16()?;
    let channels = cur.read_u16()?;
    let sample_rate = cur.read_u32()?;
    let avg_bytes_per_sec = cur.read_u32()?;
    let block_align = cur.read_u16()?;
    let bits_per_sample = cur.read_u16()?;
    let codec_size = cur.read_u16()?;
    let codec_data = cur.read_bytes(u64::from(codec_size))?;
    Ok(WaveFormatEx {
        codec_id,
        channels,
        sample_rate,
        avg_bytes_per_sec,
        block_align,
        bits_per_sample,
        codec_data,
    })
}

/// Fixed-layout video format descriptor; the compression tag is the codec.
#[derive(Debug, Clone)]
pub struct BitmapInfoHeader {
    pub header_size: u32,
    pub width: u32,
    pub height: u32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: [u8; 4],
    pub image_size: u32,
    pub h_pixels_per_meter: u32,
    pub v_pixels_per_meter: u32,
    pub colors_used: u32,
    pub colors_important: u32,
    pub codec_data: Vec<u8>,
}

impl BitmapInfoHeader {
    pub fn codec_name(&self) -> String {
        fourcc_to_string(&self.compression)
    }
}

pub fn read_bitmapinfoheader<R: Read + Seek>(cur: &mut ByteCursor<R>) -> Result<BitmapInfoHeader> {
    let header_size = cur.read_u32()?;
    let width = cur.read_u32()?;
    let height = cur.read_u32()?;
    let planes = cur.read_u16()?;
    let bits_per_pixel = cur.read_u16()?;
    let compression = cur.read_fourcc()?;
    let image_size = cur.read_u32()?;
    let h_pixels_per_meter = cur.read_u32()?;
    let v_pixels_per_meter = cur.read_u32()?;
    let colors_used = cur.read_u32()?;
    let colors_important = cur.read_u32()?;
    // Anything the header declares beyond the 40 fixed bytes is
    // codec-specific data.
    let extra = u64::from(header_size.saturating_sub(40));
    let codec_data = cur.read_bytes(extra.min(cur.remaining()))?;
    Ok(BitmapInfoHeader {
        header_size,
        width,
        height,
        planes,
        bits_per_pixel,
        compression,
        image_size,
        h_pixels_per_meter,
        v_pixels_per_meter,
        colors_used,
        colors_important,
        codec_data,
    })
}
