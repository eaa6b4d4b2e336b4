use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::io::{self, Read, Seek, SeekFrom};

/// Byte order used for multi-byte integer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("truncated data: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("structural invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// A subsegment cursor over bytes copied out of a parent cursor.
pub type MemCursor = ByteCursor<io::Cursor<Vec<u8>>>;

/// Bounds-checked, endian-aware reader over a finite byte source.
///
/// The cursor tracks its own position against a declared total length;
/// any read that would cross that length fails with
/// [`ParseError::Truncated`] instead of returning short data. This is the
/// single mechanism by which bogus "declared size" fields in container
/// headers are caught.
pub struct ByteCursor<R> {
    inner: R,
    len: u64,
    pos: u64,
    order: ByteOrder,
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(inner: R, len: u64, order: ByteOrder) -> Self {
        Self {
            inner,
            len,
            pos: 0,
            order,
        }
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes between the current position and the end of the cursor.
    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    /// True while the position has not reached the declared length.
    pub fn bytes_left(&self) -> bool {
        self.pos < self.len
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(ParseError::Truncated {
                offset: pos,
                needed: 0,
                available: 0,
            });
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    /// Advance past `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.ensure(n)?;
        let target = self.pos + n;
        self.inner.seek(SeekFrom::Start(target))?;
        self.pos = target;
        Ok(())
    }

    fn ensure(&self, n: u64) -> Result<()> {
        let available = self.len - self.pos;
        if n > available {
            return Err(ParseError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.inner.read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        let v = self.inner.read_i8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_u16::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_u16::<BigEndian>()?,
        };
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_i16::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_i16::<BigEndian>()?,
        };
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_u32::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_u32::<BigEndian>()?,
        };
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_i32::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_i32::<BigEndian>()?,
        };
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_u64::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_u64::<BigEndian>()?,
        };
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_i64::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_i64::<BigEndian>()?,
        };
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_f32::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_f32::<BigEndian>()?,
        };
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        let v = match self.order {
            ByteOrder::Little => self.inner.read_f64::<LittleEndian>()?,
            ByteOrder::Big => self.inner.read_f64::<BigEndian>()?,
        };
        self.pos += 8;
        Ok(v)
    }

    /// Read exactly `n` bytes or fail.
    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let mut buf = vec![0u8; n as usize];
        self.inner.read_exact(&mut buf)?;
        self.pos += n;
        Ok(buf)
    }

    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.ensure(4)?;
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        self.pos += 4;
        Ok(buf)
    }

    /// Carve out the next `n` bytes as an independent child cursor.
    ///
    /// The child inherits the parent's byte order and is bounded at `n`
    /// bytes, so a malformed inner size field cannot let parsing run past
    /// the declared extent of the enclosing structure. The parent advances
    /// by `n`.
    pub fn read_subsegment(&mut self, n: u64) -> Result<MemCursor> {
        let data = self.read_bytes(n)?;
        Ok(ByteCursor {
            inner: io::Cursor::new(data),
            len: n,
            pos: 0,
            order: self.order,
        })
    }

    /// Read `chars` UTF-16 code units in the cursor's byte order.
    pub fn read_utf16(&mut self, chars: u64, null_terminated: bool) -> Result<String> {
        let mut data = self.read_bytes(chars * 2)?;
        if null_terminated && data.len() >= 2 {
            data.truncate(data.len() - 2);
        }
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| match self.order {
                ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
                ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
            })
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Read a 128-bit GUID and render it in the canonical
    /// `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` form.
    ///
    /// The first three fields follow the cursor's byte order; the clock
    /// sequence and the 6-byte node field are big-endian per the RFC 4122
    /// wire layout.
    pub fn read_guid(&mut self) -> Result<String> {
        let time_low = self.read_u32()?;
        let time_mid = self.read_u16()?;
        let time_hi = self.read_u16()?;
        let clock_hi = self.read_u8()?;
        let clock_lo = self.read_u8()?;
        let node_bytes = self.read_bytes(6)?;
        let node = decode_uint_var(&node_bytes, ByteOrder::Big);
        Ok(format!(
            "{time_low:08X}-{time_mid:04X}-{time_hi:04X}-{clock_hi:02X}{clock_lo:02X}-{node:012X}"
        ))
    }

    /// u32 seconds since 1904-01-01 (QuickTime epoch).
    pub fn read_mac_timestamp(&mut self) -> Result<NaiveDateTime> {
        let secs = self.read_u32()?;
        Ok(mac_epoch() + Duration::seconds(i64::from(secs)))
    }

    /// u64 100-nanosecond ticks since 1601-01-01 (Windows FILETIME epoch).
    pub fn read_windows_timestamp(&mut self) -> Result<NaiveDateTime> {
        let ticks = self.read_u64()?;
        let micros = (ticks / 10).min(i64::MAX as u64) as i64;
        Ok(windows_epoch() + Duration::microseconds(micros))
    }

    /// Signed 16.16 fixed-point fraction.
    pub fn read_fixed_16_16(&mut self) -> Result<f64> {
        let int_part = self.read_i16()?;
        let frac = self.read_u16()?;
        Ok(f64::from(int_part) + f64::from(frac) / 65536.0)
    }

    /// Unsigned 16.16 fixed-point fraction (QuickTime audio sample rates).
    pub fn read_ufixed_16_16(&mut self) -> Result<f64> {
        let int_part = self.read_u16()?;
        let frac = self.read_u16()?;
        Ok(f64::from(int_part) + f64::from(frac) / 65536.0)
    }
}

fn mac_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1904, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn windows_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1601, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Accumulate a variable-width unsigned integer from raw bytes.
///
/// Shared by the EBML class-id/size decoding and the GUID node field.
pub fn decode_uint_var(bytes: &[u8], order: ByteOrder) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match order {
        ByteOrder::Big => bytes.iter().fold(0, fold),
        ByteOrder::Little => bytes.iter().rev().fold(0, fold),
    }
}
