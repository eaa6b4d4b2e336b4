//! Container format dispatch.
//!
//! The dispatcher holds a fixed, compile-time list of format parsers. The
//! file extension picks which parser runs first, but it is only a hint:
//! when the hinted parser rejects the bytes, every other parser gets a
//! turn, in registration order.

use crate::cursor::{ByteCursor, ByteOrder, ParseError, Result};
use crate::model::{MediaFile, ParseOutcome};
use crate::{asf, avi, matroska, quicktime, realmedia};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Asf,
    Matroska,
    Avi,
    RealMedia,
    QuickTime,
}

impl Format {
    /// Registration order; the fallback scan tries parsers in this order.
    pub const ALL: [Format; 5] = [
        Format::Asf,
        Format::Matroska,
        Format::Avi,
        Format::RealMedia,
        Format::QuickTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Format::Asf => "ASF",
            Format::Matroska => "Matroska",
            Format::Avi => "AVI",
            Format::RealMedia => "RealMedia",
            Format::QuickTime => "QuickTime",
        }
    }

    pub fn for_extension(extension: &str) -> Option<Format> {
        let extension = extension.to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&extension.as_str()))
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Asf => asf::FILE_EXTENSIONS,
            Format::Matroska => matroska::FILE_EXTENSIONS,
            Format::Avi => avi::FILE_EXTENSIONS,
            Format::RealMedia => realmedia::FILE_EXTENSIONS,
            Format::QuickTime => quicktime::FILE_EXTENSIONS,
        }
    }

    fn run<R: Read + Seek>(self, cur: &mut ByteCursor<R>) -> Result<ParseOutcome> {
        match self {
            Format::Asf => asf::parse(cur),
            Format::Matroska => matroska::parse(cur),
            Format::Avi => avi::parse(cur),
            Format::RealMedia => realmedia::parse(cur),
            Format::QuickTime => quicktime::parse(cur),
        }
    }
}

/// Probe a file on disk.
///
/// Returns `Ok(None)` when no parser recognizes the content; that is an
/// expected outcome for arbitrary input, not an error. Only I/O failures
/// propagate as errors.
pub fn probe_path(path: &Path) -> Result<Option<MediaFile>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let extension = path.extension().and_then(|e| e.to_str());
    probe_reader(BufReader::new(file), len, extension)
}

/// Probe an arbitrary byte source of known length.
///
/// `extension` is the extension hint; the parser claiming it is tried
/// first.
pub fn probe_reader<R: Read + Seek>(
    inner: R,
    len: u64,
    extension: Option<&str>,
) -> Result<Option<MediaFile>> {
    let mut cur = ByteCursor::new(inner, len, ByteOrder::Little);
    let hinted = extension.and_then(Format::for_extension);

    let mut order = Vec::with_capacity(Format::ALL.len());
    order.extend(hinted);
    order.extend(Format::ALL.into_iter().filter(|f| Some(*f) != hinted));

    for format in order {
        cur.seek(0)?;
        match format.run(&mut cur) {
            Ok(ParseOutcome::Parsed(media)) => {
                tracing::debug!(format = format.name(), streams = media.stream_count(), "parsed");
                return Ok(Some(media));
            }
            Ok(ParseOutcome::NotThisFormat) => {
                tracing::debug!(format = format.name(), "signature mismatch");
            }
            Err(ParseError::Truncated {
                offset,
                needed,
                available,
            }) => {
                tracing::debug!(
                    format = format.name(),
                    offset,
                    needed,
                    available,
                    "truncated read, trying next parser"
                );
            }
            // Corrupt data masquerading as a known format is
            // indistinguishable from a wrong parser guess, so the scan
            // continues; the louder log level keeps it visible.
            Err(ParseError::Invariant(reason)) => {
                tracing::warn!(format = format.name(), %reason, "structural invariant violated");
            }
            Err(err @ ParseError::Io(_)) => return Err(err),
        }
    }
    Ok(None)
}
