pub mod asf;
pub mod avi;
pub mod cursor;
pub mod matroska;
pub mod model;
pub mod probe;
pub mod quicktime;
pub mod realmedia;
pub mod verify;
pub mod waveformat;

pub use cursor::{ByteCursor, ByteOrder, MemCursor, ParseError, decode_uint_var};
pub use model::{AudioStream, MediaFile, ParseOutcome, StreamDescriptor, VideoStream};
pub use probe::{Format, probe_path, probe_reader};
pub use verify::{Verification, verify_media, verify_size};
