use serde::Serialize;
use std::collections::BTreeMap;

/// One elementary video stream, normalized across containers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStream {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    /// Seconds; absent when the container does not declare one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub codec: String,
}

/// One elementary audio stream, normalized across containers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStream {
    pub channels: u32,
    pub sample_rate: f64,
    pub bits_per_sample: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamDescriptor {
    Video(VideoStream),
    Audio(AudioStream),
}

/// Container-agnostic parse result: a format label plus an ordered,
/// insertion-indexed collection of stream descriptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFile {
    pub container: String,
    streams: BTreeMap<u32, StreamDescriptor>,
    /// Per-stream average-bitrate samples declared by the container
    /// (ASF extended stream properties, RealMedia file properties),
    /// consumed by the integrity verifier.
    pub data_bitrates: Vec<u32>,
}

impl MediaFile {
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            streams: BTreeMap::new(),
            data_bitrates: Vec::new(),
        }
    }

    /// Add a stream at an explicit container-assigned index, or at the
    /// next sequential index when the container does not number streams.
    pub fn insert_stream(&mut self, index: Option<u32>, descriptor: StreamDescriptor) {
        let index = index.unwrap_or(self.streams.len() as u32 + 1);
        self.streams.insert(index, descriptor);
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Streams in index order.
    pub fn streams(&self) -> impl Iterator<Item = (u32, &StreamDescriptor)> {
        self.streams.iter().map(|(idx, s)| (*idx, s))
    }

    pub fn stream(&self, index: u32) -> Option<&StreamDescriptor> {
        self.streams.get(&index)
    }

    pub fn video_streams(&self) -> impl Iterator<Item = &VideoStream> {
        self.streams.values().filter_map(|s| match s {
            StreamDescriptor::Video(v) => Some(v),
            StreamDescriptor::Audio(_) => None,
        })
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &AudioStream> {
        self.streams.values().filter_map(|s| match s {
            StreamDescriptor::Audio(a) => Some(a),
            StreamDescriptor::Video(_) => None,
        })
    }
}

/// What a single parser attempt concluded about a byte source.
///
/// `NotThisFormat` is an expected outcome, not an error: the dispatcher
/// reacts to it by trying the next registered parser.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(MediaFile),
    NotThisFormat,
}
