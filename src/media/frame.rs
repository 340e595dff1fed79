//! The immutable unit of media flowing through a stream.
//!
//! A [`Frame`] is designed to be cheap to clone: the body is reference
//! counted via `Bytes`, so fan-out to many subscribers shares one
//! allocation. Per-client stamping only rewrites the small `stream_tag`
//! field on a shallow copy.

use std::sync::Arc;

use bytes::Bytes;

/// Decode/presentation timestamp in milliseconds relative to stream origin.
pub type Timestamp = u64;

/// Opaque storage key identifying one frame inside a [`Storage`] backing.
///
/// [`Storage`]: crate::storage::Storage
pub type FrameKey = u64;

/// Opaque per-client tag stamped onto every frame delivered to that client.
///
/// Cheap to clone; comparison is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTag(Arc<str>);

impl StreamTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(Arc::from(tag.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What kind of payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameContent {
    Audio,
    Video,
    Metadata,
}

/// Role of the frame inside its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlavor {
    /// Codec configuration (sequence headers, decoder config records).
    Config,
    /// A seekable frame.
    Keyframe,
    /// An ordinary content frame.
    Frame,
}

/// Codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
    Av1,
    Vp8,
    Aac,
    Mp3,
    Opus,
    Pcm,
    /// Script/metadata payloads.
    Meta,
}

impl Codec {
    /// Whether this codec identifies a video track.
    pub fn is_video(&self) -> bool {
        matches!(self, Codec::H264 | Codec::Hevc | Codec::Av1 | Codec::Vp8)
    }

    /// Whether this codec identifies an audio track.
    pub fn is_audio(&self) -> bool {
        matches!(self, Codec::Aac | Codec::Mp3 | Codec::Opus | Codec::Pcm)
    }
}

/// One immutable media record.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Payload kind.
    pub content: FrameContent,
    /// Role inside the track.
    pub flavor: FrameFlavor,
    /// Codec of the payload.
    pub codec: Codec,
    /// Decode timestamp, milliseconds.
    pub dts: Timestamp,
    /// Presentation timestamp, milliseconds.
    pub pts: Timestamp,
    /// Payload (zero-copy via reference counting).
    pub body: Bytes,
    /// Per-client tag; stamped by the dispatcher, absent on the source side.
    pub stream_tag: Option<StreamTag>,
    /// Successor key, set by storage reads to drive the next pull.
    pub next: Option<FrameKey>,
}

impl Frame {
    /// Create a video content frame.
    pub fn video(codec: Codec, dts: Timestamp, pts: Timestamp, body: Bytes) -> Self {
        Self {
            content: FrameContent::Video,
            flavor: FrameFlavor::Frame,
            codec,
            dts,
            pts,
            body,
            stream_tag: None,
            next: None,
        }
    }

    /// Create a video keyframe.
    pub fn keyframe(codec: Codec, dts: Timestamp, pts: Timestamp, body: Bytes) -> Self {
        Self {
            flavor: FrameFlavor::Keyframe,
            ..Self::video(codec, dts, pts, body)
        }
    }

    /// Create an audio content frame.
    pub fn audio(codec: Codec, dts: Timestamp, body: Bytes) -> Self {
        Self {
            content: FrameContent::Audio,
            flavor: FrameFlavor::Frame,
            codec,
            dts,
            pts: dts,
            body,
            stream_tag: None,
            next: None,
        }
    }

    /// Create a video codec-configuration frame.
    pub fn video_config(codec: Codec, dts: Timestamp, body: Bytes) -> Self {
        Self {
            flavor: FrameFlavor::Config,
            ..Self::video(codec, dts, dts, body)
        }
    }

    /// Create an audio codec-configuration frame.
    pub fn audio_config(codec: Codec, dts: Timestamp, body: Bytes) -> Self {
        Self {
            flavor: FrameFlavor::Config,
            ..Self::audio(codec, dts, body)
        }
    }

    /// Create a metadata frame.
    pub fn metadata(dts: Timestamp, body: Bytes) -> Self {
        Self {
            content: FrameContent::Metadata,
            flavor: FrameFlavor::Frame,
            codec: Codec::Meta,
            dts,
            pts: dts,
            body,
            stream_tag: None,
            next: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.content == FrameContent::Video
    }

    pub fn is_audio(&self) -> bool {
        self.content == FrameContent::Audio
    }

    pub fn is_metadata(&self) -> bool {
        self.content == FrameContent::Metadata
    }

    /// Whether this frame carries codec configuration.
    pub fn is_config(&self) -> bool {
        self.flavor == FrameFlavor::Config
    }

    /// Whether this frame is a seekable keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flavor == FrameFlavor::Keyframe
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Shallow copy with the given per-client tag stamped on.
    pub fn with_tag(&self, tag: Option<&StreamTag>) -> Self {
        Self {
            stream_tag: tag.cloned(),
            ..self.clone()
        }
    }

    /// Shallow copy with DTS/PTS shifted by a signed delta, clamped at zero.
    pub fn shifted(&self, delta: i64) -> Self {
        let shift = |ts: Timestamp| (ts as i64 + delta).max(0) as Timestamp;
        Self {
            dts: shift(self.dts),
            pts: shift(self.pts),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_predicates() {
        let config = Frame::video_config(Codec::H264, 0, Bytes::from_static(&[1, 2, 3]));
        assert!(config.is_video());
        assert!(config.is_config());
        assert!(!config.is_keyframe());

        let key = Frame::keyframe(Codec::H264, 40, 40, Bytes::from_static(&[4]));
        assert!(key.is_keyframe());
        assert!(!key.is_config());

        let audio = Frame::audio(Codec::Aac, 20, Bytes::from_static(&[5, 6]));
        assert!(audio.is_audio());
        assert_eq!(audio.pts, audio.dts);
        assert_eq!(audio.size(), 2);
    }

    #[test]
    fn test_with_tag_shares_body() {
        let frame = Frame::video(Codec::H264, 0, 0, Bytes::from_static(&[1, 2, 3]));
        let tagged = frame.with_tag(Some(&StreamTag::new("A")));

        assert_eq!(tagged.stream_tag.as_ref().unwrap().as_str(), "A");
        // Same allocation underneath.
        assert_eq!(tagged.body.as_ptr(), frame.body.as_ptr());
    }

    #[test]
    fn test_shifted_clamps_at_zero() {
        let frame = Frame::video(Codec::H264, 100, 120, Bytes::new());

        let forward = frame.shifted(50);
        assert_eq!(forward.dts, 150);
        assert_eq!(forward.pts, 170);

        let backward = frame.shifted(-200);
        assert_eq!(backward.dts, 0);
        assert_eq!(backward.pts, 0);
    }

    #[test]
    fn test_codec_classification() {
        assert!(Codec::H264.is_video());
        assert!(Codec::Aac.is_audio());
        assert!(!Codec::Meta.is_video());
        assert!(!Codec::Meta.is_audio());
    }
}
