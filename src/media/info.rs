//! Declarative description of a stream's tracks and codec configuration.
//!
//! A freshly opened live stream usually does not know its codec parameters
//! yet; tracks start in the [`Tracks::Wait`] state and are filled in when
//! the first configuration frames pass through the dispatcher. Callers that
//! ask for media info while a track is still pending are parked until the
//! configuration arrives or the wait expires.

use bytes::Bytes;

use super::frame::{Codec, Frame, Timestamp};

/// How the stream's timeline behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowType {
    /// Unbounded live timeline.
    #[default]
    Stream,
    /// Bounded, seekable timeline.
    File,
}

/// Track descriptors for one media kind, or the pending-config sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tracks<T> {
    /// Configuration has not arrived yet.
    #[default]
    Wait,
    /// Known track list; may be empty for streams without this media kind.
    Ready(Vec<T>),
}

impl<T> Tracks<T> {
    pub fn is_wait(&self) -> bool {
        matches!(self, Tracks::Wait)
    }

    /// Force a pending sentinel into an empty concrete list.
    pub fn resolve(&mut self) {
        if self.is_wait() {
            *self = Tracks::Ready(Vec::new());
        }
    }

    /// The track list, treating a pending sentinel as empty.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Tracks::Wait => &[],
            Tracks::Ready(tracks) => tracks,
        }
    }
}

/// Video track parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParams {
    pub codec: Codec,
    /// Raw codec configuration payload, when known.
    pub config: Option<Bytes>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Audio track parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    pub codec: Codec,
    /// Raw codec configuration payload, when known.
    pub config: Option<Bytes>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// Track descriptors plus codec configuration for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaInfo {
    pub flow: FlowType,
    pub video: Tracks<VideoParams>,
    pub audio: Tracks<AudioParams>,
    /// Total duration in milliseconds, when the backing knows it.
    pub duration: Option<Timestamp>,
}

impl MediaInfo {
    /// Info for a live stream with both tracks pending configuration.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Info for a stream known to carry no tracks yet.
    pub fn empty() -> Self {
        Self {
            video: Tracks::Ready(Vec::new()),
            audio: Tracks::Ready(Vec::new()),
            ..Self::default()
        }
    }

    /// Both tracks have concrete (possibly empty) descriptors.
    pub fn is_ready(&self) -> bool {
        !self.video.is_wait() && !self.audio.is_wait()
    }

    /// Force any pending sentinel into an empty track list.
    pub fn resolve_waits(&mut self) {
        self.video.resolve();
        self.audio.resolve();
    }

    /// Fold a codec-configuration frame into the track descriptors.
    ///
    /// Returns true if a pending track transitioned to ready.
    pub fn apply_config(&mut self, frame: &Frame) -> bool {
        debug_assert!(frame.is_config());
        if frame.is_video() {
            let was_wait = self.video.is_wait();
            self.video = Tracks::Ready(vec![VideoParams {
                codec: frame.codec,
                config: Some(frame.body.clone()),
                width: None,
                height: None,
            }]);
            was_wait
        } else if frame.is_audio() {
            let was_wait = self.audio.is_wait();
            self.audio = Tracks::Ready(vec![AudioParams {
                codec: frame.codec,
                config: Some(frame.body.clone()),
                sample_rate: None,
                channels: None,
            }]);
            was_wait
        } else {
            false
        }
    }
}
