//! Media data model shared by every part of the engine.
//!
//! This module provides:
//! - The immutable [`Frame`] record flowing from sources to subscribers
//! - [`MediaInfo`] track descriptors with the pending-configuration state
//! - The [`Transcoder`] hook applied to frames before dispatch

pub mod frame;
pub mod info;

pub use frame::{Codec, Frame, FrameContent, FrameFlavor, FrameKey, StreamTag, Timestamp};
pub use info::{AudioParams, FlowType, MediaInfo, Tracks, VideoParams};

/// Optional frame transformer applied between the source and everything else.
///
/// The transcoder owns its internal state and may drop a frame by returning
/// `None`. Heavy transcoding belongs in an out-of-process collaborator; this
/// hook is for cheap rewrites (timestamp fixups, filtering, repackaging).
pub trait Transcoder: Send + 'static {
    fn apply(&mut self, frame: Frame) -> Option<Frame>;
}
