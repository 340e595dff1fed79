//! Random-access frame storage behind a stream.
//!
//! A storage backing serves two purposes: passive (file-like) clients pull
//! frames from it one key at a time, and live streams can wrap one around
//! their recent past for timeshift. The actor owns the storage exclusively;
//! every call happens on the actor task, so implementations need no internal
//! locking.

pub mod timeshift;

use crate::media::{Frame, FrameKey, Timestamp};

pub use timeshift::TimeshiftBuffer;

/// Result of a single storage read.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// The frame at the requested key, with `frame.next` set to the
    /// successor key when one exists.
    Frame(Frame),
    /// No frame at or beyond the requested key.
    Eof,
}

impl ReadOutcome {
    pub fn is_eof(&self) -> bool {
        matches!(self, ReadOutcome::Eof)
    }
}

/// Which side of the target a seek may land on.
///
/// Currently advisory: seeks resolve to the first keyframe at or after the
/// target, falling back to the keyframe before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekDirection {
    Before,
    #[default]
    After,
}

/// A resolved seek target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPosition {
    pub key: FrameKey,
    pub dts: Timestamp,
}

/// Declarative facts about a storage backing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageProperties {
    /// Span of the stored timeline in milliseconds, when known.
    pub duration: Option<Timestamp>,
    /// DTS of the earliest stored frame.
    pub start_dts: Option<Timestamp>,
    /// Number of stored frames.
    pub frame_count: usize,
    /// Stored payload bytes.
    pub size_bytes: usize,
}

/// Capability exposed by every storage backing.
pub trait Storage: Send + 'static {
    /// Read one frame. `None` reads from the start of the backing.
    fn read_frame(&mut self, key: Option<FrameKey>) -> ReadOutcome;

    /// Resolve `dts` to the nearest usable keyframe.
    ///
    /// Policy: first keyframe at or after `dts`; if none, the keyframe
    /// strictly before. `None` when the backing holds no keyframe at all.
    fn seek(&mut self, dts: Timestamp, direction: SeekDirection) -> Option<SeekPosition>;

    /// Facts about the stored timeline, notably `duration`.
    fn properties(&self) -> StorageProperties;

    /// Append one frame. Only timeshift-style backings accept writes;
    /// read-only backings ignore them.
    fn write_frame(&mut self, _frame: &Frame) {}

    /// Housekeeping hint; backings may drop data outside their window.
    fn reclaim(&mut self) {}
}
