//! Bounded in-memory timeshift storage.
//!
//! Wrapped around a live stream so that passive clients can seek into the
//! recent past. Frames are keyed by a monotonically increasing counter;
//! pruning drops whole leading GOPs so a reader landing at the window edge
//! still starts on a keyframe. Codec-configuration frames are retained at
//! the logical head of the window.

use std::collections::VecDeque;
use std::time::Duration;

use crate::media::{Frame, FrameKey, Timestamp};

use super::{ReadOutcome, SeekDirection, SeekPosition, Storage, StorageProperties};

/// In-memory ring of recent frames over a fixed time window.
#[derive(Debug, Default)]
pub struct TimeshiftBuffer {
    /// Window span in milliseconds.
    window_ms: u64,
    /// Stored frames with their assigned keys, oldest first.
    frames: VecDeque<(FrameKey, Frame)>,
    /// Next key to assign.
    next_key: FrameKey,
    /// Stored payload bytes.
    bytes: usize,
}

impl TimeshiftBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Oldest retained DTS.
    fn start_dts(&self) -> Option<Timestamp> {
        self.frames.front().map(|(_, f)| f.dts)
    }

    /// Newest retained DTS.
    fn end_dts(&self) -> Option<Timestamp> {
        self.frames.back().map(|(_, f)| f.dts)
    }

    /// Position of the first stored frame with key >= `key`.
    fn position_at(&self, key: FrameKey) -> Option<usize> {
        // Keys are dense and sorted; partition_point is a binary search.
        let idx = self.frames.partition_point(|(k, _)| *k < key);
        (idx < self.frames.len()).then_some(idx)
    }

    /// Drop leading frames outside the window, keeping keyframe alignment:
    /// the buffer never starts on a frame that needs an earlier keyframe.
    fn prune(&mut self) {
        let Some(end) = self.end_dts() else { return };
        let horizon = end.saturating_sub(self.window_ms);

        // Find the last keyframe at or before the horizon cut; everything
        // before it can go.
        let mut cut = 0;
        for (idx, (_, frame)) in self.frames.iter().enumerate() {
            if frame.dts > horizon {
                break;
            }
            if frame.is_keyframe() {
                cut = idx;
            }
        }

        // Config frames survive pruning with their original keys so late
        // readers still initialize their decoders; keys stay sorted because
        // retained entries predate the cut.
        let mut retained = Vec::new();
        for _ in 0..cut {
            let Some((key, dropped)) = self.frames.pop_front() else {
                break;
            };
            if dropped.is_config() {
                retained.push((key, dropped));
            } else {
                self.bytes -= dropped.size();
            }
        }
        for entry in retained.into_iter().rev() {
            self.frames.push_front(entry);
        }
    }
}

impl Storage for TimeshiftBuffer {
    fn read_frame(&mut self, key: Option<FrameKey>) -> ReadOutcome {
        let idx = match key {
            None => {
                if self.frames.is_empty() {
                    return ReadOutcome::Eof;
                }
                0
            }
            Some(key) => match self.position_at(key) {
                Some(idx) => idx,
                None => return ReadOutcome::Eof,
            },
        };

        let (_, frame) = &self.frames[idx];
        let mut out = frame.clone();
        out.next = self.frames.get(idx + 1).map(|(k, _)| *k);
        ReadOutcome::Frame(out)
    }

    fn seek(&mut self, dts: Timestamp, _direction: SeekDirection) -> Option<SeekPosition> {
        let mut before: Option<SeekPosition> = None;
        for (key, frame) in &self.frames {
            if !frame.is_keyframe() {
                continue;
            }
            if frame.dts >= dts {
                return Some(SeekPosition {
                    key: *key,
                    dts: frame.dts,
                });
            }
            before = Some(SeekPosition {
                key: *key,
                dts: frame.dts,
            });
        }
        before
    }

    fn properties(&self) -> StorageProperties {
        let duration = match (self.start_dts(), self.end_dts()) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        StorageProperties {
            duration,
            start_dts: self.start_dts(),
            frame_count: self.frames.len(),
            size_bytes: self.bytes,
        }
    }

    fn write_frame(&mut self, frame: &Frame) {
        let key = self.next_key;
        self.next_key += 1;
        self.bytes += frame.size();
        self.frames.push_back((key, frame.clone()));
        self.prune();
    }

    fn reclaim(&mut self) {
        self.prune();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::media::Codec;

    use super::*;

    fn keyframe(dts: Timestamp) -> Frame {
        Frame::keyframe(Codec::H264, dts, dts, Bytes::from_static(&[0; 8]))
    }

    fn inter(dts: Timestamp) -> Frame {
        Frame::video(Codec::H264, dts, dts, Bytes::from_static(&[0; 4]))
    }

    #[test]
    fn test_read_walks_keys() {
        let mut buf = TimeshiftBuffer::new(Duration::from_secs(60));
        buf.write_frame(&keyframe(0));
        buf.write_frame(&inter(40));
        buf.write_frame(&inter(80));

        let ReadOutcome::Frame(first) = buf.read_frame(None) else {
            panic!("expected a frame");
        };
        assert_eq!(first.dts, 0);
        let next = first.next.expect("successor key");

        let ReadOutcome::Frame(second) = buf.read_frame(Some(next)) else {
            panic!("expected a frame");
        };
        assert_eq!(second.dts, 40);

        // Walking past the end hits EOF.
        let ReadOutcome::Frame(third) = buf.read_frame(second.next) else {
            panic!("expected a frame");
        };
        assert!(third.next.is_none());
        assert!(buf.read_frame(Some(99)).is_eof());
    }

    #[test]
    fn test_seek_prefers_keyframe_at_or_after() {
        let mut buf = TimeshiftBuffer::new(Duration::from_secs(60));
        buf.write_frame(&keyframe(0));
        buf.write_frame(&inter(40));
        buf.write_frame(&keyframe(1000));
        buf.write_frame(&inter(1040));

        let pos = buf.seek(500, SeekDirection::After).unwrap();
        assert_eq!(pos.dts, 1000);

        // Past the last keyframe: fall back to the one before.
        let pos = buf.seek(5000, SeekDirection::After).unwrap();
        assert_eq!(pos.dts, 1000);

        // Seek target resolves to a keyframe whose DTS matches the reply.
        let ReadOutcome::Frame(frame) = buf.read_frame(Some(pos.key)) else {
            panic!("expected a frame");
        };
        assert!(frame.is_keyframe());
        assert_eq!(frame.dts, pos.dts);
    }

    #[test]
    fn test_seek_empty_buffer() {
        let mut buf = TimeshiftBuffer::new(Duration::from_secs(60));
        assert!(buf.seek(0, SeekDirection::After).is_none());
        assert!(buf.read_frame(None).is_eof());
    }

    #[test]
    fn test_prune_keeps_keyframe_alignment() {
        let mut buf = TimeshiftBuffer::new(Duration::from_millis(1000));
        buf.write_frame(&keyframe(0));
        buf.write_frame(&inter(500));
        buf.write_frame(&keyframe(1000));
        buf.write_frame(&inter(1500));
        buf.write_frame(&keyframe(2500));

        // Window is 1000ms ending at 2500: the GOP starting at 0 is gone.
        let props = buf.properties();
        assert!(props.start_dts.unwrap() >= 1000);

        let ReadOutcome::Frame(first) = buf.read_frame(None) else {
            panic!("expected a frame");
        };
        assert!(first.is_keyframe());
    }

    #[test]
    fn test_properties_duration() {
        let mut buf = TimeshiftBuffer::new(Duration::from_secs(60));
        assert_eq!(buf.properties().duration, None);

        buf.write_frame(&keyframe(100));
        buf.write_frame(&inter(600));
        let props = buf.properties();
        assert_eq!(props.duration, Some(500));
        assert_eq!(props.frame_count, 2);
        assert_eq!(props.size_bytes, 12);
    }
}
