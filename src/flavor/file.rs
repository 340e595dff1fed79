//! Flavor for file-backed streams.

use tracing::debug;

use crate::flavor::{Flavor, FlavorContext, StopReason};
use crate::media::{FlowType, MediaInfo};
use crate::storage::{ReadOutcome, Storage};
use crate::stream::config::StreamKind;

/// Flavor that serves a pre-existing storage backing.
///
/// Installs the supplied storage at init and classifies the stream as
/// [`StreamKind::File`], so started clients are driven passively by
/// tickers. Track descriptors are taken from the first of: descriptors
/// supplied via [`with_media_info`](Self::with_media_info), descriptors
/// seeded through the stream configuration, and codec-configuration frames
/// peeked from the head of storage. Tracks still pending after that resolve
/// to empty lists; there is no live configuration hand-shake to wait for.
pub struct FileFlavor {
    storage: Option<Box<dyn Storage>>,
    media_info: Option<MediaInfo>,
}

impl FileFlavor {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage: Some(storage),
            media_info: None,
        }
    }

    /// Supply track descriptors known ahead of time (e.g. from a container
    /// index). Takes precedence over configuration-seeded descriptors and
    /// the storage-head peek.
    pub fn with_media_info(mut self, info: MediaInfo) -> Self {
        self.media_info = Some(info);
        self
    }

    /// Fill still-pending tracks from the codec-configuration frames at the
    /// head of storage. Stops at the first content frame; a file's config
    /// frames precede its media.
    fn seed_from_storage(storage: &mut Box<dyn Storage>, info: &mut MediaInfo) {
        let mut key = None;
        loop {
            let frame = match storage.read_frame(key) {
                ReadOutcome::Frame(frame) => frame,
                ReadOutcome::Eof => break,
            };
            if !frame.is_config() {
                break;
            }
            if (frame.is_video() && info.video.is_wait())
                || (frame.is_audio() && info.audio.is_wait())
            {
                info.apply_config(&frame);
            }
            if info.is_ready() {
                break;
            }
            key = match frame.next {
                Some(next) => Some(next),
                None => break,
            };
        }
    }
}

impl Flavor for FileFlavor {
    fn init(&mut self, ctx: &mut FlavorContext<'_>) -> Result<(), StopReason> {
        let mut storage = self
            .storage
            .take()
            .ok_or_else(|| StopReason::Error("file flavor initialized twice".into()))?;

        // Explicit descriptors win; otherwise keep whatever the stream
        // configuration seeded.
        let mut info = match self.media_info.take() {
            Some(info) => info,
            None => ctx.media_info().clone(),
        };
        if !info.is_ready() {
            Self::seed_from_storage(&mut storage, &mut info);
        }
        info.resolve_waits();
        info.flow = FlowType::File;

        ctx.install_storage(storage);
        ctx.set_kind(StreamKind::File);
        ctx.set_media_info(info);

        debug!(
            stream = %ctx.name(),
            properties = ?ctx.storage_properties(),
            "File stream initialized"
        );
        Ok(())
    }
}
