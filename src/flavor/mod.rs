//! The pluggable per-stream-type capability interface.
//!
//! All strategy that differs between file, live, and pull-protocol streams
//! lives behind the [`Flavor`] trait: four callbacks the actor invokes on
//! init, on every inbound frame, on control events, and on out-of-band
//! messages. Replies are tagged variants so the dispatcher is exhaustive.
//!
//! Flavor calls are fast in-process computation. A flavor that needs I/O
//! must offload it to its own task and come back through
//! [`StreamHandle::notify`].
//!
//! [`StreamHandle::notify`]: crate::stream::StreamHandle::notify

pub mod file;
pub mod live;

use std::any::Any;

use tokio::net::TcpStream;

use crate::media::{Frame, MediaInfo, Timestamp};
use crate::storage::{SeekDirection, SeekPosition, Storage, StorageProperties};
use crate::stream::actor::StreamCore;
use crate::stream::config::{StreamConfig, StreamKind};
use crate::stream::source::Source;

pub use file::FileFlavor;
pub use live::LiveFlavor;

/// Why a flavor wants the stream gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Orderly end of the stream.
    Normal,
    /// Deliberate teardown (e.g. source-loss policy).
    Shutdown,
    /// Something went wrong; carried for the termination log.
    Error(String),
}

/// Control events the core raises on [`Flavor::handle_control`].
pub enum ControlEvent {
    /// A new source was proposed; the flavor may substitute its own.
    SetSource(Source),
    /// Socket ownership was transferred to the stream.
    SetSocket(TcpStream),
    /// A seek query; the flavor may intercept before storage is consulted.
    SeekInfo {
        dts: Timestamp,
        direction: SeekDirection,
    },
    /// The liveness watch on the current source fired.
    SourceLost(Source),
    /// The source-loss grace period expired with no replacement.
    NoSource,
    /// No message arrived within the inactivity window while a source
    /// was present.
    Timeout,
    /// An unrecognized cast, forwarded verbatim.
    Message(Box<dyn Any + Send>),
}

impl std::fmt::Debug for ControlEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlEvent::SetSource(src) => f.debug_tuple("SetSource").field(src).finish(),
            ControlEvent::SetSocket(_) => f.write_str("SetSocket"),
            ControlEvent::SeekInfo { dts, direction } => f
                .debug_struct("SeekInfo")
                .field("dts", dts)
                .field("direction", direction)
                .finish(),
            ControlEvent::SourceLost(src) => f.debug_tuple("SourceLost").field(src).finish(),
            ControlEvent::NoSource => f.write_str("NoSource"),
            ControlEvent::Timeout => f.write_str("Timeout"),
            ControlEvent::Message(_) => f.write_str("Message"),
        }
    }
}

/// Values a flavor can reply with from [`Flavor::handle_control`].
#[derive(Debug)]
pub enum ControlValue {
    /// A (replacement) source to adopt.
    Source(Source),
    /// A resolved seek position, or none.
    Seek(Option<SeekPosition>),
}

/// Reply from [`Flavor::handle_control`].
#[derive(Debug)]
pub enum ControlReply {
    /// Rewrite the core's decision with this value.
    Reply(ControlValue),
    /// Let the core apply its default policy.
    NoReply,
    /// Terminate the stream.
    Stop(StopReason),
    /// Terminate the stream, but honor the value first.
    StopWithReply(StopReason, ControlValue),
}

/// Reply from [`Flavor::handle_frame`].
#[derive(Debug)]
pub enum FrameReply {
    /// Dispatch this (possibly rewritten) frame.
    Frame(Frame),
    /// The flavor consumed the frame; dispatch nothing.
    Consume,
    /// Terminate the stream.
    Stop(StopReason),
}

/// Reply from [`Flavor::handle_info`].
#[derive(Debug)]
pub enum InfoReply {
    NoReply,
    Stop(StopReason),
}

/// Controlled view of the stream state handed to flavor callbacks.
///
/// The actor never shares its state with other tasks; this borrow exists
/// only for the duration of one callback.
pub struct FlavorContext<'a> {
    core: &'a mut StreamCore,
}

impl<'a> FlavorContext<'a> {
    pub(crate) fn new(core: &'a mut StreamCore) -> Self {
        Self { core }
    }

    /// The stream's original configuration, including the opaque
    /// `clients_timeout` / `retry_limit` options the core does not
    /// interpret.
    pub fn config(&self) -> &StreamConfig {
        &self.core.config
    }

    /// Stream identity.
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    pub fn kind(&self) -> StreamKind {
        self.core.kind
    }

    /// Reclassify the stream; file-kind streams serve clients passively.
    pub fn set_kind(&mut self, kind: StreamKind) {
        self.core.kind = kind;
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.core.media_info
    }

    /// Replace the track descriptors. Pending `media_info` callers are
    /// answered after the callback returns if the new info is ready.
    pub fn set_media_info(&mut self, info: MediaInfo) {
        self.core.media_info = info;
    }

    /// Install the storage backing. Fails the stream at init when combined
    /// with the `timeshift` option.
    pub fn install_storage(&mut self, storage: Box<dyn Storage>) {
        self.core.storage = Some(storage);
    }

    pub fn has_storage(&self) -> bool {
        self.core.storage.is_some()
    }

    pub fn storage_properties(&self) -> Option<StorageProperties> {
        self.core.storage.as_ref().map(|s| s.properties())
    }

    /// Most recent inbound frame DTS on the output timeline.
    pub fn last_dts(&self) -> Option<Timestamp> {
        self.core.last_dts
    }

    /// Number of live subscribers.
    pub fn client_count(&self) -> usize {
        self.core.clients.client_count()
    }
}

/// Per-stream-type behavior plugged into the stream actor.
pub trait Flavor: Send + 'static {
    /// Called once before the actor starts. A flavor typically installs
    /// storage, fixes the stream kind, or seeds media info here.
    fn init(&mut self, _ctx: &mut FlavorContext<'_>) -> Result<(), StopReason> {
        Ok(())
    }

    /// Called for every inbound frame before transformation and dispatch.
    fn handle_frame(&mut self, frame: Frame, _ctx: &mut FlavorContext<'_>) -> FrameReply {
        FrameReply::Frame(frame)
    }

    /// Called for every control event listed on [`ControlEvent`].
    fn handle_control(
        &mut self,
        _event: ControlEvent,
        _ctx: &mut FlavorContext<'_>,
    ) -> ControlReply {
        ControlReply::NoReply
    }

    /// Called for out-of-band messages posted via `StreamHandle::notify`.
    fn handle_info(
        &mut self,
        _message: Box<dyn Any + Send>,
        _ctx: &mut FlavorContext<'_>,
    ) -> InfoReply {
        InfoReply::NoReply
    }
}
