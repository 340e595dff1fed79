//! streamcore — per-stream media fan-out engine.
//!
//! One actor per logical stream (a live channel, an opened file). The actor
//! is simultaneously:
//!
//! - a **fan-out splitter**: frames pushed by the source are stamped per
//!   client and delivered to every active subscriber without blocking, and
//! - a **random-access frame source**: passive (file-like) clients pull
//!   frames by key through per-client tickers that pace storage reads at
//!   real time.
//!
//! The actor never remembers where a client is in the timeline; clients
//! carry that state. Stream-type-specific behavior (file, live, protocol
//! ingest) plugs in through the [`flavor::Flavor`] capability interface;
//! random access plugs in through [`storage::Storage`].
//!
//! # Example
//!
//! ```no_run
//! use streamcore::flavor::LiveFlavor;
//! use streamcore::stream::{self, MediaStream, StreamConfig, SubscribeOptions};
//!
//! # async fn demo() -> streamcore::Result<()> {
//! let live = MediaStream::spawn(StreamConfig::new("channel_1"), LiveFlavor)?;
//!
//! let (sink, mut events) = stream::channel();
//! live.play(sink, SubscribeOptions::new().stream_tag("viewer-1")).await?;
//!
//! while let Some(event) = events.recv().await {
//!     // frames arrive stamped with "viewer-1"
//!     let _ = event;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod flavor;
pub mod media;
pub mod storage;
pub mod stream;

pub use error::{Error, Result};
pub use media::{Codec, Frame, FrameContent, FrameFlavor, FrameKey, MediaInfo, StreamTag, Timestamp};
pub use stream::{
    channel, ClientId, MediaStream, Source, SourceGuard, SourceTimeout, StreamConfig,
    StreamEvent, StreamHandle, StreamKind, SubscribeOptions,
};
