//! The stream actor and everything it owns.
//!
//! One actor per logical stream. External callers talk to it through a
//! [`StreamHandle`]; the source pushes frames asynchronously; passive
//! clients' tickers call back into the actor to read frames from storage.

pub mod actor;
pub mod client;
pub(crate) mod clients;
pub mod config;
pub mod handle;
pub mod source;
pub(crate) mod ticker;

pub use actor::MediaStream;
pub use client::{
    channel, ClientId, ClientInfo, ClientState, FrameSink, PlaySetup, StreamEvent,
    SubscribeOptions,
};
pub use config::{SourceTimeout, StreamConfig, StreamKind};
pub use handle::{InfoValue, StreamHandle, StreamStatus};
pub use source::{Source, SourceGuard, SourceId};
