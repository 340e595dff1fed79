//! Client-side channel types and subscription options.
//!
//! A client is identified by the [`ClientId`] baked into its channel at
//! creation time. The stream actor only ever holds the sending half; frame
//! delivery is fire-and-forget, and the client's liveness is watched
//! through channel closure, never through blocking sends.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::media::{Frame, StreamTag};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// What a subscriber receives on its channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A media frame, stamped with the client's tag.
    Frame(Frame),
    /// A passive read reached the end of storage.
    EndOfStream { tag: Option<StreamTag> },
}

/// Sending half of a client channel, held by the stream actor.
#[derive(Debug, Clone)]
pub struct FrameSink {
    id: ClientId,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl FrameSink {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Deliver an event without blocking. A dead receiver is not an error
    /// here; the liveness watch is the authoritative signal.
    pub(crate) fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Resolves when the receiving half is gone.
    pub(crate) async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Create a client channel. The sink goes to `subscribe`; the receiver
/// stays with the client.
pub fn channel() -> (FrameSink, mpsc::UnboundedReceiver<StreamEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    (FrameSink { id, tx }, rx)
}

/// Options recognized at `subscribe`.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Tag stamped onto every frame delivered to this client.
    pub stream_tag: Option<StreamTag>,
    /// Pre-push window at start/seek, drained as fast as possible.
    pub buffer_ms: u64,
    /// Deliver video frames.
    pub send_video: bool,
    /// Deliver audio frames.
    pub send_audio: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self {
            stream_tag: None,
            buffer_ms: 0,
            send_video: true,
            send_audio: true,
        }
    }

    pub fn stream_tag(mut self, tag: impl Into<StreamTag>) -> Self {
        self.stream_tag = Some(tag.into());
        self
    }

    pub fn buffer_ms(mut self, ms: u64) -> Self {
        self.buffer_ms = ms;
        self
    }

    pub fn send_video(mut self, enabled: bool) -> Self {
        self.send_video = enabled;
        self
    }

    pub fn send_audio(mut self, enabled: bool) -> Self {
        self.send_audio = enabled;
        self
    }
}

/// Runtime toggles forwarded to a passive client's ticker.
#[derive(Debug, Clone, Default)]
pub struct PlaySetup {
    pub buffer_ms: Option<u64>,
    pub send_video: Option<bool>,
    pub send_audio: Option<bool>,
}

/// Where a client sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Subscribed; cached codec configuration not yet delivered.
    Starting,
    /// Receives frames pushed by the dispatcher.
    Active,
    /// Driven by a ticker pulling from storage.
    Passive,
    /// Receives nothing until resumed.
    Paused,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Starting => f.write_str("starting"),
            ClientState::Active => f.write_str("active"),
            ClientState::Passive => f.write_str("passive"),
            ClientState::Paused => f.write_str("paused"),
        }
    }
}

/// Accounting row exposed through `info(clients)`.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: ClientId,
    pub state: ClientState,
    pub stream_tag: Option<StreamTag>,
    /// Cumulative content bytes delivered.
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ids_are_unique() {
        let (a, _rx_a) = channel();
        let (b, _rx_b) = channel();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_send_after_receiver_drop() {
        let (sink, rx) = channel();
        drop(rx);
        assert!(!sink.send(StreamEvent::EndOfStream { tag: None }));
    }

    #[test]
    fn test_subscribe_options_defaults() {
        let opts = SubscribeOptions::new();
        assert!(opts.send_video);
        assert!(opts.send_audio);
        assert_eq!(opts.buffer_ms, 0);
        assert!(opts.stream_tag.is_none());

        let opts = SubscribeOptions::new()
            .stream_tag("A")
            .buffer_ms(3000)
            .send_audio(false);
        assert_eq!(opts.stream_tag.unwrap().as_str(), "A");
        assert_eq!(opts.buffer_ms, 3000);
        assert!(!opts.send_audio);
    }
}
