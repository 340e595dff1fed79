//! Per-stream client registry.
//!
//! Maps client identity to subscription state. The registry owns the
//! liveness watches: inserting a client spawns a task that waits for the
//! client's channel to close and posts the death back into the actor
//! mailbox, where removal happens synchronously.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::media::FrameContent;
use crate::stream::client::{ClientId, ClientInfo, ClientState, FrameSink, SubscribeOptions};
use crate::stream::handle::Msg;
use crate::stream::ticker::TickerHandle;

/// Registry entry for one subscriber.
pub(crate) struct ClientEntry {
    pub sink: FrameSink,
    pub tag: Option<crate::media::StreamTag>,
    pub state: ClientState,
    /// Set by `start`; dispatch ignores clients that have not started.
    pub started: bool,
    /// Present exactly while the client is ticker-driven.
    pub ticker: Option<TickerHandle>,
    /// State to restore on resume; only meaningful while paused.
    pub paused_from: Option<ClientState>,
    pub buffer_ms: u64,
    pub send_audio: bool,
    pub send_video: bool,
    /// Cumulative content bytes delivered.
    pub bytes: u64,
    watch: JoinHandle<()>,
}

impl ClientEntry {
    /// Whether the client's filters admit this content kind.
    pub fn admits(&self, content: FrameContent) -> bool {
        match content {
            FrameContent::Audio => self.send_audio,
            FrameContent::Video => self.send_video,
            FrameContent::Metadata => true,
        }
    }

    fn shutdown(self) {
        self.watch.abort();
        if let Some(ticker) = self.ticker {
            ticker.stop();
        }
    }
}

/// All subscribers of one stream, keyed by client identity.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: HashMap<ClientId, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and install its liveness watch.
    ///
    /// A second subscribe for the same identity is an error and leaves the
    /// registry untouched.
    pub fn insert(
        &mut self,
        sink: FrameSink,
        opts: SubscribeOptions,
        mailbox: &mpsc::UnboundedSender<Msg>,
    ) -> Result<()> {
        let id = sink.id();
        if self.clients.contains_key(&id) {
            return Err(Error::AlreadySubscribed(id));
        }

        let watch = {
            let sink = sink.clone();
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                sink.closed().await;
                let _ = mailbox.send(Msg::ClientDown(sink.id()));
            })
        };

        self.clients.insert(
            id,
            ClientEntry {
                sink,
                tag: opts.stream_tag,
                state: ClientState::Starting,
                started: false,
                ticker: None,
                paused_from: None,
                buffer_ms: opts.buffer_ms,
                send_audio: opts.send_audio,
                send_video: opts.send_video,
                bytes: 0,
                watch,
            },
        );
        Ok(())
    }

    /// Remove a client, stopping its ticker and monitor. Tolerates a
    /// missing client.
    pub fn remove(&mut self, id: ClientId) -> bool {
        match self.clients.remove(&id) {
            Some(entry) => {
                entry.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientEntry> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ClientId, &mut ClientEntry)> {
        self.clients.iter_mut()
    }

    /// Accounting snapshot of every subscriber.
    pub fn list(&self) -> Vec<ClientInfo> {
        let mut rows: Vec<ClientInfo> = self
            .clients
            .iter()
            .map(|(id, entry)| ClientInfo {
                id: *id,
                state: entry.state,
                stream_tag: entry.tag.clone(),
                bytes: entry.bytes,
            })
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    /// Move every client in `from` to `to`. Returns how many moved.
    pub fn mass_update_state(&mut self, from: ClientState, to: ClientState) -> usize {
        let mut moved = 0;
        for entry in self.clients.values_mut() {
            if entry.state == from {
                entry.state = to;
                moved += 1;
            }
        }
        moved
    }

    pub fn increment_bytes(&mut self, id: ClientId, bytes: usize) {
        if let Some(entry) = self.clients.get_mut(&id) {
            entry.bytes += bytes as u64;
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Tear down every client: monitors aborted, tickers stopped, sinks
    /// dropped so receivers observe the end of the stream.
    pub fn shutdown_all(&mut self) {
        for (_, entry) in self.clients.drain() {
            entry.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::stream::client;

    use super::*;

    fn mailbox() -> (
        mpsc::UnboundedSender<Msg>,
        mpsc::UnboundedReceiver<Msg>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_insert_remove_round_trip() {
        let (tx, _rx) = mailbox();
        let mut registry = ClientRegistry::new();

        let (sink, _client_rx) = client::channel();
        let id = sink.id();

        registry.insert(sink, SubscribeOptions::new(), &tx).unwrap();
        assert_eq!(registry.client_count(), 1);
        assert!(registry.contains(id));

        assert!(registry.remove(id));
        assert_eq!(registry.client_count(), 0);
        // Removal tolerates a missing client.
        assert!(!registry.remove(id));
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_error() {
        let (tx, _rx) = mailbox();
        let mut registry = ClientRegistry::new();

        let (sink, _client_rx) = client::channel();
        registry
            .insert(sink.clone(), SubscribeOptions::new(), &tx)
            .unwrap();

        let err = registry
            .insert(sink, SubscribeOptions::new(), &tx)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadySubscribed(_)));
        assert_eq!(registry.client_count(), 1);
    }

    #[tokio::test]
    async fn test_client_death_posts_to_mailbox() {
        let (tx, mut rx) = mailbox();
        let mut registry = ClientRegistry::new();

        let (sink, client_rx) = client::channel();
        let id = sink.id();
        registry.insert(sink, SubscribeOptions::new(), &tx).unwrap();

        drop(client_rx);
        match rx.recv().await {
            Some(Msg::ClientDown(down)) => assert_eq!(down, id),
            other => panic!("expected ClientDown, got {:?}", other.is_some()),
        }
    }

    #[tokio::test]
    async fn test_mass_update_state() {
        let (tx, _rx) = mailbox();
        let mut registry = ClientRegistry::new();

        for _ in 0..3 {
            let (sink, rx) = client::channel();
            std::mem::forget(rx);
            registry.insert(sink, SubscribeOptions::new(), &tx).unwrap();
        }
        registry.mass_update_state(ClientState::Starting, ClientState::Active);

        let moved = registry.mass_update_state(ClientState::Active, ClientState::Starting);
        assert_eq!(moved, 3);
        assert!(registry
            .list()
            .iter()
            .all(|row| row.state == ClientState::Starting));
    }

    #[tokio::test]
    async fn test_byte_accounting() {
        let (tx, _rx) = mailbox();
        let mut registry = ClientRegistry::new();

        let (sink, _client_rx) = client::channel();
        let id = sink.id();
        registry.insert(sink, SubscribeOptions::new(), &tx).unwrap();

        registry.increment_bytes(id, 100);
        registry.increment_bytes(id, 28);
        assert_eq!(registry.list()[0].bytes, 128);
    }
}
