//! Cloneable handle to a stream actor.
//!
//! All interaction with a stream goes through its handle: synchronous
//! requests are oneshot round-trips through the mailbox with a caller-side
//! deadline, casts are plain sends. The handle never touches stream state
//! directly, so it is safe to clone across tasks.

use std::any::Any;
use std::time::{Duration, SystemTime};

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::media::{Frame, FrameKey, MediaInfo, Timestamp};
use crate::storage::{ReadOutcome, SeekDirection, SeekPosition, StorageProperties};
use crate::stream::client::{ClientId, ClientInfo, FrameSink, PlaySetup, SubscribeOptions};
use crate::stream::config::{StreamConfig, StreamKind};
use crate::stream::source::Source;

/// Deadline for ordinary synchronous requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// `media_info` may be parked until configuration arrives; its caller
/// deadline outlives the actor's own config-wait window.
const MEDIA_INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// One value in an `info` reply.
#[derive(Debug, Clone)]
pub enum InfoValue {
    Count(usize),
    Text(Option<String>),
    Kind(StreamKind),
    Dts(Option<Timestamp>),
    Millis(u64),
    Time(SystemTime),
    Clients(Vec<ClientInfo>),
    Storage(Option<StorageProperties>),
    Options(Box<StreamConfig>),
}

/// Introspection snapshot returned by `status`.
#[derive(Debug, Clone)]
pub struct StreamStatus {
    pub name: String,
    pub kind: StreamKind,
    pub client_count: usize,
    pub last_dts: Option<Timestamp>,
    /// Wall clock minus the last frame's arrival, in milliseconds; zero for
    /// file streams.
    pub ts_delay_ms: u64,
    pub has_source: bool,
    pub has_storage: bool,
    pub created_at: SystemTime,
}

/// Mailbox message. Everything the actor does arrives as one of these.
pub(crate) enum Msg {
    Subscribe {
        sink: FrameSink,
        opts: SubscribeOptions,
        reply: oneshot::Sender<Result<()>>,
    },
    Start {
        client: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        client: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        client: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        client: ClientId,
        reply: oneshot::Sender<Result<()>>,
    },
    Seek {
        client: ClientId,
        dts: Timestamp,
        direction: SeekDirection,
        reply: oneshot::Sender<Result<()>>,
    },
    SeekInfo {
        dts: Timestamp,
        direction: SeekDirection,
        reply: oneshot::Sender<Result<Option<SeekPosition>>>,
    },
    ReadFrame {
        client: Option<ClientId>,
        key: Option<FrameKey>,
        reply: oneshot::Sender<Result<ReadOutcome>>,
    },
    MediaInfo {
        reply: oneshot::Sender<MediaInfo>,
    },
    SetMediaInfo {
        info: MediaInfo,
        reply: oneshot::Sender<Result<()>>,
    },
    Info {
        keys: Vec<String>,
        reply: oneshot::Sender<Result<Vec<(String, InfoValue)>>>,
    },
    Status {
        reply: oneshot::Sender<StreamStatus>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetSource(Source),
    SetSocket(TcpStream),
    PlaySetup {
        client: ClientId,
        setup: PlaySetup,
    },
    Publish(Frame),
    Cast(Box<dyn Any + Send>),
    Notify(Box<dyn Any + Send>),
    // Liveness notifications from watch tasks.
    SourceDown(u64),
    ClientDown(ClientId),
}

/// Handle to one stream actor.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    tx: mpsc::UnboundedSender<Msg>,
}

impl StreamHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self { tx }
    }

    fn cast(&self, msg: Msg) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::Stopped)
    }

    async fn request<T>(
        &self,
        timeout: Duration,
        make: impl FnOnce(oneshot::Sender<T>) -> Msg,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.cast(make(reply))?;
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(Error::Timeout),
            Ok(Err(_)) => Err(Error::Stopped),
            Ok(Ok(value)) => Ok(value),
        }
    }

    /// Subscribe then start in one call.
    pub async fn play(&self, sink: FrameSink, opts: SubscribeOptions) -> Result<ClientId> {
        let id = sink.id();
        self.subscribe(sink, opts).await?;
        self.start(id).await?;
        Ok(id)
    }

    /// Register a client in the `starting` state. No frames flow until
    /// [`start`](Self::start).
    pub async fn subscribe(&self, sink: FrameSink, opts: SubscribeOptions) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Subscribe { sink, opts, reply })
            .await?
    }

    /// Begin delivery for a subscribed client. File-kind streams attach a
    /// ticker and drive the client passively.
    pub async fn start(&self, client: ClientId) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Start { client, reply })
            .await?
    }

    pub async fn pause(&self, client: ClientId) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Pause { client, reply })
            .await?
    }

    pub async fn resume(&self, client: ClientId) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Resume { client, reply })
            .await?
    }

    /// Remove a client. Best-effort; a missing client is not an error.
    pub async fn unsubscribe(&self, client: ClientId) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Unsubscribe { client, reply })
            .await?
    }

    /// Rebase a ticker-driven client to the keyframe nearest `dts`.
    pub async fn seek(&self, client: ClientId, dts: Timestamp) -> Result<()> {
        self.seek_directed(client, SeekDirection::After, dts).await
    }

    /// [`seek`](Self::seek) with an explicit direction. The direction is
    /// currently advisory; resolution lands on the first keyframe at or
    /// after `dts`, falling back to the keyframe before.
    pub async fn seek_directed(
        &self,
        client: ClientId,
        direction: SeekDirection,
        dts: Timestamp,
    ) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Seek {
            client,
            dts,
            direction,
            reply,
        })
        .await?
    }

    /// Pure seek query; does not move any client.
    pub async fn seek_info(
        &self,
        dts: Timestamp,
        direction: SeekDirection,
    ) -> Result<Option<SeekPosition>> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::SeekInfo {
            dts,
            direction,
            reply,
        })
        .await?
    }

    /// Read one frame from storage. `client` attributes byte accounting;
    /// `None` reads anonymously. This is the ticker path, but any caller
    /// may pull frames by key.
    pub async fn read_frame(
        &self,
        client: Option<ClientId>,
        key: Option<FrameKey>,
    ) -> Result<ReadOutcome> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::ReadFrame { client, key, reply })
            .await?
    }

    /// Track descriptors. Parks until codec configuration is known or the
    /// stream's config-wait window forces an answer.
    pub async fn media_info(&self) -> Result<MediaInfo> {
        self.request(MEDIA_INFO_TIMEOUT, |reply| Msg::MediaInfo { reply })
            .await
    }

    pub async fn set_media_info(&self, info: MediaInfo) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::SetMediaInfo { info, reply })
            .await?
    }

    /// Introspection by key. Allowed keys: `client_count`, `url`, `type`,
    /// `storage`, `clients`, `last_dts`, `ts_delay`, `created_at`,
    /// `options`. Any unknown key fails the whole call.
    pub async fn info(&self, keys: &[&str]) -> Result<Vec<(String, InfoValue)>> {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        self.request(REQUEST_TIMEOUT, |reply| Msg::Info { keys, reply })
            .await?
    }

    /// Fixed introspection snapshot.
    pub async fn status(&self) -> Result<StreamStatus> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Status { reply })
            .await
    }

    /// Stop the stream normally.
    pub async fn stop(&self) -> Result<()> {
        self.request(REQUEST_TIMEOUT, |reply| Msg::Stop { reply }).await
    }

    /// Propose a new frame producer. The flavor may substitute its own.
    pub fn set_source(&self, source: Source) -> Result<()> {
        self.cast(Msg::SetSource(source))
    }

    /// Transfer socket ownership to the stream; forwarded to the flavor.
    pub fn set_socket(&self, socket: TcpStream) -> Result<()> {
        self.cast(Msg::SetSocket(socket))
    }

    /// Runtime toggles for a passive client's ticker.
    pub fn play_setup(&self, client: ClientId, setup: PlaySetup) -> Result<()> {
        self.cast(Msg::PlaySetup { client, setup })
    }

    /// Inject a frame as if it came from the source.
    pub fn publish(&self, frame: Frame) -> Result<()> {
        self.cast(Msg::Publish(frame))
    }

    /// Forward an opaque control event to the flavor's `handle_control`.
    pub fn control(&self, message: Box<dyn Any + Send>) -> Result<()> {
        self.cast(Msg::Cast(message))
    }

    /// Post an out-of-band message to the flavor's `handle_info`.
    pub fn notify(&self, message: Box<dyn Any + Send>) -> Result<()> {
        self.cast(Msg::Notify(message))
    }

    pub(crate) fn sender(&self) -> &mpsc::UnboundedSender<Msg> {
        &self.tx
    }
}
