//! The per-stream actor.
//!
//! One actor owns everything about one logical stream: the client registry,
//! the storage backing, the source liveness watch, the codec-configuration
//! cache, and the flavor adapter. All mutations are serialized through the
//! mailbox; frame delivery to clients is enqueue-and-forget, so no slow
//! subscriber can stall the stream.
//!
//! Source loss runs a small state machine: the liveness watch fires, the
//! flavor gets a chance to supply a replacement, and otherwise the
//! configured timeout policy decides between staying alive, a grace timer,
//! or termination.

use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::flavor::{
    ControlEvent, ControlReply, ControlValue, Flavor, FlavorContext, FrameReply, InfoReply,
    StopReason,
};
use crate::media::{Frame, MediaInfo, Timestamp, Transcoder};
use crate::storage::{ReadOutcome, SeekDirection, SeekPosition, Storage, TimeshiftBuffer};
use crate::stream::client::{ClientId, ClientState, StreamEvent};
use crate::stream::clients::ClientRegistry;
use crate::stream::config::{SourceTimeout, StreamConfig, StreamKind};
use crate::stream::handle::{InfoValue, Msg, StreamHandle, StreamStatus};
use crate::stream::source::{Source, SourceId};
use crate::stream::ticker::Ticker;

/// Spawns stream actors. One instance of the actor represents one logical
/// stream; the returned [`StreamHandle`] is the only way to talk to it.
pub struct MediaStream;

impl MediaStream {
    /// Validate configuration, run the flavor's init, and start the actor.
    ///
    /// Must be called from within a tokio runtime. Init-time failures
    /// (flavor refusal, timeshift combined with a flavor-installed storage)
    /// surface here; nothing is spawned in that case.
    pub fn spawn(config: StreamConfig, flavor: impl Flavor) -> Result<StreamHandle> {
        Self::spawn_with_transcoder(config, flavor, None)
    }

    /// [`spawn`](Self::spawn) with a frame transcoder applied before
    /// dispatch.
    pub fn spawn_with_transcoder(
        config: StreamConfig,
        flavor: impl Flavor,
        transcoder: Option<Box<dyn Transcoder>>,
    ) -> Result<StreamHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = StreamHandle::new(tx);

        let now = Instant::now();
        let mut core = StreamCore {
            kind: config.kind,
            media_info: config.media_info.clone().unwrap_or_default(),
            storage: None,
            clients: ClientRegistry::new(),
            last_dts: None,
            transcoder,
            source: None,
            source_gen: 0,
            source_watch: None,
            no_source_deadline: None,
            ts_delta: None,
            last_dts_at: None,
            video_config: None,
            audio_config: None,
            waiting_for_config: Vec::new(),
            config_wait_deadline: Some(now + config.config_wait),
            created_at: SystemTime::now(),
            started_at: now,
            last_activity: now,
            config,
        };

        let mut flavor: Box<dyn Flavor> = Box::new(flavor);
        flavor
            .init(&mut FlavorContext::new(&mut core))
            .map_err(Error::FlavorInit)?;

        if core.storage.is_some() && core.config.timeshift.is_some() {
            return Err(Error::TimeshiftAndStorage);
        }
        if let Some(window) = core.config.timeshift {
            core.storage = Some(Box::new(TimeshiftBuffer::new(window)));
        }
        if core.media_info.is_ready() {
            core.config_wait_deadline = None;
        }

        info!(
            stream = %core.config.name,
            kind = %core.kind,
            url = core.config.url.as_deref().unwrap_or(""),
            "Stream started"
        );

        let actor = Actor {
            core,
            flavor,
            rx,
            handle: handle.clone(),
        };
        tokio::spawn(actor.run());
        Ok(handle)
    }
}

/// Everything the actor owns except the flavor and the mailbox. Split out
/// so flavor callbacks can borrow the state while the flavor itself stays
/// borrowed separately.
pub(crate) struct StreamCore {
    pub(crate) config: StreamConfig,
    pub(crate) kind: StreamKind,
    pub(crate) media_info: MediaInfo,
    pub(crate) storage: Option<Box<dyn Storage>>,
    pub(crate) clients: ClientRegistry,
    pub(crate) last_dts: Option<Timestamp>,
    transcoder: Option<Box<dyn Transcoder>>,
    source: Option<Source>,
    /// Monitor generation; stale source-down notifications are ignored.
    source_gen: u64,
    source_watch: Option<JoinHandle<()>>,
    no_source_deadline: Option<Instant>,
    /// DTS shift aligning the source timeline to the output timeline.
    /// `None` exactly until the first frame from the current source.
    ts_delta: Option<i64>,
    last_dts_at: Option<Instant>,
    video_config: Option<Frame>,
    audio_config: Option<Frame>,
    waiting_for_config: Vec<oneshot::Sender<MediaInfo>>,
    config_wait_deadline: Option<Instant>,
    created_at: SystemTime,
    started_at: Instant,
    last_activity: Instant,
}

impl StreamCore {
    /// Drop the current source and its monitor. Returns the old identity.
    fn demonitor_source(&mut self) -> Option<SourceId> {
        if let Some(watch) = self.source_watch.take() {
            watch.abort();
        }
        self.source.take().map(|s| s.id())
    }

    /// Cache a codec-configuration frame for replay to starting clients.
    fn cache_config(&mut self, frame: &Frame) {
        let mut cached = frame.clone();
        cached.stream_tag = None;
        cached.next = None;
        if frame.is_video() {
            self.video_config = Some(cached);
        } else if frame.is_audio() {
            self.audio_config = Some(cached);
        }
    }

    /// Shift the frame onto the output timeline, re-deriving the delta on
    /// source changes and on DTS discontinuities wider than `glue_delta`.
    fn glue(&mut self, frame: Frame) -> Frame {
        match self.ts_delta {
            None => {
                let delta = match self.last_dts {
                    Some(last) => last as i64 - frame.dts as i64,
                    None => 0,
                };
                if delta != 0 {
                    debug!(
                        stream = %self.config.name,
                        delta,
                        "Timeline glued to new source"
                    );
                }
                self.ts_delta = Some(delta);
                frame.shifted(delta)
            }
            Some(delta) => {
                let shifted = frame.shifted(delta);
                if let Some(last) = self.last_dts {
                    let gap = shifted.dts as i64 - last as i64;
                    if gap.unsigned_abs() > self.config.glue_delta.as_millis() as u64 {
                        warn!(
                            stream = %self.config.name,
                            gap,
                            "DTS discontinuity; re-gluing timeline"
                        );
                        let delta = last as i64 - frame.dts as i64;
                        self.ts_delta = Some(delta);
                        return frame.shifted(delta);
                    }
                }
                shifted
            }
        }
    }

    /// Fan one frame out to every started push-mode client.
    fn dispatch(&mut self, frame: &Frame) {
        let video_config = self.video_config.clone();
        let audio_config = self.audio_config.clone();

        for (_, entry) in self.clients.iter_mut() {
            if !entry.started
                || !matches!(entry.state, ClientState::Active | ClientState::Starting)
            {
                continue;
            }

            if entry.state == ClientState::Starting {
                if entry.send_video {
                    if let Some(config) = &video_config {
                        entry
                            .sink
                            .send(StreamEvent::Frame(config.with_tag(entry.tag.as_ref())));
                    }
                }
                if entry.send_audio {
                    if let Some(config) = &audio_config {
                        entry
                            .sink
                            .send(StreamEvent::Frame(config.with_tag(entry.tag.as_ref())));
                    }
                }
                entry.state = ClientState::Active;
                if frame.is_config() {
                    // The cache replay above already covered this frame.
                    continue;
                }
            }

            if !entry.admits(frame.content) {
                continue;
            }
            entry
                .sink
                .send(StreamEvent::Frame(frame.with_tag(entry.tag.as_ref())));
        }
    }

    /// Track descriptors with storage facts folded in.
    fn merged_media_info(&self) -> MediaInfo {
        let mut info = self.media_info.clone();
        if let Some(storage) = &self.storage {
            if let Some(duration) = storage.properties().duration {
                info.duration = Some(duration);
            }
        }
        info
    }

    /// Answer every parked `media_info` caller if the tracks are ready.
    fn flush_config_waiters_if_ready(&mut self) {
        if !self.media_info.is_ready() || self.waiting_for_config.is_empty() {
            if self.media_info.is_ready() {
                self.config_wait_deadline = None;
            }
            return;
        }
        self.config_wait_deadline = None;
        let info = self.merged_media_info();
        for waiter in self.waiting_for_config.drain(..) {
            let _ = waiter.send(info.clone());
        }
    }

    /// The config-wait window expired: force pending tracks to concrete
    /// empty lists and answer everyone still parked.
    fn stop_waiting_for_config(&mut self) {
        self.config_wait_deadline = None;
        if !self.media_info.is_ready() {
            debug!(
                stream = %self.config.name,
                "Config wait expired; resolving pending tracks"
            );
            self.media_info.resolve_waits();
        }
        let info = self.merged_media_info();
        for waiter in self.waiting_for_config.drain(..) {
            let _ = waiter.send(info.clone());
        }
    }

    /// Wall clock lag behind the newest frame, in milliseconds.
    fn ts_delay(&self) -> u64 {
        if self.kind == StreamKind::File {
            return 0;
        }
        match self.last_dts_at {
            Some(at) => at.elapsed().as_millis() as u64,
            None => self.started_at.elapsed().as_millis() as u64,
        }
    }

    fn info_value(&self, key: &str) -> Option<InfoValue> {
        let value = match key {
            "client_count" => InfoValue::Count(self.clients.client_count()),
            "url" => InfoValue::Text(self.config.url.clone()),
            "type" => InfoValue::Kind(self.kind),
            "storage" => InfoValue::Storage(self.storage.as_ref().map(|s| s.properties())),
            "clients" => InfoValue::Clients(self.clients.list()),
            "last_dts" => InfoValue::Dts(self.last_dts),
            "ts_delay" => InfoValue::Millis(self.ts_delay()),
            "created_at" => InfoValue::Time(self.created_at),
            "options" => InfoValue::Options(Box::new(self.config.clone())),
            _ => return None,
        };
        Some(value)
    }

    fn info(&self, keys: Vec<String>) -> Result<Vec<(String, InfoValue)>> {
        let mut rows = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.info_value(key) {
                Some(value) => rows.push((key.clone(), value)),
                None => return Err(Error::BadInfoKeys(keys)),
            }
        }
        Ok(rows)
    }

    fn status(&self) -> StreamStatus {
        StreamStatus {
            name: self.config.name.clone(),
            kind: self.kind,
            client_count: self.clients.client_count(),
            last_dts: self.last_dts,
            ts_delay_ms: self.ts_delay(),
            has_source: self.source.is_some(),
            has_storage: self.storage.is_some(),
            created_at: self.created_at,
        }
    }
}

struct Actor {
    core: StreamCore,
    flavor: Box<dyn Flavor>,
    rx: mpsc::UnboundedReceiver<Msg>,
    handle: StreamHandle,
}

/// Sleep until an optional deadline; never resolves when there is none.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(mut self) {
        let period = self.core.config.housekeep_interval;
        let mut housekeep = time::interval_at(Instant::now() + period, period);
        housekeep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            let idle_at = self.core.last_activity + self.core.config.inactivity_timeout;
            tokio::select! {
                biased;
                msg = self.rx.recv() => {
                    self.core.last_activity = Instant::now();
                    match msg {
                        Some(msg) => {
                            if let Some(reason) = self.handle_msg(msg) {
                                break reason;
                            }
                        }
                        // Every handle, monitor, and ticker is gone.
                        None => break StopReason::Normal,
                    }
                }
                _ = deadline(self.core.no_source_deadline) => {
                    if let Some(reason) = self.on_no_source() {
                        break reason;
                    }
                }
                _ = deadline(self.core.config_wait_deadline) => {
                    self.core.stop_waiting_for_config();
                }
                _ = time::sleep_until(idle_at) => {
                    if let Some(reason) = self.on_inactivity() {
                        break reason;
                    }
                }
                _ = housekeep.tick() => self.on_housekeep(),
            }
        };
        self.terminate(reason);
    }

    /// Run one flavor control callback and fold its reply.
    fn call_control(
        &mut self,
        event: ControlEvent,
    ) -> (Option<ControlValue>, Option<StopReason>) {
        let reply = self
            .flavor
            .handle_control(event, &mut FlavorContext::new(&mut self.core));
        self.core.flush_config_waiters_if_ready();
        match reply {
            ControlReply::Reply(value) => (Some(value), None),
            ControlReply::NoReply => (None, None),
            ControlReply::Stop(reason) => (None, Some(reason)),
            ControlReply::StopWithReply(reason, value) => (Some(value), Some(reason)),
        }
    }

    fn handle_msg(&mut self, msg: Msg) -> Option<StopReason> {
        match msg {
            Msg::Subscribe { sink, opts, reply } => {
                let id = sink.id();
                let result = self.core.clients.insert(sink, opts, self.handle.sender());
                if result.is_ok() {
                    debug!(
                        stream = %self.core.config.name,
                        client = %id,
                        clients = self.core.clients.client_count(),
                        "Subscriber added"
                    );
                }
                let _ = reply.send(result);
                None
            }
            Msg::Start { client, reply } => {
                let _ = reply.send(self.start_client(client));
                None
            }
            Msg::Pause { client, reply } => {
                let _ = reply.send(self.pause_client(client));
                None
            }
            Msg::Resume { client, reply } => {
                let _ = reply.send(self.resume_client(client));
                None
            }
            Msg::Unsubscribe { client, reply } => {
                if self.core.clients.remove(client) {
                    debug!(
                        stream = %self.core.config.name,
                        client = %client,
                        clients = self.core.clients.client_count(),
                        "Subscriber removed"
                    );
                }
                let _ = reply.send(Ok(()));
                None
            }
            Msg::Seek {
                client,
                dts,
                direction,
                reply,
            } => {
                let _ = reply.send(self.seek_client(client, dts, direction));
                None
            }
            Msg::SeekInfo {
                dts,
                direction,
                reply,
            } => {
                let (result, stop) = self.seek_info(dts, direction);
                let _ = reply.send(result);
                stop
            }
            Msg::ReadFrame { client, key, reply } => {
                let _ = reply.send(self.read_frame(client, key));
                None
            }
            Msg::MediaInfo { reply } => {
                if self.core.media_info.is_ready() {
                    let _ = reply.send(self.core.merged_media_info());
                } else {
                    self.core.waiting_for_config.push(reply);
                }
                None
            }
            Msg::SetMediaInfo { info, reply } => {
                self.core.media_info = info;
                self.core.flush_config_waiters_if_ready();
                let _ = reply.send(Ok(()));
                None
            }
            Msg::Info { keys, reply } => {
                let _ = reply.send(self.core.info(keys));
                None
            }
            Msg::Status { reply } => {
                let _ = reply.send(self.core.status());
                None
            }
            Msg::Stop { reply } => {
                let _ = reply.send(());
                Some(StopReason::Normal)
            }
            Msg::SetSource(source) => self.on_set_source(source),
            Msg::SetSocket(socket) => {
                let (_, stop) = self.call_control(ControlEvent::SetSocket(socket));
                stop
            }
            Msg::PlaySetup { client, setup } => {
                if let Some(entry) = self.core.clients.get_mut(client) {
                    match &entry.ticker {
                        Some(ticker) => ticker.play_setup(setup),
                        None => trace!(client = %client, "play_setup on push client ignored"),
                    }
                }
                None
            }
            Msg::Publish(frame) => self.on_frame(frame),
            Msg::Cast(message) => {
                let (_, stop) = self.call_control(ControlEvent::Message(message));
                stop
            }
            Msg::Notify(message) => {
                let reply = self
                    .flavor
                    .handle_info(message, &mut FlavorContext::new(&mut self.core));
                self.core.flush_config_waiters_if_ready();
                match reply {
                    InfoReply::NoReply => None,
                    InfoReply::Stop(reason) => Some(reason),
                }
            }
            Msg::SourceDown(generation) => self.on_source_down(generation),
            Msg::ClientDown(client) => {
                if self.core.clients.remove(client) {
                    debug!(
                        stream = %self.core.config.name,
                        client = %client,
                        clients = self.core.clients.client_count(),
                        "Subscriber died"
                    );
                }
                None
            }
        }
    }

    fn start_client(&mut self, id: ClientId) -> Result<()> {
        let kind = self.core.kind;
        let has_storage = self.core.storage.is_some();
        let Some(entry) = self.core.clients.get_mut(id) else {
            return Err(Error::UnknownClient(id));
        };
        entry.started = true;

        if kind == StreamKind::File && has_storage && entry.ticker.is_none() {
            let ticker = Ticker::spawn(
                self.handle.clone(),
                id,
                entry.sink.clone(),
                entry.tag.clone(),
                entry.buffer_ms,
                entry.send_audio,
                entry.send_video,
                None,
            );
            entry.ticker = Some(ticker);
            entry.state = ClientState::Passive;
            debug!(stream = %self.core.config.name, client = %id, "Client started passive");
        }
        Ok(())
    }

    fn pause_client(&mut self, id: ClientId) -> Result<()> {
        let Some(entry) = self.core.clients.get_mut(id) else {
            return Err(Error::UnknownClient(id));
        };
        if entry.state == ClientState::Paused {
            return Ok(());
        }
        entry.paused_from = Some(entry.state);
        entry.state = ClientState::Paused;
        if let Some(ticker) = &entry.ticker {
            ticker.pause();
        }
        Ok(())
    }

    fn resume_client(&mut self, id: ClientId) -> Result<()> {
        let Some(entry) = self.core.clients.get_mut(id) else {
            return Err(Error::UnknownClient(id));
        };
        if entry.state != ClientState::Paused {
            return Ok(());
        }
        entry.state = entry.paused_from.take().unwrap_or(ClientState::Active);
        if let Some(ticker) = &entry.ticker {
            ticker.resume();
        }
        Ok(())
    }

    fn seek_client(&mut self, id: ClientId, dts: Timestamp, direction: SeekDirection) -> Result<()> {
        let Some(storage) = self.core.storage.as_mut() else {
            return Err(Error::NoStorage);
        };
        let Some(position) = storage.seek(dts, direction) else {
            return Err(Error::SeekFailed);
        };
        let Some(entry) = self.core.clients.get_mut(id) else {
            return Err(Error::UnknownClient(id));
        };

        debug!(
            stream = %self.core.config.name,
            client = %id,
            requested = dts,
            landed = position.dts,
            "Client seek"
        );

        match &entry.ticker {
            Some(ticker) => ticker.seek(position.key, position.dts),
            None => {
                // A push-mode client seeking into storage becomes passive.
                let ticker = Ticker::spawn(
                    self.handle.clone(),
                    id,
                    entry.sink.clone(),
                    entry.tag.clone(),
                    entry.buffer_ms,
                    entry.send_audio,
                    entry.send_video,
                    Some(position.key),
                );
                if entry.state == ClientState::Paused {
                    ticker.pause();
                    entry.paused_from = Some(ClientState::Passive);
                } else {
                    entry.state = ClientState::Passive;
                }
                entry.ticker = Some(ticker);
            }
        }
        Ok(())
    }

    fn seek_info(
        &mut self,
        dts: Timestamp,
        direction: SeekDirection,
    ) -> (Result<Option<SeekPosition>>, Option<StopReason>) {
        let (value, stop) = self.call_control(ControlEvent::SeekInfo { dts, direction });
        if let Some(ControlValue::Seek(position)) = value {
            return (Ok(position), stop);
        }
        let result = match self.core.storage.as_mut() {
            Some(storage) => storage.seek(dts, direction),
            None => None,
        };
        (Ok(result), stop)
    }

    fn read_frame(
        &mut self,
        client: Option<ClientId>,
        key: Option<crate::media::FrameKey>,
    ) -> Result<ReadOutcome> {
        let Some(storage) = self.core.storage.as_mut() else {
            return Err(Error::NoStorage);
        };
        match storage.read_frame(key) {
            ReadOutcome::Eof => Ok(ReadOutcome::Eof),
            ReadOutcome::Frame(frame) => {
                if frame.is_config() {
                    // Codec configuration is bookkeeping, not billable
                    // content.
                    self.core.cache_config(&frame);
                } else if let Some(id) = client {
                    self.core.clients.increment_bytes(id, frame.size());
                }
                Ok(ReadOutcome::Frame(frame))
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Option<StopReason> {
        let reply = self
            .flavor
            .handle_frame(frame, &mut FlavorContext::new(&mut self.core));
        self.core.flush_config_waiters_if_ready();
        let frame = match reply {
            FrameReply::Frame(frame) => frame,
            FrameReply::Consume => return None,
            FrameReply::Stop(reason) => return Some(reason),
        };

        let frame = match self.core.transcoder.as_mut() {
            Some(transcoder) => match transcoder.apply(frame) {
                Some(frame) => frame,
                None => return None,
            },
            None => frame,
        };

        let frame = self.core.glue(frame);
        self.core.last_dts = Some(frame.dts);
        self.core.last_dts_at = Some(Instant::now());

        if frame.is_config() {
            self.core.cache_config(&frame);
            if self.core.media_info.apply_config(&frame) {
                debug!(
                    stream = %self.core.config.name,
                    content = ?frame.content,
                    codec = ?frame.codec,
                    "Codec configuration arrived"
                );
            }
            self.core.flush_config_waiters_if_ready();
        }

        if let Some(storage) = self.core.storage.as_mut() {
            storage.write_frame(&frame);
        }

        self.core.dispatch(&frame);
        None
    }

    fn on_set_source(&mut self, source: Source) -> Option<StopReason> {
        let previous = self.core.demonitor_source();
        self.core.no_source_deadline = None;

        let (value, stop) = self.call_control(ControlEvent::SetSource(source.clone()));
        if stop.is_some() {
            return stop;
        }
        let chosen = match value {
            Some(ControlValue::Source(substitute)) => substitute,
            _ => source,
        };
        self.adopt_source(chosen, previous);
        None
    }

    /// Monitor a source and make it current. Clients that were already
    /// active re-enter `starting` when the producer identity changes, so
    /// they re-receive codec configuration from the new timeline.
    fn adopt_source(&mut self, source: Source, previous: Option<SourceId>) {
        self.core.source_gen += 1;
        let generation = self.core.source_gen;
        let token = source.liveness();
        let mailbox = self.handle.sender().clone();
        self.core.source_watch = Some(tokio::spawn(async move {
            token.cancelled().await;
            let _ = mailbox.send(Msg::SourceDown(generation));
        }));

        self.core.ts_delta = None;
        if previous != Some(source.id()) {
            let moved = self
                .core
                .clients
                .mass_update_state(ClientState::Active, ClientState::Starting);
            if moved > 0 {
                debug!(
                    stream = %self.core.config.name,
                    moved,
                    "Clients re-starting for new source"
                );
            }
        }

        info!(
            stream = %self.core.config.name,
            source = %source.id(),
            label = source.label(),
            "Source attached"
        );
        self.core.source = Some(source);
    }

    fn on_source_down(&mut self, generation: u64) -> Option<StopReason> {
        if generation != self.core.source_gen {
            return None;
        }
        let Some(lost) = self.core.source.take() else {
            return None;
        };
        if let Some(watch) = self.core.source_watch.take() {
            watch.abort();
        }
        let lost_id = lost.id();
        warn!(
            stream = %self.core.config.name,
            source = %lost_id,
            "Source lost"
        );

        let (value, stop) = self.call_control(ControlEvent::SourceLost(lost));
        if stop.is_some() {
            return stop;
        }
        if let Some(ControlValue::Source(replacement)) = value {
            self.adopt_source(replacement, Some(lost_id));
            return None;
        }

        match self.core.config.source_timeout {
            SourceTimeout::Shutdown => Some(StopReason::Normal),
            SourceTimeout::After(grace) if grace.is_zero() => Some(StopReason::Normal),
            SourceTimeout::Never => {
                debug!(
                    stream = %self.core.config.name,
                    "Staying alive without a source"
                );
                None
            }
            SourceTimeout::After(grace) => {
                debug!(
                    stream = %self.core.config.name,
                    grace_ms = grace.as_millis() as u64,
                    "Waiting for a replacement source"
                );
                self.core.no_source_deadline = Some(Instant::now() + grace);
                None
            }
        }
    }

    fn on_no_source(&mut self) -> Option<StopReason> {
        self.core.no_source_deadline = None;

        let (value, stop) = self.call_control(ControlEvent::NoSource);
        if stop.is_some() {
            return stop;
        }
        if let Some(ControlValue::Source(replacement)) = value {
            self.adopt_source(replacement, None);
            return None;
        }

        info!(
            stream = %self.core.config.name,
            "No source within grace period; stopping"
        );
        Some(StopReason::Normal)
    }

    fn on_inactivity(&mut self) -> Option<StopReason> {
        self.core.last_activity = Instant::now();
        // Inactivity only means something while a source is supposed to be
        // feeding us.
        if self.core.source.is_none() {
            return None;
        }
        debug!(stream = %self.core.config.name, "Inactivity timeout");
        let (_, stop) = self.call_control(ControlEvent::Timeout);
        stop
    }

    fn on_housekeep(&mut self) {
        if let Some(storage) = self.core.storage.as_mut() {
            storage.reclaim();
        }
        trace!(
            stream = %self.core.config.name,
            clients = self.core.clients.client_count(),
            last_dts = ?self.core.last_dts,
            "Housekeeping"
        );
    }

    fn terminate(mut self, reason: StopReason) {
        info!(
            stream = %self.core.config.name,
            reason = ?reason,
            clients = self.core.clients.client_count(),
            "Stream stopped"
        );
        if let Some(watch) = self.core.source_watch.take() {
            watch.abort();
        }
        // Dropping the sinks ends every client's receiver; dropping the
        // parked media_info waiters fails their callers with `Stopped`.
        self.core.clients.shutdown_all();
    }
}
