//! Per-passive-client timed driver.
//!
//! A ticker pulls frames from storage through the actor's `read_frame` path
//! and pushes them to one client at the pace implied by frame DTS
//! differences. The initial `buffer_ms` window is drained as fast as
//! possible. Commands always win over in-flight work: a seek arriving while
//! the ticker waits out a frame interval discards that frame and re-reads
//! from the new position.

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::trace;

use crate::media::{FrameKey, StreamTag, Timestamp};
use crate::storage::ReadOutcome;
use crate::stream::client::{ClientId, FrameSink, PlaySetup, StreamEvent};
use crate::stream::handle::StreamHandle;

/// Reconfiguration commands a ticker accepts while running.
#[derive(Debug)]
pub(crate) enum TickerCommand {
    PlaySetup(PlaySetup),
    Pause,
    Resume,
    Seek { key: FrameKey, dts: Timestamp },
    Stop,
}

/// Owner-side handle to a running ticker.
#[derive(Debug)]
pub(crate) struct TickerHandle {
    tx: mpsc::UnboundedSender<TickerCommand>,
}

impl TickerHandle {
    pub fn pause(&self) {
        let _ = self.tx.send(TickerCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(TickerCommand::Resume);
    }

    pub fn seek(&self, key: FrameKey, dts: Timestamp) {
        let _ = self.tx.send(TickerCommand::Seek { key, dts });
    }

    pub fn play_setup(&self, setup: PlaySetup) {
        let _ = self.tx.send(TickerCommand::PlaySetup(setup));
    }

    pub fn stop(self) {
        let _ = self.tx.send(TickerCommand::Stop);
    }
}

/// Where the next read lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Start,
    Key(FrameKey),
    End,
}

/// What a handled command means for the in-flight frame.
enum Flow {
    Continue,
    /// Position or pause state changed; discard any pending frame.
    Reset,
    Stop,
}

pub(crate) struct Ticker {
    stream: StreamHandle,
    client: ClientId,
    sink: FrameSink,
    tag: Option<StreamTag>,
    buffer_ms: u64,
    send_audio: bool,
    send_video: bool,
    cmd_rx: mpsc::UnboundedReceiver<TickerCommand>,
    pos: Position,
    paused: bool,
    /// DTS of the first frame in the current pacing epoch.
    base_dts: Option<Timestamp>,
    /// Wall-clock start of the current pacing epoch.
    epoch: Option<Instant>,
    /// End-of-stream already signalled for the current position.
    eof_notified: bool,
}

impl Ticker {
    /// Spawn a ticker for one passive client.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        stream: StreamHandle,
        client: ClientId,
        sink: FrameSink,
        tag: Option<StreamTag>,
        buffer_ms: u64,
        send_audio: bool,
        send_video: bool,
        start_at: Option<FrameKey>,
    ) -> TickerHandle {
        let (tx, cmd_rx) = mpsc::unbounded_channel();
        let ticker = Ticker {
            stream,
            client,
            sink,
            tag,
            buffer_ms,
            send_audio,
            send_video,
            cmd_rx,
            pos: match start_at {
                Some(key) => Position::Key(key),
                None => Position::Start,
            },
            paused: false,
            base_dts: None,
            epoch: None,
            eof_notified: false,
        };
        tokio::spawn(ticker.run());
        TickerHandle { tx }
    }

    fn apply(&mut self, cmd: TickerCommand) -> Flow {
        match cmd {
            TickerCommand::PlaySetup(setup) => {
                if let Some(buffer) = setup.buffer_ms {
                    self.buffer_ms = buffer;
                }
                if let Some(video) = setup.send_video {
                    self.send_video = video;
                }
                if let Some(audio) = setup.send_audio {
                    self.send_audio = audio;
                }
                Flow::Continue
            }
            TickerCommand::Pause => {
                self.paused = true;
                Flow::Reset
            }
            TickerCommand::Resume => {
                self.paused = false;
                // Re-base pacing so playback continues from here without a
                // catch-up burst.
                self.base_dts = None;
                self.epoch = None;
                Flow::Continue
            }
            TickerCommand::Seek { key, dts } => {
                trace!(client = %self.client, dts, "Ticker seek");
                self.pos = Position::Key(key);
                self.base_dts = None;
                self.epoch = None;
                self.eof_notified = false;
                Flow::Reset
            }
            TickerCommand::Stop => Flow::Stop,
        }
    }

    /// Park until a command arrives. Returns false when the ticker should
    /// exit.
    async fn wait_for_command(&mut self) -> bool {
        match self.cmd_rx.recv().await {
            Some(cmd) => !matches!(self.apply(cmd), Flow::Stop),
            None => false,
        }
    }

    async fn run(mut self) {
        trace!(client = %self.client, "Ticker started");
        'outer: loop {
            // Commands first.
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                if matches!(self.apply(cmd), Flow::Stop) {
                    break 'outer;
                }
            }

            if self.paused {
                if !self.wait_for_command().await {
                    break;
                }
                continue;
            }

            let key = match self.pos {
                Position::Start => None,
                Position::Key(key) => Some(key),
                Position::End => {
                    if !self.eof_notified {
                        self.eof_notified = true;
                        self.sink.send(StreamEvent::EndOfStream {
                            tag: self.tag.clone(),
                        });
                        trace!(client = %self.client, "Ticker parked at end of storage");
                    }
                    if !self.wait_for_command().await {
                        break;
                    }
                    continue;
                }
            };
            let frame = match self.stream.read_frame(Some(self.client), key).await {
                Ok(ReadOutcome::Frame(frame)) => frame,
                Ok(ReadOutcome::Eof) => {
                    self.pos = Position::End;
                    continue;
                }
                // Stream gone; the client's channel closes with it.
                Err(_) => break,
            };

            // Pace by DTS distance from the epoch base, minus the pre-push
            // window.
            let base = *self.base_dts.get_or_insert(frame.dts);
            let epoch = *self.epoch.get_or_insert_with(Instant::now);
            let rel = frame.dts.saturating_sub(base);
            let due = epoch + Duration::from_millis(rel.saturating_sub(self.buffer_ms));

            loop {
                tokio::select! {
                    biased;
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => match self.apply(cmd) {
                                Flow::Stop => break 'outer,
                                // Discard the pending frame; position moved
                                // or playback paused.
                                Flow::Reset => continue 'outer,
                                Flow::Continue => {}
                            },
                            None => break 'outer,
                        }
                    }
                    _ = sleep_until(due) => break,
                }
            }

            let admit = match frame.content {
                crate::media::FrameContent::Audio => self.send_audio,
                crate::media::FrameContent::Video => self.send_video,
                crate::media::FrameContent::Metadata => true,
            };
            if admit && !self.sink.send(StreamEvent::Frame(frame.with_tag(self.tag.as_ref()))) {
                // Client gone; its liveness watch tears us down, but there
                // is nothing left to do here.
                break;
            }

            self.pos = match frame.next {
                Some(next) => Position::Key(next),
                None => Position::End,
            };
        }
        trace!(client = %self.client, "Ticker stopped");
    }
}
