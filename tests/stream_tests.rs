//! End-to-end tests for the stream actor.
//!
//! These drive whole streams through their public handles: configuration
//! negotiation, fan-out ordering, source failover, passive playback, and
//! the source-loss policies. Timer-driven scenarios run on paused tokio
//! time so grace periods and wait windows are deterministic.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time;

use streamcore::flavor::{
    ControlEvent, ControlReply, ControlValue, FileFlavor, Flavor, FlavorContext, LiveFlavor,
};
use streamcore::storage::{ReadOutcome, SeekDirection, Storage, TimeshiftBuffer};
use streamcore::stream::channel;
use streamcore::{
    Codec, Error, Frame, MediaStream, Source, SourceTimeout, StreamConfig, StreamEvent,
    StreamKind, SubscribeOptions,
};

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn video_config() -> Frame {
    Frame::video_config(Codec::H264, 0, Bytes::from_static(&[0x17, 0x00, 0x01]))
}

fn audio_config() -> Frame {
    Frame::audio_config(Codec::Aac, 0, Bytes::from_static(&[0xAF, 0x00]))
}

fn keyframe(dts: u64) -> Frame {
    Frame::keyframe(Codec::H264, dts, dts, Bytes::from_static(&[0; 8]))
}

fn inter(dts: u64) -> Frame {
    Frame::video(Codec::H264, dts, dts, Bytes::from_static(&[0; 4]))
}

/// A small pre-recorded file: one config frame, then a GOP.
fn file_storage() -> TimeshiftBuffer {
    let mut buf = TimeshiftBuffer::new(Duration::from_secs(3600));
    buf.write_frame(&video_config());
    buf.write_frame(&keyframe(0));
    buf.write_frame(&inter(40));
    buf.write_frame(&inter(80));
    buf
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Frame {
    match rx.recv().await {
        Some(StreamEvent::Frame(frame)) => frame,
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_config_then_frames() {
    trace_init();
    let stream = MediaStream::spawn(StreamConfig::new("live_1"), LiveFlavor).unwrap();

    let (sink, mut rx) = channel();
    stream
        .play(sink, SubscribeOptions::new().stream_tag("A"))
        .await
        .unwrap();

    // Park a media_info caller before any configuration exists.
    let waiter = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.media_info().await })
    };
    time::sleep(Duration::from_millis(50)).await;

    stream.publish(video_config()).unwrap();
    stream.publish(audio_config()).unwrap();
    stream.publish(keyframe(40)).unwrap();

    // The parked caller was answered once both tracks were known.
    let info = waiter.await.unwrap().unwrap();
    assert!(info.is_ready());
    assert_eq!(info.video.as_slice().len(), 1);
    assert_eq!(info.audio.as_slice().len(), 1);

    // The client saw both configs, stamped with its tag, before content.
    let first = next_frame(&mut rx).await;
    assert!(first.is_config());
    assert!(first.is_video());
    assert_eq!(first.stream_tag.as_ref().unwrap().as_str(), "A");

    let second = next_frame(&mut rx).await;
    assert!(second.is_config());
    assert!(second.is_audio());
    assert_eq!(second.stream_tag.as_ref().unwrap().as_str(), "A");

    let third = next_frame(&mut rx).await;
    assert!(third.is_keyframe());
    assert_eq!(third.dts, 40);
    assert_eq!(third.stream_tag.as_ref().unwrap().as_str(), "A");
}

#[tokio::test]
async fn test_late_joiner_gets_cached_configs_first() {
    let stream = MediaStream::spawn(StreamConfig::new("live_2"), LiveFlavor).unwrap();

    stream.publish(video_config()).unwrap();
    stream.publish(audio_config()).unwrap();
    stream.publish(keyframe(0)).unwrap();

    let (sink, mut rx) = channel();
    stream
        .play(sink, SubscribeOptions::new().stream_tag("late"))
        .await
        .unwrap();

    stream.publish(inter(40)).unwrap();

    let events = [
        next_frame(&mut rx).await,
        next_frame(&mut rx).await,
        next_frame(&mut rx).await,
    ];
    assert!(events[0].is_config() && events[0].is_video());
    assert!(events[1].is_config() && events[1].is_audio());
    assert!(!events[2].is_config());
    assert_eq!(events[2].dts, 40);
}

#[tokio::test]
async fn test_no_frames_before_start() {
    let stream = MediaStream::spawn(StreamConfig::new("live_3"), LiveFlavor).unwrap();

    let (sink, mut rx) = channel();
    let id = sink.id();
    stream.subscribe(sink, SubscribeOptions::new()).await.unwrap();

    stream.publish(keyframe(0)).unwrap();
    // Round-trip to be sure the frame was dispatched.
    stream.status().await.unwrap();
    assert!(rx.try_recv().is_err());

    stream.start(id).await.unwrap();
    stream.publish(inter(40)).unwrap();
    assert_eq!(next_frame(&mut rx).await.dts, 40);
}

#[tokio::test]
async fn test_audio_filter_rejects_content() {
    let stream = MediaStream::spawn(StreamConfig::new("live_4"), LiveFlavor).unwrap();

    let (sink, mut rx) = channel();
    stream
        .play(sink, SubscribeOptions::new().send_audio(false))
        .await
        .unwrap();

    stream
        .publish(Frame::audio(Codec::Aac, 0, Bytes::from_static(&[1])))
        .unwrap();
    stream.publish(keyframe(10)).unwrap();

    // Only the video frame comes through.
    let frame = next_frame(&mut rx).await;
    assert!(frame.is_video());
    assert_eq!(frame.dts, 10);
}

#[tokio::test(start_paused = true)]
async fn test_source_failover_glues_timeline() {
    trace_init();
    let config = StreamConfig::new("failover")
        .source_timeout(SourceTimeout::After(Duration::from_secs(5)));
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    let (s1, g1) = Source::new("ingest-1");
    stream.set_source(s1).unwrap();

    let (sink, mut rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();

    stream.publish(keyframe(40_000)).unwrap();
    assert_eq!(next_frame(&mut rx).await.dts, 40_000);

    // Source dies; the grace timer arms.
    drop(g1);
    time::sleep(Duration::from_millis(10)).await;

    // A replacement arrives at 3s, well inside the 5s grace window.
    time::sleep(Duration::from_secs(3)).await;
    let (s2, _g2) = Source::new("ingest-2");
    stream.set_source(s2).unwrap();

    // Ride past the original deadline: the timer was cancelled.
    time::sleep(Duration::from_secs(4)).await;
    assert!(stream.status().await.is_ok());

    // First frame from the new source continues the old timeline.
    stream.publish(keyframe(10_000)).unwrap();
    let glued = next_frame(&mut rx).await;
    assert_eq!(glued.dts, 40_000);

    let status = stream.status().await.unwrap();
    assert!(status.has_source);
    assert_eq!(status.last_dts, Some(40_000));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_on_source_loss() {
    let config = StreamConfig::new("fragile").source_timeout(SourceTimeout::Shutdown);
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    let (s1, g1) = Source::new("ingest");
    stream.set_source(s1).unwrap();

    let (sink, mut rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();

    drop(g1);

    // Subscribers observe the end of the stream through their channels.
    assert!(rx.recv().await.is_none());
    assert!(matches!(stream.status().await, Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn test_no_source_grace_expires() {
    let config = StreamConfig::new("expiring")
        .source_timeout(SourceTimeout::After(Duration::from_secs(2)));
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    let (s1, g1) = Source::new("ingest");
    stream.set_source(s1).unwrap();
    stream.status().await.unwrap();

    drop(g1);
    time::sleep(Duration::from_secs(3)).await;

    assert!(matches!(stream.status().await, Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn test_source_never_policy_keeps_stream_alive() {
    let config = StreamConfig::new("immortal").source_timeout(SourceTimeout::Never);
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    let (s1, g1) = Source::new("ingest");
    stream.set_source(s1).unwrap();
    drop(g1);

    time::sleep(Duration::from_secs(300)).await;
    let status = stream.status().await.unwrap();
    assert!(!status.has_source);
}

/// Flavor that answers the grace-period expiry with a standby source.
struct FailoverFlavor {
    backup: Option<Source>,
}

impl Flavor for FailoverFlavor {
    fn handle_control(
        &mut self,
        event: ControlEvent,
        _ctx: &mut FlavorContext<'_>,
    ) -> ControlReply {
        match event {
            ControlEvent::NoSource => match self.backup.take() {
                Some(source) => ControlReply::Reply(ControlValue::Source(source)),
                None => ControlReply::NoReply,
            },
            _ => ControlReply::NoReply,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_flavor_supplies_backup_source() {
    let (backup, _backup_guard) = Source::new("standby");
    let config = StreamConfig::new("resilient")
        .source_timeout(SourceTimeout::After(Duration::from_secs(2)));
    let stream = MediaStream::spawn(
        config,
        FailoverFlavor {
            backup: Some(backup),
        },
    )
    .unwrap();

    let (s1, g1) = Source::new("primary");
    stream.set_source(s1).unwrap();

    let (sink, mut rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();
    stream.publish(keyframe(1_000)).unwrap();
    assert_eq!(next_frame(&mut rx).await.dts, 1_000);

    // Primary dies and nobody calls set_source; the flavor's standby takes
    // over when the grace period expires.
    drop(g1);
    time::sleep(Duration::from_secs(3)).await;

    let status = stream.status().await.unwrap();
    assert!(status.has_source);

    stream.publish(keyframe(0)).unwrap();
    // Timeline continues from the old position.
    assert_eq!(next_frame(&mut rx).await.dts, 1_000);
}

#[tokio::test]
async fn test_passive_file_playback_and_accounting() {
    trace_init();
    let stream = MediaStream::spawn(
        StreamConfig::new("vod"),
        FileFlavor::new(Box::new(file_storage())),
    )
    .unwrap();

    let status = stream.status().await.unwrap();
    assert_eq!(status.kind, StreamKind::File);
    assert_eq!(status.ts_delay_ms, 0);

    let (sink, mut rx) = channel();
    // Large pre-push window: the whole file drains without pacing waits.
    stream
        .play(sink, SubscribeOptions::new().buffer_ms(60_000))
        .await
        .unwrap();

    let first = next_frame(&mut rx).await;
    assert!(first.is_config());
    let second = next_frame(&mut rx).await;
    assert!(second.is_keyframe());
    assert_eq!(next_frame(&mut rx).await.dts, 40);
    assert_eq!(next_frame(&mut rx).await.dts, 80);
    assert!(matches!(
        rx.recv().await,
        Some(StreamEvent::EndOfStream { .. })
    ));

    // Config frames are never charged; content is.
    let rows = stream.info(&["clients"]).await.unwrap();
    let (_, streamcore::stream::InfoValue::Clients(clients)) = &rows[0] else {
        panic!("expected client rows");
    };
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].bytes, 16);
}

#[tokio::test]
async fn test_passive_seek_rewinds_ticker() {
    let stream = MediaStream::spawn(
        StreamConfig::new("vod_seek"),
        FileFlavor::new(Box::new(file_storage())),
    )
    .unwrap();

    let (sink, mut rx) = channel();
    let id = stream
        .play(sink, SubscribeOptions::new().buffer_ms(60_000))
        .await
        .unwrap();

    // Drain the first playback to the end.
    loop {
        match rx.recv().await {
            Some(StreamEvent::EndOfStream { .. }) => break,
            Some(StreamEvent::Frame(_)) => {}
            None => panic!("stream ended early"),
        }
    }

    // Rewind: playback resumes from the keyframe at the target.
    stream.seek(id, 0).await.unwrap();
    let first = next_frame(&mut rx).await;
    assert!(first.is_keyframe());
    assert_eq!(first.dts, 0);
    assert_eq!(next_frame(&mut rx).await.dts, 40);
}

#[tokio::test]
async fn test_seek_without_storage_fails() {
    let stream = MediaStream::spawn(StreamConfig::new("live_5"), LiveFlavor).unwrap();

    let (sink, _rx) = channel();
    let id = stream.play(sink, SubscribeOptions::new()).await.unwrap();

    assert!(matches!(stream.seek(id, 0).await, Err(Error::NoStorage)));
    assert!(matches!(
        stream.read_frame(Some(id), None).await,
        Err(Error::NoStorage)
    ));
    // Pure queries just come back empty.
    assert_eq!(
        stream.seek_info(0, SeekDirection::After).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_timeshift_seek_into_recent_past() {
    let config = StreamConfig::new("ts_live").timeshift(Duration::from_secs(30));
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    stream.publish(keyframe(0)).unwrap();
    stream.publish(inter(40)).unwrap();
    stream.publish(keyframe(1_000)).unwrap();
    stream.publish(inter(1_040)).unwrap();

    let position = stream
        .seek_info(500, SeekDirection::After)
        .await
        .unwrap()
        .expect("seekable position");
    assert_eq!(position.dts, 1_000);

    // The resolved key reads back as a keyframe with the reported DTS.
    let outcome = stream.read_frame(None, Some(position.key)).await.unwrap();
    let ReadOutcome::Frame(frame) = outcome else {
        panic!("expected a frame at the seek position");
    };
    assert!(frame.is_keyframe());
    assert_eq!(frame.dts, position.dts);
}

#[tokio::test]
async fn test_timeshift_conflicts_with_installed_storage() {
    let config = StreamConfig::new("conflicted").timeshift(Duration::from_secs(30));
    let result = MediaStream::spawn(config, FileFlavor::new(Box::new(file_storage())));
    assert!(matches!(result, Err(Error::TimeshiftAndStorage)));
}

#[tokio::test]
async fn test_unknown_info_key_is_survivable() {
    let stream = MediaStream::spawn(StreamConfig::new("introspect"), LiveFlavor).unwrap();

    let err = stream.info(&["client_count", "foo"]).await.unwrap_err();
    match err {
        Error::BadInfoKeys(keys) => assert_eq!(keys, vec!["client_count", "foo"]),
        other => panic!("expected BadInfoKeys, got {other:?}"),
    }

    // The actor survived the bad request.
    let rows = stream.info(&["client_count", "type"]).await.unwrap();
    assert!(matches!(
        rows[0].1,
        streamcore::stream::InfoValue::Count(0)
    ));
}

#[tokio::test]
async fn test_subscribe_unsubscribe_round_trip() {
    let stream = MediaStream::spawn(StreamConfig::new("churn"), LiveFlavor).unwrap();

    let (sink, _rx) = channel();
    let id = sink.id();
    stream
        .subscribe(sink.clone(), SubscribeOptions::new())
        .await
        .unwrap();
    assert_eq!(stream.status().await.unwrap().client_count, 1);

    // Double subscribe is rejected without disturbing the registry.
    assert!(matches!(
        stream.subscribe(sink, SubscribeOptions::new()).await,
        Err(Error::AlreadySubscribed(_))
    ));
    assert_eq!(stream.status().await.unwrap().client_count, 1);

    stream.unsubscribe(id).await.unwrap();
    assert_eq!(stream.status().await.unwrap().client_count, 0);

    // Unsubscribe tolerates a missing client.
    stream.unsubscribe(id).await.unwrap();
}

#[tokio::test]
async fn test_dead_client_is_reaped() {
    let stream = MediaStream::spawn(StreamConfig::new("reaper"), LiveFlavor).unwrap();

    let (sink, rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();
    assert_eq!(stream.status().await.unwrap().client_count, 1);

    drop(rx);
    // The liveness watch posts the death; give the actor a beat to see it.
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stream.status().await.unwrap().client_count, 0);
}

#[tokio::test]
async fn test_pause_resume_push_client() {
    let stream = MediaStream::spawn(StreamConfig::new("pausable"), LiveFlavor).unwrap();

    let (sink, mut rx) = channel();
    let id = stream.play(sink, SubscribeOptions::new()).await.unwrap();

    stream.publish(keyframe(0)).unwrap();
    assert_eq!(next_frame(&mut rx).await.dts, 0);

    stream.pause(id).await.unwrap();
    stream.publish(inter(40)).unwrap();
    stream.status().await.unwrap();
    assert!(rx.try_recv().is_err());

    stream.resume(id).await.unwrap();
    stream.publish(inter(80)).unwrap();
    let frame = next_frame(&mut rx).await;
    assert_eq!(frame.dts, 80);
}

#[tokio::test]
async fn test_stop_stream() {
    let stream = MediaStream::spawn(StreamConfig::new("stoppable"), LiveFlavor).unwrap();

    let (sink, mut rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();

    stream.stop().await.unwrap();
    assert!(rx.recv().await.is_none());
    assert!(matches!(stream.status().await, Err(Error::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn test_media_info_forced_after_config_wait() {
    let stream = MediaStream::spawn(StreamConfig::new("silent"), LiveFlavor).unwrap();

    // No configuration ever arrives; the 5s wait window forces pending
    // tracks to concrete empty lists.
    let info = stream.media_info().await.unwrap();
    assert!(info.is_ready());
    assert!(info.video.as_slice().is_empty());
    assert!(info.audio.as_slice().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_set_source_twice_keeps_fresh_monitor() {
    let config = StreamConfig::new("resub").source_timeout(SourceTimeout::Shutdown);
    let stream = MediaStream::spawn(config, LiveFlavor).unwrap();

    let (s1, g1) = Source::new("ingest");
    stream.set_source(s1.clone()).unwrap();
    stream.set_source(s1).unwrap();
    stream.status().await.unwrap();

    // The re-registration armed a fresh monitor; the loss still lands.
    drop(g1);
    time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(stream.status().await, Err(Error::Stopped)));
}

/// Transcoder that drops every audio frame and doubles video timestamps.
struct VideoOnlyDoubler;

impl streamcore::media::Transcoder for VideoOnlyDoubler {
    fn apply(&mut self, frame: Frame) -> Option<Frame> {
        if frame.is_audio() {
            return None;
        }
        let mut frame = frame;
        frame.dts *= 2;
        frame.pts *= 2;
        Some(frame)
    }
}

#[tokio::test]
async fn test_transcoder_rewrites_and_drops() {
    let stream = MediaStream::spawn_with_transcoder(
        StreamConfig::new("transcoded"),
        LiveFlavor,
        Some(Box::new(VideoOnlyDoubler)),
    )
    .unwrap();

    let (sink, mut rx) = channel();
    stream.play(sink, SubscribeOptions::new()).await.unwrap();

    stream
        .publish(Frame::audio(Codec::Aac, 100, Bytes::from_static(&[1])))
        .unwrap();
    stream.publish(keyframe(100)).unwrap();

    // The audio frame was dropped before dispatch; the video frame arrives
    // with the rewritten timestamp.
    let frame = next_frame(&mut rx).await;
    assert!(frame.is_video());
    assert_eq!(frame.dts, 200);
}

#[tokio::test]
async fn test_set_media_info_answers_waiters() {
    let stream = MediaStream::spawn(StreamConfig::new("negotiated"), LiveFlavor).unwrap();

    let waiter = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.media_info().await })
    };
    time::sleep(Duration::from_millis(50)).await;

    let mut info = streamcore::MediaInfo::pending();
    info.apply_config(&video_config());
    info.apply_config(&audio_config());
    stream.set_media_info(info).await.unwrap();

    let answered = waiter.await.unwrap().unwrap();
    assert!(answered.is_ready());
    assert_eq!(answered.video.as_slice()[0].codec, Codec::H264);
}

#[tokio::test]
async fn test_file_duration_merged_into_media_info() {
    let stream = MediaStream::spawn(
        StreamConfig::new("vod_info"),
        FileFlavor::new(Box::new(file_storage())),
    )
    .unwrap();

    let info = stream.media_info().await.unwrap();
    assert_eq!(info.duration, Some(80));
}

#[tokio::test]
async fn test_file_tracks_derived_from_storage_head() {
    let stream = MediaStream::spawn(
        StreamConfig::new("vod_derived"),
        FileFlavor::new(Box::new(file_storage())),
    )
    .unwrap();

    // The video track comes from the config frame at the head of the file;
    // the file carries no audio config, so that track resolves to empty.
    let info = stream.media_info().await.unwrap();
    assert!(info.is_ready());
    assert_eq!(info.video.as_slice()[0].codec, Codec::H264);
    assert!(info.audio.as_slice().is_empty());
}

#[tokio::test]
async fn test_file_flavor_keeps_config_seeded_media_info() {
    // The stream configuration already knows the audio track; only the
    // still-pending video track is filled from the storage head.
    let mut seeded = streamcore::MediaInfo::pending();
    seeded.apply_config(&audio_config());

    let stream = MediaStream::spawn(
        StreamConfig::new("vod_seeded").media_info(seeded),
        FileFlavor::new(Box::new(file_storage())),
    )
    .unwrap();

    let info = stream.media_info().await.unwrap();
    assert!(info.is_ready());
    assert_eq!(info.audio.as_slice()[0].codec, Codec::Aac);
    assert_eq!(info.video.as_slice()[0].codec, Codec::H264);
}
