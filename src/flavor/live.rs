//! Flavor for pushed live streams.

use crate::flavor::Flavor;

/// Pass-through flavor for publish-driven live streams.
///
/// Everything stays at the core's defaults: frames are dispatched as they
/// arrive, source loss runs the configured timeout policy, and the stream
/// keeps its `Live` classification. Protocol-specific ingest (mpegts, rtmp,
/// rtsp) builds on this by overriding the callbacks it cares about.
#[derive(Debug, Default)]
pub struct LiveFlavor;

impl Flavor for LiveFlavor {}
