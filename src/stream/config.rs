//! Stream configuration.

use std::time::Duration;

use crate::media::MediaInfo;

/// Classification of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    /// Push-driven live channel; subscribers receive frames as they arrive.
    #[default]
    Live,
    /// Storage-backed stream; subscribers are driven passively by tickers.
    File,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Live => f.write_str("live"),
            StreamKind::File => f.write_str("file"),
        }
    }
}

/// Policy applied when the source liveness watch fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTimeout {
    /// Terminate immediately.
    Shutdown,
    /// Stay alive without a source indefinitely.
    Never,
    /// Grace period before giving up; zero stops immediately.
    After(Duration),
}

impl Default for SourceTimeout {
    fn default() -> Self {
        SourceTimeout::After(Duration::from_secs(60))
    }
}

/// Per-stream configuration options.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Required stream identity.
    pub name: String,

    /// Origin URL, when the stream has one.
    pub url: Option<String>,

    /// Virtual host the stream belongs to.
    pub host: Option<String>,

    /// Stream classification. Flavors may reclassify at init.
    pub kind: StreamKind,

    /// Initial track descriptors. Defaults to both tracks pending
    /// configuration.
    pub media_info: Option<MediaInfo>,

    /// Largest acceptable DTS gap between consecutive source frames before
    /// the timeline is re-glued.
    pub glue_delta: Duration,

    /// Wrap an in-memory timeshift window around the stream. Mutually
    /// exclusive with a flavor-installed storage.
    pub timeshift: Option<Duration>,

    /// What to do when the source is lost.
    pub source_timeout: SourceTimeout,

    /// Opaque client-idle policy surfaced to flavors; not interpreted by
    /// the core.
    pub clients_timeout: Option<Duration>,

    /// Opaque retry policy surfaced to flavors; not interpreted by the
    /// core.
    pub retry_limit: Option<u32>,

    /// Mailbox inactivity window while a source is present.
    pub inactivity_timeout: Duration,

    /// How long `media_info` callers may be parked before pending tracks
    /// are forced to empty lists.
    pub config_wait: Duration,

    /// Storage reclaim / stats cadence.
    pub housekeep_interval: Duration,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            host: None,
            kind: StreamKind::default(),
            media_info: None,
            glue_delta: Duration::from_secs(5),
            timeshift: None,
            source_timeout: SourceTimeout::default(),
            clients_timeout: None,
            retry_limit: None,
            inactivity_timeout: Duration::from_secs(120),
            config_wait: Duration::from_secs(5),
            housekeep_interval: Duration::from_secs(30),
        }
    }

    /// Set the origin URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the virtual host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the stream classification.
    pub fn kind(mut self, kind: StreamKind) -> Self {
        self.kind = kind;
        self
    }

    /// Seed the initial track descriptors.
    pub fn media_info(mut self, info: MediaInfo) -> Self {
        self.media_info = Some(info);
        self
    }

    /// Set the timeline glue threshold.
    pub fn glue_delta(mut self, delta: Duration) -> Self {
        self.glue_delta = delta;
        self
    }

    /// Enable the in-memory timeshift window.
    pub fn timeshift(mut self, window: Duration) -> Self {
        self.timeshift = Some(window);
        self
    }

    /// Set the source-loss policy.
    pub fn source_timeout(mut self, timeout: SourceTimeout) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Set the mailbox inactivity window.
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the configuration wait window.
    pub fn config_wait(mut self, wait: Duration) -> Self {
        self.config_wait = wait;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::new("channel_1");

        assert_eq!(config.name, "channel_1");
        assert_eq!(config.kind, StreamKind::Live);
        assert_eq!(
            config.source_timeout,
            SourceTimeout::After(Duration::from_secs(60))
        );
        assert_eq!(config.inactivity_timeout, Duration::from_secs(120));
        assert_eq!(config.config_wait, Duration::from_secs(5));
        assert!(config.timeshift.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = StreamConfig::new("vod")
            .kind(StreamKind::File)
            .url("file:///media/vod.flv")
            .host("example.org")
            .glue_delta(Duration::from_secs(2))
            .timeshift(Duration::from_secs(30))
            .source_timeout(SourceTimeout::Never)
            .inactivity_timeout(Duration::from_secs(10));

        assert_eq!(config.kind, StreamKind::File);
        assert_eq!(config.url.as_deref(), Some("file:///media/vod.flv"));
        assert_eq!(config.host.as_deref(), Some("example.org"));
        assert_eq!(config.glue_delta, Duration::from_secs(2));
        assert_eq!(config.timeshift, Some(Duration::from_secs(30)));
        assert_eq!(config.source_timeout, SourceTimeout::Never);
        assert_eq!(config.inactivity_timeout, Duration::from_secs(10));
    }
}
