//! Audio format selection and per-session options.

use std::sync::Arc;
use std::time::Duration;

use crate::core::codec::AudioFormat;
use crate::core::realtime::{AgentConfig, OpenAIRealtimeConnector, RealtimeConnector};
use crate::core::telephony::MediaFormat;
use crate::errors::{BridgeError, BridgeResult};

/// Default bound for each pending/writer queue.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 256;

/// Default idle timeout across both sockets.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default realtime handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chooses the session's audio format.
///
/// Explicit session configuration wins; otherwise the policy default applies.
/// The telephony `start` frame is checked against the result since the bridge
/// never resamples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormatPolicy {
    pub default: AudioFormat,
}

impl AudioFormatPolicy {
    pub fn new(default: AudioFormat) -> Self {
        Self { default }
    }

    pub fn resolve(&self, explicit: Option<AudioFormat>) -> AudioFormat {
        explicit.unwrap_or(self.default)
    }

    /// Resolve the format and verify the gateway's `mediaFormat` agrees.
    pub fn negotiate(
        &self,
        explicit: Option<AudioFormat>,
        media_format: Option<&MediaFormat>,
    ) -> BridgeResult<AudioFormat> {
        let resolved = self.resolve(explicit);
        if let Some(media) = media_format {
            let offered = AudioFormat::from_media_format(&media.encoding, media.sample_rate)?;
            if offered != resolved {
                return Err(BridgeError::UnsupportedFormat(format!(
                    "gateway streams {offered} but session is configured for {resolved}"
                )));
            }
        }
        Ok(resolved)
    }
}

/// Options for one [`MediaStreamBridge`](super::MediaStreamBridge).
#[derive(Clone)]
pub struct BridgeOptions {
    pub connector: Arc<dyn RealtimeConnector>,
    pub format_policy: AudioFormatPolicy,
    /// Format requested by session configuration, if any
    pub audio_format: Option<AudioFormat>,
    pub agent: AgentConfig,
    pub max_pending_frames: usize,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for BridgeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeOptions")
            .field("format_policy", &self.format_policy)
            .field("audio_format", &self.audio_format)
            .field("max_pending_frames", &self.max_pending_frames)
            .field("read_timeout", &self.read_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new(Arc::new(OpenAIRealtimeConnector::new()))
    }
}

impl BridgeOptions {
    pub fn new(connector: Arc<dyn RealtimeConnector>) -> Self {
        Self {
            connector,
            format_policy: AudioFormatPolicy::default(),
            audio_format: None,
            agent: AgentConfig::default(),
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = Some(format);
        self
    }

    pub fn with_format_policy(mut self, policy: AudioFormatPolicy) -> Self {
        self.format_policy = policy;
        self
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_max_pending_frames(mut self, max: usize) -> Self {
        self.max_pending_frames = max.max(1);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
