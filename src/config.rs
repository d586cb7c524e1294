//! Listener configuration: endpoints, timeouts, and protocol constants.

use std::{fmt, str::FromStr, time::Duration};

use crate::{
    codec::{MAX_FRAME_SIZE, MIN_FRAME_SIZE},
    error::ConfigError,
    notice::ControlVocabulary,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_KEEP_ALIVE_MULTIPLIER: u32 = 3;
const DEFAULT_BACKOFF_MIN: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(64);

/// A `host:port` pair the listener may connect to.
///
/// # Examples
///
/// ```
/// use noticewire::Endpoint;
///
/// let endpoint: Endpoint = "alerts.example.org:8099".parse().expect("valid endpoint");
/// assert_eq!(endpoint.to_string(), "alerts.example.org:8099");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address literal.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidEndpoint(s.to_owned()))?;
        // IPv6 literals arrive bracketed; the resolver wants them bare.
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(ConfigError::InvalidEndpoint(s.to_owned()));
        }
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidEndpoint(s.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

/// Immutable configuration for one listener.
///
/// Built via [`ListenerConfig::builder`]; validation happens in
/// [`ListenerConfigBuilder::build`], before any network activity.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    endpoints: Vec<Endpoint>,
    connect_timeout: Duration,
    handshake_timeout: Duration,
    ping_interval: Duration,
    keep_alive_multiplier: u32,
    max_frame_size: usize,
    reconnect_backoff_min: Duration,
    reconnect_backoff_max: Duration,
    client_name: String,
    protocol_version: String,
    vocabulary: ControlVocabulary,
}

impl ListenerConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ListenerConfigBuilder { ListenerConfigBuilder::new() }

    /// Ordered fallback list of endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] { &self.endpoints }

    /// Timeout applied to each individual connect attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration { self.connect_timeout }

    /// Timeout for the whole handshake exchange.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration { self.handshake_timeout }

    /// Expected interval between server keep-alive probes.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration { self.ping_interval }

    /// Multiplier applied to [`ping_interval`](Self::ping_interval) to form
    /// the liveness timeout.
    #[must_use]
    pub const fn keep_alive_multiplier(&self) -> u32 { self.keep_alive_multiplier }

    /// Time without any inbound frame after which the peer is presumed dead.
    #[must_use]
    pub fn liveness_timeout(&self) -> Duration {
        self.ping_interval * self.keep_alive_multiplier
    }

    /// Maximum accepted inbound payload size.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize { self.max_frame_size }

    /// Initial reconnect backoff delay.
    #[must_use]
    pub const fn reconnect_backoff_min(&self) -> Duration { self.reconnect_backoff_min }

    /// Cap on the reconnect backoff delay.
    #[must_use]
    pub const fn reconnect_backoff_max(&self) -> Duration { self.reconnect_backoff_max }

    /// Identity reported to the server during the handshake.
    #[must_use]
    pub fn client_name(&self) -> &str { &self.client_name }

    /// Protocol version reported to the server during the handshake.
    #[must_use]
    pub fn protocol_version(&self) -> &str { &self.protocol_version }

    /// Interop constants for control-document classification.
    #[must_use]
    pub const fn vocabulary(&self) -> &ControlVocabulary { &self.vocabulary }
}

/// Builder for [`ListenerConfig`].
///
/// # Examples
///
/// ```
/// use noticewire::{Endpoint, ListenerConfig};
///
/// let config = ListenerConfig::builder()
///     .endpoint(Endpoint::new("127.0.0.1", 8099))
///     .client_name("ivo://example/client")
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.endpoints().len(), 1);
/// ```
#[derive(Debug)]
pub struct ListenerConfigBuilder {
    endpoints: Vec<Endpoint>,
    connect_timeout: Duration,
    handshake_timeout: Duration,
    ping_interval: Duration,
    keep_alive_multiplier: u32,
    max_frame_size: usize,
    reconnect_backoff_min: Duration,
    reconnect_backoff_max: Duration,
    client_name: String,
    protocol_version: String,
    vocabulary: ControlVocabulary,
}

impl ListenerConfigBuilder {
    fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            keep_alive_multiplier: DEFAULT_KEEP_ALIVE_MULTIPLIER,
            max_frame_size: MAX_FRAME_SIZE,
            reconnect_backoff_min: DEFAULT_BACKOFF_MIN,
            reconnect_backoff_max: DEFAULT_BACKOFF_MAX,
            client_name: "noticewire".to_owned(),
            protocol_version: "1.0".to_owned(),
            vocabulary: ControlVocabulary::default(),
        }
    }

    /// Append one endpoint to the fallback list.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Append several endpoints, tried in the given order.
    #[must_use]
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake exchange timeout.
    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the expected server keep-alive interval.
    #[must_use]
    pub const fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the liveness multiplier. Clamped to at least 1.
    #[must_use]
    pub fn keep_alive_multiplier(mut self, multiplier: u32) -> Self {
        self.keep_alive_multiplier = multiplier.max(1);
        self
    }

    /// Set the maximum inbound payload size.
    ///
    /// The value is clamped between 64 bytes and 16 MiB.
    #[must_use]
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE);
        self
    }

    /// Set the reconnect backoff bounds. `min` is clamped to `max`.
    #[must_use]
    pub fn reconnect_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_backoff_min = min.min(max);
        self.reconnect_backoff_max = max;
        self
    }

    /// Set the client identity sent in the handshake.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the protocol version sent in the handshake.
    #[must_use]
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Replace the control vocabulary.
    #[must_use]
    pub fn vocabulary(mut self, vocabulary: ControlVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoEndpoints`] if no endpoint was configured.
    pub fn build(self) -> Result<ListenerConfig, ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(ListenerConfig {
            endpoints: self.endpoints,
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
            ping_interval: self.ping_interval,
            keep_alive_multiplier: self.keep_alive_multiplier,
            max_frame_size: self.max_frame_size,
            reconnect_backoff_min: self.reconnect_backoff_min,
            reconnect_backoff_max: self.reconnect_backoff_max,
            client_name: self.client_name,
            protocol_version: self.protocol_version,
            vocabulary: self.vocabulary,
        })
    }
}
