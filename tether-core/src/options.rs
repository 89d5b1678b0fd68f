//! Socket configuration options
//!
//! One [`SocketOptions`] value configures a façade and every managed socket it
//! creates: timeouts, reconnection, heartbeat, buffer sizing and framing.

use crate::config::BufferConfig;
use crate::monitor::MonitorFactory;
use std::time::Duration;

/// How messages are delimited on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Length-prefixed frames with text/binary/close opcodes and a FIN bit.
    #[default]
    Framed,
    /// No framing: every completed read is delivered as one binary message
    /// and sends are written verbatim. Close is signalled by EOF.
    ///
    /// A heartbeat monitor writes its `0xFF` ping into the same byte stream,
    /// and a ping that shares a read with application bytes reaches the
    /// application. Raw peers normally run with
    /// [`SocketOptions::without_heartbeat`].
    Raw,
}

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use tether_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reconnect_delay(Duration::from_millis(250))
///     .with_ping_interval(Duration::from_secs(2))
///     .with_max_ping_delay(Duration::from_secs(6));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Connection timeout
    ///
    /// Maximum time to wait for the TCP connect to complete.
    /// - Default: 10 seconds
    /// - `Duration::ZERO`: use the OS default
    pub connect_timeout: Duration,

    /// Reconnect delay
    ///
    /// Delay before the next connection attempt after a failure or loss.
    /// A zero delay still defers the attempt through the executor.
    /// - Default: 1 second
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay
    ///
    /// - Default: 0 (fixed delay, always `reconnect_delay`)
    /// - When greater than `reconnect_delay`: delay doubles per consecutive
    ///   failure up to this value
    pub reconnect_delay_max: Duration,

    /// Maximum consecutive reconnect attempts
    ///
    /// - `None`: retry forever (default)
    /// - `Some(n)`: give up after n failed attempts and settle in Disconnected
    pub max_reconnect_attempts: Option<u32>,

    /// Heartbeat interval
    ///
    /// How often the monitor checks liveness and sends a ping.
    /// - Default: 5 seconds
    pub ping_interval: Duration,

    /// Maximum silence before a connection is considered lost
    ///
    /// Measured since the last ping received from the peer.
    /// - Default: 15 seconds
    pub max_ping_delay: Duration,

    /// Graceful close budget
    ///
    /// Upper bound for the close frame and write shutdown on disconnect.
    /// - Default: 1 second
    pub close_timeout: Duration,

    /// Receive buffer sizing
    pub buffers: BufferConfig,

    /// Maximum message size
    ///
    /// - `None`: no limit (default)
    /// - `Some(size)`: larger inbound messages end the connection with an error
    pub max_message_size: Option<usize>,

    /// Maximum payload per outgoing frame
    ///
    /// - `None`: every message is one frame (default)
    /// - `Some(size)`: longer messages are split into continuation frames
    pub max_frame_payload: Option<usize>,

    /// Disable Nagle's algorithm on every stream (TCP_NODELAY)
    ///
    /// - Default: true
    pub nodelay: bool,

    /// Framing of the stream
    pub mode: TransportMode,

    /// Connection monitor built for each connection
    pub monitor: MonitorFactory,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::ZERO, // Fixed delay
            max_reconnect_attempts: None,        // Retry forever
            ping_interval: Duration::from_secs(5),
            max_ping_delay: Duration::from_secs(15),
            close_timeout: Duration::from_secs(1),
            buffers: BufferConfig::default(),
            max_message_size: None,
            max_frame_payload: None,
            nodelay: true,
            mode: TransportMode::Framed,
            monitor: MonitorFactory::Heartbeat,
        }
    }
}

impl SocketOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set maximum reconnect delay for exponential backoff.
    #[must_use]
    pub fn with_reconnect_delay_max(mut self, max: Duration) -> Self {
        self.reconnect_delay_max = max;
        self
    }

    /// Cap the number of consecutive reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set heartbeat interval.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set maximum tolerated silence.
    #[must_use]
    pub fn with_max_ping_delay(mut self, delay: Duration) -> Self {
        self.max_ping_delay = delay;
        self
    }

    /// Set graceful close budget.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set receive buffer configuration.
    #[must_use]
    pub fn with_buffer_config(mut self, config: BufferConfig) -> Self {
        self.buffers = config;
        self
    }

    /// Set initial receive buffer size.
    #[must_use]
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.buffers = BufferConfig::custom(size, self.buffers.read_chunk_size);
        self
    }

    /// Set maximum inbound message size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set maximum payload per outgoing frame.
    #[must_use]
    pub fn with_max_frame_payload(mut self, size: Option<usize>) -> Self {
        self.max_frame_payload = size.map(|s| s.max(1));
        self
    }

    /// Enable or disable TCP_NODELAY.
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set transport framing.
    #[must_use]
    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the connection monitor factory.
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorFactory) -> Self {
        self.monitor = monitor;
        self
    }

    /// Shorthand for `with_monitor(MonitorFactory::Disabled)`.
    #[must_use]
    pub fn without_heartbeat(self) -> Self {
        self.with_monitor(MonitorFactory::Disabled)
    }

    /// Returns true if heartbeat pings would be mixed into a raw byte stream.
    #[inline]
    pub fn heartbeat_shares_raw_stream(&self) -> bool {
        self.mode == TransportMode::Raw && !matches!(self.monitor, MonitorFactory::Disabled)
    }

    /// Returns true if a connect should be bounded by a timer.
    #[inline]
    #[must_use]
    pub fn has_connect_timeout(&self) -> bool {
        !self.connect_timeout.is_zero()
    }

    /// Returns true if reconnect delays grow between attempts.
    #[inline]
    #[must_use]
    pub fn has_backoff(&self) -> bool {
        self.reconnect_delay_max > self.reconnect_delay
    }
}
