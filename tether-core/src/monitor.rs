//! Connection liveness monitoring.
//!
//! A [`ConnectionMonitor`] watches one connection at a time. The heartbeat
//! variant sends a one-byte ping every `ping_interval` and declares the
//! connection lost when no ping from the peer was observed for longer than
//! `max_ping_delay`.
//!
//! The ping travels as an ordinary binary message containing exactly
//! [`PING_FRAME`]. An application message with the same single byte is
//! indistinguishable from a ping and is consumed as one.

use crate::executor::Executor;
use crate::options::SocketOptions;
use crate::status::SendStatus;
use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Payload of a heartbeat ping.
pub const PING_FRAME: [u8; 1] = [0xFF];

/// Returns true if `data` is a heartbeat ping.
#[inline]
#[must_use]
pub fn is_ping(data: &[u8]) -> bool {
    data == PING_FRAME
}

/// Liveness monitor attached to a connection.
///
/// Cloning yields another handle to the same monitoring state.
#[derive(Debug, Clone)]
pub enum ConnectionMonitor {
    Heartbeat(Heartbeat),
    /// Never pings, never reports loss.
    Disabled,
}

impl ConnectionMonitor {
    /// Heartbeat monitor with the given timings.
    #[must_use]
    pub fn heartbeat(interval: Duration, max_delay: Duration) -> Self {
        Self::Heartbeat(Heartbeat::new(interval, max_delay))
    }

    /// Start a monitoring session.
    ///
    /// `pinger` sends one ping; `on_lost` fires at most once per session.
    /// Returns false if already running.
    pub fn start<P, L>(&self, executor: &Arc<dyn Executor>, pinger: P, on_lost: L) -> bool
    where
        P: Fn() -> LocalBoxFuture<'static, SendStatus> + 'static,
        L: FnOnce() + 'static,
    {
        match self {
            Self::Heartbeat(hb) => hb.start(executor, pinger, on_lost),
            Self::Disabled => false,
        }
    }

    /// Stop the current session. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        match self {
            Self::Heartbeat(hb) => hb.stop(),
            Self::Disabled => false,
        }
    }

    /// Inspect an inbound binary message.
    ///
    /// Returns true if it was a ping, which also resets the silence clock.
    pub fn observe(&self, data: &[u8]) -> bool {
        match self {
            Self::Heartbeat(hb) => hb.observe(data),
            Self::Disabled => false,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        match self {
            Self::Heartbeat(hb) => hb.is_running(),
            Self::Disabled => false,
        }
    }

    /// Returns true if this monitor consumes pings.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Heartbeat(_))
    }
}

/// Heartbeat monitoring state.
///
/// `session` holds the id of the running session, 0 when stopped. Start and
/// stop are single atomic transitions on it, so they can race freely; a timer
/// whose id no longer matches exits silently.
#[derive(Clone)]
pub struct Heartbeat {
    inner: Arc<HeartbeatInner>,
}

struct HeartbeatInner {
    session: AtomicU64,
    next_session: AtomicU64,
    last_ping: Mutex<Instant>,
    interval: Duration,
    max_delay: Duration,
}

impl Heartbeat {
    #[must_use]
    pub fn new(interval: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                session: AtomicU64::new(0),
                next_session: AtomicU64::new(1),
                last_ping: Mutex::new(Instant::now()),
                interval,
                max_delay,
            }),
        }
    }

    fn start<P, L>(&self, executor: &Arc<dyn Executor>, pinger: P, on_lost: L) -> bool
    where
        P: Fn() -> LocalBoxFuture<'static, SendStatus> + 'static,
        L: FnOnce() + 'static,
    {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        if self
            .inner
            .session
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.inner.last_ping.lock() = Instant::now();
        debug!(session = id, interval = ?self.inner.interval, "heartbeat started");

        let inner = self.inner.clone();
        executor.spawn(Box::pin(async move {
            loop {
                compio::time::sleep(inner.interval).await;
                if inner.session.load(Ordering::Acquire) != id {
                    break;
                }

                let silence = inner.last_ping.lock().elapsed();
                if silence > inner.max_delay {
                    if inner
                        .session
                        .compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        debug!(session = id, ?silence, "connection lost");
                        on_lost();
                    }
                    break;
                }

                let status = pinger().await;
                trace!(session = id, %status, "ping sent");
            }
        }));
        true
    }

    fn stop(&self) -> bool {
        let previous = self.inner.session.swap(0, Ordering::AcqRel);
        if previous != 0 {
            debug!(session = previous, "heartbeat stopped");
        }
        previous != 0
    }

    fn observe(&self, data: &[u8]) -> bool {
        if !is_ping(data) {
            return false;
        }
        *self.inner.last_ping.lock() = Instant::now();
        true
    }

    fn is_running(&self) -> bool {
        self.inner.session.load(Ordering::Acquire) != 0
    }
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("interval", &self.inner.interval)
            .field("max_delay", &self.inner.max_delay)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builds the monitor for each new connection.
#[derive(Clone, Default)]
pub enum MonitorFactory {
    /// Heartbeat with `ping_interval` / `max_ping_delay` from the options.
    #[default]
    Heartbeat,
    /// No liveness monitoring.
    Disabled,
    /// Caller-provided construction.
    Custom(Arc<dyn Fn(&SocketOptions) -> ConnectionMonitor + Send + Sync>),
}

impl MonitorFactory {
    #[must_use]
    pub fn create(&self, options: &SocketOptions) -> ConnectionMonitor {
        match self {
            Self::Heartbeat => {
                ConnectionMonitor::heartbeat(options.ping_interval, options.max_ping_delay)
            }
            Self::Disabled => ConnectionMonitor::Disabled,
            Self::Custom(build) => build(options),
        }
    }
}

impl fmt::Debug for MonitorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat => f.write_str("Heartbeat"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CompioExecutor;
    use std::cell::Cell;
    use std::rc::Rc;

    fn executor() -> Arc<dyn Executor> {
        Arc::new(CompioExecutor)
    }

    fn pinger() -> impl Fn() -> LocalBoxFuture<'static, SendStatus> {
        || -> LocalBoxFuture<'static, SendStatus> { Box::pin(async { SendStatus::Ok }) }
    }

    #[compio::test]
    async fn test_fires_after_silence() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_millis(10), Duration::from_millis(25));
        let (tx, rx) = flume::bounded(1);
        let started = Instant::now();
        assert!(monitor.start(&executor(), pinger(), move || {
            let _ = tx.send(Instant::now());
        }));

        let fired = compio::time::timeout(Duration::from_secs(1), rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        let elapsed = fired.duration_since(started);
        assert!(elapsed >= Duration::from_millis(20), "fired too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "fired too late: {elapsed:?}");
        assert!(!monitor.is_running());
    }

    #[compio::test]
    async fn test_stop_twice_never_fires() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_millis(5), Duration::from_millis(10));
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        monitor.start(&executor(), pinger(), move || counter.set(counter.get() + 1));

        assert!(monitor.stop());
        assert!(!monitor.stop());
        compio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.get(), 0);
    }

    #[compio::test]
    async fn test_start_is_idempotent() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_secs(1), Duration::from_secs(3));
        assert!(monitor.start(&executor(), pinger(), || {}));
        assert!(!monitor.start(&executor(), pinger(), || {}));
        assert!(monitor.is_running());
        monitor.stop();
    }

    #[compio::test]
    async fn test_observed_pings_keep_alive() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_millis(5), Duration::from_millis(30));
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        monitor.start(&executor(), pinger(), move || flag.set(true));

        for _ in 0..10 {
            compio::time::sleep(Duration::from_millis(10)).await;
            assert!(monitor.observe(&PING_FRAME));
        }
        assert!(!fired.get());
        assert!(monitor.is_running());
        monitor.stop();
    }

    #[compio::test]
    async fn test_pings_are_sent() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_millis(5), Duration::from_secs(5));
        let sent = Rc::new(Cell::new(0u32));
        let counter = sent.clone();
        monitor.start(
            &executor(),
            move || -> LocalBoxFuture<'static, SendStatus> {
                counter.set(counter.get() + 1);
                Box::pin(async { SendStatus::Ok })
            },
            || {},
        );
        compio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop();
        assert!(sent.get() >= 2);
    }

    #[test]
    fn test_only_exact_ping_matches() {
        let monitor = ConnectionMonitor::heartbeat(Duration::from_secs(1), Duration::from_secs(3));
        assert!(monitor.observe(&[0xFF]));
        assert!(!monitor.observe(&[0xFF, 0xFF]));
        assert!(!monitor.observe(&[]));
        assert!(!monitor.observe(b"x"));
    }

    #[test]
    fn test_disabled_is_noop() {
        let monitor = ConnectionMonitor::Disabled;
        assert!(!monitor.stop());
        assert!(!monitor.observe(&PING_FRAME));
        assert!(!monitor.is_running());
        assert!(!monitor.is_enabled());
    }

    #[test]
    fn test_factory_uses_options() {
        let opts = SocketOptions::default();
        assert!(MonitorFactory::Heartbeat.create(&opts).is_enabled());
        assert!(!MonitorFactory::Disabled.create(&opts).is_enabled());

        let custom = MonitorFactory::Custom(Arc::new(|_| ConnectionMonitor::Disabled));
        assert!(!custom.create(&opts).is_enabled());
        assert_eq!(format!("{custom:?}"), "Custom(..)");
    }
}
