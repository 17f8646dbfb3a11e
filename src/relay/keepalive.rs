//! TCP keep-alive tuning for relay connections, with a logged fallback on
//! platforms that don't expose per-socket idle/interval/probe tuning.

use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::warn;

/// Keep-alive parameters a [`crate::relay::RelayClient`] applies to its
/// connection.
#[derive(Clone, Copy, Debug)]
pub struct KeepAlive {
    /// Idle time before the first probe is sent.
    pub idle: Duration,
    /// Interval between probes once idle.
    pub interval: Duration,
    /// Number of unacknowledged probes before the connection is dropped.
    pub probes: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        KeepAlive {
            idle: Duration::from_secs(60),
            interval: Duration::from_secs(10),
            probes: 6,
        }
    }
}

/// Applies `settings` to `stream`. Idle and interval are supported on every
/// platform socket2 targets; probe count is only configurable on platforms
/// that expose `TCP_KEEPCNT`-equivalent tuning — elsewhere a warning is
/// logged and the probe count is left at the OS default.
pub fn apply(stream: &TcpStream, settings: KeepAlive) {
    let sock = SockRef::from(stream);
    let mut keepalive = TcpKeepalive::new().with_time(settings.idle).with_interval(settings.interval);

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "fuchsia",
        target_os = "illumos",
    ))]
    {
        keepalive = keepalive.with_retries(settings.probes);
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "fuchsia",
        target_os = "illumos",
    )))]
    {
        warn!(
            probes = settings.probes,
            "platform does not support tuning the keep-alive probe count; leaving it at the OS default"
        );
    }

    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        warn!(
            error = %e,
            "failed to apply tuned keep-alive settings, falling back to the OS default keep-alive on/off toggle"
        );
    }
}
