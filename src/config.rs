//! Watcher configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_PROBE_URL: &str = "https://www.google.com";
const DEFAULT_PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);
const DEFAULT_EVENT_BUFFER: usize = 64;
const DEFAULT_STREAM_BUFFER: usize = 64;

/// Configuration for [`ConnectivityWatcher`](crate::ConnectivityWatcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Endpoint the reachability probe GETs.
    ///
    /// Default: `https://www.google.com`
    pub probe_url: String,
    /// Connect timeout for the probe.
    ///
    /// Default: 3000 ms
    pub probe_connect_timeout: Duration,
    /// How long the listener registration is kept alive after the last
    /// subscriber detaches. A re-attach within the window cancels teardown,
    /// which avoids register/unregister thrashing on rapid UI recreation.
    ///
    /// Default: 5000 ms
    pub grace_period: Duration,
    /// Capacity of the channel carrying events from the signal source.
    ///
    /// Default: 64
    pub event_buffer: usize,
    /// Per-subscriber buffer of the broadcast stream. A subscriber that falls
    /// further behind than this skips ahead to the newest values.
    ///
    /// Default: 64
    pub stream_buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_connect_timeout: DEFAULT_PROBE_CONNECT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            event_buffer: DEFAULT_EVENT_BUFFER,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl WatcherConfig {
    /// Create a config with millisecond-scale durations, suitable for quick
    /// unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            probe_connect_timeout: Duration::from_millis(100),
            grace_period: Duration::from_millis(50),
            ..Self::default()
        }
    }
}
