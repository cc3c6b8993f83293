// SPDX-License-Identifier: MIT
//! Subscriber hub: multicast, latest-value replay and grace-period teardown.
//!
//! [`ConnectivityWatcher`] turns the observer's single upstream into a warm,
//! shareable current value:
//!
//! - the first subscriber starts the upstream (one listener registration,
//!   shared by all consumers — never re-registered per subscriber);
//! - the most recent state is cached and replayed to every new subscriber
//!   before live updates (`false` until something has been emitted);
//! - when the subscriber count drops to zero the upstream is kept alive for
//!   a grace period; a re-attach within the window cancels teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::observer::{self, ObserverHandle};
use crate::probe::{HttpProbe, ReachabilityProbe};
use crate::signal::{NetworkSignalSource, RegistrationError};

/// Emission surface handed to the observer.
///
/// Updates the shared latest-value cache and fans the state out to all
/// subscribers. `open` is cleared on teardown so a probe that resolves after
/// deregistration is discarded rather than reviving a closed stream.
#[derive(Clone)]
pub(crate) struct StateSink {
    pub(crate) latest: Arc<AtomicBool>,
    pub(crate) tx: broadcast::Sender<bool>,
    pub(crate) open: Arc<AtomicBool>,
}

impl StateSink {
    pub(crate) fn emit(&self, state: bool) {
        if !self.open.load(Ordering::Acquire) {
            debug!(state, "discarding emission after teardown");
            return;
        }
        self.latest.store(state, Ordering::Release);
        // No subscribers is fine — the cache still advanced.
        let _ = self.tx.send(state);
    }
}

/// A running upstream: the observer task plus the gate that cuts its
/// emissions off at teardown.
struct Upstream {
    open: Arc<AtomicBool>,
    observer: ObserverHandle,
}

impl Upstream {
    async fn shutdown(self) {
        self.open.store(false, Ordering::Release);
        self.observer.shutdown().await;
    }
}

struct HubState {
    subscribers: usize,
    /// Bumped on every attach and on every drop-to-zero; a pending grace
    /// teardown only fires if the epoch it captured is still current.
    epoch: u64,
    upstream: Option<Upstream>,
    /// Receiver for detach notifications, moved into the control task on
    /// first subscribe (so no runtime is required at construction).
    detach_rx: Option<mpsc::UnboundedReceiver<()>>,
}

struct Shared {
    source: Arc<dyn NetworkSignalSource>,
    probe: Arc<dyn ReachabilityProbe>,
    config: WatcherConfig,
    latest: Arc<AtomicBool>,
    tx: broadcast::Sender<bool>,
    state: Mutex<HubState>,
}

/// Shared connectivity status stream.
///
/// Cheaply cloneable — all clones share the same upstream and cache.
#[derive(Clone)]
pub struct ConnectivityWatcher {
    shared: Arc<Shared>,
    detach_tx: mpsc::UnboundedSender<()>,
}

impl ConnectivityWatcher {
    /// Create a watcher probing the endpoint configured in `config`.
    pub fn new(source: Arc<dyn NetworkSignalSource>, config: WatcherConfig) -> Self {
        let probe = Arc::new(HttpProbe::new(
            config.probe_url.clone(),
            config.probe_connect_timeout,
        ));
        Self::with_probe(source, probe, config)
    }

    /// Create a watcher with a custom reachability probe.
    pub fn with_probe(
        source: Arc<dyn NetworkSignalSource>,
        probe: Arc<dyn ReachabilityProbe>,
        config: WatcherConfig,
    ) -> Self {
        let (tx, _) = broadcast::channel(config.stream_buffer.max(1));
        let (detach_tx, detach_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                source,
                probe,
                config,
                latest: Arc::new(AtomicBool::new(false)),
                tx,
                state: Mutex::new(HubState {
                    subscribers: 0,
                    epoch: 0,
                    upstream: None,
                    detach_rx: Some(detach_rx),
                }),
            }),
            detach_tx,
        }
    }

    /// Attach a subscriber.
    ///
    /// The first subscriber (per upstream start) registers the network
    /// listener inline, so a registration failure returns to that caller;
    /// later subscribers attach to the running upstream and cannot fail.
    /// The returned subscription replays the last known state first.
    pub async fn subscribe(&self) -> Result<ConnectivitySubscription, RegistrationError> {
        let mut st = self.shared.state.lock().await;
        st.epoch = st.epoch.wrapping_add(1);
        if let Some(detach_rx) = st.detach_rx.take() {
            tokio::spawn(control_loop(Arc::clone(&self.shared), detach_rx));
        }
        if st.upstream.is_none() {
            st.upstream = Some(start_upstream(&self.shared).await?);
        }
        st.subscribers += 1;
        debug!(subscribers = st.subscribers, "subscriber attached");
        drop(st);

        let rx = self.shared.tx.subscribe();
        let replay = self.shared.latest.load(Ordering::Acquire);
        Ok(ConnectivitySubscription {
            replay: Some(replay),
            rx,
            _detach: DetachGuard {
                detach_tx: self.detach_tx.clone(),
            },
        })
    }

    /// Latest cached connectivity state (`false` before any emission).
    pub fn current(&self) -> bool {
        self.shared.latest.load(Ordering::Acquire)
    }
}

async fn start_upstream(shared: &Arc<Shared>) -> Result<Upstream, RegistrationError> {
    let open = Arc::new(AtomicBool::new(true));
    let sink = StateSink {
        latest: Arc::clone(&shared.latest),
        tx: shared.tx.clone(),
        open: Arc::clone(&open),
    };
    let observer = observer::start(
        Arc::clone(&shared.source),
        Arc::clone(&shared.probe),
        sink,
        shared.config.event_buffer,
    )
    .await?;
    Ok(Upstream { open, observer })
}

/// Processes detach notifications and runs the grace-period teardown.
///
/// Ends when the watcher and every subscription are gone, releasing any
/// remaining upstream on the way out.
async fn control_loop(shared: Arc<Shared>, mut detach_rx: mpsc::UnboundedReceiver<()>) {
    while detach_rx.recv().await.is_some() {
        let release_epoch = {
            let mut st = shared.state.lock().await;
            st.subscribers = st.subscribers.saturating_sub(1);
            debug!(subscribers = st.subscribers, "subscriber detached");
            if st.subscribers > 0 {
                continue;
            }
            st.epoch = st.epoch.wrapping_add(1);
            st.epoch
        };

        tokio::time::sleep(shared.config.grace_period).await;

        let mut st = shared.state.lock().await;
        if st.subscribers == 0 && st.epoch == release_epoch {
            if let Some(upstream) = st.upstream.take() {
                info!("grace period elapsed with no subscribers, releasing upstream");
                upstream.shutdown().await;
            }
        }
    }

    // Watcher and all subscriptions dropped.
    let mut st = shared.state.lock().await;
    if let Some(upstream) = st.upstream.take() {
        upstream.shutdown().await;
    }
}

#[derive(Debug)]
struct DetachGuard {
    detach_tx: mpsc::UnboundedSender<()>,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        let _ = self.detach_tx.send(());
    }
}

/// One consumer of the connectivity stream.
///
/// Dropping it detaches the subscriber; when the last one detaches the
/// upstream is released after the configured grace period.
#[derive(Debug)]
pub struct ConnectivitySubscription {
    replay: Option<bool>,
    rx: broadcast::Receiver<bool>,
    _detach: DetachGuard,
}

impl ConnectivitySubscription {
    /// Next connectivity state.
    ///
    /// The first call returns the cached last-known value immediately; later
    /// calls wait for live updates. Returns `None` once the watcher has been
    /// dropped and the stream is closed.
    pub async fn recv(&mut self) -> Option<bool> {
        if let Some(first) = self.replay.take() {
            return Some(first);
        }
        loop {
            match self.rx.recv().await {
                Ok(state) => return Some(state),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "connectivity subscriber lagging, resuming at newest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_pair() -> (StateSink, broadcast::Receiver<bool>) {
        let (tx, rx) = broadcast::channel(16);
        let sink = StateSink {
            latest: Arc::new(AtomicBool::new(false)),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (sink, rx)
    }

    #[tokio::test]
    async fn emit_updates_cache_and_fans_out() {
        let (sink, mut rx) = sink_pair();
        sink.emit(true);
        assert!(sink.latest.load(Ordering::Acquire));
        assert_eq!(rx.recv().await.unwrap(), true);
    }

    #[tokio::test]
    async fn closed_sink_discards_emissions() {
        let (sink, mut rx) = sink_pair();
        sink.emit(true);
        assert_eq!(rx.recv().await.unwrap(), true);

        sink.open.store(false, Ordering::Release);
        sink.emit(false);
        // Cache keeps the pre-teardown value and nothing reaches the stream.
        assert!(sink.latest.load(Ordering::Acquire));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_without_subscribers_still_advances_cache() {
        let (sink, rx) = sink_pair();
        drop(rx);
        sink.emit(true);
        assert!(sink.latest.load(Ordering::Acquire));
    }
}
