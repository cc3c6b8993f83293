// SPDX-License-Identifier: MIT
//! Connectivity observer — the event loop behind the watcher.
//!
//! Holds the single listener registration with the network signal source and
//! maps each [`NetworkEvent`] to a boolean connectivity state:
//!
//! - `Available` → `true`, `Lost`/`Unavailable` → `false`, answered directly
//!   on the event task.
//! - `CapabilitiesChanged` → `validated && probe_ok`; the blocking probe is
//!   dispatched to tokio's blocking pool and the state is emitted once it
//!   resolves, so the event task is never blocked behind network I/O.
//!
//! Emissions for one event are ordered; overlapping probes from rapid
//! successive capability changes may complete out of order, and a probe that
//! resolves after shutdown is discarded by the sink.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::probe::ReachabilityProbe;
use crate::signal::{NetworkEvent, NetworkSignalSource, RegistrationError, RegistrationId};
use crate::watcher::StateSink;

/// Immediate state for events that do not consult the probe.
///
/// `CapabilitiesChanged` returns `None`: it is resolved asynchronously
/// against the reachability probe.
pub(crate) fn immediate_state(event: NetworkEvent) -> Option<bool> {
    match event {
        NetworkEvent::Available => Some(true),
        NetworkEvent::Lost | NetworkEvent::Unavailable => Some(false),
        NetworkEvent::CapabilitiesChanged(_) => None,
    }
}

/// Handle to a running observer task.
///
/// `shutdown` stops the event loop and waits for the listener registration
/// to be released. The registration is released exactly once, by the loop.
pub(crate) struct ObserverHandle {
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ObserverHandle {
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// Register with the signal source and spawn the event loop.
///
/// Registration happens inline so the caller observes the collaborator's
/// failure directly.
pub(crate) async fn start(
    source: Arc<dyn NetworkSignalSource>,
    probe: Arc<dyn ReachabilityProbe>,
    sink: StateSink,
    event_buffer: usize,
) -> Result<ObserverHandle, RegistrationError> {
    let (event_tx, event_rx) = mpsc::channel(event_buffer);
    let id = source.register(event_tx).await?;
    info!(registration = id.0, "network listener registered");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(source, id, probe, sink, event_rx, shutdown_rx));
    Ok(ObserverHandle {
        shutdown: shutdown_tx,
        task,
    })
}

async fn run(
    source: Arc<dyn NetworkSignalSource>,
    id: RegistrationId,
    probe: Arc<dyn ReachabilityProbe>,
    sink: StateSink,
    mut events: mpsc::Receiver<NetworkEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => {
                // None: the source dropped its sender — treat as shutdown.
                let Some(event) = event else { break };
                handle_event(event, &probe, &sink);
            }
        }
    }
    source.unregister(id).await;
    info!(registration = id.0, "network listener unregistered");
}

fn handle_event(event: NetworkEvent, probe: &Arc<dyn ReachabilityProbe>, sink: &StateSink) {
    if let Some(state) = immediate_state(event) {
        debug!(?event, state, "network event");
        sink.emit(state);
        return;
    }
    let NetworkEvent::CapabilitiesChanged(caps) = event else {
        return;
    };
    if !caps.validated {
        // The OS itself has not validated the network; nothing to probe.
        debug!("capabilities changed, network not validated");
        sink.emit(false);
        return;
    }
    let probe = Arc::clone(probe);
    let sink = sink.clone();
    tokio::task::spawn_blocking(move || {
        let ok = probe.check();
        debug!(ok, "probe resolved for validated capabilities");
        sink.emit(ok);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::NetworkCapabilities;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct CountingProbe {
        result: bool,
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn returning(result: bool) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ReachabilityProbe for CountingProbe {
        fn check(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn test_sink() -> (StateSink, broadcast::Receiver<bool>) {
        let (tx, rx) = broadcast::channel(16);
        let sink = StateSink {
            latest: Arc::new(AtomicBool::new(false)),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (sink, rx)
    }

    #[tokio::test]
    async fn lost_emits_false_without_probing() {
        let probe = CountingProbe::returning(true);
        let (sink, mut rx) = test_sink();
        handle_event(
            NetworkEvent::Lost,
            &(probe.clone() as Arc<dyn ReachabilityProbe>),
            &sink,
        );
        assert_eq!(rx.recv().await.unwrap(), false);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_emits_false_without_probing() {
        let probe = CountingProbe::returning(true);
        let (sink, mut rx) = test_sink();
        handle_event(
            NetworkEvent::Unavailable,
            &(probe.clone() as Arc<dyn ReachabilityProbe>),
            &sink,
        );
        assert_eq!(rx.recv().await.unwrap(), false);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn available_emits_true_without_probing() {
        let probe = CountingProbe::returning(false);
        let (sink, mut rx) = test_sink();
        handle_event(
            NetworkEvent::Available,
            &(probe.clone() as Arc<dyn ReachabilityProbe>),
            &sink,
        );
        assert_eq!(rx.recv().await.unwrap(), true);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unvalidated_capabilities_skip_probe() {
        let probe = CountingProbe::returning(true);
        let (sink, mut rx) = test_sink();
        handle_event(
            NetworkEvent::CapabilitiesChanged(NetworkCapabilities { validated: false }),
            &(probe.clone() as Arc<dyn ReachabilityProbe>),
            &sink,
        );
        assert_eq!(rx.recv().await.unwrap(), false);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validated_capabilities_emit_probe_result() {
        for expected in [true, false] {
            let probe = CountingProbe::returning(expected);
            let (sink, mut rx) = test_sink();
            handle_event(
                NetworkEvent::CapabilitiesChanged(NetworkCapabilities { validated: true }),
                &(probe.clone() as Arc<dyn ReachabilityProbe>),
                &sink,
            );
            assert_eq!(rx.recv().await.unwrap(), expected);
            assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        }
    }

    fn any_event() -> impl Strategy<Value = NetworkEvent> {
        prop_oneof![
            Just(NetworkEvent::Available),
            Just(NetworkEvent::Lost),
            Just(NetworkEvent::Unavailable),
            any::<bool>().prop_map(|validated| {
                NetworkEvent::CapabilitiesChanged(NetworkCapabilities { validated })
            }),
        ]
    }

    proptest! {
        #[test]
        fn immediate_mapping_is_total(events in proptest::collection::vec(any_event(), 0..32)) {
            for event in events {
                match event {
                    NetworkEvent::Available => {
                        prop_assert_eq!(immediate_state(event), Some(true));
                    }
                    NetworkEvent::Lost | NetworkEvent::Unavailable => {
                        prop_assert_eq!(immediate_state(event), Some(false));
                    }
                    NetworkEvent::CapabilitiesChanged(_) => {
                        prop_assert_eq!(immediate_state(event), None);
                    }
                }
            }
        }
    }
}
