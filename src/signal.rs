//! Network signal source seam.
//!
//! The OS facility that reports coarse lifecycle events for the device's
//! current default network, reduced to the contract the watcher needs:
//! register one listener, receive [`NetworkEvent`]s asynchronously, unregister
//! to stop delivery. Platform bindings live in the embedding application;
//! tests use a channel-backed mock.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Capability snapshot attached to a capabilities-changed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkCapabilities {
    /// `true` when the OS has confirmed coarse outbound reachability on this
    /// network. An input to the active probe, not a substitute for it.
    pub validated: bool,
}

/// Coarse lifecycle event for the default network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkEvent {
    /// A network became available. Optimistic — capability details follow.
    Available,
    /// The capabilities of the current network changed.
    CapabilitiesChanged(NetworkCapabilities),
    /// The current network was lost.
    Lost,
    /// No network is available and none is coming up.
    Unavailable,
}

/// Opaque token minted by [`NetworkSignalSource::register`] and passed back
/// on unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

/// The signal source rejected a listener registration.
///
/// Carries the collaborator's message verbatim; the watcher does not retry
/// and surfaces this to the subscriber that triggered the registration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("network listener registration failed: {0}")]
pub struct RegistrationError(pub String);

/// OS network-callback facility.
///
/// `register` starts delivery of [`NetworkEvent`]s into `listener` for the
/// default network only (not per-interface) and returns a handle;
/// `unregister` stops delivery. The watcher holds at most one registration
/// at a time and calls `unregister` exactly once per successful `register`.
#[async_trait]
pub trait NetworkSignalSource: Send + Sync + 'static {
    async fn register(
        &self,
        listener: mpsc::Sender<NetworkEvent>,
    ) -> Result<RegistrationId, RegistrationError>;

    async fn unregister(&self, id: RegistrationId);
}
