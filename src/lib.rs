// SPDX-License-Identifier: MIT
//! Internet connectivity watcher.
//!
//! Combines the OS network-callback signal with an active HTTP reachability
//! probe and exposes the result as a shared, replayable stream of booleans:
//! `true` means usable end-to-end connectivity, `false` means anything less.
//! No intermediate state is modeled — a late subscriber simply gets the last
//! known value.
//!
//! The OS facility is abstracted behind [`NetworkSignalSource`]; platform
//! bindings implement it in the embedding application. The watcher holds one
//! listener registration shared by all subscribers and releases it only
//! after the last subscriber has been gone for a grace period.
//!
//! # Usage
//! ```rust,ignore
//! use connwatch::{ConnectivityWatcher, WatcherConfig};
//!
//! let watcher = ConnectivityWatcher::new(platform_signal_source, WatcherConfig::default());
//! let mut sub = watcher.subscribe().await?;
//! while let Some(online) = sub.recv().await {
//!     tray.set_online(online);
//! }
//! ```

pub mod config;
pub mod probe;
pub mod signal;
pub mod watcher;

mod observer;

// Convenience re-exports.
pub use config::WatcherConfig;
pub use probe::{HttpProbe, ReachabilityProbe};
pub use signal::{
    NetworkCapabilities, NetworkEvent, NetworkSignalSource, RegistrationError, RegistrationId,
};
pub use watcher::{ConnectivitySubscription, ConnectivityWatcher};
