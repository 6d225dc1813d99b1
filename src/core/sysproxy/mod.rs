//! System and environment proxy toggling
//!
//! This module provides:
//! - A settings store abstraction with a registry backend and an in-memory fake
//! - Capture, apply and restore of the WinINet proxy and `HTTP_PROXY` defaults
//! - A per-mechanism state machine that rejects repeated enables
//! - Best-effort settings-changed broadcast with bounded retry
//! - A session that applies the configured mechanisms as one unit

pub mod errors;
pub mod notify;
#[cfg(target_os = "windows")]
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod toggler;

pub use errors::{MutationFailure, MutationOp, StoreError, SysProxyError, SysProxyResult};
pub use notify::{BroadcastOutcome, BroadcastPolicy, NoopNotifier, RecordingNotifier, SettingsNotifier};
#[cfg(target_os = "windows")]
pub use notify::WindowsNotifier;
#[cfg(target_os = "windows")]
pub use registry::RegistrySettingsStore;
pub use session::ProxySession;
pub use snapshot::{PriorValue, Snapshot, ABSENCE_SENTINEL};
pub use state::{Mechanism, StateTransition, ToggleContext, ToggleState};
pub use store::{MemorySettingsStore, SettingsKey, SettingsStore, StoredValue};
pub use toggler::SettingsToggler;
