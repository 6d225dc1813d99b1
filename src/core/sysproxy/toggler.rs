//! Save, apply and restore of proxy settings
//!
//! Each enable operation opens its settings key, captures the current
//! values into a caller-owned [`Snapshot`], then writes the local proxy
//! endpoint. The matching disable operation writes the captured values
//! back, deleting values that did not exist before.
//!
//! Capture reads never fail the operation: an unreadable value just records
//! its default. Opening the key is the only hard failure on enable. Every
//! mutation is attempted even if an earlier one failed; failures are
//! collected into a single [`SysProxyError::MutationsFailed`].
//!
//! Nothing here takes a lock across the read-then-write pair. The store is
//! shared with every other process on the machine.

use super::errors::{MutationFailure, MutationOp, StoreResult, SysProxyError, SysProxyResult};
use super::notify::{BroadcastOutcome, SettingsNotifier};
use super::snapshot::{PriorValue, Snapshot};
use super::state::{Mechanism, StateTransition, ToggleContext};
use super::store::{SettingsKey, SettingsStore};
use crate::events::structured::{publish_global, Event, ToggleEvent};
use std::sync::Arc;

pub const INTERNET_SETTINGS_KEY: &str =
    "Software\\Microsoft\\Windows\\CurrentVersion\\Internet Settings";
pub const ENVIRONMENT_KEY: &str = "Environment";

pub const PROXY_ENABLE: &str = "ProxyEnable";
pub const PROXY_SERVER: &str = "ProxyServer";
pub const PROXY_OVERRIDE: &str = "ProxyOverride";
pub const HTTP_PROXY: &str = "HTTP_PROXY";

/// Bypass list written while active: skip the proxy for intranet names
pub const LOCAL_BYPASS: &str = "<local>";

/// `WM_SETTINGCHANGE` topic for environment changes
pub const ENVIRONMENT_TOPIC: &str = "ENVIRONMENT";

/// `ProxyServer` value for a local SOCKS endpoint
pub fn system_proxy_server(port: u16) -> String {
    format!("socks=127.0.0.1:{port}")
}

/// `HTTP_PROXY` value for a local SOCKS endpoint
pub fn env_proxy_url(port: u16) -> String {
    format!("socks://127.0.0.1:{port}")
}

/// Toggles system and environment proxy settings in a [`SettingsStore`]
pub struct SettingsToggler {
    store: Arc<dyn SettingsStore>,
    notifier: Arc<dyn SettingsNotifier>,
    system: ToggleContext,
    env: ToggleContext,
    refresh_internet_settings: bool,
}

impl SettingsToggler {
    pub fn new(store: Arc<dyn SettingsStore>, notifier: Arc<dyn SettingsNotifier>) -> Self {
        Self {
            store,
            notifier,
            system: ToggleContext::new(Mechanism::SystemProxy),
            env: ToggleContext::new(Mechanism::EnvProxy),
            refresh_internet_settings: true,
        }
    }

    /// Whether to ask WinINet to reload after system proxy changes
    pub fn with_internet_settings_refresh(mut self, enabled: bool) -> Self {
        self.refresh_internet_settings = enabled;
        self
    }

    pub fn context(&self, mechanism: Mechanism) -> &ToggleContext {
        match mechanism {
            Mechanism::SystemProxy => &self.system,
            Mechanism::EnvProxy => &self.env,
        }
    }

    pub fn is_active(&self, mechanism: Mechanism) -> bool {
        self.context(mechanism).is_active()
    }

    /// Capture the system proxy settings into `snapshot` and point them at
    /// `socks=127.0.0.1:<port>`
    pub fn enable_system_proxy(&mut self, port: u16, snapshot: &mut Snapshot) -> SysProxyResult<()> {
        let mechanism = Mechanism::SystemProxy;
        self.check(mechanism, StateTransition::Enable)?;
        let key = self.open(mechanism, INTERNET_SETTINGS_KEY)?;

        snapshot.proxy_enabled = read_flag(key.as_ref(), PROXY_ENABLE);
        snapshot.proxy_server_prior = read_prior(key.as_ref(), PROXY_SERVER);
        snapshot.proxy_override_prior = read_prior(key.as_ref(), PROXY_OVERRIDE);
        tracing::debug!(
            target = "sysproxy",
            enabled = snapshot.proxy_enabled,
            server = %snapshot.proxy_server_prior,
            bypass = %snapshot.proxy_override_prior,
            "captured system proxy settings"
        );

        let mut failures = Vec::new();
        let path = key.path().to_string();
        record(&mut failures, &path, PROXY_ENABLE, MutationOp::Set, key.set_u32(PROXY_ENABLE, 1));
        record(
            &mut failures,
            &path,
            PROXY_SERVER,
            MutationOp::Set,
            key.set_string(PROXY_SERVER, &system_proxy_server(port)),
        );
        record(
            &mut failures,
            &path,
            PROXY_OVERRIDE,
            MutationOp::Set,
            key.set_string(PROXY_OVERRIDE, LOCAL_BYPASS),
        );
        drop(key);

        // live values may have changed even if some writes failed
        self.system.transition(StateTransition::Enable, Some(port));
        if self.refresh_internet_settings {
            self.notifier.refresh_internet_settings();
        }
        self.finish_enable(mechanism, port, failures)
    }

    /// Write the captured system proxy settings back
    pub fn disable_system_proxy(&mut self, snapshot: &Snapshot) -> SysProxyResult<()> {
        let mechanism = Mechanism::SystemProxy;
        self.check(mechanism, StateTransition::Disable)?;
        let key = self.open_for_restore(mechanism, INTERNET_SETTINGS_KEY)?;

        let mut failures = Vec::new();
        let path = key.path().to_string();
        record(
            &mut failures,
            &path,
            PROXY_ENABLE,
            MutationOp::Set,
            key.set_u32(PROXY_ENABLE, snapshot.proxy_enabled),
        );
        restore_prior(&mut failures, key.as_ref(), PROXY_SERVER, &snapshot.proxy_server_prior);
        restore_prior(&mut failures, key.as_ref(), PROXY_OVERRIDE, &snapshot.proxy_override_prior);
        drop(key);

        self.system.transition(StateTransition::Disable, None);
        if self.refresh_internet_settings {
            self.notifier.refresh_internet_settings();
        }
        self.finish_restore(mechanism, failures)
    }

    /// Capture `HTTP_PROXY` into `snapshot`, point it at
    /// `socks://127.0.0.1:<port>` and broadcast the change
    pub fn enable_env_proxy(&mut self, port: u16, snapshot: &mut Snapshot) -> SysProxyResult<()> {
        let mechanism = Mechanism::EnvProxy;
        self.check(mechanism, StateTransition::Enable)?;
        let key = self.open(mechanism, ENVIRONMENT_KEY)?;

        snapshot.http_proxy_env_prior = read_prior(key.as_ref(), HTTP_PROXY);
        tracing::debug!(
            target = "sysproxy",
            http_proxy = %snapshot.http_proxy_env_prior,
            "captured environment proxy settings"
        );

        let mut failures = Vec::new();
        let path = key.path().to_string();
        record(
            &mut failures,
            &path,
            HTTP_PROXY,
            MutationOp::Set,
            key.set_string(HTTP_PROXY, &env_proxy_url(port)),
        );
        drop(key);

        self.env.transition(StateTransition::Enable, Some(port));
        self.broadcast_environment();
        self.finish_enable(mechanism, port, failures)
    }

    /// Write the captured `HTTP_PROXY` back (or delete it) and broadcast
    pub fn disable_env_proxy(&mut self, snapshot: &Snapshot) -> SysProxyResult<()> {
        let mechanism = Mechanism::EnvProxy;
        self.check(mechanism, StateTransition::Disable)?;
        let key = self.open_for_restore(mechanism, ENVIRONMENT_KEY)?;

        let mut failures = Vec::new();
        restore_prior(&mut failures, key.as_ref(), HTTP_PROXY, &snapshot.http_proxy_env_prior);
        drop(key);

        self.env.transition(StateTransition::Disable, None);
        self.broadcast_environment();
        self.finish_restore(mechanism, failures)
    }

    fn check(&self, mechanism: Mechanism, transition: StateTransition) -> SysProxyResult<()> {
        if self.context(mechanism).state.can_apply(transition) {
            return Ok(());
        }
        let err = match transition {
            StateTransition::Enable => SysProxyError::AlreadyActive(mechanism),
            StateTransition::Disable => SysProxyError::NotActive(mechanism),
        };
        tracing::warn!(target = "sysproxy", category = err.category(), "{}", err);
        publish_rejected(&err);
        Err(err)
    }

    fn open(&self, mechanism: Mechanism, path: &str) -> SysProxyResult<Box<dyn SettingsKey + '_>> {
        self.store.open_key(path).map_err(|source| {
            let err = SysProxyError::StoreUnavailable {
                mechanism,
                path: path.to_string(),
                source,
            };
            tracing::error!(target = "sysproxy", category = err.category(), "{}", err);
            publish_rejected(&err);
            err
        })
    }

    /// Open for restore; the mechanism stays active on failure so the
    /// caller can try again
    fn open_for_restore(
        &self,
        mechanism: Mechanism,
        path: &str,
    ) -> SysProxyResult<Box<dyn SettingsKey + '_>> {
        self.store.open_key(path).map_err(|source| {
            let err = SysProxyError::StoreUnavailable {
                mechanism,
                path: path.to_string(),
                source,
            };
            tracing::error!(
                target = "sysproxy",
                category = err.category(),
                "restore skipped, settings left pointing at local proxy: {}",
                err
            );
            publish_global(Event::Toggle(ToggleEvent::RestoreFailed {
                mechanism,
                message: err.to_string(),
            }));
            err
        })
    }

    fn broadcast_environment(&self) {
        match self.notifier.broadcast_setting_change(ENVIRONMENT_TOPIC) {
            BroadcastOutcome::Delivered { attempts } => {
                tracing::debug!(target = "sysproxy", attempts, "environment change broadcast");
            }
            BroadcastOutcome::Failed { attempts } => {
                tracing::warn!(
                    target = "sysproxy",
                    attempts,
                    "environment change broadcast not acknowledged; running processes may keep stale HTTP_PROXY"
                );
                publish_global(Event::Toggle(ToggleEvent::BroadcastFailed {
                    topic: ENVIRONMENT_TOPIC.to_string(),
                    attempts,
                }));
            }
            BroadcastOutcome::Unsupported => {
                tracing::debug!(target = "sysproxy", "no settings broadcast on this platform");
            }
        }
    }

    fn finish_enable(
        &self,
        mechanism: Mechanism,
        port: u16,
        failures: Vec<MutationFailure>,
    ) -> SysProxyResult<()> {
        publish_global(Event::Toggle(ToggleEvent::Enabled {
            mechanism,
            port,
            failed_mutations: failures.len(),
        }));
        if failures.is_empty() {
            tracing::info!(target = "sysproxy", %mechanism, port, "local proxy applied");
            return Ok(());
        }
        let err = SysProxyError::MutationsFailed { mechanism, failures };
        tracing::error!(target = "sysproxy", category = err.category(), "{}", err);
        Err(err)
    }

    fn finish_restore(&self, mechanism: Mechanism, failures: Vec<MutationFailure>) -> SysProxyResult<()> {
        publish_global(Event::Toggle(ToggleEvent::Restored {
            mechanism,
            failed_mutations: failures.len(),
        }));
        if failures.is_empty() {
            tracing::info!(target = "sysproxy", %mechanism, "previous settings restored");
            return Ok(());
        }
        let err = SysProxyError::MutationsFailed { mechanism, failures };
        tracing::error!(target = "sysproxy", category = err.category(), "{}", err);
        Err(err)
    }
}

fn publish_rejected(err: &SysProxyError) {
    publish_global(Event::Toggle(ToggleEvent::Rejected {
        mechanism: err.mechanism(),
        category: err.category().to_string(),
        message: err.to_string(),
    }));
}

fn read_flag(key: &dyn SettingsKey, name: &str) -> u32 {
    key.get_u32(name).unwrap_or_else(|e| {
        tracing::debug!(target = "sysproxy", value = name, "flag unreadable, assuming 0: {}", e);
        0
    })
}

fn read_prior(key: &dyn SettingsKey, name: &str) -> PriorValue {
    let read = key.get_string(name);
    if let Err(e) = &read {
        tracing::debug!(target = "sysproxy", value = name, "recording as absent: {}", e);
    }
    PriorValue::from_read(read)
}

fn restore_prior(
    failures: &mut Vec<MutationFailure>,
    key: &dyn SettingsKey,
    name: &str,
    prior: &PriorValue,
) {
    match prior {
        PriorValue::Present(value) => {
            record(failures, key.path(), name, MutationOp::Set, key.set_string(name, value))
        }
        PriorValue::Absent => {
            // already gone is as good as deleted
            let result = match key.delete_value(name) {
                Err(e) if e.is_not_found() => Ok(()),
                other => other,
            };
            record(failures, key.path(), name, MutationOp::Delete, result)
        }
    }
}

fn record(
    failures: &mut Vec<MutationFailure>,
    key_path: &str,
    value_name: &str,
    op: MutationOp,
    result: StoreResult<()>,
) {
    if let Err(error) = result {
        tracing::warn!(target = "sysproxy", value = value_name, %op, "settings mutation failed: {}", error);
        failures.push(MutationFailure {
            key_path: key_path.to_string(),
            value_name: value_name.to_string(),
            op,
            error,
        });
    }
}
