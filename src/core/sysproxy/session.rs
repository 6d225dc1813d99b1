//! Proxy session: drives the configured mechanisms as one unit
//!
//! `ProxySession` owns a [`SettingsToggler`] and the [`Snapshot`] shared by
//! both mechanisms, and applies them in a fixed order (system proxy, then
//! environment). If a later step fails, the earlier ones are rolled back so
//! an activation either fully applies or leaves the user's settings alone.

use super::errors::SysProxyResult;
use super::notify::{NoopNotifier, SettingsNotifier};
use super::snapshot::Snapshot;
use super::state::Mechanism;
use super::store::SettingsStore;
use super::toggler::SettingsToggler;
use crate::core::config::model::{AppConfig, TogglerCfg};
use std::sync::Arc;

pub struct ProxySession {
    toggler: SettingsToggler,
    snapshot: Snapshot,
    cfg: TogglerCfg,
}

impl ProxySession {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        notifier: Arc<dyn SettingsNotifier>,
        cfg: TogglerCfg,
    ) -> Self {
        let toggler = SettingsToggler::new(store, notifier)
            .with_internet_settings_refresh(cfg.refresh_internet_settings);
        Self {
            toggler,
            snapshot: Snapshot::new(),
            cfg,
        }
    }

    /// Session over the current user's registry hive
    #[cfg(target_os = "windows")]
    pub fn for_current_platform(cfg: &AppConfig) -> anyhow::Result<Self> {
        use super::notify::{BroadcastPolicy, WindowsNotifier};
        use super::registry::RegistrySettingsStore;

        let notifier = WindowsNotifier::new(BroadcastPolicy::from(&cfg.broadcast));
        Ok(Self::new(
            Arc::new(RegistrySettingsStore::current_user()),
            Arc::new(notifier),
            cfg.toggler.clone(),
        ))
    }

    #[cfg(not(target_os = "windows"))]
    pub fn for_current_platform(_cfg: &AppConfig) -> anyhow::Result<Self> {
        anyhow::bail!("system proxy toggling is only supported on Windows")
    }

    /// Session with no broadcast (dry runs against a non-registry store)
    pub fn without_broadcast(store: Arc<dyn SettingsStore>, cfg: TogglerCfg) -> Self {
        Self::new(store, Arc::new(NoopNotifier), cfg)
    }

    /// Mechanisms this session is configured to toggle, in apply order
    pub fn mechanisms(&self) -> Vec<Mechanism> {
        let mut out = Vec::with_capacity(2);
        if self.cfg.system_proxy {
            out.push(Mechanism::SystemProxy);
        }
        if self.cfg.env_proxy {
            out.push(Mechanism::EnvProxy);
        }
        out
    }

    /// True while any mechanism is applied
    pub fn is_active(&self) -> bool {
        self.toggler.is_active(Mechanism::SystemProxy) || self.toggler.is_active(Mechanism::EnvProxy)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn toggler(&self) -> &SettingsToggler {
        &self.toggler
    }

    /// Apply every configured mechanism for `port`
    ///
    /// On failure, mechanisms applied by this call (including one whose
    /// writes partially failed) are restored before the error is returned.
    /// A mechanism that was already active on entry is left as it is.
    pub fn activate(&mut self, port: u16) -> SysProxyResult<()> {
        let mechanisms = self.mechanisms();
        if mechanisms.is_empty() {
            tracing::warn!(target = "sysproxy", port, "no proxy mechanism configured, nothing applied");
            return Ok(());
        }
        let mut applied = Vec::new();
        for mechanism in mechanisms {
            let was_active = self.toggler.is_active(mechanism);
            let result = match mechanism {
                Mechanism::SystemProxy => self.toggler.enable_system_proxy(port, &mut self.snapshot),
                Mechanism::EnvProxy => self.toggler.enable_env_proxy(port, &mut self.snapshot),
            };
            if !was_active && self.toggler.is_active(mechanism) {
                applied.push(mechanism);
            }
            if let Err(e) = result {
                self.rollback(&applied);
                return Err(e);
            }
        }
        tracing::info!(target = "sysproxy", port, mechanisms = ?applied, "proxy session active");
        Ok(())
    }

    /// Restore every active mechanism; all are attempted, the first error is returned
    pub fn deactivate(&mut self) -> SysProxyResult<()> {
        let mut first_err = None;
        for mechanism in [Mechanism::EnvProxy, Mechanism::SystemProxy] {
            if !self.toggler.is_active(mechanism) {
                continue;
            }
            if let Err(e) = self.restore(mechanism) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::info!(target = "sysproxy", "proxy session closed");
                Ok(())
            }
        }
    }

    fn restore(&mut self, mechanism: Mechanism) -> SysProxyResult<()> {
        match mechanism {
            Mechanism::SystemProxy => self.toggler.disable_system_proxy(&self.snapshot),
            Mechanism::EnvProxy => self.toggler.disable_env_proxy(&self.snapshot),
        }
    }

    fn rollback(&mut self, applied: &[Mechanism]) {
        for mechanism in applied.iter().rev() {
            if let Err(e) = self.restore(*mechanism) {
                tracing::warn!(target = "sysproxy", %mechanism, "rollback failed: {}", e);
            }
        }
    }
}
