//! "Settings changed" broadcast to running processes
//!
//! On Windows the environment broadcast is `WM_SETTINGCHANGE` sent to
//! `HWND_BROADCAST` with a topic string. `SendMessageTimeoutW` reports
//! whether the broadcast went through, so delivery is retried a bounded
//! number of times with linear backoff. Nothing here is ever an error to
//! the caller: a failed broadcast only means already-running processes
//! keep their old view until restart.

use crate::core::config::model::BroadcastCfg;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Result of a broadcast attempt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32 },
    /// Platform has no broadcast mechanism
    Unsupported,
}

impl BroadcastOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, BroadcastOutcome::Delivered { .. })
    }
}

/// Delivery of settings-changed notifications
pub trait SettingsNotifier: Send + Sync {
    /// Tell every top-level window that settings under `topic` changed
    fn broadcast_setting_change(&self, topic: &str) -> BroadcastOutcome;

    /// Ask WinINet to reload proxy settings; no-op where unsupported
    fn refresh_internet_settings(&self) {}
}

/// Retry budget for a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    /// Total attempts, at least one
    pub attempts: u32,
    /// Per-attempt timeout handed to the platform call
    pub timeout: Duration,
    /// Sleep before attempt `n` (1-based) is `backoff * (n - 1)`
    pub backoff: Duration,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self::from(&BroadcastCfg::default())
    }
}

impl From<&BroadcastCfg> for BroadcastPolicy {
    fn from(cfg: &BroadcastCfg) -> Self {
        Self {
            attempts: cfg.attempts.max(1),
            timeout: Duration::from_millis(u64::from(cfg.timeout_ms)),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

impl BroadcastPolicy {
    /// Run `send` until it reports success or the attempt budget runs out
    pub fn run(&self, mut send: impl FnMut() -> bool) -> BroadcastOutcome {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 && !self.backoff.is_zero() {
                std::thread::sleep(self.backoff * (attempt - 1));
            }
            if send() {
                return BroadcastOutcome::Delivered { attempts: attempt };
            }
            tracing::debug!(
                target = "sysproxy",
                attempt,
                attempts,
                "settings broadcast not acknowledged"
            );
        }
        BroadcastOutcome::Failed { attempts }
    }
}

/// Notifier for platforms without a broadcast bus
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl SettingsNotifier for NoopNotifier {
    fn broadcast_setting_change(&self, _topic: &str) -> BroadcastOutcome {
        BroadcastOutcome::Unsupported
    }
}

/// Notifier that records every call (tests and dry runs)
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    topics: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent broadcasts report failure
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl SettingsNotifier for RecordingNotifier {
    fn broadcast_setting_change(&self, topic: &str) -> BroadcastOutcome {
        if let Ok(mut topics) = self.topics.lock() {
            topics.push(topic.to_string());
        }
        if self.failing.load(Ordering::SeqCst) {
            BroadcastOutcome::Failed { attempts: 1 }
        } else {
            BroadcastOutcome::Delivered { attempts: 1 }
        }
    }

    fn refresh_internet_settings(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(target_os = "windows")]
pub use windows_notifier::WindowsNotifier;

#[cfg(target_os = "windows")]
mod windows_notifier {
    use super::{BroadcastOutcome, BroadcastPolicy, SettingsNotifier};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;
    use winapi::shared::basetsd::DWORD_PTR;
    use winapi::shared::minwindef::{LPARAM, UINT};
    use winapi::um::wininet::{
        InternetSetOptionW, INTERNET_OPTION_REFRESH, INTERNET_OPTION_SETTINGS_CHANGED,
    };
    use winapi::um::winuser::{
        SendMessageTimeoutW, HWND_BROADCAST, SMTO_ABORTIFHUNG, WM_SETTINGCHANGE,
    };

    /// `WM_SETTINGCHANGE` broadcaster backed by user32/wininet
    #[derive(Debug, Clone, Default)]
    pub struct WindowsNotifier {
        policy: BroadcastPolicy,
    }

    impl WindowsNotifier {
        pub fn new(policy: BroadcastPolicy) -> Self {
            Self { policy }
        }

        /// Converts a string to Windows wide string (UTF-16).
        fn to_wide_string(s: &str) -> Vec<u16> {
            OsStr::new(s).encode_wide().chain(Some(0)).collect()
        }
    }

    impl SettingsNotifier for WindowsNotifier {
        fn broadcast_setting_change(&self, topic: &str) -> BroadcastOutcome {
            let wide = Self::to_wide_string(topic);
            let timeout_ms = UINT::try_from(self.policy.timeout.as_millis()).unwrap_or(UINT::MAX);
            self.policy.run(|| {
                let mut result: DWORD_PTR = 0;
                let rc = unsafe {
                    SendMessageTimeoutW(
                        HWND_BROADCAST,
                        WM_SETTINGCHANGE,
                        0,
                        wide.as_ptr() as LPARAM,
                        SMTO_ABORTIFHUNG,
                        timeout_ms,
                        &mut result,
                    )
                };
                rc != 0
            })
        }

        fn refresh_internet_settings(&self) {
            let ok = unsafe {
                InternetSetOptionW(
                    ptr::null_mut(),
                    INTERNET_OPTION_SETTINGS_CHANGED,
                    ptr::null_mut(),
                    0,
                ) != 0
                    && InternetSetOptionW(ptr::null_mut(), INTERNET_OPTION_REFRESH, ptr::null_mut(), 0)
                        != 0
            };
            if !ok {
                tracing::warn!(target = "sysproxy", "WinINet settings refresh failed");
            }
        }
    }
}
