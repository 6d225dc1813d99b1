use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::core::sysproxy::state::Mechanism;

/// Toggle lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToggleEvent {
    /// Local proxy applied to the store
    #[serde(rename_all = "camelCase")]
    Enabled {
        mechanism: Mechanism,
        port: u16,
        failed_mutations: usize,
    },
    /// Captured settings written back
    #[serde(rename_all = "camelCase")]
    Restored {
        mechanism: Mechanism,
        failed_mutations: usize,
    },
    /// Restore could not open the settings key
    #[serde(rename_all = "camelCase")]
    RestoreFailed { mechanism: Mechanism, message: String },
    /// Request refused by the state machine or by an unavailable store
    #[serde(rename_all = "camelCase")]
    Rejected {
        mechanism: Mechanism,
        category: String,
        message: String,
    },
    /// Settings-changed broadcast was not acknowledged
    #[serde(rename_all = "camelCase")]
    BroadcastFailed { topic: String, attempts: u32 },
}

/// Top-level event envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Toggle(ToggleEvent),
}

pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, evt: Event);
}

/// In-memory event bus (tests and diagnostics)
#[derive(Clone, Default)]
pub struct MemoryEventBus {
    inner: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_all(&self) -> Vec<Event> {
        if let Ok(mut g) = self.inner.lock() {
            std::mem::take(&mut *g)
        } else {
            Vec::new()
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        if let Ok(g) = self.inner.lock() {
            g.clone()
        } else {
            Vec::new()
        }
    }
}

impl EventBus for MemoryEventBus {
    fn publish(&self, evt: Event) {
        if let Ok(mut g) = self.inner.lock() {
            g.push(evt);
        }
    }
}

/// Forwards every event to `tracing` as one JSON record under the `event` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventBus;

impl EventBus for TracingEventBus {
    fn publish(&self, evt: Event) {
        match serde_json::to_string(&evt) {
            Ok(json) => tracing::info!(target = "event", "{}", json),
            Err(e) => tracing::warn!(target = "event", ?evt, "event not serializable: {}", e),
        }
    }
}

static GLOBAL_BUS: OnceCell<Arc<dyn EventBus>> = OnceCell::new();

pub fn set_global_event_bus(bus: Arc<dyn EventBus>) -> Result<(), &'static str> {
    GLOBAL_BUS.set(bus).map_err(|_| "global event bus already set")
}

pub fn publish_global(evt: Event) {
    if let Some(bus) = TEST_OVERRIDE_BUS.with(|cell| cell.borrow().clone()) {
        bus.publish(evt.clone());
    }
    if let Some(bus) = GLOBAL_BUS.get() {
        bus.publish(evt);
    }
}

// thread-local override so parallel tests do not see each other's events
thread_local! {
    static TEST_OVERRIDE_BUS: std::cell::RefCell<Option<Arc<dyn EventBus>>> = const { std::cell::RefCell::new(None) };
}

pub fn set_test_event_bus(bus: Arc<dyn EventBus>) {
    TEST_OVERRIDE_BUS.with(|cell| *cell.borrow_mut() = Some(bus));
}

pub fn clear_test_event_bus() {
    TEST_OVERRIDE_BUS.with(|cell| *cell.borrow_mut() = None);
}
