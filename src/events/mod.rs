pub mod structured;

pub use structured::{
    publish_global, set_global_event_bus, Event, EventBus, MemoryEventBus, ToggleEvent,
    TracingEventBus,
};
