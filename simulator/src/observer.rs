use crate::{
    error::SimulationError,
    events::{Event, EventType},
};

/// Component reacting to simulation events.
///
/// The simulation routes an event only to observers listing its type in
/// [`SimulationObserver::supported_event_types`], in registration order.
pub trait SimulationObserver {
    fn name(&self) -> &str;

    fn supported_event_types(&self) -> &[EventType];

    fn on(&mut self, event: &Event) -> Result<(), SimulationError>;
}

pub(crate) fn unsupported_event(observer: &str, event: &Event) -> SimulationError {
    SimulationError::UnsupportedEvent {
        event_type: format!("{:?}", event.event_type()),
        observer: observer.to_string(),
    }
}
