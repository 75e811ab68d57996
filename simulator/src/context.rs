use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    event_queue::EventQueue,
    events::{EventData, EventId},
    model::Ticks,
};

/// Handle through which a component reads the clock and emits events.
#[derive(Clone)]
pub struct SimulationContext {
    name: String,
    clock: Rc<Cell<Ticks>>,
    queue: Rc<RefCell<EventQueue>>,
}

impl SimulationContext {
    pub(crate) fn new(name: &str, clock: Rc<Cell<Ticks>>, queue: Rc<RefCell<EventQueue>>) -> Self {
        Self {
            name: name.to_string(),
            clock,
            queue,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> Ticks {
        self.clock.get()
    }

    pub fn emit_now(&self, data: EventData) -> EventId {
        self.emit_at(data, self.time())
    }

    pub fn emit(&self, data: EventData, delay: Ticks) -> EventId {
        self.emit_at(data, self.time() + delay)
    }

    pub fn emit_at(&self, data: EventData, time: Ticks) -> EventId {
        self.queue.borrow_mut().submit(time, data)
    }
}

/// Coalesces an event kind so that at most one instance is pending at a time.
/// The owner calls [`DebouncedEvent::on_processed`] when the event is handled.
#[derive(Debug, Clone)]
pub struct DebouncedEvent {
    data: EventData,
    pending: bool,
}

impl DebouncedEvent {
    pub fn new(data: EventData) -> Self {
        Self {
            data,
            pending: false,
        }
    }

    /// Emits the event for the current time unless one is already pending.
    pub fn emit(&mut self, ctx: &SimulationContext) -> bool {
        if self.pending {
            return false;
        }
        ctx.emit_now(self.data.clone());
        self.pending = true;
        true
    }

    pub fn on_processed(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
