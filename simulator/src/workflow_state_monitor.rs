use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

use crate::{
    context::SimulationContext,
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_debug,
    model::{TaskId, Trace, WorkflowId},
    observer::{unsupported_event, SimulationObserver},
    state::SimulationState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowCounters {
    pub total: usize,
    pub pending_submission: usize,
    pub in_progress: usize,
    pub completed: usize,
}

/// Tracks workflow lifecycles from the completion of their tasks.
pub struct WorkflowStateMonitor {
    counters: WorkflowCounters,
    trace: Rc<RefCell<Trace>>,
    state: Rc<RefCell<SimulationState>>,
    ctx: SimulationContext,
}

impl WorkflowStateMonitor {
    pub fn new(trace: Rc<RefCell<Trace>>, state: Rc<RefCell<SimulationState>>, ctx: SimulationContext) -> Self {
        let total = trace.borrow().workflows().len();
        Self {
            counters: WorkflowCounters {
                total,
                pending_submission: total,
                ..Default::default()
            },
            trace,
            state,
            ctx,
        }
    }

    pub fn counters(&self) -> WorkflowCounters {
        self.counters
    }

    pub fn completed_workflow_count(&self) -> usize {
        self.counters.completed
    }

    fn on_workflow_submitted(&mut self, workflow: WorkflowId) -> Result<(), SimulationError> {
        self.state.borrow_mut().workflow_mut(workflow)?.submitted()?;
        self.counters.pending_submission -= 1;
        self.counters.in_progress += 1;
        Ok(())
    }

    fn on_task_completed(&mut self, task: TaskId) -> Result<(), SimulationError> {
        let workflow = self
            .trace
            .borrow()
            .task(task)
            .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })?
            .workflow();
        let Some(workflow) = workflow else {
            return Ok(());
        };
        if self.state.borrow_mut().workflow_mut(workflow)?.task_completed()? {
            self.ctx.emit_now(EventData::WorkflowCompleted { workflow });
        }
        Ok(())
    }

    fn on_workflow_completed(&mut self, workflow: WorkflowId) -> Result<(), SimulationError> {
        self.state.borrow_mut().workflow_mut(workflow)?.completed()?;
        log_debug!(self.ctx, "workflow {} completed", workflow);
        self.counters.in_progress -= 1;
        self.counters.completed += 1;
        Ok(())
    }
}

impl SimulationObserver for WorkflowStateMonitor {
    fn name(&self) -> &str {
        "WorkflowStateMonitor"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::WorkflowSubmitted,
            EventType::TaskCompleted,
            EventType::WorkflowCompleted,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::WorkflowSubmitted { workflow } => self.on_workflow_submitted(workflow),
            EventData::TaskCompleted { task, .. } => self.on_task_completed(task),
            EventData::WorkflowCompleted { workflow } => self.on_workflow_completed(workflow),
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}
