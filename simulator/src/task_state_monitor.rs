use std::{cell::RefCell, fmt, rc::Rc};

use serde::Serialize;

use crate::{
    context::SimulationContext,
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_debug,
    model::{MachineId, TaskId, Ticks, Trace},
    observer::{unsupported_event, SimulationObserver},
    state::{SimulationState, TaskLifecycle},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaskCounters {
    pub total: usize,
    pub pending_submission: usize,
    pub pending_dependencies: usize,
    pub eligible: usize,
    pub running: usize,
    pub completed: usize,
    pub energy_consumed: f64,
}

impl fmt::Display for TaskCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tasks pending/eligible/running/completed: {}/{}/{}/{}",
            self.pending_dependencies, self.eligible, self.running, self.completed
        )
    }
}

/// Drives task lifecycles and resolves dependencies between tasks.
pub struct TaskStateMonitor {
    counters: TaskCounters,
    reverse_dependencies: Vec<Vec<TaskId>>,

    trace: Rc<RefCell<Trace>>,
    state: Rc<RefCell<SimulationState>>,
    ctx: SimulationContext,
}

impl TaskStateMonitor {
    pub fn new(trace: Rc<RefCell<Trace>>, state: Rc<RefCell<SimulationState>>, ctx: SimulationContext) -> Self {
        let (total, reverse_dependencies) = {
            let trace = trace.borrow();
            (trace.tasks().len(), trace.reverse_dependencies())
        };
        Self {
            counters: TaskCounters {
                total,
                pending_submission: total,
                ..Default::default()
            },
            reverse_dependencies,
            trace,
            state,
            ctx,
        }
    }

    pub fn counters(&self) -> TaskCounters {
        self.counters
    }

    pub fn completed_task_count(&self) -> usize {
        self.counters.completed
    }

    pub fn task_count(&self) -> usize {
        self.counters.total
    }

    pub fn energy_consumed(&self) -> f64 {
        self.counters.energy_consumed
    }

    fn on_task_submitted(&mut self, task: TaskId) -> Result<(), SimulationError> {
        let mut state = self.state.borrow_mut();
        let task_state = state.task_mut(task)?;
        task_state.submitted()?;
        if task_state.unmet_dependencies().is_empty() {
            self.ctx.emit_now(EventData::TaskDependenciesMet { task });
        }
        self.counters.pending_submission -= 1;
        self.counters.pending_dependencies += 1;
        Ok(())
    }

    fn on_dependencies_met(&mut self) {
        self.counters.pending_dependencies -= 1;
        self.counters.eligible += 1;
    }

    fn on_task_started(&mut self, task: TaskId, machine: MachineId) -> Result<(), SimulationError> {
        if self.state.borrow_mut().task_mut(task)?.started(machine)? {
            self.counters.eligible -= 1;
            self.counters.running += 1;
        }
        Ok(())
    }

    fn on_task_cancelled(&mut self, task: TaskId, machine: MachineId) -> Result<(), SimulationError> {
        if self.state.borrow_mut().task_mut(task)?.cancelled(machine)? {
            log_debug!(self.ctx, "task {} cancelled, back in the queue", task);
            self.counters.running -= 1;
            self.counters.eligible += 1;
        }
        Ok(())
    }

    fn on_attempt_completed(
        &mut self,
        time: Ticks,
        task: TaskId,
        attempt: u32,
        machine: MachineId,
    ) -> Result<(), SimulationError> {
        let mut state = self.state.borrow_mut();
        let task_state = state.task_mut(task)?;
        if !task_state.is_current_attempt(attempt, machine) {
            return Ok(());
        }
        if !task_state.attempt_completed(machine)? {
            return Ok(());
        }
        self.ctx.emit_now(EventData::TaskCompleted { task, machine });

        for &dependant in &self.reverse_dependencies[task] {
            let dependant_state = state.task_mut(dependant)?;
            dependant_state.dependency_completed(task)?;
            if dependant_state.unmet_dependencies().is_empty()
                && dependant_state.lifecycle() != TaskLifecycle::Pending
            {
                self.ctx.emit_now(EventData::TaskDependenciesMet { task: dependant });
            }
        }

        let energy = self
            .trace
            .borrow()
            .task(task)
            .map(|t| t.energy_consumed)
            .unwrap_or_default();
        self.counters.running -= 1;
        self.counters.completed += 1;
        self.counters.energy_consumed += energy;
        if self.counters.completed == self.counters.total {
            log_debug!(self.ctx, "all {} tasks completed", self.counters.total);
            self.ctx.emit_at(EventData::AllTasksCompleted, time);
        }
        Ok(())
    }
}

impl SimulationObserver for TaskStateMonitor {
    fn name(&self) -> &str {
        "TaskStateMonitor"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskSubmitted,
            EventType::TaskDependenciesMet,
            EventType::TaskStarted,
            EventType::TaskCancelled,
            EventType::TaskAttemptCompleted,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::TaskSubmitted { task } => self.on_task_submitted(task),
            EventData::TaskDependenciesMet { .. } => {
                self.on_dependencies_met();
                Ok(())
            }
            EventData::TaskStarted { task, machine, .. } => self.on_task_started(task, machine),
            EventData::TaskCancelled { task, machine } => self.on_task_cancelled(task, machine),
            EventData::TaskAttemptCompleted {
                task,
                attempt,
                machine,
                ..
            } => self.on_attempt_completed(event.time, task, attempt, machine),
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}
