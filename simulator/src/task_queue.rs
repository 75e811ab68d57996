use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    allocation::{QueuedTask, TaskOrderPolicy},
    context::{DebouncedEvent, SimulationContext},
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_trace,
    model::{TaskId, Ticks, Trace},
    observer::{unsupported_event, SimulationObserver},
    state::{SimulationState, TaskLifecycle},
    util::AvlTree,
};

/// Tasks eligible to run, sorted by the task order policy.
pub struct TaskQueue {
    eligible_tasks: AvlTree<QueuedTask, TaskOrderPolicy>,
    queued: FxHashMap<TaskId, QueuedTask>,

    trace: Rc<RefCell<Trace>>,
    state: Rc<RefCell<SimulationState>>,
    queue_extended: DebouncedEvent,
    ctx: SimulationContext,
}

impl TaskQueue {
    pub fn new(
        order_policy: TaskOrderPolicy,
        trace: Rc<RefCell<Trace>>,
        state: Rc<RefCell<SimulationState>>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            eligible_tasks: AvlTree::new(order_policy),
            queued: FxHashMap::default(),
            trace,
            state,
            queue_extended: DebouncedEvent::new(EventData::TaskQueueExtended),
            ctx,
        }
    }

    pub fn len(&self) -> usize {
        self.eligible_tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible_tasks.is_empty()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.queued.contains_key(&task)
    }

    pub fn eligible_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.eligible_tasks.iter().map(|entry| entry.task)
    }

    pub fn first(&self) -> Option<QueuedTask> {
        self.eligible_tasks.first().copied()
    }

    /// First entry ordered after `entry`, which does not have to be queued
    /// anymore.
    pub fn next_after(&self, entry: &QueuedTask) -> Option<QueuedTask> {
        self.eligible_tasks.first_after(entry).copied()
    }

    pub fn entry(&self, task: TaskId) -> Option<QueuedTask> {
        self.queued.get(&task).copied()
    }

    /// Removes a task that got placed. A task split over several machines is
    /// removed by its first placement only.
    pub fn remove_scheduled_task(&mut self, task: TaskId) {
        if let Some(entry) = self.queued.remove(&task) {
            self.eligible_tasks.remove(&entry);
        }
    }

    fn add_task(&mut self, time: Ticks, task: TaskId) -> Result<(), SimulationError> {
        let entry = {
            let trace = self.trace.borrow();
            let task = trace
                .task(task)
                .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })?;
            QueuedTask {
                task: task.id(),
                eligible_time: time,
                run_time: task.run_time,
                workflow: task.workflow(),
            }
        };
        if let Some(previous) = self.queued.insert(task, entry) {
            self.eligible_tasks.remove(&previous);
        }
        self.eligible_tasks.insert(entry);
        log_trace!(self.ctx, "task {} is eligible, {} queued", task, self.len());
        self.queue_extended.emit(&self.ctx);
        Ok(())
    }

    fn on_dependencies_met(&mut self, time: Ticks, task: TaskId) -> Result<(), SimulationError> {
        let submission_time = self
            .trace
            .borrow()
            .task(task)
            .map(|t| t.submission_time())
            .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })?;
        if time < submission_time {
            return Err(SimulationError::EarlyEligibility {
                task,
                time,
                submission_time,
            });
        }
        self.add_task(time, task)
    }

    fn on_task_cancelled(&mut self, time: Ticks, task: TaskId) -> Result<(), SimulationError> {
        let requeue = {
            let state = self.state.borrow();
            let task_state = state.task(task)?;
            task_state.lifecycle() == TaskLifecycle::Submitted && task_state.running_machine_count() == 0
        };
        if requeue {
            self.add_task(time, task)?;
        }
        Ok(())
    }
}

impl SimulationObserver for TaskQueue {
    fn name(&self) -> &str {
        "TaskQueue"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskDependenciesMet,
            EventType::TaskCancelled,
            EventType::TaskQueueExtended,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::TaskDependenciesMet { task } => self.on_dependencies_met(event.time, task),
            EventData::TaskCancelled { task, .. } => self.on_task_cancelled(event.time, task),
            EventData::TaskQueueExtended => {
                self.queue_extended.on_processed();
                Ok(())
            }
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}
