//! Observers collecting per-task and per-workflow timings, and progress
//! reporting for long runs.

use std::{cell::RefCell, rc::Rc, time::Instant};

use serde::Serialize;

use crate::{
    context::SimulationContext,
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_info,
    model::{TaskId, Ticks, Trace, WorkflowId},
    observer::{unsupported_event, SimulationObserver},
    task_state_monitor::TaskStateMonitor,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskTimes {
    pub submit: Option<Ticks>,
    pub ready: Option<Ticks>,
    pub start: Option<Ticks>,
    pub completion: Option<Ticks>,
    /// Completion under unlimited resources, given the simulated completion
    /// order of the dependencies.
    pub earliest_completion: Option<Ticks>,
}

pub struct TaskStatsCollector {
    times: Vec<TaskTimes>,
    trace: Rc<RefCell<Trace>>,
}

impl TaskStatsCollector {
    pub fn new(trace: Rc<RefCell<Trace>>) -> Self {
        let tasks = trace.borrow().tasks().len();
        Self {
            times: vec![TaskTimes::default(); tasks],
            trace,
        }
    }

    pub fn times(&self, task: TaskId) -> Option<&TaskTimes> {
        self.times.get(task)
    }

    pub fn all_times(&self) -> &[TaskTimes] {
        &self.times
    }

    fn times_mut(&mut self, task: TaskId) -> Result<&mut TaskTimes, SimulationError> {
        self.times
            .get_mut(task)
            .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })
    }

    fn on_task_completed(&mut self, time: Ticks, task: TaskId) -> Result<(), SimulationError> {
        let earliest_completion = {
            let trace = self.trace.borrow();
            let task_model = trace
                .task(task)
                .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })?;
            let mut earliest_start = self
                .times(task)
                .and_then(|t| t.submit)
                .unwrap_or(task_model.submission_time());
            for &dependency in task_model.dependencies() {
                let dependency_completion = self
                    .times(dependency)
                    .and_then(|t| t.earliest_completion)
                    .ok_or_else(|| SimulationError::SanityCheck {
                        task,
                        reason: format!("dependency {} completed after its dependant", dependency),
                    })?;
                earliest_start = earliest_start.max(dependency_completion);
            }
            earliest_start + task_model.original_run_time()
        };
        let times = self.times_mut(task)?;
        times.completion = Some(time);
        times.earliest_completion = Some(earliest_completion);
        Ok(())
    }

    /// Checks the timing invariants of a finished run: tasks start after their
    /// submission and after all their dependencies completed, and run for
    /// exactly their run time.
    pub fn sanity_check(&self) -> Result<(), SimulationError> {
        let trace = self.trace.borrow();
        for task in trace.tasks() {
            let failure = |reason: String| SimulationError::SanityCheck {
                task: task.id(),
                reason,
            };
            let times = &self.times[task.id()];
            let (Some(start), Some(completion)) = (times.start, times.completion) else {
                return Err(failure("task never started or completed".to_string()));
            };
            if start < task.submission_time() {
                return Err(failure(format!(
                    "started at {} before submission at {}",
                    start,
                    task.submission_time()
                )));
            }
            let expected_completion = start + task.run_time.max(0);
            if completion != expected_completion {
                return Err(failure(format!(
                    "completed at {} instead of {} (start {} + run time {})",
                    completion, expected_completion, start, task.run_time
                )));
            }
            for &dependency in task.dependencies() {
                match self.times[dependency].completion {
                    Some(dependency_completion) if dependency_completion <= start => {}
                    other => {
                        return Err(failure(format!(
                            "started at {} before dependency {} completed ({:?})",
                            start, dependency, other
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

impl SimulationObserver for TaskStatsCollector {
    fn name(&self) -> &str {
        "TaskStatsCollector"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskSubmitted,
            EventType::TaskDependenciesMet,
            EventType::TaskStarted,
            EventType::TaskCompleted,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::TaskSubmitted { task } => self.times_mut(task)?.submit = Some(event.time),
            EventData::TaskDependenciesMet { task } => self.times_mut(task)?.ready = Some(event.time),
            // Fragments start together, a restarted task overwrites the start.
            EventData::TaskStarted { task, .. } => self.times_mut(task)?.start = Some(event.time),
            EventData::TaskCompleted { task, .. } => self.on_task_completed(event.time, task)?,
            _ => return Err(unsupported_event(self.name(), event)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowTimes {
    pub submit: Option<Ticks>,
    pub completion: Option<Ticks>,
    pub earliest_completion: Option<Ticks>,
}

pub struct WorkflowStatsCollector {
    times: Vec<WorkflowTimes>,
    trace: Rc<RefCell<Trace>>,
    task_stats: Rc<RefCell<TaskStatsCollector>>,
}

impl WorkflowStatsCollector {
    pub fn new(trace: Rc<RefCell<Trace>>, task_stats: Rc<RefCell<TaskStatsCollector>>) -> Self {
        let workflows = trace.borrow().workflows().len();
        Self {
            times: vec![WorkflowTimes::default(); workflows],
            trace,
            task_stats,
        }
    }

    pub fn submit_time(&self, workflow: WorkflowId) -> Option<Ticks> {
        self.times.get(workflow).and_then(|t| t.submit)
    }

    pub fn times(&self, workflow: WorkflowId) -> Option<&WorkflowTimes> {
        self.times.get(workflow)
    }

    pub fn all_times(&self) -> &[WorkflowTimes] {
        &self.times
    }

    fn times_mut(&mut self, workflow: WorkflowId) -> Result<&mut WorkflowTimes, SimulationError> {
        self.times.get_mut(workflow).ok_or(SimulationError::UnknownEntity {
            kind: "workflow",
            id: workflow,
        })
    }

    fn on_workflow_completed(&mut self, time: Ticks, workflow: WorkflowId) -> Result<(), SimulationError> {
        let earliest_completion = {
            let trace = self.trace.borrow();
            let task_stats = self.task_stats.borrow();
            trace
                .workflow(workflow)
                .ok_or(SimulationError::UnknownEntity {
                    kind: "workflow",
                    id: workflow,
                })?
                .tasks()
                .iter()
                .filter_map(|task| task_stats.times(*task).and_then(|t| t.earliest_completion))
                .max()
        };
        let times = self.times_mut(workflow)?;
        times.completion = Some(time);
        times.earliest_completion = earliest_completion;
        Ok(())
    }
}

impl SimulationObserver for WorkflowStatsCollector {
    fn name(&self) -> &str {
        "WorkflowStatsCollector"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[EventType::WorkflowSubmitted, EventType::WorkflowCompleted]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::WorkflowSubmitted { workflow } => {
                self.times_mut(workflow)?.submit = Some(event.time);
                Ok(())
            }
            EventData::WorkflowCompleted { workflow } => self.on_workflow_completed(event.time, workflow),
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}

/// Logs event throughput and task counters every `events_between_reports`
/// events and when all tasks completed.
pub struct ProgressMonitor {
    task_monitor: Rc<RefCell<TaskStateMonitor>>,
    events_between_reports: u64,
    event_count: u64,
    last_report_event_count: u64,
    last_report: Instant,
    ctx: SimulationContext,
}

impl ProgressMonitor {
    pub fn new(
        task_monitor: Rc<RefCell<TaskStateMonitor>>,
        events_between_reports: u64,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            task_monitor,
            events_between_reports: events_between_reports.max(1),
            event_count: 0,
            last_report_event_count: 0,
            last_report: Instant::now(),
            ctx,
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    fn report(&mut self) {
        let elapsed = self.last_report.elapsed();
        let counters = self.task_monitor.borrow().counters();
        log_info!(
            self.ctx,
            "processed {} events in {} ms, {}",
            self.event_count - self.last_report_event_count,
            elapsed.as_millis(),
            counters
        );
        self.last_report = Instant::now();
        self.last_report_event_count = self.event_count;
    }
}

impl SimulationObserver for ProgressMonitor {
    fn name(&self) -> &str {
        "ProgressMonitor"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &EventType::ALL
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        self.event_count += 1;
        if self.event_count % self.events_between_reports == 0
            || event.event_type() == EventType::AllTasksCompleted
        {
            self.report();
        }
        Ok(())
    }
}
