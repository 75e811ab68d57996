use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Instant,
};

use serde::Serialize;
use sugars::{rc, refcell};

use crate::{
    allocation::{TaskOrderPolicy, TaskOrderPolicyKind, TaskPlacementPolicy},
    cluster::ClusterManager,
    context::SimulationContext,
    error::SimulationError,
    event_queue::EventQueue,
    events::{EventData, EventType},
    log_debug, log_info, log_trace,
    model::{Environment, MachineId, TaskId, Ticks, Trace},
    monitoring::{ProgressMonitor, TaskStatsCollector, WorkflowStatsCollector},
    observer::SimulationObserver,
    scheduler::Scheduler,
    state::SimulationState,
    task_queue::TaskQueue,
    task_state_monitor::TaskStateMonitor,
    workflow_state_monitor::WorkflowStateMonitor,
};

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub final_time: Ticks,
    pub processed_events: u64,
    pub energy_consumed: f64,
    pub completed_tasks: usize,
    pub completed_workflows: usize,
    pub scheduler_passes: u64,
}

/// Replays a trace on an environment. Components are wired at construction,
/// further observers can be added until `simulate` is called.
pub struct Simulation {
    clock: Rc<Cell<Ticks>>,
    queue: Rc<RefCell<EventQueue>>,
    ctx: SimulationContext,

    observers: Vec<Rc<RefCell<dyn SimulationObserver>>>,
    // Indices into `observers`, per event type rank.
    handlers: Vec<Vec<usize>>,

    environment: Rc<Environment>,
    trace: Rc<RefCell<Trace>>,
    state: Rc<RefCell<SimulationState>>,
    task_state_monitor: Rc<RefCell<TaskStateMonitor>>,
    workflow_state_monitor: Rc<RefCell<WorkflowStateMonitor>>,
    cluster: Rc<RefCell<ClusterManager>>,
    task_queue: Rc<RefCell<TaskQueue>>,
    scheduler: Rc<RefCell<Scheduler>>,
    task_stats: Rc<RefCell<TaskStatsCollector>>,
    workflow_stats: Rc<RefCell<WorkflowStatsCollector>>,

    processed_events: u64,
    started: bool,
}

impl Simulation {
    pub fn new(
        environment: Environment,
        mut trace: Trace,
        placement_policy: TaskPlacementPolicy,
        order_policy: TaskOrderPolicyKind,
    ) -> Self {
        trace.compute_earliest_start_times();

        let clock = rc!(Cell::new(Ticks::MIN));
        let queue = rc!(refcell!(EventQueue::new()));
        let create_context = |name: &str| SimulationContext::new(name, clock.clone(), queue.clone());

        let state = rc!(refcell!(SimulationState::new(&trace)));
        let trace = rc!(refcell!(trace));

        let task_stats = rc!(refcell!(TaskStatsCollector::new(trace.clone())));
        let workflow_stats = rc!(refcell!(WorkflowStatsCollector::new(
            trace.clone(),
            task_stats.clone()
        )));
        let order_policy = match order_policy {
            TaskOrderPolicyKind::FirstComeFirstServe => TaskOrderPolicy::FirstComeFirstServe,
            TaskOrderPolicyKind::ShortestJobFirst => TaskOrderPolicy::ShortestJobFirst,
            TaskOrderPolicyKind::EarliestWorkflowFirst => {
                TaskOrderPolicy::EarliestWorkflowFirst(workflow_stats.clone())
            }
        };

        let workflow_state_monitor = rc!(refcell!(WorkflowStateMonitor::new(
            trace.clone(),
            state.clone(),
            create_context("workflow_state_monitor"),
        )));
        let task_state_monitor = rc!(refcell!(TaskStateMonitor::new(
            trace.clone(),
            state.clone(),
            create_context("task_state_monitor"),
        )));
        let cluster = rc!(refcell!(ClusterManager::new(
            &environment,
            state.clone(),
            create_context("cluster"),
        )));
        let task_queue = rc!(refcell!(TaskQueue::new(
            order_policy,
            trace.clone(),
            state.clone(),
            create_context("task_queue"),
        )));
        let scheduler = rc!(refcell!(Scheduler::new(
            placement_policy,
            task_queue.clone(),
            cluster.clone(),
            trace.clone(),
            state.clone(),
            create_context("scheduler"),
        )));
        let ctx = create_context("simulation");

        let mut sim = Self {
            clock,
            queue,
            ctx,
            observers: Vec::new(),
            handlers: vec![Vec::new(); EventType::COUNT],
            environment: rc!(environment),
            trace,
            state,
            task_state_monitor: task_state_monitor.clone(),
            workflow_state_monitor: workflow_state_monitor.clone(),
            cluster: cluster.clone(),
            task_queue: task_queue.clone(),
            scheduler: scheduler.clone(),
            task_stats: task_stats.clone(),
            workflow_stats: workflow_stats.clone(),
            processed_events: 0,
            started: false,
        };

        // Workflow bookkeeping runs before task bookkeeping, which runs before
        // the components acting on the new state.
        sim.add_observer(workflow_state_monitor);
        sim.add_observer(task_state_monitor);
        sim.add_observer(cluster);
        sim.add_observer(task_queue);
        sim.add_observer(scheduler);
        sim.add_observer(task_stats);
        sim.add_observer(workflow_stats);
        sim
    }

    /// Creates a context sharing the simulation clock and event queue, for
    /// components living outside of the simulator.
    pub fn create_context(&self, name: &str) -> SimulationContext {
        SimulationContext::new(name, self.clock.clone(), self.queue.clone())
    }

    /// Registers an observer. It receives the events of its supported types
    /// after every previously registered observer.
    pub fn add_observer(&mut self, observer: Rc<RefCell<dyn SimulationObserver>>) {
        let index = self.observers.len();
        for event_type in observer.borrow().supported_event_types() {
            let handlers = &mut self.handlers[event_type.rank()];
            if !handlers.contains(&index) {
                handlers.push(index);
            }
        }
        self.observers.push(observer);
    }

    /// Logs progress every `events_between_reports` processed events.
    pub fn add_progress_monitor(&mut self, events_between_reports: u64) -> Rc<RefCell<ProgressMonitor>> {
        let monitor = rc!(refcell!(ProgressMonitor::new(
            self.task_state_monitor.clone(),
            events_between_reports,
            self.create_context("progress"),
        )));
        self.add_observer(monitor.clone());
        monitor
    }

    /// Preempts `task` on `machine` at `time`. The task goes back to the
    /// queue once none of its fragments is running.
    pub fn schedule_cancellation(&mut self, time: Ticks, task: TaskId, machine: MachineId) {
        self.queue
            .borrow_mut()
            .submit(time, EventData::TaskCancelled { task, machine });
    }

    pub fn time(&self) -> Ticks {
        self.clock.get()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn trace(&self) -> Rc<RefCell<Trace>> {
        self.trace.clone()
    }

    pub fn state(&self) -> Rc<RefCell<SimulationState>> {
        self.state.clone()
    }

    pub fn task_state_monitor(&self) -> Rc<RefCell<TaskStateMonitor>> {
        self.task_state_monitor.clone()
    }

    pub fn workflow_state_monitor(&self) -> Rc<RefCell<WorkflowStateMonitor>> {
        self.workflow_state_monitor.clone()
    }

    pub fn cluster(&self) -> Rc<RefCell<ClusterManager>> {
        self.cluster.clone()
    }

    pub fn task_queue(&self) -> Rc<RefCell<TaskQueue>> {
        self.task_queue.clone()
    }

    pub fn scheduler(&self) -> Rc<RefCell<Scheduler>> {
        self.scheduler.clone()
    }

    pub fn task_stats(&self) -> Rc<RefCell<TaskStatsCollector>> {
        self.task_stats.clone()
    }

    pub fn workflow_stats(&self) -> Rc<RefCell<WorkflowStatsCollector>> {
        self.workflow_stats.clone()
    }

    fn seed_submissions(&mut self) {
        let trace = self.trace.borrow();
        let mut queue = self.queue.borrow_mut();
        for workflow in trace.workflows() {
            let submit_time = workflow
                .tasks()
                .iter()
                .map(|&task| &trace.tasks()[task])
                .filter(|task| task.dependencies().is_empty())
                .map(|task| task.submission_time())
                .min();
            if let Some(time) = submit_time {
                queue.submit(
                    time,
                    EventData::WorkflowSubmitted {
                        workflow: workflow.id(),
                    },
                );
            }
        }
        for task in trace.tasks() {
            queue.submit(task.submission_time(), EventData::TaskSubmitted { task: task.id() });
        }
    }

    /// Runs the event loop until all tasks completed or no events are left.
    pub fn simulate(&mut self) -> Result<SimulationReport, SimulationError> {
        if !self.started {
            self.started = true;
            self.seed_submissions();
        }

        let t = Instant::now();
        log_info!(
            self.ctx,
            "simulation started with {} tasks on {} machines",
            self.task_state_monitor.borrow().task_count(),
            self.environment.machines().len()
        );

        loop {
            let next = self.queue.borrow_mut().pop();
            let Some(event) = next else {
                break;
            };
            if event.time < self.clock.get() {
                return Err(SimulationError::ClockRegression {
                    current: self.clock.get(),
                    event_time: event.time,
                });
            }
            self.clock.set(event.time);
            self.processed_events += 1;
            log_trace!(
                self.ctx,
                "{}",
                serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event))
            );

            for &observer in &self.handlers[event.event_type().rank()] {
                self.observers[observer].borrow_mut().on(&event)?;
            }
            if event.event_type() == EventType::AllTasksCompleted {
                break;
            }
        }

        let (completed, total) = {
            let monitor = self.task_state_monitor.borrow();
            (monitor.completed_task_count(), monitor.task_count())
        };
        if completed != total {
            return Err(SimulationError::IncompleteSimulation { completed, total });
        }

        let report = SimulationReport {
            final_time: self.clock.get(),
            processed_events: self.processed_events,
            energy_consumed: self.task_state_monitor.borrow().energy_consumed(),
            completed_tasks: completed,
            completed_workflows: self.workflow_state_monitor.borrow().completed_workflow_count(),
            scheduler_passes: self.scheduler.borrow().passes(),
        };
        let elapsed = t.elapsed();
        log_info!(
            self.ctx,
            "simulation finished in {:.3}s, processed {} events ({} /s)",
            elapsed.as_secs_f64(),
            self.processed_events,
            (self.processed_events as f64 / elapsed.as_secs_f64().max(1e-9)) as u64
        );
        log_debug!(self.ctx, "{:?}", report);
        Ok(report)
    }
}
