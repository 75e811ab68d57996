use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use crate::{
    allocation::{AllocationCallbacks, PlacementPolicy, QueuedTask, TaskPlacementPolicy},
    cluster::ClusterManager,
    context::{DebouncedEvent, SimulationContext},
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_debug,
    model::{MachineId, Task, TaskId, Ticks, Trace},
    observer::{unsupported_event, SimulationObserver},
    state::{MachineState, SimulationState},
    task_queue::TaskQueue,
};

/// Runs the placement policy whenever the task queue or the cluster changed,
/// at most once per batch of changes.
pub struct Scheduler {
    placement_policy: TaskPlacementPolicy,
    task_queue: Rc<RefCell<TaskQueue>>,
    cluster: Rc<RefCell<ClusterManager>>,
    trace: Rc<RefCell<Trace>>,
    state: Rc<RefCell<SimulationState>>,
    reschedule: DebouncedEvent,
    ctx: SimulationContext,
    passes: u64,
}

impl Scheduler {
    pub fn new(
        placement_policy: TaskPlacementPolicy,
        task_queue: Rc<RefCell<TaskQueue>>,
        cluster: Rc<RefCell<ClusterManager>>,
        trace: Rc<RefCell<Trace>>,
        state: Rc<RefCell<SimulationState>>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            placement_policy,
            task_queue,
            cluster,
            trace,
            state,
            reschedule: DebouncedEvent::new(EventData::SchedulerReschedule),
            ctx,
            passes: 0,
        }
    }

    pub fn placement_policy(&self) -> &TaskPlacementPolicy {
        &self.placement_policy
    }

    /// Number of placement passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn reschedule(&mut self) -> Result<(), SimulationError> {
        self.reschedule.on_processed();
        self.passes += 1;

        let mut allocator = Allocator {
            cluster: self.cluster.borrow_mut(),
            task_queue: self.task_queue.borrow_mut(),
            trace: self.trace.borrow_mut(),
            state: self.state.borrow(),
            ctx: &self.ctx,
            cursor: None,
            placements: 0,
        };
        self.placement_policy.schedule_tasks(&mut allocator)?;

        log_debug!(
            self.ctx,
            "placed {} task fragments, {} tasks still queued, {} cpus free",
            allocator.placements,
            allocator.task_queue.len(),
            allocator.cluster.free_resources()
        );
        Ok(())
    }
}

impl SimulationObserver for Scheduler {
    fn name(&self) -> &str {
        "Scheduler"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskQueueExtended,
            EventType::ClusterStateChanged,
            EventType::SchedulerReschedule,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::TaskQueueExtended | EventData::ClusterStateChanged => {
                self.reschedule.emit(&self.ctx);
                Ok(())
            }
            EventData::SchedulerReschedule => self.reschedule(),
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}

/// Callbacks handed to the placement policy for a single pass. Holds the
/// borrows of everything a placement touches until the pass is over.
struct Allocator<'a> {
    cluster: RefMut<'a, ClusterManager>,
    task_queue: RefMut<'a, TaskQueue>,
    trace: RefMut<'a, Trace>,
    state: Ref<'a, SimulationState>,
    ctx: &'a SimulationContext,
    // Last task handed out, so the walk survives removals from the queue.
    cursor: Option<QueuedTask>,
    placements: usize,
}

impl AllocationCallbacks for Allocator<'_> {
    fn current_time(&self) -> Ticks {
        self.ctx.time()
    }

    fn next_eligible_task(&mut self) -> Option<TaskId> {
        let next = match &self.cursor {
            Some(cursor) => self.task_queue.next_after(cursor),
            None => self.task_queue.first(),
        };
        if next.is_some() {
            self.cursor = next;
        }
        next.map(|entry| entry.task)
    }

    fn task(&self, task: TaskId) -> &Task {
        &self.trace.tasks()[task]
    }

    fn task_mut(&mut self, task: TaskId) -> &mut Task {
        &mut self.trace.tasks_mut()[task]
    }

    fn free_resources(&self) -> u64 {
        self.cluster.free_resources()
    }

    fn machine_states(&self) -> Box<dyn Iterator<Item = &MachineState> + '_> {
        Box::new(self.cluster.machine_states())
    }

    fn machine_states_by_ascending_free_cpu(
        &self,
        minimum_free_cpu: u32,
    ) -> Box<dyn Iterator<Item = &MachineState> + '_> {
        Box::new(self.cluster.machine_states_by_ascending_free_cpu(minimum_free_cpu))
    }

    fn machine_states_by_ascending_inefficiency(&self) -> Box<dyn Iterator<Item = &MachineState> + '_> {
        Box::new(self.cluster.machine_states_by_ascending_inefficiency())
    }

    fn machine_states_by_descending_speed(&self) -> Box<dyn Iterator<Item = &MachineState> + '_> {
        Box::new(self.cluster.machine_states_by_descending_speed())
    }

    fn schedule_task(
        &mut self,
        task: TaskId,
        machine: MachineId,
        resources: u32,
    ) -> Result<(), SimulationError> {
        let attempt = self.state.task(task)?.attempt();
        let run_time = self
            .trace
            .task(task)
            .map(|t| t.run_time)
            .ok_or(SimulationError::UnknownEntity { kind: "task", id: task })?;

        self.cluster.assign_task(task, machine, resources)?;
        self.task_queue.remove_scheduled_task(task);
        self.ctx.emit_now(EventData::TaskStarted {
            task,
            machine,
            resources,
        });
        self.ctx.emit(
            EventData::TaskAttemptCompleted {
                task,
                attempt,
                machine,
                resources,
            },
            run_time.max(0),
        );
        self.placements += 1;
        log_debug!(
            self.ctx,
            "scheduled task {} on machine {} with {} cpus for {} ticks",
            task,
            machine,
            resources,
            run_time.max(0)
        );
        Ok(())
    }
}
