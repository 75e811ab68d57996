use std::{cell::RefCell, cmp::Ordering, rc::Rc};

use crate::{
    context::{DebouncedEvent, SimulationContext},
    error::SimulationError,
    events::{Event, EventData, EventType},
    log_debug, log_trace,
    model::{Environment, MachineId, TaskId},
    observer::{unsupported_event, SimulationObserver},
    state::{MachineState, SimulationState},
    util::AvlTree,
};

/// Snapshot of the fields the machine indexes are ordered by.
#[derive(Debug, Clone, Copy)]
struct MachineKey {
    machine: MachineId,
    free_cpus: u32,
    power_efficiency: f64,
    normalized_speed: f64,
}

impl MachineKey {
    fn of(state: &MachineState) -> Self {
        Self {
            machine: state.machine(),
            free_cpus: state.free_cpus(),
            power_efficiency: state.power_efficiency(),
            normalized_speed: state.normalized_speed(),
        }
    }

    fn probe_free_cpus(free_cpus: u32) -> Self {
        Self {
            machine: 0,
            free_cpus,
            power_efficiency: 0.,
            normalized_speed: 0.,
        }
    }
}

type MachineIndex = AvlTree<MachineKey, fn(&MachineKey, &MachineKey) -> Ordering>;

fn by_free_cpus(a: &MachineKey, b: &MachineKey) -> Ordering {
    (a.free_cpus, a.machine).cmp(&(b.free_cpus, b.machine))
}

fn by_power_efficiency(a: &MachineKey, b: &MachineKey) -> Ordering {
    a.power_efficiency
        .total_cmp(&b.power_efficiency)
        .then(a.machine.cmp(&b.machine))
}

fn by_descending_speed(a: &MachineKey, b: &MachineKey) -> Ordering {
    b.normalized_speed
        .total_cmp(&a.normalized_speed)
        .then(a.machine.cmp(&b.machine))
}

/// Owns the machine states and keeps three sorted views over them in sync:
/// all machines by free cpus, and machines with free cpus by power efficiency
/// and by descending speed.
pub struct ClusterManager {
    machines: Vec<MachineState>,
    machines_by_free_cpus: MachineIndex,
    free_machines_by_power_efficiency: MachineIndex,
    free_machines_by_speed: MachineIndex,
    free_resources: u64,

    state: Rc<RefCell<SimulationState>>,
    state_changed: DebouncedEvent,
    ctx: SimulationContext,
}

impl ClusterManager {
    pub fn new(
        environment: &Environment,
        state: Rc<RefCell<SimulationState>>,
        ctx: SimulationContext,
    ) -> Self {
        let mut manager = Self {
            machines: environment.machines().iter().map(MachineState::new).collect(),
            machines_by_free_cpus: AvlTree::new(by_free_cpus as fn(&MachineKey, &MachineKey) -> Ordering),
            free_machines_by_power_efficiency: AvlTree::new(
                by_power_efficiency as fn(&MachineKey, &MachineKey) -> Ordering,
            ),
            free_machines_by_speed: AvlTree::new(
                by_descending_speed as fn(&MachineKey, &MachineKey) -> Ordering,
            ),
            free_resources: 0,
            state,
            state_changed: DebouncedEvent::new(EventData::ClusterStateChanged),
            ctx,
        };
        for id in 0..manager.machines.len() {
            manager.index(id);
        }
        manager
    }

    pub fn machine_state(&self, machine: MachineId) -> Result<&MachineState, SimulationError> {
        self.machines.get(machine).ok_or(SimulationError::UnknownEntity {
            kind: "machine",
            id: machine,
        })
    }

    pub fn free_resources(&self) -> u64 {
        self.free_resources
    }

    pub fn machine_states(&self) -> impl Iterator<Item = &MachineState> + '_ {
        self.machines.iter()
    }

    /// Machines with at least `minimum_free_cpu` free cpus, fewest free first.
    pub fn machine_states_by_ascending_free_cpu(
        &self,
        minimum_free_cpu: u32,
    ) -> impl Iterator<Item = &MachineState> + '_ {
        self.machines_by_free_cpus
            .iter_from(&MachineKey::probe_free_cpus(minimum_free_cpu))
            .map(|key| &self.machines[key.machine])
    }

    pub fn machine_states_by_descending_free_cpu(&self) -> impl Iterator<Item = &MachineState> + '_ {
        self.machines_by_free_cpus
            .iter_rev()
            .map(|key| &self.machines[key.machine])
    }

    /// Machines with free cpus, most power efficient first.
    pub fn machine_states_by_ascending_inefficiency(&self) -> impl Iterator<Item = &MachineState> + '_ {
        self.free_machines_by_power_efficiency
            .iter()
            .map(|key| &self.machines[key.machine])
    }

    /// Machines with free cpus, fastest first.
    pub fn machine_states_by_descending_speed(&self) -> impl Iterator<Item = &MachineState> + '_ {
        self.free_machines_by_speed
            .iter()
            .map(|key| &self.machines[key.machine])
    }

    pub fn assign_task(
        &mut self,
        task: TaskId,
        machine: MachineId,
        resources: u32,
    ) -> Result<(), SimulationError> {
        self.update_machine(machine, |state| state.submit_task(task, resources))?;
        log_trace!(
            self.ctx,
            "assigned {} cpus on machine {} to task {}",
            resources,
            machine,
            task
        );
        self.state_changed.emit(&self.ctx);
        Ok(())
    }

    pub fn release_task(&mut self, task: TaskId, machine: MachineId) -> Result<u32, SimulationError> {
        let released = self.update_machine(machine, |state| state.release_task(task))?;
        log_trace!(
            self.ctx,
            "released {} cpus on machine {} from task {}",
            released,
            machine,
            task
        );
        self.state_changed.emit(&self.ctx);
        Ok(released)
    }

    /// Applies `update` to a machine while it is detached from every index.
    fn update_machine<R>(
        &mut self,
        machine: MachineId,
        update: impl FnOnce(&mut MachineState) -> Result<R, SimulationError>,
    ) -> Result<R, SimulationError> {
        self.machine_state(machine)?;
        self.unindex(machine);
        let result = update(&mut self.machines[machine]);
        self.index(machine);
        result
    }

    fn index(&mut self, machine: MachineId) {
        let key = MachineKey::of(&self.machines[machine]);
        self.free_resources += key.free_cpus as u64;
        self.machines_by_free_cpus.insert(key);
        if key.free_cpus > 0 {
            self.free_machines_by_power_efficiency.insert(key);
            self.free_machines_by_speed.insert(key);
        }
    }

    fn unindex(&mut self, machine: MachineId) {
        let key = MachineKey::of(&self.machines[machine]);
        self.free_resources -= key.free_cpus as u64;
        self.machines_by_free_cpus.remove(&key);
        if key.free_cpus > 0 {
            self.free_machines_by_power_efficiency.remove(&key);
            self.free_machines_by_speed.remove(&key);
        }
    }

    fn on_attempt_completed(
        &mut self,
        task: TaskId,
        attempt: u32,
        machine: MachineId,
    ) -> Result<(), SimulationError> {
        let current_attempt = self.state.borrow().task(task)?.attempt();
        let holds_task = self.machine_state(machine)?.resources_of(task).is_some();
        if current_attempt != attempt || !holds_task {
            log_debug!(
                self.ctx,
                "ignoring stale completion of task {} attempt {} on machine {}",
                task,
                attempt,
                machine
            );
            return Ok(());
        }
        self.release_task(task, machine)?;
        Ok(())
    }
}

impl SimulationObserver for ClusterManager {
    fn name(&self) -> &str {
        "ClusterManager"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskAttemptCompleted,
            EventType::TaskCancelled,
            EventType::ClusterStateChanged,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.data {
            EventData::TaskAttemptCompleted {
                task,
                attempt,
                machine,
                ..
            } => self.on_attempt_completed(task, attempt, machine),
            EventData::TaskCancelled { task, machine } => {
                self.release_task(task, machine)?;
                Ok(())
            }
            EventData::ClusterStateChanged => {
                self.state_changed.on_processed();
                Ok(())
            }
            _ => Err(unsupported_event(self.name(), event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    use crate::{event_queue::EventQueue, model::Trace};

    fn manager(machines: &[(u32, f64, u32)]) -> (ClusterManager, Rc<RefCell<EventQueue>>) {
        let mut env = Environment::new();
        let cluster = env.create_cluster("c").unwrap();
        for (i, (cpus, speed, tdp)) in machines.iter().enumerate() {
            env.create_machine(&format!("m{}", i), cluster, *cpus, false, *speed, *tdp)
                .unwrap();
        }
        let queue = Rc::new(RefCell::new(EventQueue::new()));
        let ctx = SimulationContext::new("cluster", Rc::new(Cell::new(0)), queue.clone());
        let state = Rc::new(RefCell::new(SimulationState::new(&Trace::new())));
        (ClusterManager::new(&env, state, ctx), queue)
    }

    fn ids<'a>(states: impl Iterator<Item = &'a MachineState>) -> Vec<MachineId> {
        states.map(|s| s.machine()).collect()
    }

    #[test]
    fn views_follow_resource_changes() {
        let (mut cluster, queue) = manager(&[(4, 1., 100), (8, 0.5, 100), (2, 0.8, 10)]);
        assert_eq!(cluster.free_resources(), 14);
        assert_eq!(ids(cluster.machine_states_by_ascending_free_cpu(0)), vec![2, 0, 1]);
        assert_eq!(ids(cluster.machine_states_by_ascending_free_cpu(3)), vec![0, 1]);
        assert_eq!(ids(cluster.machine_states_by_descending_speed()), vec![0, 2, 1]);
        assert_eq!(ids(cluster.machine_states_by_ascending_inefficiency()), vec![2, 0, 1]);

        cluster.assign_task(7, 0, 4).unwrap();
        cluster.assign_task(8, 1, 3).unwrap();
        assert_eq!(cluster.free_resources(), 7);
        assert_eq!(ids(cluster.machine_states_by_ascending_free_cpu(0)), vec![0, 2, 1]);
        assert_eq!(ids(cluster.machine_states_by_descending_speed()), vec![2, 1]);
        assert_eq!(ids(cluster.machine_states_by_ascending_inefficiency()), vec![2, 1]);
        assert_eq!(ids(cluster.machine_states_by_descending_free_cpu()), vec![1, 2, 0]);
        assert_eq!(queue.borrow().len(), 1, "state change must be debounced");

        assert_eq!(cluster.release_task(7, 0), Ok(4));
        assert_eq!(ids(cluster.machine_states_by_descending_speed()), vec![0, 2, 1]);
        assert_eq!(cluster.free_resources(), 11);
        for state in cluster.machine_states() {
            assert_eq!(state.free_cpus() + state.allocated_cpus(), state.cpus());
        }
    }

    #[test]
    fn failed_assignment_leaves_indexes_intact() {
        let (mut cluster, _) = manager(&[(2, 1., 100)]);
        assert!(matches!(
            cluster.assign_task(1, 0, 3),
            Err(SimulationError::InsufficientResources { .. })
        ));
        assert_eq!(
            cluster.release_task(1, 0),
            Err(SimulationError::TaskNotOnMachine { task: 1, machine: 0 })
        );
        assert!(cluster.assign_task(1, 5, 1).is_err());
        assert_eq!(cluster.free_resources(), 2);
        assert_eq!(ids(cluster.machine_states_by_descending_speed()), vec![0]);
    }
}
