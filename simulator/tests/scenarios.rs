use std::{cell::RefCell, rc::Rc};

use wta_sim::{
    allocation::DvfsTable,
    cluster::ClusterManager,
    context::SimulationContext,
    error::SimulationError,
    events::{Event, EventData, EventType},
    model::{Environment, TaskId, Ticks, Trace, MILLIS_PER_HOUR},
    observer::SimulationObserver,
    simulation::Simulation,
    PolicySet, TaskOrderPolicyKind, TaskPlacementPolicyKind,
};

/// (name, cpus, normalized speed, tdp, dvfs enabled)
type MachineSpec<'a> = (&'a str, u32, f64, u32, bool);

fn environment(machines: &[MachineSpec]) -> Environment {
    let mut env = Environment::new();
    let cluster = env.create_cluster("cluster").unwrap();
    for (name, cpus, speed, tdp, dvfs) in machines {
        env.create_machine(name, cluster, *cpus, *dvfs, *speed, *tdp).unwrap();
    }
    env
}

fn simulation(
    env: Environment,
    trace: Trace,
    placement: TaskPlacementPolicyKind,
    order: TaskOrderPolicyKind,
) -> Simulation {
    let policies = PolicySet::new(placement, order, DvfsTable::default(), &env).unwrap();
    Simulation::new(env, trace, policies.placement, policies.order)
}

fn start_and_completion(sim: &Simulation, task: TaskId) -> (Ticks, Ticks) {
    let stats = sim.task_stats();
    let stats = stats.borrow();
    let times = stats.times(task).unwrap();
    (times.start.unwrap(), times.completion.unwrap())
}

#[test]
fn independent_tasks_share_a_machine() {
    let env = environment(&[("m", 2, 1., 100, false)]);
    let mut trace = Trace::new();
    let a = trace.create_task("A", None, 10, 0, 0, 1).unwrap();
    let b = trace.create_task("B", None, 5, 0, 0, 1).unwrap();
    let c = trace.create_task("C", None, 3, 20, 0, 2).unwrap();

    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let report = sim.simulate().unwrap();

    assert_eq!(start_and_completion(&sim, a), (0, 10));
    assert_eq!(start_and_completion(&sim, b), (0, 5));
    assert_eq!(start_and_completion(&sim, c), (20, 23));
    assert_eq!(report.final_time, 23);
    assert_eq!(report.completed_tasks, 3);
    assert_eq!(report.completed_workflows, 0);
    sim.task_stats().borrow().sanity_check().unwrap();
}

#[test]
fn dependant_waits_for_its_dependency() {
    let env = environment(&[("m", 1, 1., 100, false)]);
    let mut trace = Trace::new();
    let wf = trace.create_workflow("wf").unwrap();
    let p = trace.create_task("P", Some(wf), 10, 0, 0, 1).unwrap();
    let q = trace.create_task("Q", Some(wf), 5, 0, 0, 1).unwrap();
    trace.add_dependency(q, p).unwrap();

    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let report = sim.simulate().unwrap();

    assert_eq!(start_and_completion(&sim, p), (0, 10));
    assert_eq!(start_and_completion(&sim, q), (10, 15));
    assert_eq!(sim.task_stats().borrow().times(q).unwrap().ready, Some(10));
    assert_eq!(report.completed_workflows, 1);

    let workflow_stats = sim.workflow_stats();
    let workflow_times = *workflow_stats.borrow().times(wf).unwrap();
    assert_eq!(workflow_times.submit, Some(0));
    assert_eq!(workflow_times.completion, Some(15));
    assert_eq!(workflow_times.earliest_completion, Some(15));
    sim.task_stats().borrow().sanity_check().unwrap();
}

fn look_ahead_run(dvfs_enabled: bool) -> (Simulation, TaskId) {
    let env = environment(&[("m", 4, 1., 100, dvfs_enabled)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 1000, 0, 1000, 2).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::LookAhead,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    sim.simulate().unwrap();
    (sim, task)
}

#[test]
fn dvfs_trades_slack_for_energy() {
    let (plain, task) = look_ahead_run(false);
    let (dvfs, _) = look_ahead_run(true);

    let plain_energy = 100. / 4. * 2. * 1000. / MILLIS_PER_HOUR;
    {
        let trace = plain.trace();
        let trace = trace.borrow();
        let task = trace.task(task).unwrap();
        assert_eq!(task.run_time, 1000);
        assert!((task.energy_consumed - plain_energy).abs() < 1e-12);
    }

    let trace = dvfs.trace();
    let trace = trace.borrow();
    let slowed = trace.task(task).unwrap();
    // Slack allows a slowdown of 2.0, the table caps it at 1.5344.
    assert_eq!(slowed.run_time, 1535);
    assert_eq!(slowed.slack, 1000 - 535);
    assert!((slowed.energy_consumed - plain_energy * (1. - 0.126)).abs() < 1e-12);
    assert_eq!(start_and_completion(&dvfs, task), (0, 1535));
    dvfs.task_stats().borrow().sanity_check().unwrap();
}

#[test]
fn look_ahead_prefers_efficient_machines_within_slack() {
    let run = |slack: Ticks| {
        let env = environment(&[("fast", 2, 1., 100, false), ("efficient", 2, 0.5, 10, false)]);
        let mut trace = Trace::new();
        trace.create_task("t", None, 100, 0, slack, 2).unwrap();
        let mut sim = simulation(
            env,
            trace,
            TaskPlacementPolicyKind::LookAhead,
            TaskOrderPolicyKind::FirstComeFirstServe,
        );
        let report = sim.simulate().unwrap();
        report.final_time
    };
    assert_eq!(run(0), 100);
    assert_eq!(run(150), 200);
}

#[test]
fn look_ahead_waives_slack_when_fast_machines_are_too_small() {
    let env = environment(&[("fast", 1, 1., 100, false), ("efficient", 4, 0.5, 10, false)]);
    let mut trace = Trace::new();
    trace.create_task("t", None, 100, 0, 0, 3).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::LookAhead,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let report = sim.simulate().unwrap();
    assert_eq!(report.final_time, 200);
    sim.task_stats().borrow().sanity_check().unwrap();
}

#[test]
fn fastest_machine_splits_tasks() {
    let env = environment(&[("fast", 2, 1., 100, false), ("slow", 2, 0.5, 50, false)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 100, 0, 0, 3).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::FastestMachine,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let report = sim.simulate().unwrap();

    assert_eq!(start_and_completion(&sim, task), (0, 200));
    let expected_energy = (100. / 2. * 2. * 100. + 50. / 2. * 1. * 200.) / MILLIS_PER_HOUR;
    assert!((report.energy_consumed - expected_energy).abs() < 1e-12);
    sim.task_stats().borrow().sanity_check().unwrap();
}

/// A 2-cpu task with 600 ticks of slack on a 2-cpu DVFS machine. With
/// `blocked` it waits behind a 1-cpu task running until 300 and another
/// running until 100.
fn waiting_task_run(blocked: bool) -> (Simulation, TaskId) {
    let env = environment(&[("m", 2, 1., 100, true)]);
    let mut trace = Trace::new();
    if blocked {
        trace.create_task("long", None, 300, 0, 0, 1).unwrap();
        trace.create_task("short", None, 100, 0, 0, 1).unwrap();
    }
    let task = trace.create_task("waiting", None, 1000, 0, 600, 2).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::LookAhead,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    sim.simulate().unwrap();
    (sim, task)
}

#[test]
fn slack_decays_on_every_pass_a_task_waits_through() {
    let (unblocked, task) = waiting_task_run(false);
    {
        let trace = unblocked.trace();
        let trace = trace.borrow();
        let placed = trace.task(task).unwrap();
        // (1000 + 600) / 1000 selects the 1.5344 slowdown.
        assert_eq!(placed.run_time, 1535);
        assert_eq!(placed.slack, 600 - 535);
    }

    let (blocked, task) = waiting_task_run(true);
    assert_eq!(start_and_completion(&blocked, task), (300, 1300));
    let trace = blocked.trace();
    let trace = trace.borrow();
    let placed = trace.task(task).unwrap();
    // The pass at 100 sees one free cpu and decays slack to 500 without
    // placing the task. The pass at 300 decays it by the full wait again,
    // leaving 200 instead of 300, so (1000 + 200) / 1000 picks no slowdown.
    assert_eq!(placed.slack, 200);
    assert_eq!(placed.run_time, 1000);
    let full_power = 100. / 2. * 2. * 1000. / MILLIS_PER_HOUR;
    assert!((placed.energy_consumed - full_power).abs() < 1e-12);
}

fn single_slow_machine_energy(placement: TaskPlacementPolicyKind) -> (Ticks, f64) {
    let env = environment(&[("slow", 1, 0.3, 100, false)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 100, 0, 0, 1).unwrap();
    let mut sim = simulation(env, trace, placement, TaskOrderPolicyKind::FirstComeFirstServe);
    sim.simulate().unwrap();
    let trace = sim.trace();
    let trace = trace.borrow();
    let task = trace.task(task).unwrap();
    (task.run_time, task.energy_consumed)
}

#[test]
fn placements_bill_energy_on_the_unrounded_run_time() {
    let (fastest_run_time, fastest_energy) =
        single_slow_machine_energy(TaskPlacementPolicyKind::FastestMachine);
    let (look_ahead_run_time, look_ahead_energy) =
        single_slow_machine_energy(TaskPlacementPolicyKind::LookAhead);

    assert_eq!(fastest_run_time, 334);
    assert_eq!(look_ahead_run_time, 334);
    let expected = 100. * (100. / 0.3) / MILLIS_PER_HOUR;
    assert!((fastest_energy - expected).abs() < 1e-12);
    assert!((look_ahead_energy - expected).abs() < 1e-12);
}

#[test]
fn requeued_split_task_stretches_from_its_stretched_run_time() {
    let env = environment(&[("fast", 1, 1., 100, false), ("slow", 1, 0.5, 50, false)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 100, 0, 0, 2).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::FastestMachine,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    sim.schedule_cancellation(50, task, 0);
    sim.schedule_cancellation(50, task, 1);
    let report = sim.simulate().unwrap();

    // The first attempt leaves run time at 200, the restart at 50 stretches
    // that to 400 on the slow machine.
    assert_eq!(report.final_time, 450);
    assert_eq!(sim.trace().borrow().task(task).unwrap().run_time, 400);
    assert_eq!(sim.state().borrow().task(task).unwrap().attempt(), 1);
    assert_eq!(sim.cluster().borrow().free_resources(), 2);
}

fn ordering_run(order: TaskOrderPolicyKind) -> Vec<Ticks> {
    let env = environment(&[("m", 1, 1., 100, false)]);
    let mut trace = Trace::new();
    let early = trace.create_workflow("early").unwrap();
    let late = trace.create_workflow("late").unwrap();
    let e1 = trace.create_task("e1", Some(early), 10, 0, 0, 1).unwrap();
    let e2 = trace.create_task("e2", Some(early), 10, 0, 0, 1).unwrap();
    trace.add_dependency(e2, e1).unwrap();
    trace.create_task("l1", Some(late), 1, 5, 0, 1).unwrap();
    trace.create_task("short", None, 2, 6, 0, 1).unwrap();

    let mut sim = simulation(env, trace, TaskPlacementPolicyKind::BestFit, order);
    sim.simulate().unwrap();
    sim.task_stats().borrow().sanity_check().unwrap();
    (0..4).map(|task| start_and_completion(&sim, task).0).collect()
}

#[test]
fn order_policies() {
    // e1 blocks the machine until 10, then l1 (5), short (6) and e2 (10) wait.
    assert_eq!(ordering_run(TaskOrderPolicyKind::FirstComeFirstServe), vec![0, 13, 10, 11]);
    assert_eq!(ordering_run(TaskOrderPolicyKind::ShortestJobFirst), vec![0, 13, 10, 11]);
    assert_eq!(ordering_run(TaskOrderPolicyKind::EarliestWorkflowFirst), vec![0, 10, 20, 21]);
}

#[test]
fn shortest_job_first_overtakes_longer_tasks() {
    let run = |order| {
        let env = environment(&[("m", 1, 1., 100, false)]);
        let mut trace = Trace::new();
        trace.create_task("blocker", None, 10, 0, 0, 1).unwrap();
        let long = trace.create_task("long", None, 8, 1, 0, 1).unwrap();
        let short = trace.create_task("short", None, 2, 2, 0, 1).unwrap();
        let mut sim = simulation(env, trace, TaskPlacementPolicyKind::BestFit, order);
        sim.simulate().unwrap();
        (
            start_and_completion(&sim, long).0,
            start_and_completion(&sim, short).0,
        )
    };
    assert_eq!(run(TaskOrderPolicyKind::FirstComeFirstServe), (10, 18));
    assert_eq!(run(TaskOrderPolicyKind::ShortestJobFirst), (12, 10));
}

#[test]
fn cancelled_task_is_requeued_and_restarted() {
    let env = environment(&[("m", 1, 1., 100, false)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 10, 0, 0, 1).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    sim.schedule_cancellation(4, task, 0);
    let report = sim.simulate().unwrap();

    assert_eq!(start_and_completion(&sim, task), (4, 14));
    assert_eq!(report.final_time, 14);
    assert_eq!(sim.state().borrow().task(task).unwrap().attempt(), 1);
    assert_eq!(sim.cluster().borrow().free_resources(), 1);
    sim.task_stats().borrow().sanity_check().unwrap();
}

#[test]
fn cancelling_a_task_that_is_not_running_aborts() {
    let env = environment(&[("m", 1, 1., 100, false)]);
    let mut trace = Trace::new();
    let task = trace.create_task("t", None, 10, 5, 0, 1).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    sim.schedule_cancellation(1, task, 0);
    assert!(sim.simulate().is_err());
}

#[test]
fn unplaceable_task_leaves_simulation_incomplete() {
    let env = environment(&[("m", 2, 1., 100, false)]);
    let mut trace = Trace::new();
    trace.create_task("ok", None, 10, 0, 0, 1).unwrap();
    trace.create_task("huge", None, 10, 0, 0, 4).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    assert_eq!(
        sim.simulate(),
        Err(SimulationError::IncompleteSimulation {
            completed: 1,
            total: 2
        })
    );
}

#[test]
fn empty_trace_completes_immediately() {
    let mut sim = simulation(
        environment(&[("m", 1, 1., 100, false)]),
        Trace::new(),
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let report = sim.simulate().unwrap();
    assert_eq!(report.processed_events, 0);
    assert_eq!(report.completed_tasks, 0);
}

/// Emits an event into the past as soon as a task starts.
struct PastEventEmitter {
    ctx: SimulationContext,
}

impl SimulationObserver for PastEventEmitter {
    fn name(&self) -> &str {
        "PastEventEmitter"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[EventType::TaskStarted]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        self.ctx.emit_at(EventData::ClusterStateChanged, event.time - 1);
        Ok(())
    }
}

#[test]
fn events_behind_the_clock_abort_the_simulation() {
    let env = environment(&[("m", 1, 1., 100, false)]);
    let mut trace = Trace::new();
    trace.create_task("t", None, 10, 7, 0, 1).unwrap();
    let mut sim = simulation(
        env,
        trace,
        TaskPlacementPolicyKind::BestFit,
        TaskOrderPolicyKind::FirstComeFirstServe,
    );
    let ctx = sim.create_context("past");
    sim.add_observer(Rc::new(RefCell::new(PastEventEmitter { ctx })));
    assert_eq!(
        sim.simulate(),
        Err(SimulationError::ClockRegression {
            current: 7,
            event_time: 6
        })
    );
}

/// Checks after every resource change that each machine's free and allocated
/// cpus add up to its size.
struct ResourceAuditor {
    cluster: Rc<RefCell<ClusterManager>>,
    checks: usize,
    events: Vec<EventType>,
}

impl SimulationObserver for ResourceAuditor {
    fn name(&self) -> &str {
        "ResourceAuditor"
    }

    fn supported_event_types(&self) -> &[EventType] {
        &[
            EventType::TaskStarted,
            EventType::TaskCancelled,
            EventType::TaskAttemptCompleted,
            EventType::TaskCompleted,
            EventType::ClusterStateChanged,
        ]
    }

    fn on(&mut self, event: &Event) -> Result<(), SimulationError> {
        self.events.push(event.event_type());
        let cluster = self.cluster.borrow();
        let mut free_total = 0;
        for machine in cluster.machine_states() {
            assert_eq!(machine.free_cpus() + machine.allocated_cpus(), machine.cpus());
            free_total += machine.free_cpus() as u64;
            self.checks += 1;
        }
        assert_eq!(free_total, cluster.free_resources());
        Ok(())
    }
}

#[test]
fn resources_are_conserved() {
    let env = environment(&[
        ("a", 4, 1., 100, true),
        ("b", 2, 0.5, 20, false),
        ("c", 8, 0.8, 150, true),
    ]);
    let mut trace = Trace::new();
    for w in 0..5 {
        let wf = trace.create_workflow(&format!("wf{}", w)).unwrap();
        let mut previous = None;
        for t in 0..6 {
            let id = trace
                .create_task(
                    &format!("t{}", t),
                    Some(wf),
                    10 + 7 * t as Ticks,
                    3 * w as Ticks,
                    20,
                    1 + (t as u32 + w as u32) % 4,
                )
                .unwrap();
            if let Some(previous) = previous.filter(|_| t % 2 == 1) {
                trace.add_dependency(id, previous).unwrap();
            }
            previous = Some(id);
        }
    }

    for placement in [
        TaskPlacementPolicyKind::BestFit,
        TaskPlacementPolicyKind::FastestMachine,
        TaskPlacementPolicyKind::LookAhead,
    ] {
        let mut sim = simulation(
            env.clone(),
            trace.clone(),
            placement,
            TaskOrderPolicyKind::EarliestWorkflowFirst,
        );
        let auditor = Rc::new(RefCell::new(ResourceAuditor {
            cluster: sim.cluster(),
            checks: 0,
            events: Vec::new(),
        }));
        sim.add_observer(auditor.clone());
        let report = sim.simulate().unwrap();

        assert_eq!(report.completed_tasks, 30);
        assert_eq!(report.completed_workflows, 5);
        assert!(auditor.borrow().checks > 0);
        assert_eq!(
            auditor
                .borrow()
                .events
                .iter()
                .filter(|e| **e == EventType::TaskCompleted)
                .count(),
            30
        );
        assert_eq!(sim.cluster().borrow().free_resources(), 14);
        sim.task_stats().borrow().sanity_check().unwrap();
    }
}
