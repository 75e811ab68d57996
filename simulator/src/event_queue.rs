use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

use crate::{
    events::{Event, EventData, EventId},
    model::Ticks,
};

#[derive(Debug)]
struct QueuedEvent(Event);

impl QueuedEvent {
    fn key(&self) -> (Ticks, usize, EventId) {
        (self.0.time, self.0.event_type().rank(), self.0.id)
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Pending events ordered by `(time, event type rank)`. Events with equal
/// time and rank are popped in submission order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BinaryHeap<Reverse<QueuedEvent>>,
    next_id: EventId,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, time: Ticks, data: EventData) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(Reverse(QueuedEvent(Event { id, time, data })));
        id
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop().map(|Reverse(QueuedEvent(event))| event)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.events.peek().map(|Reverse(QueuedEvent(event))| event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events submitted so far, popped or not.
    pub fn submitted_count(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::events::EventType;

    fn random_event(rng: &mut StdRng) -> EventData {
        match rng.gen_range(0..6) {
            0 => EventData::WorkflowSubmitted { workflow: 0 },
            1 => EventData::TaskSubmitted {
                task: rng.gen_range(0..10),
            },
            2 => EventData::TaskAttemptCompleted {
                task: 0,
                attempt: 0,
                machine: 0,
                resources: 1,
            },
            3 => EventData::TaskQueueExtended,
            4 => EventData::SchedulerReschedule,
            _ => EventData::AllTasksCompleted,
        }
    }

    #[test]
    fn pops_in_time_then_rank_order() {
        let mut rng = StdRng::seed_from_u64(123);
        let mut queue = EventQueue::new();
        for _ in 0..2000 {
            queue.submit(rng.gen_range(0..50), random_event(&mut rng));
        }

        let mut previous = (Ticks::MIN, 0);
        let mut popped = 0;
        while let Some(event) = queue.pop() {
            let key = (event.time, event.event_type().rank());
            assert!(key >= previous, "{:?} popped after {:?}", key, previous);
            previous = key;
            popped += 1;
        }
        assert_eq!(popped, 2000);
        assert_eq!(queue.submitted_count(), 2000);
    }

    #[test]
    fn equal_keys_pop_in_submission_order() {
        let mut queue = EventQueue::new();
        for task in 0..5 {
            queue.submit(7, EventData::TaskSubmitted { task });
        }
        queue.submit(7, EventData::WorkflowSubmitted { workflow: 3 });

        assert_eq!(
            queue.pop().map(|e| e.event_type()),
            Some(EventType::WorkflowSubmitted)
        );
        let tasks = std::iter::from_fn(|| queue.pop())
            .map(|e| match e.data {
                EventData::TaskSubmitted { task } => task,
                other => panic!("unexpected event {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(tasks, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn earlier_time_wins_over_rank() {
        let mut queue = EventQueue::new();
        queue.submit(5, EventData::WorkflowSubmitted { workflow: 0 });
        queue.submit(4, EventData::AllTasksCompleted);
        assert_eq!(queue.peek().map(|e| e.time), Some(4));
        assert_eq!(queue.len(), 2);
    }
}
