use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Display;

use log::{trace, warn};

use crate::error::ScheduleError;
use crate::SimTime;

/// A pending action and its due time.
///
/// `seq` is the insertion counter: events due at the same time run in the
/// order they were scheduled.
#[derive(Debug, Clone)]
pub struct Event<A> {
    pub time: SimTime,
    pub seq: u64,
    pub action: A,
}

impl<A> PartialEq for Event<A> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<A> Eq for Event<A> {}
impl<A> PartialOrd for Event<A> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<A> Ord for Event<A> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Time-ordered event queue. The only owner of "now".
///
/// Same-time events are popped together and executed one after another in
/// insertion order, so no action ever observes another same-time action
/// half-applied. Anything scheduled at `now` while a batch runs lands in the
/// next batch.
pub struct Scheduler<A> {
    now: SimTime,
    horizon: SimTime,
    seq: u64,
    events: BinaryHeap<Reverse<Event<A>>>,
    processed: u64,
    faults: u64,
}

impl<A> Scheduler<A> {
    pub fn new(horizon: SimTime) -> Self {
        Self {
            now: 0,
            horizon,
            seq: 0,
            events: BinaryHeap::new(),
            processed: 0,
            faults: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Due time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.peek().map(|Reverse(e)| e.time)
    }

    pub fn schedule(&mut self, time: SimTime, action: A) -> Result<(), ScheduleError> {
        if time < self.now {
            return Err(ScheduleError::InPast {
                time,
                now: self.now,
            });
        }
        self.push(time, action);
        Ok(())
    }

    /// Schedules `delay` ticks after now. Never in the past.
    pub fn schedule_in(&mut self, delay: SimTime, action: A) {
        self.push(self.now.saturating_add(delay), action);
    }

    fn push(&mut self, time: SimTime, action: A) {
        let seq = self.seq;
        self.seq += 1;
        self.events.push(Reverse(Event { time, seq, action }));
    }

    /// Pops every event due at the earliest pending time, unless that time
    /// lies beyond `limit` (or the horizon).
    fn next_batch(&mut self, limit: SimTime) -> Option<Vec<Event<A>>> {
        let due = self.peek_time()?;
        if due > limit.min(self.horizon) {
            return None;
        }
        self.now = due;
        let mut batch = Vec::new();
        while let Some(Reverse(event)) = self.events.peek() {
            if event.time != due {
                break;
            }
            if let Some(Reverse(event)) = self.events.pop() {
                batch.push(event);
            }
        }
        Some(batch)
    }

    /// Executes one same-time batch. Returns `false` once nothing is left to
    /// run before `limit`.
    ///
    /// A failing action is logged and counted; the remaining actions of the
    /// batch still run.
    pub fn step_until<E, F>(&mut self, limit: SimTime, handler: &mut F) -> bool
    where
        E: Display,
        F: FnMut(&mut Scheduler<A>, A) -> Result<(), E>,
    {
        let Some(batch) = self.next_batch(limit) else {
            return false;
        };
        trace!("t={} batch of {} event(s)", self.now, batch.len());
        for event in batch {
            self.processed += 1;
            if let Err(e) = handler(self, event.action) {
                self.faults += 1;
                warn!("action #{} at t={} failed: {}", event.seq, event.time, e);
            }
        }
        true
    }

    pub fn step<E, F>(&mut self, handler: &mut F) -> bool
    where
        E: Display,
        F: FnMut(&mut Scheduler<A>, A) -> Result<(), E>,
    {
        self.step_until(SimTime::MAX, handler)
    }

    /// Runs batches until the queue drains or the next event lies past
    /// `limit` / the horizon.
    pub fn run_until<E, F>(&mut self, limit: SimTime, mut handler: F)
    where
        E: Display,
        F: FnMut(&mut Scheduler<A>, A) -> Result<(), E>,
    {
        while self.step_until(limit, &mut handler) {}
    }

    pub fn run<E, F>(&mut self, handler: F)
    where
        E: Display,
        F: FnMut(&mut Scheduler<A>, A) -> Result<(), E>,
    {
        self.run_until(SimTime::MAX, handler)
    }
}
