//! Real and simulated clocks, plus the scheduled-task queue
//!
//! Every delayed action in the world (segment teardown, post-impact removal,
//! slow-motion hold) is a task that resumes once its clock passes a due time.
//! Real time is unaffected by slow motion; simulated time is scaled by it.

use serde::{Deserialize, Serialize};

/// Which clock a delay is measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockDomain {
    /// Wall clock (unscaled)
    Real,
    /// Game clock (scaled by time dilation)
    #[default]
    Sim,
}

/// Monotonic real + simulated time in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Clocks {
    real: f64,
    sim: f64,
}

impl Clocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance both clocks. Negative deltas are ignored.
    pub fn advance(&mut self, real_dt: f32, sim_dt: f32) {
        self.real += real_dt.max(0.0) as f64;
        self.sim += sim_dt.max(0.0) as f64;
    }

    pub fn real(&self) -> f64 {
        self.real
    }

    pub fn sim(&self) -> f64 {
        self.sim
    }

    pub fn now(&self, domain: ClockDomain) -> f64 {
        match domain {
            ClockDomain::Real => self.real,
            ClockDomain::Sim => self.sim,
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledTask<T> {
    domain: ClockDomain,
    due: f64,
    seq: u64,
    task: T,
}

/// Queue of continuations resumed once their clock passes the due time
#[derive(Debug, Clone)]
pub struct TaskQueue<T> {
    tasks: Vec<ScheduledTask<T>>,
    next_seq: u64,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` to run `delay` seconds from now on `domain`
    pub fn schedule(&mut self, clocks: &Clocks, domain: ClockDomain, delay: f32, task: T) {
        let due = clocks.now(domain) + delay.max(0.0) as f64;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ScheduledTask {
            domain,
            due,
            seq,
            task,
        });
    }

    /// Remove and return every task whose due time has passed, ordered by
    /// due time then scheduling order
    pub fn drain_due(&mut self, clocks: &Clocks) -> Vec<T> {
        let mut due = Vec::new();
        let mut pending = Vec::with_capacity(self.tasks.len());
        for task in self.tasks.drain(..) {
            if clocks.now(task.domain) >= task.due {
                due.push(task);
            } else {
                pending.push(task);
            }
        }
        self.tasks = pending;
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|t| t.task).collect()
    }

    /// Whether any pending task matches `pred`
    pub fn any(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.tasks.iter().any(|t| pred(&t.task))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_resume_in_due_order() {
        let mut clocks = Clocks::new();
        let mut queue = TaskQueue::new();
        queue.schedule(&clocks, ClockDomain::Sim, 2.0, "late");
        queue.schedule(&clocks, ClockDomain::Sim, 1.0, "early");
        queue.schedule(&clocks, ClockDomain::Sim, 1.0, "early-second");

        clocks.advance(0.5, 0.5);
        assert!(queue.drain_due(&clocks).is_empty());

        clocks.advance(1.0, 1.0);
        assert_eq!(queue.drain_due(&clocks), vec!["early", "early-second"]);
        assert_eq!(queue.len(), 1);

        clocks.advance(1.0, 1.0);
        assert_eq!(queue.drain_due(&clocks), vec!["late"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_real_and_sim_domains_are_independent() {
        let mut clocks = Clocks::new();
        let mut queue = TaskQueue::new();
        queue.schedule(&clocks, ClockDomain::Real, 1.0, 'r');
        queue.schedule(&clocks, ClockDomain::Sim, 1.0, 's');

        // Slow motion: a full real second is only 0.2 simulated seconds
        clocks.advance(1.0, 0.2);
        assert_eq!(queue.drain_due(&clocks), vec!['r']);
        assert!(queue.any(|t| *t == 's'));
    }
}
