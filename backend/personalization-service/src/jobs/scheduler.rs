use chrono::{DateTime, Duration, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Re-sample resources and move the classifier between tiers
    Evolution,
    /// Retrain the classifier from behavior-derived examples
    Training,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Evolution => "evolution",
            TaskKind::Training => "training",
        }
    }
}

#[derive(Debug, Clone)]
struct PeriodicTask {
    kind: TaskKind,
    interval: Duration,
    next_due: DateTime<Utc>,
}

/// Fixed-interval task table.
///
/// The caller polls `due` with the current time; a due task is reported once
/// per poll and re-armed one interval after that poll.
#[derive(Debug, Clone)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new(start: DateTime<Utc>, evolution_interval: Duration, training_interval: Duration) -> Self {
        Self {
            tasks: vec![
                PeriodicTask {
                    kind: TaskKind::Evolution,
                    interval: evolution_interval,
                    next_due: start + evolution_interval,
                },
                PeriodicTask {
                    kind: TaskKind::Training,
                    interval: training_interval,
                    next_due: start + training_interval,
                },
            ],
        }
    }

    pub fn from_secs(start: DateTime<Utc>, evolution_secs: u64, training_secs: u64) -> Self {
        Self::new(
            start,
            Duration::seconds(evolution_secs as i64),
            Duration::seconds(training_secs as i64),
        )
    }

    /// Tasks due at `now`, evolution first
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TaskKind> {
        let mut due = Vec::new();
        for task in &mut self.tasks {
            if task.next_due <= now {
                due.push(task.kind);
                task.next_due = now + task.interval;
                debug!(task = task.kind.as_str(), next_due = %task.next_due, "Task due");
            }
        }
        due
    }

    /// Earliest upcoming deadline
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.next_due).min()
    }

    /// Override the interval of a task, e.g. when the tier's retraining cadence changes
    pub fn set_interval(&mut self, kind: TaskKind, interval: Duration, now: DateTime<Utc>) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.kind == kind) {
            task.interval = interval;
            task.next_due = task.next_due.min(now + interval);
        }
    }
}
