//! Cooperative tick scheduler.
//!
//! The host calls into the engine once per display frame with its own
//! clock; the scheduler decides which controller tasks run on that frame.
//! Scheduling returns a [`TaskHandle`] that can only be given back once,
//! through [`Scheduler::cancel`]. A cancelled task is never yielded again.

use std::fmt;

/// Work the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AutoGain,
    VoiceFocus,
    SpeechDetect,
    SpeechRate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Every host frame, first run on the next frame.
    EveryFrame,
    /// Fixed period; the first run is one period after scheduling.
    Every { ms: f64 },
}

/// Ownership token for a scheduled task. Not `Clone`: whoever holds it is
/// the only one able to cancel the task.
#[must_use = "dropping a TaskHandle leaves the task running with no way to cancel it"]
pub struct TaskHandle {
    id: u64,
    kind: TaskKind,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({:?}#{})", self.kind, self.id)
    }
}

struct Task {
    id: u64,
    kind: TaskKind,
    cadence: Cadence,
    next_due_ms: f64,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TaskKind, cadence: Cadence, now_ms: f64) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        let next_due_ms = match cadence {
            Cadence::EveryFrame => now_ms,
            Cadence::Every { ms } => now_ms + ms.max(0.0),
        };
        self.tasks.push(Task {
            id,
            kind,
            cadence,
            next_due_ms,
        });
        log::debug!("scheduled {kind:?}#{id} ({cadence:?})");
        TaskHandle { id, kind }
    }

    pub fn cancel(&mut self, handle: TaskHandle) {
        self.tasks.retain(|t| t.id != handle.id);
        log::debug!("cancelled {:?}#{}", handle.kind, handle.id);
    }

    /// Tasks to run at `now_ms`, in scheduling order. Periodic tasks that
    /// fell several periods behind run once and then re-align to `now_ms`.
    pub fn due(&mut self, now_ms: f64) -> Vec<TaskKind> {
        let mut out = Vec::new();
        for task in self.tasks.iter_mut() {
            match task.cadence {
                Cadence::EveryFrame => {
                    if now_ms >= task.next_due_ms {
                        out.push(task.kind);
                    }
                }
                Cadence::Every { ms } => {
                    if now_ms >= task.next_due_ms {
                        out.push(task.kind);
                        task.next_due_ms += ms;
                        if task.next_due_ms <= now_ms {
                            task.next_due_ms = now_ms + ms;
                        }
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
