use std::time::Duration;

use tracing::{debug, error, info};

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};

use super::{Context, Flow, Iterations, Task};

/// A stable reference to a task owned by the [`Scheduler`].
///
/// A handle outlives its task: once the task is removed, the handle no
/// longer resolves, even if its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

/// The lifecycle state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed, not yet enabled.
    Valid,
    /// Called back on schedule.
    Enabled,
    /// Waiting in the removal queue.
    Disabled,
}

/// A task as listed by [`Scheduler::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Handle.
    pub handle: TaskHandle,
    /// Identifier. System tasks have none.
    pub uuid: Option<Uuid>,
    /// Type name.
    pub type_name: &'static str,
    /// State.
    pub state: TaskState,
}

/// A task dropped by the removal queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTask {
    /// Identifier. System tasks have none.
    pub uuid: Option<Uuid>,
    /// Type name.
    pub type_name: &'static str,
    /// The error which invalidated the task, if any.
    pub error: Option<Error>,
}

/// Time accounting of the task callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    busy: Duration,
    callbacks: u64,
}

impl SchedulerStats {
    /// Returns the total time spent inside task callbacks.
    #[must_use]
    pub const fn busy(&self) -> Duration {
        self.busy
    }

    /// Returns the number of callbacks run so far.
    #[must_use]
    pub const fn callbacks(&self) -> u64 {
        self.callbacks
    }
}

struct Entry {
    task: Box<dyn Task>,
    uuid: Option<Uuid>,
    state: TaskState,
    interval: Duration,
    iterations: Iterations,
    next_run: Duration,
    error: Option<Error>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// A cooperative scheduler owning every task.
///
/// Tasks live in an arena of slots addressed through [`TaskHandle`]s. A
/// disabled task stays in its slot until the removal queue is drained at the
/// end of [`Scheduler::tick`], after every due callback has run, so no task
/// is ever dropped while the scheduler iterates over its slots.
#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Slot>,
    free: Vec<u32>,
    removal_queue: Vec<TaskHandle>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Creates an empty [`Scheduler`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a task, which stays idle until enabled.
    pub fn insert(&mut self, uuid: Option<Uuid>, task: Box<dyn Task>) -> TaskHandle {
        let entry = Entry {
            task,
            uuid,
            state: TaskState::Valid,
            interval: Duration::ZERO,
            iterations: Iterations::Forever,
            next_run: Duration::ZERO,
            error: None,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return TaskHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        TaskHandle {
            index,
            generation: 0,
        }
    }

    /// Enables a task.
    ///
    /// A task which fails to enable is dropped right away, without going
    /// through the removal queue.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is stale, when the task was
    /// already enabled, or when the task refuses to be enabled.
    pub fn enable(&mut self, handle: TaskHandle, now: Duration) -> Result<()> {
        let stats = self.stats;
        let entry = self
            .entry_mut(handle)
            .ok_or_else(|| Error::runtime("Could not find task"))?;
        if entry.state != TaskState::Valid {
            return Err(Error::runtime("Task already enabled"));
        }
        if let Some(e) = entry.task.error() {
            let e = e.clone();
            let _ = self.release(handle);
            return Err(e);
        }

        let mut ctx = Context::new(now, entry.uuid, &stats);
        match entry.task.on_enable(&mut ctx) {
            Ok(schedule) => {
                entry.interval = schedule.interval;
                entry.iterations = schedule.iterations;
                entry.next_run = now + schedule.delay;
                entry.state = TaskState::Enabled;
                info!("Enabled task {}", describe(entry));
                Ok(())
            }
            Err(e) => {
                error!("Could not enable task {}: {e}", describe(entry));
                let _ = self.release(handle);
                Err(e)
            }
        }
    }

    /// Disables a task and queues it for removal.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is stale or the task is already
    /// disabled.
    pub fn disable(&mut self, handle: TaskHandle, now: Duration) -> Result<()> {
        let stats = self.stats;
        let entry = self
            .entry_mut(handle)
            .filter(|entry| entry.state != TaskState::Disabled)
            .ok_or_else(|| Error::runtime("Could not find task"))?;

        let mut ctx = Context::new(now, entry.uuid, &stats);
        Self::shut_down(entry, &mut ctx);
        self.removal_queue.push(handle);
        Ok(())
    }

    /// Changes the time between two callbacks of a task.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is stale.
    pub fn set_interval(&mut self, handle: TaskHandle, interval: Duration) -> Result<()> {
        let entry = self
            .entry_mut(handle)
            .ok_or_else(|| Error::runtime("Could not find task"))?;
        entry.interval = interval;
        Ok(())
    }

    /// Runs every due callback, then drains the removal queue.
    ///
    /// Due tasks are selected at the time `clock` reads when the tick starts.
    /// The time spent in each callback is read from `clock` too.
    ///
    /// Returns the tasks dropped by the removal queue.
    pub fn tick(&mut self, clock: &dyn Clock) -> Vec<RemovedTask> {
        let now = clock.now();
        for index in 0..self.slots.len() {
            let Some(entry) = self.slots[index].entry.as_mut() else {
                continue;
            };
            if entry.state != TaskState::Enabled || entry.next_run > now {
                continue;
            }

            // A task with no iteration left finishes without being called.
            let keep_going = if entry.iterations == Iterations::Finite(0) {
                false
            } else {
                let mut ctx = Context::new(now, entry.uuid, &self.stats);
                let started = clock.now();
                let flow = entry.task.callback(&mut ctx);
                self.stats.busy += clock.now().saturating_sub(started);
                self.stats.callbacks += 1;
                Self::advance(entry, flow, now)
            };

            if !keep_going {
                let mut ctx = Context::new(now, entry.uuid, &self.stats);
                Self::shut_down(entry, &mut ctx);
                self.removal_queue.push(TaskHandle {
                    index: index as u32,
                    generation: self.slots[index].generation,
                });
            }
        }

        self.drain()
    }

    // Reschedules a task after its callback, returning whether it goes on.
    fn advance(entry: &mut Entry, flow: Result<Flow>, now: Duration) -> bool {
        match flow {
            Ok(Flow::Continue) => {
                entry.next_run = now + entry.interval;
                entry.iterations.consume()
            }
            Ok(Flow::Delay(delay)) => {
                entry.next_run = now + delay;
                entry.iterations.consume()
            }
            Ok(Flow::Finish) => false,
            Err(e) => {
                error!("Task {} failed: {e}", describe(entry));
                entry.error = Some(e);
                false
            }
        }
    }

    /// Returns the live tasks, disabled ones included.
    pub fn iter(&self) -> impl Iterator<Item = TaskInfo> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| TaskInfo {
                handle: TaskHandle {
                    index: index as u32,
                    generation: slot.generation,
                },
                uuid: entry.uuid,
                type_name: entry.task.type_name(),
                state: entry.state,
            })
        })
    }

    /// Finds a task which is not disabled by its identifier.
    #[must_use]
    pub fn find(&self, uuid: &Uuid) -> Option<TaskHandle> {
        self.iter()
            .find(|info| info.uuid.as_ref() == Some(uuid) && info.state != TaskState::Disabled)
            .map(|info| info.handle)
    }

    /// Returns the state of a task, or [`None`] once it has been removed.
    #[must_use]
    pub fn state(&self, handle: TaskHandle) -> Option<TaskState> {
        self.entry(handle).map(|entry| entry.state)
    }

    /// Returns the number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    /// Returns whether there are no live tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the callback statistics.
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn shut_down(entry: &mut Entry, ctx: &mut Context<'_>) {
        entry.state = TaskState::Disabled;
        entry.task.on_disable(ctx);
        debug!("Disabled task {}", describe(entry));
    }

    fn drain(&mut self) -> Vec<RemovedTask> {
        let queue = std::mem::take(&mut self.removal_queue);
        queue
            .into_iter()
            .filter_map(|handle| self.release(handle))
            .map(|entry| {
                info!("Removed task {}", describe(&entry));
                RemovedTask {
                    uuid: entry.uuid,
                    type_name: entry.task.type_name(),
                    error: entry.error,
                }
            })
            .collect()
    }

    fn release(&mut self, handle: TaskHandle) -> Option<Entry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(entry)
    }

    fn entry(&self, handle: TaskHandle) -> Option<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: TaskHandle) -> Option<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.iter().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn describe(entry: &Entry) -> String {
    match entry.uuid {
        Some(uuid) => format!("{uuid} ({})", entry.task.type_name()),
        None => entry.task.type_name().to_owned(),
    }
}
