use std::borrow::Cow;
use std::time::Duration;

use tracing::{error, info};

use uuid::Uuid;

use fieldnode::command::TaskCommands;
use fieldnode::parameters::Parameters;
use fieldnode::response::{ActionResults, ResultEntry};
use fieldnode::system::{StatusReport, TaskStatus};

use crate::clock::Clock;
use crate::error::{Error, ErrorKind, Result};
use crate::peripheral::item_uuid;

use super::{
    RemovedTask, SYSTEM_TASK_TYPE, Scheduler, Task, TaskEnv, TaskFactory, TaskHandle, TaskState,
};

/// Starts, stops and reports the tasks of a device.
///
/// The controller owns the [`Scheduler`], so every task, system tasks
/// included, goes through it.
#[derive(Debug)]
pub struct TaskController {
    factory: TaskFactory,
    scheduler: Scheduler,
}

impl TaskController {
    /// Creates a [`TaskController`] with no tasks.
    #[must_use]
    pub fn new(factory: TaskFactory) -> Self {
        Self {
            factory,
            scheduler: Scheduler::new(),
        }
    }

    /// Returns the [`TaskFactory`].
    #[must_use]
    pub const fn factory(&self) -> &TaskFactory {
        &self.factory
    }

    /// Returns the [`Scheduler`].
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Starts a task the device runs on its own.
    ///
    /// System tasks have no identifier, so a server cannot stop them.
    ///
    /// # Errors
    ///
    /// An error is returned when the task cannot be enabled.
    pub fn spawn_system(&mut self, task: Box<dyn Task>, now: Duration) -> Result<TaskHandle> {
        let type_name = task.type_name();
        let handle = self.scheduler.insert(None, task);
        self.scheduler.enable(handle, now)?;
        info!("Spawned system task {type_name}");
        Ok(handle)
    }

    /// Builds and enables a task.
    ///
    /// # Errors
    ///
    /// An error is returned when the identifier is missing or already used,
    /// or when the task cannot be constructed or enabled. Nothing is kept in
    /// that case.
    pub fn start(&mut self, parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Uuid> {
        let uuid = parameters.id()?;
        if self.scheduler.find(&uuid).is_some() {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("Task already exists: {uuid}"),
            ));
        }

        let task = self.factory.create(parameters, env);
        if let Some(e) = task.error() {
            return Err(e.clone());
        }

        let handle = self.scheduler.insert(Some(uuid), task);
        self.scheduler.enable(handle, env.now)?;
        Ok(uuid)
    }

    /// Disables a task.
    ///
    /// The task is removed, and its removal reported, at the end of the next
    /// scheduler tick.
    ///
    /// # Errors
    ///
    /// An error is returned when no live task has that identifier.
    pub fn stop(&mut self, uuid: &Uuid, now: Duration) -> Result<()> {
        let handle = self
            .scheduler
            .find(uuid)
            .ok_or_else(|| Error::new(ErrorKind::Protocol, "Could not find task"))?;
        self.scheduler.disable(handle, now)
    }

    /// Lists every task which is not being removed.
    #[must_use]
    pub fn status(&self) -> StatusReport<'static> {
        StatusReport {
            tasks: self
                .scheduler
                .iter()
                .filter(|info| info.state != TaskState::Disabled)
                .map(|info| TaskStatus {
                    task: info.uuid,
                    kind: Cow::Borrowed(if info.uuid.is_some() {
                        info.type_name
                    } else {
                        SYSTEM_TASK_TYPE
                    }),
                })
                .collect(),
        }
    }

    /// Runs the scheduler once.
    ///
    /// Returns the tasks dropped at the end of the tick.
    pub fn tick(&mut self, clock: &dyn Clock) -> Vec<RemovedTask> {
        self.scheduler.tick(clock)
    }

    /// Processes a batch of commands.
    ///
    /// Every `start` item produces a result. A `stop` item produces a result
    /// only on failure: a stopped task is reported once it has been removed,
    /// see [`TaskController::removal_results`]. A status report is returned
    /// when requested.
    pub fn handle(
        &mut self,
        commands: &TaskCommands,
        env: &TaskEnv<'_>,
    ) -> (ActionResults, Option<StatusReport<'static>>) {
        let mut results = ActionResults::new();

        for item in &commands.start {
            let uuid = item_uuid(item);
            let outcome = Parameters::from_value(item)
                .map_err(Error::from)
                .and_then(|parameters| self.start(&parameters, env));
            match outcome {
                Ok(id) => results.start.push(ResultEntry::success(id.to_string())),
                Err(e) => {
                    error!("Could not start task {uuid}: {e}");
                    results.start.push(ResultEntry::fail(uuid, e.to_string()));
                }
            }
        }

        for item in &commands.stop {
            let uuid = item_uuid(item);
            let outcome = Parameters::from_value(item)
                .and_then(|parameters| parameters.id())
                .map_err(Error::from)
                .and_then(|id| self.stop(&id, env.now));
            if let Err(e) = outcome {
                error!("Could not stop task {uuid}: {e}");
                results.stop.push(ResultEntry::fail(uuid, e.to_string()));
            }
        }

        let status = commands.wants_status().then(|| self.status());
        (results, status)
    }

    /// Converts removed tasks into `stop` results.
    ///
    /// System tasks are not reported.
    #[must_use]
    pub fn removal_results(removed: &[RemovedTask]) -> ActionResults {
        let mut results = ActionResults::new();
        results.stop = removed
            .iter()
            .filter_map(|task| {
                let uuid = task.uuid?.to_string();
                Some(match &task.error {
                    Some(e) => ResultEntry::fail(uuid, e.to_string()),
                    None => ResultEntry::success(uuid),
                })
            })
            .collect();
        results
    }
}
