use indexmap::IndexMap;

use tracing::warn;

use fieldnode::parameters::Parameters;

use crate::error::{Error, Result};

use super::{InvalidTask, Task, TaskEnv};

/// Builds a task from its parameters.
pub type TaskConstructor = fn(&Parameters<'_>, &TaskEnv<'_>) -> Result<Box<dyn Task>>;

/// The table of every task type a device can start.
#[derive(Default)]
pub struct TaskFactory {
    constructors: IndexMap<&'static str, TaskConstructor>,
}

impl TaskFactory {
    /// Creates an empty [`TaskFactory`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under a type name.
    ///
    /// Returns `false`, keeping the first constructor, when the name is
    /// already taken.
    pub fn register(&mut self, type_name: &'static str, constructor: TaskConstructor) -> bool {
        if self.constructors.contains_key(type_name) {
            warn!("Task type {type_name} is already registered");
            return false;
        }
        let _ = self.constructors.insert(type_name, constructor);
        true
    }

    /// Builds a task from its parameters.
    ///
    /// A missing or unknown type, or a failing constructor, produces an
    /// [`InvalidTask`] carrying the reason.
    #[must_use]
    pub fn create(&self, parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Box<dyn Task> {
        match self.build(parameters, env) {
            Ok(task) => task,
            Err(e) => Box::new(InvalidTask::new(e)),
        }
    }

    /// Returns the registered type names, in registration order.
    pub fn factory_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    fn build(&self, parameters: &Parameters<'_>, env: &TaskEnv<'_>) -> Result<Box<dyn Task>> {
        let type_name = parameters.type_name()?;
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| Error::construction(format!("Could not find the factory type: {type_name}")))?;

        constructor(parameters, env)
    }
}

impl std::fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
