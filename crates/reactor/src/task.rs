// Module implementing the task contract and the fluent task definition.

use crate::milestone::Milestone;
use crate::reactor::Reactor;

/// A unit of work in the execution graph. A task declares the milestones it
/// must wait for and the milestones it contributes to; the reactor wires
/// both into its graph and runs the task once every required milestone has
/// been attained.
///
/// Tasks are shared across worker threads as `Arc<dyn Task>`, so
/// implementations must be `Send + Sync`.
pub trait Task: Send + Sync {
    /// Milestones that must be attained before this task may start.
    fn requires(&self) -> Vec<Milestone>;

    /// Milestones this task contributes to. Each of them is attained once
    /// every task contributing to it has finished.
    fn attains(&self) -> Vec<Milestone>;

    /// Human readable name used for progress reporting.
    fn display_name(&self) -> String;

    /// When true, a failure of this task aborts the whole reactor. When
    /// false the failure is reported and the graph proceeds as though the
    /// task had succeeded.
    fn failure_is_fatal(&self) -> bool {
        true
    }

    /// The work itself. Runs on a worker thread, outside the reactor lock,
    /// so the body is free to call back into the reactor and add more tasks.
    ///
    /// # Errors
    ///
    /// Any returned error is reported to the listener and, for fatal tasks,
    /// aborts the reactor.
    fn run(&self, reactor: &Reactor) -> anyhow::Result<()>;
}

/// Body signature for tasks defined fluently through [`TaskDef`].
pub type TaskBody = Box<dyn Fn(&Reactor) -> anyhow::Result<()> + Send + Sync>;

/// `TaskDef` builds a task fluently: name a body, then chain the milestones
/// it requires and attains.
///
/// Every definition also attains an implicit milestone named after the task
/// itself, its handle, so one definition can be wired straight after another
/// with `.requires(&earlier)` and no explicitly named milestone in between.
pub struct TaskDef {
    name: String,
    requires: Vec<Milestone>,
    attains: Vec<Milestone>,
    fatal: bool,
    body: TaskBody,
}

impl TaskDef {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&Reactor) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            requires: Vec::new(),
            attains: Vec::new(),
            fatal: true,
            body: Box::new(body),
        }
    }

    /// Adds a milestone this task must wait for. Accepts milestone names and
    /// other task definitions (through their handle).
    #[must_use]
    pub fn requires<M: Into<Milestone>>(mut self, milestone: M) -> Self {
        self.requires.push(milestone.into());
        self
    }

    /// Adds a milestone this task contributes to.
    #[must_use]
    pub fn attains<M: Into<Milestone>>(mut self, milestone: M) -> Self {
        self.attains.push(milestone.into());
        self
    }

    /// Marks a failure of this task as reportable rather than fatal.
    #[must_use]
    pub fn not_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    /// Milestone other tasks can require to run after this one.
    #[must_use]
    pub fn handle(&self) -> Milestone {
        Milestone::named(&self.name)
    }
}

impl Task for TaskDef {
    fn requires(&self) -> Vec<Milestone> {
        self.requires.clone()
    }

    fn attains(&self) -> Vec<Milestone> {
        let mut attained = self.attains.clone();
        attained.push(self.handle());
        attained
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn failure_is_fatal(&self) -> bool {
        self.fatal
    }

    fn run(&self, reactor: &Reactor) -> anyhow::Result<()> {
        (self.body)(reactor)
    }
}

impl From<&TaskDef> for Milestone {
    fn from(task: &TaskDef) -> Self {
        task.handle()
    }
}

#[cfg(test)]
mod tests {
    use crate::milestone::Milestone;
    use crate::task::{Task, TaskDef};

    #[test]
    fn task_defs_are_fatal_unless_marked_otherwise() {
        let strict = TaskDef::new("strict", |_| Ok(()));
        let relaxed = TaskDef::new("relaxed", |_| Ok(())).not_fatal();

        assert!(strict.failure_is_fatal());
        assert!(!relaxed.failure_is_fatal());
    }

    #[test]
    fn task_defs_attain_their_own_handle_besides_declared_milestones() {
        let setup = TaskDef::new("setup", |_| Ok(())).attains("disk");

        let attained = Task::attains(&setup);
        assert!(attained.contains(&Milestone::named("disk")));
        assert!(attained.contains(&Milestone::named("setup")));
    }

    #[test]
    fn task_defs_can_require_other_task_defs_directly() {
        let first = TaskDef::new("first", |_| Ok(()));
        let second = TaskDef::new("second", |_| Ok(())).requires(&first);

        assert_eq!(Task::requires(&second), vec![first.handle()]);
    }
}
