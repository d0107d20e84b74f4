// Module implementing task discovery for seeding a reactor.

use std::sync::Arc;

use crate::reactor::Reactor;
use crate::task::Task;

/// `TaskBuilder` contributes a batch of tasks when a reactor is constructed.
/// Builders get to observe the reactor they are seeding, so one can register
/// follow up work directly where that is more natural than returning it.
pub trait TaskBuilder {
    /// # Errors
    ///
    /// A failing discovery surfaces from the reactor constructor as
    /// [`crate::ReactorError::Discovery`].
    fn discover_tasks(&self, reactor: &Reactor) -> anyhow::Result<Vec<Arc<dyn Task>>>;
}

/// Builder that discovers nothing.
pub struct Empty;

/// Ready made instance of the [`Empty`] builder.
pub const EMPTY: Empty = Empty;

impl TaskBuilder for Empty {
    fn discover_tasks(&self, _reactor: &Reactor) -> anyhow::Result<Vec<Arc<dyn Task>>> {
        Ok(Vec::new())
    }
}

/// Wraps an already materialized collection of tasks as a builder.
#[must_use]
pub fn from_tasks(tasks: Vec<Arc<dyn Task>>) -> FromTasks {
    FromTasks(tasks)
}

pub struct FromTasks(Vec<Arc<dyn Task>>);

impl TaskBuilder for FromTasks {
    fn discover_tasks(&self, _reactor: &Reactor) -> anyhow::Result<Vec<Arc<dyn Task>>> {
        Ok(self.0.clone())
    }
}

/// Merges several builders into one, preserving registration order. The
/// first failing builder wins; later builders are not consulted.
#[must_use]
pub fn union(builders: Vec<Box<dyn TaskBuilder>>) -> Union {
    Union(builders)
}

pub struct Union(Vec<Box<dyn TaskBuilder>>);

impl TaskBuilder for Union {
    fn discover_tasks(&self, reactor: &Reactor) -> anyhow::Result<Vec<Arc<dyn Task>>> {
        let mut discovered = Vec::new();
        for builder in &self.0 {
            discovered.extend(builder.discover_tasks(reactor)?);
        }
        Ok(discovered)
    }
}
