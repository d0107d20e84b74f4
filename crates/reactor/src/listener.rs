// Module implementing the progress callback protocol reactors report through.

use std::sync::Arc;

use crate::errors::AggregateFailure;
use crate::milestone::Milestone;
use crate::task::Task;

/// Callbacks fired while a reactor drives its graph. Events for independent
/// nodes may arrive concurrently on different worker threads; a listener
/// that needs serialization must provide its own.
///
/// Every hook defaults to doing nothing. Returning an error from any hook is
/// fatal to the reactor: scheduling halts and `execute` reports the error.
pub trait ReactorListener: Send + Sync {
    /// A task is about to run on a worker thread.
    ///
    /// # Errors
    ///
    /// Failing here aborts the reactor; the task body does not run.
    fn on_task_started(&self, _task: &dyn Task) -> anyhow::Result<()> {
        Ok(())
    }

    /// A task finished without error.
    ///
    /// # Errors
    ///
    /// Failing here aborts the reactor.
    fn on_task_completed(&self, _task: &dyn Task) -> anyhow::Result<()> {
        Ok(())
    }

    /// A task finished with an error. `fatal` tells whether the reactor will
    /// abort over it or carry on as though the task had succeeded.
    ///
    /// # Errors
    ///
    /// Failing here aborts the reactor even for a non fatal task; the task
    /// error rides along as a suppressed entry of the reported failure.
    fn on_task_failed(
        &self,
        _task: &dyn Task,
        _error: &anyhow::Error,
        _fatal: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every task contributing to the milestone has finished.
    ///
    /// # Errors
    ///
    /// Failing here aborts the reactor.
    fn on_milestone_attained(&self, _milestone: &Milestone) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Listener that ignores every event.
pub struct Noop;

/// Ready made instance for call sites that do not care about progress.
pub const NOOP: Noop = Noop;

impl ReactorListener for Noop {}

impl<L: ReactorListener + ?Sized> ReactorListener for Arc<L> {
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.as_ref().on_task_started(task)
    }

    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.as_ref().on_task_completed(task)
    }

    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        fatal: bool,
    ) -> anyhow::Result<()> {
        self.as_ref().on_task_failed(task, error, fatal)
    }

    fn on_milestone_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        self.as_ref().on_milestone_attained(milestone)
    }
}

/// `ListenerAggregate` fans every event out to a list of listeners in
/// registration order. Every listener sees every event even when earlier
/// ones fail: the first failure is kept and each later failure rides along
/// as a suppressed entry, so no report is lost.
pub struct ListenerAggregate {
    listeners: Vec<Arc<dyn ReactorListener>>,
}

impl ListenerAggregate {
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn ReactorListener>>) -> Self {
        Self { listeners }
    }

    fn deliver<F>(&self, mut event: F) -> anyhow::Result<()>
    where
        F: FnMut(&dyn ReactorListener) -> anyhow::Result<()>,
    {
        let mut failures = Vec::new();
        for listener in &self.listeners {
            if let Err(error) = event(listener.as_ref()) {
                failures.push(error);
            }
        }

        let mut failures = failures.into_iter();
        let Some(first) = failures.next() else {
            return Ok(());
        };

        let rest: Vec<_> = failures.collect();
        if rest.is_empty() {
            return Err(first);
        }

        let mut aggregate = AggregateFailure::new(first);
        for error in rest {
            aggregate.suppress(error);
        }
        Err(anyhow::Error::new(aggregate))
    }
}

impl ReactorListener for ListenerAggregate {
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.deliver(|listener| listener.on_task_started(task))
    }

    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.deliver(|listener| listener.on_task_completed(task))
    }

    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        fatal: bool,
    ) -> anyhow::Result<()> {
        self.deliver(|listener| listener.on_task_failed(task, error, fatal))
    }

    fn on_milestone_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        self.deliver(|listener| listener.on_milestone_attained(milestone))
    }
}
