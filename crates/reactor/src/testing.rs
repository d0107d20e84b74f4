// Module for test helpers driving and observing reactors.

use std::sync::Mutex;
use std::thread;

use crate::listener::ReactorListener;
use crate::milestone::Milestone;
use crate::pool::{WorkUnit, WorkerPool};
use crate::task::Task;

/// Pool that runs every submitted unit on a freshly spawned thread.
pub struct SpawnPool;

impl WorkerPool for SpawnPool {
    fn submit(&self, work: WorkUnit) {
        thread::spawn(work);
    }
}

/// Pool feeding submitted units to a fixed set of worker threads. A single
/// worker makes executions fully deterministic, which is what most event
/// ordering tests want; more workers exercise real parallelism.
///
/// Dropping the pool closes the queue and joins every worker.
pub struct FixedPool {
    sender: Option<crossbeam::channel::Sender<WorkUnit>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl FixedPool {
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::unbounded::<WorkUnit>();

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let work_queue = receiver.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("reactor_worker_{index}"))
                    .spawn(move || {
                        while let Ok(work) = work_queue.recv() {
                            work();
                        }
                    })
                    .expect("should spawn pool worker"),
            );
        }

        Self {
            sender: Some(sender),
            workers,
        }
    }
}

impl WorkerPool for FixedPool {
    fn submit(&self, work: WorkUnit) {
        self.sender
            .as_ref()
            .expect("pool should still be accepting work")
            .send(work)
            .expect("should queue work for pool workers");
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            worker.join().expect("pool worker should exit cleanly");
        }
    }
}

/// Listener recording one line per event, in arrival order:
/// `Started <task>`, `Ended <task>`, `Failed <task> with <error>` and
/// `Attained <milestone>`. Share it as an `Arc` between the test and the
/// reactor, then assert on [`EventLog::entries`].
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<String>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded line.
    ///
    /// # Panics
    ///
    /// Panics if the log lock is poisoned.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Position of the first line equal to `line`, when present.
    ///
    /// # Panics
    ///
    /// Panics if the log lock is poisoned.
    #[must_use]
    pub fn position(&self, line: &str) -> Option<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .position(|entry| entry == line)
    }

    fn push(&self, line: String) {
        self.entries.lock().unwrap().push(line);
    }
}

impl ReactorListener for EventLog {
    fn on_task_started(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.push(format!("Started {}", task.display_name()));
        Ok(())
    }

    fn on_task_completed(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.push(format!("Ended {}", task.display_name()));
        Ok(())
    }

    fn on_task_failed(
        &self,
        task: &dyn Task,
        error: &anyhow::Error,
        _fatal: bool,
    ) -> anyhow::Result<()> {
        self.push(format!("Failed {} with {}", task.display_name(), error));
        Ok(())
    }

    fn on_milestone_attained(&self, milestone: &Milestone) -> anyhow::Result<()> {
        self.push(format!("Attained {}", milestone.name()));
        Ok(())
    }
}
