// Module implementing the reactor core: the bipartite graph wiring tasks to
// the milestones they require and attain, and the scheduling discipline that
// drives that graph over a worker pool.

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard},
};

use crate::{
    builder::TaskBuilder,
    errors::{AggregateFailure, ReactorError, ReactorResult, WorkerFailure},
    listener::ReactorListener,
    milestone::Milestone,
    pool::WorkerPool,
    task::Task,
};

/// Hook wrapping every task invocation. Embedders replace it to install per
/// task context around the run, say a thread local naming the current task.
pub type TaskRunner = Arc<dyn Fn(&Reactor, &dyn Task) -> anyhow::Result<()> + Send + Sync>;

type NodeId = usize;

#[derive(Clone)]
enum NodeKind {
    Task(Arc<dyn Task>),
    Milestone(Milestone),
}

/// One vertex of the execution graph, either a task or a milestone. Tasks
/// list the milestones they wait on as prereqs and the milestones they feed
/// as downstream, milestones the other way around, which keeps the graph
/// bipartite by construction.
struct Node {
    kind: NodeKind,
    prereqs: HashSet<NodeId>,
    downstream: HashSet<NodeId>,
    submitted: bool,
    done: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            prereqs: HashSet::new(),
            downstream: HashSet::new(),
            submitted: false,
            done: false,
        }
    }
}

struct State {
    nodes: Vec<Node>,
    milestones: HashMap<Milestone, NodeId>,
    tasks: Vec<Arc<dyn Task>>,
    pending: usize,
    fatal: Option<anyhow::Error>,
    pool: Option<Arc<dyn WorkerPool>>,
    listener: Option<Arc<dyn ReactorListener>>,
    runner: TaskRunner,
    executed: bool,
}

struct Monitor {
    state: Mutex<State>,
    drained: Condvar,
}

/// `Reactor` executes a set of inter-dependent tasks whose ordering is
/// expressed through [`Milestone`] join points rather than task-to-task
/// edges. Tasks and milestones form a bipartite graph; `execute` drives
/// every runnable node through a caller supplied [`WorkerPool`], reports
/// progress to a [`ReactorListener`], and returns once the graph has
/// drained.
///
/// Running tasks may add more tasks, so the graph can keep growing while it
/// executes. All bookkeeping is serialized on one internal lock; task bodies
/// and listener callbacks always run outside of it.
///
/// Cloning a reactor clones a handle to the same graph.
pub struct Reactor {
    monitor: Arc<Monitor>,
}

impl Clone for Reactor {
    fn clone(&self) -> Self {
        Self {
            monitor: self.monitor.clone(),
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            monitor: Arc::new(Monitor {
                state: Mutex::new(State {
                    nodes: Vec::new(),
                    milestones: HashMap::new(),
                    tasks: Vec::new(),
                    pending: 0,
                    fatal: None,
                    pool: None,
                    listener: None,
                    runner: Arc::new(|reactor, task| task.run(reactor)),
                    executed: false,
                }),
                drained: Condvar::new(),
            }),
        }
    }

    /// Builds a reactor seeded by a single builder.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Discovery`] when the builder fails.
    pub fn from_builder(builder: &dyn TaskBuilder) -> ReactorResult<Self> {
        Self::from_builders([builder])
    }

    /// Builds a reactor seeded by several builders, consulted in order. Each
    /// builder observes the reactor as it stands, so builders may register
    /// extra work directly besides returning tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Discovery`] with the first builder failure.
    pub fn from_builders<'a, I>(builders: I) -> ReactorResult<Self>
    where
        I: IntoIterator<Item = &'a dyn TaskBuilder>,
    {
        let reactor = Self::new();
        for builder in builders {
            let tasks = builder
                .discover_tasks(&reactor)
                .map_err(ReactorError::Discovery)?;
            reactor.add_all(tasks);
        }
        Ok(reactor)
    }

    /// Number of registered tasks. Milestone nodes are not counted.
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().tasks.len()
    }

    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered tasks in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    #[must_use]
    pub fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.state().tasks.clone()
    }

    /// Replaces the hook every task is invoked through. The default simply
    /// calls `task.run(reactor)`.
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    pub fn set_task_runner<F>(&self, runner: F)
    where
        F: Fn(&Reactor, &dyn Task) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.state().runner = Arc::new(runner);
    }

    /// Registers a single task. Shorthand for a one element [`Self::add_all`].
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    pub fn add<T: Task + 'static>(&self, task: T) {
        self.add_all([Arc::new(task) as Arc<dyn Task>]);
    }

    /// Registers a batch of tasks atomically: every node in the batch is
    /// materialized and wired before anything new is scheduled, so a task
    /// cannot complete ahead of a sibling whose edges are not in place yet.
    ///
    /// May be called before execution or from inside a running task. Newly
    /// runnable nodes are scheduled right away, and every known milestone is
    /// retried because the batch may have changed its prerequisite
    /// structure, or introduced it as a brand new source.
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    pub fn add_all<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = Arc<dyn Task>>,
    {
        let mut state = self.state();

        let mut fresh = Vec::new();
        for task in tasks {
            fresh.push(Self::wire_task(&mut state, task));
        }

        for id in fresh {
            self.try_run(&mut state, id);
        }

        let milestone_nodes: Vec<NodeId> = state.milestones.values().copied().collect();
        for id in milestone_nodes {
            self.try_run(&mut state, id);
        }
    }

    /// Runs the graph to completion. Every node without prerequisites is
    /// handed to `pool` immediately; each completion schedules whatever it
    /// unblocked. The calling thread blocks until no submitted work remains.
    ///
    /// A reactor executes once; the pool and listener are dropped again
    /// before this returns.
    ///
    /// # Errors
    ///
    /// - [`ReactorError::AlreadyExecuted`] when invoked a second time.
    /// - [`ReactorError::Aborted`] when a fatal task failure or a listener
    ///   failure was recorded; carries the original cause.
    ///
    /// # Panics
    ///
    /// Panics if the reactor lock is poisoned.
    pub fn execute<P, L>(&self, pool: P, listener: L) -> ReactorResult<()>
    where
        P: WorkerPool + 'static,
        L: ReactorListener + 'static,
    {
        let mut state = self.state();
        if state.executed {
            return Err(ReactorError::AlreadyExecuted);
        }
        state.executed = true;
        state.pool = Some(Arc::new(pool));
        state.listener = Some(Arc::new(listener));

        tracing::debug!("Executing reactor holding {} tasks", state.tasks.len());

        // sources first; everything else follows from completions.
        for id in 0..state.nodes.len() {
            self.try_run(&mut state, id);
        }

        while state.pending > 0 {
            state = self.monitor.drained.wait(state).unwrap();
        }

        state.pool = None;
        state.listener = None;
        let fatal = state.fatal.take();
        drop(state);

        match fatal {
            Some(cause) => Err(ReactorError::Aborted(cause)),
            None => Ok(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.monitor.state.lock().unwrap()
    }

    /// Creates the node for `task` and wires it to the nodes of every
    /// milestone it requires or attains, creating those on first sight.
    fn wire_task(state: &mut State, task: Arc<dyn Task>) -> NodeId {
        let id = state.nodes.len();
        state.nodes.push(Node::new(NodeKind::Task(task.clone())));

        for milestone in task.requires() {
            let upstream = Self::milestone_node(state, milestone);
            state.nodes[id].prereqs.insert(upstream);
            state.nodes[upstream].downstream.insert(id);
        }

        for milestone in task.attains() {
            let downstream = Self::milestone_node(state, milestone);
            state.nodes[downstream].prereqs.insert(id);
            state.nodes[id].downstream.insert(downstream);
        }

        tracing::debug!("Registered task: {}", task.display_name());
        state.tasks.push(task);
        id
    }

    fn milestone_node(state: &mut State, milestone: Milestone) -> NodeId {
        if let Some(id) = state.milestones.get(&milestone) {
            return *id;
        }

        let id = state.nodes.len();
        state
            .nodes
            .push(Node::new(NodeKind::Milestone(milestone.clone())));
        state.milestones.insert(milestone, id);
        id
    }

    /// Submits the node when it can run: a pool is installed, no fatal
    /// failure was recorded, the node was never submitted, and every
    /// prerequisite is done. Caller holds the reactor lock; the pool submit
    /// happens under it, which is safe because pools never run work on the
    /// submitting thread.
    fn try_run(&self, state: &mut State, id: NodeId) {
        let Some(pool) = state.pool.clone() else {
            return;
        };
        if state.fatal.is_some() {
            return;
        }

        {
            let node = &state.nodes[id];
            if node.submitted {
                return;
            }
            if !node.prereqs.iter().all(|prereq| state.nodes[*prereq].done) {
                return;
            }
        }

        state.nodes[id].submitted = true;
        state.pending += 1;

        match &state.nodes[id].kind {
            NodeKind::Task(task) => {
                tracing::debug!("Submitting task to pool: {}", task.display_name());
            }
            NodeKind::Milestone(milestone) => {
                tracing::debug!("Submitting milestone to pool: {}", milestone);
            }
        }

        let reactor = self.clone();
        pool.submit(Box::new(move || reactor.run_node(id)));
    }

    /// Worker thread entry: runs the node action outside the lock, then
    /// folds the outcome back into the graph under it.
    fn run_node(&self, id: NodeId) {
        let (kind, listener, runner) = {
            let state = self.state();
            (
                state.nodes[id].kind.clone(),
                state
                    .listener
                    .clone()
                    .expect("listener should be installed while work is in flight"),
                state.runner.clone(),
            )
        };

        let outcome = match kind {
            NodeKind::Task(task) => self.run_task_action(task.as_ref(), listener.as_ref(), &runner),
            NodeKind::Milestone(milestone) => {
                Self::run_milestone_action(&milestone, listener.as_ref())
            }
        };

        let mut state = self.state();
        state.nodes[id].done = true;

        if let Err(failure) = outcome {
            if state.fatal.is_none() {
                tracing::error!("Recording fatal reactor failure: {}", failure.0);
                state.fatal = Some(failure.into_inner());
            } else {
                tracing::error!("Dropping fatal failure recorded after the first: {}", failure.0);
            }
        }

        if state.fatal.is_none() {
            let downstream: Vec<NodeId> = state.nodes[id].downstream.iter().copied().collect();
            for next in downstream {
                self.try_run(&mut state, next);
            }
        }

        state.pending -= 1;
        self.monitor.drained.notify_all();
    }

    fn run_milestone_action(
        milestone: &Milestone,
        listener: &dyn ReactorListener,
    ) -> Result<(), WorkerFailure> {
        tracing::debug!("Milestone attained: {}", milestone);
        guard(|| listener.on_milestone_attained(milestone)).map_err(WorkerFailure)
    }

    fn run_task_action(
        &self,
        task: &dyn Task,
        listener: &dyn ReactorListener,
        runner: &TaskRunner,
    ) -> Result<(), WorkerFailure> {
        guard(|| listener.on_task_started(task)).map_err(WorkerFailure)?;

        tracing::debug!("Running task: {}", task.display_name());
        let invoke = runner.as_ref();
        match guard(|| invoke(self, task)) {
            Ok(()) => {
                guard(|| listener.on_task_completed(task)).map_err(WorkerFailure)?;
                Ok(())
            }
            Err(task_error) => {
                let fatal = task.failure_is_fatal();
                match guard(|| listener.on_task_failed(task, &task_error, fatal)) {
                    Ok(()) if fatal => Err(WorkerFailure(task_error)),
                    Ok(()) => {
                        tracing::debug!(
                            "Continuing past non fatal failure of task: {}",
                            task.display_name()
                        );
                        Ok(())
                    }
                    // a failing failure report aborts the run even for a non
                    // fatal task; the task error rides along suppressed.
                    Err(listener_error) => Err(WorkerFailure(AggregateFailure::absorb(
                        listener_error,
                        task_error,
                    ))),
                }
            }
        }
    }
}

/// Runs user supplied code, converting a panic into an ordinary error so the
/// graph bookkeeping survives whatever that code does.
fn guard(call: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("opaque panic payload")
    }
}
