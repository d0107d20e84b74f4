// Module implementing the failure surface of the reactor.

use std::fmt;

use thiserror::Error;

pub type ReactorResult<T> = anyhow::Result<T, ReactorError>;

/// The failures a reactor can surface to its caller, from seeding through
/// execution.
#[derive(Error, Debug)]
pub enum ReactorError {
    /// A reactor already ran once; it cannot be reused.
    #[error("reactor was already executed and cannot run a second time")]
    AlreadyExecuted,

    /// A task builder failed while seeding the reactor.
    #[error("task discovery failed: {0}")]
    Discovery(anyhow::Error),

    /// A fatal failure was recorded during execution. Carries the original
    /// cause, which may be an [`AggregateFailure`] when listeners also failed.
    #[error("reactor aborted: {0}")]
    Aborted(anyhow::Error),
}

impl ReactorError {
    /// Underlying cause for the variants that carry one.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            ReactorError::AlreadyExecuted => None,
            ReactorError::Discovery(cause) | ReactorError::Aborted(cause) => Some(cause),
        }
    }
}

/// Failure bundling every error raised while handling a single event: the
/// first error raised plus each later one, kept in arrival order so no
/// report is lost.
#[derive(Debug)]
pub struct AggregateFailure {
    first: anyhow::Error,
    suppressed: Vec<anyhow::Error>,
}

impl AggregateFailure {
    #[must_use]
    pub fn new(first: anyhow::Error) -> Self {
        Self {
            first,
            suppressed: Vec::new(),
        }
    }

    /// Attaches a later failure without losing the first.
    pub fn suppress(&mut self, error: anyhow::Error) {
        self.suppressed.push(error);
    }

    /// The error that started the failure.
    #[must_use]
    pub fn first(&self) -> &anyhow::Error {
        &self.first
    }

    /// Every error attached after the first, oldest first.
    #[must_use]
    pub fn suppressed(&self) -> &[anyhow::Error] {
        &self.suppressed
    }

    /// Folds `earlier` into `primary`: when `primary` already aggregates
    /// failures the earlier error becomes its frontmost suppressed entry,
    /// otherwise a fresh aggregate forms around `primary`.
    #[must_use]
    pub fn absorb(primary: anyhow::Error, earlier: anyhow::Error) -> anyhow::Error {
        match primary.downcast::<AggregateFailure>() {
            Ok(mut aggregate) => {
                aggregate.suppressed.insert(0, earlier);
                anyhow::Error::new(aggregate)
            }
            Err(primary) => {
                let mut aggregate = AggregateFailure::new(primary);
                aggregate.suppress(earlier);
                anyhow::Error::new(aggregate)
            }
        }
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

/// Carries a failure raised on a worker thread back into the scheduling
/// loop, where it lands in the fatal slot and later surfaces from `execute`
/// as [`ReactorError::Aborted`].
#[derive(Debug)]
pub(crate) struct WorkerFailure(pub(crate) anyhow::Error);

impl WorkerFailure {
    pub(crate) fn into_inner(self) -> anyhow::Error {
        self.0
    }
}
