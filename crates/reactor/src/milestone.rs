// Module implementing milestone identities, the join points between tasks.

use std::fmt::{self, Display};

/// `Milestone` names a synchronization point in the execution graph. A
/// milestone is attained once every task contributing to it has finished,
/// and a milestone nobody contributes to is attained immediately.
///
/// Milestones are plain values: two milestones with the same name are the
/// same join point, and the reactor interns them by equality when wiring
/// its graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Milestone(String);

impl Milestone {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self(name.to_string())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Milestone({})", self.0)
    }
}

impl From<&str> for Milestone {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Milestone {
    fn from(name: String) -> Self {
        Self(name)
    }
}
