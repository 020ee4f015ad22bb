//! Outcome of an idempotent "ensure" step.
//!
//! Every check-then-act operation returns `Result<Transition, E>`: the `Ok`
//! side says whether the step changed anything, the `Err` side is the failed
//! branch. Call sites log both outcomes and tests assert on them directly.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The desired state already held; nothing was changed.
    AlreadyDone,
    /// The step mutated external state to reach the desired state.
    Performed,
}

impl Transition {
    pub fn performed(&self) -> bool {
        matches!(self, Transition::Performed)
    }

    /// Combine two outcomes; performed if either performed.
    pub fn and(self, other: Transition) -> Transition {
        if self.performed() || other.performed() {
            Transition::Performed
        } else {
            Transition::AlreadyDone
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::AlreadyDone => write!(f, "already_done"),
            Transition::Performed => write!(f, "performed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_combines_outcomes() {
        assert_eq!(Transition::AlreadyDone.and(Transition::AlreadyDone), Transition::AlreadyDone);
        assert_eq!(Transition::AlreadyDone.and(Transition::Performed), Transition::Performed);
        assert_eq!(Transition::Performed.and(Transition::AlreadyDone), Transition::Performed);
    }

    #[test]
    fn test_display() {
        assert_eq!(Transition::Performed.to_string(), "performed");
        assert_eq!(Transition::AlreadyDone.to_string(), "already_done");
    }
}
