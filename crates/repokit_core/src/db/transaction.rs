//! Transaction nesting state machine.
//!
//! # Invariants
//! - `level == 0` means idle; physical BEGIN happens only on 0 → 1.
//! - Physical COMMIT happens only on 1 → 0.
//! - `commit` at level 0 is a programming error and is rejected.
//! - `rollback` always resets to 0.

use crate::error::{DatabaseError, DbResult};
use serde::Serialize;

/// Physical transaction statements issued over a database's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionCounters {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

/// What the caller must send to the server for one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Physical {
    Send,
    Skip,
}

#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    level: u32,
    counters: TransactionCounters,
}

impl TransactionState {
    pub(crate) fn level(&self) -> u32 {
        self.level
    }

    pub(crate) fn counters(&self) -> TransactionCounters {
        self.counters
    }

    /// Decides whether `begin` needs a physical BEGIN.
    pub(crate) fn plan_begin(&self) -> Physical {
        if self.level == 0 {
            Physical::Send
        } else {
            Physical::Skip
        }
    }

    /// Applies a successful begin.
    pub(crate) fn began(&mut self, physical: Physical) {
        if physical == Physical::Send {
            self.counters.begins += 1;
        }
        self.level += 1;
    }

    /// Decides whether `commit` needs a physical COMMIT.
    pub(crate) fn plan_commit(&self) -> DbResult<Physical> {
        match self.level {
            0 => Err(DatabaseError::transaction_failed(
                "commit called with no active transaction",
            )
            .with_context("transaction_level", "0")),
            1 => Ok(Physical::Send),
            _ => Ok(Physical::Skip),
        }
    }

    /// Applies a successful commit.
    pub(crate) fn committed(&mut self, physical: Physical) {
        if physical == Physical::Send {
            self.counters.commits += 1;
        }
        self.level = self.level.saturating_sub(1);
    }

    /// Forces the state back to idle; returns the level that was abandoned.
    pub(crate) fn reset(&mut self, physical: Physical) -> u32 {
        if physical == Physical::Send {
            self.counters.rollbacks += 1;
        }
        std::mem::take(&mut self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::{Physical, TransactionState};
    use crate::error::ErrorKind;

    #[test]
    fn nested_begin_commit_sends_physical_only_at_outer_edges() {
        let mut state = TransactionState::default();

        let outer = state.plan_begin();
        assert_eq!(outer, Physical::Send);
        state.began(outer);
        let inner = state.plan_begin();
        assert_eq!(inner, Physical::Skip);
        state.began(inner);
        assert_eq!(state.level(), 2);

        let inner_commit = state.plan_commit().unwrap();
        assert_eq!(inner_commit, Physical::Skip);
        state.committed(inner_commit);
        let outer_commit = state.plan_commit().unwrap();
        assert_eq!(outer_commit, Physical::Send);
        state.committed(outer_commit);

        assert_eq!(state.level(), 0);
        assert_eq!(state.counters().begins, 1);
        assert_eq!(state.counters().commits, 1);
    }

    #[test]
    fn commit_at_level_zero_is_rejected() {
        let state = TransactionState::default();
        let err = state.plan_commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    }

    #[test]
    fn reset_returns_abandoned_level() {
        let mut state = TransactionState::default();
        state.began(Physical::Send);
        state.began(Physical::Skip);
        assert_eq!(state.reset(Physical::Send), 2);
        assert_eq!(state.level(), 0);
        assert_eq!(state.counters().rollbacks, 1);
    }
}
