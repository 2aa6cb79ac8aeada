//! Selection workflow for providers that return several plausible records.
//!
//! A workflow lives only in the requesting actor's session. It is never
//! persisted; once committed or cancelled it is dropped and a later run
//! starts a new one.
//!
//! ```text
//! Requested --offer(n > 0)--> AwaitingSelection --select--> Committed
//!     |                              |
//!     +--offer(0) / cancel--> Cancelled <--cancel--+
//! ```

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Requested,
    AwaitingSelection,
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selection workflow is {0:?}, not awaiting a selection")]
    NotAwaiting(WorkflowState),

    #[error("candidate {index} is out of range; {len} candidates were offered")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("the selected record is not one of the offered candidates")]
    UnknownRecord,
}

/// How the actor identifies the chosen candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    /// Zero-based position in the offered candidate list.
    Index(usize),
    /// The candidate record itself; must equal one that was offered.
    Record(T),
}

/// Candidates held while the actor decides.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet<T> {
    candidates: Vec<T>,
}

impl<T> CandidateSet<T> {
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.candidates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionWorkflow<T> {
    state: WorkflowState,
    candidates: CandidateSet<T>,
}

impl<T: PartialEq> SelectionWorkflow<T> {
    #[must_use]
    pub fn requested() -> Self {
        Self {
            state: WorkflowState::Requested,
            candidates: CandidateSet {
                candidates: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    #[must_use]
    pub fn candidates(&self) -> &CandidateSet<T> {
        &self.candidates
    }

    /// Hold the provider's candidates for selection.
    ///
    /// An empty offer leaves nothing to choose, so the workflow ends as
    /// `Cancelled`. Even a single candidate waits for confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NotAwaiting`] unless the workflow is `Requested`.
    pub fn offer(&mut self, candidates: Vec<T>) -> Result<WorkflowState, SelectionError> {
        if self.state != WorkflowState::Requested {
            return Err(SelectionError::NotAwaiting(self.state));
        }
        self.state = if candidates.is_empty() {
            WorkflowState::Cancelled
        } else {
            WorkflowState::AwaitingSelection
        };
        self.candidates = CandidateSet { candidates };
        Ok(self.state)
    }

    /// Commit exactly one candidate and return it.
    ///
    /// On error the workflow is unchanged and the actor may try again.
    ///
    /// # Errors
    ///
    /// - [`SelectionError::NotAwaiting`] outside `AwaitingSelection`.
    /// - [`SelectionError::IndexOutOfRange`] for a bad index.
    /// - [`SelectionError::UnknownRecord`] when the record was never offered.
    pub fn select(&mut self, selection: Selection<T>) -> Result<T, SelectionError> {
        if self.state != WorkflowState::AwaitingSelection {
            return Err(SelectionError::NotAwaiting(self.state));
        }
        let held = &mut self.candidates.candidates;
        let position = match selection {
            Selection::Index(index) if index < held.len() => index,
            Selection::Index(index) => {
                return Err(SelectionError::IndexOutOfRange {
                    index,
                    len: held.len(),
                })
            }
            Selection::Record(record) => held
                .iter()
                .position(|c| *c == record)
                .ok_or(SelectionError::UnknownRecord)?,
        };
        let chosen = held.swap_remove(position);
        held.clear();
        self.state = WorkflowState::Committed;
        Ok(chosen)
    }

    /// Discard the workflow without choosing anything.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NotAwaiting`] if the workflow already finished.
    pub fn cancel(&mut self) -> Result<(), SelectionError> {
        match self.state {
            WorkflowState::Requested | WorkflowState::AwaitingSelection => {
                self.candidates.candidates.clear();
                self.state = WorkflowState::Cancelled;
                Ok(())
            }
            finished => Err(SelectionError::NotAwaiting(finished)),
        }
    }
}
