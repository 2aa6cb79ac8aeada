//! Certificate candidates awaiting an actor's choice.
//!
//! Workflows are keyed by (actor, job) and live only in this process. A new
//! certificate run replaces any workflow already held for the same key.

use std::{collections::HashMap, sync::Arc};

use surveydesk_core::{EpcCertificate, Selection, SelectionError, SelectionWorkflow, WorkflowState};
use tokio::sync::Mutex;
use uuid::Uuid;

type Key = (String, Uuid);

/// A chosen certificate, together with the workflow it was taken from.
#[derive(Debug)]
pub struct Claim {
    pub certificate: EpcCertificate,
    workflow: SelectionWorkflow<EpcCertificate>,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionRegistry {
    inner: Arc<Mutex<HashMap<Key, SelectionWorkflow<EpcCertificate>>>>,
}

impl SelectionRegistry {
    /// Start a fresh workflow for `(actor_id, job_id)` holding `candidates`.
    ///
    /// Returns the resulting state. An empty offer ends the workflow
    /// immediately and nothing is held.
    pub async fn offer(
        &self,
        actor_id: &str,
        job_id: Uuid,
        candidates: Vec<EpcCertificate>,
    ) -> Result<WorkflowState, SelectionError> {
        let mut workflow = SelectionWorkflow::requested();
        let state = workflow.offer(candidates)?;

        let key = (actor_id.to_owned(), job_id);
        let mut held = self.inner.lock().await;
        if state == WorkflowState::AwaitingSelection {
            held.insert(key, workflow);
        } else {
            held.remove(&key);
        }
        Ok(state)
    }

    /// Resolve `selection` and take the workflow out of the registry.
    ///
    /// Lookup, selection and removal happen under one lock, so of two
    /// concurrent selections on the same workflow only one gets a claim. A
    /// rejected selection leaves the workflow held for another attempt.
    pub async fn claim(
        &self,
        actor_id: &str,
        job_id: Uuid,
        selection: Selection<EpcCertificate>,
    ) -> Result<Option<Claim>, SelectionError> {
        let key = (actor_id.to_owned(), job_id);
        let mut held = self.inner.lock().await;
        let Some(workflow) = held.remove(&key) else {
            return Ok(None);
        };

        let mut attempt = workflow.clone();
        match attempt.select(selection) {
            Ok(certificate) => Ok(Some(Claim {
                certificate,
                workflow,
            })),
            Err(e) => {
                held.insert(key, workflow);
                Err(e)
            }
        }
    }

    /// Put a claimed workflow back after its choice could not be stored.
    ///
    /// A workflow started since the claim wins; the claimed one is dropped.
    pub async fn restore(&self, actor_id: &str, job_id: Uuid, claim: Claim) {
        self.inner
            .lock()
            .await
            .entry((actor_id.to_owned(), job_id))
            .or_insert(claim.workflow);
    }

    /// Cancel and drop the workflow. Returns `false` if none was held.
    pub async fn cancel(&self, actor_id: &str, job_id: Uuid) -> bool {
        match self.inner.lock().await.remove(&(actor_id.to_owned(), job_id)) {
            Some(mut workflow) => workflow.cancel().is_ok(),
            None => false,
        }
    }

    /// Candidates currently offered to the actor, if a workflow is held.
    pub async fn pending(&self, actor_id: &str, job_id: Uuid) -> Option<Vec<EpcCertificate>> {
        self.inner
            .lock()
            .await
            .get(&(actor_id.to_owned(), job_id))
            .map(|wf| wf.candidates().as_slice().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn cert(address: &str) -> EpcCertificate {
        EpcCertificate {
            address: address.to_string(),
            current_energy_rating: "C".to_string(),
            inspection_date: "2024-01-01".to_string(),
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn empty_offer_holds_nothing() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        let state = registry.offer("alice", job, Vec::new()).await.unwrap();
        assert_eq!(state, WorkflowState::Cancelled);
        assert!(registry.pending("alice", job).await.is_none());
    }

    #[tokio::test]
    async fn workflows_are_scoped_to_actor_and_job() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry.offer("alice", job, vec![cert("1 Road")]).await.unwrap();

        assert!(registry.pending("bob", job).await.is_none());
        assert!(registry.pending("alice", Uuid::new_v4()).await.is_none());
        assert_eq!(registry.pending("alice", job).await.map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn claim_takes_the_workflow() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry
            .offer("alice", job, vec![cert("1 Road"), cert("2 Road")])
            .await
            .unwrap();

        let claim = registry
            .claim("alice", job, Selection::Index(1))
            .await
            .unwrap()
            .expect("workflow held");
        assert_eq!(claim.certificate.address, "2 Road");
        assert!(registry.pending("alice", job).await.is_none());
        assert!(registry
            .claim("alice", job, Selection::Index(0))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejected_selection_keeps_the_workflow() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry.offer("alice", job, vec![cert("1 Road")]).await.unwrap();

        let err = registry
            .claim("alice", job, Selection::Index(3))
            .await
            .unwrap_err();
        assert_eq!(err, SelectionError::IndexOutOfRange { index: 3, len: 1 });
        assert_eq!(registry.pending("alice", job).await.map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn concurrent_claims_yield_one_winner() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry
            .offer("alice", job, vec![cert("1 Road"), cert("2 Road"), cert("3 Road")])
            .await
            .unwrap();

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.claim("alice", job, Selection::Index(i)).await
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn restore_returns_workflow_to_an_empty_slot() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry.offer("alice", job, vec![cert("1 Road")]).await.unwrap();

        let claim = registry
            .claim("alice", job, Selection::Index(0))
            .await
            .unwrap()
            .expect("workflow held");
        registry.restore("alice", job, claim).await;

        let held = registry.pending("alice", job).await.expect("restored");
        assert_eq!(held[0].address, "1 Road");
    }

    #[tokio::test]
    async fn restore_does_not_replace_a_newer_run() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry.offer("alice", job, vec![cert("old")]).await.unwrap();

        let claim = registry
            .claim("alice", job, Selection::Index(0))
            .await
            .unwrap()
            .expect("workflow held");
        registry
            .offer("alice", job, vec![cert("new 1"), cert("new 2")])
            .await
            .unwrap();
        registry.restore("alice", job, claim).await;

        let held = registry.pending("alice", job).await.expect("newer run held");
        let addresses: Vec<&str> = held.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, ["new 1", "new 2"]);
    }

    #[tokio::test]
    async fn rerun_replaces_held_candidates() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        registry.offer("alice", job, vec![cert("old")]).await.unwrap();
        registry.offer("alice", job, vec![cert("new")]).await.unwrap();

        let held = registry.pending("alice", job).await.unwrap();
        assert_eq!(held[0].address, "new");
    }

    #[tokio::test]
    async fn cancel_reports_whether_anything_was_held() {
        let registry = SelectionRegistry::default();
        let job = Uuid::new_v4();
        assert!(!registry.cancel("alice", job).await);

        registry.offer("alice", job, vec![cert("1 Road")]).await.unwrap();
        assert!(registry.cancel("alice", job).await);
        assert!(registry.pending("alice", job).await.is_none());
    }
}
