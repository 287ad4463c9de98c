//! Multi-session workflow orchestration
//!
//! Every session owns its own state machine and data store, keyed by id.
//! Executor runs happen without holding the session lock, so `cancel` and
//! `reset` can interleave with an in-flight stage.

use crate::errors::{HubError, HubResult};
use crate::models::{ExecutorSettings, StageId};
use crate::services::logging::log_stage_event;
use crate::workflow::executor::StageRunner;
use crate::workflow::session::{SessionSnapshot, WorkflowSession};
use crate::workflow::simulated::SimulatedStageExecutor;
use crate::workflow::transition_log::StageTransition;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

type SessionSlot = Arc<Mutex<WorkflowSession>>;

/// Orchestrator for concurrent creative sessions
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    sessions: Arc<DashMap<Uuid, SessionSlot>>,
    runner: StageRunner,
}

impl WorkflowOrchestrator {
    pub fn new(runner: StageRunner) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            runner,
        }
    }

    /// Orchestrator backed by the simulated executor
    pub fn simulated(settings: &ExecutorSettings) -> Self {
        Self::new(StageRunner::new(Arc::new(SimulatedStageExecutor::new(
            settings,
        ))))
    }

    /// Register an empty session
    pub fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions
            .insert(id, Arc::new(Mutex::new(WorkflowSession::new(id))));
        tracing::info!("Created session {}", id);
        id
    }

    /// Create a session and run its first stage on `seed`
    pub async fn begin(&self, seed: &str) -> HubResult<SessionSnapshot> {
        if seed.trim().is_empty() {
            return Err(HubError::validation("seed is required"));
        }
        let id = self.create_session();
        self.start(id, seed).await
    }

    /// Reset the session, store the seed and execute the first stage
    pub async fn start(&self, id: Uuid, seed: &str) -> HubResult<SessionSnapshot> {
        self.drive(id, |session| session.start(seed)).await
    }

    /// Execute the current stage again
    pub async fn execute_current(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.drive(id, |_| Ok(())).await
    }

    /// Confirm the current output, advance and execute the new stage
    pub async fn confirm(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.drive(id, |session| session.confirm_and_advance().map(|_| ()))
            .await
    }

    /// Move forward without executing; no-op at the last stage
    pub async fn advance(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            session.advance();
            Ok(())
        })
        .await
    }

    /// Move back one stage; no-op at the first stage
    pub async fn retreat(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            session.retreat();
            Ok(())
        })
        .await
    }

    /// Jump back to an already-visited stage
    pub async fn jump_to(&self, id: Uuid, stage: StageId) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            let from = session.current_stage();
            if session.jump_to(stage) {
                Ok(())
            } else {
                Err(HubError::InvalidTransition { from, to: stage })
            }
        })
        .await
    }

    /// Re-run the current stage with a change request, dropping later outputs
    pub async fn modify(&self, id: Uuid, note: &str) -> HubResult<SessionSnapshot> {
        self.drive(id, |session| {
            let dropped = session.modify(note)?;
            if !dropped.is_empty() {
                tracing::debug!("Session {} invalidated {:?}", session.id(), dropped);
            }
            Ok(())
        })
        .await
    }

    /// Re-run a failed current stage
    pub async fn retry(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.drive(id, |session| session.retry()).await
    }

    /// Cancel whatever is running for the session
    pub async fn cancel(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            if session.cancel("cancelled by user") {
                log_stage_event(
                    &session.id().to_string(),
                    session.current_stage(),
                    "cancelled",
                    None,
                );
            }
            Ok(())
        })
        .await
    }

    pub async fn reset(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            session.reset();
            Ok(())
        })
        .await
    }

    /// Mark the workflow finished
    pub async fn complete(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        self.mutate(id, |session| {
            session.complete()?;
            log_stage_event(
                &session.id().to_string(),
                session.current_stage(),
                "workflow_completed",
                None,
            );
            Ok(())
        })
        .await
    }

    pub async fn snapshot(&self, id: Uuid) -> HubResult<SessionSnapshot> {
        let slot = self.slot(id)?;
        let session = slot.lock().await;
        Ok(session.snapshot())
    }

    pub async fn history(&self, id: Uuid) -> HubResult<Vec<StageTransition>> {
        let slot = self.slot(id)?;
        let session = slot.lock().await;
        Ok(session.history())
    }

    /// Snapshots of every session, oldest first
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let slots: Vec<SessionSlot> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut snapshots = Vec::with_capacity(slots.len());
        for slot in slots {
            snapshots.push(slot.lock().await.snapshot());
        }
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Drop a session, cancelling any in-flight stage
    pub async fn remove(&self, id: Uuid) -> bool {
        match self.sessions.remove(&id) {
            Some((_, slot)) => {
                slot.lock().await.cancel("session removed");
                tracing::info!("Removed session {}", id);
                true
            }
            None => false,
        }
    }

    /// Register a session rebuilt from a snapshot, replacing any with the same id
    pub fn import(&self, snapshot: SessionSnapshot) -> Uuid {
        let id = snapshot.id;
        self.sessions.insert(
            id,
            Arc::new(Mutex::new(WorkflowSession::from_snapshot(snapshot))),
        );
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn slot(&self, id: Uuid) -> HubResult<SessionSlot> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HubError::not_found("Session", id.to_string()))
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> HubResult<SessionSnapshot>
    where
        F: FnOnce(&mut WorkflowSession) -> HubResult<()>,
    {
        let slot = self.slot(id)?;
        let mut session = slot.lock().await;
        apply(&mut session)?;
        Ok(session.snapshot())
    }

    /// Apply `prepare`, then execute the current stage outside the lock
    async fn drive<F>(&self, id: Uuid, prepare: F) -> HubResult<SessionSnapshot>
    where
        F: FnOnce(&mut WorkflowSession) -> HubResult<()>,
    {
        let slot = self.slot(id)?;
        let (ticket, token, upstream) = {
            let mut session = slot.lock().await;
            prepare(&mut session)?;
            session.begin_invocation()?
        };

        let session_label = id.to_string();
        log_stage_event(&session_label, ticket.stage, "started", None);
        let outcome = self.runner.run(ticket.stage, &upstream, &token).await;

        let mut session = slot.lock().await;
        match session.finish_invocation(ticket, &token, outcome) {
            Ok(_) => {
                let snapshot = session.snapshot();
                let reason = snapshot.fallback_reasons.get(&ticket.stage).map(String::as_str);
                log_stage_event(&session_label, ticket.stage, "completed", reason);
                Ok(snapshot)
            }
            Err(e) => {
                if !e.is_cancellation() {
                    log_stage_event(&session_label, ticket.stage, "failed", Some(&e.to_string()));
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("sessions", &self.sessions.len())
            .field("runner", &self.runner)
            .finish()
    }
}
