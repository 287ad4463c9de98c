//! Workflow state machine for one creative session
//!
//! A session walks the six stages in registry order. Its current stage only
//! moves one step forward (`advance`), one step back (`retreat`), or back to
//! an already-visited stage (`jump_to`). Outputs live in a [`StageDataStore`].
//!
//! Executor calls are bound to the stage and generation they were started
//! for. Navigation, reset and cancel bump the generation and cancel the
//! in-flight token, so a late result can never land on a stage the user has
//! left.

use crate::errors::{HubError, HubResult};
use crate::models::{StageId, StageOutput};
use crate::providers::{ResultSource, Sourced};
use crate::services::logging::log_stale_result;
use crate::workflow::cancellation::CancellationToken;
use crate::workflow::store::StageDataStore;
use crate::workflow::transition_log::{
    StageTransition, TransitionKind, TransitionLog, DEFAULT_HISTORY_CAPACITY,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Execution status of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StageState {
    status: StageStatus,
    error: Option<String>,
    source: Option<ResultSource>,
    fallback_reason: Option<String>,
}

/// Identifies one executor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationTicket {
    pub session: Uuid,
    pub stage: StageId,
    pub generation: u64,
}

#[derive(Debug)]
struct InFlight {
    ticket: InvocationTicket,
    token: CancellationToken,
}

/// Everything an executor may read when producing a stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamData {
    /// The one-sentence idea the session was started with
    pub seed: String,
    /// Outputs of stages before the one being executed
    pub outputs: BTreeMap<StageId, StageOutput>,
    /// Change request attached by `modify`
    pub modification: Option<String>,
}

impl UpstreamData {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            ..Self::default()
        }
    }

    pub fn output(&self, stage: StageId) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    #[serde(default)]
    pub seed: Option<String>,
    pub current_stage: StageId,
    #[serde(default)]
    pub outputs: BTreeMap<StageId, StageOutput>,
    #[serde(default)]
    pub statuses: BTreeMap<StageId, StageStatus>,
    #[serde(default)]
    pub sources: BTreeMap<StageId, ResultSource>,
    #[serde(default)]
    pub fallback_reasons: BTreeMap<StageId, String>,
    #[serde(default)]
    pub errors: BTreeMap<StageId, String>,
    #[serde(default)]
    pub stage_loading: bool,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub modification: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Completed stages out of the total, for progress display
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .statuses
            .values()
            .filter(|s| **s == StageStatus::Completed)
            .count();
        (done, StageId::COUNT)
    }

    pub fn status_of(&self, stage: StageId) -> StageStatus {
        self.statuses.get(&stage).copied().unwrap_or_default()
    }
}

/// The per-session state machine
#[derive(Debug)]
pub struct WorkflowSession {
    id: Uuid,
    seed: Option<String>,
    current: StageId,
    store: StageDataStore,
    states: BTreeMap<StageId, StageState>,
    loading: bool,
    workflow_id: Option<String>,
    modification: Option<String>,
    completed: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    history: TransitionLog,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowSession {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            seed: None,
            current: StageId::first(),
            store: StageDataStore::new(),
            states: BTreeMap::new(),
            loading: false,
            workflow_id: None,
            modification: None,
            completed: false,
            generation: 0,
            in_flight: None,
            history: TransitionLog::new(DEFAULT_HISTORY_CAPACITY),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn current_stage(&self) -> StageId {
        self.current
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn output(&self, stage: StageId) -> Option<&StageOutput> {
        self.store.get(stage)
    }

    pub fn outputs(&self) -> &StageDataStore {
        &self.store
    }

    pub fn status(&self, stage: StageId) -> StageStatus {
        self.states.get(&stage).map(|s| s.status).unwrap_or_default()
    }

    pub fn source(&self, stage: StageId) -> Option<ResultSource> {
        self.states.get(&stage).and_then(|s| s.source)
    }

    pub fn error(&self, stage: StageId) -> Option<&str> {
        self.states.get(&stage).and_then(|s| s.error.as_deref())
    }

    pub fn history(&self) -> Vec<StageTransition> {
        self.history.snapshot()
    }

    /// Reset everything, then store `seed` as the first stage's input
    pub fn start(&mut self, seed: &str) -> HubResult<()> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(HubError::validation("seed is required"));
        }
        self.clear_state("restarted");
        self.seed = Some(seed.to_string());
        self.workflow_id = Some(format!(
            "workflow-{}-{}",
            Utc::now().timestamp_millis(),
            &self.id.simple().to_string()[..8]
        ));
        self.record(TransitionKind::Start, self.current, self.current);
        Ok(())
    }

    pub fn set_stage_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.touch();
    }

    /// Write or overwrite the output of `stage`
    pub fn record_stage_output(&mut self, stage: StageId, output: StageOutput) -> HubResult<()> {
        self.store.set(stage, output)?;
        let state = self.states.entry(stage).or_default();
        state.status = StageStatus::Completed;
        state.error = None;
        self.touch();
        Ok(())
    }

    /// Move to the next stage; no-op at the last stage
    pub fn advance(&mut self) -> bool {
        match self.current.next() {
            Some(next) => {
                self.move_to(TransitionKind::Advance, next);
                true
            }
            None => false,
        }
    }

    /// Move to the previous stage; no-op at the first stage
    pub fn retreat(&mut self) -> bool {
        match self.current.prev() {
            Some(prev) => {
                self.move_to(TransitionKind::Retreat, prev);
                true
            }
            None => false,
        }
    }

    /// Jump to `stage` iff it is not after the current stage
    pub fn jump_to(&mut self, stage: StageId) -> bool {
        if stage.index() > self.current.index() {
            return false;
        }
        if stage != self.current {
            self.move_to(TransitionKind::Jump, stage);
        }
        true
    }

    /// Back to the first stage with no outputs, seed or workflow id
    pub fn reset(&mut self) {
        let from = self.current;
        self.clear_state("reset");
        self.record(TransitionKind::Reset, from, self.current);
    }

    /// Confirm the current stage's output and move on.
    ///
    /// The caller executes the returned stage straight away.
    pub fn confirm_and_advance(&mut self) -> HubResult<StageId> {
        if self.completed {
            return Err(HubError::validation("workflow is already complete"));
        }
        if !self.store.contains(self.current) {
            return Err(HubError::validation(format!(
                "stage '{}' has no output to confirm",
                self.current
            )));
        }
        if self.current.is_last() {
            return Err(HubError::validation(
                "last stage reached, use complete to finish the workflow",
            ));
        }
        self.advance();
        Ok(self.current)
    }

    /// Terminal action; only at the last stage with its output present
    pub fn complete(&mut self) -> HubResult<()> {
        if !self.current.is_last() {
            return Err(HubError::InvalidTransition {
                from: self.current,
                to: StageId::last(),
            });
        }
        if !self.store.contains(self.current) {
            return Err(HubError::validation(format!(
                "stage '{}' has no output yet",
                self.current
            )));
        }
        self.completed = true;
        self.record(TransitionKind::Complete, self.current, self.current);
        Ok(())
    }

    /// Attach a change request to the current stage and drop every later output
    pub fn modify(&mut self, note: &str) -> HubResult<Vec<StageId>> {
        self.ensure_started()?;
        let note = note.trim();
        if note.is_empty() {
            return Err(HubError::validation("modification note is required"));
        }
        self.cancel_in_flight("modified");
        self.modification = Some(note.to_string());
        self.completed = false;
        let current = self.current;
        let dropped = self.store.invalidate_after(current);
        self.states.retain(|stage, _| stage.index() <= current.index());
        self.record(TransitionKind::Modify, self.current, self.current);
        Ok(dropped)
    }

    /// Allow a failed current stage to run again
    pub fn retry(&mut self) -> HubResult<()> {
        if self.status(self.current) != StageStatus::Failed {
            return Err(HubError::validation(format!(
                "stage '{}' has not failed",
                self.current
            )));
        }
        if let Some(state) = self.states.get_mut(&self.current) {
            state.status = StageStatus::Pending;
            state.error = None;
        }
        self.record(TransitionKind::Retry, self.current, self.current);
        Ok(())
    }

    /// Cancel the in-flight invocation; `false` when nothing was running
    pub fn cancel(&mut self, reason: &str) -> bool {
        if self.in_flight.is_none() {
            return false;
        }
        self.cancel_in_flight(reason);
        self.record(TransitionKind::Cancel, self.current, self.current);
        true
    }

    /// Bind a new invocation to the current stage.
    ///
    /// Any earlier invocation is superseded.
    pub fn begin_invocation(&mut self) -> HubResult<(InvocationTicket, CancellationToken, UpstreamData)> {
        self.ensure_started()?;
        if self.completed {
            return Err(HubError::validation("workflow is already complete"));
        }
        self.cancel_in_flight("superseded");

        let ticket = InvocationTicket {
            session: self.id,
            stage: self.current,
            generation: self.generation,
        };
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            ticket,
            token: token.clone(),
        });

        let state = self.states.entry(self.current).or_default();
        state.status = StageStatus::Running;
        state.error = None;
        self.loading = true;
        self.touch();

        Ok((ticket, token, self.upstream_for(self.current)))
    }

    /// Apply the result of an invocation started with [`begin_invocation`](Self::begin_invocation).
    ///
    /// Results for a superseded generation or a cancelled token are dropped
    /// and reported as `Stale`.
    pub fn finish_invocation(
        &mut self,
        ticket: InvocationTicket,
        token: &CancellationToken,
        outcome: HubResult<Sourced<StageOutput>>,
    ) -> HubResult<StageOutput> {
        if ticket.generation != self.generation || token.is_cancelled() {
            log_stale_result(&self.id.to_string(), ticket.stage, ticket.generation);
            return Err(HubError::Stale {
                stage: ticket.stage,
            });
        }

        self.in_flight = None;
        self.loading = false;

        match outcome {
            Ok(sourced) => {
                let (output, source, reason) = sourced.into_parts();
                if let Err(e) = self.store.set(ticket.stage, output.clone()) {
                    self.fail_stage(ticket.stage, &e);
                    return Err(e);
                }
                self.states.insert(
                    ticket.stage,
                    StageState {
                        status: StageStatus::Completed,
                        error: None,
                        source: Some(source),
                        fallback_reason: reason,
                    },
                );
                self.modification = None;
                self.touch();
                Ok(output)
            }
            Err(e) if e.is_cancellation() => {
                if let Some(state) = self.states.get_mut(&ticket.stage) {
                    state.status = StageStatus::Pending;
                }
                self.touch();
                Err(e)
            }
            Err(e) => {
                self.fail_stage(ticket.stage, &e);
                Err(e)
            }
        }
    }

    /// Upstream data for `stage`: the seed, earlier outputs and any pending note
    pub fn upstream_for(&self, stage: StageId) -> UpstreamData {
        UpstreamData {
            seed: self.seed.clone().unwrap_or_default(),
            outputs: self
                .store
                .iter()
                .filter(|(s, _)| s.index() < stage.index())
                .map(|(s, output)| (s, output.clone()))
                .collect(),
            modification: self.modification.clone(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut statuses = BTreeMap::new();
        let mut sources = BTreeMap::new();
        let mut fallback_reasons = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for stage in StageId::ALL {
            statuses.insert(stage, self.status(stage));
            if let Some(state) = self.states.get(&stage) {
                if let Some(source) = state.source {
                    sources.insert(stage, source);
                }
                if let Some(reason) = &state.fallback_reason {
                    fallback_reasons.insert(stage, reason.clone());
                }
                if let Some(error) = &state.error {
                    errors.insert(stage, error.clone());
                }
            }
        }

        SessionSnapshot {
            id: self.id,
            seed: self.seed.clone(),
            current_stage: self.current,
            outputs: self.store.to_map(),
            statuses,
            sources,
            fallback_reasons,
            errors,
            stage_loading: self.loading,
            workflow_id: self.workflow_id.clone(),
            modification: self.modification.clone(),
            completed: self.completed,
            generation: self.generation,
            history: self.history.snapshot(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rebuild a session from a snapshot; running stages come back as pending
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut states = BTreeMap::new();
        for stage in StageId::ALL {
            let status = match snapshot.status_of(stage) {
                StageStatus::Running => StageStatus::Pending,
                other => other,
            };
            states.insert(
                stage,
                StageState {
                    status,
                    error: snapshot.errors.get(&stage).cloned(),
                    source: snapshot.sources.get(&stage).copied(),
                    fallback_reason: snapshot.fallback_reasons.get(&stage).cloned(),
                },
            );
        }

        Self {
            id: snapshot.id,
            seed: snapshot.seed,
            current: snapshot.current_stage,
            store: StageDataStore::from_map(snapshot.outputs),
            states,
            loading: false,
            workflow_id: snapshot.workflow_id,
            modification: snapshot.modification,
            completed: snapshot.completed,
            generation: snapshot.generation,
            in_flight: None,
            history: TransitionLog::from_entries(DEFAULT_HISTORY_CAPACITY, snapshot.history),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    fn ensure_started(&self) -> HubResult<()> {
        if self.seed.is_none() {
            return Err(HubError::validation("session has not been started with a seed"));
        }
        Ok(())
    }

    fn move_to(&mut self, kind: TransitionKind, to: StageId) {
        let from = self.current;
        self.cancel_in_flight("navigated away");
        self.current = to;
        self.record(kind, from, to);
    }

    fn clear_state(&mut self, reason: &str) {
        self.cancel_in_flight(reason);
        self.seed = None;
        self.current = StageId::first();
        self.store.clear();
        self.states.clear();
        self.workflow_id = None;
        self.modification = None;
        self.completed = false;
        self.loading = false;
        self.touch();
    }

    /// Bump the generation and cancel whatever is running
    fn cancel_in_flight(&mut self, reason: &str) {
        self.generation += 1;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel(reason);
            if let Some(state) = self.states.get_mut(&in_flight.ticket.stage) {
                if state.status == StageStatus::Running {
                    state.status = StageStatus::Pending;
                }
            }
        }
        self.loading = false;
    }

    fn fail_stage(&mut self, stage: StageId, error: &HubError) {
        let state = self.states.entry(stage).or_default();
        state.status = StageStatus::Failed;
        state.error = Some(error.to_string());
        self.touch();
    }

    fn record(&mut self, kind: TransitionKind, from: StageId, to: StageId) {
        self.history.record(StageTransition::new(kind, from, to));
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StoryOutline, StageOutput};

    fn story(seed: &str) -> StageOutput {
        StageOutput::Story(StoryOutline {
            title: seed.to_string(),
            outline: seed.to_string(),
            acts: vec!["a".into(), "b".into(), "c".into()],
            characters: vec![],
            setting: String::new(),
        })
    }

    #[test]
    fn test_start_requires_seed() {
        let mut session = WorkflowSession::new(Uuid::new_v4());
        assert!(session.start("   ").is_err());
        session.start("idea").unwrap();
        assert_eq!(session.seed(), Some("idea"));
        assert!(session.workflow_id().unwrap().starts_with("workflow-"));
    }

    #[test]
    fn test_invocation_round_trip() {
        let mut session = WorkflowSession::new(Uuid::new_v4());
        session.start("idea").unwrap();

        let (ticket, token, upstream) = session.begin_invocation().unwrap();
        assert_eq!(upstream.seed, "idea");
        assert!(session.is_loading());
        assert_eq!(session.status(StageId::Story), StageStatus::Running);

        session
            .finish_invocation(ticket, &token, Ok(Sourced::Live(story("idea"))))
            .unwrap();
        assert!(!session.is_loading());
        assert_eq!(session.status(StageId::Story), StageStatus::Completed);
        assert_eq!(session.source(StageId::Story), Some(ResultSource::Live));
    }

    #[test]
    fn test_late_result_after_reset_is_discarded() {
        let mut session = WorkflowSession::new(Uuid::new_v4());
        session.start("idea").unwrap();
        let (ticket, token, _) = session.begin_invocation().unwrap();

        session.reset();
        assert!(token.is_cancelled());

        let err = session
            .finish_invocation(ticket, &token, Ok(Sourced::Live(story("idea"))))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Stale);
        assert!(session.outputs().is_empty());
    }

    #[test]
    fn test_failure_then_retry() {
        let mut session = WorkflowSession::new(Uuid::new_v4());
        session.start("idea").unwrap();
        assert!(session.retry().is_err());

        let (ticket, token, _) = session.begin_invocation().unwrap();
        let _ = session.finish_invocation(
            ticket,
            &token,
            Err(HubError::Upstream("boom".to_string())),
        );
        assert_eq!(session.status(StageId::Story), StageStatus::Failed);
        assert!(session.error(StageId::Story).unwrap().contains("boom"));

        session.retry().unwrap();
        assert_eq!(session.status(StageId::Story), StageStatus::Pending);
    }

    #[test]
    fn test_snapshot_restores_state() {
        let mut session = WorkflowSession::new(Uuid::new_v4());
        session.start("idea").unwrap();
        session
            .record_stage_output(StageId::Story, story("idea"))
            .unwrap();
        session.advance();

        let snapshot = session.snapshot();
        let restored = WorkflowSession::from_snapshot(snapshot.clone());
        assert_eq!(restored.current_stage(), StageId::Script);
        assert_eq!(restored.output(StageId::Story), Some(&story("idea")));
        assert_eq!(restored.snapshot().history, snapshot.history);
    }
}
