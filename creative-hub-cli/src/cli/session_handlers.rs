use super::handlers::load_config;
use super::session::SessionCommands;

use anyhow::{Context, Result};
use creative_hub_core::client::HubClient;
use creative_hub_core::models::{Configuration, ExecutorSettings, StageId};
use creative_hub_core::workflow::{
    SessionPersistence, SessionSnapshot, StageStatus, WorkflowOrchestrator,
};
use creative_hub_core::HubResult;
use uuid::Uuid;

/// A navigation or execution request against one session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Confirm,
    Back,
    Jump(StageId),
    Modify(String),
    Retry,
    Reset,
    Complete,
}

pub async fn handle_session_commands(command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::Start { seed, server, json } => {
            let snapshot = if server.is_empty() {
                LocalSessions::open()?.start(&seed).await?
            } else {
                HubClient::new(server).start_session(&seed).await?
            };
            print_snapshot(&snapshot, json)?;
        }
        SessionCommands::Show {
            session,
            server,
            json,
        } => {
            let snapshot = if server.is_empty() {
                LocalSessions::open()?.resolve(session)?
            } else {
                let client = HubClient::new(server);
                let id = remote_session_id(&client, session).await?;
                client.get_session(id).await?
            };
            print_snapshot(&snapshot, json)?;
        }
        SessionCommands::List { server, json } => {
            let sessions = if server.is_empty() {
                LocalSessions::open()?.list()?
            } else {
                HubClient::new(server).list_sessions().await?
            };
            print_session_list(&sessions, json)?;
        }
        SessionCommands::Confirm {
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Confirm).await?,
        SessionCommands::Back {
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Back).await?,
        SessionCommands::Jump {
            stage,
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Jump(stage)).await?,
        SessionCommands::Modify {
            note,
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Modify(note)).await?,
        SessionCommands::Retry {
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Retry).await?,
        SessionCommands::Reset {
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Reset).await?,
        SessionCommands::Complete {
            session,
            server,
            json,
        } => run_action(session, server, json, SessionAction::Complete).await?,
        SessionCommands::Delete { session, server } => {
            if server.is_empty() {
                if !LocalSessions::open()?.remove(session)? {
                    anyhow::bail!("Session not found: {}", session);
                }
            } else {
                HubClient::new(server).delete_session(session).await?;
            }
            println!("Session {} deleted", session);
        }
    }
    Ok(())
}

async fn run_action(
    session: Option<Uuid>,
    server: String,
    json: bool,
    action: SessionAction,
) -> Result<()> {
    let snapshot = if server.is_empty() {
        LocalSessions::open()?.apply(session, &action).await?
    } else {
        let client = HubClient::new(server);
        let id = remote_session_id(&client, session).await?;
        apply_remote(&client, id, &action).await?
    };
    print_snapshot(&snapshot, json)
}

async fn remote_session_id(client: &HubClient, session: Option<Uuid>) -> Result<Uuid> {
    if let Some(id) = session {
        return Ok(id);
    }
    client
        .list_sessions()
        .await?
        .into_iter()
        .max_by_key(|s| s.updated_at)
        .map(|s| s.id)
        .context("No sessions on the server; start one with 'session start'")
}

async fn apply_remote(client: &HubClient, id: Uuid, action: &SessionAction) -> Result<SessionSnapshot> {
    match action {
        SessionAction::Confirm => client.confirm(id).await,
        SessionAction::Back => client.retreat(id).await,
        SessionAction::Jump(stage) => client.jump_to(id, *stage).await,
        SessionAction::Modify(note) => client.modify(id, note).await,
        SessionAction::Retry => client.retry(id).await,
        SessionAction::Reset => client.reset(id).await,
        SessionAction::Complete => client.complete(id).await,
    }
}

/// Sessions kept in a local snapshot file between CLI invocations
pub struct LocalSessions {
    store: SessionPersistence,
    orchestrator: WorkflowOrchestrator,
}

impl LocalSessions {
    pub fn new(store: SessionPersistence, settings: &ExecutorSettings) -> Self {
        Self {
            store,
            orchestrator: WorkflowOrchestrator::simulated(settings),
        }
    }

    /// Open the store named by the default configuration
    pub fn open() -> Result<Self> {
        let (_, config) = load_config("")?;
        Self::from_config(&config)
    }

    /// Snapshot file and stage delays both come from `config`
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let path = config.session_store_path()?;
        let store = SessionPersistence::new(&path)
            .with_context(|| format!("Failed to open session store {}", path.display()))?;
        Ok(Self::new(store, &config.executor))
    }

    pub async fn start(&self, seed: &str) -> Result<SessionSnapshot> {
        let snapshot = self.orchestrator.begin(seed).await?;
        self.store.save(&snapshot)?;
        Ok(snapshot)
    }

    /// The given session, or the most recently updated one
    pub fn resolve(&self, id: Option<Uuid>) -> Result<SessionSnapshot> {
        match id {
            Some(id) => self
                .store
                .load(id)?
                .with_context(|| format!("Session not found: {}", id)),
            None => self
                .store
                .latest()?
                .context("No local sessions; start one with 'session start'"),
        }
    }

    pub fn list(&self) -> Result<Vec<SessionSnapshot>> {
        let mut sessions = self.store.list()?;
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    pub fn remove(&self, id: Uuid) -> Result<bool> {
        self.store.remove(id)
    }

    /// Rehydrate the session, apply `action` and persist the outcome.
    ///
    /// The snapshot is saved even when the action fails, so a failed stage
    /// stays visible to `retry`.
    pub async fn apply(&self, id: Option<Uuid>, action: &SessionAction) -> Result<SessionSnapshot> {
        let id = self.orchestrator.import(self.resolve(id)?);
        let result = self.dispatch(id, action).await;

        let snapshot = self.orchestrator.snapshot(id).await?;
        self.store.save(&snapshot)?;
        Ok(result?)
    }

    async fn dispatch(&self, id: Uuid, action: &SessionAction) -> HubResult<SessionSnapshot> {
        let orchestrator = &self.orchestrator;
        match action {
            SessionAction::Confirm => orchestrator.confirm(id).await,
            SessionAction::Back => orchestrator.retreat(id).await,
            SessionAction::Jump(stage) => orchestrator.jump_to(id, *stage).await,
            SessionAction::Modify(note) => orchestrator.modify(id, note).await,
            SessionAction::Retry => orchestrator.retry(id).await,
            SessionAction::Reset => orchestrator.reset(id).await,
            SessionAction::Complete => orchestrator.complete(id).await,
        }
    }
}

fn print_session_list(sessions: &[SessionSnapshot], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for session in sessions {
        let (done, total) = session.progress();
        println!(
            "{}  {:<10} {}/{}  {}",
            session.id,
            session.current_stage.as_str(),
            done,
            total,
            session.seed.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let stage = snapshot.current_stage;
    let descriptor = stage.descriptor();
    let (done, total) = snapshot.progress();
    let bar: String = StageId::ALL
        .iter()
        .map(|s| match snapshot.status_of(*s) {
            StageStatus::Completed => '■',
            StageStatus::Failed => '✗',
            StageStatus::Pending | StageStatus::Running => '□',
        })
        .collect();

    println!("Session {}", snapshot.id);
    println!("  Seed: {}", snapshot.seed.as_deref().unwrap_or("-"));
    if let Some(workflow_id) = &snapshot.workflow_id {
        println!("  Workflow: {}", workflow_id);
    }
    println!(
        "  Stage: {}/{} {} ({}) [{}]",
        stage.index() + 1,
        total,
        descriptor.title,
        stage,
        snapshot.status_of(stage)
    );
    println!("  Progress: {} {}/{}", bar, done, total);
    if let Some(note) = &snapshot.modification {
        println!("  Modification: {}", note);
    }
    if snapshot.completed {
        println!("  ✅ Workflow complete");
    }
    if let Some(error) = snapshot.errors.get(&stage) {
        println!("  ❌ {}", error);
    }

    if let Some(output) = snapshot.outputs.get(&stage) {
        match snapshot.fallback_reasons.get(&stage) {
            Some(reason) => println!("Output (fallback: {}):", reason),
            None => println!("Output:"),
        }
        println!("{}", serde_json::to_string_pretty(output)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use creative_hub_core::ErrorKind;
    use tempfile::tempdir;

    fn local(dir: &std::path::Path) -> LocalSessions {
        let store = SessionPersistence::new(dir.join("sessions.json")).unwrap();
        LocalSessions::new(store, &ExecutorSettings::instant())
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_store_and_delays() {
        let dir = tempdir().unwrap();
        let mut config = Configuration::default();
        config.session_store_path = Some(dir.path().join("local").join("sessions.json"));
        config.executor.min_delay_ms = 150;
        config.executor.max_delay_ms = 150;

        let sessions = LocalSessions::from_config(&config).unwrap();
        let begun = std::time::Instant::now();
        let started = sessions.start("雨夜里的机器人").await.unwrap();
        assert!(begun.elapsed() >= std::time::Duration::from_millis(150));

        let reopened = LocalSessions::from_config(&config).unwrap();
        assert_eq!(reopened.resolve(None).unwrap().id, started.id);
    }

    #[tokio::test]
    async fn test_local_session_survives_reopen() {
        let dir = tempdir().unwrap();

        let started = local(dir.path()).start("一只会说话的狐狸").await.unwrap();
        assert!(started.outputs.contains_key(&StageId::Story));

        // a fresh process sees the same session as the latest one
        let reopened = local(dir.path());
        let confirmed = reopened.apply(None, &SessionAction::Confirm).await.unwrap();
        assert_eq!(confirmed.id, started.id);
        assert_eq!(confirmed.current_stage, StageId::Script);
        assert!(confirmed.outputs.contains_key(&StageId::Script));

        let shown = local(dir.path()).resolve(Some(started.id)).unwrap();
        assert_eq!(shown.current_stage, StageId::Script);
    }

    #[tokio::test]
    async fn test_local_jump_forward_is_refused() {
        let dir = tempdir().unwrap();
        let sessions = local(dir.path());
        sessions.start("idea").await.unwrap();

        let err = sessions
            .apply(None, &SessionAction::Jump(StageId::Edit))
            .await
            .unwrap_err();
        let hub_error = err.downcast_ref::<creative_hub_core::HubError>().unwrap();
        assert_eq!(hub_error.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn test_resolve_without_sessions_fails() {
        let dir = tempdir().unwrap();
        assert!(local(dir.path()).resolve(None).is_err());
        assert!(!local(dir.path()).remove(Uuid::new_v4()).unwrap());
    }
}
