//! Creative workflow: the six-stage state machine, its orchestrator and the
//! step pipelines

pub mod cancellation;
pub mod executor;
pub mod orchestrator;
pub mod persistence;
pub mod pipelines;
pub mod session;
pub mod simulated;
pub mod store;
pub mod transition_log;

pub use cancellation::CancellationToken;
pub use executor::{StageExecutor, StageRunner};
pub use orchestrator::WorkflowOrchestrator;
pub use persistence::SessionPersistence;
pub use pipelines::{load_templates, PipelineService, StepExecutor, StepExecutorRegistry};
pub use session::{SessionSnapshot, StageStatus, UpstreamData, WorkflowSession};
pub use simulated::SimulatedStageExecutor;
pub use store::StageDataStore;
pub use transition_log::{StageTransition, TransitionKind, TransitionLog};
