//! easel-engine: the conversational scene editor core.
//!
//! A turn flows through the [`router`], which classifies fresh text once
//! with an [`IntentOracle`] and re-enters the stored intent on resume, into
//! one of the task [`executor`]s. An executor either finishes, asks for a
//! suspension (answered by the presentation layer, see [`presentation`]),
//! or hands back a mutation plan that the [`journal`] applies and logs in a
//! single storage snapshot. The [`Orchestrator`] ties these together and
//! exposes `submit`, `resume`, `undo` and `redo`.

pub mod context;
pub mod error;
pub mod executor;
pub mod intent;
pub mod journal;
pub mod oracle;
pub mod orchestrator;
pub mod presentation;
pub mod router;
pub mod suspension;

pub use context::{ExecutionContext, TaskPhase};
pub use error::{EngineError, FailureKind};
pub use intent::{ChangeSet, Intent, IntentRequest, QueryMode, TargetSelector};
pub use journal::ReplayOutcome;
#[cfg(feature = "llm")]
pub use oracle::OpenAiCompatClient;
pub use oracle::{IntentOracle, KeywordOracle, LlmClient, LlmError, LlmOracle, OracleError};
pub use orchestrator::{EngineConfig, Orchestrator, TurnOutcome, TurnStatus};
pub use presentation::SceneResponder;
pub use suspension::{ExternalAnswer, ShapeSummary, SuspendRequest};
