//! The conversational task-dispatch core — dispatcher, composer, orchestrator.

pub mod dispatcher;
pub mod orchestrator;
pub mod reply;

pub use dispatcher::{DispatchOutcome, Dispatcher, OutcomeStatus};
pub use orchestrator::{ChatOrchestrator, ChatTurn, TurnError, TurnPhase};
pub use reply::compose_reply;
