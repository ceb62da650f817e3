pub mod agent_loop;

pub use agent_loop::{
    EMPTY_ANSWER, ExecutionReportEntry, Orchestrator, TurnError, TurnOptions, TurnOutcome,
};
