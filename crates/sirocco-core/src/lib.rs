//! Context-budget control for long-running, tool-using LLM sessions.
//!
//! The pieces compose around one loop: a [`meter::TokenMeter`] prices the
//! transcript, a [`gate::ToolOutputGate`] compresses oversized tool output
//! before it enters history, a [`compactor::HistoryCompactor`] rewrites the
//! transcript head when the soft threshold is crossed, and the
//! [`session::SessionController`] decides when to keep going, restart from
//! a summary seed, or stop.

pub mod compactor;
pub mod config;
pub mod error;
pub mod gate;
pub mod history;
pub mod meter;
pub mod plan;
pub mod session;

pub use compactor::{CompactionOutcome, HistoryCompactor};
pub use config::{BudgetConfig, Config, ConfigError, SessionConfig};
pub use error::SessionError;
pub use gate::ToolOutputGate;
pub use history::HistoryLog;
pub use meter::{GuardedMeter, HeuristicMeter, TokenMeter};
pub use plan::{CodeFragment, ExecutionPlanGate, FragmentIntent, FragmentJudge, LlmFragmentJudge};
pub use session::{SessionController, SessionRunner, SessionState, TokenBudget};
