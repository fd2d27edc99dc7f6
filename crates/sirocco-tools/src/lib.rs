//! Tool execution layer: shell and file executors behind a common trait,
//! with JSONL audit logging of every mutating action.

pub mod audit;
pub mod composite;
pub mod config;
pub mod executor;
pub mod file;
pub mod shell;

pub use audit::{AuditEvent, AuditLogger};
pub use composite::CompositeExecutor;
pub use config::{AuditConfig, FileConfig, ShellConfig, ToolsConfig};
pub use executor::{ToolError, ToolExecutor};
pub use file::FileExecutor;
pub use shell::ShellExecutor;
