//! Supervised execution of approved tool calls.
//!
//! An [`ExecutionSupervisor`] resolves a [`ToolRunner`] for the request,
//! starts the action, and races it against a timeout and a [`CancelToken`].
//! Whatever settles first decides the single terminal result; timeouts and
//! cancellations forcibly stop the action before returning.

pub mod cancel;
pub mod error;
pub mod handler;
pub mod runner;
pub mod shell;
pub mod supervisor;
pub mod timeout;

pub use cancel::{CancelReason, CancelToken};
pub use error::{ExecutionError, ExecutionResult, ExecutionStatus, TerminationTrigger};
pub use handler::{HandlerRunner, ToolHandler};
pub use runner::{ActionOutcome, RunnerRegistry, RunningAction, ToolRunner};
pub use shell::ShellRunner;
pub use supervisor::{DEFAULT_TERMINATION_GRACE, ExecutionHandle, ExecutionSupervisor};
pub use timeout::{DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, resolve_timeout, resolve_timeout_ms};
