//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust
//! use tool_gate::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;
pub use crate::ToolGate;
pub use crate::ToolGateBuilder;

// Settings
pub use crate::config::{EnvSettings, ScopeConfigStore, ScopeLevel};

// Permissions
pub use crate::permissions::{
    ApprovalDecision, ApprovalOutcome, ChannelPrompter, PermissionMode, PermissionPrompter,
    PromptResponse, Rule, ToolInvocationRequest,
};

// Execution
pub use crate::execution::{
    CancelReason, CancelToken, ExecutionError, ExecutionResult, HandlerRunner, RunnerRegistry,
    ShellRunner, ToolHandler, ToolRunner,
};

// Telemetry
pub use crate::observability::{GateMetrics, TelemetrySink, TracingSink};
