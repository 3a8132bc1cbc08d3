//! Discovery stage: external tool invocation and the bounded-parallel
//! scheduler.

mod scheduler;
mod tool;

pub use scheduler::{RunSummary, Scheduler, SchedulerError};
pub use tool::{CommandTool, DiscoveryTool, ToolError, ToolOutputs, ToolRequest};
