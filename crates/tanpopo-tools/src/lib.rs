//! Workspace-confined tools exposed to the agent loop.
//!
//! Provides the `exec` command sandbox and the `readFile` reader, both bound
//! to a single cloned workspace through [`ToolPolicy`].

pub mod tools;

pub use tools::{
    register_workspace_tools, CommandExecutor, CommandOutcome, ExecArguments, ExecError, ExecTool,
    ReadFileTool, ToolPolicy,
};
