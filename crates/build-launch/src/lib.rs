//! Process supervision and tool lookup for pybuild.
//!
//! This crate provides the low-level pieces every pybuild operation is built
//! on:
//!
//! - A process runner that launches external tools through the platform
//!   shell and streams their output without deadlocking
//! - Translation of named options into command-line flags
//! - Lookup of the system interpreter and `git` on `PATH`
//!
//! # Running a tool
//!
//! ```ignore
//! use build_launch::{Invocation, ProcessRunner};
//!
//! let runner = ProcessRunner::default();
//! let code = runner.run(Invocation::new("git", "--version")).await?;
//! ```

pub mod flags;
pub mod process;
pub mod tools;

// Re-export commonly used items
pub use flags::{FlagSet, FlagValue};
pub use process::{
    Invocation, InvocationHandle, LaunchError, LineCallback, LogSink, OutputSink, OutputStream,
    ProcessRunner,
};
pub use tools::{find_python, find_tool, get_git_path, get_python_path, ToolError};
