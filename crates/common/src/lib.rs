//! ovpnkit Common Library
//!
//! Instance model, container command building and the orchestrator that
//! provisions containerized OpenVPN servers and their clients.

pub mod command;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod types;

// Re-export commonly used types
pub use command::{
    CommandRunner, ContainerCommand, ContainerRuntime, ExternalCommand, OutputMode, SystemRunner,
};
pub use config::ToolConfig;
pub use error::{Error, Result};
pub use orchestrator::{InstanceReport, Orchestrator, Plan, PlanStep};
pub use types::*;
