//! Container command building and execution
//!
//! Provides:
//! - Container runtime detection (docker or podman)
//! - A typed builder for `run` invocations against the OpenVPN image
//! - The [`CommandRunner`] boundary through which every external process runs

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Mount point of the instance data directory inside the container
pub const CONTAINER_DATA_PATH: &str = "/etc/openvpn";

/// Container runtime used to run the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect an available container runtime, preferring docker
    pub fn detect_with<R: CommandRunner + ?Sized>(runner: &R) -> Option<Self> {
        [Self::Docker, Self::Podman].into_iter().find(|runtime| {
            runner
                .capture(&ExternalCommand::host(runtime.command(), ["--version"]))
                .is_ok()
        })
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(Error::InvalidConfig(format!(
                "unknown container runtime '{}' (expected docker or podman)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("udp"),
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}

/// Host port published to a container port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host_port, self.container_port, self.protocol)
    }
}

/// Where the standard output of a command goes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "path")]
pub enum OutputMode {
    /// Shared with the calling process
    #[default]
    Inherit,
    /// Written to a file, created or truncated before the command starts
    CaptureTo(PathBuf),
}

/// One `run` invocation of a container image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerCommand {
    pub image: String,
    pub volumes: Vec<(PathBuf, String)>,
    pub remove: bool,
    pub interactive: bool,
    pub detach: bool,
    pub ports: Vec<PortMapping>,
    pub capabilities: Vec<String>,
    pub name: Option<String>,
    pub args: Vec<String>,
    pub output: OutputMode,
}

impl ContainerCommand {
    /// Start a command for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            volumes: Vec::new(),
            remove: false,
            interactive: false,
            detach: false,
            ports: Vec::new(),
            capabilities: Vec::new(),
            name: None,
            args: Vec::new(),
            output: OutputMode::Inherit,
        }
    }

    /// Bind-mount a host directory
    pub fn volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    /// Remove the container when it exits
    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }

    /// Attach a TTY and keep stdin open
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Run in the background
    pub fn detach(mut self) -> Self {
        self.detach = true;
        self
    }

    pub fn publish(mut self, host_port: u16, container_port: u16, protocol: Protocol) -> Self {
        self.ports.push(PortMapping {
            host_port,
            container_port,
            protocol,
        });
        self
    }

    pub fn cap_add(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append arguments passed to the image entrypoint
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Send standard output to a file
    pub fn capture_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputMode::CaptureTo(path.into());
        self
    }

    /// Build the runtime argument list, starting at `run`
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];

        for (host, container) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), container));
        }

        if self.remove {
            args.push("--rm".to_string());
        }
        if self.interactive {
            args.push("-it".to_string());
        }
        if self.detach {
            args.push("-d".to_string());
        }

        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        for cap in &self.capabilities {
            args.push(format!("--cap-add={}", cap));
        }

        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }

        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }

    /// Render for a runtime
    pub fn to_external(&self, runtime: ContainerRuntime) -> ExternalCommand {
        ExternalCommand {
            program: runtime.command().to_string(),
            args: self.build_args(),
            interactive: self.interactive,
            output: self.output.clone(),
        }
    }
}

/// A fully rendered process invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub interactive: bool,
    pub output: OutputMode,
}

impl ExternalCommand {
    /// A plain host command with inherited output
    pub fn host<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            interactive: false,
            output: OutputMode::Inherit,
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if let OutputMode::CaptureTo(path) = &self.output {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Executes external processes on behalf of the orchestrator
pub trait CommandRunner {
    /// Run a command to completion; a non-zero exit is an error
    fn run(&self, command: &ExternalCommand) -> Result<()>;

    /// Run a command and return its standard output
    fn capture(&self, command: &ExternalCommand) -> Result<String>;
}

/// Runs commands as child processes of this one
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn spawn_error(command: &ExternalCommand, e: std::io::Error) -> Error {
        Error::CommandSpawn {
            program: command.program.clone(),
            source: e,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ExternalCommand) -> Result<()> {
        debug!("exec: {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if command.interactive {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }

        if let OutputMode::CaptureTo(path) = &command.output {
            let file = File::create(path)?;
            cmd.stdout(Stdio::from(file));
        }

        let status = cmd
            .status()
            .map_err(|e| Self::spawn_error(command, e))?;

        if !status.success() {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                code: status.code(),
            });
        }

        Ok(())
    }

    fn capture(&self, command: &ExternalCommand) -> Result<String> {
        debug!("exec (capture): {}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| Self::spawn_error(command, e))?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
