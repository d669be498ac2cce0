//! Server and client provisioning
//!
//! Turns a resolved [`ServerConfig`] or a client name into an ordered list of
//! container commands and runs them one after another. The first failing
//! command aborts the operation; nothing already created is rolled back.

use crate::command::{
    CommandRunner, ContainerCommand, ContainerRuntime, ExternalCommand, Protocol,
    CONTAINER_DATA_PATH,
};
use crate::config::ToolConfig;
use crate::types::{closing_notices, validate_name, Instance, Notice, ServerConfig, CONTAINER_PORT};
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Shown in plans in place of an address that would be detected at run time
pub const ADDRESS_PLACEHOLDER: &str = "<auto-detected>";

/// One step of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub description: String,
    pub command: ExternalCommand,
}

/// Ordered commands an operation will run
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub instance: Instance,
    pub steps: Vec<PlanStep>,
}

/// Outcome of provisioning a server
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub instance: Instance,
    /// Server configuration with the address filled in
    pub server: ServerConfig,
    /// Containers started
    pub containers: Vec<String>,
    /// Notices for the operator
    pub notices: Vec<Notice>,
}

/// Provisions OpenVPN instances and clients through a container runtime
pub struct Orchestrator<R> {
    config: ToolConfig,
    runner: R,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(config: ToolConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Configured runtime, detected through the runner when unset.
    ///
    /// Resolved only after the instance preconditions hold.
    fn runtime(&self) -> Result<ContainerRuntime> {
        match self.config.runtime {
            Some(runtime) => Ok(runtime),
            None => ContainerRuntime::detect_with(&self.runner).ok_or(Error::RuntimeUnavailable),
        }
    }

    fn plan_runtime(&self) -> ContainerRuntime {
        self.runtime().unwrap_or_else(|_| {
            warn!("No container runtime found, showing docker commands");
            ContainerRuntime::Docker
        })
    }

    /// Derive the instance for a purpose
    pub fn instance(&self, purpose: &str) -> Result<Instance> {
        Instance::new(purpose, &self.config.data_root, &self.config.client_root)
    }

    fn base_command(&self, mount: &Path) -> ContainerCommand {
        ContainerCommand::new(&self.config.image).volume(mount, CONTAINER_DATA_PATH)
    }

    fn step(runtime: ContainerRuntime, description: &str, command: ContainerCommand) -> PlanStep {
        PlanStep {
            description: description.to_string(),
            command: command.to_external(runtime),
        }
    }

    fn server_steps(
        &self,
        runtime: ContainerRuntime,
        instance: &Instance,
        mount: &Path,
        server: &ServerConfig,
        address: &str,
    ) -> Vec<PlanStep> {
        let mut genconfig_args = vec![
            "ovpn_genconfig".to_string(),
            "-u".to_string(),
            format!("udp://{}", url_host(address)),
            "-s".to_string(),
            server.subnet.clone(),
            "-r".to_string(),
            server.route.clone(),
        ];
        for dns in &server.dns_servers {
            genconfig_args.push("-n".to_string());
            genconfig_args.push(dns.clone());
        }

        let mut steps = vec![
            Self::step(
                runtime,
                "Generate server configuration",
                self.base_command(mount).remove().args(genconfig_args),
            ),
            Self::step(
                runtime,
                "Initialize PKI",
                self.base_command(mount)
                    .remove()
                    .interactive()
                    .args(["ovpn_initpki"]),
            ),
            Self::step(
                runtime,
                "Start UDP server",
                self.base_command(mount)
                    .detach()
                    .publish(server.udp_port, CONTAINER_PORT, Protocol::Udp)
                    .cap_add("NET_ADMIN")
                    .name(&instance.container_name),
            ),
        ];

        if server.allow_tcp {
            steps.push(Self::step(
                runtime,
                "Start TCP server",
                self.base_command(mount)
                    .remove()
                    .detach()
                    .publish(server.tcp_port, CONTAINER_PORT, Protocol::Tcp)
                    .cap_add("NET_ADMIN")
                    .name(instance.tcp_container_name())
                    .args(["ovpn_run", "--proto", "tcp"]),
            ));
        }

        steps
    }

    fn client_steps(
        &self,
        runtime: ContainerRuntime,
        instance: &Instance,
        mount: &Path,
        name: &str,
    ) -> Vec<PlanStep> {
        vec![
            Self::step(
                runtime,
                "Build client certificate",
                self.base_command(mount)
                    .remove()
                    .interactive()
                    .args(["easyrsa", "build-client-full", name, "nopass"]),
            ),
            Self::step(
                runtime,
                "Retrieve client configuration",
                self.base_command(mount)
                    .remove()
                    .args(["ovpn_getclient", name])
                    .capture_to(instance.client_configuration_path(name)),
            ),
        ]
    }

    fn run_steps(&self, steps: &[PlanStep]) -> Result<()> {
        for step in steps {
            info!("{}", step.description);
            debug!("{}", step.command);
            self.runner.run(&step.command)?;
        }
        Ok(())
    }

    /// Plan server provisioning without touching the filesystem
    pub fn plan_instance(&self, purpose: &str, server: &ServerConfig) -> Result<Plan> {
        let instance = self.instance(purpose)?;
        if instance.data_directory.exists() {
            return Err(Error::InstanceExists {
                path: display_path(&instance.data_directory),
            });
        }

        let mount = std::path::absolute(&instance.data_directory)?;
        let address = server.vpn_address.as_deref().unwrap_or(ADDRESS_PLACEHOLDER);
        let steps = self.server_steps(self.plan_runtime(), &instance, &mount, server, address);

        Ok(Plan { instance, steps })
    }

    /// Plan client generation without touching the filesystem
    pub fn plan_client(&self, purpose: &str, name: &str) -> Result<Plan> {
        let instance = self.instance(purpose)?;
        validate_name("client", name)?;
        let mount = existing_data_directory(&instance)?;
        let steps = self.client_steps(self.plan_runtime(), &instance, &mount, name);

        Ok(Plan { instance, steps })
    }

    /// Provision a new server instance.
    ///
    /// `notify` receives notices that should reach the operator before the
    /// interactive steps start.
    pub fn create_instance(
        &self,
        purpose: &str,
        server: &ServerConfig,
        mut notify: impl FnMut(&Notice),
    ) -> Result<InstanceReport> {
        let instance = self.instance(purpose)?;
        info!("Creating OpenVPN instance '{}'", instance.purpose);

        if let Some(parent) = instance.data_directory.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::create_dir(&instance.data_directory) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::InstanceExists {
                    path: display_path(&instance.data_directory),
                });
            }
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&instance.configuration_directory)?;

        let mount = instance.data_directory.canonicalize()?;
        let runtime = self.runtime()?;

        let (server, address) = match &server.vpn_address {
            Some(address) => (server.clone(), address.clone()),
            None => {
                let address = self.detect_address()?;
                notify(&Notice::AddressDetected(address.clone()));
                (server.with_address(address.clone()), address)
            }
        };

        let steps = self.server_steps(runtime, &instance, &mount, &server, &address);
        self.run_steps(&steps)?;

        let mut containers = vec![instance.container_name.clone()];
        if server.allow_tcp {
            containers.push(instance.tcp_container_name());
        }
        info!("Started {}", containers.join(", "));

        Ok(InstanceReport {
            notices: closing_notices(&server),
            instance,
            server,
            containers,
        })
    }

    /// Generate a client certificate and write its configuration.
    ///
    /// Returns the path of the `.ovpn` file.
    pub fn create_client(&self, purpose: &str, name: &str) -> Result<PathBuf> {
        let instance = self.instance(purpose)?;
        validate_name("client", name)?;
        let mount = existing_data_directory(&instance)?;
        info!("Creating client '{}' for instance '{}'", name, instance.purpose);

        let runtime = self.runtime()?;
        fs::create_dir_all(&instance.configuration_directory)?;

        let steps = self.client_steps(runtime, &instance, &mount, name);
        self.run_steps(&steps)?;

        Ok(instance.client_configuration_path(name))
    }

    /// First non-loopback address reported by `hostname -I`
    pub fn detect_address(&self) -> Result<String> {
        let output = self
            .runner
            .capture(&ExternalCommand::host("hostname", ["-I"]))
            .map_err(|e| Error::AddressDetection(e.to_string()))?;

        first_routable_address(&output).ok_or_else(|| {
            Error::AddressDetection("no non-loopback address found".to_string())
        })
    }
}

/// First non-loopback address, IPv4 before IPv6
fn first_routable_address(output: &str) -> Option<String> {
    let addresses: Vec<IpAddr> = output
        .split_whitespace()
        .filter_map(|token| token.parse::<IpAddr>().ok())
        .filter(|ip| !ip.is_loopback())
        .collect();

    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .map(|ip| ip.to_string())
}

/// Host part of the server URL; IPv6 literals need brackets
fn url_host(address: &str) -> String {
    match address.parse::<Ipv6Addr>() {
        Ok(ip) => format!("[{}]", ip),
        Err(_) => address.to_string(),
    }
}

fn existing_data_directory(instance: &Instance) -> Result<PathBuf> {
    if !instance.data_directory.is_dir() {
        return Err(Error::InstanceMissing {
            path: display_path(&instance.data_directory),
        });
    }
    Ok(instance.data_directory.canonicalize()?)
}

fn display_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
