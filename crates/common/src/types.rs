//! Core types for ovpnkit
//!
//! An instance is one OpenVPN server deployment identified by its purpose.
//! Everything else about it (container name, data directory, client
//! configuration directory) is derived from that purpose.

use crate::{Error, Result};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Port the OpenVPN daemon listens on inside the container
pub const CONTAINER_PORT: u16 = 1194;

/// Default client subnet
pub const DEFAULT_SUBNET: &str = "10.0.0.0/24";

/// DNS server pushed to clients when none are given
pub const DEFAULT_DNS_SERVER: &str = "9.9.9.9";

/// Default host port for both the UDP and TCP servers
pub const DEFAULT_PORT: u16 = 1194;

/// Prefix for all container names
pub const CONTAINER_PREFIX: &str = "openvpn";

/// Check that a purpose or client name is usable as part of a container
/// name and as a file name.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(first) if !first.is_ascii_alphanumeric() => {
            return Err(invalid("must start with a letter or digit"));
        }
        Some(_) => {}
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(invalid("only letters, digits, '_', '.' and '-' are allowed"));
    }

    Ok(())
}

/// Names and paths derived from an instance purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub purpose: String,
    pub container_name: String,
    pub data_directory: PathBuf,
    pub configuration_directory: PathBuf,
}

impl Instance {
    /// Derive an instance from its purpose and the two directory roots
    pub fn new(purpose: &str, data_root: &Path, client_root: &Path) -> Result<Self> {
        validate_name("purpose", purpose)?;

        Ok(Self {
            purpose: purpose.to_string(),
            container_name: format!("{}-{}", CONTAINER_PREFIX, purpose),
            data_directory: data_root.join(purpose),
            configuration_directory: client_root.join(purpose),
        })
    }

    /// Name of the TCP fallback server container
    pub fn tcp_container_name(&self) -> String {
        format!("{}_tcp", self.container_name)
    }

    /// Path of a generated client configuration
    pub fn client_configuration_path(&self, client: &str) -> PathBuf {
        self.configuration_directory.join(format!("{}.ovpn", client))
    }
}

/// Server options as supplied by the user.
///
/// `None` means "not provided"; defaults are applied by [`ServerOptions::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub vpn_address: Option<String>,
    pub dns_servers: Vec<String>,
    pub subnet: Option<String>,
    pub route: Option<String>,
    pub udp_port: Option<u16>,
    pub tcp_port: Option<u16>,
    pub allow_tcp: bool,
}

impl ServerOptions {
    /// Apply defaults and validate.
    ///
    /// The route follows the subnet whenever no route was provided. The
    /// image would otherwise skip `redirect-gateway def1` in client configs
    /// or inject a static route for the wrong network.
    pub fn resolve(self) -> Result<ServerConfig> {
        let subnet = self.subnet.unwrap_or_else(|| DEFAULT_SUBNET.to_string());
        parse_network("subnet", &subnet)?;

        let route = match self.route {
            Some(route) => {
                parse_network("route", &route)?;
                route
            }
            None => subnet.clone(),
        };

        let dns_servers = if self.dns_servers.is_empty() {
            vec![DEFAULT_DNS_SERVER.to_string()]
        } else {
            self.dns_servers
        };
        for server in &dns_servers {
            server.parse::<IpAddr>().map_err(|_| {
                Error::InvalidConfig(format!("DNS server '{}' is not an IP address", server))
            })?;
        }

        let vpn_address = match self.vpn_address {
            Some(address) if address.trim().is_empty() => {
                return Err(Error::InvalidConfig("VPN address must not be empty".to_string()));
            }
            other => other,
        };

        let udp_port = check_port("UDP", self.udp_port.unwrap_or(DEFAULT_PORT))?;
        let tcp_port = check_port("TCP", self.tcp_port.unwrap_or(DEFAULT_PORT))?;

        Ok(ServerConfig {
            vpn_address,
            dns_servers,
            subnet,
            route,
            udp_port,
            tcp_port,
            allow_tcp: self.allow_tcp,
        })
    }
}

fn parse_network(field: &str, value: &str) -> Result<IpNetwork> {
    value.parse::<IpNetwork>().map_err(|e| {
        Error::InvalidConfig(format!("{} '{}' is not a valid CIDR network: {}", field, value, e))
    })
}

fn check_port(proto: &str, port: u16) -> Result<u16> {
    if port == 0 {
        return Err(Error::InvalidConfig(format!("{} port must not be 0", proto)));
    }
    Ok(port)
}

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// Public address of the server; detected when unset
    pub vpn_address: Option<String>,
    pub dns_servers: Vec<String>,
    pub subnet: String,
    pub route: String,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub allow_tcp: bool,
}

impl ServerConfig {
    /// Copy of this config with the server address filled in
    pub fn with_address(&self, address: impl Into<String>) -> Self {
        Self {
            vpn_address: Some(address.into()),
            ..self.clone()
        }
    }
}

/// Operator notice printed after provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// The server address was auto-detected
    AddressDetected(String),
    /// The UDP host port differs from the port written into client configs
    EditUdpPort,
    /// Clients need manual edits to use the TCP server
    EditForTcp,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::AddressDetected(address) => write!(
                f,
                "Auto-detected your IP address as {}. If this is incorrect, override the value with the --vpn-address option.",
                address
            ),
            Notice::EditUdpPort => {
                write!(f, "Be sure to edit the port number in the client configuration!")
            }
            Notice::EditForTcp => write!(
                f,
                "You will need to edit the client configuration if you wish to connect using TCP."
            ),
        }
    }
}

/// Notices shown at the end of server provisioning
pub fn closing_notices(config: &ServerConfig) -> Vec<Notice> {
    let mut notices = Vec::new();
    if config.udp_port != CONTAINER_PORT {
        notices.push(Notice::EditUdpPort);
    }
    if config.allow_tcp {
        notices.push(Notice::EditForTcp);
    }
    notices
}
