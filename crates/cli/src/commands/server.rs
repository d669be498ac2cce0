//! Server Commands
//!
//! Provisions a new OpenVPN server instance.

use anyhow::Result;
use clap::Args;
use ovpnkit_common::{CommandRunner, Orchestrator, ServerOptions};

use crate::output::{print_info, print_notices, print_plan, print_success, OutputFormat};

#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Address of the OpenVPN server, defaults to the first non-loopback IP address found
    #[arg(short = 'v', long)]
    pub vpn_address: Option<String>,

    /// DNS server pushed to clients; repeat for several. Defaults to 9.9.9.9
    #[arg(short = 'd', long = "dns-server", value_name = "DNS_SERVER")]
    pub dns_servers: Vec<String>,

    /// Subnet to use for clients [default: 10.0.0.0/24]
    #[arg(short, long)]
    pub subnet: Option<String>,

    /// Route to add to the server configuration, defaults to the subnet.
    /// Only set this if you know what you're doing
    #[arg(short, long)]
    pub route: Option<String>,

    /// UDP port for the OpenVPN server [default: 1194]
    #[arg(short, long)]
    pub udp_port: Option<u16>,

    /// TCP port for the OpenVPN server [default: 1194]
    #[arg(short, long)]
    pub tcp_port: Option<u16>,

    /// Also start a TCP fallback server
    #[arg(short, long)]
    pub allow_tcp: bool,
}

impl From<ServerArgs> for ServerOptions {
    fn from(args: ServerArgs) -> Self {
        Self {
            vpn_address: args.vpn_address,
            dns_servers: args.dns_servers,
            subnet: args.subnet,
            route: args.route,
            udp_port: args.udp_port,
            tcp_port: args.tcp_port,
            allow_tcp: args.allow_tcp,
        }
    }
}

pub fn execute<R: CommandRunner>(
    orchestrator: &Orchestrator<R>,
    purpose: &str,
    args: ServerArgs,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let server = ServerOptions::from(args).resolve()?;

    if dry_run {
        let plan = orchestrator.plan_instance(purpose, &server)?;
        print_plan(&plan, format);
        return Ok(());
    }

    let report = orchestrator.create_instance(purpose, &server, |notice| {
        print_info(&notice.to_string());
        println!();
    })?;

    print_success(&format!("Started {}", report.containers.join(", ")));
    print_notices(&report.notices);

    Ok(())
}
