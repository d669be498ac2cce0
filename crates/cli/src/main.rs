//! ovpnkit CLI - Main Entry Point
//!
//! Creates containerized OpenVPN server instances and generates client
//! configurations for them.

use anyhow::Context;
use clap::Parser;
use ovpnkit_common::config::DEFAULT_CONFIG_FILE;
use ovpnkit_common::{CommandRunner, ContainerRuntime, Error, Orchestrator, SystemRunner, ToolConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod commands;
mod output;

use commands::{client, server};

/// ovpnkit - OpenVPN Docker setup
#[derive(Parser, Debug)]
#[command(name = "ovpnkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Purpose of the VPN, e.g. torrent. Names the container and its data directory
    #[arg(short, long)]
    purpose: String,

    /// Name of the OpenVPN client to create
    #[arg(short, long)]
    client: Option<String>,

    #[command(flatten)]
    server: server::ServerArgs,

    /// Configuration file path
    #[arg(long, env = "OVPNKIT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Container runtime (docker or podman), detected when unset
    #[arg(long, env = "OVPNKIT_RUNTIME")]
    runtime: Option<ContainerRuntime>,

    /// OpenVPN server image
    #[arg(long, env = "OVPNKIT_IMAGE")]
    image: Option<String>,

    /// Print the commands that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Output format for --dry-run
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("Error: {:#}", e));
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    run_with(cli, SystemRunner)
}

fn run_with<R: CommandRunner>(cli: Cli, runner: R) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match config.runtime {
        Some(runtime) => debug!("Using {} with image {}", runtime, config.image),
        None => debug!("Runtime not pinned, image {}", config.image),
    }

    let orchestrator = Orchestrator::new(config, runner);

    match &cli.client {
        Some(name) => client::execute(&orchestrator, &cli.purpose, name, cli.dry_run, cli.format),
        None => server::execute(
            &orchestrator,
            &cli.purpose,
            cli.server.clone(),
            cli.dry_run,
            cli.format,
        ),
    }
}

/// Configuration file values overridden by command-line flags
fn load_config(cli: &Cli) -> anyhow::Result<ToolConfig> {
    let mut config = ToolConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    if let Some(runtime) = cli.runtime {
        config.runtime = Some(runtime);
    }
    if let Some(image) = &cli.image {
        config.image = image.clone();
    }

    Ok(config)
}

/// Precondition and validation failures exit with 1; external command
/// failures pass the child's exit code through.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovpnkit_common::ExternalCommand;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ovpnkit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_purpose_required() {
        assert!(Cli::try_parse_from(["ovpnkit"]).is_err());
        assert!(Cli::try_parse_from(["ovpnkit", "--client", "laptop"]).is_err());
    }

    #[test]
    fn test_defaults_are_unset() {
        let cli = parse(&["--purpose", "torrent"]);
        assert_eq!(cli.purpose, "torrent");
        assert_eq!(cli.client, None);
        assert_eq!(cli.server.subnet, None);
        assert_eq!(cli.server.route, None);
        assert_eq!(cli.server.udp_port, None);
        assert!(cli.server.dns_servers.is_empty());
        assert!(!cli.server.allow_tcp);
        assert!(!cli.dry_run);
        assert_eq!(cli.format, output::OutputFormat::Table);
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&[
            "-p", "torrent", "-v", "203.0.113.9", "-d", "1.1.1.1", "-d", "8.8.8.8", "-s",
            "192.168.255.0/24", "-u", "443", "-t", "8443", "-a",
        ]);
        assert_eq!(cli.server.vpn_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(cli.server.dns_servers, vec!["1.1.1.1", "8.8.8.8"]);
        assert_eq!(cli.server.subnet.as_deref(), Some("192.168.255.0/24"));
        assert_eq!(cli.server.udp_port, Some(443));
        assert_eq!(cli.server.tcp_port, Some(8443));
        assert!(cli.server.allow_tcp);

        let resolved = ovpnkit_common::ServerOptions::from(cli.server).resolve().unwrap();
        assert_eq!(resolved.route, "192.168.255.0/24");
    }

    #[test]
    fn test_client_and_runtime_flags() {
        let cli = parse(&["-p", "torrent", "-c", "laptop", "--runtime", "podman", "--dry-run"]);
        assert_eq!(cli.client.as_deref(), Some("laptop"));
        assert_eq!(cli.runtime, Some(ContainerRuntime::Podman));
        assert!(cli.dry_run);

        assert!(Cli::try_parse_from(["ovpnkit", "-p", "x", "--runtime", "lxc"]).is_err());
        assert!(Cli::try_parse_from(["ovpnkit", "-p", "x", "--udp-port", "70000"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ovpnkit.toml");
        std::fs::write(&path, "runtime = \"docker\"\nimage = \"example/openvpn\"\n").unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let cli = parse(&["-p", "torrent", "--config", &path_arg]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.runtime, Some(ContainerRuntime::Docker));
        assert_eq!(config.image, "example/openvpn");

        let cli = parse(&["-p", "torrent", "--config", &path_arg, "--runtime", "podman", "--image", "local/ovpn"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.runtime, Some(ContainerRuntime::Podman));
        assert_eq!(config.image, "local/ovpn");
    }

    #[test]
    fn test_exit_codes() {
        let missing: anyhow::Error = Error::InstanceMissing {
            path: PathBuf::from("container-data/torrent"),
        }
        .into();
        assert_eq!(exit_code(&missing), 1);

        let failed: anyhow::Error = Error::CommandFailed {
            command: "docker run".to_string(),
            code: Some(125),
        }
        .into();
        assert_eq!(exit_code(&failed), 125);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_dry_run_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = ToolConfig {
            runtime: Some(ContainerRuntime::Docker),
            data_root: tmp.path().join("container-data"),
            client_root: tmp.path().join("client-configurations"),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(config, SystemRunner);

        server::execute(
            &orchestrator,
            "torrent",
            server::ServerArgs::default(),
            true,
            output::OutputFormat::Plain,
        )
        .unwrap();
        assert!(!tmp.path().join("container-data").exists());
    }

    /// No runtime or host tool can be spawned
    struct EmptyPath;

    impl CommandRunner for EmptyPath {
        fn run(&self, command: &ExternalCommand) -> ovpnkit_common::Result<()> {
            Err(not_found(command))
        }

        fn capture(&self, command: &ExternalCommand) -> ovpnkit_common::Result<String> {
            Err(not_found(command))
        }
    }

    fn not_found(command: &ExternalCommand) -> Error {
        Error::CommandSpawn {
            program: command.program.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
    }

    fn write_config(tmp: &TempDir) -> String {
        let path = tmp.path().join("ovpnkit.toml");
        let content = format!(
            "data_root = {:?}\nclient_root = {:?}\n",
            tmp.path().join("container-data").to_string_lossy(),
            tmp.path().join("client-configurations").to_string_lossy(),
        );
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_missing_instance_reported_without_runtime() {
        let tmp = TempDir::new().unwrap();
        let config = write_config(&tmp);

        let cli = parse(&["-p", "torrent", "-c", "laptop", "--config", &config]);
        let err = run_with(cli, EmptyPath).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InstanceMissing { .. })
        ));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_existing_instance_reported_without_runtime() {
        let tmp = TempDir::new().unwrap();
        let config = write_config(&tmp);
        std::fs::create_dir_all(tmp.path().join("container-data").join("torrent")).unwrap();

        let cli = parse(&["-p", "torrent", "-v", "203.0.113.5", "--config", &config]);
        let err = run_with(cli, EmptyPath).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InstanceExists { .. })
        ));

        let cli = parse(&["-p", "home", "-v", "203.0.113.5", "--config", &config]);
        let err = run_with(cli, EmptyPath).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::RuntimeUnavailable)));
    }
}
