//! Client Commands
//!
//! Generates a client certificate and configuration for an existing instance.

use anyhow::Result;
use ovpnkit_common::{CommandRunner, Orchestrator};

use crate::output::{print_plan, print_success, OutputFormat};

pub fn execute<R: CommandRunner>(
    orchestrator: &Orchestrator<R>,
    purpose: &str,
    name: &str,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    if dry_run {
        let plan = orchestrator.plan_client(purpose, name)?;
        print_plan(&plan, format);
        return Ok(());
    }

    let path = orchestrator.create_client(purpose, name)?;
    print_success(&format!(
        "Generated client certificate and configuration: {}",
        path.display()
    ));

    Ok(())
}
