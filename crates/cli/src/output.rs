//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ovpnkit_common::{Notice, Plan};

/// Width of the banner printed before closing notices
const BANNER_WIDTH: usize = 80;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Render a plan in the requested format
pub fn render_plan(plan: &Plan, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(vec!["#", "Step", "Command"]);
            for (i, step) in plan.steps.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    step.description.clone(),
                    step.command.to_string(),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
        OutputFormat::Plain => plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}\n   {}", i + 1, step.description, step.command))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Print a plan
pub fn print_plan(plan: &Plan, format: OutputFormat) {
    if format != OutputFormat::Json {
        print_info(&format!(
            "Dry run for instance '{}' ({} steps, nothing will be executed)",
            plan.instance.purpose,
            plan.steps.len()
        ));
    }
    println!("{}", render_plan(plan, format));
}

/// Banner line followed by one notice per line
pub fn render_notices(notices: &[Notice]) -> String {
    std::iter::once("=".repeat(BANNER_WIDTH))
        .chain(notices.iter().map(Notice::to_string))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the banner and closing notices after provisioning a server
pub fn print_notices(notices: &[Notice]) {
    println!();
    let rendered = render_notices(notices);
    let mut lines = rendered.lines();
    if let Some(banner) = lines.next() {
        println!("{}", banner.bold());
    }
    for line in lines {
        println!("{}", line.yellow());
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
