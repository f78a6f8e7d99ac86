//! Output formatting for the `topics` command: table or JSON.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use ihcbridge_core::Binding;

use crate::cli::OutputFormat;
use crate::error::CliError;

#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "State topic")]
    state: String,
    #[tabled(rename = "Command topic")]
    command: String,
}

impl From<&Binding> for BindingRow {
    fn from(b: &Binding) -> Self {
        Self {
            resource: b.resource.raw.clone(),
            id: b.id().get(),
            direction: b.direction.to_string(),
            state: b.state_topic.clone(),
            command: b.command_topic.clone().unwrap_or_default(),
        }
    }
}

/// Render bindings in the chosen format.
pub fn render_bindings(format: OutputFormat, bindings: &[Binding]) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<BindingRow> = bindings.iter().map(BindingRow::from).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(bindings)?,
    })
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
