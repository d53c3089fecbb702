//! App environment commands

use colored::Colorize;
use tracing::debug;

use crate::cli::EnvCommands;
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::output::{self, OutputFormat};

pub async fn handle_env_command(
    command: &EnvCommands,
    conn: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<()> {
    let gateway = conn.gateway()?;

    match command {
        EnvCommands::Get { name } => {
            let env = gateway.get_environment(name).await?;
            output::print_output(env, output_format)?;
        }
        EnvCommands::Set { name, vars } => {
            let data = env_data(vars);
            debug!("Setting {} variables on {}", vars.len(), name);
            gateway.set_environment(name, &data).await?;
            println!(
                "{} Updated environment of {} ({} variables)",
                "✓".green(),
                name.bold(),
                vars.len()
            );
        }
    }

    Ok(())
}

/// `KEY=VALUE` lines in the order given
fn env_data(vars: &[(String, String)]) -> String {
    vars.iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}
