//! App management commands

use colored::Colorize;

use super::confirm_action;
use crate::cli::AppsCommands;
use crate::connection::ConnectionManager;
use crate::error::{DatacolError, Result};
use crate::output::{self, OutputFormat};

pub async fn handle_apps_command(
    command: &AppsCommands,
    conn: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<()> {
    let gateway = conn.gateway()?;

    match command {
        AppsCommands::List => {
            let apps = gateway.list_apps().await?;
            if apps.is_empty() && !output_format.is_structured() {
                println!("No apps on stack {}", gateway.stack());
                return Ok(());
            }
            output::print_output(apps, output_format)?;
        }
        AppsCommands::Get { name } => {
            let app = gateway.get_app(name).await?;
            output::print_output(app, output_format)?;
        }
        AppsCommands::Create { name } => {
            let app = gateway.create_app(name).await?;
            if output_format.is_structured() {
                output::print_output(app, output_format)?;
            } else {
                println!("{} Created app {}", "✓".green(), app.name.bold());
            }
        }
        AppsCommands::Delete { name, yes } => {
            if !yes && !confirm_action(&format!("Delete app '{}'?", name), false)? {
                return Err(DatacolError::Cancelled {
                    message: format!("app '{}' was not deleted", name),
                });
            }
            gateway.delete_app(name).await?;
            println!("{} Deleted app {}", "✓".green(), name.bold());
        }
        AppsCommands::Restart { name } => {
            gateway.restart_app(name).await?;
            println!("{} Restarted app {}", "✓".green(), name.bold());
        }
    }

    Ok(())
}
