//! Stack lifecycle commands: init, destroy, stacks

use colored::Colorize;
use datacol_core::{Auth, InitRequest, StackLifecycle};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::confirm_action;
use crate::cli::InitArgs;
use crate::connection::ConnectionManager;
use crate::error::{DatacolError, Result};
use crate::output::{self, OutputFormat};

#[derive(Serialize)]
struct StackRow {
    name: String,
    project: String,
    zone: String,
    bucket: String,
    current: bool,
}

#[derive(Serialize)]
struct InitSummary<'a> {
    name: &'a str,
    project: &'a str,
    bucket: &'a str,
    api_server: &'a str,
    api_key: &'a str,
}

fn init_request(name: &str, args: &InitArgs) -> InitRequest {
    InitRequest {
        name: name.to_string(),
        zone: args.zone.clone(),
        bucket: args.bucket.clone(),
        num_nodes: args.nodes,
        cluster_name: args.cluster.clone(),
        disk_size: args.disk_size,
        machine_type: args.machine_type.clone(),
        preemptible: args.preemptible,
        opt_out: args.opt_out,
        api_key: args.password.clone(),
        cluster_version: args.cluster_version.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Password reminder and next command shown after a successful init
fn next_steps(auth: &Auth, store_file: &Path, credential_file: &Path) -> String {
    format!(
        "Stack password: {} (keep it secret; it is also stored in {})\n\
         Service account key: {}\n\
         Next, create an app with `STACK={} datacol apps create <name>`.",
        auth.api_key.bold(),
        store_file.display(),
        credential_file.display(),
        auth.name
    )
}

pub async fn handle_init(
    conn: &ConnectionManager,
    name: &str,
    args: &InitArgs,
    output_format: OutputFormat,
) -> Result<()> {
    let provider = conn.bootstrap_provider(name, &args.zone);
    let lifecycle = StackLifecycle::new(provider.as_ref(), conn.registry(), &conn.paths);

    eprintln!("Creating stack {}", name.bold());
    let pending = lifecycle.begin_init(init_request(name, args)).await?;
    debug!("Resolved init options: {:?}", pending.options());

    let confirmed = if args.yes {
        pending.confirm()
    } else {
        eprintln!("\n{}\n", pending.instructions());
        if confirm_action("Are the APIs enabled?", true)? {
            pending.confirm()
        } else {
            return Err(pending.decline().into());
        }
    };

    let outcome = lifecycle.complete_init(confirmed).await?;
    info!("Stack {} committed", outcome.stack.name);

    if output_format.is_structured() {
        output::print_output(
            InitSummary {
                name: &outcome.auth.name,
                project: &outcome.auth.project,
                bucket: &outcome.auth.bucket,
                api_server: &outcome.auth.api_server,
                api_key: &outcome.auth.api_key,
            },
            output_format,
        )?;
    } else {
        println!(
            "{} Stack {} is ready (project {}, controller {})",
            "✓".green(),
            outcome.stack.name.bold(),
            outcome.stack.project_id,
            outcome.auth.api_server
        );
        let client = conn.client_for(&outcome.stack.name)?;
        println!(
            "{}",
            next_steps(
                &outcome.auth,
                &conn.paths.store_file(),
                &client.credential_path()
            )
        );
    }
    Ok(())
}

pub async fn handle_destroy(conn: &ConnectionManager, yes: bool) -> Result<()> {
    let client = conn.client()?;
    let name = client.stack_name.clone();

    if !yes {
        let prompt = format!(
            "Destroy stack '{}'? This deletes its cluster, bucket, service account and {}.",
            name,
            client.config_root().display()
        );
        if !confirm_action(&prompt, false)? {
            return Err(DatacolError::Cancelled {
                message: format!("stack '{}' was not destroyed", name),
            });
        }
    }

    let provider = conn.provider(&client)?;
    let lifecycle = StackLifecycle::new(provider.as_ref(), conn.registry(), &conn.paths);

    eprintln!("Destroying stack {}", name.bold());
    let outcome = lifecycle.teardown(&name).await?;

    if !outcome.is_clean() {
        eprintln!(
            "{} the stack is gone but some local state was left behind:",
            "warning:".yellow().bold()
        );
        for error in &outcome.cleanup_errors {
            eprintln!("  {}", error);
        }
    }
    println!("{} Stack {} destroyed", "✓".green(), name.bold());
    Ok(())
}

pub async fn handle_stacks(conn: &ConnectionManager, output_format: OutputFormat) -> Result<()> {
    let registry = conn.registry();
    let current = registry.current_stack()?;

    let rows: Vec<StackRow> = registry
        .list_stacks()?
        .into_iter()
        .map(|stack| StackRow {
            current: current.as_deref() == Some(stack.name.as_str()),
            name: stack.name,
            project: stack.project_id,
            zone: stack.zone,
            bucket: stack.bucket,
        })
        .collect();
    debug!("Found {} stacks", rows.len());

    if rows.is_empty() && !output_format.is_structured() {
        println!("No stacks yet. Create one with: datacol init");
        return Ok(());
    }
    output::print_output(rows, output_format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_steps_show_password_and_stack() {
        colored::control::set_override(false);
        let auth = Auth {
            name: "prod".to_string(),
            project: "proj-1".to_string(),
            bucket: "datacol-proj-1".to_string(),
            api_server: "10.0.0.1".to_string(),
            api_key: "s3cr3t".to_string(),
        };
        let text = next_steps(
            &auth,
            Path::new("/home/op/.datacol/state.json"),
            Path::new("/home/op/.datacol/prod/credentials.json"),
        );

        assert!(text.contains("Stack password: s3cr3t (keep it secret"));
        assert!(text.contains("/home/op/.datacol/state.json"));
        assert!(text.contains("/home/op/.datacol/prod/credentials.json"));
        assert!(text.ends_with("`STACK=prod datacol apps create <name>`."));
    }

    #[test]
    fn test_init_request_uses_given_name() {
        let cli = <crate::cli::Cli as clap::Parser>::parse_from(["datacol", "init", "--nodes", "3"]);
        let crate::cli::Commands::Init(args) = cli.command else {
            panic!("expected init");
        };
        let request = init_request("prod", &args);
        assert_eq!(request.name, "prod");
        assert_eq!(request.num_nodes, 3);
        assert_eq!(request.zone, "us-east1-b");
    }
}
