//! Remote command execution

use std::io::Write;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::{DatacolError, Result};

/// Run `command` for `app` and return the exit status to terminate with
pub async fn handle_run(
    conn: &ConnectionManager,
    app: &str,
    command: &[String],
    via_controller: bool,
) -> Result<i32> {
    let gateway = conn.gateway()?;
    gateway.get_app(app).await?;

    if via_controller {
        debug!("Running {:?} on {} through the controller", command, app);
        let response = gateway.run_process(app, command).await?;
        std::io::stdout().write_all(response.stdout.as_bytes())?;
        std::io::stderr().write_all(response.stderr.as_bytes())?;
        return Ok(response.exit_code);
    }

    let client = conn.client()?;
    let kubeconfig = client.kubeconfig_path();
    if !kubeconfig.is_file() {
        return Err(DatacolError::ClusterConfigMissing {
            stack: client.stack_name.clone(),
            path: kubeconfig,
        });
    }

    let provider = conn.provider(&client)?;
    let outcome = conn
        .exec_bridge()
        .run(provider.as_ref(), &client.stack_name, app, command)
        .await?;

    outcome.emit(&mut std::io::stdout(), &mut std::io::stderr())?;
    Ok(outcome.status)
}
