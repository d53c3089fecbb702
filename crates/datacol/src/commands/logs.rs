//! Log streaming

use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::{DatacolError, Result};

pub async fn handle_logs(
    conn: &ConnectionManager,
    name: Option<&str>,
    follow: bool,
    since: Duration,
) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => default_app_name(&std::env::current_dir()?)?,
    };
    debug!("Streaming logs of {}", name);

    let gateway = conn.gateway()?;
    let mut sink = std::io::stdout();
    gateway
        .stream_app_logs(&name, follow, since, &mut sink)
        .await?;
    Ok(())
}

/// Apps default to the name of the directory they are deployed from
fn default_app_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DatacolError::InvalidInput {
            message: format!("cannot derive an app name from {}", dir.display()),
        })
}
