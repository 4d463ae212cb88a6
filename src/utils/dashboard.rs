use std::{
    path::Path,
    process::{Child, Command, Stdio},
};

use tracing::{info, warn};

/// Builds `<program> [args..] --logdir <log_dir>`. `dashboard_cmd` is split on whitespace.
pub fn dashboard_command(dashboard_cmd: &str, log_dir: &Path) -> Option<Command> {
    let mut parts = dashboard_cmd.split_whitespace();
    let program = parts.next()?;

    let mut command = Command::new(program);
    command.args(parts).arg("--logdir").arg(log_dir);
    Some(command)
}

/// Starts the metrics dashboard in the background. A failed launch is only a warning.
pub fn launch_dashboard(dashboard_cmd: &str, log_dir: &Path) -> Option<Child> {
    let Some(mut command) = dashboard_command(dashboard_cmd, log_dir) else {
        warn!("dashboard command is empty, not launching");
        return None;
    };

    match command.stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
        Ok(child) => {
            info!(command = dashboard_cmd, log_dir = %log_dir.display(), pid = child.id(), "dashboard started");
            Some(child)
        }
        Err(e) => {
            warn!(command = dashboard_cmd, error = %e, "could not start dashboard");
            None
        }
    }
}
