use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Runs `script` with `bash -eux -o pipefail` inside `working_dir`.
/// Any non-zero exit is an error.
pub async fn run_task_script(script: &Path, working_dir: &Path) -> Result<()> {
    tracing::info!(script = %script.display(), cwd = %working_dir.display(), "running task script");
    let status = Command::new("bash")
        .args(["-eux", "-o", "pipefail"])
        .arg(script)
        .current_dir(working_dir)
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("failed to spawn bash for {}", script.display()))?;

    if !status.success() {
        bail!(
            "task script {} exited with {}",
            script.display(),
            status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| code.to_string())
        );
    }
    Ok(())
}
