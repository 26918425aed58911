//! External command invocation.
//!
//! The provisioning CLI and the package manager are consumed as black
//! boxes. Commands always run with an explicit working directory; the
//! process-wide current directory is never changed.

use std::path::Path;

use anyhow::Context;

/// Runs a command, inheriting stdio so the user sees its output live.
pub async fn run(program: &str, args: &[&str], dir: &Path) -> anyhow::Result<()> {
    log::debug!("running `{program} {}` in {}", args.join(" "), dir.display());
    let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .status()
        .await
        .with_context(|| format!("could not spawn `{program}`"))?;
    anyhow::ensure!(
        status.success(),
        "`{program} {}` exited with {status}",
        args.join(" ")
    );
    Ok(())
}

/// Runs a command silently and returns its trimmed stdout.
pub async fn capture(program: &str, args: &[&str], dir: &Path) -> anyhow::Result<String> {
    log::debug!(
        "capturing `{program} {}` in {}",
        args.join(" "),
        dir.display()
    );
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("could not spawn `{program}`"))?;
    anyhow::ensure!(
        output.status.success(),
        "`{program} {}` exited with {}: {}",
        args.join(" "),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    );
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
