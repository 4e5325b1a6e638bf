//! Runs the branch's verify command against the merged tree.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tarmac_git::BranchOps;
use tarmac_review::Proposal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{MergeError, MergeErrorKind, MergeSkipError};
use crate::hooks::{Hook, HookContext, HookError, HookResult};

/// Output longer than this many lines is trimmed.
const MAX_OUTPUT_LINES: usize = 3000;

/// Lines kept from each end of trimmed output.
const KEPT_OUTPUT_LINES: usize = 100;

const TRIMMED_MARKER: &str = "\n\n\n... OUTPUT TRIMMED ... \n\n\n";

/// Pre-commit hook running `setup_command` and `verify_command`.
///
/// The merged tree is exported to a temporary directory first so commands
/// never touch the target's working tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyCommand;

#[async_trait(?Send)]
impl<B: BranchOps> Hook<B> for VerifyCommand {
    fn name(&self) -> &str {
        "Command"
    }

    async fn pre_commit(
        &self,
        ctx: &HookContext<'_>,
        target: &B,
        _source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        let config = ctx.branch_config;
        let Some(verify) = config.verify_command.as_deref() else {
            return Ok(());
        };

        let tree = tempfile::Builder::new()
            .prefix("tarmac.")
            .tempdir()
            .map_err(|err| HookError::Failed(err.into()))?;
        target
            .export_tree(tree.path())
            .map_err(|err| HookError::Failed(err.into()))?;

        let overall = Duration::from_secs(config.verify_command_timeout);

        if let Some(setup) = config.setup_command.as_deref() {
            debug!(command = setup, "running setup command");
            let run = run_command(setup, tree.path(), overall, None)
                .await
                .map_err(|err| HookError::Failed(err.into()))?;
            if let Some(reason) = run.setup_failure() {
                let output = trim_output(&run.output);
                info!(command = setup, output = %output, "setup command failed");
                return Err(MergeSkipError {
                    message: format!("Setup command \"{setup}\" failed: {reason}"),
                    output: Some(output),
                }
                .into());
            }
        }

        debug!(command = verify, "running test command");
        let idle = Duration::from_secs(config.verify_command_output_timeout);
        let run = run_command(verify, tree.path(), overall, Some(idle))
            .await
            .map_err(|err| HookError::Failed(err.into()))?;
        debug!(command = verify, "completed test command");

        let Some(reason) = run.verify_failure() else {
            return Ok(());
        };
        let output = trim_output(&run.output);
        info!(command = verify, output = %output, "test command failed");
        let comment = format!(
            "The attempt to merge {} into {} failed. {reason}\n\
             Below is the output from the failed tests.\n\n{output}",
            proposal.source.display_name, proposal.target.display_name,
        );
        Err(MergeError::new(
            MergeErrorKind::VerifyCommandFailed,
            format!("Test command \"{verify}\" failed: {reason}"),
        )
        .with_comment(comment)
        .into())
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    /// Exit code; `None` when killed by a signal.
    Exited(Option<i32>),
    /// Ran past the overall limit.
    TimedOut(Duration),
    /// Produced no output for too long.
    Silent(Duration),
}

#[derive(Debug)]
struct CommandRun {
    termination: Termination,
    /// Interleaved stdout and stderr.
    output: String,
}

impl CommandRun {
    fn exit_failure(&self) -> Option<String> {
        match self.termination {
            Termination::Exited(Some(0)) => None,
            Termination::Exited(Some(code)) => Some(format!("Command exited with {code}.")),
            Termination::Exited(None) => Some("Command was killed by a signal.".into()),
            _ => None,
        }
    }

    fn verify_failure(&self) -> Option<String> {
        match self.termination {
            Termination::TimedOut(limit) => Some(format!(
                "(`verify_command_timeout`) Command ran for more than {} seconds.",
                limit.as_secs()
            )),
            Termination::Silent(limit) => Some(format!(
                "(`verify_command_output_timeout`) Command sent no output for {} seconds.",
                limit.as_secs()
            )),
            Termination::Exited(_) => self.exit_failure(),
        }
    }

    fn setup_failure(&self) -> Option<String> {
        match self.termination {
            Termination::TimedOut(limit) | Termination::Silent(limit) => Some(format!(
                "Command timed out after {} seconds.",
                limit.as_secs()
            )),
            Termination::Exited(_) => self.exit_failure(),
        }
    }
}

/// Run `command` through `sh -c` in `dir`, capturing its output.
async fn run_command(
    command: &str,
    dir: &Path,
    overall: Duration,
    idle: Option<Duration>,
) -> std::io::Result<CommandRun> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(std::io::Error::other("command output is not captured"));
    };
    let mut stdout = BufReader::new(stdout).lines();
    let mut stderr = BufReader::new(stderr).lines();

    let deadline = Instant::now() + overall;
    let mut output = String::new();
    let (mut stdout_open, mut stderr_open) = (true, true);

    while stdout_open || stderr_open {
        let silence = async {
            match idle {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        let line = tokio::select! {
            line = stdout.next_line(), if stdout_open => line?.or_else(|| {
                stdout_open = false;
                None
            }),
            line = stderr.next_line(), if stderr_open => line?.or_else(|| {
                stderr_open = false;
                None
            }),
            () = tokio::time::sleep_until(deadline) => {
                child.kill().await?;
                return Ok(CommandRun { termination: Termination::TimedOut(overall), output });
            }
            () = silence => {
                child.kill().await?;
                let limit = idle.unwrap_or_default();
                return Ok(CommandRun { termination: Termination::Silent(limit), output });
            }
        };
        if let Some(line) = line {
            output.push_str(&line);
            output.push('\n');
        }
    }

    let Ok(status) = tokio::time::timeout_at(deadline, child.wait()).await else {
        child.kill().await?;
        return Ok(CommandRun {
            termination: Termination::TimedOut(overall),
            output,
        });
    };
    Ok(CommandRun {
        termination: Termination::Exited(status?.code()),
        output,
    })
}

/// Keep the head and tail of very long output.
#[must_use]
pub fn trim_output(output: &str) -> String {
    let lines: Vec<&str> = output.split_inclusive('\n').collect();
    if lines.len() <= MAX_OUTPUT_LINES {
        return output.to_string();
    }
    let mut trimmed = lines[..KEPT_OUTPUT_LINES].concat();
    trimmed.push_str(TRIMMED_MARKER);
    trimmed.push_str(&lines[lines.len() - KEPT_OUTPUT_LINES..].concat());
    trimmed
}
