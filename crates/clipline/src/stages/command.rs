use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::StageFailure;

/// How much of a tool's stderr is kept in the failure diagnostic.
const STDERR_TAIL_BYTES: usize = 2048;

/// Runs an external tool to completion and returns its stdout.
///
/// The child is killed if the returned future is dropped, so a stage
/// timeout does not leave orphan processes behind. A non-zero exit becomes
/// [`StageFailure::Tool`] carrying the tail of stderr.
pub async fn run_tool(program: &str, args: &[String]) -> Result<String, StageFailure> {
    debug!(program, args = ?args, "Running tool");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command.output().await.map_err(|e| StageFailure::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let tail = tail(&stderr, STDERR_TAIL_BYTES).trim().to_string();
        warn!(program, status = %output.status, stderr = %tail, "Tool failed");
        return Err(StageFailure::Tool {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: tail,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn tail(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
