//! Helpers for running child processes with merged, line-streamed output.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::error::Cancelled;

/// Lines buffered between the pipe readers and the consumer.
const LINE_BUFFER: usize = 256;

/// Run `cmd`, delivering every line of stdout and stderr (merged, in arrival
/// order) to `on_line`, and return the exit status.
///
/// Both pipes are drained concurrently so neither can fill and deadlock the
/// child. If `cancel` fires first the child is killed and [`Cancelled`] is
/// returned.
#[instrument(skip_all, fields(program = ?cmd.as_std().get_program()))]
pub async fn run_streaming<F>(
    mut cmd: Command,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<ExitStatus>
where
    F: FnMut(&str),
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
    let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone()));
    let stderr_task = tokio::spawn(forward_lines(stderr, tx));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stdout_task.abort();
                stderr_task.abort();
                kill_quietly(&mut child).await;
                return Err(Cancelled.into());
            }
            line = rx.recv() => match line {
                Some(line) => on_line(&line),
                None => break,
            },
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            kill_quietly(&mut child).await;
            return Err(Cancelled.into());
        }
        status = child.wait() => status.context("wait for command")?,
    };

    for (label, task) in [("stdout", stdout_task), ("stderr", stderr_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(stream = label, err = %err, "output reader failed"),
            Err(err) => warn!(stream = label, err = %err, "output reader panicked"),
        }
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(status)
}

/// Read `reader` line by line (lossy UTF-8) and forward each line to `tx`.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await.context("read line")?;
        if n == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if tx.send(line).await.is_err() {
            // Consumer went away (cancelled); stop reading.
            return Ok(());
        }
    }
}

async fn kill_quietly(child: &mut Child) {
    warn!("cancelled, killing child process");
    if let Err(err) = child.kill().await {
        warn!(err = %err, "failed to kill child process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn merges_stdout_and_stderr_lines() {
        let cancel = CancellationToken::new();
        let mut lines = Vec::new();
        let status = run_streaming(sh("echo out; echo err 1>&2; echo done"), &cancel, |l| {
            lines.push(l.to_string())
        })
        .await
        .expect("run");

        assert!(status.success());
        lines.sort();
        assert_eq!(lines, vec!["done", "err", "out"]);
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let cancel = CancellationToken::new();
        let status = run_streaming(sh("exit 3"), &cancel, |_| {})
            .await
            .expect("run");
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn spawn_failure_is_error() {
        let cancel = CancellationToken::new();
        let err = run_streaming(
            Command::new("definitely-not-a-real-binary-ralph"),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }

    /// Cancelling mid-run kills the child and surfaces `Cancelled` promptly.
    #[tokio::test]
    async fn cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = run_streaming(sh("echo begin; sleep 30"), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
