// Helper functions shared by the yt-dlp extractor and backend

use std::io;
use std::path::Path;
use std::process::{Output, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

/// Run a command to completion, killing it after `timeout_secs`.
///
/// A timeout is reported as `io::ErrorKind::TimedOut`.
pub async fn run_output_with_timeout(
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> io::Result<Output> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stderr not captured"))?;

    // Drain both pipes concurrently so a chatty child cannot fill one and block
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status = status?;
            let stdout = stdout_task.await.map_err(io::Error::other)??;
            let stderr = stderr_task.await.map_err(io::Error::other)??;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} timed out after {}s", program.display(), timeout_secs),
            ))
        }
    }
}

/// Build proxy arguments for yt-dlp
pub fn proxy_args(proxy: Option<&str>) -> Vec<String> {
    match proxy {
        Some(p) if !p.trim().is_empty() => vec!["--proxy".to_string(), p.trim().to_string()],
        _ => Vec::new(),
    }
}

/// First lines of tool output that look like errors, joined for display.
pub fn error_summary(stderr: &str, max_lines: usize) -> String {
    let important: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:") || l.contains("HTTP Error"))
        .take(max_lines)
        .collect();

    if !important.is_empty() {
        return important.join(" | ");
    }

    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
        .chars()
        .take(200)
        .collect()
}
