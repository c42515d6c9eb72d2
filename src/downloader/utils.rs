// Helper functions shared by the extractor and transcoder

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};
use tracing::debug;

use super::errors::{LeechError, LeechResult, ToolError};

/// Run a command to completion, capturing stdout and stderr.
///
/// With `timeout_secs` set the child is killed once the deadline passes. The
/// child is also killed if the returned future is dropped.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: Option<u64>,
) -> Result<Output, ToolError> {
    debug!(program, args = %args.join(" "), "spawning");

    let spawn_err = |message: String| ToolError::Spawn {
        program: program.to_string(),
        message,
    };

    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(program.to_string()),
            _ => spawn_err(e.to_string()),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| spawn_err("failed to capture stdout".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| spawn_err("failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match timeout_secs {
        Some(secs) => match timeout(TokioDuration::from_secs(secs), child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ToolError::TimedOut {
                    program: program.to_string(),
                    secs,
                });
            }
        },
        None => child.wait().await,
    }
    .map_err(|e| spawn_err(format!("failed to wait: {}", e)))?;

    let stdout = join_pipe(stdout_task).await.map_err(spawn_err)?;
    let stderr = join_pipe(stderr_task).await.map_err(spawn_err)?;

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, String> {
    task.await
        .map_err(|e| format!("pipe reader task failed: {}", e))?
        .map_err(|e| format!("failed to read pipe: {}", e))
}

/// Run a command and treat a non-zero exit as failure
pub async fn run_checked(
    program: &str,
    args: Vec<String>,
    timeout_secs: Option<u64>,
) -> Result<Output, ToolError> {
    let output = run_output_with_timeout(program, args, timeout_secs).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Exit {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub async fn file_size(path: &Path) -> LeechResult<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| LeechError::io(path, e))
}

/// Largest regular file directly inside `dir`
pub async fn largest_file(dir: &Path) -> LeechResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| LeechError::io(dir, e))?;

    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LeechError::io(dir, e))?
    {
        let meta = entry
            .metadata()
            .await
            .map_err(|e| LeechError::io(entry.path(), e))?;
        if !meta.is_file() {
            continue;
        }
        if best.as_ref().map_or(true, |(size, _)| meta.len() > *size) {
            best = Some((meta.len(), entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn largest_file_ignores_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("small.part"), vec![0u8; 10]).expect("write");
        std::fs::write(dir.path().join("video.mp4"), vec![0u8; 100]).expect("write");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");

        let picked = largest_file(dir.path()).await.expect("scan");

        assert_eq!(picked, Some(dir.path().join("video.mp4")));
    }

    #[tokio::test]
    async fn largest_file_of_empty_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(largest_file(dir.path()).await.expect("scan"), None);
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let result = run_output_with_timeout("definitely-not-a-real-binary-xyz", vec![], Some(5)).await;
        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let result = run_checked(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            Some(5),
        )
        .await;

        match result {
            Err(ToolError::Exit { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child() {
        let result = run_output_with_timeout(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Some(1),
        )
        .await;

        assert!(matches!(result, Err(ToolError::TimedOut { secs: 1, .. })));
    }
}
