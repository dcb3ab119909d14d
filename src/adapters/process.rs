use crate::domain::model::CommandOutput;
use crate::domain::ports::{CommandRunner, CommandSpec};
use crate::utils::error::{ConstructorError, Result};
use crate::utils::logger::LogContext;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

const READ_CHUNK_SIZE: usize = 1024;

/// Runs commands with `tokio::process`, draining stdout and stderr concurrently.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    log: LogContext,
}

impl ProcessRunner {
    pub fn new(log: LogContext) -> Self {
        Self {
            log: log.component("process"),
        }
    }

    fn log_command(&self, command: &CommandSpec) {
        let mut out = String::from("Run command:\n");
        if let Some(cwd) = &command.cwd {
            out.push_str(&format!("├─ $ cd {}\n", cwd.display()));
        }
        out.push_str(&format!("├─ $ {}", command.display()));
        tracing::debug!(parent: self.log.span(), "{}", out);
    }
}

/// Copies `reader` into a buffer until EOF, mirroring each chunk to `mirror`.
async fn drain<R, W>(mut reader: R, mut mirror: Option<W>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        captured.extend_from_slice(&chunk[..read]);
        if let Some(out) = mirror.as_mut() {
            out.write_all(&chunk[..read]).await?;
            out.flush().await?;
        }
    }
    Ok(captured)
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.log_command(command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| ConstructorError::CommandError {
            command: command.display(),
            exit_code: -1,
            stderr: e.to_string(),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let echo = command.echo;

        let stdout_task = async move {
            match stdout {
                Some(pipe) => drain(pipe, echo.then(tokio::io::stdout)).await,
                None => Ok(Vec::new()),
            }
        };
        let stderr_task = async move {
            match stderr {
                Some(pipe) => drain(pipe, echo.then(tokio::io::stderr)).await,
                None => Ok(Vec::new()),
            }
        };

        // Both readers finish when the child closes its pipes.
        let (stdout, stderr, status) = tokio::join!(stdout_task, stderr_task, child.wait());
        let status = status?;

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout?).into_owned(),
            stderr: String::from_utf8_lossy(&stderr?).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        };

        tracing::debug!(
            parent: self.log.span(),
            "Command finished with status {}",
            output.exit_code
        );
        Ok(output)
    }
}

/// Runs `command` and turns a non-zero exit into [`ConstructorError::CommandError`].
pub async fn run_checked(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(command).await?;
    if !output.success() {
        return Err(ConstructorError::CommandError {
            command: command.display(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// True when `program` resolves on `PATH`.
pub async fn check_executable(runner: &dyn CommandRunner, program: &str) -> bool {
    matches!(
        runner.run(&CommandSpec::new("which", [program])).await,
        Ok(output) if output.success()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_both_streams() {
        let runner = ProcessRunner::default();
        let command = CommandSpec::new("sh", ["-c", "echo out; echo err >&2; exit 3"]);

        let output = runner.run(&command).await.unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        let runner = ProcessRunner::default();
        let script = "i=0; while [ $i -lt 2000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done";
        let command = CommandSpec::new("sh", ["-c", script]);

        let output = runner.run(&command).await.unwrap();

        assert_eq!(output.stdout.lines().count(), 2000);
        assert_eq!(output.stderr.lines().count(), 2000);
        assert!(output.stdout.starts_with("line-0\nline-1\n"));
    }

    #[tokio::test]
    async fn test_run_checked_reports_stderr() {
        let runner = ProcessRunner::default();
        let command = CommandSpec::new("sh", ["-c", "echo boom >&2; exit 1"]);

        let err = run_checked(&runner, &command).await.unwrap_err();

        match err {
            ConstructorError::CommandError {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let runner = ProcessRunner::default();
        let command = CommandSpec::new("definitely-not-a-real-binary-xyz", Vec::<String>::new());
        assert!(runner.run(&command).await.is_err());
    }
}
