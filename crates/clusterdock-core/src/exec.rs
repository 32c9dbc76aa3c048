//! Command execution inside containers.

use clusterdock_runtime::{ContainerId, ExecSpec, OutputChunk, Runtime};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Options for running a command on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// User to run as.
    pub user: String,
    /// Skip per-chunk logging.
    pub quiet: bool,
    /// Do not wait for output; the exit code may be absent.
    pub detach: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            quiet: false,
            detach: false,
        }
    }
}

impl ExecuteOptions {
    /// Run as `user`.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Suppress per-chunk logging.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Run detached.
    #[must_use]
    pub const fn detach(mut self) -> Self {
        self.detach = true;
        self
    }
}

/// Outcome of one command.
///
/// A non-zero `exit_code` is a normal result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Exit code; absent when the command was detached or still running.
    pub exit_code: Option<i64>,
    /// Stdout and stderr interleaved in arrival order.
    pub output: String,
    /// Stdout only.
    pub stdout: String,
    /// Stderr only.
    pub stderr: String,
}

impl ExecuteResult {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `<shell> -c <command>` in a container and collect its output.
///
/// Chunks are consumed in arrival order. Bytes are accumulated per stream
/// and decoded once at the end, so multi-byte characters split across
/// chunks survive; invalid UTF-8 is replaced.
pub async fn execute(
    runtime: &dyn Runtime,
    container: &ContainerId,
    shell: &str,
    command: &str,
    options: &ExecuteOptions,
) -> Result<ExecuteResult> {
    debug!(container = %container, command, user = %options.user, "executing command");

    let spec = ExecSpec::cmd(vec![shell.to_string(), "-c".to_string(), command.to_string()])
        .with_user(options.user.as_str());
    let exec_id = runtime.create_exec(container, &spec).await?;

    let mut output = Vec::new();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let mut chunks = runtime.start_exec(&exec_id, options.detach).await?;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if !options.quiet {
            debug!(container = %container, ?chunk, "exec output");
        }
        match chunk {
            OutputChunk::Stdout(bytes) => {
                output.extend_from_slice(&bytes);
                stdout.extend(bytes);
            }
            OutputChunk::Stderr(bytes) => {
                output.extend_from_slice(&bytes);
                stderr.extend(bytes);
            }
        }
    }

    let exit_code = runtime.inspect_exec(&exec_id).await?;
    debug!(container = %container, command, ?exit_code, "command finished");

    Ok(ExecuteResult {
        exit_code,
        output: String::from_utf8_lossy(&output).into_owned(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use clusterdock_runtime::{Call, ContainerSpec, FakeRuntime, ScriptedExec};

    use super::*;

    async fn running(runtime: &FakeRuntime) -> ContainerId {
        let id = runtime
            .create_container(&ContainerSpec::new("alpine"))
            .await
            .unwrap();
        runtime.start_container(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_streams_are_split_and_interleaved() {
        let runtime = FakeRuntime::new().with_image("alpine").with_exec(
            "build",
            ScriptedExec::exit(2)
                .stdout("one\n")
                .stderr("oops\n")
                .stdout("two\n"),
        );
        let id = running(&runtime).await;

        let result = execute(&runtime, &id, "/bin/sh", "build", &ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(2));
        assert!(!result.success());
        assert_eq!(result.output, "one\noops\ntwo\n");
        assert_eq!(result.stdout, "one\ntwo\n");
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_command_runs_through_shell_as_user() {
        let runtime = FakeRuntime::new().with_image("alpine");
        let id = running(&runtime).await;

        execute(
            &runtime,
            &id,
            "/bin/bash",
            "echo hi",
            &ExecuteOptions::default().with_user("nobody").quiet(),
        )
        .await
        .unwrap();

        let create = runtime
            .calls()
            .into_iter()
            .find(|call| matches!(call, Call::CreateExec { .. }))
            .unwrap();
        assert_eq!(
            create,
            Call::CreateExec {
                container: id,
                cmd: vec!["/bin/bash".into(), "-c".into(), "echo hi".into()],
                user: Some("nobody".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_detached_collects_nothing() {
        let runtime = FakeRuntime::new()
            .with_image("alpine")
            .with_exec("sleep", ScriptedExec::exit(0).stdout("ignored"));
        let id = running(&runtime).await;

        let result = execute(
            &runtime,
            &id,
            "/bin/sh",
            "sleep 100",
            &ExecuteOptions::default().detach(),
        )
        .await
        .unwrap();
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_split_utf8_is_reassembled() {
        let snowman = "\u{2603}".as_bytes();
        let mut script = ScriptedExec::exit(0);
        script.output.push(OutputChunk::Stdout(snowman[..1].to_vec()));
        script.output.push(OutputChunk::Stdout(snowman[1..].to_vec()));
        let runtime = FakeRuntime::new().with_image("alpine").with_exec("snow", script);
        let id = running(&runtime).await;

        let result = execute(&runtime, &id, "/bin/sh", "snow", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.stdout, "\u{2603}");
    }
}
