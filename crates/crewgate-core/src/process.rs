//! Runs the external orchestration command with a bounded wall-clock timeout.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::RunError;

/// Program plus arguments for the orchestration tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a shell-style command line such as `crewai run`.
    pub fn parse(command_line: &str) -> Result<Self, RunError> {
        let mut words = shell_words::split(command_line)
            .map_err(|e| RunError::InvalidCommand(e.to_string()))?
            .into_iter();
        let program = words.next().ok_or(RunError::EmptyCommand)?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn display(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(self.args.iter()))
    }
}

/// Immutable environment handed to a child process.
///
/// Built once per run; the child sees exactly these variables.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnv {
    pub fn builder() -> ProcessEnvBuilder {
        ProcessEnvBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.get(&OsString::from(key))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}

// Values may hold secrets; only names are printed.
impl std::fmt::Debug for ProcessEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

/// Accumulates variables for a [`ProcessEnv`]. Later writes win.
#[derive(Debug, Default)]
pub struct ProcessEnvBuilder {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnvBuilder {
    pub fn extend<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn var(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ProcessEnv {
        ProcessEnv { vars: self.vars }
    }
}

/// Output of a run that exited with status 0.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Execute `command` in `working_directory` and wait for it, up to `timeout`.
pub async fn run_backend_process(
    working_directory: &Path,
    command: &ProcessCommand,
    environment: &ProcessEnv,
    timeout: Duration,
) -> Result<RunResult, RunError> {
    info!(
        program = %command.program,
        args = ?command.args,
        working_dir = %working_directory.display(),
        timeout_secs = timeout.as_secs(),
        env_vars = environment.len(),
        "Starting orchestration process"
    );

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(working_directory)
        .env_clear()
        .envs(environment.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        error!(
            program = %command.program,
            working_dir = %working_directory.display(),
            error = %e,
            "Failed to spawn orchestration process"
        );
        RunError::LaunchFailed {
            program: command.program.clone(),
            cause: e.to_string(),
        }
    })?;

    let mut stdout_task = drain(child.stdout.take());
    let mut stderr_task = drain(child.stderr.take());

    let waited = tokio::time::timeout(timeout, async {
        let status = child.wait().await?;
        let stdout = collect(&mut stdout_task).await;
        let stderr = collect(&mut stderr_task).await;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    })
    .await;

    let (status, stdout, stderr) = match waited {
        Ok(finished) => finished?,
        Err(_) => {
            let elapsed = started.elapsed();
            warn!(
                program = %command.program,
                timeout_secs = timeout.as_secs(),
                "Orchestration process timed out, killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed out process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::ProcessTimedOut { elapsed });
        }
    };
    let elapsed = started.elapsed();

    if !status.success() {
        let exit_code = status.code().unwrap_or(-1);
        error!(
            program = %command.program,
            exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            stderr = %crate::error::stderr_tail(&stderr),
            "Orchestration process failed"
        );
        return Err(RunError::ProcessFailed { exit_code, stderr });
    }

    info!(
        program = %command.program,
        stdout_len = stdout.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Orchestration process completed successfully"
    );

    Ok(RunResult {
        exit_code: status.code().unwrap_or(0),
        stdout,
        stderr,
        elapsed,
    })
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf).await
        {
            warn!(error = %e, "Error reading process output");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(task: &mut JoinHandle<String>) -> String {
    match task.await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "Output reader task did not complete");
            String::new()
        }
    }
}
