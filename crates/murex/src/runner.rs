//! Per-request orchestration: resolve the working directory, parse, wire the
//! hooks and limiters, run under the deadline.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::journal::BlockJournal;
use crate::limiter::OutputLimiter;
use crate::policy::paths::{self, normalize_path};
use crate::policy::ExecPolicy;
use crate::shell::{
    parse_script, ExecHook, Interpreter, OpenHook, ParseError, SharedSink, ShellError,
};
use crate::validator::{CommandValidator, Decision};

/// Environment handed to every child. Nothing is inherited from the
/// service process; callers cannot smuggle `LD_PRELOAD` or a custom `PATH`
/// in through the transport.
const RESTRICTED_PATH: &str = "/usr/bin:/bin";

/// Request-fatal errors. A child's non-zero exit is not an error — it is
/// reported in [`ExecOutcome::exit_code`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The shell source could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// The working directory is outside the allowed set.
    #[error("{0}")]
    DirectoryNotAllowed(String),
    /// The validator refused an invocation.
    #[error("{0}")]
    Denied(String),
    /// A file open (redirection) was refused.
    #[error("cannot open {path:?}: {reason}")]
    OpenDenied {
        /// The target as written in the script.
        path: String,
        /// The path checker's reason.
        reason: String,
    },
    /// The wall-clock deadline expired; children were signalled.
    #[error("execution timed out after {0} seconds")]
    DeadlineExceeded(u64),
    /// A child could not be spawned, or a redirect target opened.
    #[error("command execution error: {0}")]
    Exec(String),
    /// Plumbing failure.
    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl From<ShellError> for RunnerError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Denied(reason) => RunnerError::Denied(reason),
            ShellError::OpenDenied { path, reason } => RunnerError::OpenDenied { path, reason },
            ShellError::AmbiguousRedirect => {
                RunnerError::Exec("ambiguous redirection target".to_string())
            }
            ShellError::Exec(message) => RunnerError::Exec(message),
            ShellError::Io(err) => RunnerError::Io(err),
        }
    }
}

/// Captured result of one request.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    /// Exit status of the last pipeline (0 on an empty script).
    pub exit_code: i32,
    /// Captured standard output, marker included when truncated.
    pub stdout: Vec<u8>,
    /// Captured standard error, marker included when truncated.
    pub stderr: Vec<u8>,
    /// Whether either stream hit the output cap.
    pub truncated: bool,
    /// Input bytes discarded past the caps, both streams combined.
    pub remaining_bytes: usize,
}

/// Path checker bound to a policy, installed as the interpreter's open
/// hook. Opens are checked on the target's directory, so creating a new
/// file inside an allowed prefix works while everything outside fails.
struct PolicyOpenHook {
    policy: Arc<ExecPolicy>,
}

impl OpenHook for PolicyOpenHook {
    fn check_open(&self, target: &str, cwd: &Path) -> Decision {
        if target.is_empty() {
            return Decision::Deny("empty path not allowed".to_string());
        }
        let raw = Path::new(target);
        let resolved = if raw.is_absolute() {
            normalize_path(raw)
        } else {
            normalize_path(&cwd.join(raw))
        };
        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(resolved.clone());
        if paths::is_contained(&dir, self.policy.allowed_dirs()) {
            Decision::Allow
        } else {
            Decision::Deny(format!(
                "path {:?} is outside of allowed directories: {}",
                dir.display().to_string(),
                self.policy.default_reason()
            ))
        }
    }
}

impl ExecHook for CommandValidator {
    fn check_exec(&self, command: &str, args: &[String], cwd: &Path) -> Decision {
        self.validate(command, args, cwd)
    }
}

/// Executes one request at a time against a shared, read-only policy.
///
/// A runner holds no cross-request state; transports create one per
/// request (they are cheap — two `Arc` clones) and never share writers.
#[derive(Debug)]
pub struct SecureRunner {
    policy: Arc<ExecPolicy>,
    validator: Arc<CommandValidator>,
}

impl SecureRunner {
    /// Build a runner over a shared policy. The block journal destination
    /// comes from the policy.
    pub fn new(policy: Arc<ExecPolicy>) -> Self {
        let journal = Arc::new(BlockJournal::new(
            policy.block_log_path().map(Path::to_path_buf),
        ));
        let validator = Arc::new(CommandValidator::new(Arc::clone(&policy), journal));
        Self { policy, validator }
    }

    /// The policy this runner enforces.
    pub fn policy(&self) -> &ExecPolicy {
        &self.policy
    }

    /// Execute `source` with `directory` as the working directory.
    ///
    /// The directory is checked against the allowed set before anything is
    /// parsed; a rejection fails the whole request. The interpretation runs
    /// under the policy's wall-clock deadline, and both output streams are
    /// capped at the policy's output limit.
    pub async fn run_command(
        &self,
        source: &str,
        directory: &str,
    ) -> Result<ExecOutcome, RunnerError> {
        let cwd = paths::check_working_directory(
            directory,
            self.policy.allowed_dirs(),
            self.policy.default_reason(),
        )
        .map_err(RunnerError::DirectoryNotAllowed)?;

        let script = parse_script(source)?;

        let max_output = self.policy.max_output_bytes() as usize;
        let stdout = Arc::new(Mutex::new(OutputLimiter::new(Vec::new(), max_output)));
        let stderr = Arc::new(Mutex::new(OutputLimiter::new(Vec::new(), max_output)));

        let open_hook = PolicyOpenHook {
            policy: Arc::clone(&self.policy),
        };
        let env: BTreeMap<String, String> =
            [("PATH".to_string(), RESTRICTED_PATH.to_string())].into();

        let mut interp = Interpreter::new(
            self.validator.as_ref(),
            &open_hook,
            Arc::clone(&stdout) as SharedSink,
            Arc::clone(&stderr) as SharedSink,
            env,
            cwd.clone(),
        );

        tracing::debug!(directory = %cwd.display(), "running command");

        let deadline = self.policy.max_exec_seconds();
        let status = if deadline == 0 {
            interp.run(&script).await?
        } else {
            match tokio::time::timeout(Duration::from_secs(deadline), interp.run(&script)).await
            {
                Ok(result) => result?,
                Err(_elapsed) => {
                    // Dropping the execution future kills in-flight
                    // children (kill-on-drop).
                    tracing::warn!(deadline, "execution deadline exceeded");
                    return Err(RunnerError::DeadlineExceeded(deadline));
                }
            }
        };

        let outcome = {
            let mut stdout = stdout.lock().map_err(|_| poisoned())?;
            let mut stderr = stderr.lock().map_err(|_| poisoned())?;
            ExecOutcome {
                exit_code: status,
                truncated: stdout.truncated() || stderr.truncated(),
                remaining_bytes: stdout.remaining_bytes() + stderr.remaining_bytes(),
                stdout: std::mem::take(stdout.get_mut()),
                stderr: std::mem::take(stderr.get_mut()),
            }
        };

        tracing::debug!(
            exit_code = outcome.exit_code,
            truncated = outcome.truncated,
            "command finished"
        );
        Ok(outcome)
    }
}

fn poisoned() -> RunnerError {
    RunnerError::Exec("output sink poisoned".to_string())
}
