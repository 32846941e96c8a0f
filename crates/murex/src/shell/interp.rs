//! AST interpreter with policy call-outs.
//!
//! The interpreter owns no policy knowledge of its own. Before every spawn
//! it consults the [`ExecHook`] with the fully expanded `argv`, and before
//! every redirection it consults the [`OpenHook`] with the target path. A
//! denial fails the surrounding pipeline element and surfaces as the
//! interpreter's terminal error.
//!
//! Children run with a scrubbed environment, the request's working
//! directory, and kill-on-drop, so cancelling the interpretation future
//! (e.g. on deadline expiry) terminates anything still running.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::ast::{
    AndOr, AndOrList, Pipeline, RedirectKind, Script, SimpleCommand, TextOrVar, Word, WordPiece,
};
use crate::validator::Decision;

/// Shared output sink fed by the pump tasks.
pub type SharedSink = Arc<Mutex<dyn Write + Send>>;

/// Decides whether a fully expanded invocation may be spawned.
pub trait ExecHook: Send + Sync {
    /// Check `(command, args)` against policy; `cwd` is the directory
    /// relative path arguments resolve against.
    fn check_exec(&self, command: &str, args: &[String], cwd: &Path) -> Decision;
}

/// Decides whether the script may open a file (redirection target).
pub trait OpenHook: Send + Sync {
    /// Check an open of `target` (possibly relative to `cwd`).
    fn check_open(&self, target: &str, cwd: &Path) -> Decision;
}

/// Terminal interpreter errors. Child non-zero exits are statuses, not
/// errors.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The exec hook refused an invocation.
    #[error("{0}")]
    Denied(String),
    /// The open hook refused a file target.
    #[error("cannot open {path:?}: {reason}")]
    OpenDenied {
        /// The target as written in the script.
        path: String,
        /// The hook's reason.
        reason: String,
    },
    /// A redirection target expanded to zero or several fields.
    #[error("ambiguous redirection target")]
    AmbiguousRedirect,
    /// A child could not be spawned or a file could not be opened.
    #[error("command execution error: {0}")]
    Exec(String),
    /// Plumbing failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One interpretation of a shell program.
pub struct Interpreter<'h> {
    exec_hook: &'h dyn ExecHook,
    open_hook: &'h dyn OpenHook,
    stdout: SharedSink,
    stderr: SharedSink,
    env: BTreeMap<String, String>,
    vars: HashMap<String, String>,
    cwd: PathBuf,
}

impl<'h> Interpreter<'h> {
    /// Build an interpreter. `env` is the complete child environment — the
    /// caller passes the scrubbed minimal set, nothing is inherited.
    pub fn new(
        exec_hook: &'h dyn ExecHook,
        open_hook: &'h dyn OpenHook,
        stdout: SharedSink,
        stderr: SharedSink,
        env: BTreeMap<String, String>,
        cwd: PathBuf,
    ) -> Self {
        Self {
            exec_hook,
            open_hook,
            stdout,
            stderr,
            env,
            vars: HashMap::new(),
            cwd,
        }
    }

    /// Run the whole script. Returns the last pipeline's exit status.
    pub async fn run(&mut self, script: &Script) -> Result<i32, ShellError> {
        let mut status = 0;
        for statement in &script.statements {
            status = self.run_and_or(statement).await?;
        }
        Ok(status)
    }

    async fn run_and_or(&mut self, list: &AndOrList) -> Result<i32, ShellError> {
        let mut status = self.run_pipeline(&list.first).await?;
        for (op, pipeline) in &list.rest {
            let proceed = match op {
                AndOr::And => status == 0,
                AndOr::Or => status != 0,
            };
            if proceed {
                status = self.run_pipeline(pipeline).await?;
            }
        }
        Ok(status)
    }

    async fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<i32, ShellError> {
        let count = pipeline.elements.len();
        let single = count == 1;

        let mut children: Vec<Child> = Vec::new();
        let mut pumps: Vec<JoinHandle<()>> = Vec::new();
        let mut prev_stdout: Option<ChildStdout> = None;
        let mut last_spawned = false;

        let mut failure: Option<ShellError> = None;
        for (index, element) in pipeline.elements.iter().enumerate() {
            let is_last = index + 1 == count;
            match self.start_element(element, is_last, single, &mut prev_stdout, &mut pumps) {
                Ok(Some(child)) => {
                    children.push(child);
                    last_spawned = is_last;
                }
                Ok(None) => {
                    if is_last {
                        last_spawned = false;
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            // Abort the pipeline: anything already running is killed.
            for child in &mut children {
                let _ = child.start_kill();
            }
            for pump in &pumps {
                pump.abort();
            }
            return Err(err);
        }

        let mut status = 0;
        for mut child in children {
            let exit = child.wait().await?;
            status = exit.code().unwrap_or(-1);
        }
        if !last_spawned {
            status = 0;
        }

        // Let the pumps drain the remaining pipe contents.
        for pump in pumps {
            let _ = pump.await;
        }

        Ok(status)
    }

    /// Expand and start one pipeline element. Returns `None` for elements
    /// that produce no child (assignment- or redirect-only commands).
    fn start_element(
        &mut self,
        element: &SimpleCommand,
        is_last: bool,
        allow_var_assignment: bool,
        prev_stdout: &mut Option<ChildStdout>,
        pumps: &mut Vec<JoinHandle<()>>,
    ) -> Result<Option<Child>, ShellError> {
        let mut argv: Vec<String> = Vec::new();
        for word in &element.words {
            argv.extend(self.expand_word(word));
        }

        let mut stdin_file: Option<File> = None;
        let mut stdout_file: Option<File> = None;
        let mut stderr_file: Option<File> = None;
        for redirect in &element.redirects {
            let target = self.redirect_target(&redirect.target)?;
            if let Decision::Deny(reason) = self.open_hook.check_open(&target, &self.cwd) {
                return Err(ShellError::OpenDenied {
                    path: target,
                    reason,
                });
            }
            let full = self.resolve_in_cwd(&target);
            let file = open_redirect_target(redirect.kind, &full)
                .map_err(|err| ShellError::Exec(format!("cannot open {target:?}: {err}")))?;
            match redirect.kind {
                RedirectKind::In => stdin_file = Some(file),
                RedirectKind::Out | RedirectKind::Append => stdout_file = Some(file),
                RedirectKind::ErrOut | RedirectKind::ErrAppend => stderr_file = Some(file),
            }
        }

        if argv.is_empty() {
            // No command after expansion: assignments apply to the
            // interpreter itself (only outside pipelines), redirects have
            // already created their targets.
            if allow_var_assignment {
                for assignment in &element.assignments {
                    let value = self.expand_unsplit(&assignment.value);
                    self.vars.insert(assignment.name.clone(), value);
                }
            }
            *prev_stdout = None;
            return Ok(None);
        }

        let program = argv[0].clone();
        let args = argv[1..].to_vec();

        // The policy gate: nothing spawns without an allow.
        if let Decision::Deny(reason) = self.exec_hook.check_exec(&program, &args, &self.cwd) {
            return Err(ShellError::Denied(reason));
        }

        let mut command = Command::new(&program);
        command.args(&args);
        command.env_clear();
        command.envs(&self.env);
        for assignment in &element.assignments {
            command.env(&assignment.name, self.expand_unsplit(&assignment.value));
        }
        command.current_dir(&self.cwd);
        command.kill_on_drop(true);

        let use_pipe_stdin = stdin_file.is_none() && prev_stdout.is_some();
        if let Some(file) = stdin_file {
            command.stdin(Stdio::from(file));
            let _ = prev_stdout.take();
        } else if use_pipe_stdin {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let stdout_redirected = stdout_file.is_some();
        match stdout_file {
            Some(file) => {
                command.stdout(Stdio::from(file));
            }
            None => {
                command.stdout(Stdio::piped());
            }
        }
        let stderr_redirected = stderr_file.is_some();
        match stderr_file {
            Some(file) => {
                command.stderr(Stdio::from(file));
            }
            None => {
                command.stderr(Stdio::piped());
            }
        }

        let mut child = command
            .spawn()
            .map_err(|err| ShellError::Exec(format!("{program}: {err}")))?;

        if use_pipe_stdin
            && let (Some(mut from), Some(mut to)) = (prev_stdout.take(), child.stdin.take())
        {
            pumps.push(tokio::spawn(async move {
                let _ = tokio::io::copy(&mut from, &mut to).await;
            }));
        }

        *prev_stdout = None;
        if !stdout_redirected
            && let Some(out) = child.stdout.take()
        {
            if is_last {
                pumps.push(pump_to_sink(out, Arc::clone(&self.stdout)));
            } else {
                *prev_stdout = Some(out);
            }
        }
        if !stderr_redirected
            && let Some(err_stream) = child.stderr.take()
        {
            pumps.push(pump_to_sink(err_stream, Arc::clone(&self.stderr)));
        }

        Ok(Some(child))
    }

    fn resolve_in_cwd(&self, target: &str) -> PathBuf {
        let raw = Path::new(target);
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.cwd.join(raw)
        }
    }

    fn redirect_target(&self, word: &Word) -> Result<String, ShellError> {
        let fields = self.expand_word(word);
        match fields.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(ShellError::AmbiguousRedirect),
        }
    }

    fn lookup_var(&self, name: &str) -> String {
        self.vars
            .get(name)
            .or_else(|| self.env.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Expand a word into zero or more fields. Quoted pieces never split;
    /// unquoted `$VAR` expansions split on whitespace.
    fn expand_word(&self, word: &Word) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut produced = false;

        for piece in &word.pieces {
            match piece {
                WordPiece::Text(text) | WordPiece::SingleQuoted(text) => {
                    current.push_str(text);
                    produced = true;
                }
                WordPiece::DoubleQuoted(parts) => {
                    for part in parts {
                        match part {
                            TextOrVar::Text(text) => current.push_str(text),
                            TextOrVar::Var(name) => current.push_str(&self.lookup_var(name)),
                        }
                    }
                    produced = true;
                }
                WordPiece::Var(name) => {
                    let value = self.lookup_var(name);
                    let mut parts = value.split_whitespace();
                    if let Some(first) = parts.next() {
                        current.push_str(first);
                        produced = true;
                        for part in parts {
                            fields.push(std::mem::take(&mut current));
                            current.push_str(part);
                        }
                    }
                }
            }
        }

        if produced {
            fields.push(current);
        }
        fields
    }

    /// Expand a word into a single string with no field splitting
    /// (assignment values).
    fn expand_unsplit(&self, word: &Word) -> String {
        let mut value = String::new();
        for piece in &word.pieces {
            match piece {
                WordPiece::Text(text) | WordPiece::SingleQuoted(text) => value.push_str(text),
                WordPiece::DoubleQuoted(parts) => {
                    for part in parts {
                        match part {
                            TextOrVar::Text(text) => value.push_str(text),
                            TextOrVar::Var(name) => value.push_str(&self.lookup_var(name)),
                        }
                    }
                }
                WordPiece::Var(name) => value.push_str(&self.lookup_var(name)),
            }
        }
        value
    }
}

fn open_redirect_target(kind: RedirectKind, path: &Path) -> std::io::Result<File> {
    match kind {
        RedirectKind::In => File::open(path),
        RedirectKind::Out | RedirectKind::ErrOut => File::create(path),
        RedirectKind::Append | RedirectKind::ErrAppend => {
            OpenOptions::new().create(true).append(true).open(path)
        }
    }
}

fn pump_to_sink<R>(reader: R, sink: SharedSink) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let Ok(mut sink) = sink.lock() else {
                        break;
                    };
                    let _ = sink.write_all(&chunk[..n]);
                }
            }
        }
    })
}
