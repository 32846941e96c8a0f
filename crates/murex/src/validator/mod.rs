//! Per-invocation policy decisions.
//!
//! Every command the interpreter is about to spawn — and every nested
//! command discovered inside the meta-commands `xargs` and `find -exec` —
//! passes through [`CommandValidator::validate`] first. The decision
//! procedure is, in order: explicit deny (deny always wins), allow-list
//! lookup, sub-command restrictions, meta-command recursion, and path
//! containment of path-like arguments.
//!
//! Denials are journaled and logged as a side effect; the validator itself
//! never suspends.

mod find;
mod xargs;

use std::path::Path;
use std::sync::Arc;

use crate::journal::BlockJournal;
use crate::policy::paths::check_path_argument;
use crate::policy::ExecPolicy;

/// Nested meta-command depth at which validation gives up and denies.
/// `xargs xargs xargs …` is nobody's legitimate workflow.
const MAX_META_DEPTH: usize = 4;

/// The outcome of validating one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The invocation may run.
    Allow,
    /// The invocation is refused, with a human-readable reason.
    Deny(String),
}

impl Decision {
    /// Returns true when the invocation may run.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// The denial reason, when denied.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }
}

/// Whether an argument is treated as a filesystem path by the string
/// heuristic: contains a separator, or starts with `./`, `../`, `~` or `.`;
/// flags never count.
pub fn is_path_like(arg: &str) -> bool {
    if arg.is_empty() || arg.starts_with('-') {
        return false;
    }
    arg.contains('/') || arg.starts_with('~') || arg.starts_with('.')
}

/// Validates invocations against an [`ExecPolicy`], journaling denials.
#[derive(Debug)]
pub struct CommandValidator {
    policy: Arc<ExecPolicy>,
    journal: Arc<BlockJournal>,
}

impl CommandValidator {
    /// Create a validator over a shared policy and journal.
    pub fn new(policy: Arc<ExecPolicy>, journal: Arc<BlockJournal>) -> Self {
        Self { policy, journal }
    }

    /// Decide one invocation. `cwd` is the absolute working directory that
    /// relative path arguments resolve against.
    pub fn validate(&self, command: &str, args: &[String], cwd: &Path) -> Decision {
        let decision = self.validate_at_depth(command, args, cwd, 0);
        match &decision {
            Decision::Allow => {
                tracing::debug!(command, ?args, "command allowed");
            }
            Decision::Deny(reason) => {
                tracing::warn!(command, ?args, reason, "command blocked");
                self.journal.record(command, args, reason);
            }
        }
        decision
    }

    fn validate_at_depth(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        depth: usize,
    ) -> Decision {
        if depth >= MAX_META_DEPTH {
            return Decision::Deny(format!(
                "command {command:?} is nested too deeply to validate"
            ));
        }

        // Deny wins over any allow entry for the same name.
        if let Some(message) = self.policy.deny_message(command) {
            return Decision::Deny(format!("command {command:?} is denied: {message}"));
        }

        let Some(rule) = self.policy.allow_rule(command) else {
            return Decision::Deny(format!(
                "command {command:?} is not permitted: {}",
                self.policy.default_reason()
            ));
        };

        // Sub-command restrictions apply to the first positional argument
        // only. The allow list is consulted first so the more specific
        // "not allowed" message wins when both lists would reject.
        if let Some(first) = args.first() {
            if let Some(allow_subs) = &rule.allow_subs
                && !allow_subs.contains(first)
            {
                return Decision::Deny(format!(
                    "subcommand {first:?} is not allowed for command {command:?}"
                ));
            }
            if let Some(deny_subs) = &rule.deny_subs
                && deny_subs.contains(first)
            {
                return Decision::Deny(format!(
                    "subcommand {first:?} is denied for command {command:?}"
                ));
            }
        }

        // Meta-commands: the argument vector belongs (wholly or in part) to
        // a nested command, which is validated recursively. xargs's own
        // arguments are never path-checked — they are the nested command's.
        if command == "xargs" {
            return self.validate_xargs(args, cwd, depth);
        }
        if command == "find" {
            if let Decision::Deny(reason) = self.validate_find_exec(args, cwd, depth) {
                return Decision::Deny(reason);
            }
            let filtered = find::filter_special_args(args);
            return self.check_path_arguments(&filtered, cwd);
        }

        self.check_path_arguments(args, cwd)
    }

    fn validate_xargs(&self, args: &[String], cwd: &Path, depth: usize) -> Decision {
        match xargs::parse_nested_command(args) {
            Err(reason) => Decision::Deny(reason),
            Ok((nested_command, nested_args)) => {
                match self.validate_at_depth(&nested_command, &nested_args, cwd, depth + 1) {
                    Decision::Allow => Decision::Allow,
                    Decision::Deny(inner) => Decision::Deny(format!(
                        "xargs would execute disallowed command: {inner}"
                    )),
                }
            }
        }
    }

    fn validate_find_exec(&self, args: &[String], cwd: &Path, depth: usize) -> Decision {
        for nested_command in find::exec_commands(args) {
            if let Decision::Deny(inner) =
                self.validate_at_depth(&nested_command, &[], cwd, depth + 1)
            {
                return Decision::Deny(format!(
                    "find command contains disallowed -exec: {inner}"
                ));
            }
        }
        Decision::Allow
    }

    fn check_path_arguments(&self, args: &[String], cwd: &Path) -> Decision {
        for arg in args {
            if !is_path_like(arg) {
                continue;
            }
            if let Err(reason) = check_path_argument(
                arg,
                cwd,
                self.policy.allowed_dirs(),
                self.policy.default_reason(),
            ) {
                return Decision::Deny(reason);
            }
        }
        Decision::Allow
    }
}
