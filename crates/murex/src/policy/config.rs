//! Policy document model and the compiled policy.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::paths::normalize_path;

/// Errors from loading or validating a policy document.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document could not be read from disk.
    #[error("failed to read policy file {path:?}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The document is not valid JSON or does not match the schema.
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document parsed but the rules are unusable.
    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// One entry of the `allowCommands` list.
///
/// Accepts either a bare command name or an object with sub-command lists,
/// interchangeably per element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowEntry {
    /// `"ls"` — the name is unconditionally allowed.
    Name(String),
    /// `{"command": "git", "subCommands": [...], "denySubCommands": [...]}`
    Rule {
        /// Command name.
        command: String,
        /// When present, the only first arguments accepted.
        #[serde(default, rename = "subCommands")]
        sub_commands: Option<Vec<String>>,
        /// First arguments rejected even when `subCommands` is absent.
        #[serde(default, rename = "denySubCommands")]
        deny_sub_commands: Option<Vec<String>>,
    },
}

/// One entry of the `denyCommands` list: a bare name or a name with a
/// custom denial message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DenyEntry {
    /// `"rm"` — denied with the default message.
    Name(String),
    /// `{"command": "sudo", "message": "..."}`
    Rule {
        /// Command name.
        command: String,
        /// Message shown instead of the default one.
        #[serde(default)]
        message: Option<String>,
    },
}

fn default_error_message() -> String {
    "Command not allowed by security policy".to_string()
}

/// The on-disk policy document. Field names follow the JSON configuration
/// format; missing fields fall back to empty lists / no limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDocument {
    /// Absolute directory prefixes commands may touch.
    pub allowed_directories: Vec<String>,
    /// Commands the policy permits.
    pub allow_commands: Vec<AllowEntry>,
    /// Commands the policy rejects outright. Deny wins over allow.
    pub deny_commands: Vec<DenyEntry>,
    /// Message used when a rule has no more specific one.
    pub default_error_message: String,
    /// Where blocked invocations are journaled; empty disables the journal.
    pub block_log_path: String,
    /// Wall-clock limit in seconds; 0 means no deadline.
    pub max_execution_time: u64,
    /// Output cap in bytes per stream; 0 means unbounded.
    pub max_output_size: u64,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            allowed_directories: Vec::new(),
            allow_commands: Vec::new(),
            deny_commands: Vec::new(),
            default_error_message: default_error_message(),
            block_log_path: String::new(),
            max_execution_time: 0,
            max_output_size: 0,
        }
    }
}

impl PolicyDocument {
    /// Parse a document from JSON text.
    pub fn from_str(text: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }
}

/// Restrictions attached to an allowed command name.
#[derive(Debug, Clone, Default)]
pub struct AllowRule {
    /// When present, the only accepted first arguments.
    pub allow_subs: Option<HashSet<String>>,
    /// First arguments rejected.
    pub deny_subs: Option<HashSet<String>>,
}

/// The compiled, immutable policy consumed by the validator and runner.
#[derive(Debug, Clone)]
pub struct ExecPolicy {
    allowed_dirs: Vec<PathBuf>,
    allow: HashMap<String, AllowRule>,
    deny: HashMap<String, Option<String>>,
    default_reason: String,
    block_log_path: Option<PathBuf>,
    max_exec_seconds: u64,
    max_output_bytes: u64,
}

impl ExecPolicy {
    /// Compile a parsed document. Rejects relative allowed directories and
    /// empty command names, so the service never runs on a partially valid
    /// policy.
    pub fn from_document(doc: PolicyDocument) -> Result<Self, PolicyError> {
        let mut allowed_dirs = Vec::with_capacity(doc.allowed_directories.len());
        for dir in &doc.allowed_directories {
            let path = PathBuf::from(dir);
            if !path.is_absolute() {
                return Err(PolicyError::Invalid(format!(
                    "allowed directory {dir:?} is not absolute"
                )));
            }
            allowed_dirs.push(normalize_path(&path));
        }

        let mut allow = HashMap::new();
        for entry in doc.allow_commands {
            let (command, rule) = match entry {
                AllowEntry::Name(command) => (command, AllowRule::default()),
                AllowEntry::Rule {
                    command,
                    sub_commands,
                    deny_sub_commands,
                } => (
                    command,
                    AllowRule {
                        allow_subs: sub_commands.map(|subs| subs.into_iter().collect()),
                        deny_subs: deny_sub_commands.map(|subs| subs.into_iter().collect()),
                    },
                ),
            };
            if command.is_empty() {
                return Err(PolicyError::Invalid(
                    "allowCommands contains an empty command name".to_string(),
                ));
            }
            allow.insert(command, rule);
        }

        let mut deny = HashMap::new();
        for entry in doc.deny_commands {
            let (command, message) = match entry {
                DenyEntry::Name(command) => (command, None),
                DenyEntry::Rule { command, message } => (command, message),
            };
            if command.is_empty() {
                return Err(PolicyError::Invalid(
                    "denyCommands contains an empty command name".to_string(),
                ));
            }
            deny.insert(command, message);
        }

        let block_log_path = if doc.block_log_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(doc.block_log_path))
        };

        Ok(Self {
            allowed_dirs,
            allow,
            deny,
            default_reason: doc.default_error_message,
            block_log_path,
            max_exec_seconds: doc.max_execution_time,
            max_output_bytes: doc.max_output_size,
        })
    }

    /// Load and compile a policy from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::from_document(PolicyDocument::from_file(path)?)
    }

    /// Parse and compile a policy from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PolicyError> {
        Self::from_document(PolicyDocument::from_str(text)?)
    }

    /// A small permissive default for embedding and tests: `ls`, `echo` and
    /// `cat` allowed, 30 second deadline, no directory restrictions beyond
    /// what the caller adds.
    pub fn default_policy() -> Self {
        Self {
            allowed_dirs: Vec::new(),
            allow: ["ls", "echo", "cat"]
                .into_iter()
                .map(|name| (name.to_string(), AllowRule::default()))
                .collect(),
            deny: HashMap::new(),
            default_reason: default_error_message(),
            block_log_path: None,
            max_exec_seconds: 30,
            max_output_bytes: 0,
        }
    }

    /// Add an unconditionally allowed command name.
    pub fn with_allowed_command(mut self, command: impl Into<String>) -> Self {
        self.allow.insert(command.into(), AllowRule::default());
        self
    }

    /// Add an allowed directory prefix. The path is normalised.
    pub fn with_allowed_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.allowed_dirs.push(normalize_path(dir.as_ref()));
        self
    }

    /// Override the wall-clock limit (seconds, 0 disables it).
    pub fn set_max_exec_seconds(&mut self, seconds: u64) {
        self.max_exec_seconds = seconds;
    }

    /// Override the per-stream output cap (bytes, 0 disables it).
    pub fn set_max_output_bytes(&mut self, bytes: u64) {
        self.max_output_bytes = bytes;
    }

    /// Allowed directory prefixes, normalised.
    pub fn allowed_dirs(&self) -> &[PathBuf] {
        &self.allowed_dirs
    }

    /// The fallback denial message.
    pub fn default_reason(&self) -> &str {
        &self.default_reason
    }

    /// Deny lookup: `Some(message)` when the name is denied, with the
    /// custom message when one was configured.
    pub fn deny_message(&self, command: &str) -> Option<&str> {
        self.deny
            .get(command)
            .map(|message| message.as_deref().unwrap_or(&self.default_reason))
    }

    /// Allow lookup for a command name.
    pub fn allow_rule(&self, command: &str) -> Option<&AllowRule> {
        self.allow.get(command)
    }

    /// Journal destination, when one is configured.
    pub fn block_log_path(&self) -> Option<&Path> {
        self.block_log_path.as_deref()
    }

    /// Wall-clock limit in seconds (0 = no deadline).
    pub fn max_exec_seconds(&self) -> u64 {
        self.max_exec_seconds
    }

    /// Output cap in bytes per stream (0 = unbounded).
    pub fn max_output_bytes(&self) -> u64 {
        self.max_output_bytes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_allows_basics() {
        let policy = ExecPolicy::default_policy();

        for command in ["ls", "echo", "cat"] {
            assert!(policy.allow_rule(command).is_some(), "{command} missing");
        }
        assert!(policy.allow_rule("wget").is_none());
        assert!(policy.allow_rule("").is_none());
        assert_eq!(policy.max_exec_seconds(), 30);
    }

    #[test]
    fn test_mixed_string_and_object_forms() {
        let policy = ExecPolicy::from_json(
            r#"{
                "allowedDirectories": ["/home", "/tmp"],
                "allowCommands": [
                    "ls",
                    {"command": "git", "subCommands": ["status", "pull"], "denySubCommands": ["push"]},
                    "cat"
                ],
                "denyCommands": [
                    "rm",
                    {"command": "sudo", "message": "Elevated privileges not allowed"},
                    "vi"
                ],
                "defaultErrorMessage": "Command not allowed",
                "maxExecutionTime": 60
            }"#,
        )
        .unwrap();

        assert!(policy.allow_rule("ls").is_some());
        assert!(policy.allow_rule("cat").is_some());

        let git = policy.allow_rule("git").unwrap();
        assert_eq!(git.allow_subs.as_ref().unwrap().len(), 2);
        assert_eq!(git.deny_subs.as_ref().unwrap().len(), 1);

        assert_eq!(policy.deny_message("rm"), Some("Command not allowed"));
        assert_eq!(
            policy.deny_message("sudo"),
            Some("Elevated privileges not allowed")
        );
        assert_eq!(policy.deny_message("vi"), Some("Command not allowed"));
        assert_eq!(policy.deny_message("ls"), None);

        assert_eq!(policy.max_exec_seconds(), 60);
        assert_eq!(policy.max_output_bytes(), 0);
    }

    #[test]
    fn test_missing_fields_default() {
        let policy = ExecPolicy::from_json(r#"{"allowCommands": ["echo"]}"#).unwrap();

        assert!(policy.allowed_dirs().is_empty());
        assert!(policy.block_log_path().is_none());
        assert_eq!(policy.max_exec_seconds(), 0);
        assert_eq!(policy.max_output_bytes(), 0);
        assert_eq!(
            policy.default_reason(),
            "Command not allowed by security policy"
        );
    }

    #[test]
    fn test_malformed_document_fails_load() {
        assert!(ExecPolicy::from_json("{not json").is_err());
        assert!(ExecPolicy::from_json(r#"{"allowCommands": [42]}"#).is_err());
        assert!(ExecPolicy::from_json(r#"{"maxExecutionTime": "soon"}"#).is_err());
    }

    #[test]
    fn test_relative_allowed_directory_rejected() {
        let err =
            ExecPolicy::from_json(r#"{"allowedDirectories": ["tmp/work"]}"#).unwrap_err();
        match err {
            PolicyError::Invalid(message) => assert!(message.contains("not absolute")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reload_is_observationally_identical() {
        let text = r#"{
            "allowedDirectories": ["/tmp"],
            "allowCommands": ["echo", {"command": "git", "subCommands": ["status"]}],
            "denyCommands": [{"command": "rm", "message": "no"}],
            "defaultErrorMessage": "nope",
            "maxExecutionTime": 5,
            "maxOutputSize": 100
        }"#;

        let a = ExecPolicy::from_json(text).unwrap();
        let b = ExecPolicy::from_json(text).unwrap();

        assert_eq!(a.allowed_dirs(), b.allowed_dirs());
        assert_eq!(a.default_reason(), b.default_reason());
        assert_eq!(a.deny_message("rm"), b.deny_message("rm"));
        assert_eq!(a.max_exec_seconds(), b.max_exec_seconds());
        assert_eq!(a.max_output_bytes(), b.max_output_bytes());
        assert_eq!(
            a.allow_rule("git").unwrap().allow_subs,
            b.allow_rule("git").unwrap().allow_subs
        );
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = ExecPolicy::from_file("/nonexistent/policy.json").unwrap_err();
        match err {
            PolicyError::Read { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/policy.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
