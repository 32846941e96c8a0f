//! Murex MCP Server
//!
//! Exposes policy-enforced shell execution as an MCP tool. The single
//! `run_command` tool takes a shell command and an absolute working
//! directory; the command is parsed, every invocation is validated against
//! the configured policy, and the captured output (or the denial reason) is
//! returned to the caller.
//!
//! Each call gets a fresh [`SecureRunner`] over the shared immutable
//! policy, so concurrent requests never share writer state.

use std::sync::Arc;

use murex::{ExecOutcome, ExecPolicy, SecureRunner};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    schemars::{self, JsonSchema},
    service::{RequestContext, RoleServer},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Parameters for the `run_command` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCommandParams {
    /// Command to execute.
    pub command: String,

    /// Working directory to execute the command in. Must be an absolute
    /// path inside the policy's allowed directories.
    pub directory: String,
}

/// MCP server wrapping a shared execution policy.
#[derive(Clone)]
pub struct MurexServer {
    policy: Arc<ExecPolicy>,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for MurexServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MurexServer").finish_non_exhaustive()
    }
}

impl MurexServer {
    /// Create a server over a policy, limiting concurrent executions.
    pub fn new(policy: ExecPolicy, max_concurrent: usize) -> Self {
        Self {
            policy: Arc::new(policy),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Execute the `run_command` tool.
    async fn run_command(&self, params: RunCommandParams) -> Result<CallToolResult, McpError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| McpError::internal_error("semaphore closed", None))?;

        if params.command.trim().is_empty() {
            return Ok(CallToolResult::error(vec![Content::text(
                "Command parameter must be a non-empty string",
            )]));
        }
        if params.directory.is_empty() {
            return Ok(CallToolResult::error(vec![Content::text(
                "Directory parameter must be a non-empty string",
            )]));
        }

        tracing::info!(directory = %params.directory, "run_command");

        let runner = SecureRunner::new(Arc::clone(&self.policy));
        match runner.run_command(&params.command, &params.directory).await {
            Ok(outcome) => Ok(CallToolResult::success(vec![Content::text(
                format_outcome(&outcome),
            )])),
            Err(err) => {
                tracing::warn!(%err, "run_command failed");
                Ok(CallToolResult::error(vec![Content::text(err.to_string())]))
            }
        }
    }

    fn run_command_tool(&self) -> Tool {
        let schema = schemars::schema_for!(RunCommandParams);
        let schema_json = serde_json::to_value(schema).unwrap_or_default();
        let input_schema = match schema_json {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: "run_command".into(),
            title: Some("Run Shell Command".into()),
            description: Some(
                "Run shell commands in specific directories (only within allowed paths).\n\
                 The \"directory\" parameter sets the working directory automatically; \
                 \"cd\" command isn't needed."
                    .into(),
            ),
            input_schema,
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }
}

/// Interleave the captured streams the way a terminal user would read
/// them: stdout first, a marked stderr section, the exit code when it is
/// non-zero, and a note when output was clipped.
fn format_outcome(outcome: &ExecOutcome) -> String {
    let stdout = String::from_utf8_lossy(&outcome.stdout);
    let stderr = String::from_utf8_lossy(&outcome.stderr);

    let mut output = String::new();
    if !stdout.is_empty() {
        output.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !output.is_empty() {
            output.push_str("\n--- stderr ---\n");
        }
        output.push_str(&stderr);
    }
    if output.is_empty() {
        output = format!("(no output, exit code: {})", outcome.exit_code);
    } else if outcome.exit_code != 0 {
        output.push_str(&format!("\n(exit code: {})", outcome.exit_code));
    }
    if outcome.truncated {
        output.push_str(&format!(
            "\n[output truncated, {} bytes dropped]",
            outcome.remaining_bytes
        ));
    }

    output
}

impl ServerHandler for MurexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Murex executes shell commands under a declarative allow/deny policy. \
                 Use the 'run_command' tool with a command string and an absolute working \
                 directory. Commands, sub-commands and path arguments outside the policy \
                 are refused with a reason; output is captured and size-capped."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: vec![self.run_command_tool()],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match request.name.as_ref() {
            "run_command" => {
                let params: RunCommandParams = match &request.arguments {
                    Some(args) => serde_json::from_value(serde_json::Value::Object(args.clone()))
                        .map_err(|e| {
                            McpError::invalid_params(format!("Invalid parameters: {}", e), None)
                        })?,
                    None => {
                        return Err(McpError::invalid_params(
                            "Missing 'command' and 'directory' parameters",
                            None,
                        ));
                    }
                };
                self.run_command(params).await
            }
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_params_deserialize() {
        let json = r#"{"command": "echo hello", "directory": "/tmp"}"#;
        let params: RunCommandParams = serde_json::from_str(json).expect("parse failed");
        assert_eq!(params.command, "echo hello");
        assert_eq!(params.directory, "/tmp");
    }

    #[test]
    fn test_params_require_both_fields() {
        let json = r#"{"command": "echo hello"}"#;
        assert!(serde_json::from_str::<RunCommandParams>(json).is_err());
        let json = r#"{"directory": "/tmp"}"#;
        assert!(serde_json::from_str::<RunCommandParams>(json).is_err());
    }

    #[test]
    fn test_format_outcome_plain() {
        let outcome = ExecOutcome {
            exit_code: 0,
            stdout: b"hello\n".to_vec(),
            ..Default::default()
        };
        assert_eq!(format_outcome(&outcome), "hello\n");
    }

    #[test]
    fn test_format_outcome_with_stderr_and_exit_code() {
        let outcome = ExecOutcome {
            exit_code: 2,
            stdout: b"partial\n".to_vec(),
            stderr: b"went wrong\n".to_vec(),
            ..Default::default()
        };
        let text = format_outcome(&outcome);
        assert!(text.starts_with("partial\n"));
        assert!(text.contains("--- stderr ---\nwent wrong\n"));
        assert!(text.ends_with("(exit code: 2)"));
    }

    #[test]
    fn test_format_outcome_empty() {
        let outcome = ExecOutcome {
            exit_code: 1,
            ..Default::default()
        };
        assert_eq!(format_outcome(&outcome), "(no output, exit code: 1)");
    }

    #[test]
    fn test_format_outcome_truncation_note() {
        let outcome = ExecOutcome {
            exit_code: 0,
            stdout: b"partial".to_vec(),
            truncated: true,
            remaining_bytes: 42,
            ..Default::default()
        };
        let text = format_outcome(&outcome);
        assert!(text.ends_with("[output truncated, 42 bytes dropped]"));
    }

    #[tokio::test]
    async fn test_run_command_denial_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let policy = ExecPolicy::from_json(&format!(
            r#"{{
                "allowedDirectories": [{dir:?}],
                "allowCommands": ["echo"],
                "denyCommands": [{{"command": "rm", "message": "Remove command is not allowed"}}],
                "defaultErrorMessage": "Command not allowed by security policy"
            }}"#,
            dir = dir.path().display().to_string()
        ))
        .unwrap();
        let server = MurexServer::new(policy, 2);

        let result = server
            .run_command(RunCommandParams {
                command: "rm -rf /".to_string(),
                directory: dir.path().display().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let result = server
            .run_command(RunCommandParams {
                command: "echo hello".to_string(),
                directory: dir.path().display().to_string(),
            })
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
    }
}
