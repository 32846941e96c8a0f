//! Murex CLI - one-shot policy-enforced execution
//!
//! Usage:
//!   murex --config policy.json -c "command"     Execute a command string
//!   murex --config policy.json script.sh        Execute a script file
//!   murex --config policy.json                  Read script from stdin
//!
//! Without `--config`, a small permissive default policy is used and the
//! working directory is added to the allowed set — handy for trying the
//! interpreter out, useless as a security boundary.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use murex::{ExecPolicy, SecureRunner};

/// Murex - run one shell command under a declarative policy
#[derive(Parser, Debug)]
#[command(name = "murex")]
#[command(about = "Policy-enforced shell command execution")]
struct Args {
    /// Path to the policy configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execute this command string instead of reading a script
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Working directory for execution
    #[arg(long, default_value = ".")]
    dir: String,

    /// Override the policy's maximum execution time in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Script file to execute (stdin when omitted and no -c given)
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let directory = if args.dir == "." {
        std::env::current_dir()
            .context("resolving current directory")?
            .display()
            .to_string()
    } else {
        args.dir.clone()
    };

    let mut policy = match &args.config {
        Some(path) => ExecPolicy::from_file(path)
            .with_context(|| format!("loading policy from {}", path.display()))?,
        None => ExecPolicy::default_policy().with_allowed_directory(&directory),
    };
    if let Some(timeout) = args.timeout {
        policy.set_max_exec_seconds(timeout);
    }

    let source = match (&args.command, &args.script) {
        (Some(command), _) => command.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?,
        (None, None) => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("reading script from stdin")?;
            source
        }
    };

    let runner = SecureRunner::new(Arc::new(policy));
    let outcome = match runner.run_command(&source, &directory).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("murex: {err}");
            std::process::exit(1);
        }
    };

    std::io::stdout().write_all(&outcome.stdout).ok();
    std::io::stderr().write_all(&outcome.stderr).ok();
    if outcome.truncated {
        eprintln!("murex: output truncated ({} bytes dropped)", outcome.remaining_bytes);
    }

    std::process::exit(outcome.exit_code);
}
