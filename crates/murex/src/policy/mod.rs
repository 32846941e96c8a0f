//! Declarative execution policy.
//!
//! The policy is loaded once from a JSON document and is immutable for the
//! lifetime of the service. It answers three kinds of question:
//!
//! - is this command name allowed, denied, or unknown (and with which
//!   sub-command restrictions)?
//! - is this filesystem path inside the allowed directory set?
//! - what are the execution limits (wall-clock deadline, output byte cap)?
//!
//! The policy itself never decides a full invocation — that is the
//! [validator](crate::validator)'s job. It only holds the rules.

mod config;
pub mod paths;

pub use config::{AllowEntry, AllowRule, DenyEntry, ExecPolicy, PolicyDocument, PolicyError};
