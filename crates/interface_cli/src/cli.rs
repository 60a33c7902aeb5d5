//! Command line definition

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use core_kernel::{ExecutionId, RuleSetId, TenantId};
use domain_rules::{RuleCategory, RuleTransition};

#[derive(Parser, Debug)]
#[command(
    name = "adjudicator",
    about = "Administer adjudication rules, evaluate claims and replay recorded decisions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a rule script without touching the database
    Check(CheckArgs),
    /// Register a tenant, or rename an existing one
    Tenant(TenantArgs),
    /// Create the next draft version of a rule
    Publish(PublishArgs),
    /// Approve a draft or re-enable an inactive version
    Activate(ActivateArgs),
    /// Take a version out of service
    Retire(RetireArgs),
    /// List every version of a rule
    Versions(VersionsArgs),
    /// Evaluate a claim context and record the decision
    Evaluate(EvaluateArgs),
    /// Re-run a recorded decision and compare it with the audit
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Script file, or `-` for stdin
    pub script: PathBuf,
    /// Claim context JSON to dry-run the script against
    #[arg(long)]
    pub claim: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TenantArgs {
    #[arg(long)]
    pub tenant: TenantId,
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[arg(long)]
    pub tenant: TenantId,
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub category: RuleCategory,
    /// Script file, or `-` for stdin
    #[arg(long)]
    pub script: PathBuf,
    /// Higher fires first
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub salience: i32,
    #[arg(long)]
    pub description: Option<String>,
    /// Comma-separated claim types; empty matches all
    #[arg(long, default_value = "")]
    pub claim_types: String,
    #[arg(long, default_value = "")]
    pub service_types: String,
    #[arg(long, default_value = "")]
    pub provider_levels: String,
    /// RFC 3339 instant; open when omitted
    #[arg(long)]
    pub effective_from: Option<DateTime<Utc>>,
    #[arg(long)]
    pub effective_to: Option<DateTime<Utc>>,
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, env = "USER")]
    pub created_by: Option<String>,
}

#[derive(Args, Debug)]
pub struct ActivateArgs {
    #[arg(long)]
    pub tenant: TenantId,
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub version: u32,
    #[arg(long)]
    pub approved_by: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Retirement {
    Inactive,
    Deprecated,
    Archived,
}

impl Retirement {
    pub fn transition(self) -> RuleTransition {
        match self {
            Retirement::Inactive => RuleTransition::Deactivate,
            Retirement::Deprecated => RuleTransition::Deprecate,
            Retirement::Archived => RuleTransition::Archive,
        }
    }
}

#[derive(Args, Debug)]
pub struct RetireArgs {
    #[arg(long)]
    pub tenant: TenantId,
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub version: u32,
    #[arg(long, value_enum)]
    pub to: Retirement,
}

#[derive(Args, Debug)]
pub struct VersionsArgs {
    #[arg(long)]
    pub tenant: TenantId,
    #[arg(long)]
    pub code: String,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub tenant: TenantId,
    /// Claim context JSON, or `-` for stdin
    #[arg(long)]
    pub claim: PathBuf,
    /// Evaluate only the members of this rule set
    #[arg(long)]
    pub rule_set: Option<RuleSetId>,
    /// Resolve rules as of this RFC 3339 instant instead of now
    #[arg(long)]
    pub as_of: Option<DateTime<Utc>>,
    #[arg(long)]
    pub deadline_ms: Option<u64>,
    #[arg(long)]
    pub processed_by: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[arg(long)]
    pub execution: ExecutionId,
}
