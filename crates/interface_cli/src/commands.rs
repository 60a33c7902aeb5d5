//! Command implementations
//!
//! Every command prints its result as pretty JSON on stdout.

use anyhow::{bail, Context};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use core_kernel::EffectiveWindow;
use domain_adjudication::{AdjudicationEngine, EvaluationRequest, EvaluationResult};
use domain_claims::{ClaimContext, FieldChange, WritePolicy};
use domain_rules::{compile, Applicability, NewRuleVersion, RuleStorePort, RuleTransition, Script};
use infra_db::{create_pool, run_migrations, PostgresAuditRecorder, PostgresRuleStore};

use crate::cli::{
    ActivateArgs, CheckArgs, Cli, Command, EvaluateArgs, PublishArgs, ReplayArgs, RetireArgs,
    TenantArgs, VersionsArgs,
};
use crate::config::AppConfig;

/// Connected adapters and the engine built on them
pub struct Services {
    pub store: Arc<PostgresRuleStore>,
    pub engine: AdjudicationEngine,
}

impl Services {
    /// Connects to the database and brings the schema up to date
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = create_pool(config.database.pool_config())
            .await
            .context("connecting to the database")?;
        run_migrations(&pool).await.context("applying migrations")?;

        let store = Arc::new(PostgresRuleStore::new(pool.clone()));
        let audit = Arc::new(PostgresAuditRecorder::new(pool));
        let engine = AdjudicationEngine::new(store.clone(), audit, config.engine.clone());
        Ok(Self { store, engine })
    }
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    if let Command::Check(args) = &cli.command {
        return check(args, &config);
    }

    let services = Services::connect(&config).await?;
    match cli.command {
        Command::Check(_) => Ok(()),
        Command::Tenant(args) => register_tenant(&services, args).await,
        Command::Publish(args) => publish(&services, args).await,
        Command::Activate(args) => activate(&services, args).await,
        Command::Retire(args) => retire(&services, args).await,
        Command::Versions(args) => versions(&services, args).await,
        Command::Evaluate(args) => evaluate(&services, args).await,
        Command::Replay(args) => replay(&services, args).await,
    }
}

/// What a compiled script reads like, and optionally what it would do
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub condition: String,
    pub actions: String,
    pub writes: Vec<String>,
    pub retracts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<DryRun>,
}

#[derive(Debug, Serialize)]
pub struct DryRun {
    pub matched: bool,
    pub changes: Vec<FieldChange>,
    pub retracted: Vec<String>,
}

fn check(args: &CheckArgs, config: &AppConfig) -> anyhow::Result<()> {
    let source = read_input(&args.script)?;
    let script = compile(&source).context("script does not compile")?;

    let dry_run = match &args.claim {
        Some(path) => {
            let ctx: ClaimContext = serde_json::from_str(&read_input(path)?)
                .context("claim context is not valid JSON")?;
            Some(dry_run(&script, &ctx, &config.engine.write_policy())?)
        }
        None => None,
    };

    emit(&CheckReport {
        condition: script.condition_text().to_string(),
        actions: script.action_text().to_string(),
        writes: script.written_fields().iter().map(|f| f.name().to_string()).collect(),
        retracts: script.retract_targets().into_iter().map(str::to_owned).collect(),
        dry_run,
    })
}

/// Runs one script against a copy of `ctx`, ignoring salience and retraction
pub fn dry_run(script: &Script, ctx: &ClaimContext, policy: &WritePolicy) -> anyhow::Result<DryRun> {
    if !script.matches(ctx)? {
        return Ok(DryRun {
            matched: false,
            changes: Vec::new(),
            retracted: Vec::new(),
        });
    }
    let mut after = ctx.clone();
    let effects = script.execute(&mut after, policy)?;
    Ok(DryRun {
        matched: true,
        changes: after.changes_since(ctx),
        retracted: effects.retracted,
    })
}

async fn register_tenant(services: &Services, args: TenantArgs) -> anyhow::Result<()> {
    services.store.register_tenant(args.tenant, &args.name).await?;
    info!(tenant_id = %args.tenant, "Tenant registered");
    emit(&serde_json::json!({ "tenant_id": args.tenant, "name": args.name }))
}

/// Builds a version request from command line arguments and script text
pub fn new_rule_version(args: &PublishArgs, script: String) -> anyhow::Result<NewRuleVersion> {
    let effective = EffectiveWindow::new(args.effective_from, args.effective_to)
        .context("invalid effective window")?;
    let mut request = NewRuleVersion::new(args.code.clone(), args.name.clone(), args.category, script)
        .with_salience(args.salience)
        .with_applicability(Applicability::from_csv(
            &args.claim_types,
            &args.service_types,
            &args.provider_levels,
        ))
        .with_effective(effective);
    request.description = args.description.clone();
    request.tags = args.tags.clone();
    request.notes = args.notes.clone();
    if let Some(author) = &args.created_by {
        request = request.created_by(author.clone());
    }
    request.validate()?;
    Ok(request)
}

async fn publish(services: &Services, args: PublishArgs) -> anyhow::Result<()> {
    let script = read_input(&args.script)?;
    let request = new_rule_version(&args, script)?;
    let rule = services.store.create_version(args.tenant, request, None).await?;
    info!(code = %rule.code, version = rule.version, "Draft version created");
    emit(&rule)
}

async fn activate(services: &Services, args: ActivateArgs) -> anyhow::Result<()> {
    let transition = RuleTransition::Activate {
        approved_by: args.approved_by,
    };
    apply(services, args.tenant, &args.code, args.version, transition).await
}

async fn retire(services: &Services, args: RetireArgs) -> anyhow::Result<()> {
    apply(services, args.tenant, &args.code, args.version, args.to.transition()).await
}

async fn apply(
    services: &Services,
    tenant: core_kernel::TenantId,
    code: &str,
    version: u32,
    transition: RuleTransition,
) -> anyhow::Result<()> {
    let rule = services
        .store
        .transition(tenant, code, version, transition, None)
        .await?;
    services.engine.invalidate(tenant).await;
    info!(code = %rule.code, version = rule.version, status = %rule.status, "Rule status changed");
    emit(&rule)
}

async fn versions(services: &Services, args: VersionsArgs) -> anyhow::Result<()> {
    let rules = services.store.list_versions(args.tenant, &args.code, None).await?;
    emit(&rules)
}

#[derive(Debug, Serialize)]
struct EvaluationReport<'a> {
    result: &'a EvaluationResult,
    audit_persisted: bool,
}

async fn evaluate(services: &Services, args: EvaluateArgs) -> anyhow::Result<()> {
    let context: ClaimContext = serde_json::from_str(&read_input(&args.claim)?)
        .context("claim context is not valid JSON")?;

    let mut request = EvaluationRequest::new(args.tenant, context);
    if let Some(id) = args.rule_set {
        request = request.with_rule_set(id);
    }
    if let Some(at) = args.as_of {
        request = request.as_of(at);
    }
    if let Some(ms) = args.deadline_ms {
        request = request.with_deadline(Duration::from_millis(ms));
    }
    if let Some(processor) = args.processed_by {
        request = request.processed_by(processor);
    }
    if let Some(note) = args.note {
        request = request.with_note(note);
    }

    let outcome = services.engine.evaluate(request).await?;
    emit(&EvaluationReport {
        result: &outcome.result,
        audit_persisted: outcome.audit_error.is_none(),
    })?;

    if let Some(err) = outcome.audit_error {
        bail!("decision {} was not fully recorded: {}", outcome.result.execution_id, err);
    }
    Ok(())
}

async fn replay(services: &Services, args: ReplayArgs) -> anyhow::Result<()> {
    let report = services.engine.replay_execution(args.execution, None).await?;
    emit(&report)?;
    if !report.matches() {
        warn!(execution_id = %args.execution, "Replay diverged from the recorded decision");
        bail!("replay differs on {}", report.differences().join(", "));
    }
    Ok(())
}

/// Reads a file, or stdin when the path is `-`
fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn emit<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use core_kernel::{Amount, ClaimId, Percent, TenantId};
    use rust_decimal_macros::dec;

    const BONUS: &str = r#"
        when Claim.IsEmergency
        then Claim.CoveragePercent = Claim.CoveragePercent + 10;
             Retract("EMERGENCY_BONUS")
    "#;

    fn publish_args(extra: &[&str]) -> PublishArgs {
        let tenant = TenantId::new().to_string();
        let mut argv = vec![
            "adjudicator",
            "publish",
            "--tenant",
            tenant.as_str(),
            "--code",
            "EMERGENCY_BONUS",
            "--name",
            "Emergency bonus",
            "--category",
            "coverage",
            "--script",
            "bonus.rule",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Publish(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_reports_clamped_changes() {
        let script = compile(BONUS).unwrap();
        let ctx = ClaimContext {
            is_emergency: true,
            coverage_percent: Percent::new(dec!(95)),
            requested_amount: Amount::new(1_000),
            ..ClaimContext::new(TenantId::new(), ClaimId::new())
        };

        let run = dry_run(&script, &ctx, &WritePolicy::default()).unwrap();

        assert!(run.matched);
        assert_eq!(run.retracted, vec!["EMERGENCY_BONUS".to_string()]);
        assert_eq!(run.changes.len(), 1);
        assert_eq!(run.changes[0].field.name(), "CoveragePercent");
        assert_eq!(run.changes[0].after.to_string(), "100");
    }

    #[test]
    fn test_dry_run_skips_unmatched_claims() {
        let script = compile(BONUS).unwrap();
        let ctx = ClaimContext::new(TenantId::new(), ClaimId::new());

        let run = dry_run(&script, &ctx, &WritePolicy::default()).unwrap();
        assert!(!run.matched);
        assert!(run.changes.is_empty());
    }

    #[test]
    fn test_publish_arguments_become_a_request() {
        let args = publish_args(&[
            "--salience",
            "15",
            "--claim-types",
            "OUTPATIENT, INPATIENT",
            "--effective-from",
            "2026-01-01T00:00:00Z",
            "--effective-to",
            "2026-12-31T23:59:59Z",
        ]);

        let request = new_rule_version(&args, BONUS.to_string()).unwrap();

        assert_eq!(request.salience, 15);
        assert_eq!(request.applicability.claim_types, vec!["OUTPATIENT", "INPATIENT"]);
        assert!(request.effective.from.is_some());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let args = publish_args(&[
            "--effective-from",
            "2026-12-31T00:00:00Z",
            "--effective-to",
            "2026-01-01T00:00:00Z",
        ]);

        assert!(new_rule_version(&args, BONUS.to_string()).is_err());
    }
}
