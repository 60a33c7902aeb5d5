//! Rule script language
//!
//! A rule body is a single production:
//!
//! ```text
//! when Claim.RequestedAmount > Claim.RemainingLimit
//! then Claim.ApprovedAmount = Claim.RemainingLimit;
//!      Claim.Deductions = Claim.RequestedAmount - Claim.RemainingLimit;
//!      Claim.DeductionCodes = Append(Claim.DeductionCodes, "LIMIT_EXCEEDED");
//!      Retract("COVERAGE_LIMIT")
//! ```
//!
//! Scripts are compiled once into a [`Script`]: tokens are parsed into an
//! arena of nodes, names are resolved against the claim context schema, and
//! types are checked. A compiled script is immutable and can be shared
//! between concurrent evaluations.

pub mod ast;
pub mod error;
mod eval;
pub mod lexer;
pub mod parser;
mod typeck;

use domain_claims::{ClaimContext, ContextField, WritePolicy};

pub use ast::{NodeId, Span, Statement};
pub use error::{RuntimeError, ScriptError};

use ast::Node;
use eval::Interpreter;
use parser::Parser;
use typeck::TypeChecker;

/// A compiled rule script
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    source: String,
    nodes: Vec<Node>,
    condition: NodeId,
    actions: Vec<Statement>,
    action_span: Span,
}

/// Side effects of running a script's actions beyond field writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionEffects {
    /// Rule codes retracted by this firing, in statement order
    pub retracted: Vec<String>,
}

/// Compiles a script body.
///
/// # Errors
///
/// Returns a [`ScriptError`] for syntax errors, unknown names, arity and type
/// errors, and assignments to read-only context fields.
pub fn compile(source: &str) -> Result<Script, ScriptError> {
    let tokens = lexer::tokenize(source)?;
    let parsed = Parser::new(source, tokens).parse()?;
    TypeChecker::new(source, &parsed.nodes).check(parsed.condition, &parsed.actions)?;

    Ok(Script {
        source: source.to_string(),
        nodes: parsed.nodes,
        condition: parsed.condition,
        actions: parsed.actions,
        action_span: parsed.action_span,
    })
}

impl Script {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source text of the `when` section
    pub fn condition_text(&self) -> &str {
        self.nodes
            .get(self.condition.index())
            .map(|n| n.span.slice(&self.source).trim())
            .unwrap_or("")
    }

    /// Source text of the `then` section
    pub fn action_text(&self) -> &str {
        self.action_span.slice(&self.source).trim()
    }

    pub fn actions(&self) -> &[Statement] {
        &self.actions
    }

    /// Fields this script may assign
    pub fn written_fields(&self) -> Vec<ContextField> {
        let mut fields: Vec<_> = self
            .actions
            .iter()
            .filter_map(|a| match a {
                Statement::Assign { field, .. } => Some(*field),
                Statement::Retract { .. } => None,
            })
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }

    /// Rule codes named by `Retract` statements
    pub fn retract_targets(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Statement::Retract { code, .. } => Some(code.as_str()),
                Statement::Assign { .. } => None,
            })
            .collect()
    }

    /// Evaluates the condition against the current context
    pub fn matches(&self, ctx: &ClaimContext) -> Result<bool, RuntimeError> {
        self.interpreter().eval_bool(self.condition, ctx)
    }

    /// Runs the actions in order.
    ///
    /// Each statement sees the writes of the statements before it. Writes made
    /// before a failing statement stay applied.
    pub fn execute(
        &self,
        ctx: &mut ClaimContext,
        policy: &WritePolicy,
    ) -> Result<ActionEffects, RuntimeError> {
        let interpreter = self.interpreter();
        let mut effects = ActionEffects::default();

        for action in &self.actions {
            match action {
                Statement::Assign { field, value, .. } => {
                    let computed = interpreter.eval(*value, ctx)?;
                    eval::write(ctx, *field, computed, policy)?;
                }
                Statement::Retract { code, .. } => effects.retracted.push(code.clone()),
            }
        }
        Ok(effects)
    }

    fn interpreter(&self) -> Interpreter<'_> {
        Interpreter {
            source: &self.source,
            nodes: &self.nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Amount, MoneyError, Percent};
    use rust_decimal_macros::dec;

    const COVERAGE_LIMIT: &str = r#"
        when Claim.RequestedAmount > Claim.RemainingLimit
        then Claim.ApprovedAmount = Claim.RemainingLimit;
             Claim.Deductions = Claim.RequestedAmount - Claim.RemainingLimit;
             Claim.DeductionCodes = Append(Claim.DeductionCodes, "LIMIT_EXCEEDED");
             Retract("COVERAGE_LIMIT")
    "#;

    fn claim() -> ClaimContext {
        ClaimContext {
            requested_amount: Amount::new(1_000_000),
            remaining_limit: Amount::new(700_000),
            coverage_percent: Percent::new(dec!(80)),
            ..Default::default()
        }
    }

    #[test]
    fn test_coverage_limit_script() {
        let script = compile(COVERAGE_LIMIT).unwrap();
        let mut ctx = claim();
        assert!(script.matches(&ctx).unwrap());

        let effects = script.execute(&mut ctx, &WritePolicy::default()).unwrap();
        assert_eq!(ctx.approved_amount, Amount::new(700_000));
        assert_eq!(ctx.deductions, Amount::new(300_000));
        assert_eq!(ctx.deduction_codes, vec!["LIMIT_EXCEEDED".to_string()]);
        assert_eq!(effects.retracted, vec!["COVERAGE_LIMIT".to_string()]);
    }

    #[test]
    fn test_condition_and_action_text() {
        let script = compile(COVERAGE_LIMIT).unwrap();
        assert_eq!(script.condition_text(), "Claim.RequestedAmount > Claim.RemainingLimit");
        assert!(script.action_text().starts_with("Claim.ApprovedAmount = Claim.RemainingLimit;"));
        assert!(script.action_text().ends_with("Retract(\"COVERAGE_LIMIT\")"));
    }

    #[test]
    fn test_franchise_with_decimal_percentage() {
        let script = compile(
            "when Claim.ApprovedAmount > 0 && Claim.CoveragePercent > 0 \
             then Claim.Franchise = Claim.ApprovedAmount * (100 - Claim.CoveragePercent) / 100; \
                  Claim.SuppShare = Claim.ApprovedAmount - Claim.Franchise",
        )
        .unwrap();
        let mut ctx = claim();
        ctx.approved_amount = Amount::new(700_000);
        script.execute(&mut ctx, &WritePolicy::default()).unwrap();
        assert_eq!(ctx.franchise, Amount::new(140_000));
        assert_eq!(ctx.supp_share, Amount::new(560_000));
    }

    #[test]
    fn test_percent_builtin_respects_bounds() {
        let script = compile(
            "when true then Claim.BasicShare = Percent(Claim.RequestedAmount, 10, 0, 50000)",
        )
        .unwrap();
        let mut ctx = claim();
        script.execute(&mut ctx, &WritePolicy::default()).unwrap();
        assert_eq!(ctx.basic_share, Amount::new(50_000));
    }

    #[test]
    fn test_percent_builtin_with_inverted_bounds_is_a_runtime_error() {
        let script = compile("when true then Claim.BasicShare = Percent(100, 50, 10, 1)").unwrap();
        let mut ctx = claim();
        let err = script.execute(&mut ctx, &WritePolicy::default()).unwrap_err();
        assert_eq!(err, RuntimeError::Money(MoneyError::InvalidBounds { min: 10, max: 1 }));
        assert_eq!(ctx.basic_share, Amount::zero());
    }

    #[test]
    fn test_assignment_to_input_is_a_compile_error() {
        let err = compile("when true then Claim.RemainingLimit = 0").unwrap_err();
        assert_eq!(err, ScriptError::ReadOnlyField { field: "RemainingLimit".into() });
    }

    #[test]
    fn test_non_boolean_condition_is_a_compile_error() {
        assert!(matches!(
            compile("when Claim.RequestedAmount then Claim.IsApproved = true"),
            Err(ScriptError::Type { .. })
        ));
    }

    #[test]
    fn test_string_into_amount_is_a_compile_error() {
        assert!(matches!(
            compile("when true then Claim.ApprovedAmount = \"all\""),
            Err(ScriptError::Type { .. })
        ));
    }

    #[test]
    fn test_division_by_zero_is_a_runtime_error_and_keeps_earlier_writes() {
        let script = compile(
            "when true then Claim.IsApproved = true; Claim.ApprovedAmount = Claim.RequestedAmount / Claim.Quantity",
        )
        .unwrap();
        let mut ctx = claim();
        let err = script.execute(&mut ctx, &WritePolicy::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { ref expression } if expression.contains("Claim.Quantity")));
        assert!(ctx.is_approved);
    }

    #[test]
    fn test_contains_and_list_literals() {
        let script = compile(
            "when Contains([\"DENTAL\", \"OPTICAL\"], Claim.ServiceType) && !Claim.HasPreAuth \
             then Claim.RejectionCodes = Append(Claim.RejectionCodes, \"PRE_AUTH_REQUIRED\")",
        )
        .unwrap();
        let mut ctx = claim();
        ctx.service_type = "DENTAL".into();
        assert!(script.matches(&ctx).unwrap());
        script.execute(&mut ctx, &WritePolicy::default()).unwrap();
        assert_eq!(ctx.rejection_codes, vec!["PRE_AUTH_REQUIRED".to_string()]);
    }

    #[test]
    fn test_emergency_bonus_clamped_by_write_policy() {
        let script = compile(
            "when Claim.IsEmergency == true && Claim.CoveragePercent < 100 \
             then Claim.CoveragePercent = Claim.CoveragePercent + 10",
        )
        .unwrap();
        let mut ctx = claim();
        ctx.is_emergency = true;
        ctx.coverage_percent = Percent::new(dec!(95));
        script.execute(&mut ctx, &WritePolicy::default()).unwrap();
        assert_eq!(ctx.coverage_percent, Percent::hundred());
    }
}
