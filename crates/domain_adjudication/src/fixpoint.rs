//! Forward-chaining evaluation loop
//!
//! Each cycle scans the knowledge base in firing order and fires the first
//! rule that is still on the agenda, applies to the claim and whose
//! condition holds. The loop ends when a full scan finds nothing to fire.
//!
//! ```text
//! Pending --condition true--> Matched --selected--> Fired --Retract--> Retracted
//!    ^                                                |
//!    +----------------- still on agenda --------------+
//! ```
//!
//! The loop is synchronous and does no I/O.

use std::time::{Duration, Instant};

use domain_claims::{ClaimContext, FieldChange, WritePolicy};

use crate::compiler::KnowledgeBase;
use crate::error::EvaluationError;

/// Bounds for one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub cycle_ceiling: usize,
    pub deadline: Option<Duration>,
    pub write_policy: WritePolicy,
}

/// One rule firing
#[derive(Debug, Clone)]
pub struct Firing {
    /// 1-based position in the batch
    pub sequence: u32,
    /// Index of the fired rule in [`KnowledgeBase::rules`]
    pub rule_index: usize,
    pub before: ClaimContext,
    pub after: ClaimContext,
    pub changes: Vec<FieldChange>,
    pub retracted: Vec<String>,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub firings: Vec<Firing>,
    pub elapsed: Duration,
    pub error: Option<EvaluationError>,
}

impl BatchOutcome {
    pub fn fired_count(&self) -> usize {
        self.firings.len()
    }
}

/// Runs `kb` against `context` until no rule fires or the batch aborts.
///
/// Mutations made before an abort, including those of the failing rule's
/// earlier statements, are left on `context`.
pub fn run_batch(kb: &KnowledgeBase, context: &mut ClaimContext, limits: &BatchLimits) -> BatchOutcome {
    let started = Instant::now();
    let rules = kb.rules();
    let mut retracted = vec![false; rules.len()];
    let mut firings: Vec<Firing> = Vec::new();

    let error = loop {
        if let Some(deadline) = limits.deadline {
            if started.elapsed() >= deadline {
                break Some(EvaluationError::DeadlineExceeded {
                    deadline_ms: deadline.as_millis().min(u64::MAX as u128) as u64,
                    fired: firings.len(),
                });
            }
        }

        let selected = match select(kb, context, &retracted) {
            Ok(Some(index)) => index,
            Ok(None) => break None,
            Err(err) => break Some(err),
        };
        let rule = &rules[selected];

        if firings.len() >= limits.cycle_ceiling {
            break Some(EvaluationError::CycleLimitExceeded {
                ceiling: limits.cycle_ceiling,
                code: rule.code.clone(),
            });
        }

        let before = context.clone();
        let fired_at = Instant::now();
        let result = rule.script.execute(context, &limits.write_policy);
        let duration = fired_at.elapsed();

        let sequence = firings.len() as u32 + 1;
        let changes = context.changes_since(&before);
        let mut firing = Firing {
            sequence,
            rule_index: selected,
            before,
            after: context.clone(),
            changes,
            retracted: Vec::new(),
            duration,
            error: None,
        };

        match result {
            Ok(effects) => {
                for code in &effects.retracted {
                    for (index, candidate) in rules.iter().enumerate() {
                        if &candidate.code == code {
                            retracted[index] = true;
                        }
                    }
                }
                firing.retracted = effects.retracted;
                firings.push(firing);
            }
            Err(source) => {
                let err = EvaluationError::Action {
                    code: rule.code.clone(),
                    version: rule.version,
                    source,
                };
                firing.error = Some(err.to_string());
                firings.push(firing);
                break Some(err);
            }
        }
    };

    BatchOutcome {
        firings,
        elapsed: started.elapsed(),
        error,
    }
}

/// First rule on the agenda whose filters and condition match
fn select(
    kb: &KnowledgeBase,
    context: &ClaimContext,
    retracted: &[bool],
) -> Result<Option<usize>, EvaluationError> {
    for (index, rule) in kb.rules().iter().enumerate() {
        if retracted[index] || !rule.applicability.matches(context) {
            continue;
        }
        match rule.script.matches(context) {
            Ok(true) => return Ok(Some(index)),
            Ok(false) => {}
            Err(source) => {
                return Err(EvaluationError::Condition {
                    code: rule.code.clone(),
                    version: rule.version,
                    source,
                })
            }
        }
    }
    Ok(None)
}
