//! Claim working memory
//!
//! A [`ClaimContext`] holds one claim's financial and clinical facts together
//! with the outputs rules produce. It is private to a single evaluation; the
//! engine reads and writes it only through [`ClaimContext::get`] and
//! [`ClaimContext::set`], which enforce the field schema.

use core_kernel::{Amount, ClaimId, Percent, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{DecisionType, FinancialOutcome};
use crate::error::ClaimError;
use crate::field::{ContextField, FieldAccess, FieldType, FieldValue};

/// Limits applied when rules write to the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Upper bound for `CoveragePercent`; writes above it are clamped
    pub coverage_percent_ceiling: Percent,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            coverage_percent_ceiling: Percent::hundred(),
        }
    }
}

/// Facts and results for one claim under adjudication.
///
/// Missing fields deserialize to zero, empty or `false`; both ids default to
/// the nil UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimContext {
    pub claim_id: ClaimId,
    pub tenant_id: TenantId,
    pub claim_type: String,

    pub requested_amount: Amount,
    pub service_code: String,
    pub service_type: String,
    pub drug_code: String,
    pub drug_generic_code: String,
    pub quantity: i64,
    pub unit_price: Amount,

    pub provider_level: i64,
    pub provider_type: String,

    pub patient_age: i64,
    pub patient_gender: String,
    pub relation_type: String,

    pub coverage_percent: Percent,
    pub coverage_limit: Amount,
    pub used_amount: Amount,
    pub remaining_limit: Amount,
    pub days_since_policy_start: i64,

    pub is_emergency: bool,
    pub needs_pre_auth: bool,
    pub has_pre_auth: bool,

    pub approved_amount: Amount,
    pub deductions: Amount,
    pub franchise: Amount,
    pub basic_share: Amount,
    pub supp_share: Amount,
    pub is_approved: bool,
    pub rejection_codes: Vec<String>,
    pub deduction_codes: Vec<String>,
    pub notes: Vec<String>,
}

impl Default for ClaimContext {
    fn default() -> Self {
        Self {
            claim_id: ClaimId::from_uuid(Uuid::nil()),
            tenant_id: TenantId::from_uuid(Uuid::nil()),
            claim_type: String::new(),
            requested_amount: Amount::zero(),
            service_code: String::new(),
            service_type: String::new(),
            drug_code: String::new(),
            drug_generic_code: String::new(),
            quantity: 0,
            unit_price: Amount::zero(),
            provider_level: 0,
            provider_type: String::new(),
            patient_age: 0,
            patient_gender: String::new(),
            relation_type: String::new(),
            coverage_percent: Percent::zero(),
            coverage_limit: Amount::zero(),
            used_amount: Amount::zero(),
            remaining_limit: Amount::zero(),
            days_since_policy_start: 0,
            is_emergency: false,
            needs_pre_auth: false,
            has_pre_auth: false,
            approved_amount: Amount::zero(),
            deductions: Amount::zero(),
            franchise: Amount::zero(),
            basic_share: Amount::zero(),
            supp_share: Amount::zero(),
            is_approved: false,
            rejection_codes: Vec::new(),
            deduction_codes: Vec::new(),
            notes: Vec::new(),
        }
    }
}

/// One field that changed between two states of a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: ContextField,
    pub before: FieldValue,
    pub after: FieldValue,
}

impl ClaimContext {
    pub fn new(tenant_id: TenantId, claim_id: ClaimId) -> Self {
        Self {
            tenant_id,
            claim_id,
            ..Default::default()
        }
    }

    /// Reads a field as a dynamically typed value
    pub fn get(&self, field: ContextField) -> FieldValue {
        use ContextField as F;
        match field {
            F::ClaimType => FieldValue::Text(self.claim_type.clone()),
            F::RequestedAmount => FieldValue::Int(self.requested_amount.minor_units()),
            F::ServiceCode => FieldValue::Text(self.service_code.clone()),
            F::ServiceType => FieldValue::Text(self.service_type.clone()),
            F::DrugCode => FieldValue::Text(self.drug_code.clone()),
            F::DrugGenericCode => FieldValue::Text(self.drug_generic_code.clone()),
            F::Quantity => FieldValue::Int(self.quantity),
            F::UnitPrice => FieldValue::Int(self.unit_price.minor_units()),
            F::ProviderLevel => FieldValue::Int(self.provider_level),
            F::ProviderType => FieldValue::Text(self.provider_type.clone()),
            F::PatientAge => FieldValue::Int(self.patient_age),
            F::PatientGender => FieldValue::Text(self.patient_gender.clone()),
            F::RelationType => FieldValue::Text(self.relation_type.clone()),
            F::CoveragePercent => FieldValue::Decimal(self.coverage_percent.as_decimal()),
            F::CoverageLimit => FieldValue::Int(self.coverage_limit.minor_units()),
            F::UsedAmount => FieldValue::Int(self.used_amount.minor_units()),
            F::RemainingLimit => FieldValue::Int(self.remaining_limit.minor_units()),
            F::DaysSincePolicyStart => FieldValue::Int(self.days_since_policy_start),
            F::IsEmergency => FieldValue::Bool(self.is_emergency),
            F::NeedsPreAuth => FieldValue::Bool(self.needs_pre_auth),
            F::HasPreAuth => FieldValue::Bool(self.has_pre_auth),
            F::ApprovedAmount => FieldValue::Int(self.approved_amount.minor_units()),
            F::Deductions => FieldValue::Int(self.deductions.minor_units()),
            F::Franchise => FieldValue::Int(self.franchise.minor_units()),
            F::BasicShare => FieldValue::Int(self.basic_share.minor_units()),
            F::SuppShare => FieldValue::Int(self.supp_share.minor_units()),
            F::IsApproved => FieldValue::Bool(self.is_approved),
            F::RejectionCodes => FieldValue::TextList(self.rejection_codes.clone()),
            F::DeductionCodes => FieldValue::TextList(self.deduction_codes.clone()),
            F::Notes => FieldValue::TextList(self.notes.clone()),
        }
    }

    /// Writes a field on behalf of a rule.
    ///
    /// Decimal values written to integer fields are floored. Writes to
    /// `CoveragePercent` are clamped into `[0, policy.coverage_percent_ceiling]`.
    ///
    /// # Errors
    ///
    /// Fails for read-only inputs, mismatched value types, and decimals that
    /// do not fit in an integer field.
    pub fn set(
        &mut self,
        field: ContextField,
        value: FieldValue,
        policy: &WritePolicy,
    ) -> Result<(), ClaimError> {
        if field.access() == FieldAccess::Input {
            return Err(ClaimError::ReadOnlyField(field.name().to_string()));
        }
        let expected = field.field_type();
        if !expected.accepts(value.field_type()) {
            return Err(ClaimError::TypeMismatch {
                field: field.name().to_string(),
                expected: expected.to_string(),
                actual: value.field_type().to_string(),
            });
        }

        use ContextField as F;
        match field {
            F::CoveragePercent => {
                let raw = numeric(field, &value)?;
                self.coverage_percent = Percent::new(raw)
                    .clamp_within(Percent::zero(), policy.coverage_percent_ceiling);
            }
            F::ApprovedAmount => self.approved_amount = amount(field, &value)?,
            F::Deductions => self.deductions = amount(field, &value)?,
            F::Franchise => self.franchise = amount(field, &value)?,
            F::BasicShare => self.basic_share = amount(field, &value)?,
            F::SuppShare => self.supp_share = amount(field, &value)?,
            F::IsApproved => self.is_approved = value.as_bool().unwrap_or_default(),
            F::RejectionCodes => self.rejection_codes = text_list(value),
            F::DeductionCodes => self.deduction_codes = text_list(value),
            F::Notes => self.notes = text_list(value),
            other => return Err(ClaimError::ReadOnlyField(other.name().to_string())),
        }
        Ok(())
    }

    /// Fields whose value differs from `before`, in schema order
    pub fn changes_since(&self, before: &ClaimContext) -> Vec<FieldChange> {
        ContextField::ALL
            .iter()
            .filter_map(|field| {
                let old = before.get(*field);
                let new = self.get(*field);
                (old != new).then(|| FieldChange {
                    field: *field,
                    before: old,
                    after: new,
                })
            })
            .collect()
    }

    /// Classifies the current outputs
    pub fn decision(&self) -> DecisionType {
        DecisionType::classify(self.is_approved, &self.rejection_codes)
    }

    /// The financial fields copied onto a decision audit
    pub fn financials(&self) -> FinancialOutcome {
        FinancialOutcome {
            requested_amount: self.requested_amount,
            approved_amount: self.approved_amount,
            deductions: self.deductions,
            franchise: self.franchise,
            basic_share: self.basic_share,
            supp_share: self.supp_share,
            decision: self.decision(),
            rejection_codes: self.rejection_codes.clone(),
        }
    }

    /// Returns true when approved amount plus deductions equals the requested amount
    pub fn reconciles(&self) -> bool {
        self.approved_amount
            .checked_add(self.deductions)
            .map_or(false, |total| total == self.requested_amount)
    }

    /// Derives `remaining_limit` from the coverage limit and the used amount
    pub fn with_derived_remaining_limit(mut self) -> Self {
        self.remaining_limit = self.coverage_limit.saturating_sub_floor_zero(self.used_amount);
        self
    }
}

fn numeric(field: ContextField, value: &FieldValue) -> Result<Decimal, ClaimError> {
    value.as_decimal().ok_or_else(|| ClaimError::TypeMismatch {
        field: field.name().to_string(),
        expected: FieldType::Decimal.to_string(),
        actual: value.field_type().to_string(),
    })
}

fn amount(field: ContextField, value: &FieldValue) -> Result<Amount, ClaimError> {
    match value {
        FieldValue::Int(v) => Ok(Amount::new(*v)),
        other => {
            let raw = numeric(field, other)?;
            Amount::from_decimal_floor(raw)
                .map_err(|_| ClaimError::Overflow(field.name().to_string()))
        }
    }
}

fn text_list(value: FieldValue) -> Vec<String> {
    match value {
        FieldValue::TextList(items) => items,
        _ => Vec::new(),
    }
}
