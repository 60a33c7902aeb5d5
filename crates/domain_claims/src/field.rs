//! The schema rules may touch
//!
//! Every `ClaimContext` field a rule script can read or write is listed in
//! [`ContextField`]. Scripts address fields by their PascalCase name
//! (`Claim.RequestedAmount`), and the compiler resolves that name here once so
//! evaluation never does string lookups.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Static type of a context field or script value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Decimal,
    Bool,
    Text,
    TextList,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Decimal)
    }

    /// Returns true if a value of type `value` may be stored into a slot of this type
    pub fn accepts(&self, value: FieldType) -> bool {
        match self {
            FieldType::Int | FieldType::Decimal => value.is_numeric(),
            other => *other == value,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Bool => "boolean",
            FieldType::Text => "string",
            FieldType::TextList => "list",
        };
        f.write_str(name)
    }
}

/// A dynamically typed value read from or written to a context field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Text(String),
    TextList(Vec<String>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Decimal(_) => FieldType::Decimal,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::TextList(_) => FieldType::TextList,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Int(v) => Some(Decimal::from(*v)),
            FieldValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Decimal(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{:?}", v),
            FieldValue::TextList(v) => write!(f, "{:?}", v),
        }
    }
}

macro_rules! context_fields {
    ($( $variant:ident => $name:literal, $ty:ident, $access:ident; )*) => {
        /// A field of [`crate::ClaimContext`] visible to rule scripts
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum ContextField {
            $( $variant, )*
        }

        impl ContextField {
            /// Every field, in declaration order
            pub const ALL: &'static [ContextField] = &[ $( ContextField::$variant, )* ];

            /// The PascalCase name scripts use
            pub fn name(&self) -> &'static str {
                match self {
                    $( ContextField::$variant => $name, )*
                }
            }

            pub fn from_name(name: &str) -> Option<ContextField> {
                match name {
                    $( $name => Some(ContextField::$variant), )*
                    _ => None,
                }
            }

            pub fn field_type(&self) -> FieldType {
                match self {
                    $( ContextField::$variant => FieldType::$ty, )*
                }
            }

            pub fn access(&self) -> FieldAccess {
                match self {
                    $( ContextField::$variant => FieldAccess::$access, )*
                }
            }
        }
    };
}

/// Who may write a field during evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccess {
    /// Claim facts supplied by the caller
    Input,
    /// An input rules may adjust, subject to engine-enforced bounds
    AdjustableInput,
    /// Results produced by rules
    Output,
}

context_fields! {
    ClaimType => "ClaimType", Text, Input;
    RequestedAmount => "RequestedAmount", Int, Input;
    ServiceCode => "ServiceCode", Text, Input;
    ServiceType => "ServiceType", Text, Input;
    DrugCode => "DrugCode", Text, Input;
    DrugGenericCode => "DrugGenericCode", Text, Input;
    Quantity => "Quantity", Int, Input;
    UnitPrice => "UnitPrice", Int, Input;
    ProviderLevel => "ProviderLevel", Int, Input;
    ProviderType => "ProviderType", Text, Input;
    PatientAge => "PatientAge", Int, Input;
    PatientGender => "PatientGender", Text, Input;
    RelationType => "RelationType", Text, Input;
    CoveragePercent => "CoveragePercent", Decimal, AdjustableInput;
    CoverageLimit => "CoverageLimit", Int, Input;
    UsedAmount => "UsedAmount", Int, Input;
    RemainingLimit => "RemainingLimit", Int, Input;
    DaysSincePolicyStart => "DaysSincePolicyStart", Int, Input;
    IsEmergency => "IsEmergency", Bool, Input;
    NeedsPreAuth => "NeedsPreAuth", Bool, Input;
    HasPreAuth => "HasPreAuth", Bool, Input;
    ApprovedAmount => "ApprovedAmount", Int, Output;
    Deductions => "Deductions", Int, Output;
    Franchise => "Franchise", Int, Output;
    BasicShare => "BasicShare", Int, Output;
    SuppShare => "SuppShare", Int, Output;
    IsApproved => "IsApproved", Bool, Output;
    RejectionCodes => "RejectionCodes", TextList, Output;
    DeductionCodes => "DeductionCodes", TextList, Output;
    Notes => "Notes", TextList, Output;
}

impl ContextField {
    pub fn is_writable(&self) -> bool {
        !matches!(self.access(), FieldAccess::Input)
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
