//! Core Kernel - Foundational types shared by the adjudication crates
//!
//! This crate provides the building blocks used across the domain modules:
//! - Integer minor-unit amounts and decimal percentages
//! - Inclusive effective windows for rule validity
//! - Strongly-typed identifiers
//! - Port infrastructure (errors, health checks, operation metadata)

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Amount, Percent, MoneyError};
pub use temporal::{EffectiveWindow, TemporalError};
pub use identifiers::{
    TenantId, RuleId, RuleSetId, ClaimId, ExecutionId, LogId, AuditId,
};
pub use error::CoreError;
pub use ports::{
    DomainPort, PortError, HealthCheckable, HealthCheckResult, AdapterHealth,
    OperationMetadata,
};
