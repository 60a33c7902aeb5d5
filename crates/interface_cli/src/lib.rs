//! Adjudicator command line interface
//!
//! Wires configuration, logging and the PostgreSQL adapters around the
//! adjudication engine. The `adjudicator` binary is a thin shell over
//! [`commands::run`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod telemetry;

pub use config::{AppConfig, DatabaseSettings, LogFormat};
pub use telemetry::init_tracing;
