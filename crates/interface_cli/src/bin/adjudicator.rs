//! Adjudicator binary
//!
//! # Usage
//!
//! ```bash
//! adjudicator check rules/coverage_limit.rule --claim claim.json
//! adjudicator publish --tenant TEN-... --code COVERAGE_LIMIT --name "Coverage limit" \
//!     --category limit --salience 10 --script rules/coverage_limit.rule
//! adjudicator activate --tenant TEN-... --code COVERAGE_LIMIT --version 1 --approved-by md
//! adjudicator evaluate --tenant TEN-... --claim claim.json
//! adjudicator replay --execution EXE-...
//! ```
//!
//! # Environment Variables
//!
//! * `ADJUDICATOR_DATABASE__URL` - PostgreSQL connection string
//! * `ADJUDICATOR_DATABASE__MAX_CONNECTIONS` - Pool size (default: 10)
//! * `ADJUDICATOR_LOG_LEVEL` - Filter used when `RUST_LOG` is unset (default: info)
//! * `ADJUDICATOR_LOG_FORMAT` - `plain` or `json`
//! * `ADJUDICATOR_ENGINE__*` - Engine tunables such as `MAX_CYCLES` or `EVALUATION_TIMEOUT_MS`

use anyhow::Context;
use clap::Parser;

use interface_cli::cli::Cli;
use interface_cli::{commands, init_tracing, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    init_tracing(&config.log_level, config.log_format);

    commands::run(cli, config).await
}
