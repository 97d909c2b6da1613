//! Pricing Forge API Server binary
//!
//! HTTP REST API over one suite file: list formulas and test cases, run them, read stats.

use clap::builder::RangedU64ValueParser;
use clap::Parser;
use pricing_forge::api::{run_api_server, server::ApiConfig};
use pricing_forge::core::formula::{EngineLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_VISITS};
use pricing_forge::core::{HarnessConfig, DEFAULT_EPSILON};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pricing-forge-server")]
#[command(version)]
#[command(author = "RoyalBit Inc. <admin@royalbit.ca>")]
#[command(about = "Pricing Forge API Server - HTTP REST API for pricing formula test suites")]
#[command(long_about = r#"
Pricing Forge API Server - HTTP REST API

Serves one suite file:
  - GET    /api/v1/formulas                 - List formulas
  - GET    /api/v1/formulas/:id/test-cases  - List test cases (?status=&sort_by=&sort_order=)
  - POST   /api/v1/formulas/:id/test-cases  - Add a test case
  - GET    /api/v1/formulas/:id/stats       - Pass rate and coverage
  - POST   /api/v1/formulas/:id/run         - Run all test cases of a formula
  - GET    /api/v1/test-cases/:id           - Get a test case
  - PATCH  /api/v1/test-cases/:id           - Edit a test case
  - DELETE /api/v1/test-cases/:id           - Delete a test case
  - POST   /api/v1/test-cases/:id/run       - Run one test case
  - POST   /api/v1/compare                  - Compare expected and actual values
  - POST   /api/v1/check                    - Validate a formula

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Example usage:
  pricing-forge-server --suite pricing.yaml
  pricing-forge-server --host 0.0.0.0 --port 3000 --suite pricing.yaml

  curl -X POST http://localhost:8080/api/v1/formulas/1/run
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "PRICING_FORGE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "PRICING_FORGE_PORT")]
    port: u16,

    /// Suite file to serve (created if missing)
    #[arg(short, long, default_value = "suite.yaml", env = "PRICING_FORGE_SUITE")]
    suite: PathBuf,

    /// Relative tolerance for numeric comparison
    #[arg(long, default_value_t = DEFAULT_EPSILON, env = "PRICING_FORGE_EPSILON")]
    epsilon: f64,

    /// Maximum formula nesting depth (1 to 256)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_DEPTH,
        env = "PRICING_FORGE_MAX_DEPTH",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=DEFAULT_MAX_DEPTH as u64)
    )]
    max_depth: usize,

    /// Maximum node visits per evaluation
    #[arg(long, default_value_t = DEFAULT_MAX_VISITS, env = "PRICING_FORGE_MAX_VISITS")]
    max_visits: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        suite: args.suite,
        harness: HarnessConfig {
            limits: EngineLimits {
                max_depth: args.max_depth,
                max_visits: args.max_visits,
            },
            epsilon: args.epsilon,
        },
    };

    run_api_server(config).await
}
