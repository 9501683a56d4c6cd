//! Lakeglass CLI
//!
//! Command-line interface for trying dashboard queries against a SQL warehouse.
//!
//! # Usage
//!
//! ```bash
//! lakeglass --help
//! lakeglass macros
//! lakeglass expand --from 2024-01-01T00:00:00Z --to 2024-01-02T00:00:00Z \
//!     "SELECT * FROM t WHERE \$__timeFilter(ts)"
//! lakeglass health
//! lakeglass query --from 1704067200000 --to 1704153600000 "SELECT 1"
//! ```
//!
//! `health` and `query` read the warehouse settings from `LAKEGLASS_DB_*`
//! environment variables (or a `.env` file).

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shared::config::DatasourceSettings;
use shared::datasource::{Datasource, HealthStatus};
use shared::models::{DataQuery, QueryContext, QueryDataRequest, TimeRange};
use shared::query::{catalog, expand_macros};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lakeglass CLI - dashboard SQL against a warehouse
#[derive(Parser)]
#[command(name = "lakeglass")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported macro placeholders
    Macros,
    /// Expand macros in a SQL template without contacting the warehouse
    Expand(TemplateArgs),
    /// Check the warehouse connection
    Health,
    /// Run a query and print the resulting frame as JSON
    Query {
        #[command(flatten)]
        template: TemplateArgs,

        /// Pivot the long result into one column per series
        #[arg(long)]
        wide: bool,
    },
}

#[derive(Args)]
struct TemplateArgs {
    /// SQL template, possibly containing macro placeholders
    sql: String,

    /// Range start, RFC 3339 or epoch milliseconds
    #[arg(long)]
    from: String,

    /// Range end, RFC 3339 or epoch milliseconds
    #[arg(long)]
    to: String,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = 60_000)]
    interval_ms: u64,
}

impl TemplateArgs {
    fn time_range(&self) -> Result<TimeRange> {
        serde_json::from_value(json!({"from": self.from, "to": self.to}))
            .context("Invalid time range")
    }

    fn context(&self) -> Result<QueryContext> {
        Ok(QueryContext::new(
            self.time_range()?,
            Duration::from_millis(self.interval_ms),
            self.sql.as_str(),
        ))
    }

    fn request(&self, wide: bool) -> Result<QueryDataRequest> {
        let query = DataQuery::from(json!({
            "refId": "A",
            "timeRange": self.time_range()?,
            "intervalMs": self.interval_ms,
            "rawSqlQuery": self.sql,
            "querySettings": {"convertLongToWide": wide}
        }));
        query.parse().context("Invalid query")?;
        Ok(QueryDataRequest {
            queries: vec![query],
        })
    }
}

async fn connect() -> Result<Datasource> {
    let settings = DatasourceSettings::from_env().context("Invalid datasource settings")?;
    Datasource::new(&settings)
        .await
        .context("Failed to connect to the warehouse")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Macros) => {
            for rule in catalog() {
                println!("{}", rule.placeholder());
            }
        }
        Some(Commands::Expand(template)) => {
            let ctx = template.context()?;
            println!("{}", expand_macros(&ctx.raw_template, &ctx));
        }
        Some(Commands::Health) => {
            let datasource = connect().await?;
            let result = datasource.check_health(&CancellationToken::new()).await;
            datasource.dispose().await;
            println!("{}", result.message);
            if result.status == HealthStatus::Error {
                anyhow::bail!("warehouse is not healthy");
            }
        }
        Some(Commands::Query { template, wide }) => {
            let request = template.request(wide)?;
            let datasource = connect().await?;
            let response = datasource
                .query_data(request, &CancellationToken::new())
                .await;
            datasource.dispose().await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        None => {
            println!("Lakeglass CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_parse() {
        // Verify CLI can parse without arguments
        let cli = Cli::try_parse_from(["lakeglass"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_health_command() {
        let cli = parse(&["lakeglass", "health"]);
        assert!(matches!(cli.command, Some(Commands::Health)));
    }

    #[test]
    fn test_cli_expand_requires_range() {
        assert!(Cli::try_parse_from(["lakeglass", "expand", "SELECT 1"]).is_err());
    }

    #[test]
    fn test_expand_context() {
        let cli = parse(&[
            "lakeglass",
            "expand",
            "--from",
            "2024-01-01T00:00:00Z",
            "--to",
            "1704153600000",
            "SELECT $__timeFilter(ts)",
        ]);
        let Some(Commands::Expand(template)) = cli.command else {
            panic!("expected expand");
        };
        assert_eq!(template.interval_ms, 60_000);

        let ctx = template.context().unwrap();
        assert_eq!(
            expand_macros(&ctx.raw_template, &ctx),
            "SELECT ts BETWEEN '2024-01-01 00:00:00' AND '2024-01-02 00:00:00'"
        );
    }

    #[test]
    fn test_invalid_range_is_an_error() {
        let cli = parse(&[
            "lakeglass",
            "expand",
            "--from",
            "yesterday",
            "--to",
            "now",
            "SELECT 1",
        ]);
        let Some(Commands::Expand(template)) = cli.command else {
            panic!("expected expand");
        };
        assert!(template.context().is_err());
    }

    #[test]
    fn test_query_request() {
        let cli = parse(&[
            "lakeglass",
            "query",
            "--from",
            "1704067200000",
            "--to",
            "1704153600000",
            "--interval-ms",
            "1000",
            "--wide",
            "SELECT 1",
        ]);
        let Some(Commands::Query { template, wide }) = cli.command else {
            panic!("expected query");
        };
        let request = template.request(wide).unwrap();
        let query = &request.queries[0];
        assert_eq!(query.ref_id, "A");

        let parsed = query.parse().unwrap();
        assert_eq!(parsed.interval(), Duration::from_secs(1));
        assert_eq!(parsed.model.raw_sql_query, "SELECT 1");
        assert!(parsed.model.query_settings.convert_long_to_wide);
    }
}
