//! Devcov CLI - device coverage reports from CSV
//!
//! # Main Commands
//!
//! ```bash
//! devcov serve                                                  # Start HTTP server (port 3000)
//! devcov coverage devices.csv --row os --column supports_nfc --mode count
//! devcov analytics devices.csv --group-by form_factor
//! devcov cumulative devices.csv --cutoff 90
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! devcov parse devices.csv      # Raw rows as JSON
//! devcov validate devices.csv   # Row errors only
//! devcov schema                 # Print the active schema
//! ```
//!
//! Settings come from the environment (see `devcov::config`); flags win.

use clap::{Args, Parser, Subcommand};
use devcov::{
    format_delimiter, open, parse_file, run_analytics, run_coverage, run_cumulative, validate_rows,
    AnalyticsRequest, CellMode, ConfigError, ConsoleLog, CoverageRequest, CumulativeRequest,
    Delimiter, EngineConfig, EngineOptions, LabelOrder, LogSink, ParseOptions, Schema,
    TextEncoding,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

type CliResultOf<T> = Result<T, Box<dyn std::error::Error>>;
type CliResult = CliResultOf<()>;

#[derive(Parser)]
#[command(name = "devcov")]
#[command(about = "Coverage matrices and analytics for device inventories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that reads a CSV.
#[derive(Args)]
struct InputArgs {
    /// Input CSV file
    input: PathBuf,

    /// CSV delimiter: a single character, `tab` or `auto`
    #[arg(short, long, default_value = ",")]
    delimiter: Delimiter,

    /// Text encoding: utf-8, iso-8859-1, windows-1252 or auto
    #[arg(short, long, default_value = "utf-8")]
    encoding: TextEncoding,

    /// Schema JSON file (default: DEVCOV_SCHEMA or the built-in device schema)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Maximum share of rows allowed to fail validation (0.0..=1.0)
    #[arg(long)]
    max_skip_ratio: Option<f64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-tabulate two fields
    Coverage {
        #[command(flatten)]
        input: InputArgs,

        /// Field whose values label the matrix rows
        #[arg(long = "row")]
        row_field: String,

        /// Field whose values label the matrix columns
        #[arg(long = "column")]
        column_field: String,

        /// Cell content: count or presence
        #[arg(short, long)]
        mode: CellMode,

        /// Label order: first-seen or alphabetical
        #[arg(long, default_value = "first-seen")]
        order: LabelOrder,
    },

    /// Group by one field and summarize the others
    Analytics {
        #[command(flatten)]
        input: InputArgs,

        /// Field to group by
        #[arg(short, long)]
        group_by: String,
    },

    /// Devices covering a share of total usage, highest first
    Cumulative {
        #[command(flatten)]
        input: InputArgs,

        /// Numeric field holding each device's usage share
        #[arg(long, default_value = devcov::report::DEFAULT_USAGE_FIELD)]
        usage_field: String,

        /// Running-total cutoff
        #[arg(long, default_value_t = devcov::report::DEFAULT_CUTOFF)]
        cutoff: f64,
    },

    /// Parse a CSV file and output raw rows as JSON
    Parse {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Validate a CSV file against the schema and list skipped rows
    Validate {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Print the active schema
    Schema {
        /// Schema JSON file (default: DEVCOV_SCHEMA or the built-in device schema)
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: DEVCOV_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Schema JSON file
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match EngineConfig::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: EngineConfig) -> CliResult {
    match command {
        Commands::Coverage {
            input,
            row_field,
            column_field,
            mode,
            order,
        } => {
            let request = CoverageRequest::new(row_field, column_field, mode, order);
            cmd_report(&input, config, |bytes, schema, options, log| {
                let outcome = run_coverage(bytes, schema, &request, options, log)?;
                Ok(serde_json::to_string_pretty(&outcome.report)?)
            })
        }

        Commands::Analytics { input, group_by } => {
            let request = AnalyticsRequest::new(group_by);
            cmd_report(&input, config, |bytes, schema, options, log| {
                let outcome = run_analytics(bytes, schema, &request, options, log)?;
                Ok(serde_json::to_string_pretty(&outcome.report)?)
            })
        }

        Commands::Cumulative {
            input,
            usage_field,
            cutoff,
        } => {
            let request = CumulativeRequest { usage_field, cutoff };
            cmd_report(&input, config, |bytes, schema, options, log| {
                let outcome = run_cumulative(bytes, schema, &request, options, log)?;
                Ok(serde_json::to_string_pretty(&outcome.report)?)
            })
        }

        Commands::Parse { input } => cmd_parse(&input, &config),

        Commands::Validate { input } => cmd_validate(&input, config),

        Commands::Schema { schema } => {
            let schema = load_schema(config, schema)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }

        Commands::Serve { port, schema } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            let schema = load_schema(config.clone(), schema)?;
            devcov::server::start_server(config, schema).await
        }
    }
}

/// Read the input, run one report and write its JSON.
fn cmd_report<F>(input: &InputArgs, config: EngineConfig, run: F) -> CliResult
where
    F: FnOnce(&[u8], &Schema, &EngineOptions, &dyn LogSink) -> CliResultOf<String>,
{
    let config = apply_overrides(config, input)?;
    let schema = config.load_schema()?;
    let options = config.engine_options(parse_options(input));

    eprintln!("📄 Processing: {}", input.input.display());
    let bytes = fs::read(&input.input)?;

    let json = run(&bytes, &schema, &options, &ConsoleLog)?;
    write_output(&json, input.output.as_deref())?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_parse(input: &InputArgs, config: &EngineConfig) -> CliResult {
    eprintln!("📄 Parsing CSV: {}", input.input.display());

    let mut options = parse_options(input);
    options.limits = config.limits;
    let result = parse_file(&input.input, &options)?;

    eprintln!("   Encoding: {}", result.info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.info.delimiter));
    eprintln!("   Columns: {}", result.info.headers.join(", "));
    for err in result.shape_errors.iter().take(5) {
        eprintln!("   ⚠️  {}", err);
    }
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, input.output.as_deref())?;

    Ok(())
}

#[derive(Serialize)]
struct ValidationSummary<'a> {
    total: usize,
    valid: usize,
    skipped: usize,
    errors: &'a [devcov::ValidationError],
}

fn cmd_validate(input: &InputArgs, config: EngineConfig) -> CliResult {
    let config = apply_overrides(config, input)?;
    let schema = config.load_schema()?;
    let options = config.engine_options(parse_options(input));

    eprintln!("✔️  Validating: {}", input.input.display());
    let bytes = fs::read(&input.input)?;
    let rows = open(&bytes, &options.parse)?;
    let validated = validate_rows(&schema, rows, &options.policy)?;

    eprintln!(
        "\n📊 Results: {} valid, {} skipped",
        validated.records.len(),
        validated.errors.len()
    );

    let summary = ValidationSummary {
        total: validated.total_rows,
        valid: validated.records.len(),
        skipped: validated.errors.len(),
        errors: &validated.errors,
    };
    let json = serde_json::to_string_pretty(&summary)?;
    write_output(&json, input.output.as_deref())?;

    Ok(())
}

fn apply_overrides(mut config: EngineConfig, input: &InputArgs) -> Result<EngineConfig, ConfigError> {
    if let Some(path) = &input.schema {
        config = config.with_schema_path(path);
    }
    if let Some(ratio) = input.max_skip_ratio {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidSetting {
                key: "--max-skip-ratio",
                message: format!("{} is outside 0.0..=1.0", ratio),
            });
        }
        config = config.with_max_skip_ratio(ratio);
    }
    Ok(config)
}

fn load_schema(config: EngineConfig, path: Option<PathBuf>) -> Result<Schema, ConfigError> {
    match path {
        Some(p) => config.with_schema_path(p).load_schema(),
        None => config.load_schema(),
    }
}

fn parse_options(input: &InputArgs) -> ParseOptions {
    ParseOptions {
        delimiter: input.delimiter,
        encoding: input.encoding,
        ..Default::default()
    }
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
