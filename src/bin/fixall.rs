//! Binary entry point for the fixall CLI.
//!
//! Runs the aggregation engine over a recorded analysis and prints the
//! result as JSON (or a short text listing).
//!
//! ## Usage
//!
//! ```bash
//! # Everything the trigger group's dialect reports, across the workspace
//! fixall aggregate --snapshot record.json --scope workspace --target A
//!
//! # One unit, giving up after two seconds
//! fixall aggregate --snapshot record.json --scope unit --target a1 --timeout-ms 2000
//!
//! # Title for the fix action
//! fixall title --snapshot record.json --scope group --target A --rule CS0168
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use fixall::adapter::Collaborators;
use fixall::aggregate::Aggregator;
use fixall::config::{CliOverrides, ResolvedConfig, TreeMode};
use fixall::error::FixAllError;
use fixall::output::{emit_response, AggregateResponse, ErrorResponse, TitleResponse};
use fixall::progress::TracingProgress;
use fixall::recorded::RecordedAnalysis;
use fixall::scope::{default_title, Scope, ScopeKind};
use fixall::types::AggregationResult;
use fixall::workspace::WorkspaceSnapshot;

// ============================================================================
// CLI Structure
// ============================================================================

/// Aggregate the diagnostics a "fix all" action must address.
///
/// All output is JSON unless `--format text` is requested.
#[derive(Parser, Debug)]
#[command(name = "fixall", version, about = "Scoped diagnostic aggregation")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output (overrides FIXALL_LOG).
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Cap on concurrent group fetches (0 = unbounded).
    #[arg(long, global = true)]
    max_parallel: Option<usize>,

    /// Materialize trees one unit at a time.
    #[arg(long, global = true)]
    sequential_trees: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Scope kind as accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    /// A single unit (target is a unit id).
    Unit,
    /// A single group (target is a group id).
    Group,
    /// Every group sharing the target group's dialect.
    Workspace,
}

impl From<ScopeArg> for ScopeKind {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Unit => ScopeKind::Unit,
            ScopeArg::Group => ScopeKind::Group,
            ScopeArg::Workspace => ScopeKind::Workspace,
        }
    }
}

/// Output format for the aggregate command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Full JSON response (default).
    #[default]
    Json,
    /// One line per diagnostic.
    Text,
}

/// Scope selection shared by the subcommands.
#[derive(clap::Args, Debug)]
struct ScopeArgs {
    /// Recorded analysis file.
    #[arg(long)]
    snapshot: PathBuf,
    /// Scope kind.
    #[arg(long, value_enum)]
    scope: ScopeArg,
    /// Unit id, group id, or triggering group id.
    #[arg(long)]
    target: String,
    /// Rule ids named in the title (repeatable).
    #[arg(long = "rule")]
    rules: Vec<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::from_kind(self.scope.into(), self.target.clone())
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate diagnostics for a scope.
    Aggregate {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Cancel the aggregation after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Print the default fix-all title for a scope.
    Title {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        max_parallel: cli.global.max_parallel,
        tree_mode: cli.global.sequential_trees.then_some(TreeMode::Sequential),
        log_level: cli.global.log_level.map(|level| level.as_str().to_string()),
    };
    let config = ResolvedConfig::resolve(&overrides);

    init_tracing(&config.log_level.value);
    tracing::debug!(?config, "resolved configuration");

    match execute(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like successful responses.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(err.error_code().code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli, config: &ResolvedConfig) -> Result<(), FixAllError> {
    match cli.command {
        Command::Aggregate {
            scope,
            timeout_ms,
            format,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| FixAllError::internal(format!("failed to start runtime: {}", e)))?;
            runtime.block_on(execute_aggregate(&scope, timeout_ms, format, config))
        }
        Command::Title { scope } => execute_title(&scope),
    }
}

// ============================================================================
// Command Executors
// ============================================================================

/// Execute aggregate command.
async fn execute_aggregate(
    args: &ScopeArgs,
    timeout_ms: Option<u64>,
    format: OutputFormat,
    config: &ResolvedConfig,
) -> Result<(), FixAllError> {
    let analysis = Arc::new(RecordedAnalysis::load(&args.snapshot)?);
    let snapshot = analysis.snapshot();
    let scope = args.scope();

    let aggregator = Aggregator::new(Arc::clone(&snapshot), Collaborators::from_shared(analysis))
        .with_options(config.options());

    let cancel = CancellationToken::new();
    let watchdog = timeout_ms.map(|millis| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            tracing::warn!(timeout_ms = millis, "timeout reached; cancelling aggregation");
            cancel.cancel();
        })
    });

    let progress = Arc::new(TracingProgress::new(format!("aggregate {}", scope)));
    let outcome = aggregator.aggregate(&scope, progress, &cancel).await;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    let result = outcome?;

    let title = title_for(&scope, &args.rules, &snapshot);
    let mut stdout = io::stdout();
    let written = match format {
        OutputFormat::Json => {
            let response = AggregateResponse::new(&scope, title, &snapshot, &result);
            emit_response(&response, &mut stdout)
        }
        OutputFormat::Text => write_text(&mut stdout, &title, &result),
    };
    written.map_err(|e| FixAllError::internal(e.to_string()))?;
    let _ = stdout.flush();

    Ok(())
}

/// Execute title command.
fn execute_title(args: &ScopeArgs) -> Result<(), FixAllError> {
    let analysis = RecordedAnalysis::load(&args.snapshot)?;
    let snapshot = analysis.snapshot();
    let scope = args.scope();

    let response = TitleResponse::new(&scope, title_for(&scope, &args.rules, &snapshot));
    emit_response(&response, &mut io::stdout()).map_err(|e| FixAllError::internal(e.to_string()))?;
    let _ = io::stdout().flush();

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Compose the title, looking up the scope's trigger in the snapshot.
fn title_for(scope: &Scope, rules: &[String], snapshot: &WorkspaceSnapshot) -> String {
    match scope {
        Scope::Unit(unit) => default_title(scope, rules, snapshot.unit(unit), None),
        Scope::Group(group) => {
            default_title(scope, rules, None, snapshot.group(group).map(|g| &**g))
        }
        Scope::Workspace { trigger } => {
            default_title(scope, rules, None, snapshot.group(trigger).map(|g| &**g))
        }
    }
}

/// Plain listing: the title, then `unit: [severity] id message` per line.
fn write_text(
    writer: &mut impl Write,
    title: &str,
    result: &AggregationResult,
) -> io::Result<()> {
    writeln!(writer, "{}", title)?;
    for unit in result.units() {
        for diagnostic in result.get(unit).unwrap_or_default() {
            writeln!(
                writer,
                "{}: [{}] {} {}",
                unit, diagnostic.severity, diagnostic.id, diagnostic.message
            )?;
        }
    }
    writeln!(
        writer,
        "{} diagnostic(s) in {} unit(s)",
        result.diagnostic_count(),
        result.len()
    )
}
