//! allout CLI - Command-line interface for the all-out test analysis
//!
//! Commands:
//! - analyze: Compute metrics for a recording, optionally writing a chart and PDF report
//! - columns: List the columns of an input file and the detected mapping
//! - config: Print an engine configuration as JSON

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use allout_smo2::chart;
use allout_smo2::report::{self, pdf};
use allout_smo2::{
    Analysis, AnalysisError, AnalysisSession, AthleteInfo, ColumnMapping, ColumnSelection,
    EngineConfig, HalfTimeReference, PhaseBoundaries, Preset, RecoveryBaseline,
    TimeWindow, PRODUCER_NAME, VERSION,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// allout - SmO2 and power analysis of 30-second all-out tests
#[derive(Parser)]
#[command(name = "allout")]
#[command(version = VERSION)]
#[command(about = "Analyze all-out tests with muscle oxygenation", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the test metrics for a recording
    Analyze {
        /// Input file (CSV, or a spreadsheet such as .xlsx)
        input: PathBuf,

        #[command(flatten)]
        table: TableArgs,

        #[command(flatten)]
        columns: ColumnArgs,

        /// End of phase T1 (s)
        #[arg(long, default_value = "3")]
        t1: f64,

        /// End of phase T2 (s)
        #[arg(long, default_value = "10")]
        t2: f64,

        /// End of phase T3 (s)
        #[arg(long, default_value = "30")]
        t3: f64,

        /// Load engine configuration from a JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Start from a named configuration
        #[arg(long, value_enum, conflicts_with = "config")]
        preset: Option<PresetArg>,

        /// Window over which Pmin is taken, as "start,end"
        #[arg(long)]
        pmin_window: Option<String>,

        /// Baseline for the reoxygenation level
        #[arg(long, value_enum)]
        baseline: Option<BaselineArg>,

        /// Boundary the reoxygenation half-time is measured from
        #[arg(long, value_enum)]
        half_time_from: Option<HalfTimeArg>,

        /// Output format
        #[arg(long, value_enum, default_value = "auto")]
        format: OutputFormat,

        /// Write the chart as SVG
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Write the report as PDF
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Athlete information file ("key: value" per line)
        #[arg(long)]
        athlete: Option<PathBuf>,

        /// JPEG logo drawn on the PDF report
        #[arg(long, requires = "pdf")]
        logo: Option<PathBuf>,
    },

    /// List the columns of an input file and the detected mapping
    Columns {
        /// Input file (CSV, or a spreadsheet such as .xlsx)
        input: PathBuf,

        #[command(flatten)]
        table: TableArgs,

        /// Number of data rows to preview
        #[arg(long, default_value = "5")]
        rows: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print an engine configuration as JSON
    Config {
        /// Named configuration to print
        #[arg(long, value_enum, default_value = "standard")]
        preset: PresetArg,
    },
}

#[derive(clap::Args)]
struct TableArgs {
    /// Field delimiter (",", ";" or "tab"); sniffed from the header when omitted
    #[arg(short, long, value_parser = parse_delimiter)]
    delimiter: Option<u8>,
}

#[derive(clap::Args)]
struct ColumnArgs {
    /// Time column (s)
    #[arg(long)]
    time_col: Option<String>,

    /// Primary SmO2 column (%)
    #[arg(long)]
    smo2_col: Option<String>,

    /// Secondary SmO2 column (%)
    #[arg(long)]
    smo2_2_col: Option<String>,

    /// Power column (W)
    #[arg(long)]
    power_col: Option<String>,
}

impl From<ColumnArgs> for ColumnSelection {
    fn from(args: ColumnArgs) -> Self {
        ColumnSelection {
            time: args.time_col,
            smo2_primary: args.smo2_col,
            smo2_secondary: args.smo2_2_col,
            power: args.power_col,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    /// Pmin over [0, 30], half-time from t3
    Standard,
    /// Pmin over [5, 30], half-time from the test end
    LatePmin,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Standard => Preset::Standard,
            PresetArg::LatePmin => Preset::LatePmin,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BaselineArg {
    /// Level halfway between the SmO2 minimum and the post-test maximum
    TestMinimum,
    /// Level halfway between the SmO2 at test start and the minimum
    TestStart,
}

impl From<BaselineArg> for RecoveryBaseline {
    fn from(arg: BaselineArg) -> Self {
        match arg {
            BaselineArg::TestMinimum => RecoveryBaseline::TestMinimum,
            BaselineArg::TestStart => RecoveryBaseline::TestStart,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum HalfTimeArg {
    /// Measure from t3
    T3,
    /// Measure from the end of the effort
    TestEnd,
}

impl From<HalfTimeArg> for HalfTimeReference {
    fn from(arg: HalfTimeArg) -> Self {
        match arg {
            HalfTimeArg::T3 => HalfTimeReference::PhaseBoundary,
            HalfTimeArg::TestEnd => HalfTimeReference::TestEnd,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Table on a terminal, JSON otherwise
    Auto,
    /// Human-readable report
    Table,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AlloutCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            table,
            columns,
            t1,
            t2,
            t3,
            config,
            preset,
            pmin_window,
            baseline,
            half_time_from,
            format,
            chart,
            pdf,
            athlete,
            logo,
        } => {
            let mut engine_config = match (config, preset) {
                (Some(path), _) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
                (None, Some(preset)) => EngineConfig::from_preset(preset.into()),
                (None, None) => EngineConfig::default(),
            };
            if let Some(window) = pmin_window {
                engine_config.pmin_window = TimeWindow::parse(&window)?;
            }
            if let Some(baseline) = baseline {
                engine_config.recovery_baseline = baseline.into();
            }
            if let Some(reference) = half_time_from {
                engine_config.half_time_reference = reference.into();
            }

            let mut session = AnalysisSession::from_path(&input, table.delimiter)?;
            session.set_selection(columns.into());
            session.set_boundaries(PhaseBoundaries::new(t1, t2, t3)?);
            session.set_config(engine_config);

            cmd_analyze(
                &session,
                format,
                chart.as_deref(),
                pdf.as_deref(),
                athlete.as_deref(),
                logo.as_deref(),
            )
        }

        Commands::Columns {
            input,
            table,
            rows,
            json,
        } => cmd_columns(&input, table.delimiter, rows, json),

        Commands::Config { preset } => {
            println!("{}", EngineConfig::from_preset(preset.into()).to_json()?);
            Ok(())
        }
    }
}

fn cmd_analyze(
    session: &AnalysisSession,
    format: OutputFormat,
    chart_path: Option<&Path>,
    pdf_path: Option<&Path>,
    athlete_path: Option<&Path>,
    logo_path: Option<&Path>,
) -> Result<(), AlloutCliError> {
    let analysis = session.recompute()?;

    let athlete = athlete_path.map(AthleteInfo::from_path).transpose()?;

    if let Some(path) = chart_path {
        chart::render_svg(&analysis, path)?;
        info!(path = %path.display(), "chart saved");
    }
    if let Some(path) = pdf_path {
        pdf::write_pdf(&analysis, athlete.as_ref(), logo_path, path)?;
        info!(path = %path.display(), "report saved");
    }

    let format = match format {
        OutputFormat::Auto if atty::is(atty::Stream::Stdout) => OutputFormat::Table,
        OutputFormat::Auto => OutputFormat::Json,
        other => other,
    };

    match format {
        OutputFormat::Table | OutputFormat::Auto => {
            print!("{}", report::render_text(&analysis, athlete.as_ref()));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&JsonOutput::new(&analysis))?),
        OutputFormat::JsonPretty => {
            println!("{}", serde_json::to_string_pretty(&JsonOutput::new(&analysis))?)
        }
    }

    Ok(())
}

fn cmd_columns(
    input: &Path,
    delimiter: Option<u8>,
    rows: usize,
    json: bool,
) -> Result<(), AlloutCliError> {
    let session = AnalysisSession::from_path(input, delimiter)?;
    let table = session.table();
    let detected = session.mapping();

    if json {
        let report = ColumnsReport {
            columns: table.headers(),
            rows: table.row_count(),
            preview: table.head(rows),
            detected: detected.as_ref().ok(),
            detection_error: detected.as_ref().err().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Columns ({} rows):", table.row_count());
    for (i, name) in table.headers().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, name);
    }
    println!();
    println!("First rows:");
    print!("{}", report::render_preview(table, rows));
    println!();
    match detected {
        Ok(mapping) => {
            println!("Detected mapping:");
            println!("  time:  {}", mapping.time);
            println!("  smo2:  {}", mapping.smo2_primary);
            println!(
                "  smo2-2: {}",
                mapping.smo2_secondary.as_deref().unwrap_or("-")
            );
            println!("  power: {}", mapping.power);
        }
        Err(e) => println!("Detection failed: {}", e),
    }

    Ok(())
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("expected a single ASCII character or 'tab', got '{}'", s)),
    }
}

#[derive(serde::Serialize)]
struct JsonOutput<'a> {
    producer: &'static str,
    version: &'static str,
    #[serde(flatten)]
    analysis: &'a Analysis,
}

impl<'a> JsonOutput<'a> {
    fn new(analysis: &'a Analysis) -> Self {
        Self {
            producer: PRODUCER_NAME,
            version: VERSION,
            analysis,
        }
    }
}

#[derive(serde::Serialize)]
struct ColumnsReport<'a> {
    columns: &'a [String],
    rows: usize,
    preview: &'a [Vec<String>],
    detected: Option<&'a ColumnMapping>,
    detection_error: Option<String>,
}

// Error handling

#[derive(Debug)]
enum AlloutCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
}

impl From<io::Error> for AlloutCliError {
    fn from(e: io::Error) -> Self {
        AlloutCliError::Io(e)
    }
}

impl From<AnalysisError> for AlloutCliError {
    fn from(e: AnalysisError) -> Self {
        AlloutCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for AlloutCliError {
    fn from(e: serde_json::Error) -> Self {
        AlloutCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: Option<&str>) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: hint.map(str::to_string),
        }
    }
}

impl From<AlloutCliError> for CliError {
    fn from(e: AlloutCliError) -> Self {
        match e {
            AlloutCliError::Io(e) => CliError::new(
                "IO_ERROR",
                e.to_string(),
                Some("Check file paths and permissions"),
            ),
            AlloutCliError::Json(e) => {
                CliError::new("JSON_ERROR", e.to_string(), Some("Check JSON syntax"))
            }
            AlloutCliError::Analysis(e) => {
                let message = e.to_string();
                match e {
                    AnalysisError::Io(_) => CliError::new(
                        "IO_ERROR",
                        message,
                        Some("Check file paths and permissions"),
                    ),
                    AnalysisError::Csv(_)
                    | AnalysisError::Spreadsheet(_)
                    | AnalysisError::NoWorksheet
                    | AnalysisError::EmptyTable => CliError::new(
                        "PARSE_ERROR",
                        message,
                        Some("Input must be a delimited text file or a spreadsheet with a header row"),
                    ),
                    AnalysisError::Json(_) | AnalysisError::InvalidConfig(_) => CliError::new(
                        "CONFIG_ERROR",
                        message,
                        Some("Run 'allout config' for a valid configuration"),
                    ),
                    AnalysisError::MissingColumns { .. } | AnalysisError::UnknownColumn { .. } => {
                        CliError::new(
                            "MISSING_COLUMNS",
                            message,
                            Some("Select columns with --time-col, --smo2-col and --power-col"),
                        )
                    }
                    AnalysisError::EmptyDataset { .. } => CliError::new(
                        "EMPTY_DATASET",
                        message,
                        Some("Check that the selected columns hold numeric values"),
                    ),
                    AnalysisError::InvalidBoundaries(_) => CliError::new(
                        "INVALID_BOUNDARIES",
                        message,
                        Some("Boundaries must satisfy 0 <= t1 < t2 < t3 <= last sample time"),
                    ),
                    AnalysisError::Chart(_) => CliError::new("CHART_ERROR", message, None),
                    AnalysisError::Report(_) => CliError::new("REPORT_ERROR", message, None),
                }
            }
        }
    }
}
