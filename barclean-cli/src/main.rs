//! Barclean CLI — clean candle files and report their data quality.
//!
//! Commands:
//! - `clean` — run the pipeline over one Parquet or CSV file
//! - `profiles` — list configured instruments
//! - `batch` — clean many instruments from a Parquet root in parallel

use anyhow::{bail, Context, Result};
use barclean_core::data::{
    read_csv, read_parquet, series_from_frame, write_parquet, FetchRequest, FlaggedDates,
    ParquetSource, RowSource,
};
use barclean_core::time::{localize_naive, DstPolicy};
use barclean_core::{
    CandleSeries, CleanOptions, CleanOutput, CleanRequest, Pipeline, PipelineConfig,
    ProfileRegistry, TimeBasis, Timeframe,
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barclean", about = "Barclean CLI — candle data quality pipeline")]
struct Cli {
    /// Log filter (e.g. info, debug, barclean_core=trace). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean one Parquet or CSV file.
    Clean {
        /// Input file (.parquet or .csv).
        #[arg(long)]
        input: PathBuf,

        /// Instrument id (e.g. deuidxeur, eurusd).
        #[arg(long)]
        instrument: String,

        /// Candle timeframe: m1, m5, m15, h1, d1.
        #[arg(long)]
        timeframe: Timeframe,

        /// Instrument profiles TOML. Defaults to the built-in registry.
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Pipeline config TOML. Defaults to built-in thresholds.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Flagged-date calendar CSV (`date[,instrument]`).
        #[arg(long)]
        flagged_dates: Option<PathBuf>,

        /// Present the clean series in the instrument's local timezone.
        #[arg(long, default_value_t = false)]
        local: bool,

        /// Drop candles on flagged dates.
        #[arg(long, default_value_t = false)]
        exclude_flagged: bool,

        /// Read naive input timestamps as wall-clock readings in this IANA zone.
        #[arg(long)]
        input_timezone: Option<Tz>,

        /// How to resolve DST edge cases with --input-timezone.
        #[arg(long, value_enum, default_value_t = DstArg::Strict)]
        dst_policy: DstArg,

        /// Write the clean series to this Parquet file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the quality report as JSON to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List configured instruments.
    Profiles {
        /// Instrument profiles TOML. Defaults to the built-in registry.
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
    /// Clean many instruments from `{root}/{instrument}_{timeframe}.parquet`.
    Batch {
        /// Root directory of raw Parquet files.
        #[arg(long)]
        root: PathBuf,

        /// Candle timeframe: m1, m5, m15, h1, d1.
        #[arg(long)]
        timeframe: Timeframe,

        /// Instruments to clean. Defaults to every configured instrument.
        instruments: Vec<String>,

        /// Start date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        end: Option<String>,

        /// Instrument profiles TOML. Defaults to the built-in registry.
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Pipeline config TOML. Defaults to built-in thresholds.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Present clean series in each instrument's local timezone.
        #[arg(long, default_value_t = false)]
        local: bool,

        /// Directory for clean Parquet files and JSON reports.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DstArg {
    Strict,
    PreferEarliest,
    PreferLatest,
    ShiftForward,
}

impl From<DstArg> for DstPolicy {
    fn from(arg: DstArg) -> Self {
        match arg {
            DstArg::Strict => DstPolicy::Strict,
            DstArg::PreferEarliest => DstPolicy::PreferEarliest,
            DstArg::PreferLatest => DstPolicy::PreferLatest,
            DstArg::ShiftForward => DstPolicy::ShiftForward,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Clean {
            input,
            instrument,
            timeframe,
            profiles,
            config,
            flagged_dates,
            local,
            exclude_flagged,
            input_timezone,
            dst_policy,
            output,
            report,
        } => run_clean(CleanArgs {
            input,
            instrument,
            timeframe,
            profiles,
            config,
            flagged_dates,
            options: CleanOptions {
                convert_to_local: local,
                exclude_flagged_dates: exclude_flagged,
            },
            input_timezone,
            dst_policy: dst_policy.into(),
            output,
            report,
        }),
        Commands::Profiles { profiles } => run_profiles(profiles.as_deref()),
        Commands::Batch {
            root,
            timeframe,
            instruments,
            start,
            end,
            profiles,
            config,
            local,
            output_dir,
        } => run_batch(BatchArgs {
            root,
            timeframe,
            instruments,
            start,
            end,
            profiles,
            config,
            local,
            output_dir,
        }),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_registry(path: Option<&Path>) -> Result<ProfileRegistry> {
    let registry = match path {
        Some(path) => ProfileRegistry::load(path)?,
        None => ProfileRegistry::builtin()?,
    };
    Ok(registry)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    Ok(config)
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("dates must be YYYY-MM-DD")
}

// ── clean ────────────────────────────────────────────────────────────

struct CleanArgs {
    input: PathBuf,
    instrument: String,
    timeframe: Timeframe,
    profiles: Option<PathBuf>,
    config: Option<PathBuf>,
    flagged_dates: Option<PathBuf>,
    options: CleanOptions,
    input_timezone: Option<Tz>,
    dst_policy: DstPolicy,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
}

fn run_clean(args: CleanArgs) -> Result<()> {
    let registry = load_registry(args.profiles.as_deref())?;
    let config = load_config(args.config.as_deref())?;
    let flagged = args
        .flagged_dates
        .as_deref()
        .map(FlaggedDates::load)
        .transpose()?;

    let mut raw = read_input(&args.input)?;
    if let Some(tz) = args.input_timezone {
        if raw.basis() != TimeBasis::Naive {
            bail!("--input-timezone applies only to naive timestamps");
        }
        raw = localize_naive(raw, tz, args.dst_policy)?;
        tracing::info!(zone = tz.name(), policy = ?args.dst_policy, "localized wall-clock input");
    }

    let mut pipeline = Pipeline::new(&registry, config);
    if let Some(flagged) = flagged.as_ref() {
        pipeline = pipeline.with_flagged_dates(flagged);
    }

    let out = pipeline.clean(raw, &args.instrument, args.timeframe, &args.options)?;
    println!("{}", out.report);

    write_outputs(&out, args.output.as_deref(), args.report.as_deref())
}

fn read_input(path: &Path) -> Result<CandleSeries> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let df = match ext.as_deref() {
        Some("parquet") => read_parquet(path)?,
        Some("csv") => read_csv(path)?,
        _ => bail!("unsupported input '{}': expected .parquet or .csv", path.display()),
    };
    Ok(series_from_frame(&df)?)
}

fn write_outputs(out: &CleanOutput, series: Option<&Path>, report: Option<&Path>) -> Result<()> {
    if let Some(path) = series {
        write_parquet(&out.series, path)?;
        println!("Clean series saved to: {}", path.display());
    }
    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&out.report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

// ── profiles ─────────────────────────────────────────────────────────

fn run_profiles(path: Option<&Path>) -> Result<()> {
    let registry = load_registry(path)?;
    println!(
        "{:<14} {:<36} {:<20} {:<14} {:>8}",
        "ID", "NAME", "TIMEZONE", "SESSION", "HOLIDAYS"
    );
    for profile in registry.profiles() {
        let (open, close) = profile.session_bounds();
        println!(
            "{:<14} {:<36} {:<20} {:<14} {:>8}",
            profile.id,
            profile.name,
            profile.timezone.name(),
            format!("{}-{}", open.format("%H:%M"), close.format("%H:%M")),
            profile.holidays.len()
        );
    }
    println!("{} instruments", registry.len());
    Ok(())
}

// ── batch ────────────────────────────────────────────────────────────

struct BatchArgs {
    root: PathBuf,
    timeframe: Timeframe,
    instruments: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    profiles: Option<PathBuf>,
    config: Option<PathBuf>,
    local: bool,
    output_dir: Option<PathBuf>,
}

fn run_batch(args: BatchArgs) -> Result<()> {
    let registry = load_registry(args.profiles.as_deref())?;
    let config = load_config(args.config.as_deref())?;
    let start = parse_date(args.start.as_deref())?;
    let end = parse_date(args.end.as_deref())?;

    let instruments: Vec<String> = if args.instruments.is_empty() {
        registry.ids().map(str::to_string).collect()
    } else {
        args.instruments
    };

    let source = ParquetSource::new(&args.root);
    let options = CleanOptions {
        convert_to_local: args.local,
        exclude_flagged_dates: false,
    };

    let mut failures = Vec::new();
    let mut requests = Vec::new();
    for id in &instruments {
        let mut request = FetchRequest::new(id.as_str(), args.timeframe);
        request.start = start;
        request.end = end;
        match source.fetch(&request) {
            Ok(raw) => requests.push(CleanRequest {
                raw,
                instrument: id.clone(),
                timeframe: args.timeframe,
                options,
            }),
            Err(e) => failures.push((id.clone(), e.to_string())),
        }
    }

    let pipeline = Pipeline::new(&registry, config);
    let ids: Vec<String> = requests.iter().map(|r| r.instrument.clone()).collect();
    let results = pipeline.clean_batch(requests);

    for (id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(out) => {
                println!(
                    "{:<14} {:>8} -> {:>8}  quality {:>6.2}%{}",
                    id,
                    out.report.raw_count,
                    out.report.clean_count,
                    out.report.quality_score,
                    if out.report.is_degraded() { "  (degraded)" } else { "" }
                );
                if let Some(dir) = args.output_dir.as_deref() {
                    let stem = format!("{}_{}", id.to_ascii_lowercase(), args.timeframe);
                    let series_path = dir.join(format!("{stem}.parquet"));
                    let report_path = dir.join(format!("{stem}.report.json"));
                    write_outputs(&out, Some(series_path.as_path()), Some(report_path.as_path()))?;
                }
            }
            Err(e) => failures.push((id, e.to_string())),
        }
    }

    if !failures.is_empty() {
        for (id, err) in &failures {
            eprintln!("Error for {id}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
