use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Report};
use tracing_subscriber::EnvFilter;

use aeronav_tiles::app::{
    Action, App, ConvertReport, DownloadReport, ProgressSink, RunOptions, StatusReport,
};
use aeronav_tiles::cache_control::{self, CacheControlStatus, HttpObjectStore};
use aeronav_tiles::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use aeronav_tiles::convert::GdalTools;
use aeronav_tiles::domain::{ChartType, ZoomRange};
use aeronav_tiles::error::ChartError;
use aeronav_tiles::faa::{FaaHttpClient, RetryPolicy};
use aeronav_tiles::output::{ConsoleProgress, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "aeronav-tiles")]
#[command(about = "Download FAA aeronautical charts and turn them into map tiles")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, global = true)]
    zoom: Option<ZoomRange>,

    #[arg(long, global = true)]
    download_dir: Option<Utf8PathBuf>,

    #[arg(long = "metadata", global = true)]
    metadata_path: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and unpack every new chart")]
    Download(DownloadArgs),
    #[command(about = "Download a single chart by code (e.g. sectional SEA, ifr_low ELUS1)")]
    Fetch(FetchArgs),
    #[command(about = "Tile every unconverted GeoTIFF in the download directory")]
    Convert(RunArgs),
    #[command(about = "Verify the Cache-Control header of a published tile")]
    CheckCacheControl(CacheControlArgs),
    #[command(about = "Summarise the processing log")]
    Status,
    #[command(about = "Restore the processing log from its backup")]
    RestoreMetadata,
}

#[derive(Args, Clone, Copy)]
struct RunArgs {
    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        RunOptions {
            force: args.force,
            dry_run: args.dry_run,
        }
    }
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long = "chart-type", value_enum)]
    chart_types: Vec<ChartType>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(value_enum)]
    chart_type: ChartType,

    code: String,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct CacheControlArgs {
    bucket: String,
    prefix: String,
    tile_dir: PathBuf,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(report_exit_code(&report))
        }
    }
}

fn report_exit_code(report: &Report) -> u8 {
    report
        .downcast_ref::<ChartError>()
        .map(map_exit_code)
        .unwrap_or(1)
}

fn map_exit_code(error: &ChartError) -> u8 {
    match error {
        ChartError::ChartNotFound(_) | ChartError::MissingBackup(_) => 2,
        ChartError::Http(_)
        | ChartError::HttpStatus { .. }
        | ChartError::ObjectStoreHttp(_)
        | ChartError::ObjectStoreStatus { .. }
        | ChartError::MissingTool(_)
        | ChartError::Conversion(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref()).map_err(Report::new)?;
    let config = ConfigLoader::apply_overrides(
        config,
        ConfigOverrides {
            workers: cli.workers,
            zoom: cli.zoom,
            download_dir: cli.download_dir,
            metadata_path: cli.metadata_path,
        },
    )
    .map_err(Report::new)?;

    match cli.command {
        Commands::Download(args) => {
            let app = build_app(config)?;
            let chart_types = if args.chart_types.is_empty() {
                ChartType::ALL.to_vec()
            } else {
                args.chart_types
            };
            let report = with_sink(output_mode, |sink| {
                app.download(&chart_types, args.run.into(), sink)
            })
            .map_err(Report::new)?;
            emit_download(&report, output_mode)?;
            Ok(batch_exit_code(report.count(Action::Failed)))
        }
        Commands::Fetch(args) => {
            let app = build_app(config)?;
            let report = with_sink(output_mode, |sink| {
                app.fetch_one(args.chart_type, &args.code, args.run.into(), sink)
            })
            .map_err(Report::new)?;
            emit_download(&report, output_mode)?;
            Ok(batch_exit_code(report.count(Action::Failed)))
        }
        Commands::Convert(args) => {
            let app = build_app(config)?;
            let report = with_sink(output_mode, |sink| app.convert(args.into(), sink))
                .map_err(Report::new)?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_convert(&report).into_diagnostic()?
                }
                OutputMode::Interactive => print_convert_summary(&report),
            }
            Ok(batch_exit_code(report.count(Action::Failed)))
        }
        Commands::CheckCacheControl(args) => {
            let store = HttpObjectStore::new(&config.object_endpoint).map_err(Report::new)?;
            let report = cache_control::check_cache_control(
                &store,
                &args.bucket,
                &args.prefix,
                &args.tile_dir,
                &config.expected_cache_control,
            )
            .map_err(Report::new)?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_cache_control(&report).into_diagnostic()?
                }
                OutputMode::Interactive => {
                    println!("S3 object: s3://{}/{}", report.bucket, report.key);
                    match &report.status {
                        CacheControlStatus::Correct => {
                            println!("Cache-Control header is correct.")
                        }
                        CacheControlStatus::Incorrect(value) => println!(
                            "Cache-Control header is incorrect: {}",
                            value.as_deref().unwrap_or("<none>")
                        ),
                        CacheControlStatus::Missing => {
                            println!("Object not found. Skipping cache-control check.")
                        }
                    }
                }
            }
            Ok(ExitCode::from(report.status.exit_code()))
        }
        Commands::Status => {
            let app = build_app(config)?;
            emit_status(&app.status(), output_mode)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::RestoreMetadata => {
            let app = build_app(config)?;
            let status = app.restore_metadata().map_err(Report::new)?;
            emit_status(&status, output_mode)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_app(config: ResolvedConfig) -> miette::Result<App<FaaHttpClient, GdalTools>> {
    let retry = RetryPolicy {
        retries: config.retries,
        base_delay: Duration::from_millis(config.retry_delay_ms),
    };
    let source = FaaHttpClient::new(retry, Duration::from_secs(config.timeout_secs))
        .map_err(Report::new)?;
    let tools = GdalTools::new(&config.tools);
    Ok(App::new(config, source, tools))
}

fn with_sink<F, R>(output_mode: OutputMode, f: F) -> R
where
    F: FnOnce(&dyn ProgressSink) -> R,
{
    match output_mode {
        OutputMode::Interactive => f(&ConsoleProgress::new()),
        OutputMode::NonInteractive => f(&JsonOutput),
    }
}

fn batch_exit_code(failed: usize) -> ExitCode {
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn emit_download(report: &DownloadReport, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_download(report).into_diagnostic(),
        OutputMode::Interactive => {
            print_download_summary(report);
            Ok(())
        }
    }
}

fn emit_status(report: &StatusReport, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_status(report).into_diagnostic(),
        OutputMode::Interactive => {
            println!("metadata: {}", report.metadata_path);
            println!("backup:   {}", if report.backup_exists { "yes" } else { "no" });
            println!("vfr:      {}", report.charts.vfr);
            println!("ifr_low:  {}", report.charts.ifr_low);
            println!("ifr_high: {}", report.charts.ifr_high);
            println!("tiles:    {}", report.charts.tiles);
            let tools = &report.tools;
            for (name, version) in [
                ("gdalinfo", &tools.gdalinfo),
                ("gdal_translate", &tools.gdal_translate),
                ("gdal2tiles", &tools.gdal2tiles),
            ] {
                println!(
                    "{name:<15} {}",
                    version.as_deref().unwrap_or("not found")
                );
            }
            Ok(())
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn print_download_summary(report: &DownloadReport) {
    println!("{CYAN}chart download summary{RESET}");
    println!(
        "{GREEN}downloaded: {}{RESET}  {YELLOW}skipped: {}{RESET}  {RED}failed: {}{RESET}",
        report.count(Action::Downloaded),
        report.count(Action::Skipped),
        report.count(Action::Failed)
    );
    for item in &report.items {
        let color = action_color(item.action);
        let date = item
            .published_date
            .as_deref()
            .map(|date| format!(" [{date}]"))
            .unwrap_or_default();
        println!(
            "{color}  {:?} {} {}{date}{RESET}",
            item.action, item.chart_type, item.identity
        );
        if let Some(error) = &item.error {
            println!("{RED}    {error}{RESET}");
        }
    }
}

fn print_convert_summary(report: &ConvertReport) {
    println!("{CYAN}tile conversion summary (zoom {}){RESET}", report.zoom);
    println!(
        "{GREEN}converted: {}{RESET}  {YELLOW}skipped: {}{RESET}  {RED}failed: {}{RESET}",
        report.count(Action::Converted),
        report.count(Action::Skipped),
        report.count(Action::Failed)
    );
    for item in &report.items {
        let color = action_color(item.action);
        println!("{color}  {:?} {}{RESET}", item.action, item.source);
        if let Some(dir) = &item.tiles_dir {
            println!("{color}    tiles: {dir}{RESET}");
        }
        if let Some(error) = &item.error {
            println!("{RED}    {error}{RESET}");
        }
    }
}

fn action_color(action: Action) -> &'static str {
    match action {
        Action::Downloaded | Action::Converted => GREEN,
        Action::Skipped | Action::Planned => YELLOW,
        Action::Failed => RED,
    }
}
