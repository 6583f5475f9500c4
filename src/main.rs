//! CLI entry point for the ridership panel pipeline.
//!
//! Provides subcommands for cleaning raw trip exports, fetching hourly
//! weather per region, assembling the hourly and daily panels, and running
//! all three in sequence.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ridership_panel::config::{StudyConfig, StudyWindow};
use ridership_panel::fetch::BasicClient;
use ridership_panel::output::{print_json, print_pretty, write_records};
use ridership_panel::panel::{PanelAssembler, daily_panel};
use ridership_panel::regions::RegionResolver;
use ridership_panel::trips::{
    Trip, TripCleaner, expand_inputs, extract_focus, read_cleaned, top_station_pairs,
    write_cleaned,
};
use ridership_panel::weather::store::{load_weather_table, save_weather_table};
use ridership_panel::weather::{OpenMeteoArchive, WeatherFetcher, WeatherTable};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ridership_panel")]
#[command(about = "Build hourly bikeshare ridership panels joined with weather", long_about = None)]
struct Cli {
    /// Study configuration file
    #[arg(short, long, global = true, env = "RIDERSHIP_PANEL_CONFIG", default_value = "study.toml")]
    config: PathBuf,

    /// Window tag to process (defaults to the first configured window)
    #[arg(short, long, global = true)]
    window: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean raw trip exports into the cleaned trip table
    Clean,
    /// Fetch hourly weather for every region and save one table per region
    FetchWeather {
        /// Keep going when a region's weather is unavailable
        #[arg(long, default_value_t = false)]
        allow_partial_weather: bool,
    },
    /// Assemble panels from the cleaned trip table and saved weather
    Assemble {
        /// Assemble even when a region's weather is incomplete, flagging its rows
        #[arg(long, default_value_t = false)]
        allow_partial_weather: bool,
    },
    /// Clean, fetch weather and assemble in one pass
    Run {
        /// Tolerate unavailable weather, flagging the affected rows
        #[arg(long, default_value_t = false)]
        allow_partial_weather: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/ridership_panel.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ridership_panel.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = StudyConfig::load(&cli.config)?;
    let window = config.window(cli.window.as_deref())?;
    info!(config = %cli.config.display(), window = %window, "Configuration loaded");

    match cli.command {
        Commands::Clean => {
            clean(&config, window).await?;
        }
        Commands::FetchWeather {
            allow_partial_weather,
        } => {
            fetch_weather(&config, window, allow_partial_weather).await?;
        }
        Commands::Assemble {
            allow_partial_weather,
        } => {
            let resolver = RegionResolver::from_config(&config)?;
            let trips = read_cleaned(&config.paths.cleaned_trips_for(&window.tag))?;
            let weather = load_weather_table(&config, window, allow_partial_weather)?;
            assemble(&config, window, &resolver, &trips, &weather, allow_partial_weather)?;
        }
        Commands::Run {
            allow_partial_weather,
        } => {
            let resolver = RegionResolver::from_config(&config)?;
            let trips = clean(&config, window).await?;
            let weather = fetch_weather(&config, window, allow_partial_weather).await?;
            assemble(&config, window, &resolver, &trips, &weather, allow_partial_weather)?;
        }
    }

    Ok(())
}

/// Reads and cleans every raw trip file, writing the cleaned table and, when
/// focus stations are configured, the focus extract.
#[tracing::instrument(skip_all, fields(window = %window.tag))]
async fn clean(config: &StudyConfig, window: &StudyWindow) -> Result<Vec<Trip>> {
    let files = expand_inputs(&config.paths.raw_trips)?;
    let (trips, report) = TripCleaner::new(&config.cleaning, window)
        .clean_files(&files)
        .await?;
    write_cleaned(&config.paths.cleaned_trips_for(&window.tag), &trips)?;

    if let Some(path) = config.paths.focus_trips_for(&window.tag) {
        let focus = extract_focus(&trips, &config.cleaning.focus_stations);
        let n = write_records(&path, &focus)?;
        info!(path = %path.display(), rows = n, "Wrote focus trips");

        let top = top_station_pairs(
            focus
                .iter()
                .map(|t| (t.start_station.as_str(), t.end_station.as_str())),
            10,
        );
        for (rank, pair) in top.iter().enumerate() {
            info!(
                rank = rank + 1,
                start_station = %pair.start_station,
                end_station = %pair.end_station,
                count = pair.count,
                "Top focus station pair"
            );
        }
    }

    print_pretty(&report);
    print_json(&report)?;
    Ok(trips)
}

/// Fetches weather for every region and saves the per-region tables.
#[tracing::instrument(skip_all, fields(window = %window.tag, allow_partial = allow_partial))]
async fn fetch_weather(
    config: &StudyConfig,
    window: &StudyWindow,
    allow_partial: bool,
) -> Result<WeatherTable> {
    let client = BasicClient::with_timeout(Duration::from_secs(config.weather.timeout_secs))?;
    let archive = OpenMeteoArchive::new(client, config.weather.base_url.clone());
    let fetcher = WeatherFetcher::new(archive, config.weather.clone());

    let table = fetcher.fetch_all(config, window, allow_partial).await?;
    let written = save_weather_table(config, window, &table)?;

    info!(files = written.len(), "Weather tables saved");
    Ok(table)
}

/// Builds the hourly panel (and the daily roll-up when configured).
#[tracing::instrument(skip_all, fields(window = %window.tag, trips = trips.len(), allow_partial = allow_partial))]
fn assemble(
    config: &StudyConfig,
    window: &StudyWindow,
    resolver: &RegionResolver,
    trips: &[Trip],
    weather: &WeatherTable,
    allow_partial: bool,
) -> Result<()> {
    let (rows, report) =
        PanelAssembler::new(config, window, resolver).assemble(trips, weather, allow_partial)?;

    let hourly_path = config.paths.hourly_panel_for(&window.tag);
    write_records(&hourly_path, &rows)?;
    info!(path = %hourly_path.display(), rows = rows.len(), "Wrote hourly panel");

    if let Some(daily_path) = config.paths.daily_panel_for(&window.tag) {
        let daily = daily_panel(&rows);
        write_records(&daily_path, &daily)?;
        info!(path = %daily_path.display(), rows = daily.len(), "Wrote daily panel");
    }

    print_pretty(&report);
    print_json(&report)?;
    Ok(())
}
