use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use configuration::{Config, ExcitementPolicy, TrendFitKind, load_config};
use core_types::Series;
use indicatif::{ProgressBar, ProgressStyle};
use report::{LeverageReport, PaceReport, read_report, write_report};
use season_runner::{RunMode, SeasonRunner};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod ingest;

/// The main entry point for the Maranello race analytics tool.
fn main() -> Result<()> {
    // MARANELLO__* overrides may live in a .env file; it is optional.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Pace(args) => handle_pace(args, config),
        Commands::Leverage(args) => handle_leverage(args, config),
        Commands::Rank(args) => handle_rank(args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Team pace and championship leverage from race sessions.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to ./maranello.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write a daily rolling log file to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize lap times and build a team pace report.
    Pace(PaceArgs),
    /// Score every race by its championship leverage.
    Leverage(LeverageArgs),
    /// Print the ranking of an existing leverage report.
    Rank(RankArgs),
}

#[derive(Parser)]
struct PaceArgs {
    /// Directory of race session JSON files.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the pace report.
    #[arg(long)]
    output: PathBuf,

    /// Only this season.
    #[arg(long)]
    season: Option<u16>,

    /// Only the first N rounds of each season.
    #[arg(long)]
    races: Option<u32>,

    #[arg(long, value_enum)]
    trend: Option<TrendFitKind>,
}

#[derive(Parser)]
struct LeverageArgs {
    /// Directory of race session JSON files.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the leverage report.
    #[arg(long)]
    output: PathBuf,

    #[arg(long)]
    scale_factor: Option<f64>,

    #[arg(long)]
    from_season: Option<u16>,

    #[arg(long)]
    to_season: Option<u16>,

    /// Series to include (f1, cup, xfinity, truck). Repeatable.
    #[arg(long)]
    series: Vec<Series>,

    #[arg(long, value_enum)]
    excitement: Option<ExcitementPolicy>,
}

#[derive(Parser)]
struct RankArgs {
    /// A leverage report written by the `leverage` command.
    #[arg(long)]
    input: PathBuf,

    /// Rescale combined scores before ranking.
    #[arg(long)]
    scale_factor: Option<f64>,

    #[arg(long, default_value_t = 20)]
    top: usize,
}

// ==============================================================================
// Logging
// ==============================================================================

fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "maranello.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()?;
            Ok(None)
        }
    }
}

fn progress_bar() -> Result<ProgressBar> {
    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} races ({eta})")?
            .progress_chars("=>-"),
    );
    Ok(progress_bar)
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn seconds(value: f64) -> Cell {
    Cell::new(format!("{value:+.3}")).set_alignment(CellAlignment::Right)
}

// ==============================================================================
// Pace Command
// ==============================================================================

fn handle_pace(args: PaceArgs, mut config: Config) -> Result<()> {
    if let Some(season) = args.season {
        config.run.season_start = Some(season);
        config.run.season_end = Some(season);
    }
    if let Some(races) = args.races {
        config.run.max_rounds = Some(races);
    }
    if let Some(kind) = args.trend {
        config.pace.trend.kind = kind;
    }

    let sessions = ingest::load_sessions(&args.input)?;
    let runner = SeasonRunner::new(config)?;
    let progress = progress_bar()?;
    let outcome = runner.run(&sessions, RunMode::Pace, &progress)?;
    progress.finish_with_message("Pace normalization complete.");

    let insufficient: usize = outcome.races.iter().map(|r| r.insufficient.len()).sum();
    if insufficient > 0 {
        tracing::warn!(drivers = insufficient, "Some drivers had too few laps for a pace series.");
    }

    for season in &outcome.smoothed {
        let mut latest = table(vec!["Team", "Round", "Pace (s / 100 s lap)", "± CI", "Laps"]);
        for team in &season.teams {
            let Some(point) = team.latest() else { continue };
            latest.add_row(vec![
                Cell::new(&team.team_id),
                Cell::new(point.round),
                seconds(point.mean),
                point
                    .ci_half_width
                    .map(|half| Cell::new(format!("{half:.3}")))
                    .unwrap_or_else(|| Cell::new("-")),
                Cell::new(point.n),
            ]);
        }
        println!("{} {}", season.series, season.season);
        println!("{latest}");
    }

    let report = PaceReport::new(outcome.pace, outcome.smoothed, outcome.elapsed);
    write_report(&report, &args.output)?;
    println!("Pace report {} written to {}", report.run_id, args.output.display());
    Ok(())
}

// ==============================================================================
// Leverage Commands
// ==============================================================================

fn handle_leverage(args: LeverageArgs, mut config: Config) -> Result<()> {
    if let Some(factor) = args.scale_factor {
        config.leverage.scale_factor = factor;
    }
    if args.from_season.is_some() {
        config.run.season_start = args.from_season;
    }
    if args.to_season.is_some() {
        config.run.season_end = args.to_season;
    }
    if !args.series.is_empty() {
        config.run.series = args.series;
    }
    if let Some(policy) = args.excitement {
        config.leverage.excitement = policy;
    }

    let sessions = ingest::load_sessions(&args.input)?;
    let runner = SeasonRunner::new(config)?;
    let progress = progress_bar()?;
    let outcome = runner.run(&sessions, RunMode::Leverage, &progress)?;
    progress.finish_with_message("Leverage estimation complete.");

    let summary = outcome.leverage.unwrap_or_default();
    let leverage = &runner.config().leverage;
    let report = LeverageReport::new(
        summary,
        leverage.scale_factor,
        leverage.excitement,
        outcome.elapsed,
    );
    print_ranking(&report, usize::MAX);
    write_report(&report, &args.output)?;
    println!("Leverage report {} written to {}", report.run_id, args.output.display());
    Ok(())
}

fn handle_rank(args: RankArgs) -> Result<()> {
    let mut report: LeverageReport = read_report(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    if let Some(factor) = args.scale_factor {
        report.summary = report.summary.rescaled(factor)?;
        report.scale_factor = factor;
        report.statistics = report.summary.statistics();
        report.tracks = report.summary.statistics_by_track();
    }
    print_ranking(&report, args.top);
    Ok(())
}

fn print_ranking(report: &LeverageReport, top: usize) {
    let summary = &report.summary;
    let mut ranking = table(vec!["#", "Race", "Advancement", "Excitement", "Combined"]);
    for ranked in summary.top(top) {
        let Some(score) = summary.score(&ranked.race_id) else { continue };
        ranking.add_row(vec![
            Cell::new(ranked.rank),
            Cell::new(ranked.race_id),
            Cell::new(format!("{:.4}", score.advancement)),
            Cell::new(format!("{:.4}", score.excitement)),
            Cell::new(format!("{:.4}", score.combined)),
        ]);
    }
    println!("{ranking}");

    if let Some(stats) = &report.statistics {
        let mut spread = table(vec!["", "Min", "Median", "Mean", "Max"]);
        for (name, dist) in [
            ("Advancement", stats.advancement),
            ("Excitement", stats.excitement),
            ("Combined", stats.combined),
        ] {
            spread.add_row(vec![
                Cell::new(name),
                Cell::new(format!("{:.4}", dist.min)),
                Cell::new(format!("{:.4}", dist.median)),
                Cell::new(format!("{:.4}", dist.mean)),
                Cell::new(format!("{:.4}", dist.max)),
            ]);
        }
        println!("{spread}");
    }

    if !report.tracks.is_empty() {
        let mut tracks = table(vec!["Track", "Type", "Races", "Mean", "Median", "Max", "Min"]);
        for track in &report.tracks {
            let combined = track.statistics.combined;
            tracks.add_row(vec![
                Cell::new(&track.track),
                Cell::new(track.track_type.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())),
                Cell::new(track.statistics.races),
                Cell::new(format!("{:.4}", combined.mean)),
                Cell::new(format!("{:.4}", combined.median)),
                Cell::new(format!("{:.4}", combined.max)),
                Cell::new(format!("{:.4}", combined.min)),
            ]);
        }
        println!("{tracks}");
    }

    for omitted in &summary.omitted {
        println!("Omitted {}: {}", omitted.race_id, omitted.reason);
    }
}
