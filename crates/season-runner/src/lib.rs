//! # Maranello Season Runner
//!
//! Runs the per-race stages over many sessions in parallel and folds the results
//! into season-level outputs.
//!
//! Each race is independent: a worker borrows one `RaceSession` and hands back an
//! immutable `RaceOutcome`. A single collector then sorts the outcomes by race and
//! builds the season series, so the result never depends on which worker finished
//! first.

use configuration::Config;
use core_types::{RaceId, RaceSession};
use indicatif::ProgressBar;
use itertools::Itertools;
use leverage::{LeverageError, LeverageEstimator, LeverageScore, SeasonLeverageSummary, summarize};
use pace::{
    InsufficientData, PaceError, PaceNormalizer, RacePace, SeasonPace, SeasonSmoothing, aggregate,
    smooth,
};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub mod error;

pub use error::RunnerError;

/// Which stages to run for every race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Pace,
    Leverage,
    Both,
}

impl RunMode {
    pub fn includes_pace(self) -> bool {
        matches!(self, RunMode::Pace | RunMode::Both)
    }

    pub fn includes_leverage(self) -> bool {
        matches!(self, RunMode::Leverage | RunMode::Both)
    }
}

/// Everything computed for one race.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    pub race_id: RaceId,
    pub pace: Option<RacePace>,
    pub insufficient: Vec<InsufficientData>,
    pub leverage: Option<LeverageScore>,
    /// Why the race has no leverage score, when leverage was requested.
    pub omitted: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeasonOutcome {
    /// Completed races, chronological.
    pub races: Vec<RaceOutcome>,
    /// One entry per series and season, when pace was requested.
    pub pace: Vec<SeasonPace>,
    pub smoothed: Vec<SeasonSmoothing>,
    pub leverage: Option<SeasonLeverageSummary>,
    /// Races never started because the run was cancelled.
    pub skipped: Vec<RaceId>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

enum Work {
    Done(Box<RaceOutcome>),
    Skipped(RaceId),
    Failed(RunnerError),
}

pub struct SeasonRunner {
    config: Config,
    normalizer: PaceNormalizer,
    estimator: LeverageEstimator,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl SeasonRunner {
    pub fn new(config: Config) -> Result<Self, RunnerError> {
        config.validate()?;
        let workers = match config.run.workers {
            0 => num_cpus::get(),
            n => n,
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("race-worker-{i}"))
            .build()?;

        Ok(Self {
            normalizer: PaceNormalizer::new(config.pace.clone()),
            estimator: LeverageEstimator::new(config.leverage.clone()),
            config,
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Shared flag; once set, races that have not started yet are skipped.
    ///
    /// `run` clears the flag before it returns, so the runner stays usable.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(
        &self,
        sessions: &[RaceSession],
        mode: RunMode,
        progress: &ProgressBar,
    ) -> Result<SeasonOutcome, RunnerError> {
        let started = Instant::now();

        let mut selected: Vec<&RaceSession> = sessions
            .iter()
            .filter(|s| self.config.run.includes(s.series, s.season, s.round))
            .collect();
        selected.sort_by_key(|s| s.race_id());
        if let Some((duplicate, _)) = selected
            .iter()
            .map(|s| s.race_id())
            .tuple_windows()
            .find(|(a, b)| a == b)
        {
            return Err(RunnerError::DuplicateRace(duplicate));
        }

        tracing::info!(
            selected = selected.len(),
            total = sessions.len(),
            workers = self.workers(),
            ?mode,
            "Starting run."
        );
        progress.set_length(selected.len() as u64);

        // Raised by a malformed session so the rest of this run is skipped.
        let abort = AtomicBool::new(false);
        let work: Vec<Work> = self.pool.install(|| {
            selected
                .par_iter()
                .map(|session| {
                    let work = self.process(session, mode, &abort);
                    progress.inc(1);
                    work
                })
                .collect()
        });
        let cancelled = self.cancel.swap(false, Ordering::SeqCst);

        let mut races = Vec::with_capacity(work.len());
        let mut skipped = Vec::new();
        for item in work {
            match item {
                Work::Done(outcome) => races.push(*outcome),
                Work::Skipped(race_id) => skipped.push(race_id),
                Work::Failed(err) => return Err(err),
            }
        }

        let pace = if mode.includes_pace() {
            self.collect_pace(&races)?
        } else {
            Vec::new()
        };
        let smoothed = pace
            .iter()
            .map(|season| smooth(season, &self.config.pace.smoothing))
            .collect::<Result<Vec<_>, _>>()?;

        let leverage = mode.includes_leverage().then(|| {
            let mut summary = summarize(races.iter().filter_map(|r| r.leverage.clone()).collect());
            for race in &races {
                if let Some(reason) = &race.omitted {
                    summary.omit(race.race_id, reason.clone());
                }
            }
            summary
        });

        if cancelled {
            tracing::warn!(skipped = skipped.len(), "Run cancelled; unstarted races skipped.");
        }
        tracing::info!(
            completed = races.len(),
            seasons = pace.len(),
            elapsed = ?started.elapsed(),
            "Run complete."
        );

        Ok(SeasonOutcome {
            races,
            pace,
            smoothed,
            leverage,
            skipped,
            cancelled,
            elapsed: started.elapsed(),
        })
    }

    fn process(&self, session: &RaceSession, mode: RunMode, abort: &AtomicBool) -> Work {
        let race_id = session.race_id();
        if self.cancel.load(Ordering::SeqCst) || abort.load(Ordering::SeqCst) {
            return Work::Skipped(race_id);
        }
        match self.process_race(session, mode) {
            Ok(outcome) => Work::Done(Box::new(outcome)),
            Err(err) => {
                if matches!(err, RunnerError::Malformed(_)) {
                    abort.store(true, Ordering::SeqCst);
                }
                tracing::error!(race = %race_id, error = %err, "Race failed.");
                Work::Failed(err)
            }
        }
    }

    fn process_race(&self, session: &RaceSession, mode: RunMode) -> Result<RaceOutcome, RunnerError> {
        let race_id = session.race_id();
        let mut outcome = RaceOutcome {
            race_id,
            pace: None,
            insufficient: Vec::new(),
            leverage: None,
            omitted: None,
        };

        if mode.includes_pace() {
            let normalized = self.normalizer.normalize(session).map_err(pace_error)?;
            outcome.pace = Some(aggregate(&normalized, &session.team_map()));
            outcome.insufficient = normalized.insufficient;
        }

        if mode.includes_leverage() {
            match self.estimator.estimate(session, self.config.leverage.scale_factor) {
                Ok(score) => outcome.leverage = Some(score),
                Err(err @ LeverageError::MissingStandings { .. }) => {
                    tracing::warn!(race = %race_id, error = %err, "Race omitted from leverage.");
                    outcome.omitted = Some(err.to_string());
                }
                Err(LeverageError::Session(err)) => return Err(RunnerError::Malformed(err)),
                Err(err) => return Err(err.into()),
            }
        }

        Ok(outcome)
    }

    /// The single collector for pace: one `SeasonPace` per series and season.
    fn collect_pace(&self, races: &[RaceOutcome]) -> Result<Vec<SeasonPace>, RunnerError> {
        races
            .iter()
            .filter_map(|r| r.pace.clone())
            .into_group_map_by(|p| (p.race_id.series, p.race_id.season))
            .into_iter()
            .sorted_by_key(|(key, _)| *key)
            .map(|((series, season), races)| {
                SeasonPace::from_races(series, season, races).map_err(RunnerError::from)
            })
            .collect()
    }
}

fn pace_error(err: PaceError) -> RunnerError {
    match err {
        PaceError::Session(err) => RunnerError::Malformed(err),
        other => RunnerError::Pace(other),
    }
}
