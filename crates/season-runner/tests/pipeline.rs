use configuration::{Config, ExcludedRace};
use core_types::{Driver, DriverId, Lap, RaceSession, Series, Standing, TeamId, TrackStatus};
use indicatif::ProgressBar;
use season_runner::{RunMode, RunnerError, SeasonRunner};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

const LAPS: u32 = 30;
const BASE_LAP: f64 = 92.0;

/// (driver, team, pace offset in seconds, per-lap drift in seconds)
type Entry = (&'static str, &'static str, f64, f64);

const ENTRIES: [Entry; 8] = [
    ("VER", "Red Bull", -1.0, 0.0),
    ("PER", "Red Bull", -0.9, 0.0),
    ("LEC", "Ferrari", -0.5, 0.0),
    ("SAI", "Ferrari", -0.4, 0.0),
    ("HAM", "Mercedes", 0.0, 0.0),
    ("RUS", "Mercedes", 0.1, 0.0),
    // Williams lose time steadily; the trend fit has to absorb it.
    ("ALB", "Williams", 1.0, 0.05),
    ("SAR", "Williams", 1.1, 0.05),
];

fn session(round: u32) -> RaceSession {
    session_with(round, &ENTRIES)
}

fn session_with(round: u32, entries: &[Entry]) -> RaceSession {
    let drivers: Vec<Driver> = entries
        .iter()
        .map(|(driver, team, _, _)| Driver {
            driver_id: (*driver).into(),
            team_id: (*team).into(),
            season: 2023,
            series: Series::Formula1,
        })
        .collect();

    let mut laps = Vec::new();
    for &(driver, _, offset, drift) in entries {
        for n in 1..=LAPS {
            let neutralized = round == 2 && (14..=16).contains(&n);
            laps.push(Lap {
                driver_id: driver.into(),
                lap_number: n,
                lap_time: BASE_LAP + offset + drift * n as f64 + if neutralized { 20.0 } else { 0.0 },
                is_valid: true,
                track_status: if neutralized { TrackStatus::Yellow } else { TrackStatus::Green },
            });
        }
    }
    // A deleted lap, far off the pace, must not leak into Ferrari's sample.
    if let Some(lap) = laps
        .iter_mut()
        .find(|l| l.driver_id.0 == "LEC" && l.lap_number == 20)
    {
        lap.lap_time += 5.0;
        lap.is_valid = false;
    }

    // After the race PER has taken the championship lead from VER.
    let standings = |post: bool| -> BTreeMap<DriverId, Standing> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (driver, _, _, _))| {
                let mut points = (entries.len() - i) as f64 * 10.0 * round as f64;
                let mut position = i as u32 + 1;
                if post && i < 2 {
                    points += if i == 1 { 25.0 } else { 0.0 };
                    position = 2 - i as u32;
                }
                ((*driver).into(), Standing::new(points, position))
            })
            .collect()
    };

    RaceSession {
        series: Series::Formula1,
        season: 2023,
        round,
        season_rounds: 22,
        event: None,
        finishing_order: drivers.iter().map(|d| d.driver_id.clone()).collect(),
        drivers,
        laps,
        retirements: BTreeMap::new(),
        pre_race_standings: standings(false),
        post_race_standings: standings(true),
    }
}

fn season() -> Vec<RaceSession> {
    (1..=3).map(session).collect()
}

fn runner() -> SeasonRunner {
    let mut config = Config::default();
    config.run.workers = 2;
    SeasonRunner::new(config).unwrap()
}

#[test]
fn test_three_race_season_pace() {
    let outcome = runner()
        .run(&season(), RunMode::Pace, &ProgressBar::hidden())
        .unwrap();

    assert_eq!(outcome.pace.len(), 1);
    let pace = &outcome.pace[0];
    assert_eq!(pace.rounds, vec![1, 2, 3]);
    assert_eq!(pace.teams.len(), 4);
    assert!(pace.gaps.is_empty());

    let latest = |team: &str| pace.series_for(&TeamId::from(team)).unwrap().get(3).unwrap().clone();
    let red_bull = latest("Red Bull");
    let ferrari = latest("Ferrari");
    let mercedes = latest("Mercedes");
    let williams = latest("Williams");
    assert!(red_bull.delta < ferrari.delta);
    assert!(ferrari.delta < mercedes.delta);
    assert!(mercedes.delta < williams.delta);

    // Drift is gone: only the 0.1 s gap between team-mates remains.
    assert!((williams.stdev - 0.05).abs() < 1e-9);
    assert_eq!(williams.laps, 2 * LAPS as usize);

    // The deleted lap is excluded outright.
    assert_eq!(ferrari.laps, 2 * LAPS as usize - 1);
    assert!(ferrari.lap_deltas.iter().all(|d| (d - ferrari.delta).abs() < 0.2));

    for series in pace.teams.values() {
        assert_eq!(series.len(), 3);
    }
    assert_eq!(outcome.smoothed.len(), 1);
    assert_eq!(outcome.smoothed[0].teams[0].team_id, TeamId::from("Red Bull"));
}

#[test]
fn test_uniform_drift_normalizes_to_zero() {
    let entries: [Entry; 4] = [
        ("A1", "Team A", 0.0, 0.05),
        ("A2", "Team A", 0.0, 0.05),
        ("B1", "Team B", 0.0, 0.05),
        ("B2", "Team B", 0.0, 0.05),
    ];
    let sessions: Vec<RaceSession> = (1..=3).map(|round| session_with(round, &entries)).collect();
    let outcome = runner()
        .run(&sessions, RunMode::Pace, &ProgressBar::hidden())
        .unwrap();

    let team_a = outcome.pace[0].series_for(&TeamId::from("Team A")).unwrap();
    assert_eq!(team_a.len(), 3);
    for sample in team_a.samples() {
        assert!(sample.delta.abs() < 1e-9);
        assert!(sample.stdev < 1e-9);
    }
}

#[test]
fn test_caution_laps_do_not_shift_team_order() {
    let outcome = runner()
        .run(&season(), RunMode::Pace, &ProgressBar::hidden())
        .unwrap();
    let pace = &outcome.pace[0];

    let round_two = |team: &str| pace.series_for(&TeamId::from(team)).unwrap().get(2).unwrap().delta;
    let round_one = |team: &str| pace.series_for(&TeamId::from(team)).unwrap().get(1).unwrap().delta;
    for team in ["Red Bull", "Ferrari", "Mercedes"] {
        assert!((round_two(team) - round_one(team)).abs() < 1e-9);
    }
}

#[test]
fn test_out_of_order_input_gives_same_result() {
    let mut reversed = season();
    reversed.reverse();

    let a = runner().run(&season(), RunMode::Both, &ProgressBar::hidden()).unwrap();
    let b = runner().run(&reversed, RunMode::Both, &ProgressBar::hidden()).unwrap();
    assert_eq!(a.pace, b.pace);
    assert_eq!(a.leverage, b.leverage);
    assert_eq!(a.races, b.races);
}

#[test]
fn test_rerun_is_idempotent() {
    let runner = runner();
    let sessions = season();
    let a = runner.run(&sessions, RunMode::Both, &ProgressBar::hidden()).unwrap();
    let b = runner.run(&sessions, RunMode::Both, &ProgressBar::hidden()).unwrap();
    assert_eq!(a.races, b.races);
    assert_eq!(a.smoothed, b.smoothed);
}

#[test]
fn test_leverage_summary_and_missing_standings() {
    let mut sessions = season();
    sessions[2].post_race_standings.remove(&DriverId::from("SAR"));

    let outcome = runner()
        .run(&sessions, RunMode::Leverage, &ProgressBar::hidden())
        .unwrap();
    assert!(outcome.pace.is_empty());

    let summary = outcome.leverage.unwrap();
    assert_eq!(summary.scores.len(), 2);
    assert_eq!(summary.omitted.len(), 1);
    assert_eq!(summary.omitted[0].race_id.round, 3);
    assert_eq!(summary.ranking.len(), 2);
    assert!(summary.scores.iter().all(|s| s.advancement > 0.0));
}

#[test]
fn test_malformed_session_aborts_run() {
    let mut sessions = season();
    sessions[1].laps.push(Lap {
        driver_id: "ZZZ".into(),
        lap_number: 1,
        lap_time: 95.0,
        is_valid: true,
        track_status: TrackStatus::Green,
    });

    let result = runner().run(&sessions, RunMode::Pace, &ProgressBar::hidden());
    assert!(matches!(result, Err(RunnerError::Malformed(_))));
}

#[test]
fn test_duplicate_race_is_rejected() {
    let mut sessions = season();
    sessions.push(session(2));
    let result = runner().run(&sessions, RunMode::Pace, &ProgressBar::hidden());
    assert!(matches!(result, Err(RunnerError::DuplicateRace(race)) if race.round == 2));
}

#[test]
fn test_cancelled_run_skips_unstarted_races() {
    let runner = runner();
    runner.cancel_handle().store(true, Ordering::SeqCst);

    let outcome = runner
        .run(&season(), RunMode::Both, &ProgressBar::hidden())
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.races.is_empty());
    assert_eq!(outcome.skipped.len(), 3);
    assert!(outcome.pace.is_empty());

    // The flag is spent by the cancelled run; the next one processes everything.
    assert!(!runner.cancel_handle().load(Ordering::SeqCst));
    let rerun = runner
        .run(&season(), RunMode::Both, &ProgressBar::hidden())
        .unwrap();
    assert!(!rerun.cancelled);
    assert_eq!(rerun.races.len(), 3);
    assert!(rerun.skipped.is_empty());
}

#[test]
fn test_round_limit_filters_sessions() {
    let mut config = Config::default();
    config.run.max_rounds = Some(2);
    config.run.workers = 1;
    let runner = SeasonRunner::new(config).unwrap();

    let outcome = runner
        .run(&season(), RunMode::Pace, &ProgressBar::hidden())
        .unwrap();
    assert_eq!(outcome.pace[0].rounds, vec![1, 2]);
}

#[test]
fn test_excluded_race_is_left_out_and_tracks_grouped() {
    let mut config = Config::default();
    config.run.workers = 2;
    config.run.exclude = vec![ExcludedRace {
        series: None,
        season: 2023,
        round: 2,
    }];
    let runner = SeasonRunner::new(config).unwrap();

    let mut sessions = season();
    for (session, track) in sessions.iter_mut().zip(["bahrain", "jeddah", "bahrain"]) {
        session.event = Some(
            serde_json::from_value(serde_json::json!({
                "name": format!("Round {}", session.round),
                "date": "2023-03-05",
                "track": track,
                "track_type": "road_course",
            }))
            .unwrap(),
        );
    }

    let outcome = runner
        .run(&sessions, RunMode::Both, &ProgressBar::hidden())
        .unwrap();
    assert_eq!(outcome.pace[0].rounds, vec![1, 3]);

    let tracks = outcome.leverage.unwrap().statistics_by_track();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].track, "bahrain");
    assert_eq!(tracks[0].statistics.races, 2);
}
