use std::time::Duration;

use hubbench_core::{parameter_grid, TrialConfig, CSV_HEADER};
use hubbench_runner::{
    run_sweep, run_trial, ApiError, ExecutorKind, SweepError, SweepOptions, TrialError,
    TrialOptions, TrialPhase, TrialRunner,
};

#[test]
fn end_to_end_trial_measures_all_phases() {
    let config = TrialConfig {
        population: 100,
        active: 25,
    };
    let result = run_trial(&config, &TrialOptions::default()).unwrap();

    assert!(result.running >= 1);
    assert!(result.running <= 25);
    assert!(result.startup > Duration::ZERO);
    assert!(result.startup >= result.session_restore);
    assert!(result.first_api_round > Duration::ZERO);
    assert!(result.second_api_round > Duration::ZERO);
    assert!(result.first_api_round.as_secs_f64().is_finite());
    assert!(result.second_api_round.as_secs_f64().is_finite());
}

#[test]
fn degenerate_empty_population_never_contacts_the_api() {
    let config = TrialConfig {
        population: 0,
        active: 0,
    };
    let result = run_trial(&config, &TrialOptions::default()).unwrap();
    assert_eq!(result.running, 0);
    assert_eq!(result.first_api_round, Duration::ZERO);
    assert_eq!(result.second_api_round, Duration::ZERO);
}

#[test]
fn sequential_trials_share_no_state() {
    let first = run_trial(
        &TrialConfig {
            population: 20,
            active: 5,
        },
        &TrialOptions::default(),
    )
    .unwrap();
    let second = run_trial(
        &TrialConfig {
            population: 40,
            active: 0,
        },
        &TrialOptions::default(),
    )
    .unwrap();

    assert!(first.running >= 1 && first.running <= 5);
    assert_eq!(second.running, 0);
}

#[test]
fn invalid_config_fails_before_seeding() {
    let mut runner = TrialRunner::new(
        TrialConfig {
            population: 5,
            active: 9,
        },
        TrialOptions::default(),
    );
    let err = runner.run().unwrap_err();
    assert_eq!(err.kind(), "config");
    assert_eq!(runner.phase(), TrialPhase::Failed);
}

#[test]
fn stalled_cursor_drives_the_runner_to_failed() {
    // a zero page limit makes the hub hand back a cursor that never
    // advances, which the client must refuse to follow
    let options = TrialOptions {
        with_proxy: false,
        page_limit: 0,
    };
    let mut runner = TrialRunner::new(
        TrialConfig {
            population: 10,
            active: 0,
        },
        options,
    );
    let err = runner.run().unwrap_err();
    assert!(matches!(
        err,
        TrialError::Api(ApiError::CursorStalled { .. })
    ));
    assert_eq!(runner.phase(), TrialPhase::Failed);
}

#[test]
fn sweep_streams_rows_and_aborts_on_failure() {
    let grid = vec![
        TrialConfig {
            population: 8,
            active: 2,
        },
        TrialConfig {
            population: 4,
            active: 9,
        },
        TrialConfig {
            population: 6,
            active: 1,
        },
    ];
    let options = SweepOptions {
        executor: ExecutorKind::InProcess,
        ..Default::default()
    };
    let mut out = Vec::new();
    let err = run_sweep(&grid, &options, &mut out).unwrap_err();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    // header plus exactly the one completed row; nothing for the
    // failed configuration, nothing after it
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("8,2,"));
    assert!(matches!(err, SweepError::Trial(TrialError::Config(_))));
}

#[test]
fn api_failure_aborts_the_sweep_without_a_row() {
    let grid = vec![TrialConfig {
        population: 10,
        active: 0,
    }];
    let options = SweepOptions {
        executor: ExecutorKind::InProcess,
        trial: TrialOptions {
            with_proxy: false,
            page_limit: 0,
        },
        worker: None,
    };
    let mut out = Vec::new();
    let err = run_sweep(&grid, &options, &mut out).unwrap_err();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert_eq!(text.lines().next(), Some(CSV_HEADER));
    assert!(matches!(err, SweepError::Trial(TrialError::Api(_))));
}

#[test]
fn sweep_covers_the_whole_grid() {
    let grid = parameter_grid(&[4, 6], &[0.0, 0.5]).unwrap();
    let options = SweepOptions {
        executor: ExecutorKind::InProcess,
        ..Default::default()
    };
    let mut out = Vec::new();
    run_sweep(&grid, &options, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1 + grid.len());
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), CSV_HEADER.split(',').count());
    }
    assert!(lines[1].starts_with("4,0,0,"));
    assert!(lines[4].starts_with("6,3,"));
}
