mod common;

use gazex_app::{TelemetryRecord, telemetry};
use gazex_core::{RewardTier, TrialOutcome, TrialPhase};

#[test]
fn headless_session_runs_every_trial() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let recorded = common::record_session(common::config(), &path);

    let results = &recorded.report.results;
    assert_eq!(results.len(), 4);
    assert_eq!(recorded.report.final_phase, TrialPhase::Null);
    for s in results {
        if s.trial_number % 2 == 1 {
            assert!(matches!(s.outcome, TrialOutcome::Correct { .. }), "{s:?}");
            assert_eq!(s.reward, RewardTier::Full);
        } else {
            assert!(matches!(s.outcome, TrialOutcome::Incorrect { .. }), "{s:?}");
            assert_eq!(s.reward, RewardTier::None);
        }
        assert!(s.reaction_time_ns.is_some());
    }
    assert_eq!(recorded.scene.rewards.len(), 4);
    assert_eq!(recorded.scene.outcomes.len(), 4);
    assert!(recorded.scene.visible.is_empty());

    let fixations_held = recorded
        .steps
        .iter()
        .filter(|s| s.transition == Some(TrialPhase::Delay1))
        .count();
    assert_eq!(fixations_held, 4);

    let records = telemetry::read_file(&path).unwrap();
    assert!(matches!(records[0], TelemetryRecord::Metadata { .. }));
    let count = |pred: fn(&TelemetryRecord) -> bool| records.iter().filter(|r| pred(r)).count();
    assert_eq!(count(|r| matches!(r, TelemetryRecord::Trial { .. })), 4);
    assert_eq!(count(|r| matches!(r, TelemetryRecord::Summary { .. })), 4);
    assert_eq!(
        count(|r| matches!(r, TelemetryRecord::Frame(_))) as u64,
        recorded.report.frames
    );
    assert!(count(|r| matches!(r, TelemetryRecord::Samples { .. })) > 0);

    let last_frame = records
        .iter()
        .rev()
        .find_map(|r| match r {
            TelemetryRecord::Frame(f) => Some(f.clone()),
            _ => None,
        })
        .unwrap();
    // ordinal table: Null is 20
    assert_eq!(last_frame.phase_code(), 20.0);
}
