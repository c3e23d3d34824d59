//! Sweep scheduler behaviour against scripted probes.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use serde_json::json;

use common::{profile, ScriptedProbe};
use placerank::{
    CandidateSupply, CheckpointReader, MapVariant, MatchMethod, MatchOutcome, Strategy, SweepState,
    Vocabulary,
};
use placerank_runtime::progress::{self, ProgressEvent, ProgressEventKind};
use placerank_runtime::sweep::control::{ControlAction, SweepControl};
use placerank_runtime::sweep::{prepare, Sweep, SweepOptions, SweepReport};

const KEYWORDS: &[&str] = &[
    "광안 칼국수",
    "수영구 칼국수",
    "광안리 수제비",
    "광안 맛집",
    "수영구 점심",
    "광안리 칼국수 맛집",
    "광안 수제비",
    "수영구 저녁",
    "광안역 칼국수",
    "수영구 해장",
];

fn hit(rank: usize, variant: MapVariant) -> MatchOutcome {
    MatchOutcome::ranked(rank, variant, Strategy::SktPayload, MatchMethod::Id)
}

fn scripted() -> ScriptedProbe {
    ScriptedProbe::new([
        ("광안 칼국수", hit(1, MapVariant::Current)),
        ("광안리 수제비", hit(3, MapVariant::Legacy)),
        ("수영구 점심", hit(2, MapVariant::Current)),
        ("광안 수제비", hit(5, MapVariant::Current)),
        ("수영구 해장", hit(4, MapVariant::Legacy)),
    ])
}

fn options() -> SweepOptions {
    SweepOptions {
        preferred: MapVariant::Current,
        target_hits: None,
        concurrency: 3,
        window_gap_ms: 0,
        retry_initial_delay_ms: 0,
        retry_gap_ms: 0,
        autosave_every: 0,
        location_filter: false,
        checkpoint_dir: None,
    }
}

fn fixed() -> (SweepState, CandidateSupply) {
    let list = KEYWORDS.iter().map(|k| k.to_string()).collect();
    prepare(&profile(), Vocabulary::embedded(), Some(list), None, None, 1_000).unwrap()
}

async fn run_sweep(
    probe: &ScriptedProbe,
    options: &SweepOptions,
    control: &SweepControl,
    start: (SweepState, CandidateSupply),
) -> anyhow::Result<SweepReport> {
    let profile = profile();
    let sweep = Sweep {
        id: "test".into(),
        profile: &profile,
        vocab: Vocabulary::embedded(),
        probe,
        options,
        control,
        progress: None,
    };
    let (state, supply) = start;
    sweep.run(supply, state).await
}

fn hit_keys(report: &SweepReport) -> BTreeSet<(String, u8, MapVariant)> {
    report
        .hits
        .iter()
        .map(|h| (h.keyword.clone(), h.rank, h.map_variant))
        .collect()
}

#[tokio::test]
async fn test_full_sweep_collects_every_hit() {
    let probe = scripted();
    let report = run_sweep(&probe, &options(), &SweepControl::new(), fixed()).await.unwrap();

    assert_eq!(report.checked, KEYWORDS.len() as u64);
    assert_eq!(report.hits.len(), 5);
    assert_eq!(report.current_hits, 3);
    assert_eq!(report.legacy_hits, 2);
    assert!(report.remaining.is_empty());
    assert!(!report.stopped && !report.skipped && !report.target_reached);
    // Sorted by rank.
    let ranks: Vec<u8> = report.hits.iter().map(|h| h.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_interrupted_and_resumed_sweep_matches_uninterrupted() {
    let dir = tempfile::tempdir().unwrap();
    let opts = SweepOptions {
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..options()
    };

    let baseline = run_sweep(&scripted(), &options(), &SweepControl::new(), fixed())
        .await
        .unwrap();

    let control = SweepControl::new();
    let probe = scripted().stop_after(4, control.clone());
    let first = run_sweep(&probe, &opts, &control, fixed()).await.unwrap();
    assert!(first.stopped);
    assert!(!first.remaining.is_empty());
    assert!(first.checked < KEYWORDS.len() as u64);

    let path = first.checkpoint_path.clone().unwrap();
    let checkpoint = CheckpointReader::read_from_file(&path).unwrap();
    assert_eq!(checkpoint.remaining, first.remaining);

    let resumed = prepare(&profile(), Vocabulary::embedded(), None, None, Some(checkpoint), 1_000).unwrap();
    let second = run_sweep(&scripted(), &opts, &SweepControl::new(), resumed).await.unwrap();

    assert!(second.remaining.is_empty());
    assert_eq!(second.checked, baseline.checked);
    assert_eq!(hit_keys(&second), hit_keys(&baseline));
}

#[tokio::test]
async fn test_target_stops_sweep_early() {
    let opts = SweepOptions {
        target_hits: Some(2),
        concurrency: 1,
        ..options()
    };
    let probe = scripted();
    let report = run_sweep(&probe, &opts, &SweepControl::new(), fixed()).await.unwrap();

    assert!(report.target_reached);
    assert_eq!(report.current_hits, 2);
    // Second current hit is the fifth keyword.
    assert_eq!(report.checked, 5);
    assert_eq!(report.remaining.len(), KEYWORDS.len() - 5);
}

#[tokio::test]
async fn test_legacy_target_counts_only_legacy_hits() {
    let opts = SweepOptions {
        preferred: MapVariant::Legacy,
        target_hits: Some(2),
        concurrency: 1,
        ..options()
    };
    let report = run_sweep(&scripted(), &opts, &SweepControl::new(), fixed()).await.unwrap();
    assert!(report.target_reached);
    assert_eq!(report.legacy_hits, 2);
    assert!(report.remaining.is_empty());
}

#[tokio::test]
async fn test_failed_load_is_retried_after_main_pass() {
    let (tx, mut rx) = progress::channel();
    let probe = scripted().flaky("광안 칼국수");
    let profile = profile();
    let opts = options();
    let control = SweepControl::new();
    let sweep = Sweep {
        id: "retry".into(),
        profile: &profile,
        vocab: Vocabulary::embedded(),
        probe: &probe,
        options: &opts,
        control: &control,
        progress: Some(tx),
    };
    let (state, supply) = fixed();
    let report = sweep.run(supply, state).await.unwrap();

    assert_eq!(report.hits.len(), 5);
    assert!(report.hits.iter().any(|h| h.keyword == "광안 칼국수" && h.rank == 1));
    // The failed attempt and the retry both count.
    assert_eq!(report.checked, KEYWORDS.len() as u64 + 1);
    assert_eq!(probe.calls(), KEYWORDS.len() + 1);

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    let retry = events
        .iter()
        .position(|e| matches!(e.event, ProgressEventKind::RetryPass { queued: 1 }))
        .unwrap();
    let finished = events
        .iter()
        .position(|e| matches!(e.event, ProgressEventKind::SweepFinished { .. }))
        .unwrap();
    assert!(retry < finished);
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
}

#[tokio::test]
async fn test_stop_requeues_unretried_keywords() {
    let control = SweepControl::new();
    let probe = scripted().flaky("광안 칼국수").stop_after(3, control.clone());
    let opts = options();
    let report = run_sweep(&probe, &opts, &control, fixed()).await.unwrap();

    assert!(report.stopped);
    assert!(report.remaining.contains(&"광안 칼국수".to_string()));
    assert!(!report.hits.iter().any(|h| h.keyword == "광안 칼국수"));
}

#[tokio::test]
async fn test_skip_ends_sweep_without_stop() {
    let control = SweepControl::new();
    control.apply(ControlAction::Skip);
    let report = run_sweep(&scripted(), &options(), &control, fixed()).await.unwrap();

    assert!(report.skipped);
    assert!(!report.stopped);
    assert_eq!(report.checked, 0);
    assert_eq!(report.remaining.len(), KEYWORDS.len());
}

#[tokio::test]
async fn test_pause_holds_sweep_until_resume() {
    let control = SweepControl::new();
    control.apply(ControlAction::Pause);
    let probe = scripted();
    let opts = options();

    let resume = {
        let control = control.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            control.apply(ControlAction::Resume);
        }
    };
    let (report, ()) = tokio::join!(run_sweep(&probe, &opts, &control, fixed()), resume);
    let report = report.unwrap();

    assert_eq!(report.checked, KEYWORDS.len() as u64);
    assert!(!report.stopped);
}

#[tokio::test]
async fn test_location_filter_drops_keywords_without_context() {
    let (tx, mut rx) = progress::channel();
    let list = vec![
        "광안 칼국수".to_string(),
        "칼국수 맛집".to_string(),
        "수영구 점심".to_string(),
        "점심 추천".to_string(),
    ];
    let start = prepare(&profile(), Vocabulary::embedded(), Some(list), None, None, 1_000).unwrap();
    let profile = profile();
    let opts = SweepOptions {
        location_filter: true,
        ..options()
    };
    let control = SweepControl::new();
    let probe = scripted();
    let sweep = Sweep {
        id: "filter".into(),
        profile: &profile,
        vocab: Vocabulary::embedded(),
        probe: &probe,
        options: &opts,
        control: &control,
        progress: Some(tx),
    };
    let report = sweep.run(start.1, start.0).await.unwrap();

    assert_eq!(report.filtered, 2);
    assert_eq!(report.checked, 2);
    assert_eq!(probe.calls(), 2);

    let mut filtered = None;
    while let Ok(ev) = rx.try_recv() {
        if matches!(ev.event, ProgressEventKind::Filtered { .. }) {
            filtered = Some(ev);
        }
    }
    let ev: ProgressEvent = filtered.unwrap();
    assert_json_include!(
        actual: serde_json::to_value(&ev).unwrap(),
        expected: json!({
            "sweep_id": "filter",
            "event": {
                "type": "Filtered",
                "skipped": 2,
                "total_skipped": 2,
                "sample": ["칼국수 맛집", "점심 추천"],
            }
        })
    );
}

#[tokio::test]
async fn test_generated_supply_respects_budget() {
    let start = prepare(&profile(), Vocabulary::embedded(), None, Some(12), None, 1_000).unwrap();
    let opts = SweepOptions {
        concurrency: 5,
        ..options()
    };
    let report = run_sweep(&scripted(), &opts, &SweepControl::new(), start).await.unwrap();

    assert_eq!(report.checked, 12);
    assert!(report.generator.is_some());
    assert!(report.remaining.is_empty());
}

#[tokio::test]
async fn test_autosave_writes_checkpoint_as_hits_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = progress::channel();
    let opts = SweepOptions {
        autosave_every: 2,
        concurrency: 2,
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..options()
    };
    let profile = profile();
    let control = SweepControl::new();
    let probe = scripted();
    let sweep = Sweep {
        id: "autosave".into(),
        profile: &profile,
        vocab: Vocabulary::embedded(),
        probe: &probe,
        options: &opts,
        control: &control,
        progress: Some(tx),
    };
    let (state, supply) = fixed();
    let report = sweep.run(supply, state).await.unwrap();

    let mut saves = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let ProgressEventKind::CheckpointSaved { hits, .. } = ev.event {
            saves.push(hits);
        }
    }
    // Two autosaves (at 2 and 4 hits) plus the final save.
    assert_eq!(saves.len(), 3);
    assert_eq!(saves.last(), Some(&5));

    let path = report.checkpoint_path.unwrap();
    assert!(path.starts_with(dir.path()));
    let checkpoint = CheckpointReader::read_from_file(&path).unwrap();
    assert_eq!(checkpoint.hits.len(), 5);
    assert!(checkpoint.remaining.is_empty());
}

#[tokio::test]
async fn test_fatal_failure_checkpoints_unprocessed_window() {
    let dir = tempfile::tempdir().unwrap();
    let opts = SweepOptions {
        concurrency: 2,
        checkpoint_dir: Some(dir.path().to_path_buf()),
        ..options()
    };
    let probe = scripted().fatal_on("수영구 점심");
    let err = run_sweep(&probe, &opts, &SweepControl::new(), fixed()).await.unwrap_err();
    assert!(format!("{err:#}").contains("browser gone"));

    let path = placerank::Checkpoint::path_in(dir.path(), common::TARGET_ID);
    let checkpoint = CheckpointReader::read_from_file(&path).unwrap();
    // Windows: [0,1] [2,3] [4,5]; keyword 4 failed fatally.
    assert_eq!(checkpoint.checked, 5);
    assert_eq!(checkpoint.remaining.first().map(String::as_str), Some("수영구 점심"));
    assert_eq!(checkpoint.remaining.len(), KEYWORDS.len() - 5);
    assert_eq!(checkpoint.hits.len(), 2);
}

#[tokio::test]
async fn test_candidate_event_shape() {
    let (tx, mut rx) = progress::channel();
    let list = vec!["광안 칼국수".to_string()];
    let start = prepare(&profile(), Vocabulary::embedded(), Some(list), None, None, 1_000).unwrap();
    let profile = profile();
    let opts = options();
    let control = SweepControl::new();
    let probe = scripted();
    let sweep = Sweep {
        id: "shape".into(),
        profile: &profile,
        vocab: Vocabulary::embedded(),
        probe: &probe,
        options: &opts,
        control: &control,
        progress: Some(tx),
    };
    sweep.run(start.1, start.0).await.unwrap();

    let first = rx.try_recv().unwrap();
    assert_eq!(first.seq, 1);
    assert_json_include!(
        actual: serde_json::to_value(&first).unwrap(),
        expected: json!({
            "event": {
                "type": "SweepStarted",
                "business_id": common::TARGET_ID,
                "remaining": 1,
                "resumed_hits": 0,
            }
        })
    );
    let checked = rx.try_recv().unwrap();
    assert_json_include!(
        actual: serde_json::to_value(&checked).unwrap(),
        expected: json!({
            "seq": 2,
            "event": {
                "type": "CandidateChecked",
                "checked": 1,
                "keyword": "광안 칼국수",
                "rank": 1,
                "map_variant": "current",
                "load_failed": false,
                "new_hit": true,
                "hit_count": 1,
                "remaining": 0,
            }
        })
    );
}
