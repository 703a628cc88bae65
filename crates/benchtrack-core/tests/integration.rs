//! Integration tests for the benchmark tracking engine
//!
//! Exercises the public API end to end:
//! - ingestion through the tracker, including partial failures
//! - ordering and isolation under concurrent appends
//! - regression detection against a rolling baseline
//! - snapshot persistence in both document forms

use benchtrack_core::{
    read_snapshot, BenchmarkTracker, CommitMeta, DetectorConfig, Direction, IngestMetrics,
    Person, RawBench, RawRun, RunRef, Severity, Snapshot, Store, TrackerError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Commit as the VCS host reports it
fn commit(id: &str, message: &str) -> CommitMeta {
    CommitMeta::new(id)
        .with_author(Person::new("Alex Jones", "AlexsJones", "alexsimonjones@gmail.com"))
        .with_committer(Person::new("GitHub", "web-flow", "noreply@github.com"))
        .with_message(message)
        .with_timestamp("2022-08-22T18:03:24Z")
        .with_url(format!("https://github.com/open-feature/flagd/commit/{id}"))
}

fn go_bench(name: &str, value: f64) -> RawBench {
    RawBench::new(name, value)
        .with_unit("ns/op\t     240 B/op\t       5 allocs/op")
        .with_extra("517521 times\n2 procs")
}

fn tracker(window: usize, threshold: f64) -> BenchmarkTracker {
    let config = DetectorConfig::builder()
        .window(window)
        .threshold_ratio(threshold)
        .build()
        .unwrap();
    BenchmarkTracker::new(Arc::new(Store::new("https://github.com/open-feature/flagd")), config)
}

#[test]
fn test_partial_failure_tolerance() {
    let tracker = tracker(3, 0.2);
    let raw: Vec<Value> = (0..10)
        .map(|i| {
            if i == 3 {
                json!({"name": "Benchmark_3", "value": "n/a", "unit": "ns/op"})
            } else {
                json!({"name": format!("Benchmark_{i}"), "value": 1000 + i, "unit": "ns/op"})
            }
        })
        .collect();

    let report = tracker.ingest(commit("a1", "feat"), "go", 1, &raw).unwrap();
    assert_eq!(report.run.benches.len(), 9);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name.as_deref(), Some("Benchmark_3"));
    assert!(report.alerts.is_empty());
}

#[test]
fn test_detection_window_three() {
    for (observed, alerts) in [(2700.0, 1usize), (2500.0, 0)] {
        let tracker = tracker(3, 0.2);
        for (i, v) in [2200.0, 2150.0, 2180.0].into_iter().enumerate() {
            let report = tracker
                .ingest(commit(&format!("c{i}"), "warmup"), "go", i as i64, &[go_bench("X", v)])
                .unwrap();
            assert!(report.alerts.is_empty());
        }
        let report = tracker
            .ingest(commit("c3", "candidate"), "go", 3, &[go_bench("X", observed)])
            .unwrap();
        assert_eq!(report.alerts.len(), alerts);
    }
}

#[test]
fn test_cold_start_is_silent() {
    let tracker = tracker(3, 0.0);
    let first = tracker.ingest(commit("a", "one"), "go", 1, &[go_bench("X", 1.0)]).unwrap();
    let second = tracker.ingest(commit("b", "two"), "go", 2, &[go_bench("X", 1000.0)]).unwrap();
    assert!(first.alerts.is_empty());
    assert!(second.alerts.is_empty());
}

#[test]
fn test_same_commit_appended_twice_gives_two_samples() {
    let tracker = tracker(5, 1.0);
    let c = commit("17ef4c69", "chore: update deps");
    tracker.ingest(c.clone(), "go", 1_661_395_918_957, &[go_bench("op", 1616.0)]).unwrap();
    tracker.ingest(c, "go", 1_661_395_977_001, &[go_bench("op", 2603.0)]).unwrap();

    let series = tracker.store().series_for("go", "op");
    assert_eq!(series.values(), vec![1616.0, 2603.0]);
}

#[test]
fn test_duplicate_names_first_occurrence_is_the_sample() {
    let tracker = tracker(3, 0.2);
    for i in 0..2 {
        tracker
            .ingest(commit(&format!("c{i}"), "x"), "go", i, &[go_bench("X", 100.0)])
            .unwrap();
    }
    let report = tracker
        .ingest(commit("c2", "x"), "go", 2, &[go_bench("X", 100.0), go_bench("X", 900.0)])
        .unwrap();
    assert!(report.alerts.is_empty());
    assert_eq!(tracker.store().series_for("go", "X").values(), vec![100.0, 100.0, 100.0]);
}

#[test]
fn test_concurrent_appends_to_different_tools() {
    let store = Arc::new(Store::new("repo"));
    let tools = ["go", "rust", "python", "js"];
    const PER_TOOL: usize = 50;

    let before = {
        store.append(commit("seed", "seed"), "go", 0, &[go_bench("op", 0.0)]).unwrap();
        store.runs("go").unwrap()
    };

    std::thread::scope(|scope| {
        for tool in tools {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for i in 0..PER_TOOL {
                    store
                        .append(commit(&format!("{tool}{i}"), "x"), tool, i as i64, &[go_bench("op", i as f64)])
                        .unwrap();
                }
            });
        }
    });

    // The view captured before the writers ran is unchanged
    assert_eq!(before.len(), 1);
    assert_eq!(store.runs("go").unwrap().len(), PER_TOOL + 1);
    for tool in ["rust", "python", "js"] {
        let values = store.series_for(tool, "op").values();
        let expected: Vec<f64> = (0..PER_TOOL).map(|i| i as f64).collect();
        assert_eq!(values, expected, "tool {tool}");
    }
    assert_eq!(store.run_count(), tools.len() * PER_TOOL + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_on_blocking_tasks() {
    let metrics = IngestMetrics::new().unwrap();
    let tracker = Arc::new(tracker(3, 0.2).with_metrics(metrics));

    let mut handles = Vec::new();
    for tool in ["go", "rust", "java"] {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::task::spawn_blocking(move || {
            let mut alerts = 0;
            for (i, v) in [100.0, 100.0, 100.0, 500.0].into_iter().enumerate() {
                let report = tracker
                    .ingest(CommitMeta::new(format!("{tool}-{i}")), tool, i as i64, &[RawBench::new("op", v)])
                    .unwrap();
                alerts += report.alerts.len();
            }
            alerts
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }
    let metrics = tracker.metrics().unwrap();
    for tool in ["go", "rust", "java"] {
        assert_eq!(metrics.runs_appended(tool), 4);
        assert_eq!(metrics.alerts_raised(tool, "critical"), 1);
    }
}

#[test]
fn test_ingest_snapshot_keyed_runs() {
    let tracker = tracker(3, 0.2);
    let raw: RawRun = serde_json::from_value(json!({
        "commit": {
            "author": {"email": "alexsimonjones@gmail.com", "name": "Alex Jones", "username": "AlexsJones"},
            "id": "5201f6b753c7e663c29343e76df96767511c78e6",
            "message": "chore: fixing multi-arch build failure (#153)",
            "timestamp": "2022-08-22T18:03:24Z",
            "url": "https://github.com/open-feature/flagd/commit/5201f6b753c7e663c29343e76df96767511c78e6"
        },
        "date": 1661223171368_i64,
        "tool": "go",
        "benches": [
            {"name": "BenchmarkGRPCService_ResolveBoolean/happy_path", "value": 2217,
             "unit": "ns/op\t     240 B/op\t       5 allocs/op", "extra": "517521 times\n2 procs"},
            {"name": "BenchmarkGRPCService_ResolveString/happy_path", "value": 2380,
             "unit": "ns/op\t     256 B/op\t       6 allocs/op", "extra": "492394 times\n2 procs"}
        ]
    }))
    .unwrap();

    let report = tracker.ingest_run("Go Benchmark", raw).unwrap();
    assert_eq!(report.run_ref, RunRef::new("Go Benchmark", 0));
    assert_eq!(report.run.tool, "go");
    assert_eq!(report.run.commit.committer, Person::default());

    let entry = &report.run.benches[0];
    assert_eq!(entry.primary_unit.as_deref(), Some("ns/op"));
    assert_eq!(entry.secondary_metric("B").map(|m| m.value), Some(240.0));
    assert_eq!(entry.secondary_metric("allocs").map(|m| m.value), Some(5.0));
    assert_eq!(entry.sample_count, Some(517_521));
    assert_eq!(entry.parallelism, Some(2));
}

#[test]
fn test_snapshot_round_trip_through_files() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = tracker(3, 0.2);
    tracker
        .ingest(commit("5201f6b7", "first"), "go", 1_661_223_171_368, &[go_bench("op_a", 2217.0)])
        .unwrap();
    tracker
        .ingest(
            commit("c72323eb", "second"),
            "rust",
            1_661_309_425_536,
            &[RawBench::new("parse", 12.5).with_unit("ns/iter").with_range("± 0.3")],
        )
        .unwrap();

    for file in ["data.js", "data.json"] {
        let path = temp_dir.path().join(file);
        tracker.save(&path).unwrap();

        let snapshot: Snapshot = read_snapshot(&path).unwrap();
        assert_eq!(snapshot.last_update, 1_661_309_425_536);
        assert_eq!(snapshot.entries.keys().collect::<Vec<_>>(), vec!["go", "rust"]);

        let reloaded = Store::from_snapshot(snapshot).unwrap();
        assert!(reloaded == **tracker.store());
        assert_eq!(reloaded.runs("rust").unwrap().get(0).unwrap().benches[0].range.as_deref(), Some("± 0.3"));
    }
}

#[test]
fn test_corrupted_snapshot_refuses_to_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.js");
    std::fs::write(
        &path,
        r#"window.BENCHMARK_DATA = {"lastUpdate": 1, "repoUrl": "r", "entries": {"go": [
            {"commit": {"id": "a"}, "date": 1, "tool": "go",
             "benches": [{"name": "op", "value": "fast", "unit": "ns/op", "extra": ""}]}
        ]}}"#,
    )
    .unwrap();

    let err = BenchmarkTracker::open(&path, "r", DetectorConfig::default()).unwrap_err();
    assert!(matches!(err, TrackerError::SnapshotCorruption(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_higher_is_better_override_from_config() {
    let config = DetectorConfig::builder()
        .window(3)
        .threshold_ratio(0.2)
        .direction_for("throughput", Direction::HigherIsBetter)
        .build()
        .unwrap();
    let tracker = BenchmarkTracker::new(Arc::new(Store::new("repo")), config);
    for (i, v) in [1000.0, 1000.0, 1000.0].into_iter().enumerate() {
        tracker
            .ingest(CommitMeta::new(format!("c{i}")), "go", i as i64, &[RawBench::new("throughput", v)])
            .unwrap();
    }
    let up = tracker
        .ingest(CommitMeta::new("up"), "go", 3, &[RawBench::new("throughput", 5000.0)])
        .unwrap();
    assert!(up.alerts.is_empty());

    let down = tracker
        .ingest(CommitMeta::new("down"), "go", 4, &[RawBench::new("throughput", 700.0)])
        .unwrap();
    // Baseline [1000, 1000, 5000]: -70% against a 20% threshold
    assert_eq!(down.alerts.len(), 1);
    assert_eq!(down.alerts[0].severity, Severity::Error);
}

#[test]
fn test_query_over_tracker() {
    let tracker = tracker(3, 0.2);
    for (i, date) in [300_i64, 100, 200].into_iter().enumerate() {
        tracker
            .ingest(CommitMeta::new(format!("c{i}")), "go", date, &[go_bench("op", i as f64)])
            .unwrap();
    }
    let query = tracker.query().read("go", Some("op"), Some(150), None);
    let stamps: Vec<i64> = query.iter().map(|p| p.timestamp()).collect();
    assert_eq!(stamps, vec![300, 200]);
}
