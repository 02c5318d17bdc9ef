//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Route × date task expansion
//! 2. URL date rewriting
//! 3. Page rendering (scripted)
//! 4. Seat extraction and fill-rate computation
//! 5. Statistics tracking

use chrono::NaiveDate;
use std::time::Duration;

use fillrate::crawler::pipeline::{PipelineConfig, ScrapePipeline};
use fillrate::storage::{persist_run, read_backup, MemorySnapshotStore, SnapshotStore};

use super::fixtures::{fetcher, route, PageScript, ScriptedSessions};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn pipeline_config(max_tabs: usize, date_range: u32) -> PipelineConfig {
    PipelineConfig {
        max_tabs,
        date_range,
        run_timeout: None,
    }
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_buses_over_three_dates() {
    let sessions = ScriptedSessions::always(PageScript::seats(&[
        "Volvo A/C Sleeper",
        "5 Seats",
        "Departs 21:30",
        "5 Seats",
    ]));
    let pipeline = ScrapePipeline::new(pipeline_config(3, 3), fetcher(sessions.clone()));

    let outcome = pipeline
        .run(&[route("City A–City B", "city-a-to-city-b")], start())
        .await;

    let mut results = outcome.results;
    results.sort_by_key(|r| r.travel_date);
    assert_eq!(results.len(), 3);

    for (offset, result) in results.iter().enumerate() {
        assert_eq!(result.route_name, "City A–City B");
        assert_eq!(
            result.travel_date,
            start() + chrono::Duration::days(offset as i64)
        );
        assert_eq!(result.bus_count, 2);
        assert_eq!(result.total_capacity, 72);
        assert_eq!(result.available_seats, 10);
        assert_eq!(result.filled_seats, 62);
        assert_eq!(result.fill_rate_percent, 86.11);
    }

    assert!(results[0].route_url.contains("onward=10-Mar-2025"));
    assert!(results[0].route_url.contains("doj=10-Mar-2025"));
    assert!(results[2].route_url.contains("onward=12-Mar-2025"));
    assert!(!results[2].route_url.contains("01-Jan-2025"));

    assert_eq!(outcome.stats.total_tasks, 3);
    assert_eq!(outcome.stats.success_count, 3);
    assert!(!outcome.timed_out);
    assert_eq!(sessions.opened(), 3);
    assert_eq!(sessions.closed(), 3);
    assert_eq!(sessions.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_three_buses_example() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["4 Seats", "3 seats", "3 Seats left"]));
    let pipeline = ScrapePipeline::new(pipeline_config(1, 1), fetcher(sessions));

    let outcome = pipeline.run(&[route("X - Y", "x-to-y")], start()).await;

    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.total_capacity, 108);
    assert_eq!(result.available_seats, 10);
    assert_eq!(result.filled_seats, 98);
    assert_eq!(result.fill_rate_percent, 90.74);
}

#[tokio::test(start_paused = true)]
async fn test_every_route_and_date_visited_once() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["12 Seats"]));
    let pipeline = ScrapePipeline::new(pipeline_config(3, 3), fetcher(sessions.clone()));
    let routes = vec![route("A - B", "a-to-b"), route("C - D", "c-to-d")];

    let outcome = pipeline.run(&routes, start()).await;

    assert_eq!(outcome.results.len(), 6);
    let urls = sessions.visited_urls();
    assert_eq!(urls.len(), 6);
    for slug in ["a-to-b", "c-to-d"] {
        for day in ["10-Mar-2025", "11-Mar-2025", "12-Mar-2025"] {
            assert!(
                urls.iter().any(|u| u.contains(slug) && u.contains(day)),
                "missing {slug} on {day}"
            );
        }
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_pages_never_exceed_tab_limit() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["7 Seats"]));
    let pipeline = ScrapePipeline::new(pipeline_config(2, 1), fetcher(sessions.clone()));
    let routes: Vec<_> = (0..5)
        .map(|i| route(&format!("Route {i}"), &format!("r{i}")))
        .collect();

    let outcome = pipeline.run(&routes, start()).await;

    assert_eq!(outcome.results.len(), 5);
    assert_eq!(sessions.max_open(), 2);
    assert!(outcome.stats.peak_in_flight <= 2);
    assert_eq!(outcome.stats.peak_in_flight, 2);
    assert_eq!(sessions.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_tab_runs_sequentially() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["7 Seats"]));
    let pipeline = ScrapePipeline::new(pipeline_config(1, 2), fetcher(sessions.clone()));

    let outcome = pipeline
        .run(&[route("A", "a"), route("B", "b")], start())
        .await;

    assert_eq!(outcome.results.len(), 4);
    assert_eq!(sessions.max_open(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_route_list() {
    let sessions = ScriptedSessions::always(PageScript::Blocked);
    let pipeline = ScrapePipeline::new(pipeline_config(3, 3), fetcher(sessions.clone()));

    let outcome = pipeline.run(&[], start()).await;

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.stats.total_tasks, 0);
    assert_eq!(sessions.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stats_are_per_run() {
    let sessions = ScriptedSessions::new(|url, _| {
        if url.contains("down") {
            PageScript::NavigationError
        } else {
            PageScript::seats(&["4 Seats"])
        }
    });
    let pipeline = ScrapePipeline::new(pipeline_config(2, 1), fetcher(sessions));
    let routes = [route("A", "a"), route("B", "b"), route("Down", "down")];

    let first = pipeline.run(&routes, start()).await;
    let second = pipeline.run(&routes, start()).await;

    for outcome in [&first, &second] {
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.stats.total_tasks, 3);
        assert_eq!(outcome.stats.success_count, 2);
        assert_eq!(outcome.stats.dropped_count, 1);
        assert_eq!(outcome.stats.cancelled_count(), 0);
        assert!(outcome.stats.peak_in_flight <= 2);
    }
    assert_eq!(first.stats, second.stats);
}

// ============================================================================
// Run Deadline Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_finished_results() {
    let sessions = ScriptedSessions::new(|url, _| {
        if url.contains("slow") {
            PageScript::Hang
        } else {
            PageScript::seats(&["9 Seats"])
        }
    });
    let config = PipelineConfig {
        max_tabs: 2,
        date_range: 1,
        run_timeout: Some(Duration::from_secs(40)),
    };
    let pipeline = ScrapePipeline::new(config, fetcher(sessions.clone()));

    let began = tokio::time::Instant::now();
    let outcome = pipeline
        .run(&[route("Fast", "fast"), route("Slow", "slow")], start())
        .await;

    assert!(outcome.timed_out);
    assert!(began.elapsed() < Duration::from_secs(60));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].route_name, "Fast");
    assert_eq!(outcome.stats.cancelled_count(), 1);
    assert_eq!(sessions.open_now(), 0);
    // The hanging page was closed through the session, not just dropped.
    assert_eq!(sessions.opened(), 2);
    assert_eq!(sessions.closed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_leaves_queued_tasks_unstarted() {
    let sessions = ScriptedSessions::new(|url, _| {
        if url.contains("slow") {
            PageScript::Hang
        } else {
            PageScript::seats(&["9 Seats"])
        }
    });
    let config = PipelineConfig {
        max_tabs: 1,
        date_range: 1,
        run_timeout: Some(Duration::from_secs(40)),
    };
    let pipeline = ScrapePipeline::new(config, fetcher(sessions.clone()));

    let outcome = pipeline
        .run(&[route("Slow", "slow"), route("Fast", "fast")], start())
        .await;

    assert!(outcome.timed_out);
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.stats.total_tasks, 2);
    assert_eq!(outcome.stats.dropped_count, 0);
    assert_eq!(outcome.stats.cancelled_count(), 2);
    assert_eq!(sessions.visits_matching("fast"), 0);
    assert_eq!(sessions.opened(), 1);
    assert_eq!(sessions.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_not_reached() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["2 Seats"]));
    let config = PipelineConfig {
        max_tabs: 3,
        date_range: 2,
        run_timeout: Some(Duration::from_secs(3600)),
    };
    let pipeline = ScrapePipeline::new(config, fetcher(sessions));

    let outcome = pipeline.run(&[route("A", "a")], start()).await;

    assert!(!outcome.timed_out);
    assert_eq!(outcome.results.len(), 2);
}

// ============================================================================
// Pipeline + Persistence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_results_replace_snapshot_and_backup() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("route_fill_rates.json");

    let sessions = ScriptedSessions::always(PageScript::seats(&["5 Seats", "5 Seats"]));
    let pipeline = ScrapePipeline::new(pipeline_config(3, 3), fetcher(sessions));
    let outcome = pipeline
        .run(&[route("City A–City B", "city-a-to-city-b")], start())
        .await;

    let store = MemorySnapshotStore::new();
    let report = persist_run(Some(&store), Some(&backup), &outcome.results).await;

    assert_eq!(report.snapshot.unwrap().unwrap(), 3);
    assert_eq!(report.backup.unwrap().unwrap(), 3);

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().all(|r| r.fill_rate_percent == 86.11));

    let mut from_backup = read_backup(&backup).await.unwrap();
    from_backup.sort_by_key(|r| r.travel_date);
    assert_eq!(from_backup, snapshot);
}
