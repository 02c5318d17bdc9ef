//! Error scenario integration tests
//!
//! Tests failure modes and recovery:
//! 1. Blocked pages (no seat label)
//! 2. Navigation failures
//! 3. Navigation timeouts
//! 4. Partial run failure

use chrono::NaiveDate;
use std::time::Duration;
use tokio::sync::watch;

use fillrate::crawler::pipeline::{PipelineConfig, ScrapePipeline};
use fillrate::models::RouteTask;
use fillrate::utils::error::FetchError;

use super::fixtures::{fetcher, route, PageScript, ScriptedSessions};

fn task(slug: &str) -> RouteTask {
    RouteTask::new(
        &route(slug, slug),
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
    )
}

// ============================================================================
// Blocked Page Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_blocked_page_exhausts_three_attempts() {
    let sessions = ScriptedSessions::always(PageScript::Blocked);
    let fetcher = fetcher(sessions.clone());

    let err = fetcher.fetch(&task("blocked")).await.unwrap_err();

    match err {
        FetchError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.contains("Blocked"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sessions.visits_matching("blocked"), 3);
    // One fresh page per attempt, each closed afterwards.
    assert_eq!(sessions.opened(), 3);
    assert_eq!(sessions.closed(), 3);
    assert_eq!(sessions.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_page_without_seat_text_is_blocked() {
    let sessions = ScriptedSessions::always(PageScript::seats(&["Sorry, something went wrong"]));
    let fetcher = fetcher(sessions.clone());

    let err = fetcher.fetch(&task("captcha")).await.unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_block() {
    let sessions = ScriptedSessions::new(|_, visit| {
        if visit == 1 {
            PageScript::Blocked
        } else {
            PageScript::seats(&["20 Seats"])
        }
    });
    let fetcher = fetcher(sessions.clone());

    let result = fetcher.fetch(&task("flaky")).await.unwrap();

    assert_eq!(result.available_seats, 20);
    assert_eq!(result.fill_rate_percent, 44.44);
    assert_eq!(sessions.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_between_attempts_only() {
    let sessions = ScriptedSessions::always(PageScript::NavigationError);
    let fetcher = fetcher(sessions.clone());

    let began = tokio::time::Instant::now();
    let err = fetcher.fetch(&task("down")).await.unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
    // Navigation fails instantly, so only the two 3 s cool-downs elapse.
    assert_eq!(began.elapsed(), Duration::from_secs(6));
}

// ============================================================================
// Navigation Error Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_navigation_error_is_retried() {
    let sessions = ScriptedSessions::new(|_, visit| match visit {
        1 | 2 => PageScript::NavigationError,
        _ => PageScript::seats(&["1 Seat"]),
    });
    let fetcher = fetcher(sessions.clone());

    let result = fetcher.fetch(&task("reset")).await.unwrap();

    assert_eq!(result.available_seats, 1);
    assert_eq!(result.fill_rate_percent, 97.22);
    assert_eq!(sessions.visits_matching("reset"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_timeout_is_retried() {
    let sessions = ScriptedSessions::new(|_, visit| {
        if visit == 1 {
            PageScript::Hang
        } else {
            PageScript::seats(&["36 Seats"])
        }
    });
    let fetcher = fetcher(sessions.clone());

    let began = tokio::time::Instant::now();
    let result = fetcher.fetch(&task("slow")).await.unwrap();

    assert_eq!(result.fill_rate_percent, 0.0);
    assert!(began.elapsed() >= Duration::from_secs(63));
    assert_eq!(sessions.open_now(), 0);
}

// ============================================================================
// Partial Failure Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_tasks_are_dropped_not_fatal() {
    let sessions = ScriptedSessions::new(|url, _| {
        if url.contains("bad") {
            PageScript::Blocked
        } else {
            PageScript::seats(&["6 Seats"])
        }
    });
    let config = PipelineConfig {
        max_tabs: 3,
        date_range: 3,
        run_timeout: None,
    };
    let pipeline = ScrapePipeline::new(config, fetcher(sessions.clone()));

    let outcome = pipeline
        .run(
            &[route("Good", "good"), route("Bad", "bad")],
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .await;

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results.iter().all(|r| r.route_name == "Good"));
    assert_eq!(outcome.stats.success_count, 3);
    assert_eq!(outcome.stats.dropped_count, 3);
    assert_eq!(sessions.visits_matching("bad"), 9);
    assert!(!outcome.timed_out);
}

#[tokio::test(start_paused = true)]
async fn test_all_tasks_fail() {
    let sessions = ScriptedSessions::always(PageScript::Blocked);
    let config = PipelineConfig {
        max_tabs: 2,
        date_range: 2,
        run_timeout: None,
    };
    let pipeline = ScrapePipeline::new(config, fetcher(sessions));

    let outcome = pipeline
        .run(&[route("A", "a")], NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
        .await;

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.stats.dropped_count, 2);
    assert_eq!(outcome.stats.success_rate(), 0.0);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_closes_hanging_page() {
    let sessions = ScriptedSessions::always(PageScript::Hang);
    let fetcher = fetcher(sessions.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let slow = task("slow");
    let handle = tokio::spawn(async move { fetcher.fetch_until(&slow, &cancel_rx).await });

    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel_tx.send(true).unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(sessions.opened(), 1);
    assert_eq!(sessions.closed(), 1);
    assert_eq!(sessions.open_now(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_cooldown_starts_no_new_attempt() {
    let sessions = ScriptedSessions::always(PageScript::NavigationError);
    let fetcher = fetcher(sessions.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let down = task("down");
    let handle = tokio::spawn(async move { fetcher.fetch_until(&down, &cancel_rx).await });

    // First attempt fails at once; the 3 s cool-down is running.
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel_tx.send(true).unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(sessions.opened(), 1);
    assert_eq!(sessions.closed(), 1);
}
