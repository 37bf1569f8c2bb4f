// SPDX-License-Identifier: Apache-2.0

//! End-to-end cycles over temp-dir log files against a mock backend.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use logship::bounded_channel::bounded;
use logship::exporters::telemetry::TelemetryExporter;
use logship::scheduler::{Scheduler, SchedulerConfig};
use logship::tailer::offsets::OffsetStore;
use logship::tailer::parser::ParserKind;
use logship::tailer::LogSource;

fn scheduler(sources: Vec<LogSource>, state_file: &Path, endpoint: &str) -> Scheduler {
    let offsets = OffsetStore::open(state_file, None).unwrap();
    let exporter = TelemetryExporter::new(endpoint, None, Duration::from_secs(5), 1).unwrap();
    let (_wake_tx, wake_rx) = bounded::<()>(1);

    Scheduler::new(
        sources,
        offsets,
        exporter,
        SchedulerConfig {
            poll_interval: Duration::from_secs(60),
            max_concurrent_files: 2,
            max_line_len: 16384,
            host: "test-host".to_string(),
        },
        wake_rx,
    )
    .unwrap()
}

fn access_line(status: u32, time_ms: u32) -> String {
    format!(
        r#"10.0.0.1 - alice [01/Jan/2024:00:00:00] "GET /api/x HTTP/1.1" {} 512 {}"#,
        status, time_ms
    )
}

fn stored_offset(state_file: &Path, log_path: &Path) -> u64 {
    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state_file).unwrap()).unwrap();
    state["last_positions"][log_path.to_str().unwrap()]
        .as_u64()
        .unwrap()
}

#[tokio::test]
async fn restart_forwards_no_duplicate_events() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    let state_file = dir.path().join("state.json");
    fs::write(&log_path, "one thing happened\nanother thing happened\n").unwrap();

    let source = LogSource::new("backend", log_path.to_str().unwrap(), ParserKind::AppLog);

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source.clone()], &state_file, &server.url());
        sched.run_cycle().await;

        events.assert_async().await;
        metrics.assert_async().await;
    }

    // Simulated restart: a fresh scheduler reloads the persisted offsets.
    // No new writes, so no events may ship again.
    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .expect(0)
            .create_async()
            .await;
        let metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source], &state_file, &server.url());
        sched.run_cycle().await;

        events.assert_async().await;
        metrics.assert_async().await;
    }
}

#[tokio::test]
async fn partial_line_ships_exactly_once_when_completed() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    let state_file = dir.path().join("state.json");
    fs::write(&log_path, "complete line\npartial").unwrap();

    let source = LogSource::new("backend", log_path.to_str().unwrap(), ParserKind::AppLog);

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .match_body(Matcher::PartialJson(json!([
                {"message": "complete line", "source": "backend", "host": "test-host"}
            ])))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source.clone()], &state_file, &server.url());
        sched.run_cycle().await;

        events.assert_async().await;
        // Offset holds at the end of the last complete line.
        assert_eq!(stored_offset(&state_file, &log_path), 14);
    }

    // The writer finishes the line; the whole line ships once.
    let mut content = fs::read_to_string(&log_path).unwrap();
    content.push_str(" now done\n");
    fs::write(&log_path, content).unwrap();

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .match_body(Matcher::PartialJson(json!([
                {"message": "partial now done"}
            ])))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source], &state_file, &server.url());
        sched.run_cycle().await;

        events.assert_async().await;
    }
}

#[tokio::test]
async fn rotated_file_is_read_from_the_start() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    let state_file = dir.path().join("state.json");
    fs::write(&log_path, "a long first generation of this log file\n").unwrap();

    let source = LogSource::new("backend", log_path.to_str().unwrap(), ParserKind::AppLog);

    {
        let mut server = mockito::Server::new_async().await;
        let _events = server
            .mock("POST", "/v1/events")
            .with_status(200)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source.clone()], &state_file, &server.url());
        sched.run_cycle().await;
    }

    // Rotation: the file is replaced with shorter content.
    fs::write(&log_path, "fresh after rotation\n").unwrap();

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .match_body(Matcher::PartialJson(json!([
                {"message": "fresh after rotation"}
            ])))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source], &state_file, &server.url());
        sched.run_cycle().await;

        events.assert_async().await;
        assert_eq!(stored_offset(&state_file, &log_path), 21);
    }
}

#[tokio::test]
async fn garbage_lines_do_not_abort_the_cycle() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("access.log");
    let state_file = dir.path().join("state.json");

    let mut content = String::new();
    for i in 0..100 {
        if i % 10 < 3 {
            content.push_str("### not an access line at all\n");
        } else {
            content.push_str(&access_line(200, 50 + i));
            content.push('\n');
        }
    }
    fs::write(&log_path, &content).unwrap();

    let source = LogSource::new("web", log_path.to_str().unwrap(), ParserKind::AccessLog);

    let mut server = mockito::Server::new_async().await;
    let events = server
        .mock("POST", "/v1/events")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    // 70 valid lines, the 30 garbage ones silently skipped.
    let metrics = server
        .mock("POST", "/v1/metrics")
        .match_body(Matcher::PartialJson(json!([
            {"name": "request_count", "value": 70.0, "source": "web"}
        ])))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let mut sched = scheduler(vec![source], &state_file, &server.url());
    sched.run_cycle().await;

    events.assert_async().await;
    metrics.assert_async().await;
    // The offset covers every line, garbage included.
    assert_eq!(stored_offset(&state_file, &log_path), content.len() as u64);
}

#[tokio::test]
async fn interval_metrics_carry_rates_and_percentiles() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("access.log");
    let state_file = dir.path().join("state.json");

    // Five requests with latencies 100..500ms, one of them a server error.
    let mut content = String::new();
    for (i, ms) in [100u32, 200, 300, 400, 500].iter().enumerate() {
        let status = if i == 0 { 500 } else { 200 };
        content.push_str(&access_line(status, *ms));
        content.push('\n');
    }
    fs::write(&log_path, &content).unwrap();

    let source = LogSource::new("web", log_path.to_str().unwrap(), ParserKind::AccessLog);

    let mut server = mockito::Server::new_async().await;
    let _events = server
        .mock("POST", "/v1/events")
        .with_status(200)
        .create_async()
        .await;
    let metrics = server
        .mock("POST", "/v1/metrics")
        .match_body(Matcher::PartialJson(json!([
            {"name": "request_count", "value": 5.0},
            {"name": "error_http_count", "value": 1.0},
            {"name": "error_rate", "value": 20.0},
            {"name": "avg_response_time", "value": 300.0},
            {"name": "p50_response_time", "value": 300.0},
            {"name": "p90_response_time", "value": 500.0},
            {"name": "p99_response_time", "value": 500.0}
        ])))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let mut sched = scheduler(vec![source], &state_file, &server.url());
    sched.run_cycle().await;

    metrics.assert_async().await;
}

#[tokio::test]
async fn backend_failure_still_advances_offsets() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    let state_file = dir.path().join("state.json");
    let content = "ERROR: backend is down\n";
    fs::write(&log_path, content).unwrap();

    let source = LogSource::new("backend", log_path.to_str().unwrap(), ParserKind::AppLog);

    let mut server = mockito::Server::new_async().await;
    let _events = server
        .mock("POST", "/v1/events")
        .with_status(503)
        .create_async()
        .await;
    let _metrics = server
        .mock("POST", "/v1/metrics")
        .with_status(503)
        .create_async()
        .await;

    let mut sched = scheduler(vec![source], &state_file, &server.url());
    sched.run_cycle().await;

    // Losing a push is accepted in exchange for forward progress: the
    // offset still advances so the same region is never re-read forever.
    assert_eq!(stored_offset(&state_file, &log_path), content.len() as u64);
}

#[tokio::test]
async fn cancellation_performs_a_final_persist() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("app.log");
    let state_file = dir.path().join("state.json");
    let content = "INFO started\nINFO ready\n";
    fs::write(&log_path, content).unwrap();

    let mut server = mockito::Server::new_async().await;
    let _events = server
        .mock("POST", "/v1/events")
        .with_status(200)
        .create_async()
        .await;
    let _metrics = server
        .mock("POST", "/v1/metrics")
        .with_status(200)
        .create_async()
        .await;

    let source = LogSource::new("backend", log_path.to_str().unwrap(), ParserKind::AppLog);
    let offsets = OffsetStore::open(&state_file, None).unwrap();
    let exporter = TelemetryExporter::new(&server.url(), None, Duration::from_secs(5), 1).unwrap();
    // The sender stays alive so the scheduler keeps waiting for wakes.
    let (wake_tx, wake_rx) = bounded::<()>(1);

    let sched = Scheduler::new(
        vec![source],
        offsets,
        exporter,
        SchedulerConfig {
            poll_interval: Duration::from_secs(60),
            max_concurrent_files: 2,
            max_line_len: 16384,
            host: "test-host".to_string(),
        },
        wake_rx,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(sched.run(cancel.clone()));

    // Wait for the first cycle to complete, then stop mid-sleep.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !state_file.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();
    drop(wake_tx);

    assert_eq!(stored_offset(&state_file, &log_path), content.len() as u64);
}

#[tokio::test]
async fn glob_source_picks_up_files_between_cycles() {
    let dir = TempDir::new().unwrap();
    let state_file = dir.path().join("state.json");
    let pattern = format!("{}/*.log", dir.path().display());

    let source = LogSource::new("web", pattern.clone(), ParserKind::AccessLog);

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .expect(0)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source.clone()], &state_file, &server.url());
        sched.run_cycle().await;
        events.assert_async().await;
    }

    // Rotated in after the first cycle.
    let log_path = dir.path().join("access-2024.log");
    fs::write(&log_path, format!("{}\n", access_line(200, 12))).unwrap();

    {
        let mut server = mockito::Server::new_async().await;
        let events = server
            .mock("POST", "/v1/events")
            .match_body(Matcher::PartialJson(json!([
                {"fields": {"status": 200, "response_time_ms": 12}}
            ])))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let _metrics = server
            .mock("POST", "/v1/metrics")
            .with_status(200)
            .create_async()
            .await;

        let mut sched = scheduler(vec![source], &state_file, &server.url());
        sched.run_cycle().await;
        events.assert_async().await;
    }
}
