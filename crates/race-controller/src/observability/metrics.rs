//! Metrics definitions for the Race Controller.
//!
//! All metrics use the `rc_` prefix, a `_total` suffix for counters and a
//! `_seconds` suffix for histograms.
//!
//! # Cardinality
//!
//! - `event`: the known wire event names plus `other`
//! - `reason`: bounded by `RcError::error_code`
//! - `endpoint`: static paths, `/drivers/{race_id}`, `/login/{role}` or `/other`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::hub::events;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("rc_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 0.750, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Event Hub Metrics
// ============================================================================

/// Bound an event name to a fixed label set.
#[must_use]
pub fn event_label(event: &str) -> &'static str {
    events::KNOWN
        .iter()
        .copied()
        .find(|known| *known == event)
        .unwrap_or("other")
}

/// Set the number of connected clients.
///
/// Metric: `rc_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_connections_active").set(count as f64);
}

/// Record one event fanned out to every connection.
///
/// Metric: `rc_events_broadcast_total`
/// Labels: `event`
pub fn record_event_broadcast(event: &str) {
    counter!("rc_events_broadcast_total", "event" => event_label(event)).increment(1);
}

/// Record a control event dropped for lack of the required role.
///
/// Metric: `rc_events_dropped_total`
/// Labels: `event`
pub fn record_event_dropped(event: &str) {
    counter!("rc_events_dropped_total", "event" => event_label(event)).increment(1);
}

// ============================================================================
// Race Session Metrics
// ============================================================================

/// Metric: `rc_races_started_total`
pub fn record_race_started() {
    counter!("rc_races_started_total").increment(1);
}

/// Record a rejected start request.
///
/// Metric: `rc_race_start_rejected_total`
/// Labels: `reason`
pub fn record_race_start_rejected(reason: &'static str) {
    counter!("rc_race_start_rejected_total", "reason" => reason).increment(1);
}

/// Metric: `rc_countdown_ticks_total`
pub fn record_countdown_tick() {
    counter!("rc_countdown_ticks_total").increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `rc_http_requests_total`, `rc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("rc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("rc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/ws" => "/ws",
        "/races" => "/races",
        "/drivers" => "/drivers",
        "/race-control" => "/race-control",
        "/front-desk" => "/front-desk",
        "/lap-line-tracker" => "/lap-line-tracker",
        p if p.starts_with("/drivers/") => "/drivers/{race_id}",
        p if p.starts_with("/login/") => "/login/{role}",
        _ => "/other",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // No global recorder is installed in unit tests; outside a local
    // recorder the calls only need to not panic.

    #[test]
    fn test_event_label_is_bounded() {
        assert_eq!(event_label("start:race"), "start:race");
        assert_eq!(event_label("lap-recorded"), "lap-recorded");
        assert_eq!(event_label("chat:spam"), "other");
        assert_eq!(event_label(""), "other");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/drivers/12"), "/drivers/{race_id}");
        assert_eq!(normalize_endpoint("/login/race-control"), "/login/{role}");
        assert_eq!(normalize_endpoint("/races"), "/races");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(303), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(409), "error");
    }

    #[test]
    fn test_recording_without_recorder() {
        set_connections_active(3);
        record_event_broadcast("flag:swap");
        record_event_dropped("start:race");
        record_race_started();
        record_race_start_rejected("no_races");
        record_countdown_tick();
        record_http_request("GET", "/races", 200, Duration::from_millis(3));
    }

    #[test]
    fn test_metric_names_and_bounded_labels() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_event_broadcast("chat:spam");
            record_race_started();
            record_countdown_tick();
            record_countdown_tick();
        });

        let entries = snapshotter.snapshot().into_vec();
        let find = |name: &str| {
            entries
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .expect("metric should be recorded")
        };

        let (key, _, _, value) = find("rc_events_broadcast_total");
        assert!(key
            .key()
            .labels()
            .any(|l| l.key() == "event" && l.value() == "other"));
        assert!(matches!(value, DebugValue::Counter(1)));

        let (_, _, _, value) = find("rc_countdown_ticks_total");
        assert!(matches!(value, DebugValue::Counter(2)));

        find("rc_races_started_total");
    }
}
