//! Request and task metrics for the connector hub
//!
//! Tracks HTTP request totals, per-module breakdowns, error codes, a
//! latency histogram with an approximate p95, request rate, and AI task
//! counters. Event bus totals are read live from the bus. Exposed as a
//! JSON snapshot and in Prometheus text format.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use omniflow_shared::ModuleKind;

use crate::events::EventBus;

const SERVICE: &str = "connector-hub";

/// Latency distribution over fixed buckets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseTimeHistogram {
    pub under_10ms: u64,
    pub ms_10_to_50: u64,
    pub ms_50_to_100: u64,
    pub ms_100_to_500: u64,
    pub ms_500_to_1000: u64,
    pub over_1000ms: u64,
}

impl ResponseTimeHistogram {
    pub fn record(&mut self, response_time_ms: u64) {
        match response_time_ms {
            0..=9 => self.under_10ms += 1,
            10..=49 => self.ms_10_to_50 += 1,
            50..=99 => self.ms_50_to_100 += 1,
            100..=499 => self.ms_100_to_500 += 1,
            500..=999 => self.ms_500_to_1000 += 1,
            _ => self.over_1000ms += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.under_10ms
            + self.ms_10_to_50
            + self.ms_50_to_100
            + self.ms_100_to_500
            + self.ms_500_to_1000
            + self.over_1000ms
    }

    /// Approximate 95th percentile, reported as the upper edge of the
    /// bucket the percentile falls into
    pub fn percentile_95(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }

        let p95_index = (total as f64 * 0.95) as u64;
        let buckets = [
            (self.under_10ms, 9.5),
            (self.ms_10_to_50, 49.5),
            (self.ms_50_to_100, 99.5),
            (self.ms_100_to_500, 499.5),
            (self.ms_500_to_1000, 999.5),
        ];

        let mut cumulative = 0;
        for (count, upper_edge) in buckets {
            if cumulative + count >= p95_index {
                return upper_edge;
            }
            cumulative += count;
        }
        1500.0
    }
}

/// Sliding one-minute request rate
#[derive(Debug, Clone, Default)]
pub struct RequestRateTracker {
    requests_per_second: f64,
    peak_requests_per_second: f64,
    recent_requests: Vec<DateTime<Utc>>,
}

impl RequestRateTracker {
    pub fn record_request(&mut self) {
        let now = Utc::now();
        self.recent_requests.push(now);

        let one_minute_ago = now - chrono::Duration::minutes(1);
        self.recent_requests.retain(|&t| t > one_minute_ago);

        self.requests_per_second = self.recent_requests.len() as f64 / 60.0;
        if self.requests_per_second > self.peak_requests_per_second {
            self.peak_requests_per_second = self.requests_per_second;
        }
    }

    pub fn current_rate(&self) -> f64 {
        self.requests_per_second
    }

    pub fn peak_rate(&self) -> f64 {
        self.peak_requests_per_second
    }
}

/// Outcome counters for orchestrator round-trips
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AiTaskCounters {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    avg_response_time_ms: f64,
    requests_by_module: HashMap<ModuleKind, u64>,
    errors_by_code: HashMap<String, u64>,
    histogram: ResponseTimeHistogram,
    request_rate: RequestRateTracker,
    ai_tasks: AiTaskCounters,
}

impl MetricsInner {
    fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            100.0
        } else {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        }
    }

    fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.failed_requests as f64 / self.total_requests as f64) * 100.0
        }
    }
}

/// Point-in-time metrics view for the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub requests_per_second: f64,
    pub requests_by_module: HashMap<String, u64>,
    pub error_breakdown: HashMap<String, u64>,
    pub ai_tasks: AiTaskCounters,
    pub events_published: u64,
    pub events_delivered: u64,
}

/// Shared metrics collector for the whole hub
pub struct HubMetrics {
    inner: RwLock<MetricsInner>,
    bus: Arc<EventBus>,
}

impl HubMetrics {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(MetricsInner::default()),
            bus,
        }
    }

    /// Record one served request that succeeded
    pub fn record_success(&self, module: ModuleKind, response_time_ms: u64) {
        let mut inner = self.inner.write();
        inner.total_requests += 1;
        inner.successful_requests += 1;

        let successful = inner.successful_requests;
        if successful == 1 {
            inner.avg_response_time_ms = response_time_ms as f64;
        } else {
            inner.avg_response_time_ms = (inner.avg_response_time_ms * (successful - 1) as f64
                + response_time_ms as f64)
                / successful as f64;
        }

        *inner.requests_by_module.entry(module).or_insert(0) += 1;
        inner.histogram.record(response_time_ms);
        inner.request_rate.record_request();
    }

    /// Record one served request that failed with the given error code
    pub fn record_failure(&self, module: ModuleKind, error_code: &str) {
        let mut inner = self.inner.write();
        inner.total_requests += 1;
        inner.failed_requests += 1;
        *inner.requests_by_module.entry(module).or_insert(0) += 1;
        *inner.errors_by_code.entry(error_code.to_string()).or_insert(0) += 1;
        inner.request_rate.record_request();
    }

    pub fn record_task_submitted(&self) {
        self.inner.write().ai_tasks.submitted += 1;
    }

    pub fn record_task_completed(&self) {
        self.inner.write().ai_tasks.completed += 1;
    }

    pub fn record_task_failed(&self) {
        self.inner.write().ai_tasks.failed += 1;
    }

    pub fn record_task_timeout(&self) {
        self.inner.write().ai_tasks.timed_out += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot {
            service: SERVICE.to_string(),
            timestamp: Utc::now(),
            total_requests: inner.total_requests,
            success_rate: inner.success_rate(),
            error_rate: inner.error_rate(),
            avg_response_time_ms: inner.avg_response_time_ms,
            p95_response_time_ms: inner.histogram.percentile_95(),
            requests_per_second: inner.request_rate.current_rate(),
            requests_by_module: inner
                .requests_by_module
                .iter()
                .map(|(module, &count)| (module.to_string(), count))
                .collect(),
            error_breakdown: inner.errors_by_code.clone(),
            ai_tasks: inner.ai_tasks,
            events_published: self.bus.published_total(),
            events_delivered: self.bus.delivered_total(),
        }
    }

    /// Render all counters in Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let inner = self.inner.read();
        let mut output = String::new();

        output.push_str("# HELP hub_requests_total Total number of requests served\n");
        output.push_str("# TYPE hub_requests_total counter\n");
        output.push_str(&format!("hub_requests_total {}\n\n", inner.total_requests));

        output.push_str("# HELP hub_requests_successful_total Requests that succeeded\n");
        output.push_str("# TYPE hub_requests_successful_total counter\n");
        output.push_str(&format!(
            "hub_requests_successful_total {}\n\n",
            inner.successful_requests
        ));

        output.push_str("# HELP hub_requests_failed_total Requests that failed\n");
        output.push_str("# TYPE hub_requests_failed_total counter\n");
        output.push_str(&format!(
            "hub_requests_failed_total {}\n\n",
            inner.failed_requests
        ));

        output.push_str("# HELP hub_response_time_seconds Average response time in seconds\n");
        output.push_str("# TYPE hub_response_time_seconds gauge\n");
        output.push_str(&format!(
            "hub_response_time_seconds {}\n\n",
            inner.avg_response_time_ms / 1000.0
        ));

        output.push_str("# HELP hub_requests_per_second Current request rate\n");
        output.push_str("# TYPE hub_requests_per_second gauge\n");
        output.push_str(&format!(
            "hub_requests_per_second {}\n\n",
            inner.request_rate.current_rate()
        ));

        for (module, &count) in &inner.requests_by_module {
            output.push_str(&format!(
                "hub_requests_by_module{{module=\"{}\"}} {}\n",
                module, count
            ));
        }
        output.push('\n');

        for (code, &count) in &inner.errors_by_code {
            output.push_str(&format!(
                "hub_errors_by_code{{error_code=\"{}\"}} {}\n",
                code, count
            ));
        }
        output.push('\n');

        output.push_str("# HELP hub_ai_tasks_total AI task outcomes by stage\n");
        output.push_str("# TYPE hub_ai_tasks_total counter\n");
        output.push_str(&format!(
            "hub_ai_tasks_total{{stage=\"submitted\"}} {}\n",
            inner.ai_tasks.submitted
        ));
        output.push_str(&format!(
            "hub_ai_tasks_total{{stage=\"completed\"}} {}\n",
            inner.ai_tasks.completed
        ));
        output.push_str(&format!(
            "hub_ai_tasks_total{{stage=\"failed\"}} {}\n",
            inner.ai_tasks.failed
        ));
        output.push_str(&format!(
            "hub_ai_tasks_total{{stage=\"timed_out\"}} {}\n\n",
            inner.ai_tasks.timed_out
        ));

        output.push_str("# HELP hub_events_published_total Events published on the bus\n");
        output.push_str("# TYPE hub_events_published_total counter\n");
        output.push_str(&format!(
            "hub_events_published_total {}\n\n",
            self.bus.published_total()
        ));

        output.push_str("# HELP hub_events_delivered_total Handler deliveries on the bus\n");
        output.push_str("# TYPE hub_events_delivered_total counter\n");
        output.push_str(&format!(
            "hub_events_delivered_total {}\n",
            self.bus.delivered_total()
        ));

        output
    }

    /// Reset all counters. The bus keeps its own totals.
    pub fn reset(&self) {
        *self.inner.write() = MetricsInner::default();
    }
}
