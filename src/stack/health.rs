//! # Health Polling
//!
//! Bounded wait for a set of services to report healthy at the same time.
//! Each tick inspects every service concurrently and waits for all reads
//! before evaluating. On timeout the poller captures logs for every
//! non-healthy service into a [`TimeoutReport`].

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::definition::{ServiceDefinition, StackDefinition};
use super::runtime::{ContainerRuntime, ContainerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
    Missing,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Missing => "missing",
        };
        write!(f, "{}", s)
    }
}

/// Status of one service at one poll. Recomputed every tick, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthRecord {
    pub service_name: String,
    pub container: String,
    pub status: HealthStatus,
    /// Last observed engine state, or the inspect error.
    pub detail: Option<String>,
    pub last_checked_at: DateTime<Utc>,
}

impl HealthRecord {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Final state of a health wait that did not succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeoutReport {
    pub attempts: u32,
    pub records: Vec<HealthRecord>,
    /// Captured log tail per non-healthy service.
    pub logs: BTreeMap<String, String>,
    /// The wait ended because of cancellation rather than the attempt budget.
    pub cancelled: bool,
}

impl TimeoutReport {
    pub fn unhealthy(&self) -> impl Iterator<Item = &HealthRecord> {
        self.records.iter().filter(|r| !r.is_healthy())
    }

    pub fn summary(&self) -> String {
        let failing: Vec<String> =
            self.unhealthy().map(|r| format!("{}={}", r.service_name, r.status)).collect();
        format!(
            "{} of {} service(s) not healthy after {} attempt(s): {}",
            failing.len(),
            self.records.len(),
            self.attempts,
            failing.join(", ")
        )
    }
}

/// Map an engine observation to a health status.
pub fn classify(service: &ServiceDefinition, state: Option<&ContainerState>) -> HealthStatus {
    let Some(state) = state else {
        return HealthStatus::Missing;
    };

    match state.health.as_deref() {
        Some("healthy") if state.is_running() => HealthStatus::Healthy,
        Some("unhealthy") => HealthStatus::Unhealthy,
        _ => match state.status.as_str() {
            "exited" | "dead" => HealthStatus::Unhealthy,
            "running" if !service.healthcheck => HealthStatus::Healthy,
            _ => HealthStatus::Starting,
        },
    }
}

pub struct HealthPoller {
    runtime: Arc<dyn ContainerRuntime>,
    log_tail_lines: u32,
    cancel: CancellationToken,
}

impl HealthPoller {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, log_tail_lines: u32) -> Self {
        Self { runtime, log_tail_lines, cancel: CancellationToken::new() }
    }

    /// Stop waiting between ticks once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// One concurrent read of every service's state.
    pub async fn check(
        &self,
        stack: &StackDefinition,
        services: &[&ServiceDefinition],
    ) -> Vec<HealthRecord> {
        let reads = services.iter().map(|service| {
            let container = stack.container_name(service);
            async move {
                let observed = self.runtime.inspect_container(&container).await;
                let (status, detail) = match observed {
                    Ok(state) => {
                        (classify(service, state.as_ref()), state.map(|s| s.to_string()))
                    }
                    Err(e) => (HealthStatus::Starting, Some(format!("inspect failed: {}", e))),
                };
                HealthRecord {
                    service_name: service.name.clone(),
                    container,
                    status,
                    detail,
                    last_checked_at: Utc::now(),
                }
            }
        });
        join_all(reads).await
    }

    /// Succeeds only when every service is healthy in the same tick.
    pub async fn wait_until_healthy(
        &self,
        stack: &StackDefinition,
        services: &[&ServiceDefinition],
        max_attempts: u32,
        interval: Duration,
    ) -> std::result::Result<Vec<HealthRecord>, TimeoutReport> {
        let max_attempts = max_attempts.max(1);
        let total = services.len();
        let mut records = Vec::new();

        for attempt in 1..=max_attempts {
            records = self.check(stack, services).await;
            let healthy = records.iter().filter(|r| r.is_healthy()).count();
            tracing::info!(attempt, max_attempts, healthy, total, "Waiting for services: {}/{} healthy", healthy, total);

            if healthy == total {
                return Ok(records);
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = self.cancel.cancelled() => {
                        tracing::warn!(attempt, "Health wait cancelled");
                        return Err(self.report(records, attempt, true).await);
                    }
                }
            }
        }

        Err(self.report(records, max_attempts, false).await)
    }

    async fn report(&self, records: Vec<HealthRecord>, attempts: u32, cancelled: bool) -> TimeoutReport {
        let mut logs = BTreeMap::new();
        for record in records.iter().filter(|r| !r.is_healthy() && r.status != HealthStatus::Missing) {
            let text = match self.runtime.container_logs(&record.container, self.log_tail_lines).await {
                Ok(text) => text,
                Err(e) => format!("<logs unavailable: {}>", e),
            };
            logs.insert(record.service_name.clone(), text);
        }

        for record in records.iter().filter(|r| !r.is_healthy()) {
            tracing::error!(
                service = %record.service_name,
                status = %record.status,
                detail = record.detail.as_deref().unwrap_or("-"),
                "Service not healthy"
            );
        }

        TimeoutReport { attempts, records, logs, cancelled }
    }
}
