use crate::config::MAX_BATCH_CONCURRENCY;
use crate::error::{BatchFailure, EditorError, Result};
use mapping_protocol::{GenerateRulesRequest, MappingRule};
use mapping_service::{RuleService, ServiceError};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
    peak: AtomicUsize,
}

/// Caps the number of create requests a batch keeps in flight.
#[derive(Debug, Clone)]
pub struct BatchLimiter {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

struct CreatePermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for CreatePermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard(Arc<Counters>);

impl WaiterGuard {
    fn new(counters: &Arc<Counters>) -> Self {
        counters.waiters.fetch_add(1, Ordering::Relaxed);
        Self(counters.clone())
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::Relaxed);
    }
}

impl BatchLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_BATCH_CONCURRENCY);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn snapshot(&self) -> BatchConcurrencySnapshot {
        BatchConcurrencySnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
        }
    }

    /// Highest in-flight count seen since the limiter was created.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::Relaxed)
    }

    async fn acquire(&self) -> Result<CreatePermit> {
        let waiter = WaiterGuard::new(&self.counters);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EditorError::Closed)?;
        drop(waiter);
        let now = self.counters.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.peak.fetch_max(now, Ordering::Relaxed);
        Ok(CreatePermit {
            permit,
            counters: self.counters.clone(),
        })
    }
}

/// Progress of a running batch, fired after every finished create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub count: usize,
    pub total: usize,
    pub percent: u8,
    pub last_message: String,
}

impl BatchProgress {
    pub fn new(count: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((count as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            count,
            total,
            percent,
            last_message: format!("Saved {count} of {total} rules."),
        }
    }
}

/// Appends every payload to `parent_id`, at most `limiter`'s limit at a time.
///
/// A failed item does not stop the others, whatever property it targets.
/// Created rules are kept even when the batch as a whole fails.
pub async fn create_rules(
    service: Arc<dyn RuleService>,
    parent_id: &str,
    payloads: Vec<Value>,
    limiter: &BatchLimiter,
    mut on_progress: impl FnMut(BatchProgress),
) -> Result<Vec<MappingRule>> {
    let total = payloads.len();
    log::info!("Creating {total} rules below {parent_id}");

    let mut tasks = JoinSet::new();
    for payload in payloads {
        let service = service.clone();
        let limiter = limiter.clone();
        let parent_id = parent_id.to_string();
        tasks.spawn(async move {
            let outcome = match limiter.acquire().await {
                Ok(_permit) => service
                    .append_rule(&parent_id, &payload)
                    .await
                    .map_err(EditorError::from),
                Err(err) => Err(err),
            };
            (payload, outcome)
        });
    }

    let mut created = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut count = 0;
    while let Some(joined) = tasks.join_next().await {
        count += 1;
        match joined {
            Ok((_, Ok(rule))) => created.push(rule),
            Ok((rule, Err(EditorError::Service(error)))) => {
                log::warn!("Rule creation failed: {error}");
                failures.push(BatchFailure { rule, error });
            }
            Ok((rule, Err(other))) => {
                log::warn!("Rule creation failed: {other}");
                failures.push(BatchFailure {
                    rule,
                    error: ServiceError::Network(other.to_string()),
                });
            }
            Err(join_err) => {
                log::warn!("Rule creation task died: {join_err}");
                failures.push(BatchFailure {
                    rule: Value::Null,
                    error: ServiceError::Network(join_err.to_string()),
                });
            }
        }
        let progress = BatchProgress::new(count, total);
        log::debug!("{} ({}%)", progress.last_message, progress.percent);
        on_progress(progress);
    }

    if failures.is_empty() {
        Ok(created)
    } else {
        log::warn!("{} of {total} rules could not be created", failures.len());
        Err(EditorError::PartialBatchFailure { failures })
    }
}

/// Asks the service to generate rules for `request`, then creates them.
pub async fn generate_and_create(
    service: Arc<dyn RuleService>,
    parent_id: &str,
    request: &GenerateRulesRequest,
    limiter: &BatchLimiter,
    on_progress: impl FnMut(BatchProgress),
) -> Result<Vec<MappingRule>> {
    if request.correspondences.is_empty() {
        return Ok(Vec::new());
    }
    let payloads = service.generate_rules(parent_id, request).await?;
    create_rules(service, parent_id, payloads, limiter, on_progress).await
}
