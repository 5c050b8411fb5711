//! Reconcile driver.
//!
//! The driver:
//! - Runs one task per cluster object; objects never share a pass
//! - Runs a create or delete pass (by the object's deletion flag) on every
//!   resync, each with a fresh working context and a deadline
//! - Retries failed passes with backoff and reports exhausted objects as
//!   degraded

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stratus_reconcile::{
    BackoffPolicy, CancellationToken, Pass, PassOutcome, ResourceSet, Result, Retry, RetryTracker,
};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cluster::TenantCluster;
use crate::config::Config;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Interval between passes after a pass that did not fail.
    pub resync_interval: Duration,

    /// Deadline of a single pass.
    pub pass_timeout: Duration,

    /// Failed passes tolerated inside `retry_window` before the object is
    /// reported degraded.
    pub max_retries: u32,

    pub retry_window: Duration,

    /// Delay between retries of a failing object.
    pub backoff: BackoffPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DriverConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resync_interval: config.resync_interval(),
            pass_timeout: config.pass_timeout(),
            max_retries: config.max_retries,
            retry_window: config.retry_window(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Last known reconciliation status of a cluster object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterStatus {
    /// Passes run so far.
    pub passes: u64,

    /// Passes that ended early on an unmet precondition.
    pub canceled: u64,

    pub last_success: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// Consecutive failures inside the retry window.
    pub failures: u32,

    /// Retries exhausted; the object keeps being reconciled at the resync
    /// interval.
    pub degraded: bool,
}

/// Runs reconciliation passes for a set of cluster objects.
pub struct Driver {
    set: ResourceSet<TenantCluster>,
    config: DriverConfig,
    statuses: RwLock<HashMap<String, ClusterStatus>>,
}

impl Driver {
    pub fn new(set: ResourceSet<TenantCluster>, config: DriverConfig) -> Self {
        Self {
            set,
            config,
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Run a single pass for `obj` with the configured deadline.
    pub async fn reconcile(&self, obj: &TenantCluster, cancel: CancellationToken) -> Result<PassOutcome> {
        let mut pass = Pass::new(obj.operation(), cancel).with_timeout(self.config.pass_timeout);
        self.set.run(&mut pass, obj).await
    }

    /// Spawn one task per valid cluster object.
    ///
    /// Invalid objects are logged, marked degraded and never reconciled.
    pub async fn spawn(
        self: &Arc<Self>,
        clusters: Vec<TenantCluster>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(clusters.len());

        for obj in clusters {
            if let Err(e) = obj.validate() {
                error!(cluster_id = %obj.cluster_id, error = %e, "Invalid cluster object, not reconciling");
                self.statuses.write().await.insert(
                    obj.cluster_id.clone(),
                    ClusterStatus {
                        last_error: Some(e.to_string()),
                        degraded: true,
                        ..ClusterStatus::default()
                    },
                );
                continue;
            }

            let driver = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                driver.run_cluster(obj, shutdown).await;
            }));
        }

        handles
    }

    pub async fn status(&self, cluster_id: &str) -> Option<ClusterStatus> {
        self.statuses.read().await.get(cluster_id).cloned()
    }

    pub async fn statuses(&self) -> HashMap<String, ClusterStatus> {
        self.statuses.read().await.clone()
    }

    /// Reconcile one object until shutdown.
    async fn run_cluster(&self, obj: TenantCluster, mut shutdown: watch::Receiver<bool>) {
        let id = obj.cluster_id.clone();
        let mut tracker = RetryTracker::new(
            self.config.max_retries,
            self.config.retry_window,
            self.config.backoff.clone(),
        );
        let mut delay = Duration::ZERO;

        info!(cluster_id = %id, operation = %obj.operation(), "Starting cluster reconciliation");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            let cancel = CancellationToken::new();
            let pass = self.reconcile(&obj, cancel.clone());
            tokio::pin!(pass);

            let result = tokio::select! {
                result = &mut pass => result,
                _ = wait_for_shutdown(&mut shutdown) => {
                    cancel.cancel();
                    // Let in-flight calls observe the cancellation.
                    let _ = pass.await;
                    break;
                }
            };

            let mut statuses = self.statuses.write().await;
            let status = statuses.entry(id.clone()).or_default();
            status.passes += 1;

            delay = match result {
                Ok(outcome) => {
                    tracker.reset();
                    status.failures = 0;
                    status.degraded = false;
                    status.last_error = None;
                    status.last_success = Some(Utc::now());

                    match outcome {
                        PassOutcome::Completed => debug!(cluster_id = %id, "Pass completed"),
                        PassOutcome::Canceled { resource } => {
                            status.canceled += 1;
                            debug!(cluster_id = %id, %resource, "Pass canceled");
                        }
                    }
                    self.config.resync_interval
                }
                Err(e) => {
                    let retry = tracker.record_failure();
                    status.failures = retry.failures();
                    status.last_error = Some(e.to_string());

                    match retry {
                        Retry::Exhausted { failures } => {
                            if !status.degraded {
                                error!(
                                    cluster_id = %id,
                                    failures,
                                    error = %e,
                                    "Retries exhausted, cluster degraded"
                                );
                            }
                            status.degraded = true;
                            self.config.resync_interval
                        }
                        Retry::After { failures, delay } => {
                            warn!(
                                cluster_id = %id,
                                failures,
                                retry_in_ms = delay.as_millis() as u64,
                                error = %e,
                                "Pass failed, will retry"
                            );
                            delay
                        }
                    }
                }
            };
        }

        info!(cluster_id = %id, "Cluster reconciliation stopped");
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
