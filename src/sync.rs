//! # Synchronizers
//!
//! Capability contract for components that reconcile one resource category
//! (configurations, features, bundles) between the local node and a group,
//! plus the runner that drives them for every local group where
//! `<group>.<category>.sync` is enabled.

use crate::cluster::{Group, GroupProvider};
use crate::constants::{SEPARATOR, SYNC};
use crate::error::Result;
use crate::logging::log_error;
use crate::properties::PropertySource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shortest period accepted by [`SyncRunner::spawn_periodic`]
pub const MIN_SYNC_PERIOD: Duration = Duration::from_millis(1);

/// Reconciles one resource category with a cluster group
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Resource category, e.g. `config` or `feature`
    fn category(&self) -> &str;

    /// Publish local state to the group
    async fn push(&self, group: &Group) -> Result<()>;

    /// Apply the group's state locally
    async fn pull(&self, group: &Group) -> Result<()>;
}

/// Property name of a category's sync toggle: `<group>.<category>.sync`
pub fn sync_key(group: &str, category: &str) -> String {
    [group, category, SYNC].join(SEPARATOR)
}

/// Counts from one synchronization round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synchronized: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs registered synchronizers against the local groups
pub struct SyncRunner {
    synchronizers: RwLock<Vec<Arc<dyn Synchronizer>>>,
    groups: Arc<dyn GroupProvider>,
    properties: Arc<dyn PropertySource>,
}

impl SyncRunner {
    pub fn new(groups: Arc<dyn GroupProvider>, properties: Arc<dyn PropertySource>) -> Self {
        Self {
            synchronizers: RwLock::new(Vec::new()),
            groups,
            properties,
        }
    }

    pub fn register(&self, synchronizer: Arc<dyn Synchronizer>) {
        info!(category = synchronizer.category(), "Registered synchronizer");
        self.synchronizers.write().push(synchronizer);
    }

    /// Whether the category syncs for the group; disabled unless the
    /// property parses as `true`
    pub fn is_sync_enabled(&self, group: &str, category: &str) -> bool {
        self.properties
            .get(&sync_key(group, category))
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    /// Pull then push every enabled category for every local group
    pub async fn synchronize_all(&self) -> SyncReport {
        let synchronizers = self.synchronizers.read().clone();
        let mut report = SyncReport::default();

        for group in self.groups.list_local_groups() {
            for synchronizer in &synchronizers {
                let category = synchronizer.category();
                if !self.is_sync_enabled(&group.name, category) {
                    debug!(group = %group.name, category, "Sync disabled, skipping");
                    report.skipped += 1;
                    continue;
                }

                let outcome = match synchronizer.pull(&group).await {
                    Ok(()) => synchronizer.push(&group).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => report.synchronized += 1,
                    Err(e) => {
                        log_error(
                            "sync",
                            "synchronize",
                            &e.to_string(),
                            Some(&format!("group={} category={}", group.name, category)),
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        debug!(
            synchronized = report.synchronized,
            skipped = report.skipped,
            failed = report.failed,
            "Synchronization round finished"
        );
        report
    }

    /// Run [`synchronize_all`](Self::synchronize_all) every `period`. A zero
    /// period is raised to [`MIN_SYNC_PERIOD`].
    pub fn spawn_periodic(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = if period < MIN_SYNC_PERIOD {
            warn!(
                requested_ms = period.as_millis() as u64,
                min_ms = MIN_SYNC_PERIOD.as_millis() as u64,
                "Sync period too small, clamping"
            );
            MIN_SYNC_PERIOD
        } else {
            period
        };
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                runner.synchronize_all().await;
            }
        })
    }
}
