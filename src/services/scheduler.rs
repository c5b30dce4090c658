//! Background housekeeping
//!
//! Every task implements [`PeriodicTask`] and gets its own tokio task with
//! a fixed-period ticker. Failures are logged and retried on the next tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{audit, ledger, relay, telemetry};

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(24 * 3600);

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Time between runs; the first run happens one period after start
    fn interval(&self) -> Duration;

    async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> anyhow::Result<()>;
}

/// What a [`RetentionTask`] prunes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Completed and failed commands
    Commands,
    /// Proxy requests already handed to an agent
    ProxyRequests,
    Telemetry,
    AuditLog,
}

/// Deletes rows of one kind once they are older than `max_age`
#[derive(Debug, Clone)]
pub struct RetentionTask {
    pub target: Retention,
    pub max_age: chrono::Duration,
}

impl RetentionTask {
    pub fn new(target: Retention, days: i64) -> Self {
        Self {
            target,
            max_age: chrono::Duration::days(days),
        }
    }
}

#[async_trait]
impl PeriodicTask for RetentionTask {
    fn name(&self) -> &'static str {
        match self.target {
            Retention::Commands => "command_retention",
            Retention::ProxyRequests => "proxy_request_retention",
            Retention::Telemetry => "telemetry_retention",
            Retention::AuditLog => "audit_retention",
        }
    }

    fn interval(&self) -> Duration {
        match self.target {
            Retention::AuditLog => DAY,
            _ => HOUR,
        }
    }

    async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> anyhow::Result<()> {
        let cutoff = now - self.max_age;
        let deleted = match self.target {
            Retention::Commands => ledger::purge_resolved_before(db, cutoff).await?,
            Retention::ProxyRequests => relay::purge_delivered_before(db, cutoff).await?,
            Retention::Telemetry => telemetry::purge_samples_before(db, cutoff).await?,
            Retention::AuditLog => audit::clear_old_logs(db, self.max_age.num_days()).await?,
        };
        if deleted > 0 {
            tracing::info!(task = self.name(), deleted, %cutoff, "Pruned expired rows");
        }
        Ok(())
    }
}

/// Housekeeping for a deployment keeping `retention_days` of history.
/// Delivered proxy requests are only kept for a day.
pub fn default_tasks(retention_days: i64) -> Vec<Box<dyn PeriodicTask>> {
    vec![
        Box::new(RetentionTask::new(Retention::Commands, retention_days)),
        Box::new(RetentionTask::new(Retention::ProxyRequests, 1)),
        Box::new(RetentionTask::new(Retention::Telemetry, retention_days)),
        Box::new(RetentionTask::new(Retention::AuditLog, retention_days)),
    ]
}

pub fn start_scheduler(db: Arc<DatabaseConnection>, retention_days: i64) {
    let tasks = default_tasks(retention_days);
    tracing::info!(tasks = tasks.len(), retention_days, "Starting housekeeping tasks");

    for task in tasks {
        tokio::spawn(run_task(task, db.clone()));
    }
}

async fn run_task(task: Box<dyn PeriodicTask>, db: Arc<DatabaseConnection>) {
    let period = task.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let started = std::time::Instant::now();
        if let Err(e) = task.run(&db, Utc::now()).await {
            tracing::error!(task = task.name(), error = %e, "Housekeeping task failed");
            continue;
        }
        tracing::debug!(
            task = task.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Housekeeping task finished"
        );
    }
}
